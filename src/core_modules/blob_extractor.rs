// THEORY:
// The `BlobExtractor` is the engine of the spatial grouping layer. It labels the
// 4-connected regions of a thresholded `DensityMap` in a single raster pass,
// without ever relabeling a pixel it has already visited.
//
// Key architectural principles & algorithm steps:
// 1.  **Two cursors**: `column_blobs[x]` remembers which blob owned the pixel
//     directly above, and `row_blob` which blob owns the run to the left. A
//     blob-worthy pixel joins whichever is active, or seeds a new blob.
// 2.  **Lazy union**: when the run to the left and the pixel above belong to
//     different blobs, the column blob is folded into the row blob and left
//     behind as a forwarding stub. Other columns still referencing the stub are
//     only redirected when the scan next reaches them (union-find with path
//     compression, resolved iteratively).
// 3.  **Deferred reclamation**: a stub created on row `y` can still be named by
//     column entries written on row `y`, which are resolved on row `y + 1`. The
//     stub is therefore stamped `expire = y + 1` and released at the end of that
//     row. Whatever stubs remain after the last row are released at the end.
// 4.  **Deterministic output**: surviving roots are numbered 1, 2, 3... in the
//     order they were created, which is raster order of their first pixel.
// 5.  **Per-pixel ID map**: the annotated variant keeps every pixel's handle in a
//     side table (so no stub may expire mid-scan) and flattens it into a
//     `BlobIdMap` of final IDs afterwards. The density map is never overwritten.

use crate::core_modules::blob::Blob;
use crate::core_modules::blob_pool::{BlobHandle, BlobPool};
use crate::core_modules::frame::{validate_dimensions, DensityMap};
use crate::error::VisionResult;
use log::debug;

/// Per-pixel blob membership: 0 for background, otherwise a `Blob::id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobIdMap {
    width: usize,
    height: usize,
    ids: Vec<u32>,
}

impl BlobIdMap {
    fn new(width: usize, height: usize) -> VisionResult<Self> {
        validate_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            ids: vec![0; width * height],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.ids[y * self.width + x]
    }

    /// The ID map viewed as a density map, for the palette renderers.
    pub fn to_density_map(&self) -> VisionResult<DensityMap> {
        DensityMap::from_values(self.width, self.height, self.ids.clone())
    }
}

/// Reusable single-pass connected-component labeler.
#[derive(Debug, Default)]
pub struct BlobExtractor {
    pool: BlobPool,
    column_blobs: Vec<Option<BlobHandle>>,
    created: Vec<BlobHandle>,
    stubs: Vec<BlobHandle>,
}

impl BlobExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The arena behind the extractor, for leak checks and statistics.
    pub fn pool(&self) -> &BlobPool {
        &self.pool
    }

    /// Finds every 4-connected region whose density is at least `bth`.
    pub fn find_blobs(&mut self, map: &DensityMap, bth: u32) -> VisionResult<Vec<Blob>> {
        if let Err(err) = self.scan(map, bth, None) {
            self.release_all();
            return Err(err);
        }
        let blobs = self.number_roots();
        self.release_all();
        debug!("extracted {} blobs at threshold {}", blobs.len(), bth);
        Ok(blobs)
    }

    /// Like `find_blobs`, and additionally reports which blob owns each pixel.
    pub fn find_blobs_with_map(&mut self, map: &DensityMap, bth: u32) -> VisionResult<(Vec<Blob>, BlobIdMap)> {
        let mut id_map = BlobIdMap::new(map.width(), map.height())?;
        let mut owners: Vec<Option<BlobHandle>> = vec![None; map.len()];
        if let Err(err) = self.scan(map, bth, Some(&mut owners)) {
            self.release_all();
            return Err(err);
        }
        let blobs = self.number_roots();

        for (id, owner) in id_map.ids.iter_mut().zip(&owners) {
            if let Some(owner) = *owner {
                let root = self.pool.resolve(owner);
                *id = self.pool.get(root).id;
            }
        }
        self.release_all();
        debug!("extracted {} blobs at threshold {} with id map", blobs.len(), bth);
        Ok((blobs, id_map))
    }

    fn scan(&mut self, map: &DensityMap, bth: u32, mut owners: Option<&mut Vec<Option<BlobHandle>>>) -> VisionResult<()> {
        let (width, height) = (map.width(), map.height());
        let reap_per_row = owners.is_none();
        self.column_blobs.clear();
        self.column_blobs.resize(width, None);

        for y in 0..height {
            let mut row_blob: Option<BlobHandle> = None;
            for x in 0..width {
                let column_blob = self.column_blobs[x].map(|handle| self.pool.resolve(handle));

                if map.get(x, y) < bth {
                    row_blob = None;
                    self.column_blobs[x] = None;
                    continue;
                }

                let active = match (row_blob, column_blob) {
                    (Some(row), Some(column)) if row != column => {
                        self.pool.merge(row, column, y + 1);
                        self.stubs.push(column);
                        row
                    }
                    (Some(row), _) => row,
                    (None, Some(column)) => column,
                    (None, None) => {
                        let fresh = self.pool.allocate(x as u32, y as u32)?;
                        self.created.push(fresh);
                        fresh
                    }
                };
                self.pool.get_mut(active).record(x as u32, y as u32);
                row_blob = Some(active);
                self.column_blobs[x] = Some(active);
                if let Some(owners) = owners.as_mut() {
                    owners[y * width + x] = Some(active);
                }
            }
            if reap_per_row {
                self.reap_expired(y);
            }
        }
        Ok(())
    }

    /// Releases every stub whose expiry row has just been completed.
    fn reap_expired(&mut self, row: usize) {
        let pool = &mut self.pool;
        self.stubs.retain(|&stub| {
            if pool.get(stub).expire == Some(row) {
                pool.release(stub);
                false
            } else {
                true
            }
        });
    }

    /// Assigns sequential IDs to surviving roots in creation order.
    fn number_roots(&mut self) -> Vec<Blob> {
        let mut blobs = Vec::new();
        for &handle in &self.created {
            if !self.pool.is_live(handle) || !self.pool.get(handle).is_root() {
                continue;
            }
            let record = self.pool.get_mut(handle);
            record.id = blobs.len() as u32 + 1;
            blobs.push(record.to_blob());
        }
        blobs
    }

    fn release_all(&mut self) {
        for handle in self.created.drain(..) {
            if self.pool.is_live(handle) {
                self.pool.release(handle);
            }
        }
        self.stubs.clear();
        self.column_blobs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::blob::Point;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const BTH: u32 = 5;

    fn map_from_rows(rows: &[&str]) -> DensityMap {
        let width = rows[0].len();
        let values = rows
            .iter()
            .flat_map(|row| row.bytes().map(|b| if b == b'#' { BTH } else { 0 }))
            .collect();
        DensityMap::from_values(width, rows.len(), values).unwrap()
    }

    /// Reference labeling by breadth-first flood fill; returns sorted areas.
    fn flood_fill_areas(map: &DensityMap, bth: u32) -> Vec<usize> {
        let (width, height) = (map.width(), map.height());
        let mut seen = vec![false; width * height];
        let mut areas = Vec::new();
        for start in 0..width * height {
            if seen[start] || map.values()[start] < bth {
                continue;
            }
            let mut queue = std::collections::VecDeque::from([start]);
            seen[start] = true;
            let mut area = 0;
            while let Some(i) = queue.pop_front() {
                area += 1;
                let (x, y) = (i % width, i / width);
                let mut neighbors = Vec::new();
                if x > 0 {
                    neighbors.push(i - 1);
                }
                if x + 1 < width {
                    neighbors.push(i + 1);
                }
                if y > 0 {
                    neighbors.push(i - width);
                }
                if y + 1 < height {
                    neighbors.push(i + width);
                }
                for n in neighbors {
                    if !seen[n] && map.values()[n] >= bth {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }
            areas.push(area);
        }
        areas.sort_unstable();
        areas
    }

    #[test]
    fn edge_adjacent_blocks_form_one_blob() {
        let map = map_from_rows(&["###...", "######", "######", "...###"]);
        let blobs = BlobExtractor::new().find_blobs(&map, BTH).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 18);
    }

    #[test]
    fn diagonal_blocks_stay_separate() {
        let map = map_from_rows(&["###...", "###...", "###...", "...###", "...###", "...###"]);
        let blobs = BlobExtractor::new().find_blobs(&map, BTH).unwrap();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].area, 9);
        assert_eq!(blobs[0].bounding_box, (Point::new(0, 0), Point::new(2, 2)));
        assert_eq!(blobs[1].area, 9);
        assert_eq!(blobs[1].bounding_box, (Point::new(3, 3), Point::new(5, 5)));
        assert_eq!((blobs[0].id, blobs[1].id), (1, 2));
    }

    #[test]
    fn ring_is_a_single_blob() {
        let map = map_from_rows(&["#####", "#####", "##.##", "#####", "#####"]);
        let blobs = BlobExtractor::new().find_blobs(&map, BTH).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 24);
        assert_eq!(blobs[0].bounding_box, (Point::new(0, 0), Point::new(4, 4)));
        assert_eq!(blobs[0].center_of_mass(), (2.0, 2.0));
    }

    #[test]
    fn u_shape_merges_at_the_bottom() {
        let map = map_from_rows(&["#...#", "#...#", "#####"]);
        let mut extractor = BlobExtractor::new();
        let (blobs, ids) = extractor.find_blobs_with_map(&map, BTH).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].id, 1);
        assert_eq!(blobs[0].area, 9);
        assert_eq!(blobs[0].registration, Point::new(0, 0));
        assert_eq!(blobs[0].integer_center(), Point::new(2, 1));
        assert_eq!(ids.get(4, 0), 1);
        assert_eq!(ids.get(2, 0), 0);
        assert_eq!(extractor.pool().live(), 0);
    }

    #[test]
    fn staircase_chains_forwarding() {
        // Each row links two runs that were separate on the row above.
        let map = map_from_rows(&["#.#.#.#", "#.#.#.#", "#######"]);
        let blobs = BlobExtractor::new().find_blobs(&map, BTH).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 15);
        assert_eq!(blobs[0].registration, Point::new(0, 0));
    }

    #[test]
    fn areas_match_flood_fill_on_random_maps() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut extractor = BlobExtractor::new();
        for _ in 0..50 {
            let width = rng.gen_range(1..30);
            let height = rng.gen_range(1..30);
            let values: Vec<u32> = (0..width * height).map(|_| rng.gen_range(0..10)).collect();
            let map = DensityMap::from_values(width, height, values).unwrap();
            let bth = rng.gen_range(0..10);

            let (blobs, ids) = extractor.find_blobs_with_map(&map, bth).unwrap();
            let mut areas: Vec<usize> = blobs.iter().map(|blob| blob.area).collect();
            areas.sort_unstable();
            assert_eq!(areas, flood_fill_areas(&map, bth));
            assert_eq!(areas.iter().sum::<usize>(), map.count_at_least(bth));

            for (i, &id) in ids.ids().iter().enumerate() {
                assert_eq!(id != 0, map.values()[i] >= bth);
                assert!(id as usize <= blobs.len());
            }
            for blob in &blobs {
                let owned = ids.ids().iter().filter(|&&id| id == blob.id).count();
                assert_eq!(owned, blob.area);
            }

            let plain = extractor.find_blobs(&map, bth).unwrap();
            assert_eq!(plain, blobs);
            assert_eq!(extractor.pool().live(), 0);
        }
    }

    #[test]
    fn empty_map_has_no_blobs() {
        let map = DensityMap::new(4, 4).unwrap();
        let (blobs, ids) = BlobExtractor::new().find_blobs_with_map(&map, 1).unwrap();
        assert!(blobs.is_empty());
        assert!(ids.ids().iter().all(|&id| id == 0));
    }
}
