// THEORY:
// The `BackgroundModel` is the temporal layer of the engine: a multi-modal
// mean ("MMM") model that learns, for every pixel position, the handful of
// colors that position usually shows. Each pixel owns a short list of color
// clusters ("cells"); each cell keeps running R/G/B sums and an observation
// count, so its color is the integer-truncated ratio `sum / count`.
//
// Key architectural principles:
// 1.  **Multi-modal memory**: a pixel can have several backgrounds (a swaying
//     branch, a blinking light). Every mode that has been seen at least `Cth`
//     times is treated as background; anything else is foreground.
// 2.  **Ratiometric matching**: an incoming color matches a cell when each
//     channel is within `Epsilon` of the cell's truncated mean. The first
//     matching cell in list order absorbs the observation.
// 3.  **Bounded churn**: when nothing matches, a new cell is appended only if
//     the current tail has matured to `Cth` observations. An immature tail is
//     overwritten in place instead, so a noisy pixel cannot grow its list
//     without bound.
// 4.  **Logarithmic aging**: `decimate` halves every mature cell. Old evidence
//     therefore decays geometrically, and cells that fall below `Cth` are
//     pruned back into the pool. The last surviving cell of a list is always
//     kept, so no pixel ever loses its model.
// 5.  **Arena storage**: all cells live in one `CellPool` owned by the model;
//     per-pixel lists are chains of `CellId` handles.

use crate::core_modules::cell_pool::{Cell, CellId, CellPool};
use crate::core_modules::frame::FrameBuffer;
use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::render::rainbow;
use crate::error::{VisionError, VisionResult};
use log::{debug, info};
use std::cmp::Reverse;
use std::fmt;

/// Length histogram buckets: lists of length 1..=9, then 10 or more.
const LENGTH_BUCKETS: usize = 10;
/// Predominance histogram buckets: below 55%, then 5% steps up to 100%.
const PREDOMINANCE_BUCKETS: usize = 11;

/// Rejects a maturity threshold below one observation.
pub fn validate_cth(cth: u32) -> VisionResult<i32> {
    if cth == 0 {
        return Err(VisionError::InvalidParameter {
            name: "cth",
            reason: "cell threshold must be at least 1".to_string(),
        });
    }
    Ok(cth.min(i32::MAX as u32) as i32)
}

fn epsilon_as_i32(epsilon: u32) -> i32 {
    epsilon.min(i32::MAX as u32) as i32
}

/// What happened to a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Absorbed by an existing cell, which now holds this many observations.
    Matched(i32),
    /// No match; a new cell was appended behind a mature tail.
    Appended,
    /// No match; the immature tail cell was overwritten with this color.
    Overwritten,
}

/// Per-frame tallies from `match_foreground`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchStats {
    /// Pixels matched to a mature cell and blacked out.
    pub background: usize,
    /// Pixels matched to a cell that has not reached `Cth` yet.
    pub immature_matches: usize,
    /// Pixels that produced a brand new cell.
    pub appended: usize,
    /// Pixels that overwrote an immature tail cell.
    pub overwritten: usize,
}

impl MatchStats {
    /// Pixels left untouched in the frame.
    pub fn foreground(&self) -> usize {
        self.immature_matches + self.appended + self.overwritten
    }

    fn record(&mut self, observation: Observation, cth: i32) -> bool {
        match observation {
            Observation::Matched(count) if count >= cth => {
                self.background += 1;
                return true;
            }
            Observation::Matched(_) => self.immature_matches += 1,
            Observation::Appended => self.appended += 1,
            Observation::Overwritten => self.overwritten += 1,
        }
        false
    }
}

/// Result of a predominance query on one pixel's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predominance {
    /// The cell with the largest count (the first one on ties).
    pub cell: CellId,
    /// Its observation count.
    pub count: i32,
    /// Sum of counts over the whole list.
    pub total: i32,
    /// Its color.
    pub color: Pixel,
}

impl Predominance {
    /// Percentage of observations *not* explained by the dominant cell.
    pub fn rate(&self) -> u32 {
        if self.total <= 0 {
            return 0;
        }
        ((self.total - self.count).max(0) as i64 * 100 / self.total as i64) as u32
    }
}

/// Model-wide statistics over list lengths and predominance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetDemographics {
    /// Number of pixel lists examined.
    pub sets: usize,
    /// Average list length in tenths (23 means 2.3 cells).
    pub average_length_tenths: usize,
    /// `[k]` counts lists of length `k + 1`; the last bucket collects 10 and longer.
    pub length_histogram: [usize; LENGTH_BUCKETS],
    /// Average share (percent) of observations held by the dominant cell.
    pub average_predominance: usize,
    /// `[0]` counts lists below 55%; `[k]` counts `50 + 5k` up to the next step.
    pub predominance_histogram: [usize; PREDOMINANCE_BUCKETS],
}

impl fmt::Display for SetDemographics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sets = self.sets.max(1);
        writeln!(
            f,
            "length avg= {}.{}",
            self.average_length_tenths / 10,
            self.average_length_tenths % 10
        )?;
        for (i, count) in self.length_histogram.iter().enumerate().take(LENGTH_BUCKETS - 1) {
            write!(f, " {}: {} ({}%),", i + 1, count, count * 100 / sets)?;
        }
        let longest = self.length_histogram[LENGTH_BUCKETS - 1];
        writeln!(f, " 10+: {} ({}%)", longest, longest * 100 / sets)?;
        writeln!(f, "predominance avg= {}", self.average_predominance)?;
        for bucket in (1..PREDOMINANCE_BUCKETS).rev() {
            let count = self.predominance_histogram[bucket];
            write!(f, " {}%: {} ({}%),", 5 * bucket + 50, count, 100 * count / sets)?;
        }
        let low = self.predominance_histogram[0];
        write!(f, " <55%: {} ({}%)", low, 100 * low / sets)
    }
}

/// The per-pixel multi-modal background model.
#[derive(Debug)]
pub struct BackgroundModel {
    width: usize,
    height: usize,
    heads: Vec<CellId>,
    locked: Vec<bool>,
    pool: CellPool,
}

impl BackgroundModel {
    /// Builds the initial model: one cell per pixel, seeded from `seed`.
    pub fn new(seed: &FrameBuffer) -> VisionResult<Self> {
        let mut pool = CellPool::with_capacity(seed.len())?;
        let mut heads = Vec::new();
        heads
            .try_reserve_exact(seed.len())
            .map_err(|_| VisionError::PoolExhausted {
                pool: "background model",
                requested: seed.len(),
            })?;
        for pixel in seed.pixels() {
            heads.push(pool.allocate(pixel)?);
        }
        info!("built {} entry background model ({}x{})", heads.len(), seed.width(), seed.height());
        Ok(Self {
            width: seed.width(),
            height: seed.height(),
            locked: vec![false; heads.len()],
            heads,
            pool,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixel lists (always `width * height`).
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// The arena backing the model, for allocation statistics.
    pub fn pool(&self) -> &CellPool {
        &self.pool
    }

    /// Cells of one pixel, in list order.
    pub fn cells(&self, index: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.pool.iter_list(self.heads[index]).map(|(_, cell)| cell)
    }

    pub fn list_length(&self, index: usize) -> usize {
        self.pool.iter_list(self.heads[index]).count()
    }

    /// Sum of observation counts on one pixel's list.
    pub fn total_count(&self, index: usize) -> i64 {
        self.cells(index).map(|cell| cell.count as i64).sum()
    }

    pub fn is_locked(&self, index: usize) -> bool {
        self.locked[index]
    }

    /// Feeds one observation to one pixel's list.
    pub fn observe(&mut self, index: usize, pixel: Pixel, epsilon: u32, cth: u32) -> VisionResult<Observation> {
        let cth = validate_cth(cth)?;
        self.observe_inner(index, pixel, epsilon_as_i32(epsilon), cth)
    }

    fn observe_inner(&mut self, index: usize, pixel: Pixel, epsilon: i32, cth: i32) -> VisionResult<Observation> {
        debug_assert!(!self.locked[index], "ratiometric match on locked list {index}");
        let mut current = Some(self.heads[index]);
        let mut tail = self.heads[index];
        while let Some(id) = current {
            let cell = self.pool.get_mut(id);
            if cell.matches(pixel, epsilon) {
                cell.absorb(pixel);
                return Ok(Observation::Matched(cell.count));
            }
            tail = id;
            current = cell.next();
        }

        if self.pool.get(tail).count >= cth {
            let fresh = self.pool.allocate(pixel)?;
            self.pool.set_next(tail, Some(fresh));
            Ok(Observation::Appended)
        } else {
            self.pool.get_mut(tail).reset(pixel);
            Ok(Observation::Overwritten)
        }
    }

    /// Processes a frame in place, blacking out every pixel explained by a mature
    /// background cell. Foreground pixels keep their color.
    pub fn match_foreground(&mut self, frame: &mut FrameBuffer, epsilon: u32, cth: u32) -> VisionResult<MatchStats> {
        frame.ensure_same_shape(self.width, self.height)?;
        let cth = validate_cth(cth)?;
        let epsilon = epsilon_as_i32(epsilon);
        let mut stats = MatchStats::default();

        for index in 0..self.heads.len() {
            let observation = self.observe_inner(index, frame.pixel(index), epsilon, cth)?;
            if stats.record(observation, cth) {
                frame.set_pixel(index, Pixel::BLACK);
            }
        }
        debug!(
            "foreground pass: {} background, {} foreground ({} new cells, {} overwritten), {} live cells",
            stats.background,
            stats.foreground(),
            stats.appended,
            stats.overwritten,
            self.pool.live()
        );
        Ok(stats)
    }

    /// Processes a frame in place, replacing every pixel with the color of its
    /// predominant cell. Used while the model is still being trained.
    pub fn process_background(&mut self, frame: &mut FrameBuffer, epsilon: u32, cth: u32) -> VisionResult<MatchStats> {
        frame.ensure_same_shape(self.width, self.height)?;
        let cth = validate_cth(cth)?;
        let epsilon = epsilon_as_i32(epsilon);
        let mut stats = MatchStats::default();

        for index in 0..self.heads.len() {
            let observation = self.observe_inner(index, frame.pixel(index), epsilon, cth)?;
            stats.record(observation, cth);
            frame.set_pixel(index, self.predominant_cell(index).color);
        }
        Ok(stats)
    }

    /// Processes a frame in place, replacing every pixel with a rainbow color of
    /// its predominance rate (blue: one dominant mode, red: no dominant mode).
    pub fn process_predominance(&mut self, frame: &mut FrameBuffer, epsilon: u32, cth: u32) -> VisionResult<MatchStats> {
        frame.ensure_same_shape(self.width, self.height)?;
        let cth = validate_cth(cth)?;
        let epsilon = epsilon_as_i32(epsilon);
        let mut stats = MatchStats::default();

        for index in 0..self.heads.len() {
            let observation = self.observe_inner(index, frame.pixel(index), epsilon, cth)?;
            stats.record(observation, cth);
            frame.set_pixel(index, predominance_color(&self.predominant_cell(index)));
        }
        Ok(stats)
    }

    /// Synthesizes a frame from every pixel's predominant cell.
    pub fn background_frame(&self) -> VisionResult<FrameBuffer> {
        let mut frame = FrameBuffer::new(self.width, self.height)?;
        for index in 0..self.heads.len() {
            frame.set_pixel(index, self.predominant_cell(index).color);
        }
        Ok(frame)
    }

    /// Paints every pixel's predominance rate without consuming a frame.
    pub fn predominance_map(&self) -> VisionResult<FrameBuffer> {
        let mut frame = FrameBuffer::new(self.width, self.height)?;
        for index in 0..self.heads.len() {
            frame.set_pixel(index, predominance_color(&self.predominant_cell(index)));
        }
        Ok(frame)
    }

    /// Linear scan for the largest-count cell and the list's total count.
    pub fn predominant_cell(&self, index: usize) -> Predominance {
        let head = self.heads[index];
        let first = self.pool.get(head);
        let mut best = Predominance {
            cell: head,
            count: first.count,
            total: 0,
            color: first.mean(),
        };
        for (id, cell) in self.pool.iter_list(head) {
            best.total += cell.count;
            if cell.count > best.count {
                best.cell = id;
                best.count = cell.count;
                best.color = cell.mean();
            }
        }
        best
    }

    /// Ages the whole model: mature cells are halved, then every cell below
    /// `cth` is pruned unless it is the last one left in its list. Returns the
    /// number of cells handed back to the pool.
    pub fn decimate(&mut self, cth: u32) -> VisionResult<usize> {
        let cth = validate_cth(cth)?;
        let mut freed = 0;

        for index in 0..self.heads.len() {
            debug_assert!(!self.locked[index], "decimating locked list {index}");
            let mut previous: Option<CellId> = None;
            let mut current = Some(self.heads[index]);
            while let Some(id) = current {
                let cell = self.pool.get_mut(id);
                // A single observation cannot be halved without losing its color.
                if cell.count >= cth && cell.count >= 2 {
                    cell.halve();
                }
                let count = cell.count;
                let next = cell.next();
                let sole_survivor = previous.is_none() && next.is_none();

                if count < cth && !sole_survivor {
                    self.pool.release(id);
                    match previous {
                        Some(previous) => self.pool.set_next(previous, next),
                        None => {
                            if let Some(next) = next {
                                self.heads[index] = next;
                            }
                        }
                    }
                    freed += 1;
                } else {
                    previous = Some(id);
                }
                current = next;
            }
        }
        debug!("decimation reclaimed {} cells, {} live", freed, self.pool.live());
        Ok(freed)
    }

    /// Sorts one pixel's list by decreasing `|count|` and, when `trim_length` is
    /// given, keeps only that many cells. Cells with equal counts come out in
    /// reverse list order, as if each was inserted ahead of its equals.
    /// Returns the number of cells released.
    pub fn trim_sort(&mut self, index: usize, trim_length: Option<usize>) -> usize {
        let mut ids: Vec<CellId> = self.pool.iter_list(self.heads[index]).map(|(id, _)| id).collect();
        ids.reverse();
        ids.sort_by_key(|&id| Reverse(self.pool.get(id).count.unsigned_abs()));

        for pair in ids.windows(2) {
            self.pool.set_next(pair[0], Some(pair[1]));
        }
        self.heads[index] = ids[0];

        let keep = trim_length.map_or(ids.len(), |limit| limit.max(1)).min(ids.len());
        let last_kept = ids[keep - 1];
        let rest = self.pool.get(last_kept).next();
        self.pool.set_next(last_kept, None);
        self.pool.release_list(rest)
    }

    /// Computes list-length and predominance statistics over the whole model.
    pub fn demographics(&self) -> SetDemographics {
        let mut demographics = SetDemographics {
            sets: self.heads.len(),
            ..SetDemographics::default()
        };
        let mut length_total = 0usize;
        let mut predominance_total = 0usize;

        for &head in &self.heads {
            let mut length = 0usize;
            let mut total = 0i64;
            let mut max = self.pool.get(head).count.unsigned_abs() as i64;
            for (_, cell) in self.pool.iter_list(head) {
                let count = cell.count.unsigned_abs() as i64;
                length += 1;
                total += count;
                max = max.max(count);
            }
            length_total += length;
            demographics.length_histogram[length.min(LENGTH_BUCKETS) - 1] += 1;

            let predominance = if total > 0 { (max * 100 / total) as usize } else { 100 };
            predominance_total += predominance;
            let bucket = predominance / 5;
            if bucket > 10 {
                demographics.predominance_histogram[bucket - 10] += 1;
            } else {
                demographics.predominance_histogram[0] += 1;
            }
        }

        if demographics.sets > 0 {
            demographics.average_length_tenths = 10 * length_total / demographics.sets;
            demographics.average_predominance = predominance_total / demographics.sets;
        }
        demographics
    }

    /// Converts one pixel's list from ratiometric sums to scalar colors. With
    /// `clear` the counts restart at zero, otherwise they are negated.
    pub fn color_lock(&mut self, index: usize, clear: bool) {
        let mut current = Some(self.heads[index]);
        while let Some(id) = current {
            let cell = self.pool.get_mut(id);
            if cell.is_ratiometric() {
                cell.red /= cell.count;
                cell.green /= cell.count;
                cell.blue /= cell.count;
                cell.count = if clear { 0 } else { -cell.count };
            }
            current = cell.next();
        }
        self.locked[index] = true;
    }

    /// Matches a color against a locked list's scalar colors. The first match has
    /// its (non-positive) count decremented.
    pub fn scalar_match(&mut self, index: usize, pixel: Pixel, epsilon: u32) -> bool {
        debug_assert!(self.locked[index], "scalar match on ratiometric list {index}");
        let epsilon = epsilon_as_i32(epsilon);
        let mut current = Some(self.heads[index]);
        while let Some(id) = current {
            let cell = self.pool.get_mut(id);
            if cell.matches_scalar(pixel, epsilon) {
                cell.count -= 1;
                return true;
            }
            current = cell.next();
        }
        false
    }
}

fn predominance_color(predominance: &Predominance) -> Pixel {
    rainbow((predominance.rate() * 255 / 100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize, pixel: Pixel) -> FrameBuffer {
        FrameBuffer::from_fn(width, height, |_, _| pixel).unwrap()
    }

    #[test]
    fn seed_frame_creates_one_cell_per_pixel() {
        let seed = FrameBuffer::from_fn(4, 3, |x, y| Pixel::new(x as u8, y as u8, 7)).unwrap();
        let model = BackgroundModel::new(&seed).unwrap();
        assert_eq!(model.len(), 12);
        assert_eq!(model.pool().live(), 12);
        for index in 0..model.len() {
            assert_eq!(model.list_length(index), 1);
            let cell = model.cells(index).next().unwrap();
            assert_eq!(cell.count, 1);
            assert_eq!(cell.mean(), seed.pixel(index));
        }
    }

    #[test]
    fn exact_mean_matches_with_zero_epsilon() {
        let gray = Pixel::gray(100);
        let mut model = BackgroundModel::new(&solid(2, 2, gray)).unwrap();
        let observation = model.observe(0, gray, 0, 4).unwrap();
        assert_eq!(observation, Observation::Matched(2));
    }

    #[test]
    fn mature_cell_blacks_out_background() {
        let gray = Pixel::gray(80);
        let mut model = BackgroundModel::new(&solid(3, 3, gray)).unwrap();
        let cth = 3;

        // Two more observations bring the seed cells to count 3.
        let mut frame = solid(3, 3, gray);
        let stats = model.match_foreground(&mut frame, 10, cth).unwrap();
        assert_eq!(stats.immature_matches, 9);
        assert_eq!(frame.salient_count(), 9, "immature matches stay untouched");

        let mut frame = solid(3, 3, Pixel::gray(85));
        let stats = model.match_foreground(&mut frame, 10, cth).unwrap();
        assert_eq!(stats.background, 9);
        assert_eq!(frame.salient_count(), 0);
    }

    #[test]
    fn unmatched_color_overwrites_immature_tail() {
        let mut model = BackgroundModel::new(&solid(1, 1, Pixel::gray(10))).unwrap();
        // Seed cell has count 1 < cth, so a new color overwrites it.
        assert_eq!(model.observe(0, Pixel::gray(200), 5, 2).unwrap(), Observation::Overwritten);
        assert_eq!(model.list_length(0), 1);
        assert_eq!(model.cells(0).next().unwrap().mean(), Pixel::gray(200));

        // Mature the cell, then a new color is appended behind it.
        model.observe(0, Pixel::gray(200), 5, 2).unwrap();
        assert_eq!(model.observe(0, Pixel::gray(50), 5, 2).unwrap(), Observation::Appended);
        assert_eq!(model.list_length(0), 2);

        // The new tail is immature, so yet another color overwrites it.
        assert_eq!(model.observe(0, Pixel::gray(120), 5, 2).unwrap(), Observation::Overwritten);
        assert_eq!(model.list_length(0), 2);
        let tail = model.cells(0).last().unwrap();
        assert_eq!(tail.mean(), Pixel::gray(120));
    }

    #[test]
    fn counts_are_conserved_without_decimation() {
        // With cth = 1 every cell is mature, so no observation is ever overwritten.
        let seed = FrameBuffer::from_fn(5, 4, |x, y| Pixel::new((x * 40) as u8, (y * 60) as u8, 3)).unwrap();
        let mut model = BackgroundModel::new(&seed).unwrap();
        let frames = 12;
        for n in 1..frames {
            let mut frame =
                FrameBuffer::from_fn(5, 4, |x, y| Pixel::new((x * 40 + n * 17) as u8, (y * 60) as u8, (n * 31) as u8))
                    .unwrap();
            model.match_foreground(&mut frame, 8, 1).unwrap();
        }
        for index in 0..model.len() {
            assert_eq!(model.total_count(index), frames as i64);
        }
    }

    #[test]
    fn decimation_never_empties_a_list() {
        let mut model = BackgroundModel::new(&solid(4, 4, Pixel::gray(30))).unwrap();
        for n in 0..20u8 {
            let mut frame = FrameBuffer::from_fn(4, 4, |x, y| Pixel::gray(((x + y) as u8).wrapping_mul(50).wrapping_add(n * 13)))
                .unwrap();
            model.match_foreground(&mut frame, 4, 3).unwrap();
            if n % 2 == 0 {
                model.decimate(3).unwrap();
            }
            for index in 0..model.len() {
                assert!(model.list_length(index) >= 1);
                assert!(model.cells(index).all(|cell| cell.count >= 1));
            }
        }
        for _ in 0..10 {
            model.decimate(8).unwrap();
        }
        for index in 0..model.len() {
            assert_eq!(model.list_length(index), 1);
        }
    }

    #[test]
    fn decimation_halves_mature_cells_and_prunes_weak_ones() {
        let mut model = BackgroundModel::new(&solid(1, 1, Pixel::gray(100))).unwrap();
        for _ in 0..7 {
            model.observe(0, Pixel::gray(100), 0, 2).unwrap();
        }
        // Mature second mode with 3 observations, then an immature third.
        model.observe(0, Pixel::gray(10), 0, 2).unwrap();
        model.observe(0, Pixel::gray(10), 0, 2).unwrap();
        model.observe(0, Pixel::gray(10), 0, 2).unwrap();
        model.observe(0, Pixel::gray(250), 0, 2).unwrap();
        assert_eq!(model.list_length(0), 3);

        let freed = model.decimate(2).unwrap();
        // 8 -> 4 kept, 3 -> 1 pruned, immature 1 pruned.
        assert_eq!(freed, 2);
        let cells: Vec<&Cell> = model.cells(0).collect();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].count, 4);
        assert_eq!(cells[0].mean(), Pixel::gray(100));
        assert_eq!(model.pool().live(), 1);
    }

    #[test]
    fn predominance_reports_dominant_cell_and_rate() {
        let mut model = BackgroundModel::new(&solid(1, 1, Pixel::gray(10))).unwrap();
        for _ in 0..2 {
            model.observe(0, Pixel::gray(10), 0, 1).unwrap();
        }
        model.observe(0, Pixel::gray(200), 0, 1).unwrap();
        let predominance = model.predominant_cell(0);
        assert_eq!(predominance.count, 3);
        assert_eq!(predominance.total, 4);
        assert_eq!(predominance.color, Pixel::gray(10));
        assert_eq!(predominance.rate(), 25);

        let background = model.background_frame().unwrap();
        assert_eq!(background.pixel(0), Pixel::gray(10));
    }

    #[test]
    fn process_background_writes_predominant_color() {
        let mut model = BackgroundModel::new(&solid(2, 1, Pixel::gray(40))).unwrap();
        let mut frame = solid(2, 1, Pixel::gray(40));
        model.process_background(&mut frame, 2, 2).unwrap();
        let mut frame = solid(2, 1, Pixel::gray(220));
        model.process_background(&mut frame, 2, 2).unwrap();
        assert_eq!(frame.pixel(0), Pixel::gray(40));
        assert_eq!(frame.pixel(1), Pixel::gray(40));
    }

    #[test]
    fn predominance_rate_is_painted_as_rainbow() {
        let mut model = BackgroundModel::new(&solid(2, 1, Pixel::gray(10))).unwrap();
        model.observe(0, Pixel::gray(10), 0, 1).unwrap();
        model.observe(0, Pixel::gray(10), 0, 1).unwrap();

        // Pixel 0 gains a second mode (counts 3 and 1), pixel 1 stays single-mode.
        let mut frame = FrameBuffer::from_fn(2, 1, |x, _| if x == 0 { Pixel::gray(200) } else { Pixel::gray(10) }).unwrap();
        let stats = model.process_predominance(&mut frame, 0, 1).unwrap();
        assert_eq!(stats.appended, 1);
        assert_eq!(stats.background, 1);
        assert_eq!(model.predominant_cell(0).rate(), 25);
        assert_eq!(model.predominant_cell(1).rate(), 0);

        assert_eq!(frame.pixel(0), rainbow(63));
        assert_eq!(frame.pixel(1), rainbow(0));
        let map = model.predominance_map().unwrap();
        assert_eq!(map, frame);
    }

    #[test]
    fn trim_sort_puts_later_cells_first_on_ties() {
        let mut model = BackgroundModel::new(&solid(1, 1, Pixel::gray(0))).unwrap();
        model.observe(0, Pixel::gray(100), 0, 1).unwrap();
        model.observe(0, Pixel::gray(200), 0, 1).unwrap();
        model.observe(0, Pixel::gray(200), 0, 1).unwrap();
        let means: Vec<Pixel> = model.cells(0).map(|cell| cell.mean()).collect();
        assert_eq!(means, vec![Pixel::gray(0), Pixel::gray(100), Pixel::gray(200)]);

        assert_eq!(model.trim_sort(0, None), 0);
        let means: Vec<Pixel> = model.cells(0).map(|cell| cell.mean()).collect();
        assert_eq!(means, vec![Pixel::gray(200), Pixel::gray(100), Pixel::gray(0)]);

        // A zero trim length still keeps the head.
        assert_eq!(model.trim_sort(0, Some(0)), 2);
        assert_eq!(model.list_length(0), 1);
        assert_eq!(model.pool().live(), 1);
        assert_eq!(model.pool().free_len(), model.pool().capacity() - 1);
    }

    #[test]
    fn trim_sort_orders_by_count_and_releases_the_rest() {
        let mut model = BackgroundModel::new(&solid(1, 1, Pixel::gray(0))).unwrap();
        model.observe(0, Pixel::gray(100), 0, 1).unwrap();
        model.observe(0, Pixel::gray(100), 0, 1).unwrap();
        model.observe(0, Pixel::gray(200), 0, 1).unwrap();
        model.observe(0, Pixel::gray(200), 0, 1).unwrap();
        model.observe(0, Pixel::gray(200), 0, 1).unwrap();
        let counts: Vec<i32> = model.cells(0).map(|cell| cell.count).collect();
        assert_eq!(counts, vec![1, 2, 3]);

        assert_eq!(model.trim_sort(0, None), 0);
        let counts: Vec<i32> = model.cells(0).map(|cell| cell.count).collect();
        assert_eq!(counts, vec![3, 2, 1]);

        assert_eq!(model.trim_sort(0, Some(2)), 1);
        assert_eq!(model.list_length(0), 2);
        assert_eq!(model.pool().live(), 2);
        assert_eq!(model.cells(0).next().unwrap().mean(), Pixel::gray(200));
    }

    #[test]
    fn demographics_bucket_lengths_and_predominance() {
        let mut model = BackgroundModel::new(&solid(2, 1, Pixel::gray(0))).unwrap();
        model.observe(1, Pixel::gray(0), 0, 1).unwrap();
        model.observe(1, Pixel::gray(100), 0, 1).unwrap();
        model.observe(1, Pixel::gray(100), 0, 1).unwrap();
        model.observe(1, Pixel::gray(100), 0, 1).unwrap();

        let demographics = model.demographics();
        assert_eq!(demographics.sets, 2);
        assert_eq!(demographics.length_histogram[0], 1);
        assert_eq!(demographics.length_histogram[1], 1);
        assert_eq!(demographics.average_length_tenths, 15);
        // 100% and 60% -> average 80.
        assert_eq!(demographics.average_predominance, 80);
        assert_eq!(demographics.predominance_histogram[10], 1);
        assert_eq!(demographics.predominance_histogram[2], 1);
        assert!(demographics.to_string().contains("length avg= 1.5"));
    }

    #[test]
    fn locked_lists_match_on_scalar_color() {
        let mut model = BackgroundModel::new(&solid(1, 1, Pixel::gray(50))).unwrap();
        model.observe(0, Pixel::gray(52), 5, 1).unwrap();
        assert!(model.cells(0).all(|cell| cell.is_ratiometric()));
        model.color_lock(0, true);
        assert!(model.is_locked(0));
        assert!(!model.cells(0).next().unwrap().is_ratiometric());

        let cell = *model.cells(0).next().unwrap();
        assert_eq!((cell.red, cell.count), (51, 0));
        assert!(model.scalar_match(0, Pixel::gray(54), 3));
        assert!(!model.scalar_match(0, Pixel::gray(90), 3));
        assert_eq!(model.cells(0).next().unwrap().count, -1);
    }

    #[test]
    fn rejects_mismatched_frames_and_zero_threshold() {
        let mut model = BackgroundModel::new(&solid(2, 2, Pixel::BLACK)).unwrap();
        let mut wrong = solid(3, 2, Pixel::BLACK);
        assert!(matches!(
            model.match_foreground(&mut wrong, 1, 1),
            Err(VisionError::FrameSizeMismatch { .. })
        ));
        let mut frame = solid(2, 2, Pixel::BLACK);
        assert!(matches!(
            model.match_foreground(&mut frame, 1, 0),
            Err(VisionError::InvalidParameter { name: "cth", .. })
        ));
    }
}
