// THEORY:
// The `BlobPool` is the arena behind the blob extractor. Blobs are created,
// merged and discarded at a high rate during a single raster scan, so their
// working records live in a recycled arena and are addressed by small handles.
//
// Key architectural principles:
// 1.  **Generational handles**: a `BlobHandle` is an index plus the generation
//     of the slot it was issued for. Releasing a slot bumps its generation, so a
//     handle that outlives its record is detected on the next dereference
//     instead of silently reading whatever blob reused the slot.
// 2.  **Forwarding stubs**: merging never relabels pixels. The absorbed record
//     keeps a `forward` link to its absorber and is frozen; `resolve` follows the
//     links to the root and compresses the path on the way back.
// 3.  **Deferred reclamation**: a stub carries the row at which it may be
//     released (`expire`). The extractor, not the pool, decides when that is.
// 4.  **Block growth**: the arena grows a fixed block at a time via
//     `try_reserve`; failure is reported as `VisionError::PoolExhausted`.

use crate::core_modules::blob::{Blob, Point};
use crate::error::{VisionError, VisionResult};
use log::trace;

/// Number of blob records added to the arena each time it runs dry.
pub const BLOB_BLOCK_SIZE: usize = 20;

/// Generation-checked reference to a record in a `BlobPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobHandle {
    index: u32,
    generation: u32,
}

impl BlobHandle {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Working state of a blob during extraction.
#[derive(Debug, Clone, Default)]
pub struct BlobRecord {
    pub area: usize,
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
    pub x_sum: u64,
    pub y_sum: u64,
    pub registration: Point,
    /// Final ID, assigned once the record is known to be a root.
    pub id: u32,
    /// The blob that absorbed this one. Geometry is frozen once set.
    pub forward: Option<BlobHandle>,
    /// Row at whose end a forwarding stub may be released.
    pub expire: Option<usize>,
}

impl BlobRecord {
    fn anchored(x: u32, y: u32) -> Self {
        Self {
            x_min: x,
            y_min: y,
            x_max: x,
            y_max: y,
            registration: Point::new(x, y),
            ..Self::default()
        }
    }

    pub fn is_root(&self) -> bool {
        self.forward.is_none()
    }

    /// Adds one pixel to the region.
    #[inline]
    pub fn record(&mut self, x: u32, y: u32) {
        debug_assert!(self.is_root(), "recording into a forwarded blob");
        self.x_min = self.x_min.min(x);
        self.y_min = self.y_min.min(y);
        self.x_max = self.x_max.max(x);
        self.y_max = self.y_max.max(y);
        self.x_sum += x as u64;
        self.y_sum += y as u64;
        self.area += 1;
    }

    /// Folds another root's geometry into this one. The registration point
    /// becomes the smaller of the two in `(y, x)` order.
    fn absorb(&mut self, other: &BlobRecord) {
        debug_assert!(self.is_root() && other.is_root(), "merging a forwarded blob");
        self.x_min = self.x_min.min(other.x_min);
        self.y_min = self.y_min.min(other.y_min);
        self.x_max = self.x_max.max(other.x_max);
        self.y_max = self.y_max.max(other.y_max);
        self.x_sum += other.x_sum;
        self.y_sum += other.y_sum;
        self.area += other.area;
        if (other.registration.y, other.registration.x) < (self.registration.y, self.registration.x) {
            self.registration = other.registration;
        }
    }

    /// Snapshot of a root record as an output blob.
    pub fn to_blob(&self) -> Blob {
        debug_assert!(self.is_root(), "reading geometry of a forwarded blob");
        Blob {
            id: self.id,
            bounding_box: (Point::new(self.x_min, self.y_min), Point::new(self.x_max, self.y_max)),
            area: self.area,
            x_sum: self.x_sum,
            y_sum: self.y_sum,
            registration: self.registration,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    record: BlobRecord,
    generation: u32,
    in_use: bool,
}

/// Arena and free list for `BlobRecord`s.
#[derive(Debug, Default)]
pub struct BlobPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl BlobPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh record seeded at `(x, y)` with zero area.
    pub fn allocate(&mut self, x: u32, y: u32) -> VisionResult<BlobHandle> {
        if self.free.is_empty() {
            self.grow()?;
        }
        let index = self.free.pop().ok_or(VisionError::PoolExhausted {
            pool: "blob",
            requested: BLOB_BLOCK_SIZE,
        })?;
        let slot = &mut self.slots[index as usize];
        slot.record = BlobRecord::anchored(x, y);
        slot.in_use = true;
        self.live += 1;
        Ok(BlobHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Returns a record to the pool, invalidating every handle to it.
    pub fn release(&mut self, handle: BlobHandle) {
        debug_assert!(self.is_live(handle), "release of stale blob handle {handle:?}");
        let slot = &mut self.slots[handle.index()];
        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
    }

    /// Whether `handle` still refers to the record it was issued for.
    pub fn is_live(&self, handle: BlobHandle) -> bool {
        self.slots
            .get(handle.index())
            .is_some_and(|slot| slot.in_use && slot.generation == handle.generation)
    }

    #[inline]
    pub fn get(&self, handle: BlobHandle) -> &BlobRecord {
        debug_assert!(self.is_live(handle), "read through stale blob handle {handle:?}");
        &self.slots[handle.index()].record
    }

    #[inline]
    pub fn get_mut(&mut self, handle: BlobHandle) -> &mut BlobRecord {
        debug_assert!(self.is_live(handle), "write through stale blob handle {handle:?}");
        &mut self.slots[handle.index()].record
    }

    /// Follows forwarding links to the root and points every visited stub
    /// directly at it.
    pub fn resolve(&mut self, handle: BlobHandle) -> BlobHandle {
        let mut root = handle;
        while let Some(next) = self.get(root).forward {
            root = next;
        }
        let mut current = handle;
        while current != root {
            let record = self.get_mut(current);
            let next = record.forward.unwrap_or(root);
            record.forward = Some(root);
            current = next;
        }
        root
    }

    /// Folds root `from` into root `into`. `from` becomes a stub that may be
    /// released at the end of row `expire`.
    pub fn merge(&mut self, into: BlobHandle, from: BlobHandle, expire: usize) {
        debug_assert_ne!(into, from, "merging a blob into itself");
        let absorbed = self.get(from).clone();
        self.get_mut(into).absorb(&absorbed);
        let stub = self.get_mut(from);
        stub.forward = Some(into);
        stub.expire = Some(expire);
    }

    /// Records currently issued.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Records waiting for reuse.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn grow(&mut self) -> VisionResult<()> {
        let exhausted = VisionError::PoolExhausted {
            pool: "blob",
            requested: BLOB_BLOCK_SIZE,
        };
        let start = self.slots.len();
        if start + BLOB_BLOCK_SIZE > u32::MAX as usize {
            return Err(exhausted);
        }
        self.slots.try_reserve(BLOB_BLOCK_SIZE).map_err(|_| exhausted.clone())?;
        self.free.try_reserve(BLOB_BLOCK_SIZE).map_err(|_| exhausted)?;
        self.slots.extend((0..BLOB_BLOCK_SIZE).map(|_| Slot::default()));
        // Lowest index on top so fresh blocks hand out slots in order.
        self.free.extend((start..start + BLOB_BLOCK_SIZE).rev().map(|i| i as u32));
        trace!("blob pool grew to {} records", self.slots.len());
        Ok(())
    }
}
