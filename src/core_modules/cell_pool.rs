// THEORY:
// The `CellPool` is the arena that owns every color cluster ("cell") of the
// background model. Per-pixel cell lists are singly linked chains of integer
// handles into this arena rather than heap nodes, which keeps the whole model
// in one contiguous allocation and makes recycling a cell an O(1) push onto a
// free list.
//
// Key architectural principles:
// 1.  **Explicit ownership**: the pool is an ordinary value owned by the
//     `BackgroundModel`. There is no process-wide free list; dropping the model
//     drops every cell it ever allocated.
// 2.  **Block growth**: when the free list runs dry the arena grows by a fixed
//     block of cells, threaded onto the free list in index order. Growth uses
//     `try_reserve`, so running out of memory surfaces as
//     `VisionError::PoolExhausted` instead of aborting.
// 3.  **Stable handles**: a `CellId` stays valid until that exact cell is
//     released. Releasing one cell never moves or invalidates another.
// 4.  **Shared link field**: a live cell's `next` links its pixel list; a free
//     cell's `next` links the free list. A cell is on exactly one of them.

use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{VisionError, VisionResult};
use log::trace;

/// Number of cells added to the arena each time the free list runs dry.
pub const CELL_BLOCK_SIZE: usize = 100;

/// Handle to a cell inside a `CellPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

impl CellId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One color cluster.
///
/// While ratiometric (`count > 0`) the channels hold running sums and the cluster
/// color is `sum / count`. After a color lock the channels hold the scalar color
/// itself and `count` is zero or negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub red: i32,
    pub green: i32,
    pub blue: i32,
    pub count: i32,
    next: Option<CellId>,
}

impl Cell {
    fn seeded(pixel: Pixel) -> Self {
        Self {
            red: pixel.red as i32,
            green: pixel.green as i32,
            blue: pixel.blue as i32,
            count: 1,
            next: None,
        }
    }

    /// Next cell in the owning list.
    pub fn next(&self) -> Option<CellId> {
        self.next
    }

    pub fn is_ratiometric(&self) -> bool {
        self.count > 0
    }

    /// Integer-truncated mean color for a ratiometric cell, or the locked scalar color.
    pub fn mean(&self) -> Pixel {
        if self.is_ratiometric() {
            Pixel::new(
                clamp_channel(self.red / self.count),
                clamp_channel(self.green / self.count),
                clamp_channel(self.blue / self.count),
            )
        } else {
            Pixel::new(
                clamp_channel(self.red),
                clamp_channel(self.green),
                clamp_channel(self.blue),
            )
        }
    }

    /// Ratiometric match: every channel within `epsilon` of the truncated mean.
    #[inline]
    pub fn matches(&self, pixel: Pixel, epsilon: i32) -> bool {
        debug_assert!(self.count > 0, "ratiometric match against a locked cell");
        (pixel.red as i32 - self.red / self.count).abs() <= epsilon
            && (pixel.green as i32 - self.green / self.count).abs() <= epsilon
            && (pixel.blue as i32 - self.blue / self.count).abs() <= epsilon
    }

    /// Scalar match against a locked cell's stored color.
    #[inline]
    pub fn matches_scalar(&self, pixel: Pixel, epsilon: i32) -> bool {
        (pixel.red as i32 - self.red).abs() <= epsilon
            && (pixel.green as i32 - self.green).abs() <= epsilon
            && (pixel.blue as i32 - self.blue).abs() <= epsilon
    }

    /// Folds one observation into the running sums.
    #[inline]
    pub fn absorb(&mut self, pixel: Pixel) {
        self.red += pixel.red as i32;
        self.green += pixel.green as i32;
        self.blue += pixel.blue as i32;
        self.count += 1;
    }

    /// Overwrites the cluster with a single fresh observation.
    #[inline]
    pub fn reset(&mut self, pixel: Pixel) {
        self.red = pixel.red as i32;
        self.green = pixel.green as i32;
        self.blue = pixel.blue as i32;
        self.count = 1;
    }

    /// Halves sums and count (arithmetic shift, floor division).
    #[inline]
    pub fn halve(&mut self) {
        self.red >>= 1;
        self.green >>= 1;
        self.blue >>= 1;
        self.count >>= 1;
    }
}

fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Arena and free list for `Cell`s.
#[derive(Debug, Default)]
pub struct CellPool {
    cells: Vec<Cell>,
    in_use: Vec<bool>,
    free: Option<CellId>,
    live: usize,
}

impl CellPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes the arena for at least `cells` records.
    pub fn with_capacity(cells: usize) -> VisionResult<Self> {
        let mut pool = Self::new();
        while pool.capacity() < cells {
            pool.grow()?;
        }
        Ok(pool)
    }

    /// Takes a cell off the free list (growing the arena if needed) and seeds it
    /// with one observation of `pixel`.
    pub fn allocate(&mut self, pixel: Pixel) -> VisionResult<CellId> {
        if self.free.is_none() {
            self.grow()?;
        }
        let id = self.free.ok_or(VisionError::PoolExhausted {
            pool: "cell",
            requested: CELL_BLOCK_SIZE,
        })?;
        self.free = self.cells[id.index()].next;
        self.cells[id.index()] = Cell::seeded(pixel);
        self.in_use[id.index()] = true;
        self.live += 1;
        Ok(id)
    }

    /// Returns a cell to the free list and hands back the list link it held.
    pub fn release(&mut self, id: CellId) -> Option<CellId> {
        debug_assert!(self.in_use[id.index()], "double release of cell {}", id.index());
        let next = self.cells[id.index()].next;
        self.cells[id.index()].next = self.free;
        self.free = Some(id);
        self.in_use[id.index()] = false;
        self.live -= 1;
        next
    }

    /// Releases a whole chain starting at `head`, returning how many cells were freed.
    pub fn release_list(&mut self, head: Option<CellId>) -> usize {
        let mut freed = 0;
        let mut current = head;
        while let Some(id) = current {
            current = self.release(id);
            freed += 1;
        }
        freed
    }

    #[inline]
    pub fn get(&self, id: CellId) -> &Cell {
        debug_assert!(self.in_use[id.index()], "read of released cell {}", id.index());
        &self.cells[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: CellId) -> &mut Cell {
        debug_assert!(self.in_use[id.index()], "write to released cell {}", id.index());
        &mut self.cells[id.index()]
    }

    #[inline]
    pub fn set_next(&mut self, id: CellId, next: Option<CellId>) {
        self.get_mut(id).next = next;
    }

    /// Walks a pixel's list from its head.
    pub fn iter_list(&self, head: CellId) -> CellIter<'_> {
        CellIter {
            pool: self,
            current: Some(head),
        }
    }

    /// Cells currently linked into some list.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Cells waiting on the free list.
    pub fn free_len(&self) -> usize {
        self.cells.len() - self.live
    }

    /// Total cells ever carved out of the arena.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn grow(&mut self) -> VisionResult<()> {
        let exhausted = VisionError::PoolExhausted {
            pool: "cell",
            requested: CELL_BLOCK_SIZE,
        };
        let start = self.cells.len();
        if start + CELL_BLOCK_SIZE > u32::MAX as usize {
            return Err(exhausted);
        }
        self.cells.try_reserve(CELL_BLOCK_SIZE).map_err(|_| exhausted.clone())?;
        self.in_use.try_reserve(CELL_BLOCK_SIZE).map_err(|_| exhausted)?;

        // Thread the new block onto the free list in index order.
        for offset in 0..CELL_BLOCK_SIZE {
            let index = start + offset;
            let next = if offset + 1 < CELL_BLOCK_SIZE {
                Some(CellId((index + 1) as u32))
            } else {
                self.free
            };
            self.cells.push(Cell { next, ..Cell::default() });
            self.in_use.push(false);
        }
        self.free = Some(CellId(start as u32));
        trace!("cell pool grew to {} records", self.cells.len());
        Ok(())
    }
}

/// Iterator over one pixel's cell list.
pub struct CellIter<'a> {
    pool: &'a CellPool,
    current: Option<CellId>,
}

impl<'a> Iterator for CellIter<'a> {
    type Item = (CellId, &'a Cell);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let cell = self.pool.get(id);
        self.current = cell.next;
        Some((id, cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_in_blocks_and_recycles() {
        let mut pool = CellPool::new();
        let a = pool.allocate(Pixel::new(1, 2, 3)).unwrap();
        assert_eq!(pool.capacity(), CELL_BLOCK_SIZE);
        assert_eq!(pool.live(), 1);
        assert_eq!(pool.get(a).count, 1);
        assert_eq!(pool.get(a).mean(), Pixel::new(1, 2, 3));

        pool.release(a);
        assert_eq!(pool.live(), 0);
        let b = pool.allocate(Pixel::new(9, 9, 9)).unwrap();
        assert_eq!(a, b, "released cell is reused first");
        assert_eq!(pool.get(b).red, 9);
    }

    #[test]
    fn release_does_not_disturb_other_handles() {
        let mut pool = CellPool::new();
        let ids: Vec<CellId> = (0..CELL_BLOCK_SIZE + 5)
            .map(|i| pool.allocate(Pixel::new(i as u8, 0, 0)).unwrap())
            .collect();
        assert_eq!(pool.capacity(), 2 * CELL_BLOCK_SIZE);

        pool.release(ids[3]);
        for (i, id) in ids.iter().enumerate().filter(|(i, _)| *i != 3) {
            assert_eq!(pool.get(*id).red, i as u8 as i32);
        }
    }

    #[test]
    fn release_list_frees_whole_chain() {
        let mut pool = CellPool::new();
        let head = pool.allocate(Pixel::BLACK).unwrap();
        let second = pool.allocate(Pixel::WHITE).unwrap();
        pool.set_next(head, Some(second));
        assert_eq!(pool.iter_list(head).count(), 2);

        assert_eq!(pool.release_list(Some(head)), 2);
        assert_eq!(pool.live(), 0);
        assert_eq!(pool.free_len(), CELL_BLOCK_SIZE);
    }

    #[test]
    fn matching_uses_truncated_mean() {
        let mut cell = Cell::seeded(Pixel::new(10, 10, 10));
        cell.absorb(Pixel::new(13, 13, 13));
        // sums 23 / 2 -> mean 11 after truncation
        assert_eq!(cell.mean(), Pixel::new(11, 11, 11));
        assert!(cell.matches(Pixel::new(11, 11, 11), 0));
        assert!(!cell.matches(Pixel::new(12, 11, 11), 0));
        assert!(cell.matches(Pixel::new(12, 11, 11), 1));
    }
}
