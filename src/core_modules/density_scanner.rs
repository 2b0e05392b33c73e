// THEORY:
// The `DensityScanner` turns a foreground frame (background pixels blacked out)
// into a `DensityMap`: for every pixel, how many salient pixels lie in a small
// window around it. Blobs are later carved out of this map, so an isolated
// speck of noise scores low while a solid moving object scores high.
//
// Key architectural principles:
// 1.  **The wheel**: a sliding window along one axis is a bit register of
//     `WheelSize` bits plus a running sum. Each step pushes the incoming
//     pixel's salience in at the low end and drops the bit falling off the high
//     end, so the cost per pixel is constant whatever the window size.
// 2.  **Truncated edges**: positions outside the frame count as non-salient.
//     The map entry for position `p` is written once the wheel has consumed
//     `p + half`; the last `half` entries of every row or column are flushed by
//     pushing empty bits, giving a diminishing window at the boundary.
// 3.  **Separable area scan**: the 2D box sum is a vertical window over
//     horizontal window sums. Each row's horizontal wheel produces `Sums[row]`,
//     and a ring of the last `WheelSize` row sums slides down each column.
//     The 2D scan is therefore O(1) per pixel too, independent of window area.

use crate::core_modules::frame::{DensityMap, FrameBuffer};
use crate::error::{VisionError, VisionResult};
use log::trace;
use serde::{Deserialize, Serialize};

/// Width of the wheel register; no window may be wider.
pub const MAX_WHEEL_SIZE: usize = u64::BITS as usize;

/// Circular bit accumulator holding the salience of the last `size` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wheel {
    bits: u64,
    mask: u64,
    edge: u64,
    half: usize,
    sum: u32,
}

impl Wheel {
    pub fn new(size: usize) -> Self {
        debug_assert!((1..=MAX_WHEEL_SIZE).contains(&size), "wheel size {size} out of range");
        let mask = if size >= MAX_WHEEL_SIZE { u64::MAX } else { (1u64 << size) - 1 };
        Self {
            bits: 0,
            mask,
            edge: 1u64 << (size - 1),
            half: size >> 1,
            sum: 0,
        }
    }

    /// Rotates the wheel by one pixel and returns the new window sum.
    #[inline]
    pub fn push(&mut self, salient: bool) -> u32 {
        if self.bits & self.edge != 0 {
            self.sum -= 1;
        }
        self.bits = ((self.bits << 1) | salient as u64) & self.mask;
        self.sum += salient as u32;
        self.sum
    }

    /// Positions the window reaches past the one it is centered on.
    #[inline]
    pub fn half(&self) -> usize {
        self.half
    }

    #[inline]
    pub fn sum(&self) -> u32 {
        self.sum
    }

    pub fn reset(&mut self) {
        self.bits = 0;
        self.sum = 0;
    }
}

/// Which window shape a density scan uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityKind {
    /// `WheelSize` pixels along each row.
    Horizontal,
    /// `WheelSize` pixels along each column.
    Vertical,
    /// A `WheelSize` x `WheelSize` box.
    #[default]
    Area,
}

impl DensityKind {
    pub fn scan(self, frame: &FrameBuffer, wheel_size: usize) -> VisionResult<DensityMap> {
        match self {
            DensityKind::Horizontal => horizontal_density(frame, wheel_size),
            DensityKind::Vertical => vertical_density(frame, wheel_size),
            DensityKind::Area => area_density(frame, wheel_size),
        }
    }

    /// Largest value a scan of this kind can produce.
    pub fn max_value(self, wheel_size: usize) -> u32 {
        match self {
            DensityKind::Horizontal | DensityKind::Vertical => wheel_size as u32,
            DensityKind::Area => (wheel_size * wheel_size) as u32,
        }
    }

    /// Largest wheel size this kind accepts for a frame of the given shape.
    pub fn max_wheel_size(self, width: usize, height: usize) -> usize {
        let extent = match self {
            DensityKind::Horizontal => width,
            DensityKind::Vertical => height,
            DensityKind::Area => width.min(height),
        };
        extent.min(MAX_WHEEL_SIZE)
    }
}

fn validate_wheel_size(wheel_size: usize, extent: usize) -> VisionResult<()> {
    let max = extent.min(MAX_WHEEL_SIZE);
    if wheel_size == 0 || wheel_size > max {
        return Err(VisionError::InvalidWheelSize { wheel_size, max });
    }
    Ok(())
}

/// Runs one wheel along `len` positions, reading salience through `salient`
/// and writing each finished window sum through `write`.
#[inline]
fn roll_line<S, W>(wheel: &mut Wheel, len: usize, salient: S, mut write: W)
where
    S: Fn(usize) -> bool,
    W: FnMut(usize, u32),
{
    let half = wheel.half();
    wheel.reset();
    for cursor in 0..len + half {
        let sum = wheel.push(cursor < len && salient(cursor));
        if cursor >= half {
            write(cursor - half, sum);
        }
    }
}

/// Salient-pixel count over a `wheel_size` window along each row.
pub fn horizontal_density(frame: &FrameBuffer, wheel_size: usize) -> VisionResult<DensityMap> {
    validate_wheel_size(wheel_size, frame.width())?;
    let (width, height) = (frame.width(), frame.height());
    let mut map = DensityMap::new(width, height)?;
    let mut wheel = Wheel::new(wheel_size);

    for y in 0..height {
        let row = y * width;
        let values = &mut map.values_mut()[row..row + width];
        roll_line(&mut wheel, width, |x| frame.is_salient(row + x), |x, sum| values[x] = sum);
    }
    trace!("horizontal density scan {}x{} wheel {}", width, height, wheel_size);
    Ok(map)
}

/// Salient-pixel count over a `wheel_size` window along each column.
pub fn vertical_density(frame: &FrameBuffer, wheel_size: usize) -> VisionResult<DensityMap> {
    validate_wheel_size(wheel_size, frame.height())?;
    let (width, height) = (frame.width(), frame.height());
    let mut map = DensityMap::new(width, height)?;
    let mut wheel = Wheel::new(wheel_size);

    for x in 0..width {
        let values = map.values_mut();
        roll_line(
            &mut wheel,
            height,
            |y| frame.is_salient(y * width + x),
            |y, sum| values[y * width + x] = sum,
        );
    }
    trace!("vertical density scan {}x{} wheel {}", width, height, wheel_size);
    Ok(map)
}

/// Salient-pixel count over a `wheel_size` x `wheel_size` box.
pub fn area_density(frame: &FrameBuffer, wheel_size: usize) -> VisionResult<DensityMap> {
    validate_wheel_size(wheel_size, frame.width().min(frame.height()))?;
    let (width, height) = (frame.width(), frame.height());
    let half = wheel_size >> 1;
    let mut map = DensityMap::new(width, height)?;

    // Sums[row]: one horizontal wheel per row, stepped together as the sweep
    // moves right. A vertical ring of the last `wheel_size` row sums then runs
    // down each finished column.
    let mut wheels = vec![Wheel::new(wheel_size); height];
    let mut sums = vec![0u32; height];
    let mut ring = vec![0u32; wheel_size];
    for cursor in 0..width + half {
        for (y, wheel) in wheels.iter_mut().enumerate() {
            sums[y] = wheel.push(cursor < width && frame.is_salient(y * width + cursor));
        }
        if cursor < half {
            continue;
        }
        let x = cursor - half;
        ring.fill(0);
        let mut total = 0u32;
        for row in 0..height + half {
            let incoming = if row < height { sums[row] } else { 0 };
            let slot = row % wheel_size;
            total = total - ring[slot] + incoming;
            ring[slot] = incoming;
            if row >= half {
                map.set(x, row - half, total);
            }
        }
    }
    trace!("area density scan {}x{} wheel {}", width, height, wheel_size);
    Ok(map)
}
