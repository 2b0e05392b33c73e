// THEORY:
// The `frame` module holds the two rectangular buffers that travel between the
// stages of the engine:
//
// 1.  **FrameBuffer**: a row-major sequence of packed RGB triples. The background
//     model reads it and blacks out the pixels it explains; the renderers paint
//     into it. It owns its bytes and knows its own dimensions, so every stage
//     can validate shape once at its boundary instead of trusting index math.
// 2.  **DensityMap**: one unsigned integer per pixel, produced by the density
//     rollers and consumed by the blob extractor and the renderers. It is
//     allocated per frame and fully overwritten by every scan.
//
// Both are "dumb" data containers in the same sense as `Pixel`: they carry data
// and shape, and leave all analysis to the modules that consume them.

use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
use crate::error::{VisionError, VisionResult};

/// Rejects zero-area shapes; every buffer in the engine has at least one pixel.
pub(crate) fn validate_dimensions(width: usize, height: usize) -> VisionResult<()> {
    if width == 0 || height == 0 || width.checked_mul(height).is_none() {
        return Err(VisionError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// A packed RGB image, 3 bytes per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocates an all-black frame.
    pub fn new(width: usize, height: usize) -> VisionResult<Self> {
        validate_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            data: vec![0; width * height * CHANNELS],
        })
    }

    /// Wraps an existing packed RGB buffer, checking that its length matches the shape.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> VisionResult<Self> {
        validate_dimensions(width, height)?;
        let expected = width * height * CHANNELS;
        if data.len() != expected {
            return Err(VisionError::BufferSizeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Builds a frame by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> VisionResult<Self>
    where
        F: FnMut(usize, usize) -> Pixel,
    {
        let mut frame = Self::new(width, height)?;
        for y in 0..height {
            for x in 0..width {
                frame.set_pixel_at(x, y, f(x, y));
            }
        }
        Ok(frame)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixels (not bytes).
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at a flat row-major index.
    #[inline]
    pub fn pixel(&self, index: usize) -> Pixel {
        Pixel::from(&self.data[index * CHANNELS..index * CHANNELS + CHANNELS])
    }

    #[inline]
    pub fn pixel_at(&self, x: usize, y: usize) -> Pixel {
        self.pixel(y * self.width + x)
    }

    #[inline]
    pub fn set_pixel(&mut self, index: usize, pixel: Pixel) {
        pixel.write_to(&mut self.data[index * CHANNELS..index * CHANNELS + CHANNELS]);
    }

    #[inline]
    pub fn set_pixel_at(&mut self, x: usize, y: usize, pixel: Pixel) {
        let index = y * self.width + x;
        self.set_pixel(index, pixel);
    }

    /// Salience test at a flat index without materializing a `Pixel`.
    #[inline]
    pub fn is_salient(&self, index: usize) -> bool {
        let offset = index * CHANNELS;
        (self.data[offset] | self.data[offset + 1] | self.data[offset + 2]) != 0
    }

    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.data.chunks_exact(CHANNELS).map(Pixel::from)
    }

    /// Number of salient (non-black) pixels in the frame.
    pub fn salient_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_salient(i)).count()
    }

    /// Blacks out the whole frame.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Copies `src` into this frame starting at pixel row `row_offset`, clipping
    /// whatever does not fit. Widths must match.
    pub fn copy_rows_from(&mut self, src: &FrameBuffer, row_offset: usize) -> VisionResult<()> {
        if src.width != self.width {
            return Err(VisionError::FrameSizeMismatch {
                width: self.width,
                height: self.height,
                got_width: src.width,
                got_height: src.height,
            });
        }
        if row_offset >= self.height {
            return Ok(());
        }
        let rows = src.height.min(self.height - row_offset);
        let row_bytes = self.width * CHANNELS;
        let start = row_offset * row_bytes;
        self.data[start..start + rows * row_bytes].copy_from_slice(&src.data[..rows * row_bytes]);
        Ok(())
    }

    pub(crate) fn ensure_same_shape(&self, width: usize, height: usize) -> VisionResult<()> {
        if self.width != width || self.height != height {
            return Err(VisionError::FrameSizeMismatch {
                width,
                height,
                got_width: self.width,
                got_height: self.height,
            });
        }
        Ok(())
    }
}

/// Per-pixel integer map produced by the density rollers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityMap {
    width: usize,
    height: usize,
    values: Vec<u32>,
}

impl DensityMap {
    /// Allocates an all-zero map.
    pub fn new(width: usize, height: usize) -> VisionResult<Self> {
        validate_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            values: vec![0; width * height],
        })
    }

    /// Wraps existing row-major values, checking that their count matches the shape.
    pub fn from_values(width: usize, height: usize, values: Vec<u32>) -> VisionResult<Self> {
        validate_dimensions(width, height)?;
        if values.len() != width * height {
            return Err(VisionError::BufferSizeMismatch {
                expected: width * height,
                got: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [u32] {
        &mut self.values
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.values[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u32) {
        self.values[y * self.width + x] = value;
    }

    /// Largest value in the map.
    pub fn max_value(&self) -> u32 {
        self.values.iter().copied().max().unwrap_or(0)
    }

    /// Number of positions whose value meets `threshold`.
    pub fn count_at_least(&self, threshold: u32) -> usize {
        self.values.iter().filter(|&&v| v >= threshold).count()
    }
}
