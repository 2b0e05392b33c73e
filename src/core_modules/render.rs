// THEORY:
// Elementwise transforms from integer maps to viewable frames. None of these
// carry state or feed back into the engine; they exist so a density map, a
// blob ID map or a model statistic can be inspected as an ordinary image.

use crate::core_modules::frame::{DensityMap, FrameBuffer};
use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{VisionError, VisionResult};

/// Sixteen-color lookup used for painted maps, from black up to white.
pub const PALETTE: [Pixel; 16] = [
    Pixel::new(0, 0, 0),
    Pixel::new(0, 0, 128),
    Pixel::new(128, 0, 0),
    Pixel::new(0, 128, 0),
    Pixel::new(128, 0, 128),
    Pixel::new(128, 128, 0),
    Pixel::new(0, 128, 128),
    Pixel::new(128, 128, 128),
    Pixel::new(0, 0, 255),
    Pixel::new(192, 192, 192),
    Pixel::new(255, 0, 255),
    Pixel::new(0, 255, 255),
    Pixel::new(0, 255, 0),
    Pixel::new(255, 255, 0),
    Pixel::new(255, 0, 0),
    Pixel::new(255, 255, 255),
];

fn check_max(max_count: u32) -> VisionResult<()> {
    if max_count == 0 {
        return Err(VisionError::InvalidParameter {
            name: "max_count",
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn paint_with<F>(map: &DensityMap, frame: &mut FrameBuffer, mut color: F) -> VisionResult<()>
where
    F: FnMut(u32) -> Pixel,
{
    frame.ensure_same_shape(map.width(), map.height())?;
    for (index, &value) in map.values().iter().enumerate() {
        frame.set_pixel(index, color(value));
    }
    Ok(())
}

/// Scales `map` onto the palette; `max_count` maps to white.
pub fn paint_frame(frame: &mut FrameBuffer, max_count: u32, map: &DensityMap) -> VisionResult<()> {
    check_max(max_count)?;
    paint_with(map, frame, |value| {
        let slot = (value.min(max_count) as u64 * 15 / max_count as u64) as usize;
        PALETTE[slot]
    })
}

/// Cycles values through the first fifteen palette entries. Suited to ID maps,
/// where neighbouring IDs should look different.
pub fn paint_frame_mod(frame: &mut FrameBuffer, map: &DensityMap) -> VisionResult<()> {
    paint_with(map, frame, |value| PALETTE[(value % 15) as usize])
}

/// Linear grey ramp with `max_count` at full white.
pub fn grayscale_frame(frame: &mut FrameBuffer, max_count: u32, map: &DensityMap) -> VisionResult<()> {
    check_max(max_count)?;
    paint_with(map, frame, |value| {
        Pixel::gray((value.min(max_count) as u64 * 255 / max_count as u64) as u8)
    })
}

/// White where `value >= threshold`, black elsewhere.
pub fn threshold_frame(frame: &mut FrameBuffer, threshold: u32, map: &DensityMap) -> VisionResult<()> {
    paint_with(map, frame, |value| if value >= threshold { Pixel::WHITE } else { Pixel::BLACK })
}

/// Blue through cyan, green and yellow to red as `x` goes from 0 to 255.
pub fn rainbow(x: u8) -> Pixel {
    let step = (x % 64) << 2;
    match x {
        0..=63 => Pixel::new(0, x << 2, 255),
        64..=127 => Pixel::new(0, 255, 255 - step),
        128..=191 => Pixel::new(step, 255, 0),
        _ => Pixel::new(255, 255 - step, 0),
    }
}

/// `rainbow(x)` dimmed by `y / 256`.
pub fn rainbow_mod(x: u8, y: u8) -> Pixel {
    let hue = rainbow(x);
    let scale = |channel: u8| ((channel as u16 * y as u16) >> 8) as u8;
    Pixel::new(scale(hue.red), scale(hue.green), scale(hue.blue))
}
