pub mod image_helper {
    use anyhow::{Context, Result};
    use image::ImageEncoder;
    use mmm_vision::pipeline::FrameBuffer;
    use std::path::Path;

    /// Decodes any format `image` understands into a packed RGB frame.
    pub fn load_frame(path: &Path) -> Result<FrameBuffer> {
        let rgb = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        let frame = FrameBuffer::from_raw(width as usize, height as usize, rgb.into_raw())?;
        Ok(frame)
    }

    /// Writes a frame as an 8-bit RGB PNG.
    pub fn save_frame(path: &Path, frame: &FrameBuffer) -> Result<()> {
        let output = std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let encoder = image::codecs::png::PngEncoder::new(std::io::BufWriter::new(output));

        encoder
            .write_image(
                frame.as_bytes(),
                frame.width() as u32,
                frame.height() as u32,
                image::ExtendedColorType::Rgb8,
            )
            .with_context(|| format!("failed to encode {}", path.display()))?;

        Ok(())
    }
}
