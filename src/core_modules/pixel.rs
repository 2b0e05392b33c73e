// THEORY:
// The `Pixel` module is the most fundamental unit of the vision system. It is a
// "dumb" data container for a single packed RGB pixel (3 bytes, no alpha) plus
// the one single-pixel heuristic every later stage relies on: salience.
//
// A pixel is "salient" when any of its channels is non-zero. The background
// model blackens every pixel it explains, so after foreground separation the
// salient pixels are exactly the unexplained (foreground) ones, and the density
// rollers count nothing else.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;

    /// Number of bytes per packed pixel in every frame buffer.
    pub const CHANNELS: usize = 3;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    impl Pixel {
        pub const BLACK: Pixel = Pixel::new(0, 0, 0);
        pub const WHITE: Pixel = Pixel::new(255, 255, 255);

        pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        /// A pixel is salient when it has not been blacked out.
        #[inline]
        pub fn is_salient(&self) -> bool {
            (self.red | self.green | self.blue) != 0
        }

        /// Same grey level on all three channels.
        pub const fn gray(level: Channel) -> Self {
            Pixel::new(level, level, level)
        }

        /// Writes the three channels into a packed slice of exactly `CHANNELS` bytes.
        #[inline]
        pub fn write_to(&self, bytes: &mut [Byte]) {
            bytes[0] = self.red;
            bytes[1] = self.green;
            bytes[2] = self.blue;
        }
    }

    impl From<&[Byte]> for Pixel {
        /// Reads the first three bytes of a packed pixel slice.
        fn from(bytes: &[Byte]) -> Self {
            debug_assert!(bytes.len() >= CHANNELS, "cannot convert {} bytes into pixel", bytes.len());
            Pixel::new(bytes[0], bytes[1], bytes[2])
        }
    }

    impl From<Pixel> for [Byte; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            [pixel.red, pixel.green, pixel.blue]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn black_is_not_salient() {
        assert!(!Pixel::BLACK.is_salient());
        assert!(Pixel::new(0, 0, 1).is_salient());
        assert!(Pixel::new(1, 0, 0).is_salient());
    }

    #[test]
    fn converts_from_packed_bytes() {
        let bytes = [10u8, 20, 30, 40];
        let pixel = Pixel::from(&bytes[..]);
        assert_eq!(pixel, Pixel::new(10, 20, 30));

        let mut out = [0u8; CHANNELS];
        pixel.write_to(&mut out);
        assert_eq!(out, [10, 20, 30]);
    }
}
