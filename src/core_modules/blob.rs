// THEORY:
// The `Blob` module holds the output record of the spatial grouping layer. A
// `Blob` is one maximal 4-connected region of the density map whose values meet
// the blob threshold, summarized by its area, bounding box, center of mass and
// registration point (the upper-left-most pixel it was seeded from).
//
// Like `Pixel`, a `Blob` is a "dumb" data container: the extractor builds it,
// and nothing about it survives into the next frame. Its `id` is only meaningful
// together with the ID map produced by the same extraction.

/// A 2D coordinate on the frame grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Point { x, y }
    }
}

/// A single connected region of dense foreground detected in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Sequential identifier, starting at 1, valid for the current frame only.
    pub id: u32,
    /// Top-left and bottom-right corners, both inclusive.
    pub bounding_box: (Point, Point),
    /// Number of pixels in the region.
    pub area: usize,
    /// Sum of the x coordinates of every pixel in the region.
    pub x_sum: u64,
    /// Sum of the y coordinates of every pixel in the region.
    pub y_sum: u64,
    /// Upper-left-most seed point among the blobs merged into this one.
    pub registration: Point,
}

impl Blob {
    /// Unweighted centroid of the region.
    pub fn center_of_mass(&self) -> (f64, f64) {
        if self.area == 0 {
            return (0.0, 0.0);
        }
        (
            self.x_sum as f64 / self.area as f64,
            self.y_sum as f64 / self.area as f64,
        )
    }

    /// Centroid truncated to the pixel grid.
    pub fn integer_center(&self) -> Point {
        if self.area == 0 {
            return self.registration;
        }
        Point::new(
            (self.x_sum / self.area as u64) as u32,
            (self.y_sum / self.area as u64) as u32,
        )
    }

    pub fn width(&self) -> u32 {
        self.bounding_box.1.x - self.bounding_box.0.x + 1
    }

    pub fn height(&self) -> u32 {
        self.bounding_box.1.y - self.bounding_box.0.y + 1
    }
}
