//! Rendered images.

use dr_core::{Error, Graph, Result, Value};

/// Number of colour channels per pixel.
pub const CHANNELS: usize = 3;

/// RGB image in linear colour space.
///
/// Pixels are stored row-major in a single [`Value`] of length
/// `width * height * 3`, so a render over tracked parameters yields a tracked
/// image that losses and gradient queries can consume directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    pub pixels: Value,
}

impl Image {
    pub fn new(width: usize, height: usize, pixels: Value) -> Result<Self> {
        let expected = width * height * CHANNELS;
        if pixels.len() != expected {
            return Err(Error::shape_mismatch("image pixels", expected, pixels.len()));
        }
        Ok(Image {
            width,
            height,
            pixels,
        })
    }

    /// Solid black image.
    pub fn black(width: usize, height: usize) -> Self {
        Image {
            width,
            height,
            pixels: Value::zeros(width * height * CHANNELS),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// RGB triple at column `x`, row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> [f64; 3] {
        let i = (y * self.width + x) * CHANNELS;
        let p = &self.pixels.data()[i..i + CHANNELS];
        [p[0], p[1], p[2]]
    }

    /// One colour channel as a `width * height` value. Tracked images yield a
    /// tracked channel.
    pub fn channel(&self, c: usize) -> Result<Value> {
        if c >= CHANNELS {
            return Err(Error::shape_mismatch("image channel", CHANNELS, c + 1));
        }
        let indices: Vec<usize> = (0..self.pixel_count()).map(|p| p * CHANNELS + c).collect();
        self.pixels.gather(&indices)
    }

    /// Largest absolute pixel value over all channels.
    pub fn max_abs(&self) -> f64 {
        self.pixels.data().iter().fold(0.0, |m, x| m.max(x.abs()))
    }

    /// Mean of every pixel and channel.
    pub fn mean(&self) -> f64 {
        self.pixels.data().iter().sum::<f64>() / self.pixels.len().max(1) as f64
    }

    /// The gradient image `graph` holds for these pixels.
    pub fn grad(&self, graph: &Graph) -> Result<Image> {
        Image::new(self.width, self.height, graph.grad(&self.pixels)?)
    }

    /// Untracked copy of the image.
    pub fn detach(&self) -> Image {
        Image {
            width: self.width,
            height: self.height,
            pixels: self.pixels.detach(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image() -> Image {
        // 2x1 image: (0.1, -0.4, 0.2), (0.3, 0.0, -0.1)
        Image::new(2, 1, Value::from_vec(vec![0.1, -0.4, 0.2, 0.3, 0.0, -0.1])).unwrap()
    }

    #[test]
    fn test_new_checks_length() {
        assert!(matches!(
            Image::new(2, 2, Value::zeros(3)),
            Err(Error::ShapeMismatch { expected: 12, found: 3, .. })
        ));
    }

    #[test]
    fn test_channel_and_pixel() {
        let img = gradient_image();
        assert_eq!(img.channel(1).unwrap().data(), &[-0.4, 0.0]);
        assert_eq!(img.pixel(1, 0), [0.3, 0.0, -0.1]);
        assert!(img.channel(3).is_err());
    }

    #[test]
    fn test_max_abs() {
        assert!((gradient_image().max_abs() - 0.4).abs() < 1e-12);
        assert_eq!(Image::black(4, 4).max_abs(), 0.0);
    }
}
