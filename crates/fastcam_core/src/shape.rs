//! Shape metadata for activations and saliency maps.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SaliencyError};

/// Shape metadata for a captured layer tensor.
///
/// Follows the convention `(B, C, H, W)`.
///
/// # Example
///
/// ```rust
/// use fastcam_core::ActivationShape;
///
/// let shape = ActivationShape::new(1, 64, 56, 56);
/// assert_eq!(shape.channels(), 64);
/// assert_eq!(shape.map_shape().as_array(), [1, 56, 56]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationShape {
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl ActivationShape {
    /// Create a new shape.
    #[must_use]
    pub const fn new(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Create a shape from a slice of dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 4 elements.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            [b, c, h, w] => Ok(Self::new(*b, *c, *h, *w)),
            _ => Err(SaliencyError::InvalidShape {
                expected: "4 dimensions (B, C, H, W)".to_string(),
                got: format!("{} dimensions {:?}", dims.len(), dims),
            }),
        }
    }

    /// Get the batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Get the number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Get the spatial height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Get the spatial width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of spatial locations per channel.
    #[must_use]
    pub const fn spatial(&self) -> usize {
        self.height * self.width
    }

    /// Convert to an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }

    /// Shape of the map left after reducing the channel axis.
    #[must_use]
    pub const fn map_shape(&self) -> MapShape {
        MapShape::new(self.batch, self.height, self.width)
    }

    /// Check that the channel axis can be reduced.
    ///
    /// # Errors
    ///
    /// Returns an error if any dimension is zero.
    pub fn ensure_reducible(&self) -> Result<()> {
        if self.batch == 0 || self.channels == 0 || self.height == 0 || self.width == 0 {
            return Err(SaliencyError::InvalidShape {
                expected: "non-empty (B, C, H, W)".to_string(),
                got: self.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ActivationShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(B={}, C={}, H={}, W={})",
            self.batch, self.channels, self.height, self.width
        )
    }
}

impl From<[usize; 4]> for ActivationShape {
    fn from([batch, channels, height, width]: [usize; 4]) -> Self {
        Self::new(batch, channels, height, width)
    }
}

/// Shape metadata for a saliency map, `(B, H, W)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapShape {
    batch: usize,
    height: usize,
    width: usize,
}

impl MapShape {
    /// Create a new map shape.
    #[must_use]
    pub const fn new(batch: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            height,
            width,
        }
    }

    /// Get the batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Get the height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Get the width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Convert to an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 3] {
        [self.batch, self.height, self.width]
    }
}

impl std::fmt::Display for MapShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(B={}, H={}, W={})", self.batch, self.height, self.width)
    }
}

impl From<[usize; 3]> for MapShape {
    fn from([batch, height, width]: [usize; 3]) -> Self {
        Self::new(batch, height, width)
    }
}

/// Spatial resolution of combined saliency maps.
///
/// Both dimensions are strictly positive. Defaults to 224 × 224.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[usize; 2]", into = "[usize; 2]")]
pub struct OutputSize {
    height: usize,
    width: usize,
}

impl OutputSize {
    /// Create a new output size.
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is zero.
    pub fn new(height: usize, width: usize) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(SaliencyError::InvalidConfig(format!(
                "output size must be positive, got {height}x{width}"
            )));
        }
        Ok(Self { height, width })
    }

    /// Get the height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Get the width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Convert to an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 2] {
        [self.height, self.width]
    }
}

impl Default for OutputSize {
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
        }
    }
}

impl std::fmt::Display for OutputSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

impl TryFrom<[usize; 2]> for OutputSize {
    type Error = SaliencyError;

    fn try_from([height, width]: [usize; 2]) -> Result<Self> {
        Self::new(height, width)
    }
}

impl From<OutputSize> for [usize; 2] {
    fn from(size: OutputSize) -> Self {
        size.as_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_shape_from_dims() {
        let shape = ActivationShape::from_dims(&[2, 8, 7, 7]).unwrap();
        assert_eq!(shape.as_array(), [2, 8, 7, 7]);
        assert_eq!(shape.spatial(), 49);

        assert!(ActivationShape::from_dims(&[2, 8, 7]).is_err());
        assert!(ActivationShape::from_dims(&[2, 8, 7, 7, 1]).is_err());
    }

    #[test]
    fn test_activation_shape_reducible() {
        assert!(ActivationShape::new(1, 4, 3, 3).ensure_reducible().is_ok());
        assert!(ActivationShape::new(1, 0, 3, 3).ensure_reducible().is_err());
    }

    #[test]
    fn test_map_shape() {
        let shape = ActivationShape::new(4, 16, 14, 12).map_shape();
        assert_eq!(shape, MapShape::new(4, 14, 12));
        assert_eq!(shape.to_string(), "(B=4, H=14, W=12)");
    }

    #[test]
    fn test_output_size_validation() {
        assert_eq!(OutputSize::default().as_array(), [224, 224]);
        assert!(OutputSize::new(0, 224).is_err());
        assert!(OutputSize::new(224, 0).is_err());
        assert_eq!(OutputSize::new(32, 48).unwrap().as_array(), [32, 48]);
    }

    #[test]
    fn test_output_size_serialization() {
        let size = OutputSize::new(64, 32).unwrap();
        let json = serde_json::to_string(&size).unwrap();
        assert_eq!(json, "[64,32]");
        let restored: OutputSize = serde_json::from_str(&json).unwrap();
        assert_eq!(size, restored);

        assert!(serde_json::from_str::<OutputSize>("[0,32]").is_err());
    }
}
