//! Planar image buffers and per-pixel 2D vector fields.
//!
//! Images are dense `Array3` scalar fields of shape `(channels, height,
//! width)`, so the element for pixel (x, y) of channel k sits at linear
//! index `x + width*(y + height*k)` in the underlying storage. One channel
//! (grayscale) gives scalar TV; several channels give vectorial TV.

use ndarray::Array3;

use crate::float_trait::TvFloat;

/// Dense multi-channel planar image, indexed `[[channel, y, x]]`.
pub type Image<F> = Array3<F>;

/// Allocate a zero image of the given dimensions.
pub fn image_zeros<F: TvFloat>(width: usize, height: usize, channels: usize) -> Image<F> {
    Array3::zeros((channels, height, width))
}

/// Dimensions of an image as (width, height, channels).
#[inline]
pub fn image_dims<F: TvFloat>(image: &Image<F>) -> (usize, usize, usize) {
    let (channels, height, width) = image.dim();
    (width, height, channels)
}

/// L2 norm over all elements of an image.
pub fn l2_norm<F: TvFloat>(image: &Image<F>) -> F {
    image.iter().map(|&v| v * v).sum::<F>().sqrt()
}

/// Per-pixel 2D vector field with the same shape and indexing as an image.
///
/// Stores the x and y components as separate planes. Used for both the
/// auxiliary variable d and the Bregman variable d-tilde. Each field has a
/// single owner and its shape never changes after allocation.
#[derive(Debug, Clone)]
pub struct VecField<F: TvFloat> {
    /// x-component, indexed `[[channel, y, x]]`.
    pub x: Array3<F>,
    /// y-component, indexed `[[channel, y, x]]`.
    pub y: Array3<F>,
}

impl<F: TvFloat> VecField<F> {
    /// Allocate a zero vector field for a width x height x channels image.
    pub fn zeros(width: usize, height: usize, channels: usize) -> Self {
        Self {
            x: Array3::zeros((channels, height, width)),
            y: Array3::zeros((channels, height, width)),
        }
    }

    /// Reset both components to zero in place.
    pub fn fill_zero(&mut self) {
        self.x.fill(F::zero());
        self.y.fill(F::zero());
    }
}
