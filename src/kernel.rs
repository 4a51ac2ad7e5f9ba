//! Convolution kernel container and symmetry analysis.
//!
//! The u-subproblem is solved in a transform domain chosen from the kernel's
//! symmetry: a whole-sample symmetric kernel diagonalizes under the DCT and
//! gets the faster real cosine-transform solver, anything else falls back to
//! the Fourier solver on a symmetrically extended grid.

use ndarray::Array2;

use crate::float_trait::TvFloat;

/// Dense 2D blur kernel, indexed `[[y, x]]`, treated as centered at
/// (floor(width/2), floor(height/2)). Its support is assumed small relative
/// to the image.
#[derive(Debug, Clone)]
pub struct Kernel<F: TvFloat> {
    data: Array2<F>,
}

impl<F: TvFloat> Kernel<F> {
    /// Wrap a kernel array of shape (height, width).
    pub fn new(data: Array2<F>) -> Result<Self, String> {
        let (height, width) = data.dim();
        if width == 0 || height == 0 {
            return Err(format!("kernel must be non-empty, got {}x{}", width, height));
        }
        Ok(Self { data })
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    /// Center offset (floor(width/2), floor(height/2)).
    pub fn center(&self) -> (usize, usize) {
        (self.width() / 2, self.height() / 2)
    }

    pub fn data(&self) -> &Array2<F> {
        &self.data
    }

    /// Test whether the kernel is whole-sample symmetric: odd dimensions and
    /// K(x,y) = K(W-1-x,y) = K(x,H-1-y) for every sample, compared exactly.
    pub fn is_whole_sample_symmetric(&self) -> bool {
        let (height, width) = self.data.dim();
        if width % 2 == 0 || height % 2 == 0 {
            return false;
        }
        for y in 0..height {
            let yr = height - 1 - y;
            for x in 0..width {
                let xr = width - 1 - x;
                if self.data[[y, x]] != self.data[[y, xr]] || self.data[[y, x]] != self.data[[yr, x]]
                {
                    return false;
                }
            }
        }
        true
    }
}
