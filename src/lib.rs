//! TV-Regularized Deconvolution Core
//!
//! Pure Rust implementation of split-Bregman total variation image
//! restoration for a known convolution kernel. Given a blurred image and
//! the kernel, the solver recovers a clean image by alternating a
//! vectorial-shrinkage update of an auxiliary gradient field with a
//! transform-domain linear solve, choosing a DCT or Fourier solver from the
//! kernel's symmetry.
//!
//! ## f32/f64 Support
//!
//! All entry points are generic over the `TvFloat` trait, so callers can
//! run the solver in either single or double precision.

pub mod deconv;
pub mod dsolve;
pub mod field;
pub mod float_trait;
pub mod kernel;
pub mod restore;
pub mod transforms;

// Re-export commonly used types at the crate root
pub use deconv::DeconvSolver;
pub use dsolve::d_solve;
pub use field::{image_zeros, l2_norm, Image, VecField};
pub use float_trait::TvFloat;
pub use kernel::Kernel;
pub use restore::{
    algorithm_description, simple_progress, tv_restore, tv_restore_with_progress, ProgressState,
    RestoreStatus, TvRestoreOpts,
};
