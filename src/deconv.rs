//! Deconvolution setup and the u-subproblem solvers.
//!
//! The u-update solves
//!
//! ```text
//! (lambda/gamma1) phi*phi * u - laplacian(u)
//!     = (lambda/gamma1) phi*f - div(dtilde)
//! ```
//!
//! in a transform domain where correlation with the kernel phi is diagonal.
//! A whole-sample symmetric kernel diagonalizes on the DCT grid; anything
//! else runs on the Fourier grid after symmetric extension of the data to
//! 2W x 2H. Both paths precompute the denominator spectrum of
//! `(lambda/gamma1) (phi correlated with phi) - laplacian` and the constant
//! part of the right-hand side once, because f and the kernel do not change
//! across outer iterations. The fidelity term keeps the denominator strictly
//! positive, so the spectral division needs no guards.
//!
//! The backward-difference divergence used here mirrors the forward
//! differences of the d-update, so their composition is exactly the Neumann
//! Laplacian whose spectrum appears in the denominators.

use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use rustfft::num_complex::Complex;

use crate::field::{image_dims, Image, VecField};
use crate::float_trait::TvFloat;
use crate::kernel::Kernel;
use crate::transforms::{dct1_2d, DctPlans, FourierPlans};

/// Spectrum of the negated Neumann Laplacian at bin (jx, jy):
/// `2 (2 - cos(pi jx / W) - cos(pi jy / H))`. The Fourier grid indexes the
/// same expression with jx up to W and jy up to 2H - 1.
fn laplacian_bin<F: TvFloat>(jx: usize, jy: usize, width: usize, height: usize) -> F {
    let two = F::from_f64_c(2.0);
    let cx = (<F as TvFloat>::PI * F::usize_as(jx) / F::usize_as(width)).cos();
    let cy = (<F as TvFloat>::PI * F::usize_as(jy) / F::usize_as(height)).cos();
    two * (two - cx - cy)
}

/// Backward-difference divergence of one channel of a vector field,
/// written into a (H, W) buffer. Out-of-range neighbors contribute zero.
pub(crate) fn divergence_into<F: TvFloat>(
    out: &mut Array2<F>,
    field: &VecField<F>,
    channel: usize,
) {
    let (height, width) = out.dim();
    for y in 0..height {
        for x in 0..width {
            let mut v = field.x[[channel, y, x]] + field.y[[channel, y, x]];
            if x > 0 {
                v -= field.x[[channel, y, x - 1]];
            }
            if y > 0 {
                v -= field.y[[channel, y - 1, x]];
            }
            out[[y, x]] = v;
        }
    }
}

/// Half-sample symmetric extension of a (H, W) buffer onto the
/// (2H, 2W) Fourier grid.
fn symmetric_extend_into<F: TvFloat>(out: &mut Array2<F>, src: ArrayView2<F>) {
    let (height, width) = src.dim();
    for y2 in 0..2 * height {
        let sy = if y2 < height { y2 } else { 2 * height - 1 - y2 };
        for x2 in 0..2 * width {
            let sx = if x2 < width { x2 } else { 2 * width - 1 - x2 };
            out[[y2, x2]] = src[[sy, sx]];
        }
    }
}

// =============================================================================
// DCT path
// =============================================================================

/// u-solver state for whole-sample symmetric kernels. Spectra live on the
/// W x H DCT-II grid; the kernel spectrum comes from a DCT-I on
/// (W+1) x (H+1). The inverse-transform scale (W*H)/4 is folded into the
/// denominator.
pub struct DctDeconv<F: TvFloat> {
    channels: usize,
    plans: DctPlans<F>,
    denom: Array2<F>,
    rhs_const: Array3<F>,
    scratch: Array2<F>,
}

impl<F: TvFloat> DctDeconv<F> {
    pub fn new(f: &Image<F>, kernel: &Kernel<F>, alpha: F) -> Self {
        let (width, height, channels) = image_dims(f);
        let four = F::from_f64_c(4.0);

        // Fold the periodized centered kernel onto the DCT-I base block.
        // Samples wrapping past the block are mirror images of retained ones
        // (the analyzer guarantees symmetry on this path), so they are
        // dropped rather than double-counted.
        let mut pad = Array2::<F>::zeros((height + 1, width + 1));
        let (cx, cy) = kernel.center();
        let data = kernel.data();
        let (kh, kw) = data.dim();
        for ky in 0..kh {
            let py = (ky as isize - cy as isize).rem_euclid(2 * height as isize) as usize;
            if py > height {
                continue;
            }
            for kx in 0..kw {
                let px = (kx as isize - cx as isize).rem_euclid(2 * width as isize) as usize;
                if px > width {
                    continue;
                }
                pad[[py, px]] += data[[ky, kx]];
            }
        }
        dct1_2d(&mut pad);
        // pad now holds a quarter of the even-extension DFT of the kernel.

        let quarter_pixels = F::usize_as(width * height) / four;
        let mut denom = Array2::zeros((height, width));
        for y in 0..height {
            for x in 0..width {
                let khat = four * pad[[y, x]];
                denom[[y, x]] =
                    (alpha * khat * khat + laplacian_bin(x, y, width, height)) * quarter_pixels;
            }
        }

        let plans = DctPlans::new(width, height);
        let mut rhs_const = Array3::zeros((channels, height, width));
        let mut scratch = Array2::zeros((height, width));
        for k in 0..channels {
            scratch.assign(&f.index_axis(Axis(0), k));
            plans.forward(&mut scratch);
            for y in 0..height {
                for x in 0..width {
                    rhs_const[[k, y, x]] = alpha * four * pad[[y, x]] * scratch[[y, x]];
                }
            }
        }

        Self {
            channels,
            plans,
            denom,
            rhs_const,
            scratch,
        }
    }

    /// One linear solve in the DCT domain; returns |u_new - u_prev| / |f|.
    pub fn solve_u(&mut self, u: &mut Image<F>, dtilde: &VecField<F>, f_norm: F) -> F {
        let mut delta_sq = F::zero();
        for k in 0..self.channels {
            divergence_into(&mut self.scratch, dtilde, k);
            self.plans.forward(&mut self.scratch);

            let rhs = self.rhs_const.index_axis(Axis(0), k);
            Zip::from(&mut self.scratch)
                .and(&rhs)
                .and(&self.denom)
                .for_each(|s, &r, &d| *s = (r - *s) / d);

            self.plans.inverse(&mut self.scratch);

            let mut u_k = u.index_axis_mut(Axis(0), k);
            Zip::from(&mut u_k).and(&self.scratch).for_each(|uv, &nv| {
                let diff = nv - *uv;
                delta_sq += diff * diff;
                *uv = nv;
            });
        }
        delta_sq.sqrt() / f_norm
    }
}

// =============================================================================
// Fourier path
// =============================================================================

/// u-solver state for general kernels. The image is extended symmetrically
/// to 2W x 2H; spectra are (W+1)-wide real-DFT half-spectra of height 2H.
/// The round-trip scale 4*W*H is folded into the denominator, and the
/// kernel conjugate is folded into the per-channel RHS constant.
pub struct FourierDeconv<F: TvFloat> {
    width: usize,
    height: usize,
    channels: usize,
    plans: FourierPlans<F>,
    denom: Array2<F>,
    rhs_const: Array3<Complex<F>>,
    spatial: Array2<F>,
    spectrum: Array2<Complex<F>>,
    div: Array2<F>,
}

impl<F: TvFloat> FourierDeconv<F> {
    pub fn new(f: &Image<F>, kernel: &Kernel<F>, alpha: F) -> Result<Self, String> {
        let (width, height, channels) = image_dims(f);
        let pad_width = 2 * width;
        let pad_height = 2 * height;
        let plans = FourierPlans::new(pad_width, pad_height);
        let spec_width = plans.spectrum_width();

        let mut spatial = Array2::<F>::zeros((pad_height, pad_width));
        let mut spectrum = Array2::<Complex<F>>::zeros((pad_height, spec_width));

        // Periodize the centered kernel onto the padded grid.
        let (cx, cy) = kernel.center();
        let data = kernel.data();
        let (kh, kw) = data.dim();
        for ky in 0..kh {
            let py = (ky as isize - cy as isize).rem_euclid(pad_height as isize) as usize;
            for kx in 0..kw {
                let px = (kx as isize - cx as isize).rem_euclid(pad_width as isize) as usize;
                spatial[[py, px]] += data[[ky, kx]];
            }
        }
        plans.forward(&spatial, &mut spectrum)?;
        let kernel_trans = spectrum.clone();

        let pad_pixels = F::usize_as(pad_width * pad_height);
        let mut denom = Array2::zeros((pad_height, spec_width));
        for jy in 0..pad_height {
            for jx in 0..spec_width {
                denom[[jy, jx]] = (alpha * kernel_trans[[jy, jx]].norm_sqr()
                    + laplacian_bin(jx, jy, width, height))
                    * pad_pixels;
            }
        }

        let mut rhs_const = Array3::zeros((channels, pad_height, spec_width));
        for k in 0..channels {
            symmetric_extend_into(&mut spatial, f.index_axis(Axis(0), k));
            plans.forward(&spatial, &mut spectrum)?;
            let mut rhs_k = rhs_const.index_axis_mut(Axis(0), k);
            Zip::from(&mut rhs_k)
                .and(&kernel_trans)
                .and(&spectrum)
                .for_each(|r, &kt, &ft| *r = kt.conj() * ft * alpha);
        }

        Ok(Self {
            width,
            height,
            channels,
            plans,
            denom,
            rhs_const,
            spatial,
            spectrum,
            div: Array2::zeros((height, width)),
        })
    }

    /// One linear solve in the Fourier domain; the inverse transform is
    /// cropped back to W x H. Returns |u_new - u_prev| / |f|.
    pub fn solve_u(
        &mut self,
        u: &mut Image<F>,
        dtilde: &VecField<F>,
        f_norm: F,
    ) -> Result<F, String> {
        let mut delta_sq = F::zero();
        for k in 0..self.channels {
            divergence_into(&mut self.div, dtilde, k);
            symmetric_extend_into(&mut self.spatial, self.div.view());
            self.plans.forward(&self.spatial, &mut self.spectrum)?;

            let rhs = self.rhs_const.index_axis(Axis(0), k);
            Zip::from(&mut self.spectrum)
                .and(&rhs)
                .and(&self.denom)
                .for_each(|s, &r, &d| *s = (r - *s) / d);

            self.plans.inverse(&mut self.spectrum, &mut self.spatial)?;

            let mut u_k = u.index_axis_mut(Axis(0), k);
            for y in 0..self.height {
                for x in 0..self.width {
                    let nv = self.spatial[[y, x]];
                    let diff = nv - u_k[[y, x]];
                    delta_sq += diff * diff;
                    u_k[[y, x]] = nv;
                }
            }
        }
        Ok(delta_sq.sqrt() / f_norm)
    }
}

// =============================================================================
// Path selection
// =============================================================================

/// The selected u-solver, tagged by transform path. The kernel analyzer
/// decides the variant once per restoration; the outer loop just calls
/// `solve_u`.
pub enum DeconvSolver<F: TvFloat> {
    Dct(DctDeconv<F>),
    Fourier(FourierDeconv<F>),
}

impl<F: TvFloat> DeconvSolver<F> {
    /// Analyze the kernel and build the matching solver with its
    /// precomputed spectra. `alpha` is lambda/gamma1.
    pub fn new(f: &Image<F>, kernel: &Kernel<F>, alpha: F) -> Result<Self, String> {
        if kernel.is_whole_sample_symmetric() {
            Ok(Self::Dct(DctDeconv::new(f, kernel, alpha)))
        } else {
            Ok(Self::Fourier(FourierDeconv::new(f, kernel, alpha)?))
        }
    }

    pub fn uses_dct(&self) -> bool {
        matches!(self, Self::Dct(_))
    }

    pub fn solve_u(
        &mut self,
        u: &mut Image<F>,
        dtilde: &VecField<F>,
        f_norm: F,
    ) -> Result<F, String> {
        match self {
            Self::Dct(solver) => Ok(solver.solve_u(u, dtilde, f_norm)),
            Self::Fourier(solver) => solver.solve_u(u, dtilde, f_norm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{image_zeros, l2_norm};
    use ndarray::{arr2, Array3};

    struct SimpleLcg {
        state: u64,
    }

    impl SimpleLcg {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_u64(&mut self) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            self.state
        }

        fn next_f64(&mut self) -> f64 {
            let u = self.next_u64();
            ((u >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        }
    }

    fn random_image(width: usize, height: usize, channels: usize, seed: u64) -> Image<f64> {
        let mut rng = SimpleLcg::new(seed);
        Array3::from_shape_fn((channels, height, width), |_| rng.next_f64())
    }

    fn random_field(width: usize, height: usize, channels: usize, seed: u64) -> VecField<f64> {
        let mut rng = SimpleLcg::new(seed);
        let mut field = VecField::zeros(width, height, channels);
        field.x.mapv_inplace(|_| rng.next_f64());
        field.y.mapv_inplace(|_| rng.next_f64());
        field
    }

    fn gaussian_3x3() -> Kernel<f64> {
        let mut data = arr2(&[[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]]);
        data /= 16.0;
        Kernel::new(data).unwrap()
    }

    // ==================== Divergence ====================

    #[test]
    fn test_divergence_backward_differences() {
        let (w, h) = (3, 3);
        let mut field = VecField::<f64>::zeros(w, h, 1);
        field.x[[0, 1, 1]] = 2.0;
        field.y[[0, 1, 1]] = 3.0;
        let mut out = Array2::zeros((h, w));
        divergence_into(&mut out, &field, 0);

        assert_eq!(out[[1, 1]], 5.0); // own x + own y
        assert_eq!(out[[1, 2]], -2.0); // left neighbor x
        assert_eq!(out[[2, 1]], -3.0); // upper neighbor y
        assert_eq!(out[[0, 0]], 0.0);
    }

    #[test]
    fn test_divergence_of_gradient_is_neumann_laplacian() {
        // div(grad u) with the matched stencils must reproduce the Neumann
        // five-point Laplacian, including one-sided rows and columns.
        let (w, h) = (4, 4);
        let u = random_image(w, h, 1, 99);
        let mut grad = VecField::<f64>::zeros(w, h, 1);
        for y in 0..h {
            for x in 0..w {
                if x + 1 < w {
                    grad.x[[0, y, x]] = u[[0, y, x + 1]] - u[[0, y, x]];
                }
                if y + 1 < h {
                    grad.y[[0, y, x]] = u[[0, y + 1, x]] - u[[0, y, x]];
                }
            }
        }
        let mut lap = Array2::zeros((h, w));
        divergence_into(&mut lap, &grad, 0);

        let uu = |x: isize, y: isize| {
            let xc = x.clamp(0, w as isize - 1) as usize;
            let yc = y.clamp(0, h as isize - 1) as usize;
            u[[0, yc, xc]]
        };
        for y in 0..h as isize {
            for x in 0..w as isize {
                let expected = uu(x + 1, y) + uu(x - 1, y) + uu(x, y + 1) + uu(x, y - 1)
                    - 4.0 * uu(x, y);
                assert!(
                    (lap[[y as usize, x as usize]] - expected).abs() < 1e-12,
                    "Laplacian mismatch at ({}, {})",
                    x,
                    y
                );
            }
        }
    }

    // ==================== Denominators ====================

    #[test]
    fn test_denominators_positive_both_paths() {
        let f = random_image(6, 5, 1, 7);
        let dct = DctDeconv::new(&f, &gaussian_3x3(), 5.0);
        assert!(dct.denom.iter().all(|&v| v > 0.0));

        let asym = arr2(&[[0.5, 0.5, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        let fourier = FourierDeconv::new(&f, &Kernel::new(asym).unwrap(), 5.0).unwrap();
        assert!(fourier.denom.iter().all(|&v| v > 0.0));
    }

    // ==================== Identity Kernel ====================

    #[test]
    fn test_identity_kernel_large_alpha_recovers_input() {
        // With phi = delta and a dominant fidelity weight, one u-solve from
        // u = 0 must land on f up to the Laplacian correction O(1/alpha).
        let f = random_image(8, 8, 1, 123);
        let kernel = Kernel::new(arr2(&[[1.0f64]])).unwrap();
        let mut solver = DctDeconv::new(&f, &kernel, 1e8);
        let mut u = image_zeros::<f64>(8, 8, 1);
        let dtilde = VecField::zeros(8, 8, 1);
        let f_norm = l2_norm(&f);

        let delta = solver.solve_u(&mut u, &dtilde, f_norm);

        // u went from 0 to approximately f, so delta is about 1.
        assert!((delta - 1.0).abs() < 1e-6, "delta = {}", delta);
        for (a, b) in u.iter().zip(f.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    // ==================== Path Agreement ====================

    #[test]
    fn test_dct_and_fourier_paths_agree_on_symmetric_kernel() {
        // Fed the same symmetric kernel, both transform paths solve the same
        // symmetric-extension problem and must produce the same iterates.
        let (w, h, c) = (6, 5, 2);
        let f = random_image(w, h, c, 31);
        let kernel = gaussian_3x3();
        let alpha = 25.0 / 5.0;
        let f_norm = l2_norm(&f);

        let mut dct = DctDeconv::new(&f, &kernel, alpha);
        let mut fourier = FourierDeconv::new(&f, &kernel, alpha).unwrap();

        let mut u_dct = f.clone();
        let mut u_fourier = f.clone();

        for step in 0..3 {
            let dtilde = random_field(w, h, c, 1000 + step);
            let delta_dct = dct.solve_u(&mut u_dct, &dtilde, f_norm);
            let delta_fourier = fourier.solve_u(&mut u_fourier, &dtilde, f_norm).unwrap();
            assert!(
                (delta_dct - delta_fourier).abs() < 1e-8,
                "delta mismatch at step {}: {} vs {}",
                step,
                delta_dct,
                delta_fourier
            );
        }

        for (a, b) in u_dct.iter().zip(u_fourier.iter()) {
            assert!((a - b).abs() < 1e-8, "path divergence: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_solver_selection() {
        let f = random_image(4, 4, 1, 5);
        let symmetric = DeconvSolver::new(&f, &gaussian_3x3(), 5.0).unwrap();
        assert!(symmetric.uses_dct());

        let mut data = Array2::zeros((3, 3));
        data[[0, 0]] = 1.0f64;
        let shifted = DeconvSolver::new(&f, &Kernel::new(data).unwrap(), 5.0).unwrap();
        assert!(!shifted.uses_dct());
    }
}
