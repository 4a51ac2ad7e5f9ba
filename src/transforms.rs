//! Transform facade: 2D cosine and real-Fourier transforms built from 1D
//! plans applied along rows and columns.
//!
//! Two execution paths exist. The DCT path (whole-sample symmetric kernels)
//! runs DCT-II forward / DCT-III inverse on the W x H data grid and a
//! one-shot DCT-I on the (W+1) x (H+1) grid for kernel and Laplacian
//! spectra. The Fourier path runs a real-to-complex transform along rows
//! (half-spectrum of width W+1) and a complex transform along columns of
//! the symmetrically extended 2W x 2H grid.
//!
//! Scaling conventions: rustdct transforms are half of FFTW's per axis, so
//! a 2D DCT-II followed by DCT-III multiplies by (W*H)/4, and the 2D DCT-I
//! here is a quarter of the even-extension DFT. The real-FFT pair is
//! unnormalized and composes to 2W*2H. The deconvolution setup folds these
//! factors into its precomputed denominators.
//!
//! Plan tables are shared global state in the underlying transform
//! libraries' execution model, so plan creation and destruction are
//! serialized by a process-wide mutex; `Drop` of a plan set takes the same
//! guard.

use ndarray::{Array2, Axis};
use rayon::prelude::*;
use rustdct::{Dct1, DctPlanner, TransformType2And3};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::float_trait::TvFloat;

static PLAN_LOCK: Mutex<()> = Mutex::new(());

/// Acquire the process-wide guard serializing plan creation/destruction.
pub(crate) fn plan_guard() -> MutexGuard<'static, ()> {
    PLAN_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Copy each lane along `axis` into a contiguous buffer, run `op` on it,
/// and copy the result back. Lanes are processed in parallel with
/// per-thread lane and scratch buffers.
fn apply_lanes<F, Op>(buf: &mut Array2<F>, axis: Axis, scratch_len: usize, op: Op)
where
    F: TvFloat,
    Op: Fn(&mut [F], &mut [F]) + Sync,
{
    let lane_len = buf.len() / buf.len_of(axis);
    buf.axis_iter_mut(axis)
        .into_par_iter()
        .for_each_init(
            || (vec![F::zero(); lane_len], vec![F::zero(); scratch_len]),
            |(lane, scratch), mut view| {
                for (dst, &src) in lane.iter_mut().zip(view.iter()) {
                    *dst = src;
                }
                op(lane, scratch);
                for (dst, &src) in view.iter_mut().zip(lane.iter()) {
                    *dst = src;
                }
            },
        );
}

// =============================================================================
// DCT path
// =============================================================================

struct DctPlanSet<F: TvFloat> {
    // One plan per axis serves both the DCT-II forward and DCT-III inverse.
    row: Arc<dyn TransformType2And3<F>>,
    col: Arc<dyn TransformType2And3<F>>,
}

/// DCT-II/DCT-III plan pair for a W x H data grid, created once per
/// restoration and reused across all outer iterations.
pub struct DctPlans<F: TvFloat> {
    set: Option<DctPlanSet<F>>,
}

impl<F: TvFloat> DctPlans<F> {
    pub fn new(width: usize, height: usize) -> Self {
        let _guard = plan_guard();
        let mut planner = DctPlanner::new();
        Self {
            set: Some(DctPlanSet {
                row: planner.plan_dct2(width),
                col: planner.plan_dct2(height),
            }),
        }
    }

    // Plans are present from construction until drop.
    fn set(&self) -> &DctPlanSet<F> {
        self.set.as_ref().unwrap()
    }

    /// In-place 2D DCT-II of a (H, W) buffer.
    pub fn forward(&self, buf: &mut Array2<F>) {
        let set = self.set();
        apply_lanes(buf, Axis(0), set.row.get_scratch_len(), |lane, scratch| {
            set.row.process_dct2_with_scratch(lane, scratch)
        });
        apply_lanes(buf, Axis(1), set.col.get_scratch_len(), |lane, scratch| {
            set.col.process_dct2_with_scratch(lane, scratch)
        });
    }

    /// In-place 2D DCT-III of a (H, W) buffer.
    pub fn inverse(&self, buf: &mut Array2<F>) {
        let set = self.set();
        apply_lanes(buf, Axis(0), set.row.get_scratch_len(), |lane, scratch| {
            set.row.process_dct3_with_scratch(lane, scratch)
        });
        apply_lanes(buf, Axis(1), set.col.get_scratch_len(), |lane, scratch| {
            set.col.process_dct3_with_scratch(lane, scratch)
        });
    }
}

impl<F: TvFloat> Drop for DctPlans<F> {
    fn drop(&mut self) {
        let _guard = plan_guard();
        self.set.take();
    }
}

/// One-shot in-place 2D DCT-I, used for the kernel and Laplacian spectra on
/// the (W+1) x (H+1) grid. The plans live only for this call; creation and
/// destruction both happen under the planner guard.
pub fn dct1_2d<F: TvFloat>(buf: &mut Array2<F>) {
    let (rows, cols) = buf.dim();
    let (row_plan, col_plan): (Arc<dyn Dct1<F>>, Arc<dyn Dct1<F>>) = {
        let _guard = plan_guard();
        let mut planner = DctPlanner::new();
        (planner.plan_dct1(cols), planner.plan_dct1(rows))
    };
    apply_lanes(buf, Axis(0), row_plan.get_scratch_len(), |lane, scratch| {
        row_plan.process_dct1_with_scratch(lane, scratch)
    });
    apply_lanes(buf, Axis(1), col_plan.get_scratch_len(), |lane, scratch| {
        col_plan.process_dct1_with_scratch(lane, scratch)
    });
    let _guard = plan_guard();
    drop(row_plan);
    drop(col_plan);
}

// =============================================================================
// Fourier path
// =============================================================================

struct FourierPlanSet<F: TvFloat> {
    r2c: Arc<dyn RealToComplex<F>>,
    c2r: Arc<dyn ComplexToReal<F>>,
    col_fwd: Arc<dyn Fft<F>>,
    col_inv: Arc<dyn Fft<F>>,
}

/// Real-DFT plan set for the symmetric-extension grid: rows of length
/// `pad_width` transform to half-spectra of width `pad_width/2 + 1`, then a
/// complex transform runs down each spectral column of height `pad_height`.
pub struct FourierPlans<F: TvFloat> {
    pad_width: usize,
    set: Option<FourierPlanSet<F>>,
}

impl<F: TvFloat> FourierPlans<F> {
    pub fn new(pad_width: usize, pad_height: usize) -> Self {
        let _guard = plan_guard();
        let mut real_planner = RealFftPlanner::new();
        let mut planner = FftPlanner::new();
        Self {
            pad_width,
            set: Some(FourierPlanSet {
                r2c: real_planner.plan_fft_forward(pad_width),
                c2r: real_planner.plan_fft_inverse(pad_width),
                col_fwd: planner.plan_fft_forward(pad_height),
                col_inv: planner.plan_fft_inverse(pad_height),
            }),
        }
    }

    /// Width of the spectral buffers, `pad_width/2 + 1`.
    pub fn spectrum_width(&self) -> usize {
        self.pad_width / 2 + 1
    }

    // Plans are present from construction until drop.
    fn set(&self) -> &FourierPlanSet<F> {
        self.set.as_ref().unwrap()
    }

    /// Forward transform of a (pad_height, pad_width) spatial buffer into a
    /// (pad_height, pad_width/2 + 1) half-spectrum. Unnormalized.
    pub fn forward(
        &self,
        spatial: &Array2<F>,
        spectrum: &mut Array2<Complex<F>>,
    ) -> Result<(), String> {
        let set = self.set();

        // Real-to-complex along rows.
        let r2c = &set.r2c;
        spectrum
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(spatial.axis_iter(Axis(0)).into_par_iter())
            .try_for_each_init(
                || {
                    (
                        vec![F::zero(); self.pad_width],
                        vec![Complex::new(F::zero(), F::zero()); r2c.get_scratch_len()],
                    )
                },
                |(input, scratch), (mut spec_row, spat_row)| {
                    for (dst, &src) in input.iter_mut().zip(spat_row.iter()) {
                        *dst = src;
                    }
                    let out = spec_row.as_slice_mut().ok_or("non-contiguous spectrum row")?;
                    r2c.process_with_scratch(input, out, scratch)
                        .map_err(|e| e.to_string())
                },
            )?;

        // Complex transform down each spectral column.
        let col_fwd = &set.col_fwd;
        apply_complex_lanes(spectrum, Axis(1), col_fwd.get_inplace_scratch_len(), |lane, scratch| {
            col_fwd.process_with_scratch(lane, scratch)
        });
        Ok(())
    }

    /// Inverse transform of a half-spectrum back to the spatial grid. The
    /// spectrum buffer is consumed as scratch. Unnormalized: a forward and
    /// inverse pair multiplies by `pad_width * pad_height`.
    pub fn inverse(
        &self,
        spectrum: &mut Array2<Complex<F>>,
        spatial: &mut Array2<F>,
    ) -> Result<(), String> {
        let set = self.set();

        let col_inv = &set.col_inv;
        apply_complex_lanes(spectrum, Axis(1), col_inv.get_inplace_scratch_len(), |lane, scratch| {
            col_inv.process_with_scratch(lane, scratch)
        });

        // After the column pass, every row is the half-spectrum of a real
        // signal; the DC and Nyquist bins are real up to rounding, which the
        // complex-to-real transform requires exactly.
        let nyquist = self.spectrum_width() - 1;
        let c2r = &set.c2r;
        spatial
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(spectrum.axis_iter_mut(Axis(0)).into_par_iter())
            .try_for_each_init(
                || {
                    (
                        vec![Complex::new(F::zero(), F::zero()); self.spectrum_width()],
                        vec![Complex::new(F::zero(), F::zero()); c2r.get_scratch_len()],
                    )
                },
                |(input, scratch), (mut spat_row, spec_row)| {
                    for (dst, &src) in input.iter_mut().zip(spec_row.iter()) {
                        *dst = src;
                    }
                    input[0].im = F::zero();
                    input[nyquist].im = F::zero();
                    let out = spat_row.as_slice_mut().ok_or("non-contiguous spatial row")?;
                    c2r.process_with_scratch(input, out, scratch)
                        .map_err(|e| e.to_string())
                },
            )?;
        Ok(())
    }
}

impl<F: TvFloat> Drop for FourierPlans<F> {
    fn drop(&mut self) {
        let _guard = plan_guard();
        self.set.take();
    }
}

/// Complex analog of `apply_lanes` for the in-place rustfft column passes.
fn apply_complex_lanes<F, Op>(
    buf: &mut Array2<Complex<F>>,
    axis: Axis,
    scratch_len: usize,
    op: Op,
) where
    F: TvFloat,
    Op: Fn(&mut [Complex<F>], &mut [Complex<F>]) + Sync,
{
    let lane_len = buf.len() / buf.len_of(axis);
    let zero = Complex::new(F::zero(), F::zero());
    buf.axis_iter_mut(axis)
        .into_par_iter()
        .for_each_init(
            || (vec![zero; lane_len], vec![zero; scratch_len]),
            |(lane, scratch), mut view| {
                for (dst, &src) in lane.iter_mut().zip(view.iter()) {
                    *dst = src;
                }
                op(lane, scratch);
                for (dst, &src) in view.iter_mut().zip(lane.iter()) {
                    *dst = src;
                }
            },
        );
}
