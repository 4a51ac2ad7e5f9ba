//! d-subproblem: vectorial shrinkage of the gradient-plus-Bregman field.
//!
//! Solves, per pixel, the minimization of |d| + (gamma1/2)|d - b - grad u|^2,
//! whose closed form is shrinkage of grad u + b by 1/gamma1. The magnitude
//! couples the x/y components of every channel at the pixel, so shrinkage is
//! applied uniformly across channels. The Bregman variable b is not stored;
//! the field d-tilde = d - b carries the same information with less
//! arithmetic, and is refreshed as 2*d_new - d_pre after each shrink.
//!
//! The gradient uses forward differences. Past the right and bottom image
//! boundaries the difference is defined as zero, so the x-component vanishes
//! on the last column, the y-component on the last row, and both at the
//! bottom-right corner.

use ndarray::Axis;
use rayon::prelude::*;

use crate::field::{Image, VecField};
use crate::float_trait::TvFloat;

/// One d-update: reads `u` and the current `d`/`dtilde`, writes both fields
/// in place. Rows touch only their own slice of d and dtilde and read `u` at
/// rows y and y+1, so the row loop runs on the rayon pool.
pub fn d_solve<F: TvFloat>(
    u: &Image<F>,
    d: &mut VecField<F>,
    dtilde: &mut VecField<F>,
    gamma1: F,
) {
    let (channels, height, width) = u.dim();
    let thresh = F::one() / gamma1;
    let thresh_sq = thresh * thresh;
    let two = F::from_f64_c(2.0);
    let u_view = u.view();

    // Per-row (C, W) views, rows along the leading axis.
    let mut dx = d.x.view_mut().permuted_axes([1, 0, 2]);
    let mut dy = d.y.view_mut().permuted_axes([1, 0, 2]);
    let mut dtx = dtilde.x.view_mut().permuted_axes([1, 0, 2]);
    let mut dty = dtilde.y.view_mut().permuted_axes([1, 0, 2]);

    dx.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(dy.axis_iter_mut(Axis(0)).into_par_iter())
        .zip(dtx.axis_iter_mut(Axis(0)).into_par_iter())
        .zip(dty.axis_iter_mut(Axis(0)).into_par_iter())
        .enumerate()
        .for_each(|(y, (((mut dxr, mut dyr), mut dtxr), mut dtyr))| {
            if y + 1 < height {
                // Interior pixels: full vectorial shrinkage.
                for x in 0..width - 1 {
                    let mut mag = F::zero();
                    for k in 0..channels {
                        let du_x = u_view[[k, y, x + 1]] - u_view[[k, y, x]];
                        let du_y = u_view[[k, y + 1, x]] - u_view[[k, y, x]];
                        dxr[[k, x]] += du_x - dtxr[[k, x]];
                        dyr[[k, x]] += du_y - dtyr[[k, x]];
                        mag += dxr[[k, x]] * dxr[[k, x]] + dyr[[k, x]] * dyr[[k, x]];
                    }

                    if mag > thresh_sq {
                        let scale = F::one() - thresh / mag.sqrt();
                        for k in 0..channels {
                            let new_x = scale * dxr[[k, x]];
                            let new_y = scale * dyr[[k, x]];
                            dtxr[[k, x]] = two * new_x - dxr[[k, x]];
                            dtyr[[k, x]] = two * new_y - dyr[[k, x]];
                            dxr[[k, x]] = new_x;
                            dyr[[k, x]] = new_y;
                        }
                    } else {
                        for k in 0..channels {
                            dtxr[[k, x]] = -dxr[[k, x]];
                            dtyr[[k, x]] = -dyr[[k, x]];
                            dxr[[k, x]] = F::zero();
                            dyr[[k, x]] = F::zero();
                        }
                    }
                }

                // Right edge: only the y-component participates.
                let x = width - 1;
                let mut mag = F::zero();
                for k in 0..channels {
                    let du_y = u_view[[k, y + 1, x]] - u_view[[k, y, x]];
                    dyr[[k, x]] += du_y - dtyr[[k, x]];
                    mag += dyr[[k, x]] * dyr[[k, x]];
                    dxr[[k, x]] = F::zero();
                    dtxr[[k, x]] = F::zero();
                }

                if mag > thresh_sq {
                    let scale = F::one() - thresh / mag.sqrt();
                    for k in 0..channels {
                        let new_y = scale * dyr[[k, x]];
                        dtyr[[k, x]] = two * new_y - dyr[[k, x]];
                        dyr[[k, x]] = new_y;
                    }
                } else {
                    for k in 0..channels {
                        dtyr[[k, x]] = -dyr[[k, x]];
                        dyr[[k, x]] = F::zero();
                    }
                }
            } else {
                // Bottom edge: only the x-component participates.
                for x in 0..width - 1 {
                    let mut mag = F::zero();
                    for k in 0..channels {
                        let du_x = u_view[[k, y, x + 1]] - u_view[[k, y, x]];
                        dxr[[k, x]] += du_x - dtxr[[k, x]];
                        mag += dxr[[k, x]] * dxr[[k, x]];
                        dyr[[k, x]] = F::zero();
                        dtyr[[k, x]] = F::zero();
                    }

                    if mag > thresh_sq {
                        let scale = F::one() - thresh / mag.sqrt();
                        for k in 0..channels {
                            let new_x = scale * dxr[[k, x]];
                            dtxr[[k, x]] = two * new_x - dxr[[k, x]];
                            dxr[[k, x]] = new_x;
                        }
                    } else {
                        for k in 0..channels {
                            dtxr[[k, x]] = -dxr[[k, x]];
                            dxr[[k, x]] = F::zero();
                        }
                    }
                }

                // Bottom-right corner: everything vanishes.
                let x = width - 1;
                for k in 0..channels {
                    dxr[[k, x]] = F::zero();
                    dyr[[k, x]] = F::zero();
                    dtxr[[k, x]] = F::zero();
                    dtyr[[k, x]] = F::zero();
                }
            }
        });
}
