use nalgebra::DMatrix;

use crate::dataset::Dataset;
use crate::error::SnsppError;

use super::{Loss, ScalarLoss};

/// t-Student loss `f_i(z) = log(1 + (z-b_i)^2 / v)`. Not convex: its
/// curvature dips below zero, so every operation on `f*`/`g*`/`H*` is defined
/// on the convexified surrogate `tilde_f_i(z) = f_i(z) + (gamma/2) z^2`,
/// where `gamma = weak_conv(i)` makes `tilde_f_i` convex — the shift spec
/// §4.1/§4.6 requires callers to apply to the dual iterate before invoking
/// these losses' conjugate operations.
///
/// `f*` has no closed form; it is found by locating the (unique, for convex
/// `tilde_f_i`) stationary point of `xi*z - tilde_f_i(z)`, a cubic equation
/// in `z`, solved by a few Newton iterations seeded at the cubic's inflection
/// point (the `deiters_method` recipe).
pub struct TStudentLoss {
    dataset: Dataset,
    v: f64,
    gamma: f64,
}

impl TStudentLoss {
    pub fn new(dataset: Dataset, v: f64) -> Result<Self, SnsppError> {
        if !dataset.is_scalar() {
            return Err(SnsppError::InvalidBlockSize(dataset.block_size(0), 0));
        }
        if v <= 0.0 {
            return Err(SnsppError::NonPositiveStepSize(v));
        }
        // max curvature of f'' is -1/(4v), attained at (z-b)^2 = 3v.
        let gamma = 1.0 / (4.0 * v);
        Ok(Self { dataset, v, gamma })
    }

    pub fn v(&self) -> f64 {
        self.v
    }
}

fn f_of(u: f64, v: f64) -> f64 {
    (1.0 + u * u / v).ln()
}

fn fpp_of(u: f64, v: f64) -> f64 {
    (2.0 * v - 2.0 * u * u) / (v + u * u).powi(2)
}

/// Newton's method for the stationary point of `xi*z - tilde_f(z)`, seeded
/// at the cubic's inflection point per the sign of the inflection value
/// (ported from the reference implementation's `deiters_method`).
fn conjugate_stationary_point(xi: f64, b: f64, v: f64, gamma: f64) -> f64 {
    let a2 = -(xi + 2.0 * gamma * b) / gamma;
    let a1 = (2.0 * b * xi + 2.0 + gamma * v + gamma * b * b) / gamma;
    let a0 = -(xi * v + xi * b * b + 2.0 * b) / gamma;

    let cubic = |z: f64| z * z * z + a2 * z * z + a1 * z + a0;
    let cubic_deriv = |z: f64| 3.0 * z * z + 2.0 * a2 * z + a1;

    let z_infl = -a2 / 3.0;
    let y_infl = cubic(z_infl);
    let d = a2 * a2 - 3.0 * a1;

    let mut z = if d >= 0.0 {
        if y_infl < 0.0 {
            z_infl + (2.0 / 3.0) * d.sqrt()
        } else {
            z_infl - (2.0 / 3.0) * d.sqrt()
        }
    } else {
        z_infl
    };

    for _ in 0..5 {
        let val = cubic(z);
        if val.abs() <= 1e-12 {
            break;
        }
        z -= val / cubic_deriv(z);
    }
    z
}

impl Loss for TStudentLoss {
    fn name(&self) -> &'static str {
        "tstudent"
    }

    fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn is_convex(&self) -> bool {
        false
    }

    fn weak_conv(&self, _i: usize) -> f64 {
        self.gamma
    }

    fn family_lipschitz_constant(&self) -> f64 {
        // max of |f''| over R for f(z) = log(1+z^2/v) is attained at z=0: 2/v.
        2.0 / self.v
    }

    fn f_i(&self, z: &[f64], i: usize) -> f64 {
        let b = self.dataset.target_of(i)[0];
        f_of(z[0] - b, self.v)
    }

    fn g_i(&self, z: &[f64], i: usize) -> Vec<f64> {
        let b = self.dataset.target_of(i)[0];
        let u = z[0] - b;
        vec![2.0 * u / (self.v + u * u)]
    }

    fn fstar(&self, xi: &[f64], i: usize) -> Result<f64, SnsppError> {
        self.fstar_scalar(xi[0], i)
    }

    fn gstar(&self, xi: &[f64], i: usize) -> Result<Vec<f64>, SnsppError> {
        self.gstar_scalar(xi[0], i).map(|v| vec![v])
    }

    fn hstar(&self, xi: &[f64], i: usize) -> Result<DMatrix<f64>, SnsppError> {
        self.hstar_scalar(xi[0], i)
            .map(|v| DMatrix::from_element(1, 1, v))
    }

    fn default_dual_start(&self, _i: usize) -> Vec<f64> {
        vec![1.0]
    }

    fn as_scalar(&self) -> Option<&dyn ScalarLoss> {
        Some(self)
    }
}

impl ScalarLoss for TStudentLoss {
    fn f_scalar(&self, z: f64, i: usize) -> f64 {
        self.f_i(&[z], i)
    }

    fn g_scalar(&self, z: f64, i: usize) -> f64 {
        self.g_i(&[z], i)[0]
    }

    fn fstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError> {
        let b = self.dataset.target_of(i)[0];
        let z = conjugate_stationary_point(xi, b, self.v, self.gamma);
        let tilde_f = f_of(z - b, self.v) + 0.5 * self.gamma * z * z;
        Ok(xi * z - tilde_f)
    }

    fn gstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError> {
        let b = self.dataset.target_of(i)[0];
        Ok(conjugate_stationary_point(xi, b, self.v, self.gamma))
    }

    fn hstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError> {
        let b = self.dataset.target_of(i)[0];
        let z = conjugate_stationary_point(xi, b, self.v, self.gamma);
        let tilde_fpp = fpp_of(z - b, self.v) + self.gamma;
        if tilde_fpp <= 0.0 || !tilde_fpp.is_finite() {
            return Err(SnsppError::NonFiniteLinearSystem);
        }
        Ok(1.0 / tilde_fpp)
    }
}
