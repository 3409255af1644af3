use nalgebra::DMatrix;

use crate::dataset::Dataset;
use crate::error::SnsppError;

use super::{Loss, ScalarLoss};

/// Huber loss with threshold `delta`: `f_i(z) = (z-b_i)^2/2` for
/// `|z-b_i| <= delta`, `delta*(|z-b_i| - delta/2)` otherwise. Convex
/// everywhere, `weak_conv = 0`. Its conjugate is the indicator-constrained
/// quadratic `f*(xi) = xi^2/2 + b_i*xi` on `|xi| <= delta`, `+inf` outside.
pub struct HuberLoss {
    dataset: Dataset,
    delta: f64,
}

impl HuberLoss {
    pub fn new(dataset: Dataset, delta: f64) -> Result<Self, SnsppError> {
        if !dataset.is_scalar() {
            return Err(SnsppError::InvalidBlockSize(dataset.block_size(0), 0));
        }
        if delta <= 0.0 {
            return Err(SnsppError::NonPositiveStepSize(delta));
        }
        Ok(Self { dataset, delta })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }
}

impl Loss for HuberLoss {
    fn name(&self) -> &'static str {
        "huber"
    }

    fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn is_convex(&self) -> bool {
        true
    }

    fn weak_conv(&self, _i: usize) -> f64 {
        0.0
    }

    fn family_lipschitz_constant(&self) -> f64 {
        1.0
    }

    fn f_i(&self, z: &[f64], i: usize) -> f64 {
        let b = self.dataset.target_of(i)[0];
        let u = z[0] - b;
        if u.abs() <= self.delta {
            0.5 * u * u
        } else {
            self.delta * (u.abs() - 0.5 * self.delta)
        }
    }

    fn g_i(&self, z: &[f64], i: usize) -> Vec<f64> {
        let b = self.dataset.target_of(i)[0];
        let u = z[0] - b;
        let g = if u.abs() <= self.delta {
            u
        } else {
            self.delta * u.signum()
        };
        vec![g]
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
        vec![0.0]
    }

    fn as_scalar(&self) -> Option<&dyn ScalarLoss> {
        Some(self)
    }
}

impl ScalarLoss for HuberLoss {
    fn f_scalar(&self, z: f64, i: usize) -> f64 {
        self.f_i(&[z], i)
    }

    fn g_scalar(&self, z: f64, i: usize) -> f64 {
        self.g_i(&[z], i)[0]
    }

    fn fstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError> {
        if xi.abs() > self.delta {
            return Err(SnsppError::OutsideConjugateDomain);
        }
        let b = self.dataset.target_of(i)[0];
        Ok(0.5 * xi * xi + b * xi)
    }

    fn gstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError> {
        if xi.abs() > self.delta {
            return Err(SnsppError::OutsideConjugateDomain);
        }
        let b = self.dataset.target_of(i)[0];
        Ok(xi + b)
    }

    fn hstar_scalar(&self, xi: f64, _i: usize) -> Result<f64, SnsppError> {
        if xi.abs() > self.delta {
            return Err(SnsppError::OutsideConjugateDomain);
        }
        Ok(1.0)
    }
}
