use nalgebra::DMatrix;

use crate::dataset::Dataset;
use crate::error::SnsppError;

use super::{Loss, ScalarLoss};

/// Squared loss `f_i(z) = ||z - b_i||^2`, the block generalization of
/// ordinary least squares (`lsq`/`block_lsq` in the reference
/// implementation). Always convex, `weak_conv = 0`.
pub struct SquaredLoss {
    dataset: Dataset,
}

impl SquaredLoss {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }
}

impl Loss for SquaredLoss {
    fn name(&self) -> &'static str {
        "squared"
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
        2.0
    }

    fn f_i(&self, z: &[f64], i: usize) -> f64 {
        let b = self.dataset.target_of(i);
        z.iter().zip(b).map(|(zj, bj)| (zj - bj).powi(2)).sum()
    }

    fn g_i(&self, z: &[f64], i: usize) -> Vec<f64> {
        let b = self.dataset.target_of(i);
        z.iter().zip(b).map(|(zj, bj)| 2.0 * (zj - bj)).collect()
    }

    fn fstar(&self, xi: &[f64], i: usize) -> Result<f64, SnsppError> {
        let b = self.dataset.target_of(i);
        let sq: f64 = xi.iter().map(|x| x * x).sum();
        let lin: f64 = xi.iter().zip(b).map(|(x, bj)| x * bj).sum();
        Ok(0.25 * sq + lin)
    }

    fn gstar(&self, xi: &[f64], i: usize) -> Result<Vec<f64>, SnsppError> {
        let b = self.dataset.target_of(i);
        Ok(xi.iter().zip(b).map(|(x, bj)| 0.5 * x + bj).collect())
    }

    fn hstar(&self, xi: &[f64], _i: usize) -> Result<DMatrix<f64>, SnsppError> {
        Ok(DMatrix::identity(xi.len(), xi.len()) * 0.5)
    }

    fn default_dual_start(&self, i: usize) -> Vec<f64> {
        vec![0.0; self.dataset.block_size(i)]
    }

    fn as_scalar(&self) -> Option<&dyn ScalarLoss> {
        if self.dataset.is_scalar() {
            Some(self)
        } else {
            None
        }
    }
}

impl ScalarLoss for SquaredLoss {
    fn f_scalar(&self, z: f64, i: usize) -> f64 {
        let b = self.dataset.target_of(i)[0];
        (z - b).powi(2)
    }

    fn g_scalar(&self, z: f64, i: usize) -> f64 {
        let b = self.dataset.target_of(i)[0];
        2.0 * (z - b)
    }

    fn fstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError> {
        let b = self.dataset.target_of(i)[0];
        Ok(0.25 * xi * xi + b * xi)
    }

    fn gstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError> {
        let b = self.dataset.target_of(i)[0];
        Ok(0.5 * xi + b)
    }

    fn hstar_scalar(&self, _xi: f64, _i: usize) -> Result<f64, SnsppError> {
        Ok(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix as Mat;
    use proptest::prelude::*;

    fn fixture() -> SquaredLoss {
        let a = Mat::from_row_slice(3, 1, &[1.0, 1.0, 1.0]);
        let b = vec![1.0, 2.0, 3.0];
        SquaredLoss::new(Dataset::scalar(a, b).unwrap())
    }

    #[test]
    fn gstar_matches_central_difference_of_fstar() {
        let loss = fixture();
        let h = 1e-6;
        for xi in [-1.5, -0.2, 0.0, 0.7, 2.3] {
            let d = super::super::test_support::central_diff(
                |t| loss.fstar_scalar(t, 1).unwrap(),
                xi,
                h,
            );
            assert_abs_diff_eq!(d, loss.gstar_scalar(xi, 1).unwrap(), epsilon = 1e-5);
        }
    }

    #[test]
    fn block_path_matches_scalar_path_for_singleton_blocks() {
        let loss = fixture();
        assert_eq!(loss.fstar(&[0.5], 0).unwrap(), loss.fstar_scalar(0.5, 0).unwrap());
        assert_eq!(loss.gstar(&[0.5], 0).unwrap(), vec![loss.gstar_scalar(0.5, 0).unwrap()]);
    }

    #[test]
    fn weak_conv_is_zero() {
        let loss = fixture();
        assert_eq!(loss.weak_conv(0), 0.0);
        assert!(loss.is_convex());
    }

    proptest! {
        /// Spec §8 "Conjugate consistency": `gstar` matches the numerical
        /// derivative of `fstar` across the conjugate domain (here, all of
        /// `R`, since squared loss has no domain restriction).
        #[test]
        fn gstar_matches_central_difference_of_fstar_property(xi in -50.0f64..50.0) {
            let loss = fixture();
            let h = 1e-6;
            let d = super::super::test_support::central_diff(
                |t| loss.fstar_scalar(t, 1).unwrap(),
                xi,
                h,
            );
            prop_assert!((d - loss.gstar_scalar(xi, 1).unwrap()).abs() < 1e-4);
        }
    }
}
