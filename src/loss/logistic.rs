use nalgebra::DMatrix;

use crate::dataset::Dataset;
use crate::error::SnsppError;

use super::{Loss, ScalarLoss};

/// Logistic loss `f_i(z) = log(1+e^{-z})`. The data-preprocessing convention
/// folds the label into the design matrix row (`A_i = b_i * a_i`), so the
/// loss itself is written without a separate label index — row `i` of the
/// dataset must already carry this product. Scalar-only, `m_i = 1`.
pub struct LogisticLoss {
    dataset: Dataset,
}

impl LogisticLoss {
    pub fn new(dataset: Dataset) -> Result<Self, SnsppError> {
        if !dataset.is_scalar() {
            return Err(SnsppError::InvalidBlockSize(dataset.block_size(0), 0));
        }
        Ok(Self { dataset })
    }
}

fn f_scalar_impl(z: f64) -> f64 {
    (1.0 + (-z).exp()).ln()
}

fn g_scalar_impl(z: f64) -> f64 {
    -1.0 / (1.0 + z.exp())
}

impl Loss for LogisticLoss {
    fn name(&self) -> &'static str {
        "logistic"
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
        0.25
    }

    fn f_i(&self, z: &[f64], _i: usize) -> f64 {
        f_scalar_impl(z[0])
    }

    fn g_i(&self, z: &[f64], _i: usize) -> Vec<f64> {
        vec![g_scalar_impl(z[0])]
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
        vec![-0.5]
    }

    fn as_scalar(&self) -> Option<&dyn ScalarLoss> {
        Some(self)
    }
}

impl ScalarLoss for LogisticLoss {
    fn f_scalar(&self, z: f64, _i: usize) -> f64 {
        f_scalar_impl(z)
    }

    fn g_scalar(&self, z: f64, _i: usize) -> f64 {
        g_scalar_impl(z)
    }

    /// `f*(xi) = -xi*log(-xi) + (1+xi)*log(1+xi)`, finite on `(-1, 0)`, with
    /// the two boundary points defined by continuity (`f* = 0`).
    fn fstar_scalar(&self, xi: f64, _i: usize) -> Result<f64, SnsppError> {
        if xi > 0.0 || xi < -1.0 {
            return Err(SnsppError::OutsideConjugateDomain);
        }
        if xi == 0.0 || xi == -1.0 {
            return Ok(0.0);
        }
        Ok(-xi * (-xi).ln() + (1.0 + xi) * (1.0 + xi).ln())
    }

    fn gstar_scalar(&self, xi: f64, _i: usize) -> Result<f64, SnsppError> {
        if xi > 0.0 || xi < -1.0 {
            return Err(SnsppError::OutsideConjugateDomain);
        }
        if xi == 0.0 || xi == -1.0 {
            return Ok((xi + 0.5).signum() * 1e8);
        }
        Ok((-(1.0 + xi) / xi).ln())
    }

    fn hstar_scalar(&self, xi: f64, _i: usize) -> Result<f64, SnsppError> {
        if xi > 0.0 || xi < -1.0 {
            return Err(SnsppError::OutsideConjugateDomain);
        }
        if xi == 0.0 || xi == -1.0 {
            return Ok(1e8);
        }
        Ok(-1.0 / (xi * xi + xi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn fixture() -> LogisticLoss {
        let a = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let b = vec![0.0, 0.0];
        LogisticLoss::new(Dataset::scalar(a, b).unwrap()).unwrap()
    }

    #[test]
    fn rejects_block_dataset() {
        let a = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let b = vec![0.0, 0.0];
        let ds = Dataset::new(a, b, vec![2]).unwrap();
        assert!(LogisticLoss::new(ds).is_err());
    }

    #[test]
    fn fstar_outside_domain_errors() {
        let loss = fixture();
        assert!(matches!(
            loss.fstar_scalar(0.5, 0),
            Err(SnsppError::OutsideConjugateDomain)
        ));
        assert!(matches!(
            loss.fstar_scalar(-1.5, 0),
            Err(SnsppError::OutsideConjugateDomain)
        ));
    }

    #[test]
    fn gstar_matches_central_difference_of_fstar() {
        let loss = fixture();
        let h = 1e-6;
        for xi in [-0.9, -0.7, -0.5, -0.3, -0.1] {
            let d = super::super::test_support::central_diff(
                |t| loss.fstar_scalar(t, 0).unwrap(),
                xi,
                h,
            );
            assert_abs_diff_eq!(d, loss.gstar_scalar(xi, 0).unwrap(), epsilon = 1e-4);
        }
    }

    #[test]
    fn default_dual_start_is_minus_one_half() {
        let loss = fixture();
        assert_eq!(loss.default_dual_start(0), vec![-0.5]);
    }

    proptest! {
        /// Spec §8 "Conjugate consistency", sampled across the whole open
        /// domain `(-1, 0)` on which logistic's `f*` is finite.
        #[test]
        fn gstar_matches_central_difference_of_fstar_property(xi in -0.98f64..-0.02) {
            let loss = fixture();
            let h = 1e-6;
            let d = super::super::test_support::central_diff(
                |t| loss.fstar_scalar(t, 0).unwrap(),
                xi,
                h,
            );
            prop_assert!((d - loss.gstar_scalar(xi, 0).unwrap()).abs() < 1e-3);
        }
    }
}
