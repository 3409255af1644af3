use nalgebra::DVector;

use crate::error::SnsppError;

use super::Regularizer;

/// `phi(x) = lambda1 * ||x||_1`, the Lasso penalty (`Norm1` in the reference
/// implementation).
pub struct L1Regularizer {
    lambda1: f64,
}

impl L1Regularizer {
    pub fn new(lambda1: f64) -> Result<Self, SnsppError> {
        if lambda1 <= 0.0 {
            return Err(SnsppError::NonPositiveLambda(lambda1));
        }
        Ok(Self { lambda1 })
    }

    pub fn lambda1(&self) -> f64 {
        self.lambda1
    }
}

impl Regularizer for L1Regularizer {
    fn eval(&self, x: &DVector<f64>) -> f64 {
        self.lambda1 * x.iter().map(|v| v.abs()).sum::<f64>()
    }

    fn prox(&self, x: &DVector<f64>, alpha: f64) -> DVector<f64> {
        let l = alpha * self.lambda1;
        x.map(|v| v.signum() * (v.abs() - l).max(0.0))
    }

    fn jacobian_prox_diag(&self, x: &DVector<f64>, alpha: f64) -> DVector<f64> {
        let l = alpha * self.lambda1;
        x.map(|v| if v.abs() > l { 1.0 } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(3.0, 1.0, 1.0 => 2.0; "shrinks above threshold")]
    #[test_case(0.5, 1.0, 1.0 => 0.0; "clamps to zero below threshold")]
    #[test_case(-3.0, 1.0, 1.0 => -2.0; "preserves sign")]
    fn soft_threshold_scalar(v: f64, lambda1: f64, alpha: f64) -> f64 {
        let reg = L1Regularizer::new(lambda1).unwrap();
        let x = DVector::from_vec(vec![v]);
        reg.prox(&x, alpha)[0]
    }

    #[test]
    fn jacobian_prox_is_zero_one_active_set_indicator() {
        let reg = L1Regularizer::new(1.0).unwrap();
        let x = DVector::from_vec(vec![3.0, 0.5, -3.0]);
        let d = reg.jacobian_prox_diag(&x, 1.0);
        assert_eq!(d, DVector::from_vec(vec![1.0, 0.0, 1.0]));
    }

    #[test]
    fn rejects_nonpositive_lambda() {
        assert!(L1Regularizer::new(0.0).is_err());
        assert!(L1Regularizer::new(-1.0).is_err());
    }

    #[test]
    fn moreau_envelope_is_smooth_surrogate() {
        let reg = L1Regularizer::new(1.0).unwrap();
        let x = DVector::from_vec(vec![0.5]);
        // inside the threshold region, prox(x) = 0, so moreau = alpha*0 + .5*x^2
        let m = reg.moreau(&x, 1.0);
        assert!((m - 0.5 * 0.25).abs() < 1e-12);
    }

    proptest! {
        /// Spec §8 "Prox correctness": `prox(x,alpha) = sign(x)*max(|x|-alpha*lambda,0)`
        /// for every `x`, `alpha > 0`, `lambda > 0`.
        #[test]
        fn prox_matches_soft_threshold_definition(
            v in -50.0f64..50.0,
            lambda1 in 0.01f64..10.0,
            alpha in 0.01f64..10.0,
        ) {
            let reg = L1Regularizer::new(lambda1).unwrap();
            let x = DVector::from_vec(vec![v]);
            let z = reg.prox(&x, alpha);
            let l = alpha * lambda1;
            let expected = v.signum() * (v.abs() - l).max(0.0);
            prop_assert!((z[0] - expected).abs() < 1e-9);
        }

        /// Spec §8 "Prox correctness": do **not** assert idempotence; instead
        /// assert `moreau` equals the definitional minimum of
        /// `alpha*phi(z) + 0.5*||z-x||^2` over a grid of candidate `z`.
        #[test]
        fn moreau_equals_definitional_minimum_over_grid(
            v in -20.0f64..20.0,
            lambda1 in 0.05f64..5.0,
            alpha in 0.05f64..5.0,
        ) {
            let reg = L1Regularizer::new(lambda1).unwrap();
            let x = DVector::from_vec(vec![v]);
            let m = reg.moreau(&x, alpha);

            let prox_v = reg.prox(&x, alpha)[0];
            let mut min_grid = f64::INFINITY;
            for k in -200..=200 {
                let z = prox_v + (k as f64) * 0.01;
                let candidate = alpha * lambda1 * z.abs() + 0.5 * (z - v).powi(2);
                min_grid = min_grid.min(candidate);
            }
            prop_assert!(m <= min_grid + 1e-9);
        }
    }
}
