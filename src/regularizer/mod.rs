mod l1;

pub use l1::L1Regularizer;

use nalgebra::DVector;

/// The regularizer contract of spec §4.2: `phi(x)`, its proximal operator,
/// the proximal operator's (generalized) Jacobian, and the Moreau envelope.
pub trait Regularizer {
    fn eval(&self, x: &DVector<f64>) -> f64;

    /// `prox_{alpha*phi}(x) = argmin_z phi(z) + (1/(2*alpha))||z-x||^2`.
    fn prox(&self, x: &DVector<f64>, alpha: f64) -> DVector<f64>;

    /// A generalized Jacobian of `prox_{alpha*phi}` at `x`, used as the
    /// (diagonal, for separable regularizers) correction term in the
    /// semismooth Newton system (spec §4.7). Represented as the diagonal
    /// itself since every regularizer this crate supports is separable.
    fn jacobian_prox_diag(&self, x: &DVector<f64>, alpha: f64) -> DVector<f64>;

    /// `moreau(x, alpha) = alpha*phi(prox_{alpha*phi}(x)) + (1/2)||prox_{alpha*phi}(x)-x||^2`.
    fn moreau(&self, x: &DVector<f64>, alpha: f64) -> f64 {
        let z = self.prox(x, alpha);
        let diff = &z - x;
        alpha * self.eval(&z) + 0.5 * diff.norm_squared()
    }
}
