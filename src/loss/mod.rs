mod huber;
mod logistic;
mod squared;
mod tstudent;

pub use huber::HuberLoss;
pub use logistic::LogisticLoss;
pub use squared::SquaredLoss;
pub use tstudent::TStudentLoss;

use nalgebra::{DMatrix, DVector};

use crate::dataset::Dataset;
use crate::error::SnsppError;

/// The loss contract of spec §3/§4.1: `f(x) = (1/N) sum_i f_i(A_i x)`.
///
/// Every operation is pure — no hidden state, `ξ`/`i` are always passed
/// explicitly (spec §9 design note on avoiding cyclic dependencies between
/// `f*` evaluation and subproblem geometry).
pub trait Loss {
    /// Short tag used for step-size heuristics and diagnostics (e.g.
    /// `"squared"`, `"logistic"`).
    fn name(&self) -> &'static str;

    fn dataset(&self) -> &Dataset;

    fn n_samples(&self) -> usize {
        self.dataset().n_samples()
    }

    /// Whether `f_i` is convex for every `i`.
    fn is_convex(&self) -> bool;

    /// Weak-convexity constant `gamma_i >= 0` such that `f_i + gamma_i/2
    /// ||.||^2` is convex. Zero for convex losses.
    fn weak_conv(&self, i: usize) -> f64;

    /// Loss-family Lipschitz constant `L_i` used in the default step-size
    /// formula (spec §4.9) and the SAGA/SVRG step default (spec §4.3):
    /// `1/4` for logistic, `2` for squared.
    fn family_lipschitz_constant(&self) -> f64;

    /// `f_i(z)`, where `z` has length `m_i`.
    fn f_i(&self, z: &[f64], i: usize) -> f64;

    /// `g_i(z) = grad f_i(z)`, length `m_i`.
    fn g_i(&self, z: &[f64], i: usize) -> Vec<f64>;

    /// `f_i*(xi)`, the convex conjugate evaluated at a dual block of length
    /// `m_i`. Returns `SnsppError::OutsideConjugateDomain` if `xi` falls
    /// outside `f_i*`'s finite domain (e.g. logistic's `[-1, 0]`).
    fn fstar(&self, xi: &[f64], i: usize) -> Result<f64, SnsppError>;

    /// `g_i*(xi) = grad f_i*(xi)`, length `m_i`.
    fn gstar(&self, xi: &[f64], i: usize) -> Result<Vec<f64>, SnsppError>;

    /// `H_i*(xi) = grad^2 f_i*(xi)`, an `m_i x m_i` positive semidefinite
    /// matrix (a `1x1` matrix in the scalar case).
    fn hstar(&self, xi: &[f64], i: usize) -> Result<DMatrix<f64>, SnsppError>;

    /// A reasonable starting dual value for sample `i`, used to initialize
    /// `xi` when the caller does not supply one (spec's `get_xi_start_point`
    /// in the original implementation).
    fn default_dual_start(&self, i: usize) -> Vec<f64>;

    /// Full objective `f(x) = (1/N) sum_i f_i(A_i x)`.
    fn eval(&self, x: &DVector<f64>) -> f64 {
        let ds = self.dataset();
        let n = ds.n_samples() as f64;
        let mut acc = 0.0;
        for i in 0..ds.n_samples() {
            let a_i = ds.rows_matrix(i);
            let z = a_i * x;
            acc += self.f_i(z.as_slice(), i);
        }
        acc / n
    }

    /// As a convenience, indicates whether this loss exposes the scalar
    /// (`m_i = 1`) fast-path vectorized operations. Present only when every
    /// block in the dataset has size 1 AND the concrete type implements
    /// `ScalarLoss` — see `Loss::as_scalar`.
    fn as_scalar(&self) -> Option<&dyn ScalarLoss> {
        None
    }
}

/// Vectorized scalar-case (`m_i = 1`) operations. Implementing this trait
/// (and overriding `Loss::as_scalar` to return `Some(self)`) is the signal
/// spec §3 describes: "a vectorized `fstar_vec` is exposed ... is the signal
/// that the easy fast path applies".
pub trait ScalarLoss: Loss {
    fn f_scalar(&self, z: f64, i: usize) -> f64;
    fn g_scalar(&self, z: f64, i: usize) -> f64;
    fn fstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError>;
    fn gstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError>;
    fn hstar_scalar(&self, xi: f64, i: usize) -> Result<f64, SnsppError>;

    /// Vectorized `f*` over an entire dual vector/batch; `samples[l]` names
    /// the original sample index backing `xi_vec[l]`, needed because `f*` can
    /// be per-sample (e.g. logistic folds in `b_i`, squared needs `b_i`).
    fn fstar_vec(&self, xi_vec: &DVector<f64>, samples: &[usize]) -> Result<DVector<f64>, SnsppError> {
        let mut out = DVector::zeros(xi_vec.len());
        for (l, &i) in samples.iter().enumerate() {
            out[l] = self.fstar_scalar(xi_vec[l], i)?;
        }
        Ok(out)
    }

    fn gstar_vec(&self, xi_vec: &DVector<f64>, samples: &[usize]) -> Result<DVector<f64>, SnsppError> {
        let mut out = DVector::zeros(xi_vec.len());
        for (l, &i) in samples.iter().enumerate() {
            out[l] = self.gstar_scalar(xi_vec[l], i)?;
        }
        Ok(out)
    }

    fn hstar_vec(&self, xi_vec: &DVector<f64>, samples: &[usize]) -> Result<DVector<f64>, SnsppError> {
        let mut out = DVector::zeros(xi_vec.len());
        for (l, &i) in samples.iter().enumerate() {
            out[l] = self.hstar_scalar(xi_vec[l], i)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Central-difference derivative, used across loss unit tests to verify
    /// `gstar`/`Hstar` against numerical derivatives of `fstar` (spec §8).
    pub fn central_diff<F: Fn(f64) -> f64>(f: F, x: f64, h: f64) -> f64 {
        (f(x + h) - f(x - h)) / (2.0 * h)
    }
}
