use thiserror::Error;

/// Errors raised by the core solver engine.
///
/// Only invalid-argument conditions (spec-level "surfaced immediately"
/// failures) and wrapped numerical failures are modeled as `Err`.
/// Numerical warnings (a Newton step failing the descent test, an inner
/// solver hitting its iteration cap) never become an `Err` — they are
/// logged and recorded in diagnostics instead.
#[derive(Error, Debug)]
pub enum SnsppError {
    #[error("design matrix has {rows} rows but sum of block sizes is {expected}")]
    DatasetRowMismatch { rows: usize, expected: usize },

    #[error("starting point has dimension {got} but design matrix has {expected} columns")]
    DimensionMismatch { got: usize, expected: usize },

    #[error("block size m_i must be >= 1, got {0} at sample {1}")]
    InvalidBlockSize(usize, usize),

    #[error("step size alpha must be > 0, got {0}")]
    NonPositiveStepSize(f64),

    #[error("batch_size must be >= 1, got {0}")]
    InvalidBatchSize(usize),

    #[error("newton parameter mu must satisfy 0 < mu < 0.5, got {0}")]
    InvalidMu(f64),

    #[error("newton parameter eta must satisfy 0 < eta < 1, got {0}")]
    InvalidEta(f64),

    #[error("newton parameter tau must satisfy 0 < tau <= 1, got {0}")]
    InvalidTau(f64),

    #[error("newton parameter rho must satisfy 0 < rho < 1, got {0}")]
    InvalidRho(f64),

    #[error("newton parameter cg_max_iter must be >= 1, got {0}")]
    InvalidCgMaxIter(usize),

    #[error("newton parameter max_iter must be >= 1, got {0}")]
    InvalidNewtonMaxIter(usize),

    #[error("regularizer scale lambda must be > 0, got {0}")]
    NonPositiveLambda(f64),

    #[error(
        "variance reduction for nonconvex losses is only supported when every block has m_i = 1"
    )]
    VarianceReductionUnsupportedForNonconvexBlock,

    #[error("unknown solver name: {0}")]
    UnknownSolver(String),

    #[error("conjugate gradient system is singular or produced non-finite values")]
    NonFiniteLinearSystem,

    #[error("value is outside the domain of the convex conjugate (f* = +inf here)")]
    OutsideConjugateDomain,
}
