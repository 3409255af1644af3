use nalgebra::DVector;

use crate::error::SnsppError;
use crate::history::SolveOutcome;
use crate::loss::Loss;
use crate::params::SolverParams;
use crate::regularizer::Regularizer;
use crate::solver::{adagrad, saga, snspp, svrg};

/// Top-level entry point (spec §6 "Solver entry"): owns a loss, a
/// regularizer, a starting point, and the tuning knobs, and dispatches by
/// name to one of the four solver backends.
pub struct Problem<'a> {
    loss: &'a dyn Loss,
    reg: &'a dyn Regularizer,
    x0: DVector<f64>,
    params: SolverParams,
}

impl<'a> Problem<'a> {
    pub fn new(loss: &'a dyn Loss, reg: &'a dyn Regularizer, x0: DVector<f64>, params: SolverParams) -> Self {
        Self { loss, reg, x0, params }
    }

    /// Runs the named solver (`"saga"`, `"svrg"`, `"adagrad"`, or `"snspp"`).
    pub fn solve(&self, solver: &str) -> Result<SolveOutcome, SnsppError> {
        match solver {
            "saga" => saga::solve(self.loss, self.reg, &self.x0, &self.params),
            "svrg" => svrg::solve(self.loss, self.reg, &self.x0, &self.params),
            "adagrad" => adagrad::solve(self.loss, self.reg, &self.x0, &self.params),
            "snspp" => snspp::solve(self.loss, self.reg, &self.x0, &self.params),
            other => Err(SnsppError::UnknownSolver(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::history::SolveStatus;
    use crate::loss::SquaredLoss;
    use crate::regularizer::L1Regularizer;
    use nalgebra::DMatrix;

    fn lasso_fixture() -> (SquaredLoss, L1Regularizer) {
        let a = DMatrix::from_row_slice(4, 3, &[
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
            1.0, 1.0, 1.0,
        ]);
        let b = vec![1.0, 1.0, 1.0, 3.0];
        (SquaredLoss::new(Dataset::scalar(a, b).unwrap()), L1Regularizer::new(0.01).unwrap())
    }

    #[test]
    fn dispatches_to_each_known_solver() {
        let (loss, reg) = lasso_fixture();
        let x0 = DVector::zeros(3);
        let problem = Problem::new(&loss, &reg, x0, SolverParams::default().with_max_iter(20).with_batch_size(4));

        for name in ["saga", "svrg", "adagrad", "snspp"] {
            let outcome = problem.solve(name).unwrap();
            assert!(outcome.x.iter().all(|v| v.is_finite()), "{name} produced a non-finite iterate");
            assert!(matches!(outcome.status, SolveStatus::Optimal | SolveStatus::MaxIterationsReached));
        }
    }

    #[test]
    fn rejects_unknown_solver_name() {
        let (loss, reg) = lasso_fixture();
        let x0 = DVector::zeros(3);
        let problem = Problem::new(&loss, &reg, x0, SolverParams::default());
        let err = problem.solve("not-a-solver").unwrap_err();
        assert!(matches!(err, SnsppError::UnknownSolver(name) if name == "not-a-solver"));
    }
}
