pub mod cg;
pub mod dataset;
pub mod dual;
pub mod error;
pub mod gradient_table;
pub mod history;
pub mod loss;
pub mod params;
pub mod problem;
pub mod regularizer;
pub mod sampler;
pub mod solver;

pub mod prelude {
    pub use crate::{
        dataset::Dataset,
        dual::{BlockDual, DualContainer, ScalarDual},
        error::SnsppError,
        history::{History, MeanIterateTracker, SolveOutcome, SolveStatus, SsnInfo},
        loss::{HuberLoss, Loss, LogisticLoss, ScalarLoss, SquaredLoss, TStudentLoss},
        params::{NewtonParams, SampleStyle, SolverParams},
        problem::Problem,
        regularizer::{L1Regularizer, Regularizer},
        solver::{adagrad, saga, snspp, svrg},
    };

    pub use nalgebra;
}
