use std::time::Instant;

use nalgebra::DVector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::SnsppError;
use crate::gradient_table::GradientTable;
use crate::history::{relative_sup_norm_change, History, MeanIterateTracker, SolveOutcome, SolveStatus};
use crate::loss::Loss;
use crate::params::SolverParams;
use crate::regularizer::Regularizer;

/// SAGA (spec §4.3): a gradient table of per-sample gradients plus a running
/// sum, updated one sample at a time, with a proximal step at the end of
/// every inner iteration.
pub fn solve(
    loss: &dyn Loss,
    reg: &dyn Regularizer,
    x0: &DVector<f64>,
    params: &SolverParams,
) -> Result<SolveOutcome, SnsppError> {
    params.validate()?;
    let ds = loss.dataset();
    if x0.len() != ds.n_features() {
        return Err(SnsppError::DimensionMismatch {
            got: x0.len(),
            expected: ds.n_features(),
        });
    }

    let big_n = ds.n_samples();
    let n_epochs = params.n_epochs.unwrap_or(10);
    let total_steps = big_n * n_epochs;

    let alpha = match params.alpha {
        Some(a) => a,
        None => {
            let max_norm_sq = ds.max_row_block_norm_sq();
            let l = loss.family_lipschitz_constant() * max_norm_sq;
            if l <= 0.0 {
                log::warn!("could not determine a SAGA step size from the loss family; falling back to a conservative default");
                1e-2
            } else {
                1.0 / (3.0 * l)
            }
        }
    };

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut x_t = x0.clone();
    let mut table = GradientTable::initialize(loss, &x_t);
    let mut history = History::new();
    let mut mean_tracker = params.track_mean_iterate.then(|| MeanIterateTracker::new(x0.len()));

    let mut status = SolveStatus::MaxIterationsReached;
    let mut eta = f64::INFINITY;
    let mut last_epoch_x = x_t.clone();
    let mut iter_t = 0usize;

    for t in 0..total_steps {
        iter_t = t;
        if eta <= params.tol {
            status = SolveStatus::Optimal;
            break;
        }

        let start = Instant::now();
        let j = rng.random_range(0..big_n);
        let a_j = ds.rows_matrix(j);
        let z_j = &a_j * &x_t;
        let g_new = a_j.transpose() * DVector::from_vec(loss.g_i(z_j.as_slice(), j));
        let g_j_old = table.row(j);
        let direction = &g_new - &g_j_old + table.running_sum();
        let w_t = &x_t - &direction * alpha;
        table.update(j, &g_new);

        x_t = reg.prox(&w_t, alpha);
        let runtime = start.elapsed().as_secs_f64();

        if let Some(tracker) = mean_tracker.as_mut() {
            tracker.update(&x_t, alpha);
        }

        let objective = params
            .measure
            .then(|| loss.eval(&x_t) + reg.eval(&x_t));
        history.push_iteration(x_t.clone(), alpha, runtime, vec![j], (t + 1) as f64 / big_n as f64, objective, None);

        if t % big_n == big_n - 1 {
            eta = relative_sup_norm_change(&x_t, &last_epoch_x);
            last_epoch_x = x_t.clone();
            log::debug!("saga epoch {} eta={:.3e}", t / big_n, eta);
        }
    }

    if eta <= params.tol {
        status = SolveStatus::Optimal;
    }
    log::debug!("SAGA terminated after {} iterations with status {:?}", iter_t + 1, status);

    Ok(SolveOutcome {
        x: x_t,
        mean_iterate: mean_tracker.and_then(|t| t.mean()),
        status,
        history,
    })
}
