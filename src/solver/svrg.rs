use std::time::Instant;

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SnsppError;
use crate::history::{relative_sup_norm_change, History, MeanIterateTracker, SolveOutcome, SolveStatus};
use crate::loss::Loss;
use crate::params::SolverParams;
use crate::regularizer::Regularizer;

/// Full-gradient recompute at a snapshot `x_tilde`: `(1/N) sum_i A_i^T
/// g_i(A_i x_tilde)`.
fn full_gradient(loss: &dyn Loss, x: &DVector<f64>) -> DVector<f64> {
    let ds = loss.dataset();
    let big_n = ds.n_samples();
    let mut g = DVector::zeros(ds.n_features());
    for i in 0..big_n {
        let a_i = ds.rows_matrix(i);
        let z = &a_i * x;
        g += a_i.transpose() * DVector::from_vec(loss.g_i(z.as_slice(), i));
    }
    g / big_n as f64
}

/// SVRG (spec §4.4): an outer loop that snapshots `x_tilde` and its full
/// gradient, and an inner loop of variance-reduced stochastic steps against
/// that snapshot. The inner loop length is taken proportional to
/// `batch_size` (the knob spec §4.4 calls out), with `batch_size` itself as
/// the proportionality constant — one inner pass draws `batch_size` samples.
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
    let inner_loop_len = params.batch_size;

    let alpha = match params.alpha {
        Some(a) => a,
        None => {
            let max_norm_sq = ds.max_row_block_norm_sq();
            let l = loss.family_lipschitz_constant() * max_norm_sq;
            if l <= 0.0 {
                log::warn!("could not determine an SVRG step size from the loss family; falling back to a conservative default");
                1e-2
            } else {
                1.0 / (3.0 * l)
            }
        }
    };

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut x_t = x0.clone();
    let mut history = History::new();
    let mut mean_tracker = params.track_mean_iterate.then(|| MeanIterateTracker::new(x0.len()));

    let mut status = SolveStatus::MaxIterationsReached;
    let mut eval_count = 0.0;

    for outer in 0..params.max_iter {
        let start = Instant::now();
        let x_tilde = x_t.clone();
        let full_g = full_gradient(loss, &x_tilde);
        eval_count += big_n as f64 / big_n as f64;

        let x_before_outer = x_t.clone();
        for _ in 0..inner_loop_len {
            let j = rng.random_range(0..big_n);
            let a_j = ds.rows_matrix(j);

            let z_cur = &a_j * &x_t;
            let g_cur = a_j.transpose() * DVector::from_vec(loss.g_i(z_cur.as_slice(), j));

            let z_tilde = &a_j * &x_tilde;
            let g_tilde = a_j.transpose() * DVector::from_vec(loss.g_i(z_tilde.as_slice(), j));

            let direction = &g_cur - &g_tilde + &full_g;
            let w_t = &x_t - &direction * alpha;
            x_t = reg.prox(&w_t, alpha);

            if let Some(tracker) = mean_tracker.as_mut() {
                tracker.update(&x_t, alpha);
            }
            eval_count += 1.0 / big_n as f64;
        }

        let runtime = start.elapsed().as_secs_f64();
        let eta = relative_sup_norm_change(&x_t, &x_before_outer);
        let objective = params.measure.then(|| loss.eval(&x_t) + reg.eval(&x_t));
        history.push_iteration(x_t.clone(), alpha, runtime, vec![], eval_count, objective, None);
        log::debug!("svrg outer iteration {} eta={:.3e}", outer, eta);

        if eta <= params.tol {
            status = SolveStatus::Optimal;
            break;
        }
    }

    log::debug!("SVRG terminated with status {:?}", status);

    Ok(SolveOutcome {
        x: x_t,
        mean_iterate: mean_tracker.and_then(|t| t.mean()),
        status,
        history,
    })
}
