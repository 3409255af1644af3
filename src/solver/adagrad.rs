use std::time::Instant;

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SnsppError;
use crate::history::{relative_sup_norm_change, History, MeanIterateTracker, SolveOutcome, SolveStatus};
use crate::loss::Loss;
use crate::params::SolverParams;
use crate::regularizer::Regularizer;

const ADAGRAD_EPS: f64 = 1e-8;

/// AdaGrad-prox (spec §4.5): accumulates a per-coordinate running sum of
/// squared stochastic gradients and uses `diag(alpha / sqrt(s + eps))` as
/// the effective step before the prox step.
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
    let batch_size = params.batch_size.min(big_n);
    let alpha = params.alpha.unwrap_or(1.0);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut x_t = x0.clone();
    let mut s = DVector::zeros(x0.len());
    let mut history = History::new();
    let mut mean_tracker = params.track_mean_iterate.then(|| MeanIterateTracker::new(x0.len()));

    let mut status = SolveStatus::MaxIterationsReached;
    let mut eta = f64::INFINITY;
    let mut last_epoch_x = x_t.clone();

    let steps_per_batch = total_steps / batch_size.max(1);
    for t in 0..steps_per_batch.max(1) {
        if eta <= params.tol {
            status = SolveStatus::Optimal;
            break;
        }

        let start = Instant::now();
        let batch: Vec<usize> = (0..batch_size).map(|_| rng.random_range(0..big_n)).collect();
        let mut g_sum = DVector::zeros(x0.len());
        for &j in &batch {
            let a_j = ds.rows_matrix(j);
            let z_j = &a_j * &x_t;
            g_sum += a_j.transpose() * DVector::from_vec(loss.g_i(z_j.as_slice(), j));
        }
        let g = g_sum / batch_size as f64;

        s += g.component_mul(&g);
        let step = DVector::from_vec(
            g.iter()
                .zip(s.iter())
                .map(|(gj, sj)| alpha * gj / (sj + ADAGRAD_EPS).sqrt())
                .collect::<Vec<_>>(),
        );
        let w_t = &x_t - &step;
        x_t = reg.prox(&w_t, alpha);
        let runtime = start.elapsed().as_secs_f64();

        if let Some(tracker) = mean_tracker.as_mut() {
            tracker.update(&x_t, alpha);
        }

        let objective = params.measure.then(|| loss.eval(&x_t) + reg.eval(&x_t));
        history.push_iteration(
            x_t.clone(),
            alpha,
            runtime,
            batch,
            (t + 1) as f64 * batch_size as f64 / big_n as f64,
            objective,
            None,
        );

        if t % (big_n / batch_size.max(1)).max(1) == 0 {
            eta = relative_sup_norm_change(&x_t, &last_epoch_x);
            last_epoch_x = x_t.clone();
            log::debug!("adagrad step {} eta={:.3e}", t, eta);
        }
    }

    if eta <= params.tol {
        status = SolveStatus::Optimal;
    }
    log::debug!("AdaGrad-prox terminated with status {:?}", status);

    Ok(SolveOutcome {
        x: x_t,
        mean_iterate: mean_tracker.and_then(|t| t.mean()),
        status,
        history,
    })
}
