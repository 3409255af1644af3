use rand::Rng;

use crate::params::SampleStyle;

/// Draws `size` indices from `0..n` uniformly with replacement, returned in
/// ascending order (spec §4.10) — callers downstream (the subproblem solver)
/// rely on `S` already being sorted to build `A_S` by a single contiguous
/// row-selection.
pub fn uniform_with_replacement<R: Rng + ?Sized>(rng: &mut R, n: usize, size: usize) -> Vec<usize> {
    let mut s: Vec<usize> = (0..size).map(|_| rng.random_range(0..n)).collect();
    s.sort_unstable();
    s
}

/// Cyclic batcher: walks `0..n` in consecutive, wrapping chunks of
/// `batch_size`. Unused by the default sampling path; kept for
/// reproducibility studies (spec §4.10).
pub struct CyclicBatcher {
    n: usize,
    batch_size: usize,
    cursor: usize,
}

impl CyclicBatcher {
    pub fn new(n: usize, batch_size: usize) -> Self {
        Self {
            n,
            batch_size,
            cursor: 0,
        }
    }

    pub fn next_batch(&mut self) -> Vec<usize> {
        let mut batch: Vec<usize> = (0..self.batch_size)
            .map(|k| (self.cursor + k) % self.n)
            .collect();
        self.cursor = (self.cursor + self.batch_size) % self.n;
        batch.sort_unstable();
        batch
    }
}

/// Exponential batch-size ramp (spec §4.6): grows from `batch/4` at t=0 to
/// `batch` at the ramp horizon, held constant afterward. `style` selects the
/// ramp horizon: `Increasing` uses `min(max_iter-1, 18)`, `FastIncreasing`
/// caps it at 10 regardless of `max_iter` (ported from the reference
/// implementation's `batch_size_constructor`).
pub fn batch_size_schedule(style: SampleStyle, batch: usize, max_iter: usize) -> Vec<usize> {
    match style {
        SampleStyle::Constant => vec![batch; max_iter],
        SampleStyle::Increasing => ramp_schedule(batch, max_iter, 18),
        SampleStyle::FastIncreasing => ramp_schedule(batch, max_iter, 10),
    }
}

fn ramp_schedule(batch: usize, max_iter: usize, cutoff: usize) -> Vec<usize> {
    let a = batch as f64 / 4.0;
    let b = batch as f64;
    let m_full = max_iter.saturating_sub(1);
    let m_eff = if m_full > cutoff {
        cutoff
    } else {
        m_full.max(1)
    } as f64;
    let c1 = (b / a).ln() / m_eff;
    let c2 = a.ln();
    (0..max_iter)
        .map(|t| {
            let tt = t.min(cutoff) as f64;
            let y = (c1 * tt + c2).exp();
            y.max(1.0) as usize
        })
        .collect()
}
