use crate::loss::Loss;

/// Default SNSPP step size (spec §4.9), used whenever the caller does not
/// supply `alpha` directly. `m` is the Newton inner-iteration parameter
/// (`newton_params.max_iter` in this crate), `b` the batch size, `eta_sched`
/// fixed at 0.5 per the reference implementation.
pub fn default_step_size(loss: &dyn Loss, batch_size: usize, m: usize, eta_sched: f64) -> f64 {
    let ds = loss.dataset();
    let mean_norm_sq = ds.mean_row_block_norm_sq();
    let max_norm_sq = ds.max_row_block_norm_sq();

    let weak_conv_max = if loss.is_convex() {
        0.0
    } else {
        (0..ds.n_samples())
            .map(|i| loss.weak_conv(i))
            .fold(0.0, f64::max)
    };
    let cap_m = if loss.is_convex() {
        0.0
    } else {
        weak_conv_max * max_norm_sq
    };

    let l_i = loss.family_lipschitz_constant();
    let l = l_i * mean_norm_sq;
    let l_tilde = l_i * max_norm_sq;

    let term1 = 2.0 * l + cap_m;
    let term2 = (1.0 + m as f64 / (2.0 * batch_size as f64).sqrt()) * l_tilde + cap_m.max(l);

    let a = (1.0 / eta_sched) * term1.max(term2);
    1.0 / a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::loss::SquaredLoss;
    use nalgebra::DMatrix;

    #[test]
    fn default_step_size_is_positive_and_finite() {
        let a = DMatrix::from_row_slice(4, 3, &[
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
            1.0, 1.0, 1.0,
        ]);
        let b = vec![1.0, 1.0, 1.0, 3.0];
        let loss = SquaredLoss::new(Dataset::scalar(a, b).unwrap());
        let alpha = default_step_size(&loss, 4, 10, 0.5);
        assert!(alpha > 0.0 && alpha.is_finite());
    }
}
