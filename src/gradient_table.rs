use nalgebra::{DMatrix, DVector};

use crate::loss::Loss;

/// SAGA's per-sample gradient table `G in R^{N x n}` (row i = `A_i^T
/// g_i(A_i x)` at the last time sample i was drawn) plus its running sum
/// `g_bar`, updated incrementally as samples are redrawn (spec §4.3).
pub struct GradientTable {
    table: DMatrix<f64>,
    running_sum: DVector<f64>,
}

impl GradientTable {
    /// Builds the table by evaluating every sample's gradient at `x0`.
    pub fn initialize(loss: &dyn Loss, x0: &DVector<f64>) -> Self {
        let ds = loss.dataset();
        let n_features = ds.n_features();
        let big_n = ds.n_samples();
        let mut table = DMatrix::zeros(big_n, n_features);
        let mut running_sum = DVector::zeros(n_features);
        for i in 0..big_n {
            let a_i = ds.rows_matrix(i);
            let z = &a_i * x0;
            let g = DVector::from_vec(loss.g_i(z.as_slice(), i));
            let row = a_i.transpose() * g;
            running_sum += &row / big_n as f64;
            table.set_row(i, &row.transpose());
        }
        Self {
            table,
            running_sum,
        }
    }

    pub fn running_sum(&self) -> &DVector<f64> {
        &self.running_sum
    }

    pub fn row(&self, i: usize) -> DVector<f64> {
        self.table.row(i).transpose()
    }

    /// Replaces row `j` with `g_new` (already the full-feature gradient
    /// `A_j^T g_j`), updating `g_bar <- g_bar - G_j/N + g_new/N` in place.
    pub fn update(&mut self, j: usize, g_new: &DVector<f64>) {
        let big_n = self.table.nrows() as f64;
        let old = self.row(j);
        self.running_sum += (g_new - &old) / big_n;
        self.table.set_row(j, &g_new.transpose());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::loss::SquaredLoss;
    use approx::assert_abs_diff_eq;

    #[test]
    fn running_sum_matches_mean_of_rows_after_init() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = vec![1.0, 2.0, 3.0];
        let loss = SquaredLoss::new(Dataset::scalar(a, b).unwrap());
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let table = GradientTable::initialize(&loss, &x0);

        let mut expected = DVector::zeros(2);
        for i in 0..3 {
            expected += table.row(i) / 3.0;
        }
        assert_abs_diff_eq!(table.running_sum(), &expected, epsilon = 1e-12);
    }

    #[test]
    fn update_keeps_running_sum_consistent_with_full_recompute() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = vec![1.0, 2.0, 3.0];
        let loss = SquaredLoss::new(Dataset::scalar(a, b).unwrap());
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let mut table = GradientTable::initialize(&loss, &x0);

        let g_new = DVector::from_vec(vec![5.0, -1.0]);
        table.update(1, &g_new);

        let mut expected = DVector::zeros(2);
        for i in 0..3 {
            expected += table.row(i) / 3.0;
        }
        assert_abs_diff_eq!(table.running_sum(), &expected, epsilon = 1e-12);
    }
}
