use nalgebra::DMatrix;

use crate::error::SnsppError;

/// The dataset collaborator contract (spec §6): a dense, row-major design
/// matrix with rows grouped per sample, a target vector, and per-sample
/// block sizes. No I/O, standardization, or acquisition logic lives here —
/// that is an external collaborator's job; this struct only holds
/// already-prepared arrays and exposes the per-sample row slices the loss
/// and solver machinery need.
#[derive(Clone, Debug)]
pub struct Dataset {
    /// Rows grouped per sample; sample `i` owns `m[i]` consecutive rows.
    a: DMatrix<f64>,
    b: Vec<f64>,
    /// Block sizes, one per sample. `m.len() == N`.
    m: Vec<usize>,
    /// Row offset of each sample's first row (length N+1, cumulative sum of `m`).
    offsets: Vec<usize>,
}

impl Dataset {
    /// Builds a dataset with explicit per-sample block sizes `m`.
    pub fn new(a: DMatrix<f64>, b: Vec<f64>, m: Vec<usize>) -> Result<Self, SnsppError> {
        let expected: usize = m.iter().sum();
        if a.nrows() != expected {
            return Err(SnsppError::DatasetRowMismatch {
                rows: a.nrows(),
                expected,
            });
        }
        if b.len() != expected {
            return Err(SnsppError::DatasetRowMismatch {
                rows: b.len(),
                expected,
            });
        }
        for (i, &mi) in m.iter().enumerate() {
            if mi < 1 {
                return Err(SnsppError::InvalidBlockSize(mi, i));
            }
        }
        let mut offsets = Vec::with_capacity(m.len() + 1);
        let mut acc = 0usize;
        offsets.push(0);
        for &mi in &m {
            acc += mi;
            offsets.push(acc);
        }
        Ok(Self { a, b, m, offsets })
    }

    /// Builds a dataset where every sample is a single scalar measurement
    /// (`m_i = 1` for all `i`) — the common, "easy" case.
    pub fn scalar(a: DMatrix<f64>, b: Vec<f64>) -> Result<Self, SnsppError> {
        let n = a.nrows();
        Self::new(a, b, vec![1; n])
    }

    pub fn n_samples(&self) -> usize {
        self.m.len()
    }

    pub fn n_features(&self) -> usize {
        self.a.ncols()
    }

    pub fn block_sizes(&self) -> &[usize] {
        &self.m
    }

    pub fn block_size(&self, i: usize) -> usize {
        self.m[i]
    }

    /// Whether every sample is scalar (`m_i = 1`), enabling the fast path.
    pub fn is_scalar(&self) -> bool {
        self.m.iter().all(|&mi| mi == 1)
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// The row range `[start, end)` owned by sample `i`.
    pub fn rows_of(&self, i: usize) -> std::ops::Range<usize> {
        self.offsets[i]..self.offsets[i + 1]
    }

    /// `A_i`, the rows belonging to sample `i`, as a standalone matrix view.
    pub fn rows_matrix(&self, i: usize) -> DMatrix<f64> {
        let r = self.rows_of(i);
        self.a.rows(r.start, r.len()).into_owned()
    }

    /// `b` restricted to sample `i`'s rows.
    pub fn target_of(&self, i: usize) -> &[f64] {
        &self.b[self.rows_of(i)]
    }

    /// Squared Euclidean row norm of `A_i` treated as a flattened vector,
    /// i.e. `||A_i||^2` summed over all of `A_i`'s rows and columns —
    /// the quantity spec §4.3/§4.9 call `||A_i||^2`.
    pub fn row_block_norm_sq(&self, i: usize) -> f64 {
        let r = self.rows_of(i);
        let mut acc = 0.0;
        for row in r {
            acc += self.a.row(row).iter().map(|x| x * x).sum::<f64>();
        }
        acc
    }

    pub fn max_row_block_norm_sq(&self) -> f64 {
        (0..self.n_samples())
            .map(|i| self.row_block_norm_sq(i))
            .fold(0.0, f64::max)
    }

    pub fn mean_row_block_norm_sq(&self) -> f64 {
        let n = self.n_samples() as f64;
        (0..self.n_samples()).map(|i| self.row_block_norm_sq(i)).sum::<f64>() / n
    }

    /// Builds the stacked sub-matrix `A_S` for a batch `S`, with rows
    /// ordered by ascending sample index (spec §4.8's ordering convention),
    /// not by `S`'s traversal order.
    pub fn stack_rows(&self, samples: &[usize]) -> DMatrix<f64> {
        let mut ordered = samples.to_vec();
        ordered.sort_unstable();
        let total: usize = ordered.iter().map(|&i| self.block_size(i)).sum();
        let mut out = DMatrix::zeros(total, self.n_features());
        let mut write_row = 0;
        for &i in &ordered {
            let r = self.rows_of(i);
            for src_row in r {
                out.set_row(write_row, &self.a.row(src_row));
                write_row += 1;
            }
        }
        out
    }
}
