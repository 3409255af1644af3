use std::collections::BTreeMap;

use nalgebra::DVector;

/// Shared interface over the dual container shapes spec §9 keeps as two
/// distinct typed entities rather than unifying them: `ScalarDual` (a flat
/// array, one scalar per sample) for the `m_i = 1` fast path, and
/// `BlockDual` (index to variable-length block) for the general case.
pub trait DualContainer {
    fn block(&self, i: usize) -> &[f64];
    fn set_block(&mut self, i: usize, value: &[f64]);
    fn n_samples(&self) -> usize;
}

/// The "easy" dual representation: one scalar per sample, backed by a single
/// contiguous `DVector` so the scalar subproblem solver can index it directly
/// (spec §3: "in the easy case an array of length N").
#[derive(Clone, Debug)]
pub struct ScalarDual {
    values: DVector<f64>,
}

impl ScalarDual {
    pub fn zeros(n: usize) -> Self {
        Self {
            values: DVector::zeros(n),
        }
    }

    pub fn from_vec(values: Vec<f64>) -> Self {
        Self {
            values: DVector::from_vec(values),
        }
    }

    pub fn as_dvector(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn scalar(&self, i: usize) -> f64 {
        self.values[i]
    }

    pub fn set_scalar(&mut self, i: usize, v: f64) {
        self.values[i] = v;
    }

    /// The scalar values at `samples`, in the order given.
    pub fn gather(&self, samples: &[usize]) -> DVector<f64> {
        DVector::from_iterator(samples.len(), samples.iter().map(|&i| self.values[i]))
    }

    /// Writes `values` back into the sample indices named by `samples`.
    pub fn scatter(&mut self, samples: &[usize], values: &DVector<f64>) {
        for (k, &i) in samples.iter().enumerate() {
            self.values[i] = values[k];
        }
    }
}

impl DualContainer for ScalarDual {
    fn block(&self, i: usize) -> &[f64] {
        std::slice::from_ref(&self.values[i])
    }

    fn set_block(&mut self, i: usize, value: &[f64]) {
        debug_assert_eq!(value.len(), 1);
        self.values[i] = value[0];
    }

    fn n_samples(&self) -> usize {
        self.values.len()
    }
}

/// The general dual representation: an index-to-block map (spec §3: "in the
/// block case a mapping i -> R^{m_i}"), used whenever any sample has `m_i >
/// 1`.
#[derive(Clone, Debug, Default)]
pub struct BlockDual {
    blocks: BTreeMap<usize, Vec<f64>>,
    n_samples: usize,
}

impl BlockDual {
    pub fn new(n_samples: usize) -> Self {
        Self {
            blocks: BTreeMap::new(),
            n_samples,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[f64])> {
        self.blocks.iter().map(|(&i, v)| (i, v.as_slice()))
    }
}

impl DualContainer for BlockDual {
    fn block(&self, i: usize) -> &[f64] {
        self.blocks.get(&i).map(Vec::as_slice).unwrap_or(&[])
    }

    fn set_block(&mut self, i: usize, value: &[f64]) {
        self.blocks.insert(i, value.to_vec());
    }

    fn n_samples(&self) -> usize {
        self.n_samples
    }
}
