use nalgebra::DVector;

/// Per-outer-iteration diagnostics of the scalar/block Newton subproblem
/// solve (spec §6 `ssn_info`).
#[derive(Clone, Debug, Default)]
pub struct SsnInfo {
    pub residuals: Vec<f64>,
    pub direction_norms: Vec<f64>,
    pub step_sizes: Vec<f64>,
    pub objective_trace: Vec<f64>,
    pub evaluations: usize,
}

/// Per-iteration history buffer (spec §3 History buffer, §6 Info record).
#[derive(Clone, Debug, Default)]
pub struct History {
    pub objective: Vec<f64>,
    pub iterates: Vec<DVector<f64>>,
    pub step_sizes: Vec<f64>,
    pub runtime: Vec<f64>,
    pub samples: Vec<Vec<usize>>,
    pub evaluations: Vec<f64>,
    pub ssn_info: Vec<SsnInfo>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push_iteration(
        &mut self,
        x: DVector<f64>,
        step_size: f64,
        runtime: f64,
        sample: Vec<usize>,
        evaluations: f64,
        objective: Option<f64>,
        ssn: Option<SsnInfo>,
    ) {
        self.iterates.push(x);
        self.step_sizes.push(step_size);
        self.runtime.push(runtime);
        self.samples.push(sample);
        self.evaluations.push(evaluations);
        if let Some(obj) = objective {
            self.objective.push(obj);
        }
        if let Some(s) = ssn {
            self.ssn_info.push(s);
        }
    }
}

/// Termination status (spec §4.6/§4.11, §7 "Termination" — not an error).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    MaxIterationsReached,
}

/// What every solver entry point in this crate returns (spec §6 "Solver
/// entry").
#[derive(Clone, Debug)]
pub struct SolveOutcome {
    pub x: DVector<f64>,
    /// Populated only when `SolverParams::track_mean_iterate` is set (see
    /// `SPEC_FULL.md` §F); `None` by default.
    pub mean_iterate: Option<DVector<f64>>,
    pub status: SolveStatus,
    pub history: History,
}

/// Accumulates the step-size-weighted running mean `x_mean_t = (sum_{k<=t}
/// alpha_k x_k) / (sum_{k<=t} alpha_k)`, ported from the reference
/// implementation's `compute_x_mean`. Only active when a solver's caller
/// opts in via `SolverParams::track_mean_iterate`.
#[derive(Clone, Debug)]
pub struct MeanIterateTracker {
    weighted_sum: DVector<f64>,
    weight_total: f64,
}

impl MeanIterateTracker {
    pub fn new(n: usize) -> Self {
        Self {
            weighted_sum: DVector::zeros(n),
            weight_total: 0.0,
        }
    }

    pub fn update(&mut self, x: &DVector<f64>, step_size: f64) {
        self.weighted_sum += x * step_size;
        self.weight_total += step_size;
    }

    pub fn mean(&self) -> Option<DVector<f64>> {
        if self.weight_total <= 0.0 {
            None
        } else {
            Some(&self.weighted_sum / self.weight_total)
        }
    }
}

/// Relative sup-norm change used by every solver's stopping criterion (spec
/// §4.11): `||x_new - x_old||_inf / (1 + ||x_old||_inf)`.
pub fn relative_sup_norm_change(x_new: &DVector<f64>, x_old: &DVector<f64>) -> f64 {
    let num = (x_new - x_old).amax();
    let denom = 1.0 + x_old.amax();
    num / denom
}
