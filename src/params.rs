use crate::error::SnsppError;

/// Newton-subproblem tuning knobs (spec §6 `newton_params`), mirrored from
/// the reference implementation's defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct NewtonParams {
    pub tau: f64,
    pub eta: f64,
    pub rho: f64,
    pub mu: f64,
    pub cg_max_iter: usize,
    pub max_iter: usize,
}

impl Default for NewtonParams {
    fn default() -> Self {
        Self {
            tau: 0.9,
            eta: 1e-5,
            rho: 0.5,
            mu: 0.4,
            cg_max_iter: 12,
            max_iter: 20,
        }
    }
}

impl NewtonParams {
    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_eta(mut self, eta: f64) -> Self {
        self.eta = eta;
        self
    }

    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn with_mu(mut self, mu: f64) -> Self {
        self.mu = mu;
        self
    }

    pub fn with_cg_max_iter(mut self, cg_max_iter: usize) -> Self {
        self.cg_max_iter = cg_max_iter;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn validate(&self) -> Result<(), SnsppError> {
        if !(self.mu > 0.0 && self.mu < 0.5) {
            return Err(SnsppError::InvalidMu(self.mu));
        }
        if !(self.eta > 0.0 && self.eta < 1.0) {
            return Err(SnsppError::InvalidEta(self.eta));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return Err(SnsppError::InvalidTau(self.tau));
        }
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(SnsppError::InvalidRho(self.rho));
        }
        if self.cg_max_iter < 1 {
            return Err(SnsppError::InvalidCgMaxIter(self.cg_max_iter));
        }
        if self.max_iter < 1 {
            return Err(SnsppError::InvalidNewtonMaxIter(self.max_iter));
        }
        Ok(())
    }
}

/// The batch-size schedule a solver follows across outer iterations (spec
/// §4.6/§4.10).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleStyle {
    Constant,
    Increasing,
    FastIncreasing,
}

/// The full recognized configuration surface of spec §6.
#[derive(Clone, Debug)]
pub struct SolverParams {
    pub max_iter: usize,
    pub n_epochs: Option<usize>,
    pub batch_size: usize,
    pub alpha: Option<f64>,
    pub reduce_variance: bool,
    pub m_iter: usize,
    pub vr_skip: usize,
    pub tol_sub: f64,
    pub tol: f64,
    pub sample_style: SampleStyle,
    pub newton_params: NewtonParams,
    pub track_mean_iterate: bool,
    pub measure: bool,
    pub seed: u64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_iter: 100,
            n_epochs: None,
            batch_size: 1,
            alpha: None,
            reduce_variance: true,
            m_iter: 10,
            vr_skip: 0,
            tol_sub: 1e-3,
            tol: 1e-8,
            sample_style: SampleStyle::Constant,
            newton_params: NewtonParams::default(),
            track_mean_iterate: false,
            measure: false,
            seed: 0,
        }
    }
}

impl SolverParams {
    pub fn with_max_iter(mut self, v: usize) -> Self {
        self.max_iter = v;
        self
    }

    pub fn with_n_epochs(mut self, v: usize) -> Self {
        self.n_epochs = Some(v);
        self
    }

    pub fn with_batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    pub fn with_alpha(mut self, v: f64) -> Self {
        self.alpha = Some(v);
        self
    }

    pub fn with_reduce_variance(mut self, v: bool) -> Self {
        self.reduce_variance = v;
        self
    }

    pub fn with_m_iter(mut self, v: usize) -> Self {
        self.m_iter = v;
        self
    }

    pub fn with_vr_skip(mut self, v: usize) -> Self {
        self.vr_skip = v;
        self
    }

    pub fn with_tol_sub(mut self, v: f64) -> Self {
        self.tol_sub = v;
        self
    }

    pub fn with_tol(mut self, v: f64) -> Self {
        self.tol = v;
        self
    }

    pub fn with_sample_style(mut self, v: SampleStyle) -> Self {
        self.sample_style = v;
        self
    }

    pub fn with_newton_params(mut self, v: NewtonParams) -> Self {
        self.newton_params = v;
        self
    }

    pub fn with_track_mean_iterate(mut self, v: bool) -> Self {
        self.track_mean_iterate = v;
        self
    }

    pub fn with_measure(mut self, v: bool) -> Self {
        self.measure = v;
        self
    }

    pub fn with_seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Validates every range named in spec §6 ("Valid ranges"). Called once
    /// at the top of every solver entry point before any allocation happens.
    pub fn validate(&self) -> Result<(), SnsppError> {
        if self.batch_size < 1 {
            return Err(SnsppError::InvalidBatchSize(self.batch_size));
        }
        if let Some(a) = self.alpha {
            if a <= 0.0 {
                return Err(SnsppError::NonPositiveStepSize(a));
            }
        }
        if self.max_iter < 1 {
            return Err(SnsppError::InvalidNewtonMaxIter(self.max_iter));
        }
        self.newton_params.validate()
    }
}
