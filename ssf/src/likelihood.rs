use crate::results::{FilterRecord, FilteringSink};

/// Gaussian log-likelihood by prediction error decomposition. Only updated
/// positions contribute.
#[derive(Clone, Debug, Default)]
pub struct Likelihood {
    n: usize,
    log_det: f64,
    ssq: f64,
    ll: f64,
}

impl Likelihood {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of observations that contributed
    pub fn observations(&self) -> usize {
        self.n
    }

    /// `sum log f(t)`
    pub fn log_det(&self) -> f64 {
        self.log_det
    }

    /// `sum e(t)^2 / f(t)`
    pub fn ssq(&self) -> f64 {
        self.ssq
    }

    pub fn log_likelihood(&self) -> f64 {
        self.ll
    }

    /// maximum likelihood estimate of a common scale factor of all variances
    pub fn sigma2(&self) -> f64 {
        self.ssq / self.n as f64
    }

    /// log-likelihood with the scale factor concentrated out
    pub fn concentrated_log_likelihood(&self) -> f64 {
        let n = self.n as f64;
        -0.5 * (n * (2.0 * std::f64::consts::PI).ln() + n * self.sigma2().ln() + n + self.log_det)
    }
}

impl FilteringSink for Likelihood {
    fn prepare(&mut self, _dim: usize, _n: usize) {
        *self = Self::default();
    }

    fn save(&mut self, _pos: usize, record: &FilterRecord) {
        if !record.status.is_updated() {
            return;
        }

        self.n += 1;
        self.log_det += record.f.ln();
        self.ssq += record.e * record.e / record.f;
        self.ll += math::gaussian::logpdf(record.e, record.f);
    }
}
