#![allow(non_snake_case)]

use crate::model::{Dynamics, Measurement, Ssf};
use crate::options::SmootherOptions;
use crate::results::{FilteredData, Outcome, SmoothingResults};
use crate::Error;

/// `N = T' N T`
pub(crate) fn propagate_N<D: Dynamics + ?Sized>(dynamics: &D, pos: usize, N: &mut ndarray::Array2<f64>) {
    for row in N.rows_mut() {
        dynamics.XT(pos, row);
    }
    for col in N.columns_mut() {
        dynamics.XT(pos, col);
    }
}

/// `N = L' N L + Z' Z / f`
pub(crate) fn update_N<S: Ssf + ?Sized>(
    ssf: &S,
    pos: usize,
    N: &mut ndarray::Array2<f64>,
    M: ndarray::ArrayView1<f64>,
    f: f64,
) {
    ssf.ML(pos, N.view_mut(), M, f);
    ssf.LtM(pos, N.view_mut(), M, f);
    ssf.measurement().VpZdZ(pos, N.view_mut(), 1.0 / f);
}

/// Validates a backward sweep over `[start, end)`, returns the state dimension.
pub(crate) fn check_input<S, F>(ssf: &S, start: usize, end: usize, frslts: &F) -> Result<usize, Error>
where
    S: Ssf + ?Sized,
    F: FilteredData + ?Sized,
{
    if ssf.is_diffuse() {
        return Err(Error::DiffuseInitialization);
    }
    if start > end || end > frslts.len() {
        return Err(Error::InvalidRange {
            start,
            end,
            len: frslts.len(),
        });
    }
    let dim = ssf.state_dim();
    if frslts.dim() != dim {
        return Err(Error::DimensionMismatch {
            expected: dim,
            found: frslts.dim(),
        });
    }
    Ok(dim)
}

/// Validates continuing a sweep from `pos` down to `start`. `len` and `rdim`
/// describe the output container, which must be the one the sweep started
/// with.
pub(crate) fn check_resume<F>(
    start: usize,
    pos: usize,
    frslts: &F,
    dim: usize,
    len: usize,
    (rdim, expected_rdim): (usize, usize),
) -> Result<(), Error>
where
    F: FilteredData + ?Sized,
{
    if start > pos || pos > frslts.len() {
        return Err(Error::InvalidRange {
            start,
            end: pos,
            len: frslts.len(),
        });
    }
    if frslts.dim() != dim {
        return Err(Error::DimensionMismatch {
            expected: dim,
            found: frslts.dim(),
        });
    }
    if len != frslts.len() {
        return Err(Error::DimensionMismatch {
            expected: frslts.len(),
            found: len,
        });
    }
    if rdim != expected_rdim {
        return Err(Error::DimensionMismatch {
            expected: expected_rdim,
            found: rdim,
        });
    }
    Ok(())
}

/// The state smoother reads the filtered covariances at every position.
fn check_covariance<F: FilteredData + ?Sized>(start: usize, end: usize, frslts: &F) -> Result<(), Error> {
    if end > start && frslts.status(end - 1).is_some() && frslts.P(end - 1).is_none() {
        return Err(Error::MissingCovariance(end - 1));
    }
    Ok(())
}

/// Backward state smoother.
///
/// Owns the accumulators `R` and `N` of one sweep, so a sweep can be
/// interrupted and continued with [`StateSmoother::resume`].
#[derive(Clone, Debug)]
pub struct StateSmoother {
    calc_variances: bool,
    tracking: bool,
    started: bool,
    pos: usize,
    R: ndarray::Array1<f64>,
    N: ndarray::Array2<f64>,
}

impl Default for StateSmoother {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StateSmoother {
    pub fn new(calc_variances: bool) -> Self {
        Self {
            calc_variances,
            tracking: false,
            started: false,
            pos: 0,
            R: ndarray::Array1::zeros(0),
            N: ndarray::Array2::zeros((0, 0)),
        }
    }

    pub fn with_options(options: &SmootherOptions) -> Self {
        Self::new(options.calc_variances)
    }

    pub fn calc_variances(&self) -> bool {
        self.calc_variances
    }

    /// takes effect at the next [`StateSmoother::process`]
    pub fn set_calc_variances(&mut self, calc_variances: bool) {
        self.calc_variances = calc_variances;
    }

    /// the last position written; the next sweep starts below it
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn final_r(&self) -> ndarray::ArrayView1<f64> {
        self.R.view()
    }

    /// `None` unless variances are tracked
    pub fn final_n(&self) -> Option<ndarray::ArrayView2<f64>> {
        self.tracking.then(|| self.N.view())
    }

    /// Smooths `[start, end)` with fresh accumulators. `srslts` is sized to
    /// the length of the filter output.
    pub fn process<S, F>(
        &mut self,
        ssf: &S,
        start: usize,
        end: usize,
        frslts: &F,
        srslts: &mut SmoothingResults,
    ) -> Result<Outcome, Error>
    where
        S: Ssf + ?Sized,
        F: FilteredData + ?Sized,
    {
        let dim = check_input(ssf, start, end, frslts)?;
        check_covariance(start, end, frslts)?;
        let reserved = srslts.prepare(dim, frslts.len(), self.calc_variances);
        self.tracking = self.calc_variances && reserved;
        self.R = ndarray::Array1::zeros(dim);
        self.N = ndarray::Array2::zeros((dim, dim));
        self.pos = end;
        self.started = true;

        log::debug!(
            "smoothing states [{}, {}), dim {}, variances: {}",
            start,
            end,
            dim,
            self.tracking
        );

        self.sweep(ssf, start, frslts, srslts)
    }

    /// Continues the last sweep down to `start`.
    pub fn resume<S, F>(
        &mut self,
        ssf: &S,
        start: usize,
        frslts: &F,
        srslts: &mut SmoothingResults,
    ) -> Result<Outcome, Error>
    where
        S: Ssf + ?Sized,
        F: FilteredData + ?Sized,
    {
        if !self.started {
            return Err(Error::NotStarted);
        }
        let dim = self.R.len();
        check_resume(start, self.pos, frslts, dim, srslts.len(), (srslts.dim(), dim))?;
        check_covariance(start, self.pos, frslts)?;

        log::debug!("resuming state smoothing [{}, {})", start, self.pos);

        self.sweep(ssf, start, frslts, srslts)
    }

    fn sweep<S, F>(
        &mut self,
        ssf: &S,
        start: usize,
        frslts: &F,
        srslts: &mut SmoothingResults,
    ) -> Result<Outcome, Error>
    where
        S: Ssf + ?Sized,
        F: FilteredData + ?Sized,
    {
        while self.pos > start {
            let pos = self.pos - 1;
            self.iterate(ssf, pos, frslts, srslts)?;
            self.pos = pos;
        }

        Ok(if self.tracking {
            Outcome::Full
        } else {
            Outcome::PointEstimates
        })
    }

    fn iterate<S, F>(
        &mut self,
        ssf: &S,
        pos: usize,
        frslts: &F,
        srslts: &mut SmoothingResults,
    ) -> Result<(), Error>
    where
        S: Ssf + ?Sized,
        F: FilteredData + ?Sized,
    {
        let dynamics = ssf.dynamics();
        let measurement = ssf.measurement();

        let status = frslts
            .status(pos)
            .ok_or(Error::MissingFilterOutput(pos))?;
        let updated = status.is_updated();
        let e = frslts.e(pos);
        let f = frslts.f(pos);
        let M = frslts.M(pos);

        // R(t-1) = R(t) L(t) + e/f Z
        dynamics.XT(pos, self.R.view_mut());
        if updated {
            let u = (e - self.R.dot(&M)) / f;
            measurement.XpZd(pos, self.R.view_mut(), u);
        }

        if self.tracking {
            if updated {
                update_N(ssf, pos, &mut self.N, M, f);
            } else {
                propagate_N(dynamics, pos, &mut self.N);
            }
            math::symmetrize(&mut self.N)?;
        }

        if let Some(P) = frslts.P(pos) {
            let mut a = frslts.a(pos).to_owned();
            a += &P.dot(&self.R);

            if self.tracking {
                let PN = P.dot(&self.N);
                let mut Psm = &P - &PN.dot(&P);
                math::symmetrize(&mut Psm)?;
                srslts.save(pos, a.view(), Some(Psm.view()));
            } else {
                srslts.save(pos, a.view(), None);
            }
        }

        Ok(())
    }
}
