#![allow(non_snake_case)]

use crate::model::{Dynamics, Measurement, Ssf};
use crate::options::SmootherOptions;
use crate::results::{DisturbanceResults, FilteredData, Outcome};
use crate::smoother::{check_input, check_resume, propagate_N, update_N};
use crate::Error;

/// Backward smoother of the transition innovations `u(t)` and of the
/// measurement errors.
///
/// At position `t`, before the update, `R` and `N` hold `r(t)` and `N(t)`:
///
/// ```text
/// K(t)    = T M(t) / f(t)
/// c(t)    = e(t) / f(t) - r(t) K(t)
/// U(t)    = r(t) S(t),          Var = I - S(t)' N(t) S(t)
/// esm(t)  = c(t) h(t),          Var = h(t) - h(t)^2 (1/f(t) + K(t)' N(t) K(t))
/// ```
#[derive(Clone, Debug)]
pub struct DisturbanceSmoother {
    calc_variances: bool,
    tracking: bool,
    started: bool,
    pos: usize,
    R: ndarray::Array1<f64>,
    N: ndarray::Array2<f64>,
    K: ndarray::Array1<f64>,
    U: ndarray::Array1<f64>,
    S: ndarray::Array2<f64>,
    fixed_S: bool,
    h: Option<f64>,
}

impl Default for DisturbanceSmoother {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DisturbanceSmoother {
    pub fn new(calc_variances: bool) -> Self {
        Self {
            calc_variances,
            tracking: false,
            started: false,
            pos: 0,
            R: ndarray::Array1::zeros(0),
            N: ndarray::Array2::zeros((0, 0)),
            K: ndarray::Array1::zeros(0),
            U: ndarray::Array1::zeros(0),
            S: ndarray::Array2::zeros((0, 0)),
            fixed_S: false,
            h: None,
        }
    }

    pub fn with_options(options: &SmootherOptions) -> Self {
        Self::new(options.calc_variances)
    }

    pub fn calc_variances(&self) -> bool {
        self.calc_variances
    }

    pub fn set_calc_variances(&mut self, calc_variances: bool) {
        self.calc_variances = calc_variances;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn final_r(&self) -> ndarray::ArrayView1<f64> {
        self.R.view()
    }

    pub fn final_n(&self) -> Option<ndarray::ArrayView2<f64>> {
        self.tracking.then(|| self.N.view())
    }

    /// `a0 + Pf0 r`, available once a sweep reached position 0
    pub fn first_smoothed_state<S: Ssf + ?Sized>(&self, ssf: &S) -> Option<ndarray::Array1<f64>> {
        if !self.started || self.pos != 0 {
            return None;
        }

        let dim = ssf.state_dim();
        let mut a0 = ndarray::Array1::zeros(dim);
        let mut Pf0 = ndarray::Array2::zeros((dim, dim));
        ssf.dynamics().a0(a0.view_mut());
        ssf.dynamics().Pf0(Pf0.view_mut());

        a0 += &Pf0.dot(&self.R);
        Some(a0)
    }

    /// `Pf0 - Pf0 N Pf0`, requires tracked variances
    pub fn first_smoothed_variance<S: Ssf + ?Sized>(&self, ssf: &S) -> Option<ndarray::Array2<f64>> {
        if !self.started || self.pos != 0 || !self.tracking {
            return None;
        }

        let dim = ssf.state_dim();
        let mut Pf0 = ndarray::Array2::zeros((dim, dim));
        ssf.dynamics().Pf0(Pf0.view_mut());

        let mut P = &Pf0 - &Pf0.dot(&self.N).dot(&Pf0);
        math::symmetrize(&mut P).ok()?;
        Some(P)
    }

    pub fn process<S, F>(
        &mut self,
        ssf: &S,
        start: usize,
        end: usize,
        frslts: &F,
        drslts: &mut DisturbanceResults,
    ) -> Result<Outcome, Error>
    where
        S: Ssf + ?Sized,
        F: FilteredData + ?Sized,
    {
        let dim = check_input(ssf, start, end, frslts)?;
        let dynamics = ssf.dynamics();
        let measurement = ssf.measurement();
        let r = dynamics.innovations_dim();

        let reserved = drslts.prepare(r, frslts.len(), measurement.has_errors(), self.calc_variances);
        self.tracking = self.calc_variances && reserved;
        self.R = ndarray::Array1::zeros(dim);
        self.N = ndarray::Array2::zeros((dim, dim));
        self.K = ndarray::Array1::zeros(dim);
        self.U = ndarray::Array1::zeros(r);
        self.S = ndarray::Array2::zeros((dim, r));
        self.fixed_S = dynamics.is_time_invariant();
        if self.fixed_S {
            dynamics.S(0, self.S.view_mut());
        }
        self.h = if measurement.is_time_invariant() {
            Some(measurement.error_variance(0))
        } else {
            None
        };
        self.pos = end;
        self.started = true;

        log::debug!(
            "smoothing disturbances [{}, {}), dim {}, innovations {}, variances: {}",
            start,
            end,
            dim,
            r,
            self.tracking
        );

        self.sweep(ssf, start, frslts, drslts)
    }

    pub fn resume<S, F>(
        &mut self,
        ssf: &S,
        start: usize,
        frslts: &F,
        drslts: &mut DisturbanceResults,
    ) -> Result<Outcome, Error>
    where
        S: Ssf + ?Sized,
        F: FilteredData + ?Sized,
    {
        if !self.started {
            return Err(Error::NotStarted);
        }
        check_resume(
            start,
            self.pos,
            frslts,
            self.R.len(),
            drslts.len(),
            (drslts.innovations_dim(), self.U.len()),
        )?;

        log::debug!("resuming disturbance smoothing [{}, {})", start, self.pos);

        self.sweep(ssf, start, frslts, drslts)
    }

    fn sweep<S, F>(
        &mut self,
        ssf: &S,
        start: usize,
        frslts: &F,
        drslts: &mut DisturbanceResults,
    ) -> Result<Outcome, Error>
    where
        S: Ssf + ?Sized,
        F: FilteredData + ?Sized,
    {
        while self.pos > start {
            let pos = self.pos - 1;
            self.iterate(ssf, pos, frslts, drslts)?;
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
        drslts: &mut DisturbanceResults,
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

        let mut c = f64::NAN;
        let mut v = f64::NAN;
        if updated {
            self.K.assign(&M);
            self.K /= f;
            dynamics.TX(pos, self.K.view_mut());
            c = e / f - self.R.dot(&self.K);
            if self.tracking {
                v = 1.0 / f + self.K.dot(&self.N.dot(&self.K));
            }
        }

        dynamics.XS(pos, self.R.view(), self.U.view_mut());
        if self.tracking {
            if !self.fixed_S {
                dynamics.S(pos, self.S.view_mut());
            }
            let mut UVar = self.S.t().dot(&self.N).dot(&self.S);
            math::symmetrize(&mut UVar)?;
            UVar.mapv_inplace(|x| -x);
            UVar.diag_mut().mapv_inplace(|x| x + 1.0);
            drslts.save(pos, self.U.view(), Some(UVar.view()));
        } else {
            drslts.save(pos, self.U.view(), None);
        }

        if measurement.has_error(pos) {
            let h = self.h.unwrap_or_else(|| measurement.error_variance(pos));
            let (esm, esm_variance) = if updated {
                (c * h, h - h * h * v)
            } else {
                (0.0, h)
            };
            drslts.save_error(pos, esm, self.tracking.then_some(esm_variance));
        }

        // R(t-1) = R(t) T + c Z
        dynamics.XT(pos, self.R.view_mut());
        if updated {
            measurement.XpZd(pos, self.R.view_mut(), c);
        }

        if self.tracking {
            if updated {
                update_N(ssf, pos, &mut self.N, M, f);
            } else {
                propagate_N(dynamics, pos, &mut self.N);
            }
            math::symmetrize(&mut self.N)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Series;
    use crate::filter::KalmanFilter;
    use crate::model::SsfModel;
    use crate::models::{self, LoadingMeasurement, LocalLinearTrend, MatrixDynamics, SelectMeasurement};
    use crate::results::{FilteringResults, SmoothingResults};
    use crate::smoother::StateSmoother;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{Rng, SeedableRng};

    fn filter<S: Ssf>(ssf: &S, y: &[f64]) -> FilteringResults {
        let mut rslts = FilteringResults::full();
        KalmanFilter::new()
            .process(ssf, &Series::new(y), &mut rslts)
            .unwrap();
        rslts
    }

    fn random_series(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut level = 0.0;
        (0..n)
            .map(|i| {
                level += rng.gen_range(-0.5..0.5);
                if i % 6 == 4 {
                    f64::NAN
                } else {
                    level + rng.gen_range(-1.0..1.0)
                }
            })
            .collect()
    }

    #[test]
    fn local_level() {
        let q = 0.2;
        let ssf = models::local_level(q, 0.6, 0.0, 5.0);
        let y = random_series(30, 11);
        let n = y.len();
        let frslts = filter(&ssf, &y);

        let mut srslts = SmoothingResults::new();
        StateSmoother::new(true)
            .process(&ssf, 0, n, &frslts, &mut srslts)
            .unwrap();

        let mut drslts = DisturbanceResults::new();
        let mut smoother = DisturbanceSmoother::new(true);
        let outcome = smoother.process(&ssf, 0, n, &frslts, &mut drslts).unwrap();
        assert_eq!(outcome, Outcome::Full);
        assert!(drslts.has_errors());

        let a = srslts.component(0);
        for pos in 0..n - 1 {
            // a*(t+1) = a*(t) + sqrt(q) U(t)
            assert_abs_diff_eq!(
                a[pos + 1] - a[pos],
                q.sqrt() * drslts.U(pos).unwrap()[0],
                epsilon = 1.0e-9
            );
        }
        for pos in 0..n {
            if y[pos].is_finite() {
                assert_abs_diff_eq!(y[pos] - a[pos], drslts.esm(pos).unwrap(), epsilon = 1.0e-9);
            } else {
                assert_eq!(drslts.esm(pos), Some(0.0));
                assert_eq!(drslts.esm_variance(pos), Some(0.6));
            }
            let esm_var = drslts.esm_variance(pos).unwrap();
            assert!(esm_var >= -1.0e-12 && esm_var <= 0.6 + 1.0e-12);
            let u_var = drslts.UVar(pos).unwrap()[(0, 0)];
            assert!(u_var >= -1.0e-12 && u_var <= 1.0 + 1.0e-12);
        }

        let first = smoother.first_smoothed_state(&ssf).unwrap();
        assert_abs_diff_eq!(first[0], a[0], epsilon = 1.0e-9);
        let var = smoother.first_smoothed_variance(&ssf).unwrap();
        assert_abs_diff_eq!(var[(0, 0)], srslts.P(0).unwrap()[(0, 0)], epsilon = 1.0e-9);
    }

    #[test]
    fn state_reconstruction() {
        // a*(t+1) = T a*(t) + S U(t) for a multivariate model
        let t = array![[0.7, 0.2], [0.0, 0.5]];
        let s = array![[1.0, 0.0], [0.3, 0.6]];
        let dynamics = MatrixDynamics::stationary(t.clone(), s.clone()).unwrap();
        let ssf = SsfModel::new(dynamics, LoadingMeasurement::new(array![1.0, 0.5], 0.4)).unwrap();
        let y = random_series(25, 12);
        let n = y.len();
        let frslts = filter(&ssf, &y);

        let mut srslts = SmoothingResults::new();
        StateSmoother::new(false)
            .process(&ssf, 0, n, &frslts, &mut srslts)
            .unwrap();
        let mut drslts = DisturbanceResults::new();
        let mut smoother = DisturbanceSmoother::new(true);
        smoother.process(&ssf, 0, n, &frslts, &mut drslts).unwrap();

        let first = smoother.first_smoothed_state(&ssf).unwrap();
        testlib::assert_arr1_eq_eps(&first, &srslts.a(0).unwrap(), 1.0e-9);

        for pos in 0..n - 1 {
            let expected = t.dot(&srslts.a(pos).unwrap()) + s.dot(&drslts.U(pos).unwrap());
            testlib::assert_arr1_eq_eps(&srslts.a(pos + 1).unwrap(), &expected, 1.0e-9);

            let UVar = drslts.UVar(pos).unwrap();
            testlib::assert_symmetric(&UVar);
            assert!(UVar.diag().iter().all(|&v| v >= -1.0e-12));
        }
    }

    #[test]
    fn light_matches_full() {
        let ssf = SsfModel::new(
            LocalLinearTrend::new(0.3, 0.02, 5.0),
            SelectMeasurement::new(2, 0).unwrap().with_variance(0.8),
        )
        .unwrap();
        let y = random_series(30, 13);
        let n = y.len();
        let frslts = filter(&ssf, &y);

        let mut full = DisturbanceResults::new();
        DisturbanceSmoother::new(true)
            .process(&ssf, 0, n, &frslts, &mut full)
            .unwrap();

        let mut light = DisturbanceResults::new();
        let mut smoother = DisturbanceSmoother::with_options(&SmootherOptions {
            calc_variances: false,
        });
        let outcome = smoother.process(&ssf, 0, n, &frslts, &mut light).unwrap();
        assert_eq!(outcome, Outcome::PointEstimates);
        assert!(!light.has_variances());
        assert!(light.error_variances().is_none());
        assert!(smoother.first_smoothed_variance(&ssf).is_none());

        for pos in 0..n {
            testlib::assert_arr1_eq_eps(&full.U(pos).unwrap(), &light.U(pos).unwrap(), 1.0e-12);
            assert_abs_diff_eq!(full.esm(pos).unwrap(), light.esm(pos).unwrap(), epsilon = 1.0e-12);
        }
    }

    #[test]
    fn resume() {
        let ssf = models::local_level(0.1, 0.5, 0.0, 1.0e6);
        let y = [1.0, f64::NAN, 3.0, 2.5];
        let frslts = filter(&ssf, &y);

        let mut once = DisturbanceResults::new();
        let mut smoother = DisturbanceSmoother::new(true);
        smoother.process(&ssf, 0, 4, &frslts, &mut once).unwrap();
        let first = smoother.first_smoothed_state(&ssf).unwrap();

        let mut twice = DisturbanceResults::new();
        let mut smoother = DisturbanceSmoother::new(true);
        smoother.process(&ssf, 2, 4, &frslts, &mut twice).unwrap();
        assert!(smoother.first_smoothed_state(&ssf).is_none());
        smoother.resume(&ssf, 0, &frslts, &mut twice).unwrap();

        for pos in 0..4 {
            testlib::assert_arr1_eq_eps(&once.U(pos).unwrap(), &twice.U(pos).unwrap(), 1.0e-12);
            assert_eq!(once.esm(pos), twice.esm(pos));
            assert_eq!(once.esm_variance(pos), twice.esm_variance(pos));
        }
        testlib::assert_arr1_eq_eps(&first, &smoother.first_smoothed_state(&ssf).unwrap(), 1.0e-12);
        testlib::assert_arr1_eq_eps(&smoother.final_r(), &once_r(&ssf, &frslts), 1.0e-12);
    }

    fn once_r<S: Ssf>(ssf: &S, frslts: &FilteringResults) -> ndarray::Array1<f64> {
        let mut srslts = SmoothingResults::new();
        let mut smoother = StateSmoother::new(false);
        smoother
            .process(ssf, 0, frslts.len(), frslts, &mut srslts)
            .unwrap();
        smoother.final_r().to_owned()
    }

    #[test]
    fn varying_errors() {
        let ssf = SsfModel::new(
            models::RandomWalk::new(0.3, 0.0, 2.0),
            SelectMeasurement::new(1, 0).unwrap().with_variances(vec![0.5, 0.0, 0.5, 1.0]),
        )
        .unwrap();
        let y = [0.3, 0.8, 1.1, 0.9];
        let frslts = filter(&ssf, &y);

        let mut drslts = DisturbanceResults::new();
        DisturbanceSmoother::default()
            .process(&ssf, 0, 4, &frslts, &mut drslts)
            .unwrap();

        // no measurement error at 1: nothing is written there
        assert!(drslts.esm(1).unwrap().is_nan());
        assert!(drslts.esm(0).unwrap().is_finite());
        assert!(drslts.esm_variance(3).unwrap() <= 1.0);
    }

    #[test]
    fn degenerate() {
        // known initial state without measurement noise: position 0 carries no information
        let ssf =
            SsfModel::new(models::RandomWalk::new(1.0, 2.0, 0.0), SelectMeasurement::new(1, 0).unwrap()).unwrap();
        let y = [2.5, 3.0, 2.0];
        let frslts = filter(&ssf, &y);
        assert_eq!(frslts.status(0), Some(crate::results::StepStatus::Degenerate));

        let mut drslts = DisturbanceResults::new();
        let mut smoother = DisturbanceSmoother::new(true);
        smoother.process(&ssf, 0, 3, &frslts, &mut drslts).unwrap();

        assert!(!drslts.has_errors());
        testlib::assert_arr1_eq(&drslts.component(0), &array![1.0, -1.0, 0.0]);
        testlib::assert_arr1_eq(&drslts.component_variance(0).unwrap(), &array![0.0, 0.0, 1.0]);

        testlib::assert_arr1_eq(&smoother.first_smoothed_state(&ssf).unwrap(), &array![2.0]);
        testlib::assert_arr2_eq(&smoother.first_smoothed_variance(&ssf).unwrap(), &array![[0.0]]);
    }

    #[test]
    fn light_filter_output() {
        // only e, f and M are read, the filtered covariances are not needed
        let ssf = models::local_level(0.2, 0.6, 0.0, 5.0);
        let y = random_series(12, 14);
        let n = y.len();

        let mut light = FilteringResults::light();
        KalmanFilter::new()
            .process(&ssf, &Series::new(&y), &mut light)
            .unwrap();
        let full = filter(&ssf, &y);

        let mut expected = DisturbanceResults::new();
        DisturbanceSmoother::new(true)
            .process(&ssf, 0, n, &full, &mut expected)
            .unwrap();
        let mut drslts = DisturbanceResults::new();
        let outcome = DisturbanceSmoother::new(true)
            .process(&ssf, 0, n, &light, &mut drslts)
            .unwrap();
        assert_eq!(outcome, Outcome::Full);

        testlib::assert_arr1_eq_eps(&drslts.component(0), &expected.component(0), 1.0e-12);
        testlib::assert_arr1_eq_eps(
            &drslts.component_variance(0).unwrap(),
            &expected.component_variance(0).unwrap(),
            1.0e-12,
        );
    }

    #[test]
    fn resume_other_container() {
        let ssf = models::local_level(0.1, 0.5, 0.0, 1.0e6);
        let y = [1.0, f64::NAN, 3.0, 2.5];
        let frslts = filter(&ssf, &y);

        let mut drslts = DisturbanceResults::new();
        let mut smoother = DisturbanceSmoother::new(true);
        smoother.process(&ssf, 2, 4, &frslts, &mut drslts).unwrap();

        assert!(matches!(
            smoother.resume(&ssf, 0, &frslts, &mut DisturbanceResults::new()),
            Err(Error::DimensionMismatch {
                expected: 4,
                found: 0
            })
        ));

        let mut other = DisturbanceResults::new();
        let ssf2 = SsfModel::new(
            LocalLinearTrend::new(0.3, 0.02, 5.0),
            SelectMeasurement::new(2, 0).unwrap().with_variance(0.8),
        )
        .unwrap();
        DisturbanceSmoother::new(true)
            .process(&ssf2, 0, 4, &filter(&ssf2, &y), &mut other)
            .unwrap();
        assert!(matches!(
            smoother.resume(&ssf, 0, &frslts, &mut other),
            Err(Error::DimensionMismatch {
                expected: 1,
                found: 2
            })
        ));

        assert_eq!(smoother.position(), 2);
        smoother.resume(&ssf, 0, &frslts, &mut drslts).unwrap();
        assert!(drslts.is_set(0));
    }

    #[test]
    fn invalid() {
        let ssf = models::local_level(0.1, 0.5, 0.0, 1.0);
        let frslts = filter(&ssf, &[1.0]);
        let mut drslts = DisturbanceResults::new();
        let mut smoother = DisturbanceSmoother::default();

        assert!(matches!(
            smoother.resume(&ssf, 0, &frslts, &mut drslts),
            Err(Error::NotStarted)
        ));
        assert!(matches!(
            smoother.process(&ssf, 1, 0, &frslts, &mut drslts),
            Err(Error::InvalidRange { .. })
        ));
        assert!(smoother.first_smoothed_state(&ssf).is_none());
    }
}
