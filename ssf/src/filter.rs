#![allow(non_snake_case)]

use crate::data::SsfData;
use crate::model::{Dynamics, Measurement, Ssf};
use crate::options::FilterOptions;
use crate::results::{FilterRecord, FilteringSink, StepStatus};
use crate::Error;

/// Predicted state of one run.
#[derive(Clone, Debug)]
pub struct State {
    pub a: ndarray::Array1<f64>,
    pub P: ndarray::Array2<f64>,
}

impl State {
    /// the initial state declared by the dynamics
    pub fn initial<D: Dynamics + ?Sized>(dynamics: &D) -> Self {
        let dim = dynamics.state_dim();
        let mut a = ndarray::Array1::zeros(dim);
        let mut P = ndarray::Array2::zeros((dim, dim));
        dynamics.a0(a.view_mut());
        dynamics.Pf0(P.view_mut());
        Self { a, P }
    }
}

/// Ordinary Kalman filter for proper (non-diffuse) initial conditions.
#[derive(Clone, Debug, Default)]
pub struct KalmanFilter {
    options: FilterOptions,
}

impl KalmanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: FilterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Runs the forward recursion over the whole sequence. Every position is
    /// handed to `sink` with the predicted state, before the correction.
    ///
    /// Diffuse models and models whose measurement doesn't match the state
    /// dimension are refused before anything is written.
    pub fn process<S, D, K>(&self, ssf: &S, data: &D, mut sink: K) -> Result<State, Error>
    where
        S: Ssf + ?Sized,
        D: SsfData + ?Sized,
        K: FilteringSink,
    {
        if ssf.is_diffuse() {
            return Err(Error::DiffuseInitialization);
        }

        let dynamics = ssf.dynamics();
        let measurement = ssf.measurement();
        let dim = ssf.state_dim();
        if measurement.state_dim() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: measurement.state_dim(),
            });
        }
        let n = data.len();
        let epsilon = self.options.epsilon;

        log::debug!(
            "filtering {} positions ({} observed), state dim {}",
            n,
            data.observations(),
            dim
        );

        let mut state = State::initial(dynamics);
        let mut M = ndarray::Array1::<f64>::zeros(dim);
        let mut degenerate = 0;
        sink.prepare(dim, n);

        for pos in 0..n {
            measurement.ZM(pos, state.P.view(), M.view_mut());
            let mut f = measurement.ZVZ(pos, state.P.view());
            if measurement.has_error(pos) {
                f += measurement.error_variance(pos);
            }

            let (status, e) = match data.get(pos) {
                None => (StepStatus::Missing, f64::NAN),
                Some(y) => {
                    let e = y - measurement.ZX(pos, state.a.view());
                    if f <= epsilon || !f.is_finite() || !e.is_finite() {
                        log::trace!("degenerate prediction error at {}: e={} f={}", pos, e, f);
                        degenerate += 1;
                        (StepStatus::Degenerate, e)
                    } else {
                        (StepStatus::Updated, e)
                    }
                }
            };

            sink.save(
                pos,
                &FilterRecord {
                    status,
                    e,
                    f,
                    a: state.a.view(),
                    P: state.P.view(),
                    M: M.view(),
                },
            );

            if status.is_updated() {
                state.a.scaled_add(e / f, &M);
                math::add_outer(&mut state.P, &M, &M, -1.0 / f);
            }

            dynamics.TX(pos, state.a.view_mut());
            dynamics.TVT(pos, state.P.view_mut());
            dynamics.addV(pos, state.P.view_mut());
            math::symmetrize(&mut state.P)?;
        }

        if degenerate > 0 {
            log::debug!("{} positions without information", degenerate);
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Extended, Series};
    use crate::models::{self, LocalLinearTrend, RandomWalk, SelectMeasurement};
    use crate::model::SsfModel;
    use crate::results::{FilteredData, FilteringResults};
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};

    #[test]
    fn local_level() {
        let ssf = models::local_level(0.1, 0.5, 0.0, 1.0e6);
        let y = [1.0, f64::NAN, 3.0, 2.5];
        let mut rslts = FilteringResults::full();
        KalmanFilter::new()
            .process(&ssf, &Series::new(&y), &mut rslts)
            .unwrap();

        assert_eq!(rslts.status(0), Some(StepStatus::Updated));
        assert_abs_diff_eq!(rslts.e(0), 1.0);
        assert_abs_diff_eq!(rslts.f(0), 1.0e6 + 0.5);

        // the missing position only propagates the state
        assert_eq!(rslts.status(1), Some(StepStatus::Missing));
        assert!(!rslts.e(1).is_finite());
        assert_eq!(rslts.a(2)[0], rslts.a(1)[0]);
        assert_abs_diff_eq!(
            rslts.P(2).unwrap()[(0, 0)],
            rslts.P(1).unwrap()[(0, 0)] + 0.1,
            epsilon = 1.0e-12
        );

        // posterior at 0: a = P0 / (P0 + h)
        let a1 = 1.0e6 / (1.0e6 + 0.5);
        assert_abs_diff_eq!(rslts.a(1)[0], a1, epsilon = 1.0e-12);
        assert_abs_diff_eq!(rslts.e(2), 3.0 - a1, epsilon = 1.0e-12);
        assert_abs_diff_eq!(rslts.M(2)[0], rslts.P(2).unwrap()[(0, 0)]);
    }

    #[test]
    fn final_prediction() {
        let ssf = models::local_level(0.1, 0.5, 0.0, 1.0);
        let y = [1.0, 2.0];
        let mut rslts = FilteringResults::full();
        let last = KalmanFilter::new()
            .process(&ssf, &Series::new(&y), &mut rslts)
            .unwrap();

        let extended = Extended::new(Series::new(&y), 0, 1);
        let mut ext = FilteringResults::full();
        KalmanFilter::new().process(&ssf, &extended, &mut ext).unwrap();

        assert_eq!(ext.status(2), Some(StepStatus::Missing));
        assert_abs_diff_eq!(ext.a(2)[0], last.a[0], epsilon = 1.0e-12);
        assert_abs_diff_eq!(ext.P(2).unwrap()[(0, 0)], last.P[(0, 0)], epsilon = 1.0e-12);
    }

    #[test]
    fn degenerate() {
        // no measurement noise and a known initial state: nothing to learn at 0
        let ssf = SsfModel::new(RandomWalk::new(1.0, 2.0, 0.0), SelectMeasurement::new(1, 0).unwrap()).unwrap();
        let y = [2.5, 3.0];
        let mut rslts = FilteringResults::full();
        KalmanFilter::new()
            .process(&ssf, &Series::new(&y), &mut rslts)
            .unwrap();

        assert_eq!(rslts.status(0), Some(StepStatus::Degenerate));
        assert_abs_diff_eq!(rslts.e(0), 0.5);
        assert_eq!(rslts.f(0), 0.0);
        assert_eq!(rslts.a(1)[0], 2.0);

        assert_eq!(rslts.status(1), Some(StepStatus::Updated));
        assert_abs_diff_eq!(rslts.f(1), 1.0);
    }

    #[test]
    fn diffuse() {
        let ssf = SsfModel::new(RandomWalk::diffuse(1.0), SelectMeasurement::new(1, 0).unwrap().with_variance(1.0))
            .unwrap();
        let y = [1.0, 2.0];
        let mut rslts = FilteringResults::full();
        let res = KalmanFilter::new().process(&ssf, &Series::new(&y), &mut rslts);

        assert!(matches!(res, Err(Error::DiffuseInitialization)));
        assert!(rslts.is_empty());
    }

    struct Unchecked {
        dynamics: RandomWalk,
        measurement: SelectMeasurement,
    }

    impl Ssf for Unchecked {
        type Dynamics = RandomWalk;
        type Measurement = SelectMeasurement;

        fn dynamics(&self) -> &RandomWalk {
            &self.dynamics
        }

        fn measurement(&self) -> &SelectMeasurement {
            &self.measurement
        }
    }

    #[test]
    fn dimension_mismatch() {
        let ssf = Unchecked {
            dynamics: RandomWalk::new(1.0, 0.0, 1.0),
            measurement: SelectMeasurement::new(2, 1).unwrap().with_variance(1.0),
        };
        let y = [1.0, 2.0];
        let mut rslts = FilteringResults::full();
        let res = KalmanFilter::new().process(&ssf, &Series::new(&y), &mut rslts);

        assert!(matches!(
            res,
            Err(Error::DimensionMismatch {
                expected: 1,
                found: 2
            })
        ));
        assert!(rslts.is_empty());
    }

    #[test]
    fn symmetric_covariances() {
        let ssf = SsfModel::new(
            LocalLinearTrend::new(0.5, 0.05, 10.0),
            SelectMeasurement::new(2, 0).unwrap().with_variance(1.0),
        )
        .unwrap();

        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let y: Vec<f64> = (0..50)
            .map(|i| {
                if i % 7 == 3 {
                    f64::NAN
                } else {
                    0.1 * i as f64 + rng.gen_range(-1.0..1.0)
                }
            })
            .collect();

        let mut rslts = FilteringResults::full();
        KalmanFilter::new()
            .process(&ssf, &Series::new(&y), &mut rslts)
            .unwrap();

        for pos in 0..y.len() {
            let P = rslts.P(pos).unwrap();
            testlib::assert_symmetric(&P);
            assert!(P[(0, 0)] >= 0.0 && P[(1, 1)] >= 0.0);
            assert_eq!(rslts.is_updated(pos), pos % 7 != 3);
        }
    }

    #[test]
    fn light_storage() {
        let ssf = models::local_level(0.1, 0.5, 0.0, 1.0);
        let y = [1.0, 2.0, 3.0];

        let mut full = FilteringResults::full();
        let mut light = FilteringResults::light();
        KalmanFilter::new()
            .process(&ssf, &Series::new(&y), (&mut full, &mut light))
            .unwrap();

        assert!(!light.has_covariances());
        for pos in 0..y.len() {
            assert_eq!(full.e(pos), light.e(pos));
            assert_eq!(full.f(pos), light.f(pos));
            testlib::assert_arr1_eq(&full.a(pos), &light.a(pos));
            assert!(light.P(pos).is_none());
        }
    }
}
