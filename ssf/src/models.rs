#![allow(non_snake_case)]

//! Ready-made dynamics and measurements.

use crate::model::{Dynamics, Measurement, SsfModel};
use crate::Error;

/// `a(t+1) = a(t) + sqrt(q) u(t)`
#[derive(Clone, Debug)]
pub struct RandomWalk {
    q: f64,
    a0: f64,
    p0: f64,
    diffuse: bool,
}

impl RandomWalk {
    pub fn new(q: f64, a0: f64, p0: f64) -> Self {
        Self {
            q,
            a0,
            p0,
            diffuse: false,
        }
    }

    /// starts with an infinite variance
    pub fn diffuse(q: f64) -> Self {
        Self {
            q,
            a0: 0.0,
            p0: 0.0,
            diffuse: true,
        }
    }

    pub fn variance(&self) -> f64 {
        self.q
    }
}

impl Dynamics for RandomWalk {
    fn state_dim(&self) -> usize {
        1
    }

    fn innovations_dim(&self) -> usize {
        1
    }

    fn is_time_invariant(&self) -> bool {
        true
    }

    fn is_diffuse(&self) -> bool {
        self.diffuse
    }

    fn a0(&self, mut a: ndarray::ArrayViewMut1<f64>) {
        a[0] = self.a0;
    }

    fn Pf0(&self, mut p: ndarray::ArrayViewMut2<f64>) {
        p[(0, 0)] = self.p0;
    }

    fn T(&self, _pos: usize, mut t: ndarray::ArrayViewMut2<f64>) {
        t[(0, 0)] = 1.0;
    }

    fn TX(&self, _pos: usize, _x: ndarray::ArrayViewMut1<f64>) {}

    fn XT(&self, _pos: usize, _x: ndarray::ArrayViewMut1<f64>) {}

    fn TVT(&self, _pos: usize, _v: ndarray::ArrayViewMut2<f64>) {}

    fn S(&self, _pos: usize, mut s: ndarray::ArrayViewMut2<f64>) {
        s[(0, 0)] = self.q.sqrt();
    }

    fn XS(&self, _pos: usize, x: ndarray::ArrayView1<f64>, mut xs: ndarray::ArrayViewMut1<f64>) {
        xs[0] = x[0] * self.q.sqrt();
    }

    fn V(&self, _pos: usize, mut v: ndarray::ArrayViewMut2<f64>) {
        v[(0, 0)] = self.q;
    }

    fn addV(&self, _pos: usize, mut p: ndarray::ArrayViewMut2<f64>) {
        p[(0, 0)] += self.q;
    }
}

/// Level and slope, each with its own innovation.
///
/// ```text
/// T = | 1 1 |    S = | sqrt(level_var)       0        |
///     | 0 1 |        |       0         sqrt(slope_var) |
/// ```
#[derive(Clone, Debug)]
pub struct LocalLinearTrend {
    level_std: f64,
    slope_std: f64,
    prior_var: f64,
}

impl LocalLinearTrend {
    pub fn new(level_var: f64, slope_var: f64, prior_var: f64) -> Self {
        Self {
            level_std: level_var.sqrt(),
            slope_std: slope_var.sqrt(),
            prior_var,
        }
    }
}

impl Dynamics for LocalLinearTrend {
    fn state_dim(&self) -> usize {
        2
    }

    fn innovations_dim(&self) -> usize {
        2
    }

    fn is_time_invariant(&self) -> bool {
        true
    }

    fn a0(&self, mut a: ndarray::ArrayViewMut1<f64>) {
        a.fill(0.0);
    }

    fn Pf0(&self, mut p: ndarray::ArrayViewMut2<f64>) {
        p.fill(0.0);
        p.diag_mut().fill(self.prior_var);
    }

    fn T(&self, _pos: usize, mut t: ndarray::ArrayViewMut2<f64>) {
        t.assign(&ndarray::array![[1.0, 1.0], [0.0, 1.0]]);
    }

    fn TX(&self, _pos: usize, mut x: ndarray::ArrayViewMut1<f64>) {
        x[0] += x[1];
    }

    fn XT(&self, _pos: usize, mut x: ndarray::ArrayViewMut1<f64>) {
        x[1] += x[0];
    }

    fn S(&self, _pos: usize, mut s: ndarray::ArrayViewMut2<f64>) {
        s.fill(0.0);
        s[(0, 0)] = self.level_std;
        s[(1, 1)] = self.slope_std;
    }

    fn XS(&self, _pos: usize, x: ndarray::ArrayView1<f64>, mut xs: ndarray::ArrayViewMut1<f64>) {
        xs[0] = x[0] * self.level_std;
        xs[1] = x[1] * self.slope_std;
    }

    fn addV(&self, _pos: usize, mut p: ndarray::ArrayViewMut2<f64>) {
        p[(0, 0)] += self.level_std * self.level_std;
        p[(1, 1)] += self.slope_std * self.slope_std;
    }
}

/// Time invariant dynamics given by dense matrices.
#[derive(Clone, Debug)]
pub struct MatrixDynamics {
    t: ndarray::Array2<f64>,
    s: ndarray::Array2<f64>,
    v: ndarray::Array2<f64>,
    a0: ndarray::Array1<f64>,
    p0: ndarray::Array2<f64>,
}

impl MatrixDynamics {
    pub fn new(
        t: ndarray::Array2<f64>,
        s: ndarray::Array2<f64>,
        a0: ndarray::Array1<f64>,
        p0: ndarray::Array2<f64>,
    ) -> Result<Self, Error> {
        let dim = t.nrows();
        let check = |found: usize| {
            if found == dim {
                Ok(())
            } else {
                Err(Error::DimensionMismatch {
                    expected: dim,
                    found,
                })
            }
        };
        check(t.ncols())?;
        check(s.nrows())?;
        check(a0.len())?;
        check(p0.nrows())?;
        check(p0.ncols())?;

        let v = s.dot(&s.t());
        Ok(Self { t, s, v, a0, p0 })
    }

    /// Zero mean, initial covariance from `P = T P T' + S S'`. Fails when `T`
    /// has a unit root.
    pub fn stationary(t: ndarray::Array2<f64>, s: ndarray::Array2<f64>) -> Result<Self, Error> {
        let v = s.dot(&s.t());
        let p0 = math::lyapunov::solve_discrete(&t, &v)?;
        Self::new(t, s, ndarray::Array1::zeros(p0.nrows()), p0)
    }
}

impl Dynamics for MatrixDynamics {
    fn state_dim(&self) -> usize {
        self.t.nrows()
    }

    fn innovations_dim(&self) -> usize {
        self.s.ncols()
    }

    fn is_time_invariant(&self) -> bool {
        true
    }

    fn a0(&self, mut a: ndarray::ArrayViewMut1<f64>) {
        a.assign(&self.a0);
    }

    fn Pf0(&self, mut p: ndarray::ArrayViewMut2<f64>) {
        p.assign(&self.p0);
    }

    fn T(&self, _pos: usize, mut t: ndarray::ArrayViewMut2<f64>) {
        t.assign(&self.t);
    }

    fn TX(&self, _pos: usize, mut x: ndarray::ArrayViewMut1<f64>) {
        let tx = self.t.dot(&x);
        x.assign(&tx);
    }

    fn XT(&self, _pos: usize, mut x: ndarray::ArrayViewMut1<f64>) {
        let xt = x.dot(&self.t);
        x.assign(&xt);
    }

    fn S(&self, _pos: usize, mut s: ndarray::ArrayViewMut2<f64>) {
        s.assign(&self.s);
    }

    fn XS(&self, _pos: usize, x: ndarray::ArrayView1<f64>, mut xs: ndarray::ArrayViewMut1<f64>) {
        xs.assign(&x.dot(&self.s));
    }

    fn V(&self, _pos: usize, mut v: ndarray::ArrayViewMut2<f64>) {
        v.assign(&self.v);
    }

    fn addV(&self, _pos: usize, mut p: ndarray::ArrayViewMut2<f64>) {
        p += &self.v;
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ErrorVariance {
    None,
    Constant(f64),
    Varying(Vec<f64>),
}

/// Observes one state component, `Z = e_index`.
#[derive(Clone, Debug)]
pub struct SelectMeasurement {
    dim: usize,
    index: usize,
    errors: ErrorVariance,
}

impl SelectMeasurement {
    /// without measurement error
    pub fn new(dim: usize, index: usize) -> Result<Self, Error> {
        if index >= dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: index + 1,
            });
        }

        Ok(Self {
            dim,
            index,
            errors: ErrorVariance::None,
        })
    }

    pub fn with_variance(mut self, h: f64) -> Self {
        self.errors = ErrorVariance::Constant(h);
        self
    }

    /// one variance per position, zero past the end
    pub fn with_variances(mut self, h: Vec<f64>) -> Self {
        self.errors = ErrorVariance::Varying(h);
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Measurement for SelectMeasurement {
    fn state_dim(&self) -> usize {
        self.dim
    }

    fn is_time_invariant(&self) -> bool {
        !matches!(self.errors, ErrorVariance::Varying(_))
    }

    fn has_errors(&self) -> bool {
        match &self.errors {
            ErrorVariance::None => false,
            ErrorVariance::Constant(h) => *h > 0.0,
            ErrorVariance::Varying(h) => h.iter().any(|&h| h > 0.0),
        }
    }

    fn error_variance(&self, pos: usize) -> f64 {
        match &self.errors {
            ErrorVariance::None => 0.0,
            ErrorVariance::Constant(h) => *h,
            ErrorVariance::Varying(h) => h.get(pos).copied().unwrap_or(0.0),
        }
    }

    fn Z(&self, _pos: usize, mut z: ndarray::ArrayViewMut1<f64>) {
        z.fill(0.0);
        z[self.index] = 1.0;
    }

    fn ZX(&self, _pos: usize, x: ndarray::ArrayView1<f64>) -> f64 {
        x[self.index]
    }

    fn ZVZ(&self, _pos: usize, v: ndarray::ArrayView2<f64>) -> f64 {
        v[(self.index, self.index)]
    }

    fn VpZdZ(&self, _pos: usize, mut v: ndarray::ArrayViewMut2<f64>, d: f64) {
        v[(self.index, self.index)] += d;
    }

    fn XpZd(&self, _pos: usize, mut x: ndarray::ArrayViewMut1<f64>, d: f64) {
        x[self.index] += d;
    }

    fn ZM(&self, _pos: usize, m: ndarray::ArrayView2<f64>, mut zm: ndarray::ArrayViewMut1<f64>) {
        zm.assign(&m.column(self.index));
    }
}

/// Dense loading row with a constant error variance.
#[derive(Clone, Debug)]
pub struct LoadingMeasurement {
    z: ndarray::Array1<f64>,
    h: f64,
}

impl LoadingMeasurement {
    pub fn new(z: ndarray::Array1<f64>, h: f64) -> Self {
        Self { z, h }
    }
}

impl Measurement for LoadingMeasurement {
    fn state_dim(&self) -> usize {
        self.z.len()
    }

    fn is_time_invariant(&self) -> bool {
        true
    }

    fn has_errors(&self) -> bool {
        self.h > 0.0
    }

    fn error_variance(&self, _pos: usize) -> f64 {
        self.h
    }

    fn Z(&self, _pos: usize, mut z: ndarray::ArrayViewMut1<f64>) {
        z.assign(&self.z);
    }

    fn ZX(&self, _pos: usize, x: ndarray::ArrayView1<f64>) -> f64 {
        self.z.dot(&x)
    }

    fn ZVZ(&self, _pos: usize, v: ndarray::ArrayView2<f64>) -> f64 {
        self.z.dot(&v.dot(&self.z))
    }

    fn VpZdZ(&self, _pos: usize, mut v: ndarray::ArrayViewMut2<f64>, d: f64) {
        math::add_outer(&mut v, &self.z, &self.z, d);
    }

    fn XpZd(&self, _pos: usize, mut x: ndarray::ArrayViewMut1<f64>, d: f64) {
        x.scaled_add(d, &self.z);
    }
}

/// Random walk observed with noise: `q` innovation and `h` measurement
/// variance, `a(0) ~ N(a0, p0)`.
pub fn local_level(q: f64, h: f64, a0: f64, p0: f64) -> SsfModel<RandomWalk, SelectMeasurement> {
    SsfModel {
        dynamics: RandomWalk::new(q, a0, p0),
        measurement: SelectMeasurement {
            dim: 1,
            index: 0,
            errors: ErrorVariance::Constant(h),
        },
    }
}
