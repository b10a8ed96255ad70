#![allow(non_snake_case)]

//! The state-space contract.
//!
//! ```text
//! a(t+1) = T(t) a(t) + S(t) u(t),    u(t) ~ N(0, I)
//! y(t)   = Z(t) a(t) + e(t),         e(t) ~ N(0, H(t))
//! ```
//!
//! with `a(0) ~ N(a0, Pf0)`. All operations take the time index explicitly and
//! only read the model, so one instance can be shared by concurrent runs.

use crate::Error;

/// Transition equation.
pub trait Dynamics: Send + Sync {
    fn state_dim(&self) -> usize;

    /// dimension `r` of the innovations `u(t)`
    fn innovations_dim(&self) -> usize;

    fn is_time_invariant(&self) -> bool;

    /// the initial distribution has infinite variance in some directions
    fn is_diffuse(&self) -> bool {
        false
    }

    /// initial state mean
    fn a0(&self, a: ndarray::ArrayViewMut1<f64>);

    /// initial state covariance, ignoring any diffuse part
    fn Pf0(&self, p: ndarray::ArrayViewMut2<f64>);

    /// writes the transition matrix
    fn T(&self, pos: usize, t: ndarray::ArrayViewMut2<f64>);

    /// `x = T x`
    fn TX(&self, pos: usize, x: ndarray::ArrayViewMut1<f64>);

    /// `x = x T`
    fn XT(&self, pos: usize, x: ndarray::ArrayViewMut1<f64>);

    /// `v = T v T'`
    fn TVT(&self, pos: usize, mut v: ndarray::ArrayViewMut2<f64>) {
        for col in v.columns_mut() {
            self.TX(pos, col);
        }
        for row in v.rows_mut() {
            self.TX(pos, row);
        }
    }

    /// writes the innovation loading (`state_dim x innovations_dim`)
    fn S(&self, pos: usize, s: ndarray::ArrayViewMut2<f64>);

    /// `xs = x S`
    fn XS(&self, pos: usize, x: ndarray::ArrayView1<f64>, mut xs: ndarray::ArrayViewMut1<f64>) {
        let mut s = ndarray::Array2::zeros((self.state_dim(), self.innovations_dim()));
        self.S(pos, s.view_mut());
        xs.assign(&x.dot(&s));
    }

    /// innovation covariance in state space, `V = S S'`
    fn V(&self, pos: usize, mut v: ndarray::ArrayViewMut2<f64>) {
        let mut s = ndarray::Array2::zeros((self.state_dim(), self.innovations_dim()));
        self.S(pos, s.view_mut());
        v.assign(&s.dot(&s.t()));
    }

    /// `p += V`
    fn addV(&self, pos: usize, mut p: ndarray::ArrayViewMut2<f64>) {
        let mut v = ndarray::Array2::zeros(p.dim());
        self.V(pos, v.view_mut());
        p += &v;
    }
}

/// Measurement equation of a univariate series.
pub trait Measurement: Send + Sync {
    fn state_dim(&self) -> usize;

    fn is_time_invariant(&self) -> bool;

    /// some position has a non-zero error variance
    fn has_errors(&self) -> bool;

    fn has_error(&self, pos: usize) -> bool {
        self.has_errors() && self.error_variance(pos) > 0.0
    }

    /// `H(pos)`
    fn error_variance(&self, pos: usize) -> f64;

    /// writes the loading row
    fn Z(&self, pos: usize, z: ndarray::ArrayViewMut1<f64>);

    /// `Z x`
    fn ZX(&self, pos: usize, x: ndarray::ArrayView1<f64>) -> f64;

    /// `Z V Z'`
    fn ZVZ(&self, pos: usize, v: ndarray::ArrayView2<f64>) -> f64;

    /// `v += d Z' Z`
    fn VpZdZ(&self, pos: usize, v: ndarray::ArrayViewMut2<f64>, d: f64);

    /// `x += d Z`
    fn XpZd(&self, pos: usize, x: ndarray::ArrayViewMut1<f64>, d: f64);

    /// `zm = Z M'`, i.e. `ZX` applied to every row of `m`
    fn ZM(&self, pos: usize, m: ndarray::ArrayView2<f64>, mut zm: ndarray::ArrayViewMut1<f64>) {
        for (zi, row) in zm.iter_mut().zip(m.rows()) {
            *zi = self.ZX(pos, row);
        }
    }
}

/// A dynamics/measurement pair.
///
/// The `L` transforms use `L = T - T m Z / f`, the transition with the
/// information of the observation removed, where `m = P Z'` and `f` is the
/// prediction error variance. They are compositions of the primitives and
/// keep their evaluation order: the transition is applied first, then the
/// rank-one correction.
pub trait Ssf: Send + Sync {
    type Dynamics: Dynamics;
    type Measurement: Measurement;

    fn dynamics(&self) -> &Self::Dynamics;
    fn measurement(&self) -> &Self::Measurement;

    fn state_dim(&self) -> usize {
        self.dynamics().state_dim()
    }

    fn is_time_invariant(&self) -> bool {
        self.dynamics().is_time_invariant() && self.measurement().is_time_invariant()
    }

    fn is_diffuse(&self) -> bool {
        self.dynamics().is_diffuse()
    }

    /// `x = x L = x T - ((x T) m / f) Z`
    fn XL(&self, pos: usize, mut x: ndarray::ArrayViewMut1<f64>, m: ndarray::ArrayView1<f64>, f: f64) {
        self.dynamics().XT(pos, x.view_mut());
        let c = x.dot(&m) / f;
        self.measurement().XpZd(pos, x, -c);
    }

    /// `x = L x = T (x - m (Z x) / f)`
    fn LX(&self, pos: usize, mut x: ndarray::ArrayViewMut1<f64>, m: ndarray::ArrayView1<f64>, f: f64) {
        let c = self.measurement().ZX(pos, x.view()) / f;
        x.scaled_add(-c, &m);
        self.dynamics().TX(pos, x);
    }

    /// `mat = mat L`
    fn ML(&self, pos: usize, mut mat: ndarray::ArrayViewMut2<f64>, m: ndarray::ArrayView1<f64>, f: f64) {
        for row in mat.rows_mut() {
            self.XL(pos, row, m, f);
        }
    }

    /// `mat = L' mat`
    fn LtM(&self, pos: usize, mut mat: ndarray::ArrayViewMut2<f64>, m: ndarray::ArrayView1<f64>, f: f64) {
        for col in mat.columns_mut() {
            self.XL(pos, col, m, f);
        }
    }

    /// `mat = L mat`
    fn LM(&self, pos: usize, mut mat: ndarray::ArrayViewMut2<f64>, m: ndarray::ArrayView1<f64>, f: f64) {
        for col in mat.columns_mut() {
            self.LX(pos, col, m, f);
        }
    }
}

#[derive(Clone, Debug)]
pub struct SsfModel<D, M> {
    pub(crate) dynamics: D,
    pub(crate) measurement: M,
}

impl<D, M> SsfModel<D, M>
where
    D: Dynamics,
    M: Measurement,
{
    pub fn new(dynamics: D, measurement: M) -> Result<Self, Error> {
        if dynamics.state_dim() != measurement.state_dim() {
            return Err(Error::DimensionMismatch {
                expected: dynamics.state_dim(),
                found: measurement.state_dim(),
            });
        }

        Ok(Self {
            dynamics,
            measurement,
        })
    }

    pub fn into_parts(self) -> (D, M) {
        (self.dynamics, self.measurement)
    }
}

impl<D, M> Ssf for SsfModel<D, M>
where
    D: Dynamics,
    M: Measurement,
{
    type Dynamics = D;
    type Measurement = M;

    fn dynamics(&self) -> &D {
        &self.dynamics
    }

    fn measurement(&self) -> &M {
        &self.measurement
    }
}
