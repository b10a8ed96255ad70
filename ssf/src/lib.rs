//! Univariate linear Gaussian state-space models: Kalman filter, state
//! smoother and disturbance smoother.

pub mod batch;
pub mod data;
pub mod disturbance;
pub mod filter;
pub mod likelihood;
pub mod model;
pub mod models;
pub mod options;
pub mod results;
pub mod smoother;

mod error;
pub use error::Error;

pub use data::{Extended, Series, SsfData, Window};
pub use disturbance::DisturbanceSmoother;
pub use filter::{KalmanFilter, State};
pub use likelihood::Likelihood;
pub use model::{Dynamics, Measurement, Ssf, SsfModel};
pub use options::{FilterOptions, Options, SmootherOptions};
pub use results::{
    DisturbanceResults, FilteredData, FilteringResults, FilteringSink, Outcome, SmoothingResults, StepStatus,
    StorageMode,
};
pub use smoother::StateSmoother;

#[cfg(test)]
extern crate lapack_src;
