//! Independent series over one shared model.

use crate::data::SsfData;
use crate::filter::KalmanFilter;
use crate::model::Ssf;
use crate::options::{FilterOptions, Options};
use crate::results::{FilteringResults, Outcome, SmoothingResults};
use crate::smoother::StateSmoother;
use crate::Error;
use rayon::prelude::*;

/// Output of [`smooth_all`] for one series.
#[derive(Clone, Debug)]
pub struct Smoothed {
    pub filtered: FilteringResults,
    pub states: SmoothingResults,
    pub outcome: Outcome,
}

/// Filters every series in parallel, results keep the input order.
pub fn filter_all<S, D>(ssf: &S, series: &[D], options: &FilterOptions) -> Vec<Result<FilteringResults, Error>>
where
    S: Ssf + ?Sized,
    D: SsfData + Sync,
{
    log::debug!("filtering {} series", series.len());

    series
        .par_iter()
        .map(|data| {
            let filter = KalmanFilter::with_options(options.clone());
            let mut rslts = FilteringResults::new(options.storage);
            filter.process(ssf, data, &mut rslts)?;
            Ok(rslts)
        })
        .collect()
}

/// Filters and smooths every series over its whole length. The filter always
/// keeps covariances here, the smoother needs them.
pub fn smooth_all<S, D>(ssf: &S, series: &[D], options: &Options) -> Vec<Result<Smoothed, Error>>
where
    S: Ssf + ?Sized,
    D: SsfData + Sync,
{
    log::debug!("smoothing {} series", series.len());

    series
        .par_iter()
        .map(|data| {
            let filter = KalmanFilter::with_options(options.filter.clone());
            let mut filtered = FilteringResults::full();
            filter.process(ssf, data, &mut filtered)?;

            let mut states = SmoothingResults::new();
            let outcome = StateSmoother::with_options(&options.smoother).process(
                ssf,
                0,
                data.len(),
                &filtered,
                &mut states,
            )?;

            Ok(Smoothed {
                filtered,
                states,
                outcome,
            })
        })
        .collect()
}
