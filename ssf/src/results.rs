#![allow(non_snake_case)]

use serde::Deserialize;

/// What the filter did at a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// the observation corrected the state
    Updated,
    /// no observation
    Missing,
    /// observed, but the prediction error variance vanished or the
    /// prediction error is not finite; no correction
    Degenerate,
}

impl StepStatus {
    pub fn is_updated(&self) -> bool {
        matches!(self, StepStatus::Updated)
    }
}

/// Which optional buffers a container allocates.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// covariances are stored
    #[default]
    Full,
    /// point estimates only
    Light,
}

/// How complete a smoothing pass was.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// point estimates and their variances
    Full,
    /// point estimates only, either requested or because the variance
    /// buffers could not be reserved
    PointEstimates,
}

/// Per-position output of the filter. `a`, `P` are the predicted state and
/// covariance, `M = P Z'`.
#[derive(Debug)]
pub struct FilterRecord<'a> {
    pub status: StepStatus,
    pub e: f64,
    pub f: f64,
    pub a: ndarray::ArrayView1<'a, f64>,
    pub P: ndarray::ArrayView2<'a, f64>,
    pub M: ndarray::ArrayView1<'a, f64>,
}

/// Receives the filter output.
pub trait FilteringSink {
    /// called once before the first record
    fn prepare(&mut self, dim: usize, n: usize);

    fn save(&mut self, pos: usize, record: &FilterRecord);
}

impl<S: FilteringSink + ?Sized> FilteringSink for &mut S {
    fn prepare(&mut self, dim: usize, n: usize) {
        (**self).prepare(dim, n);
    }

    fn save(&mut self, pos: usize, record: &FilterRecord) {
        (**self).save(pos, record);
    }
}

impl<A: FilteringSink, B: FilteringSink> FilteringSink for (A, B) {
    fn prepare(&mut self, dim: usize, n: usize) {
        self.0.prepare(dim, n);
        self.1.prepare(dim, n);
    }

    fn save(&mut self, pos: usize, record: &FilterRecord) {
        self.0.save(pos, record);
        self.1.save(pos, record);
    }
}

/// Read access to stored filter output, keyed by position.
pub trait FilteredData {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dim(&self) -> usize;

    /// `None` for positions the filter never reached
    fn status(&self, pos: usize) -> Option<StepStatus>;

    fn is_updated(&self, pos: usize) -> bool {
        matches!(self.status(pos), Some(StepStatus::Updated))
    }

    /// prediction error, NaN when missing
    fn e(&self, pos: usize) -> f64;

    /// prediction error variance
    fn f(&self, pos: usize) -> f64;

    fn a(&self, pos: usize) -> ndarray::ArrayView1<f64>;

    fn M(&self, pos: usize) -> ndarray::ArrayView1<f64>;

    /// `None` when covariances aren't stored
    fn P(&self, pos: usize) -> Option<ndarray::ArrayView2<f64>>;
}

pub(crate) fn try_alloc3(shape: (usize, usize, usize)) -> Option<ndarray::Array3<f64>> {
    let len = shape.0.checked_mul(shape.1)?.checked_mul(shape.2)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).ok()?;
    buf.resize(len, f64::NAN);
    ndarray::Array3::from_shape_vec(shape, buf).ok()
}

/// Storage of the filter output.
#[derive(Clone, Debug)]
pub struct FilteringResults {
    mode: StorageMode,
    status: Vec<Option<StepStatus>>,
    e: Vec<f64>,
    f: Vec<f64>,
    a: ndarray::Array2<f64>,
    M: ndarray::Array2<f64>,
    P: Option<ndarray::Array3<f64>>,
}

impl FilteringResults {
    pub fn new(mode: StorageMode) -> Self {
        Self {
            mode,
            status: Vec::new(),
            e: Vec::new(),
            f: Vec::new(),
            a: ndarray::Array2::zeros((0, 0)),
            M: ndarray::Array2::zeros((0, 0)),
            P: None,
        }
    }

    pub fn full() -> Self {
        Self::new(StorageMode::Full)
    }

    pub fn light() -> Self {
        Self::new(StorageMode::Light)
    }

    /// the requested mode
    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn has_covariances(&self) -> bool {
        self.P.is_some()
    }

    /// `e / sqrt(f)` at updated positions
    pub fn standardized_residuals(&self) -> Vec<Option<f64>> {
        (0..self.status.len())
            .map(|pos| {
                if self.is_updated(pos) {
                    Some(self.e[pos] / self.f[pos].sqrt())
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn errors(&self) -> &[f64] {
        &self.e
    }

    pub fn error_variances(&self) -> &[f64] {
        &self.f
    }
}

impl FilteringSink for FilteringResults {
    fn prepare(&mut self, dim: usize, n: usize) {
        self.status = vec![None; n];
        self.e = vec![f64::NAN; n];
        self.f = vec![f64::NAN; n];
        self.a = ndarray::Array2::from_elem((n, dim), f64::NAN);
        self.M = ndarray::Array2::from_elem((n, dim), f64::NAN);
        self.P = match self.mode {
            StorageMode::Full => {
                let P = try_alloc3((n, dim, dim));
                if P.is_none() {
                    log::warn!(
                        "can't reserve filtered covariances for {} x {}x{}, storing point estimates",
                        n,
                        dim,
                        dim
                    );
                }
                P
            }
            StorageMode::Light => None,
        };
    }

    fn save(&mut self, pos: usize, record: &FilterRecord) {
        self.status[pos] = Some(record.status);
        self.e[pos] = record.e;
        self.f[pos] = record.f;
        self.a.row_mut(pos).assign(&record.a);
        self.M.row_mut(pos).assign(&record.M);
        if let Some(P) = &mut self.P {
            P.index_axis_mut(ndarray::Axis(0), pos).assign(&record.P);
        }
    }
}

impl FilteredData for FilteringResults {
    fn len(&self) -> usize {
        self.status.len()
    }

    fn dim(&self) -> usize {
        self.a.ncols()
    }

    fn status(&self, pos: usize) -> Option<StepStatus> {
        self.status.get(pos).copied().flatten()
    }

    fn e(&self, pos: usize) -> f64 {
        self.e[pos]
    }

    fn f(&self, pos: usize) -> f64 {
        self.f[pos]
    }

    fn a(&self, pos: usize) -> ndarray::ArrayView1<f64> {
        self.a.row(pos)
    }

    fn M(&self, pos: usize) -> ndarray::ArrayView1<f64> {
        self.M.row(pos)
    }

    fn P(&self, pos: usize) -> Option<ndarray::ArrayView2<f64>> {
        self.status(pos)?;
        self.P
            .as_ref()
            .map(|P| P.index_axis(ndarray::Axis(0), pos))
    }
}

/// Smoothed states. Positions outside the smoothed range stay NaN.
#[derive(Clone, Debug)]
pub struct SmoothingResults {
    a: ndarray::Array2<f64>,
    P: Option<ndarray::Array3<f64>>,
    set: Vec<bool>,
}

impl Default for SmoothingResults {
    fn default() -> Self {
        Self::new()
    }
}

impl SmoothingResults {
    pub fn new() -> Self {
        Self {
            a: ndarray::Array2::zeros((0, 0)),
            P: None,
            set: Vec::new(),
        }
    }

    /// allocates `n` positions, returns whether the covariances could be reserved
    pub(crate) fn prepare(&mut self, dim: usize, n: usize, variances: bool) -> bool {
        self.a = ndarray::Array2::from_elem((n, dim), f64::NAN);
        self.set = vec![false; n];
        self.P = None;
        if variances {
            self.P = try_alloc3((n, dim, dim));
            if self.P.is_none() {
                log::warn!(
                    "can't reserve smoothed covariances for {} x {}x{}, smoothing point estimates",
                    n,
                    dim,
                    dim
                );
                return false;
            }
        }
        true
    }

    pub(crate) fn save(
        &mut self,
        pos: usize,
        a: ndarray::ArrayView1<f64>,
        P: Option<ndarray::ArrayView2<f64>>,
    ) {
        self.a.row_mut(pos).assign(&a);
        if let (Some(dst), Some(P)) = (&mut self.P, P) {
            dst.index_axis_mut(ndarray::Axis(0), pos).assign(&P);
        }
        self.set[pos] = true;
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.a.ncols()
    }

    pub fn has_variances(&self) -> bool {
        self.P.is_some()
    }

    pub fn is_set(&self, pos: usize) -> bool {
        self.set.get(pos).copied().unwrap_or(false)
    }

    pub fn a(&self, pos: usize) -> Option<ndarray::ArrayView1<f64>> {
        self.is_set(pos).then(|| self.a.row(pos))
    }

    pub fn P(&self, pos: usize) -> Option<ndarray::ArrayView2<f64>> {
        if !self.is_set(pos) {
            return None;
        }
        self.P
            .as_ref()
            .map(|P| P.index_axis(ndarray::Axis(0), pos))
    }

    /// all smoothed states, one row per position
    pub fn states(&self) -> ndarray::ArrayView2<f64> {
        self.a.view()
    }

    /// smoothed values of state component `i`
    pub fn component(&self, i: usize) -> ndarray::ArrayView1<f64> {
        self.a.column(i)
    }

    pub fn component_variance(&self, i: usize) -> Option<ndarray::Array1<f64>> {
        let P = self.P.as_ref()?;
        Some(P.outer_iter().map(|Pt| Pt[(i, i)]).collect())
    }

    /// `z a*(t)` for every position
    pub fn zcomponent<S>(&self, z: &ndarray::ArrayBase<S, ndarray::Ix1>) -> ndarray::Array1<f64>
    where
        S: ndarray::Data<Elem = f64>,
    {
        self.a.dot(z)
    }

    /// `z P*(t) z'` for every position
    pub fn zvariance<S>(&self, z: &ndarray::ArrayBase<S, ndarray::Ix1>) -> Option<ndarray::Array1<f64>>
    where
        S: ndarray::Data<Elem = f64>,
    {
        let P = self.P.as_ref()?;
        Some(P.outer_iter().map(|Pt| z.dot(&Pt.dot(z))).collect())
    }
}

/// Smoothed disturbances. `U` are the standardized transition innovations,
/// `esm` the measurement errors (only stored when the measurement has any).
#[derive(Clone, Debug)]
pub struct DisturbanceResults {
    U: ndarray::Array2<f64>,
    UVar: Option<ndarray::Array3<f64>>,
    esm: Option<Vec<f64>>,
    esm_variance: Option<Vec<f64>>,
    set: Vec<bool>,
}

impl Default for DisturbanceResults {
    fn default() -> Self {
        Self::new()
    }
}

impl DisturbanceResults {
    pub fn new() -> Self {
        Self {
            U: ndarray::Array2::zeros((0, 0)),
            UVar: None,
            esm: None,
            esm_variance: None,
            set: Vec::new(),
        }
    }

    /// returns whether the variances could be reserved
    pub(crate) fn prepare(&mut self, r: usize, n: usize, errors: bool, variances: bool) -> bool {
        self.U = ndarray::Array2::from_elem((n, r), f64::NAN);
        self.set = vec![false; n];
        self.esm = errors.then(|| vec![f64::NAN; n]);
        self.UVar = None;
        self.esm_variance = None;

        if variances {
            self.UVar = try_alloc3((n, r, r));
            if self.UVar.is_none() {
                log::warn!(
                    "can't reserve disturbance covariances for {} x {}x{}, smoothing point estimates",
                    n,
                    r,
                    r
                );
                return false;
            }
            self.esm_variance = errors.then(|| vec![f64::NAN; n]);
        }
        true
    }

    pub(crate) fn save(
        &mut self,
        pos: usize,
        U: ndarray::ArrayView1<f64>,
        UVar: Option<ndarray::ArrayView2<f64>>,
    ) {
        self.U.row_mut(pos).assign(&U);
        if let (Some(dst), Some(UVar)) = (&mut self.UVar, UVar) {
            dst.index_axis_mut(ndarray::Axis(0), pos).assign(&UVar);
        }
        self.set[pos] = true;
    }

    pub(crate) fn save_error(&mut self, pos: usize, esm: f64, variance: Option<f64>) {
        if let Some(dst) = &mut self.esm {
            dst[pos] = esm;
        }
        if let (Some(dst), Some(variance)) = (&mut self.esm_variance, variance) {
            dst[pos] = variance;
        }
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn innovations_dim(&self) -> usize {
        self.U.ncols()
    }

    pub fn has_variances(&self) -> bool {
        self.UVar.is_some()
    }

    pub fn has_errors(&self) -> bool {
        self.esm.is_some()
    }

    pub fn is_set(&self, pos: usize) -> bool {
        self.set.get(pos).copied().unwrap_or(false)
    }

    pub fn U(&self, pos: usize) -> Option<ndarray::ArrayView1<f64>> {
        self.is_set(pos).then(|| self.U.row(pos))
    }

    pub fn UVar(&self, pos: usize) -> Option<ndarray::ArrayView2<f64>> {
        if !self.is_set(pos) {
            return None;
        }
        self.UVar
            .as_ref()
            .map(|UVar| UVar.index_axis(ndarray::Axis(0), pos))
    }

    /// smoothed innovation `i` at every position
    pub fn component(&self, i: usize) -> ndarray::ArrayView1<f64> {
        self.U.column(i)
    }

    pub fn component_variance(&self, i: usize) -> Option<ndarray::Array1<f64>> {
        let UVar = self.UVar.as_ref()?;
        Some(UVar.outer_iter().map(|V| V[(i, i)]).collect())
    }

    pub fn esm(&self, pos: usize) -> Option<f64> {
        if !self.is_set(pos) {
            return None;
        }
        self.esm.as_ref().map(|esm| esm[pos])
    }

    pub fn esm_variance(&self, pos: usize) -> Option<f64> {
        if !self.is_set(pos) {
            return None;
        }
        self.esm_variance.as_ref().map(|v| v[pos])
    }

    /// smoothed measurement errors, NaN outside the smoothed range
    pub fn errors(&self) -> Option<&[f64]> {
        self.esm.as_deref()
    }

    pub fn error_variances(&self) -> Option<&[f64]> {
        self.esm_variance.as_deref()
    }
}
