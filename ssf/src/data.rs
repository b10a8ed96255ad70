//! Observation sequences.
//!
//! Values cross into the engine as `Option<f64>`: `None` is a missing
//! observation. Wrappers never copy the underlying buffer.

use crate::Error;

pub trait SsfData {
    fn len(&self) -> usize;

    /// the observation at `pos`, `None` if it is missing or out of range
    fn get(&self, pos: usize) -> Option<f64>;

    fn is_missing(&self, pos: usize) -> bool {
        self.get(pos).is_none()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// number of non-missing observations
    fn observations(&self) -> usize {
        (0..self.len()).filter(|&pos| !self.is_missing(pos)).count()
    }
}

impl<D: SsfData + ?Sized> SsfData for &D {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, pos: usize) -> Option<f64> {
        (**self).get(pos)
    }
}

impl SsfData for [Option<f64>] {
    fn len(&self) -> usize {
        <[Option<f64>]>::len(self)
    }

    fn get(&self, pos: usize) -> Option<f64> {
        <[Option<f64>]>::get(self, pos).copied().flatten()
    }
}

impl SsfData for Vec<Option<f64>> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, pos: usize) -> Option<f64> {
        SsfData::get(self.as_slice(), pos)
    }
}

/// A raw numeric buffer. Non-finite values are missing.
#[derive(Clone, Copy, Debug)]
pub struct Series<'a> {
    values: &'a [f64],
}

impl<'a> Series<'a> {
    pub fn new(values: &'a [f64]) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }
}

impl<'a> SsfData for Series<'a> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn get(&self, pos: usize) -> Option<f64> {
        self.values.get(pos).copied().filter(|v| v.is_finite())
    }
}

/// `len` consecutive positions of another sequence, starting at `offset`.
#[derive(Clone, Copy, Debug)]
pub struct Window<D> {
    inner: D,
    offset: usize,
    len: usize,
}

impl<D: SsfData> Window<D> {
    pub fn new(inner: D, offset: usize, len: usize) -> Result<Self, Error> {
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end > inner.len() {
            return Err(Error::InvalidRange {
                start: offset,
                end,
                len: inner.len(),
            });
        }

        Ok(Self { inner, offset, len })
    }
}

impl<D: SsfData> SsfData for Window<D> {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, pos: usize) -> Option<f64> {
        if pos >= self.len {
            return None;
        }
        self.inner.get(self.offset + pos)
    }
}

/// Pads another sequence with `nbcasts` leading and `nfcasts` trailing
/// missing positions, so the filter produces back- and forecasts there.
#[derive(Clone, Copy, Debug)]
pub struct Extended<D> {
    inner: D,
    nbcasts: usize,
    nfcasts: usize,
}

impl<D: SsfData> Extended<D> {
    pub fn new(inner: D, nbcasts: usize, nfcasts: usize) -> Self {
        Self {
            inner,
            nbcasts,
            nfcasts,
        }
    }

    pub fn backcasts(&self) -> usize {
        self.nbcasts
    }

    pub fn forecasts(&self) -> usize {
        self.nfcasts
    }

    /// position in the extended sequence of the first inner observation
    pub fn inner_start(&self) -> usize {
        self.nbcasts
    }
}

impl<D: SsfData> SsfData for Extended<D> {
    fn len(&self) -> usize {
        self.nbcasts + self.inner.len() + self.nfcasts
    }

    fn get(&self, pos: usize) -> Option<f64> {
        if pos < self.nbcasts {
            return None;
        }
        self.inner.get(pos - self.nbcasts)
    }

    fn observations(&self) -> usize {
        self.inner.observations()
    }
}
