mod error;
pub use error::Error;

pub mod gaussian;
pub mod lyapunov;

/// in place rank-one update: `m += alpha * x * y'`
pub fn add_outer<Sm, Sx, Sy, A>(
    m: &mut ndarray::ArrayBase<Sm, ndarray::Ix2>,
    x: &ndarray::ArrayBase<Sx, ndarray::Ix1>,
    y: &ndarray::ArrayBase<Sy, ndarray::Ix1>,
    alpha: A,
) where
    Sm: ndarray::DataMut<Elem = A>,
    Sx: ndarray::Data<Elem = A>,
    Sy: ndarray::Data<Elem = A>,
    A: num_traits::Float + ndarray::ScalarOperand,
{
    assert_eq!(m.dim(), (x.dim(), y.dim()));

    for (mut row, &xi) in m.rows_mut().into_iter().zip(x.iter()) {
        let s = alpha * xi;
        if s.is_zero() {
            continue;
        }
        row.scaled_add(s, y);
    }
}

fn check_square<S, A>(m: &ndarray::ArrayBase<S, ndarray::Ix2>) -> Result<usize, Error>
where
    S: ndarray::RawData<Elem = A>,
{
    let (nrows, ncols) = m.dim();
    if nrows != ncols {
        return Err(Error::NotSquare(nrows, ncols));
    }
    Ok(nrows)
}

/// `m = (m + m') / 2`
pub fn symmetrize<S, A>(m: &mut ndarray::ArrayBase<S, ndarray::Ix2>) -> Result<(), Error>
where
    S: ndarray::DataMut<Elem = A>,
    A: num_traits::Float,
{
    let n = check_square(m)?;
    let half = A::from(0.5).unwrap_or_else(|| A::one() / (A::one() + A::one()));

    for i in 0..n {
        for j in 0..i {
            let v = (m[(i, j)] + m[(j, i)]) * half;
            m[(i, j)] = v;
            m[(j, i)] = v;
        }
    }
    Ok(())
}

/// largest absolute entry
pub fn norm_max<S, A>(m: &ndarray::ArrayBase<S, ndarray::Ix2>) -> A
where
    S: ndarray::Data<Elem = A>,
    A: num_traits::Float,
{
    m.iter().fold(A::zero(), |acc, v| acc.max(v.abs()))
}

/// `max |m - m'|`
pub fn max_asymmetry<S, A>(m: &ndarray::ArrayBase<S, ndarray::Ix2>) -> Result<A, Error>
where
    S: ndarray::Data<Elem = A>,
    A: num_traits::Float,
{
    let n = check_square(m)?;

    let mut max = A::zero();
    for i in 0..n {
        for j in 0..i {
            max = max.max((m[(i, j)] - m[(j, i)]).abs());
        }
    }
    Ok(max)
}

/// checks `max |m - m'| <= rtol * ||m||`. Non-square matrices are never symmetric.
pub fn is_symmetric<S, A>(m: &ndarray::ArrayBase<S, ndarray::Ix2>, rtol: A) -> bool
where
    S: ndarray::Data<Elem = A>,
    A: num_traits::Float,
{
    match max_asymmetry(m) {
        Ok(asym) => asym <= rtol * norm_max(m),
        Err(_) => false,
    }
}
