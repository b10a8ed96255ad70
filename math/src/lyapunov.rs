use crate::Error;
use ndarray_linalg::Solve;

/// Solves the discrete Lyapunov equation `P = T P T' + V`.
///
/// The `n x n` unknowns are stacked row-major into the linear system
/// `(I - T (x) T) vec(P) = vec(V)`. A transition with a unit root makes the
/// system singular and yields `Error::SingularMatrix`.
pub fn solve_discrete<St, Sv>(
    t: &ndarray::ArrayBase<St, ndarray::Ix2>,
    v: &ndarray::ArrayBase<Sv, ndarray::Ix2>,
) -> Result<ndarray::Array2<f64>, Error>
where
    St: ndarray::Data<Elem = f64>,
    Sv: ndarray::Data<Elem = f64>,
{
    let (n, ncols) = t.dim();
    if n != ncols {
        return Err(Error::NotSquare(n, ncols));
    }
    if v.dim() != (n, n) {
        return Err(Error::NotSquare(v.nrows(), v.ncols()));
    }

    let nn = n * n;
    let mut a = ndarray::Array2::<f64>::eye(nn);
    for i in 0..n {
        for j in 0..n {
            let row = i * n + j;
            for k in 0..n {
                let tik = t[(i, k)];
                if tik == 0.0 {
                    continue;
                }
                for l in 0..n {
                    a[(row, k * n + l)] -= tik * t[(j, l)];
                }
            }
        }
    }

    let b: ndarray::Array1<f64> = v.iter().copied().collect();
    let x = a.solve_into(b).map_err(|_| Error::SingularMatrix)?;
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularMatrix);
    }

    let mut p = x
        .into_shape((n, n))
        .map_err(|_| Error::WrongVecLen(nn, n * n))?;
    crate::symmetrize(&mut p)?;
    Ok(p)
}
