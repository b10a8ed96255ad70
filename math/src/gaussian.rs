use crate::Error;
use ndarray_linalg::{cholesky::Cholesky, triangular::SolveTriangular, Diag, UPLO};

/// log-density of `N(0, var)` at `x`
pub fn logpdf<A>(x: A, var: A) -> A
where
    A: num_traits::Float + num_traits::FloatConst,
{
    let two = A::one() + A::one();
    -((two * A::PI()).ln() + var.ln() + x * x / var) / two
}

/// log-density of `N(mean, cov)` at `x`, `cov` has to be positive definite
pub fn multivariate_logpdf<Sx, Sm, Sc>(
    x: &ndarray::ArrayBase<Sx, ndarray::Ix1>,
    mean: &ndarray::ArrayBase<Sm, ndarray::Ix1>,
    cov: &ndarray::ArrayBase<Sc, ndarray::Ix2>,
) -> Result<f64, Error>
where
    Sx: ndarray::Data<Elem = f64>,
    Sm: ndarray::Data<Elem = f64>,
    Sc: ndarray::Data<Elem = f64>,
{
    let dim = mean.len();
    if x.len() != dim {
        return Err(Error::WrongVecLen(x.len(), dim));
    }
    if cov.dim() != (dim, dim) {
        return Err(Error::NotSquare(cov.nrows(), cov.ncols()));
    }

    let l = cov
        .cholesky(UPLO::Lower)
        .map_err(|_| Error::NotPositiveSemiDefinite)?;
    let dev = x - mean;
    let z = l.solve_triangular(UPLO::Lower, Diag::NonUnit, &dev)?;
    let log_det = 2.0 * l.diag().mapv(f64::ln).sum();

    Ok(-0.5 * (dim as f64 * (2.0 * std::f64::consts::PI).ln() + log_det + z.dot(&z)))
}
