use approx::assert_abs_diff_eq;
use ndarray::azip;

pub const EPSILON: f64 = 1.0e-6;

pub fn assert_arr1_eq_eps<Sa, Sb>(
    a: &ndarray::ArrayBase<Sa, ndarray::Ix1>,
    b: &ndarray::ArrayBase<Sb, ndarray::Ix1>,
    epsilon: f64,
) where
    Sa: ndarray::Data<Elem = f64>,
    Sb: ndarray::Data<Elem = f64>,
{
    assert_eq!(a.dim(), b.dim());

    azip!((a in a, b in b) assert_abs_diff_eq!(a, b, epsilon=epsilon));
}

pub fn assert_arr1_eq<Sa, Sb>(
    a: &ndarray::ArrayBase<Sa, ndarray::Ix1>,
    b: &ndarray::ArrayBase<Sb, ndarray::Ix1>,
) where
    Sa: ndarray::Data<Elem = f64>,
    Sb: ndarray::Data<Elem = f64>,
{
    assert_arr1_eq_eps(a, b, EPSILON);
}

pub fn assert_arr2_eq_eps<Sa, Sb>(
    a: &ndarray::ArrayBase<Sa, ndarray::Ix2>,
    b: &ndarray::ArrayBase<Sb, ndarray::Ix2>,
    epsilon: f64,
) where
    Sa: ndarray::Data<Elem = f64>,
    Sb: ndarray::Data<Elem = f64>,
{
    assert_eq!(a.dim(), b.dim());

    azip!((a in a.columns(), b in b.columns()) assert_arr1_eq_eps(&a, &b, epsilon));
}

pub fn assert_arr2_eq<Sa, Sb>(
    a: &ndarray::ArrayBase<Sa, ndarray::Ix2>,
    b: &ndarray::ArrayBase<Sb, ndarray::Ix2>,
) where
    Sa: ndarray::Data<Elem = f64>,
    Sb: ndarray::Data<Elem = f64>,
{
    assert_arr2_eq_eps(a, b, EPSILON);
}

/// `max |m - m'| < 1e-9 * ||m||`, zero matrices are symmetric
pub fn assert_symmetric<S>(m: &ndarray::ArrayBase<S, ndarray::Ix2>)
where
    S: ndarray::Data<Elem = f64>,
{
    let (nrows, ncols) = m.dim();
    assert_eq!(nrows, ncols);

    let norm = m.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    for i in 0..nrows {
        for j in 0..i {
            let d = (m[(i, j)] - m[(j, i)]).abs();
            assert!(
                d <= 1.0e-9 * norm,
                "asymmetric at ({}, {}): {} vs {}",
                i,
                j,
                m[(i, j)],
                m[(j, i)]
            );
        }
    }
}
