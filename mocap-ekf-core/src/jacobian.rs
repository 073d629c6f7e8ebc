use nalgebra::{SMatrix, SVector};

/// Numeric Jacobian `J[i, j] = ∂f_i/∂x_j` at `x` by central differences,
/// used to check the hand-derived model Jacobians.
pub fn central_difference_jacobian<const M: usize, const N: usize, F>(
    x: &SVector<f64, N>,
    f: F,
) -> SMatrix<f64, M, N>
where
    F: Fn(&SVector<f64, N>) -> SVector<f64, M>,
{
    // cbrt(f64::EPSILON)
    const EPS_CBRT: f64 = 6.055_454_452_393_343e-6;

    let mut j = SMatrix::<f64, M, N>::zeros();
    let mut xp = *x;
    let mut xm = *x;

    for col in 0..N {
        let xi = x[col];
        let h = EPS_CBRT * xi.abs().max(1.0);

        xp[col] = xi + h;
        xm[col] = xi - h;

        let column = (f(&xp) - f(&xm)) / (2.0 * h);
        j.set_column(col, &column);

        xp[col] = xi;
        xm[col] = xi;
    }

    j
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Matrix2, Vector2};

    use super::*;

    #[test]
    fn linear_map_is_recovered() {
        let m = Matrix2::new(1.0, -2.0, 0.5, 3.0);
        let j = central_difference_jacobian(&Vector2::new(0.3, -7.0), |x| m * x);
        assert_relative_eq!(j, m, epsilon = 1e-8);
    }
}
