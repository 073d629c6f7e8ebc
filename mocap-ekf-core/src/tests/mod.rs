use core::fmt::{Display, Write};

#[cfg(feature = "log")]
use log::LevelFilter;
use nalgebra::SMatrix;

pub fn init_logger() {
    #[cfg(feature = "log")]
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .filter(Some("mocap_ekf_core"), LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

/// `[a b; c d]`, pasteable into MATLAB when a matrix assertion fails.
pub fn to_matlab<T: Display, const R: usize, const C: usize>(m: &SMatrix<T, R, C>) -> String {
    let mut s = String::with_capacity(R * C * 8);
    s.push('[');
    for r in 0..R {
        for c in 0..C {
            let _ = write!(&mut s, "{}", m[(r, c)]);
            if c < C - 1 {
                s.push(' ');
            }
        }
        if r < R - 1 {
            s.push_str("; ");
        }
    }
    s.push(']');
    s
}

/// Covariances must stay symmetric to rounding after every step.
pub fn assert_symmetric<const N: usize>(p: &SMatrix<f64, N, N>) {
    let asymmetry = (p - p.transpose()).amax();
    assert!(asymmetry < 1e-12, "not symmetric by {}: {}", asymmetry, to_matlab(p));
}

#[test]
fn to_matlab_formats_rows() {
    let m = nalgebra::Matrix2::new(1.0, 2.5, -3.0, 4.0);
    assert_eq!(to_matlab(&m), "[1 2.5; -3 4]");
}

#[test]
#[should_panic(expected = "not symmetric")]
fn assert_symmetric_catches_skew() {
    assert_symmetric(&nalgebra::Matrix2::new(1.0, 0.5, 0.4, 1.0));
}
