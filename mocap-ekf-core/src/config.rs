use nalgebra::{SMatrix, SVector};

use crate::{
    error::ConfigError,
    state::{Covariance, State},
};

pub const DEFAULT_INNER_LOOP_RATE_HZ: f64 = 400.0;
pub const DEFAULT_PUBLISH_RATE_HZ: f64 = 400.0;
pub const DEFAULT_ALPHA: f64 = 0.2;
/// |a_z| above this (IMU native units) means the vehicle has taken off
pub const DEFAULT_FLIGHT_ACCELERATION_THRESHOLD: f64 = 11.0;

/// Filter tuning, fixed for the lifetime of the estimator.
///
/// Matrix shapes are enforced by the types; [`EstimatorConfig::validate`]
/// checks the remaining scalar constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    pub inner_loop_rate_hz: f64,
    pub publish_rate_hz: f64,
    pub alpha: f64,
    pub flight_acceleration_threshold: f64,
    pub x0: State,
    pub p0: Covariance,
    pub q: Covariance,
    pub r_imu: SMatrix<f64, 3, 3>,
    pub r_mocap: SMatrix<f64, 6, 6>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            inner_loop_rate_hz: DEFAULT_INNER_LOOP_RATE_HZ,
            publish_rate_hz: DEFAULT_PUBLISH_RATE_HZ,
            alpha: DEFAULT_ALPHA,
            flight_acceleration_threshold: DEFAULT_FLIGHT_ACCELERATION_THRESHOLD,
            x0: State::zeros(),
            p0: Covariance::from_diagonal(&SVector::from_column_slice(&[
                0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.05, 0.05, 0.05,
            ])),
            q: Covariance::from_diagonal(&SVector::from_column_slice(&[
                0.01, 0.01, 0.01, 0.1, 0.1, 0.1, 0.01, 0.01, 0.01,
            ])),
            r_imu: SMatrix::<f64, 3, 3>::identity() * 0.01,
            r_mocap: SMatrix::<f64, 6, 6>::from_diagonal(&SVector::from_column_slice(&[
                0.001, 0.001, 0.001, 0.01, 0.01, 0.01,
            ])),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ConfigError::InvalidAlpha { alpha: self.alpha });
        }
        check_rate("inner_loop_rate", self.inner_loop_rate_hz)?;
        check_rate("publish_rate", self.publish_rate_hz)?;
        if !(self.flight_acceleration_threshold.is_finite()
            && self.flight_acceleration_threshold > 0.0)
        {
            return Err(ConfigError::InvalidThreshold {
                threshold: self.flight_acceleration_threshold,
            });
        }
        check_finite("x0", self.x0.0.as_slice())?;
        check_finite("P0", self.p0.as_slice())?;
        check_finite("Q0", self.q.as_slice())?;
        check_finite("R_IMU", self.r_imu.as_slice())?;
        check_finite("R_Mocap", self.r_mocap.as_slice())?;
        check_symmetric("P0", &self.p0)?;
        check_symmetric("Q0", &self.q)?;
        check_symmetric("R_IMU", &self.r_imu)?;
        check_symmetric("R_Mocap", &self.r_mocap)?;
        Ok(())
    }

    pub fn predict_period_s(&self) -> f64 {
        1.0 / self.inner_loop_rate_hz
    }

    pub fn publish_period_s(&self) -> f64 {
        1.0 / self.publish_rate_hz
    }
}

fn check_rate(name: &'static str, hz: f64) -> Result<(), ConfigError> {
    if hz.is_finite() && hz > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate { name, hz })
    }
}

fn check_finite(name: &'static str, values: &[f64]) -> Result<(), ConfigError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { name })
    }
}

/// Relative to the largest entry, so hand-typed decimals still pass.
fn check_symmetric<const N: usize>(
    name: &'static str,
    m: &SMatrix<f64, N, N>,
) -> Result<(), ConfigError> {
    let tolerance = 1e-9 * m.amax().max(1.0);
    if (m - m.transpose()).amax() <= tolerance {
        Ok(())
    } else {
        Err(ConfigError::NotSymmetric { name })
    }
}

/// Builds an `N×N` matrix from either `N·N` row-major entries or an
/// `N`-entry diagonal.
pub fn square_matrix_from_slice<const N: usize>(
    name: &'static str,
    values: &[f64],
) -> Result<SMatrix<f64, N, N>, ConfigError> {
    check_finite(name, values)?;
    if values.len() == N * N {
        Ok(SMatrix::from_row_slice(values))
    } else if values.len() == N {
        Ok(SMatrix::from_diagonal(&SVector::from_column_slice(values)))
    } else {
        Err(ConfigError::DimensionMismatch {
            name,
            expected: N * N,
            actual: values.len(),
        })
    }
}

#[cfg(feature = "std")]
pub use raw::RawEstimatorConfig;

#[cfg(feature = "std")]
mod raw {
    use nalgebra::{SMatrix, SVector};
    use serde::{Deserialize, Serialize};

    use super::*;

    fn default_inner_loop_rate() -> f64 {
        DEFAULT_INNER_LOOP_RATE_HZ
    }

    fn default_publish_rate() -> f64 {
        DEFAULT_PUBLISH_RATE_HZ
    }

    fn default_alpha() -> f64 {
        DEFAULT_ALPHA
    }

    fn default_flight_acceleration_threshold() -> f64 {
        DEFAULT_FLIGHT_ACCELERATION_THRESHOLD
    }

    /// Parameter-file form of [`EstimatorConfig`]: flat vectors, shapes
    /// not yet checked. Matrices are row-major, or just the diagonal.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RawEstimatorConfig {
        #[serde(default = "default_inner_loop_rate")]
        pub inner_loop_rate: f64,
        #[serde(default = "default_publish_rate")]
        pub publish_rate: f64,
        #[serde(default = "default_alpha")]
        pub alpha: f64,
        #[serde(default = "default_flight_acceleration_threshold")]
        pub flight_acceleration_threshold: f64,
        pub x0: Vec<f64>,
        #[serde(rename = "P0")]
        pub p0: Vec<f64>,
        #[serde(rename = "Q0")]
        pub q0: Vec<f64>,
        #[serde(rename = "R_IMU")]
        pub r_imu: Vec<f64>,
        #[serde(rename = "R_Mocap")]
        pub r_mocap: Vec<f64>,
    }

    impl RawEstimatorConfig {
        pub fn try_into_config(&self) -> Result<EstimatorConfig, ConfigError> {
            if self.x0.len() != State::SIZE {
                return Err(ConfigError::DimensionMismatch {
                    name: "x0",
                    expected: State::SIZE,
                    actual: self.x0.len(),
                });
            }
            let config = EstimatorConfig {
                inner_loop_rate_hz: self.inner_loop_rate,
                publish_rate_hz: self.publish_rate,
                alpha: self.alpha,
                flight_acceleration_threshold: self.flight_acceleration_threshold,
                x0: State(SVector::from_column_slice(&self.x0)),
                p0: square_matrix_from_slice("P0", &self.p0)?,
                q: square_matrix_from_slice("Q0", &self.q0)?,
                r_imu: square_matrix_from_slice("R_IMU", &self.r_imu)?,
                r_mocap: square_matrix_from_slice("R_Mocap", &self.r_mocap)?,
            };
            config.validate()?;
            Ok(config)
        }
    }

    impl From<&EstimatorConfig> for RawEstimatorConfig {
        fn from(config: &EstimatorConfig) -> Self {
            Self {
                inner_loop_rate: config.inner_loop_rate_hz,
                publish_rate: config.publish_rate_hz,
                alpha: config.alpha,
                flight_acceleration_threshold: config.flight_acceleration_threshold,
                x0: config.x0.0.iter().copied().collect(),
                p0: flatten(&config.p0),
                q0: flatten(&config.q),
                r_imu: flatten(&config.r_imu),
                r_mocap: flatten(&config.r_mocap),
            }
        }
    }

    /// Diagonal matrices are written as their diagonal only.
    fn flatten<const N: usize>(m: &SMatrix<f64, N, N>) -> Vec<f64> {
        let is_diagonal = (0..N).all(|r| (0..N).all(|c| r == c || m[(r, c)] == 0.0));
        if is_diagonal {
            m.diagonal().iter().copied().collect()
        } else {
            m.transpose().iter().copied().collect()
        }
    }
}
