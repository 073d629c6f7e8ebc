//! Extended Kalman filter fusing IMU and motion capture samples into a
//! NED position, body velocity and Euler attitude estimate.

// only use std when feature = "std" is enabled or during testing
#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod fmt;

mod config;
mod error;
mod flight_detector;
mod low_pass;
mod measurement_model;
mod mocap_ekf;
mod motion_model;
mod sample;
mod state;
mod state_estimator;

#[cfg(test)]
mod jacobian;
#[cfg(test)]
mod tests;

pub use config::{EstimatorConfig, square_matrix_from_slice};
#[cfg(feature = "std")]
pub use config::RawEstimatorConfig;
pub use error::{ConfigError, EstimatorError};
pub use flight_detector::{FlightDetector, FlyingFlag};
pub use low_pass::LowPassFilter;
pub use measurement_model::{ImuMeasurementModel, MeasurementModel, MocapMeasurementModel};
pub use mocap_ekf::{ImuOutcome, MocapEkf};
#[cfg(feature = "std")]
pub use mocap_ekf::SharedMocapEkf;
pub use motion_model::{
    Derivative, G, GIMBAL_LOCK_EPSILON, MotionInputs, state_derivative, state_derivative_jacobian,
};
pub use sample::{Estimate, ImuSample, PoseSample, euler, nwu_to_ned};
pub use state::{Covariance, PD, PE, PHI, PN, PSI, STATE_SIZE, State, THETA, U, V, W};
pub use state_estimator::{Correction, InertialChannels, StateEstimator};
