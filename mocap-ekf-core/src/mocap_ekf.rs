use crate::{
    EstimatorConfig,
    error::{ConfigError, EstimatorError},
    flight_detector::{FlightDetector, FlyingFlag},
    sample::{Estimate, ImuSample, PoseSample},
    state_estimator::{Correction, StateEstimator},
};

const GROUNDED_POSE_LOG_INTERVAL_S: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuOutcome {
    /// set on the one sample that switched the filter to flying
    pub flying_flag: Option<FlyingFlag>,
    pub correction: Result<Correction, EstimatorError>,
}

/// Flight detector and estimator wired together the way the sensor
/// callbacks and the predict timer drive them.
///
/// Each entry point runs to completion on `&mut self`; see
/// [`SharedMocapEkf`] for a handle that can be shared between threads.
#[derive(Debug, Clone)]
pub struct MocapEkf {
    config: EstimatorConfig,
    detector: FlightDetector,
    estimator: StateEstimator,
    last_grounded_pose_log_s: Option<f64>,
}

impl MocapEkf {
    pub fn new(config: EstimatorConfig) -> Result<Self, ConfigError> {
        let estimator = StateEstimator::new(&config)?;
        Ok(Self {
            detector: FlightDetector::new(config.flight_acceleration_threshold),
            estimator,
            config,
            last_grounded_pose_log_s: None,
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn estimator(&self) -> &StateEstimator {
        &self.estimator
    }

    pub fn is_flying(&self) -> bool {
        self.detector.is_flying()
    }

    /// Flight detection, then (once flying) low-pass + attitude correction.
    /// The sample that triggers take-off is also used for the correction.
    pub fn handle_imu(&mut self, sample: &ImuSample) -> ImuOutcome {
        let flying_flag = self.detector.update(sample);
        if let Some(flag) = flying_flag {
            self.estimator.set_flying(flag.timestamp_s);
        }

        ImuOutcome {
            flying_flag,
            correction: self.estimator.update_imu(sample),
        }
    }

    /// Seeds the state from the pose on the ground, corrects against it in
    /// flight.
    pub fn handle_pose(&mut self, pose: &PoseSample) -> Result<Correction, EstimatorError> {
        if self.estimator.is_flying() {
            return self.estimator.update_mocap(pose);
        }

        let should_log = self
            .last_grounded_pose_log_s
            .is_none_or(|last_s| pose.timestamp_s - last_s >= GROUNDED_POSE_LOG_INTERVAL_S);
        if should_log {
            log_info!(
                "[{}] not flying but mocap received, estimate is a copy of mocap",
                pose.timestamp_s
            );
            self.last_grounded_pose_log_s = Some(pose.timestamp_s);
        }
        Ok(self.estimator.initialize_from_pose(pose))
    }

    /// Predict timer callback.
    pub fn predict_tick(&mut self, now_s: f64) -> Result<Correction, EstimatorError> {
        self.estimator.predict_to(now_s)
    }

    pub fn estimate(&self, now_s: f64) -> Estimate {
        self.estimator.estimate(now_s)
    }
}

#[cfg(feature = "std")]
pub use shared::SharedMocapEkf;

#[cfg(feature = "std")]
mod shared {
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use super::*;

    /// Cloneable handle serializing every [`MocapEkf`] entry point behind a
    /// single mutex, for callers driving the filter from several threads.
    #[derive(Debug, Clone)]
    pub struct SharedMocapEkf(Arc<Mutex<MocapEkf>>);

    impl SharedMocapEkf {
        pub fn new(ekf: MocapEkf) -> Self {
            Self(Arc::new(Mutex::new(ekf)))
        }

        // every call leaves (x, P) consistent, so a poisoned lock is still usable
        fn lock(&self) -> MutexGuard<'_, MocapEkf> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn handle_imu(&self, sample: &ImuSample) -> ImuOutcome {
            self.lock().handle_imu(sample)
        }

        pub fn handle_pose(&self, pose: &PoseSample) -> Result<Correction, EstimatorError> {
            self.lock().handle_pose(pose)
        }

        pub fn predict_tick(&self, now_s: f64) -> Result<Correction, EstimatorError> {
            self.lock().predict_tick(now_s)
        }

        pub fn estimate(&self, now_s: f64) -> Estimate {
            self.lock().estimate(now_s)
        }

        pub fn is_flying(&self) -> bool {
            self.lock().is_flying()
        }

        /// Runs `f` with the filter locked, for reads that need a
        /// consistent view of several fields.
        pub fn with<R>(&self, f: impl FnOnce(&MocapEkf) -> R) -> R {
            f(&self.lock())
        }
    }
}
