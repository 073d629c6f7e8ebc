use nalgebra::{SMatrix, SVector, Vector3};

use crate::{
    EstimatorConfig,
    error::{ConfigError, EstimatorError},
    low_pass::LowPassFilter,
    measurement_model::{ImuMeasurementModel, MeasurementModel, MocapMeasurementModel},
    motion_model::{MotionInputs, state_derivative, state_derivative_jacobian},
    sample::{Estimate, ImuSample, PoseSample},
    state::{Covariance, State},
};

/// Largest tolerated `|S·S⁻¹ − I|` entry before an innovation covariance
/// is treated as singular.
const INVERSE_TOLERANCE: f64 = 1e-6;

/// What a step did when it did not fail.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// predict or measurement update applied to `(x, P)`
    Applied,
    /// state overwritten from a pose while not flying
    Initialized,
    /// deliberately skipped because the filter is not in the right flight
    /// state; `(x, P)` untouched
    Gated,
}

/// Independent low-pass channels for the raw IMU readings.
#[derive(Debug, Clone)]
pub struct InertialChannels {
    p: LowPassFilter,
    q: LowPassFilter,
    r: LowPassFilter,
    ax: LowPassFilter,
    ay: LowPassFilter,
    az: LowPassFilter,
}

impl InertialChannels {
    pub fn new(alpha: f64) -> Self {
        Self {
            p: LowPassFilter::new(alpha),
            q: LowPassFilter::new(alpha),
            r: LowPassFilter::new(alpha),
            ax: LowPassFilter::new(alpha),
            ay: LowPassFilter::new(alpha),
            az: LowPassFilter::new(alpha),
        }
    }

    pub fn run(&mut self, sample: &ImuSample) {
        let gyro = &sample.angular_velocity;
        let acc = &sample.linear_acceleration;
        self.p.run(gyro.x);
        self.q.run(gyro.y);
        self.r.run(gyro.z);
        self.ax.run(acc.x);
        self.ay.run(acc.y);
        self.az.run(acc.z);
    }

    /// Inputs for the motion model, zero before the first sample.
    pub fn motion_inputs(&self) -> MotionInputs {
        MotionInputs {
            p: self.p.output().unwrap_or(0.0),
            q: self.q.output().unwrap_or(0.0),
            r: self.r.output().unwrap_or(0.0),
            az: self.az.output().unwrap_or(0.0),
        }
    }

    pub fn body_rates(&self) -> Vector3<f64> {
        let inputs = self.motion_inputs();
        Vector3::new(inputs.p, inputs.q, inputs.r)
    }

    /// Filtered specific force, `None` until the first sample.
    ///
    /// Only `z` feeds the motion model; `x` and `y` are not used by any
    /// correction.
    pub fn acceleration(&self) -> Option<Vector3<f64>> {
        Some(Vector3::new(
            self.ax.output()?,
            self.ay.output()?,
            self.az.output()?,
        ))
    }
}

/// EKF over [`State`]. Owns `(x, P)` and the IMU low-pass state; every
/// operation takes `&mut self`, so callers must serialize access.
#[derive(Debug, Clone)]
pub struct StateEstimator {
    x: State,
    p: Covariance,
    q: Covariance,
    r_imu: SMatrix<f64, 3, 3>,
    r_mocap: SMatrix<f64, 6, 6>,
    channels: InertialChannels,
    flying: bool,
    /// baseline for the next `predict_to`, set when flight begins
    previous_predict_s: Option<f64>,
    initialized_from_pose: bool,
}

impl StateEstimator {
    pub fn new(config: &EstimatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            x: config.x0,
            p: config.p0,
            q: config.q,
            r_imu: config.r_imu,
            r_mocap: config.r_mocap,
            channels: InertialChannels::new(config.alpha),
            flying: false,
            previous_predict_s: None,
            initialized_from_pose: false,
        })
    }

    pub fn state(&self) -> &State {
        &self.x
    }

    pub fn covariance(&self) -> &Covariance {
        &self.p
    }

    pub fn is_flying(&self) -> bool {
        self.flying
    }

    pub fn channels(&self) -> &InertialChannels {
        &self.channels
    }

    pub fn previous_predict_s(&self) -> Option<f64> {
        self.previous_predict_s
    }

    /// Flight has begun at `timestamp_s`; the next [`Self::predict_to`]
    /// measures `dt` from here. Ignored when already flying.
    pub fn set_flying(&mut self, timestamp_s: f64) {
        if self.flying {
            return;
        }
        self.flying = true;
        self.previous_predict_s = Some(timestamp_s);
    }

    /// Copies the pose into the state while on the ground. Velocity is
    /// zeroed and `P` is left as is.
    pub fn initialize_from_pose(&mut self, pose: &PoseSample) -> Correction {
        if self.flying {
            log_trace!("pose initialization ignored while flying");
            return Correction::Gated;
        }
        if !self.initialized_from_pose {
            log_info!("[{}] ekf initialized from mocap", pose.timestamp_s);
            self.initialized_from_pose = true;
        }
        self.x = State::new(&pose.position_ned(), &Vector3::zeros(), &pose.euler_ned());
        Correction::Initialized
    }

    /// Euler step of the state and covariance over `dt` seconds.
    pub fn predict(&mut self, dt: f64) -> Result<Correction, EstimatorError> {
        if !self.flying {
            log_trace!("predict skipped, not flying");
            return Ok(Correction::Gated);
        }
        if !(dt.is_finite() && dt > 0.0) {
            log_debug!("predict rejected, dt = {}", dt);
            return Err(EstimatorError::InvalidTimeStep { dt });
        }

        let inputs = self.channels.motion_inputs();
        let x_dot = state_derivative(&self.x, &inputs);
        let x = State(self.x.0 + x_dot.0.0 * dt);

        // x̂ was already stepped, the Jacobian is taken at the new estimate
        let a = state_derivative_jacobian(&x, &inputs);
        let mut p = self.p + (a * self.p + self.p * a.transpose() + self.q) * dt;
        p = 0.5 * (p + p.transpose()); // keep symmetric

        if !(x.is_finite() && p.iter().all(|v| v.is_finite())) {
            log_debug!("predict rejected, non-finite result at dt = {}", dt);
            return Err(EstimatorError::NonFiniteResult);
        }

        self.x = x;
        self.p = p;
        Ok(Correction::Applied)
    }

    /// [`Self::predict`] with `dt` measured from the previous successful
    /// predict (or the take-off instant).
    pub fn predict_to(&mut self, now_s: f64) -> Result<Correction, EstimatorError> {
        let Some(previous_s) = self.previous_predict_s.filter(|_| self.flying) else {
            log_trace!("predict skipped, not flying");
            return Ok(Correction::Gated);
        };
        let correction = self.predict(now_s - previous_s)?;
        self.previous_predict_s = Some(now_s);
        Ok(correction)
    }

    /// Filters the IMU channels and corrects roll, pitch and yaw against
    /// the IMU's attitude.
    pub fn update_imu(&mut self, sample: &ImuSample) -> Result<Correction, EstimatorError> {
        if !self.flying {
            log_trace!("imu update skipped, not flying");
            return Ok(Correction::Gated);
        }
        self.channels.run(sample);

        let y = ImuMeasurementModel::measurement(sample);
        let r = self.r_imu;
        self.correct::<3, ImuMeasurementModel>(&y, &r)
    }

    /// Corrects position and yaw against a mocap pose.
    pub fn update_mocap(&mut self, pose: &PoseSample) -> Result<Correction, EstimatorError> {
        if !self.flying {
            log_trace!("mocap update skipped, not flying");
            return Ok(Correction::Gated);
        }

        let y = MocapMeasurementModel::measurement(pose);
        let r = self.r_mocap;
        self.correct::<6, MocapMeasurementModel>(&y, &r)
    }

    fn correct<const M: usize, Model: MeasurementModel<M>>(
        &mut self,
        y: &SVector<f64, M>,
        r: &SMatrix<f64, M, M>,
    ) -> Result<Correction, EstimatorError> {
        let c = Model::jacobian();

        // Innovation covariance S = R + C P Cᵀ
        let s = r + c * self.p * c.transpose();
        let s_inv = s
            .try_inverse()
            .filter(|s_inv| {
                s_inv.iter().all(|v| v.is_finite())
                    && (s * s_inv - SMatrix::<f64, M, M>::identity()).amax() < INVERSE_TOLERANCE
            })
            .ok_or_else(|| {
                log_debug!("correction rejected, singular innovation covariance");
                EstimatorError::SingularInnovation
            })?;

        // Kalman gain L = P Cᵀ S⁻¹
        let l = self.p * c.transpose() * s_inv;

        let innovation = y - c * self.x.0;
        let x = State(self.x.0 + l * innovation);

        let i = Covariance::identity();
        let mut p = (i - l * c) * self.p;
        p = 0.5 * (p + p.transpose());

        if !(x.is_finite() && p.iter().all(|v| v.is_finite())) {
            log_debug!("correction rejected, non-finite result");
            return Err(EstimatorError::NonFiniteResult);
        }

        self.x = x;
        self.p = p;
        Ok(Correction::Applied)
    }

    pub fn estimate(&self, timestamp_s: f64) -> Estimate {
        Estimate::new(timestamp_s, &self.x, &self.p, self.channels.body_rates())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    use super::*;
    use crate::{
        motion_model::G,
        state::{PD, PE, PHI, PN, PSI, THETA, U},
        tests::{assert_symmetric, init_logger},
    };

    fn imu(timestamp_s: f64, euler: [f64; 3]) -> ImuSample {
        ImuSample {
            timestamp_s,
            linear_acceleration: Vector3::new(0.0, 0.0, -G),
            angular_velocity: Vector3::zeros(),
            orientation: UnitQuaternion::from_euler_angles(euler[0], euler[1], euler[2]),
        }
    }

    fn pose(timestamp_s: f64, translation: [f64; 3], euler: [f64; 3]) -> PoseSample {
        PoseSample {
            timestamp_s,
            translation: Vector3::from(translation),
            rotation: UnitQuaternion::from_euler_angles(euler[0], euler[1], euler[2]),
        }
    }

    fn flying_estimator(config: &EstimatorConfig) -> StateEstimator {
        let mut estimator = StateEstimator::new(config).unwrap();
        estimator.set_flying(0.0);
        estimator
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EstimatorConfig {
            alpha: -0.1,
            ..Default::default()
        };
        assert!(StateEstimator::new(&config).is_err());
    }

    #[test]
    fn initialization_copies_pose_in_ned() {
        init_logger();

        let config = EstimatorConfig::default();
        let mut estimator = StateEstimator::new(&config).unwrap();
        let p_before = *estimator.covariance();

        let result = estimator.initialize_from_pose(&pose(0.0, [1.0, 2.0, 3.0], [0.1, 0.2, 0.3]));

        assert_eq!(result, Correction::Initialized);
        let expected =
            SVector::<f64, 9>::from_column_slice(&[1.0, -2.0, -3.0, 0.0, 0.0, 0.0, 0.1, -0.2, -0.3]);
        assert_relative_eq!(estimator.state().0, expected, epsilon = 1e-12);
        assert_eq!(*estimator.covariance(), p_before);
    }

    #[test]
    fn initialization_reseeds_on_every_pose_until_flying() {
        let config = EstimatorConfig::default();
        let mut estimator = StateEstimator::new(&config).unwrap();
        estimator.initialize_from_pose(&pose(0.0, [1.0, 1.0, 1.0], [0.0; 3]));
        estimator.initialize_from_pose(&pose(0.1, [5.0, 6.0, 7.0], [0.0; 3]));
        assert_relative_eq!(estimator.state().position(), Vector3::new(5.0, -6.0, -7.0));

        estimator.set_flying(0.2);
        let before = *estimator.state();
        assert_eq!(
            estimator.initialize_from_pose(&pose(0.3, [9.0, 9.0, 9.0], [0.0; 3])),
            Correction::Gated
        );
        assert_eq!(*estimator.state(), before);
    }

    #[test]
    fn operations_are_gated_before_flight() {
        let config = EstimatorConfig::default();
        let mut estimator = StateEstimator::new(&config).unwrap();
        let x = *estimator.state();
        let p = *estimator.covariance();

        assert_eq!(estimator.predict(0.01), Ok(Correction::Gated));
        assert_eq!(estimator.predict_to(1.0), Ok(Correction::Gated));
        assert_eq!(estimator.update_imu(&imu(0.0, [0.1, 0.1, 0.1])), Ok(Correction::Gated));
        assert_eq!(
            estimator.update_mocap(&pose(0.0, [1.0, 1.0, 1.0], [0.0; 3])),
            Ok(Correction::Gated)
        );
        assert_eq!(*estimator.state(), x);
        assert_eq!(*estimator.covariance(), p);
        // channels are only fed once flying
        assert_eq!(estimator.channels().acceleration(), None);
    }

    #[test]
    fn predict_rejects_non_positive_dt() {
        init_logger();

        let mut estimator = flying_estimator(&EstimatorConfig::default());
        estimator.update_imu(&imu(0.0, [0.0; 3])).unwrap();
        let x = *estimator.state();
        let p = *estimator.covariance();

        for dt in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                estimator.predict(dt),
                Err(EstimatorError::InvalidTimeStep { .. })
            ));
        }
        assert_eq!(*estimator.state(), x);
        assert_eq!(*estimator.covariance(), p);
    }

    #[test]
    fn predict_to_measures_dt_from_previous_predict() {
        let config = EstimatorConfig::default();
        let mut estimator = StateEstimator::new(&config).unwrap();
        estimator.set_flying(10.0);
        assert_eq!(estimator.previous_predict_s(), Some(10.0));

        assert_eq!(estimator.predict_to(10.0025), Ok(Correction::Applied));
        assert_eq!(estimator.previous_predict_s(), Some(10.0025));

        // a clock going backwards is rejected and does not move the baseline
        assert!(estimator.predict_to(10.001).is_err());
        assert_eq!(estimator.previous_predict_s(), Some(10.0025));
    }

    #[test]
    fn set_flying_only_marks_the_first_transition() {
        let mut estimator = StateEstimator::new(&EstimatorConfig::default()).unwrap();
        estimator.set_flying(3.0);
        estimator.set_flying(4.0);
        assert_eq!(estimator.previous_predict_s(), Some(3.0));
    }

    #[test]
    fn predict_keeps_covariance_symmetric() {
        let mut config = EstimatorConfig::default();
        config.x0 = State::new(
            &Vector3::new(0.5, -1.0, -2.0),
            &Vector3::new(1.2, -0.3, 0.4),
            &Vector3::new(0.3, -0.2, 1.0),
        );
        // correlated, non-diagonal starting covariance
        for i in 0..State::SIZE {
            for j in 0..State::SIZE {
                if i != j {
                    config.p0[(i, j)] = 0.01 / (1.0 + (i + j) as f64);
                }
            }
        }
        let mut estimator = flying_estimator(&config);
        let mut sample = imu(0.0, [0.3, -0.2, 1.0]);
        sample.angular_velocity = Vector3::new(0.2, -0.1, 0.4);
        estimator.update_imu(&sample).unwrap();

        for _ in 0..400 {
            estimator.predict(1.0 / 400.0).unwrap();
            assert_symmetric(estimator.covariance());
        }
        let eigenvalues = estimator.covariance().symmetric_eigenvalues();
        assert!(eigenvalues.iter().all(|v| *v > -1e-9));
    }

    #[test]
    fn predict_integrates_motion() {
        let mut config = EstimatorConfig::default();
        config.x0 = State::new(&Vector3::zeros(), &Vector3::new(1.0, 0.0, 0.0), &Vector3::zeros());
        let mut estimator = flying_estimator(&config);
        // level, accelerometer cancels gravity
        estimator.update_imu(&imu(0.0, [0.0; 3])).unwrap();

        for _ in 0..100 {
            estimator.predict(0.01).unwrap();
        }
        assert_relative_eq!(estimator.state().position(), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(estimator.state().velocity(), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
        // uncertainty grows without measurements
        assert!(estimator.covariance()[(PN, PN)] > config.p0[(PN, PN)]);
    }

    #[test]
    fn imu_update_with_tiny_noise_snaps_attitude_to_measurement() {
        let mut config = EstimatorConfig::default();
        config.r_imu = SMatrix::<f64, 3, 3>::identity() * 1e-12;
        let mut estimator = flying_estimator(&config);

        estimator.update_imu(&imu(0.0, [0.2, -0.1, 0.7])).unwrap();

        assert_relative_eq!(
            estimator.state().euler(),
            Vector3::new(0.2, -0.1, 0.7),
            epsilon = 1e-9
        );
    }

    #[test]
    fn imu_update_moves_attitude_towards_measurement() {
        let config = EstimatorConfig::default();
        let mut estimator = flying_estimator(&config);

        estimator.update_imu(&imu(0.0, [0.2, 0.0, 0.0])).unwrap();

        let roll = estimator.state().roll();
        assert!(roll > 0.0 && roll < 0.2);
        assert!(estimator.covariance()[(PHI, PHI)] < config.p0[(PHI, PHI)]);
        // position untouched by the attitude-only update
        assert_eq!(estimator.state().position(), Vector3::zeros());
    }

    #[test]
    fn mocap_update_leaves_uncorrelated_tilt_alone() {
        let mut config = EstimatorConfig::default();
        config.x0 = State::new(
            &Vector3::new(0.0, 0.0, -1.0),
            &Vector3::new(0.5, 0.5, 0.0),
            &Vector3::new(0.05, -0.05, 0.2),
        );
        let mut estimator = flying_estimator(&config);
        let before = *estimator.state();

        let result = estimator.update_mocap(&pose(0.0, [1.0, 2.0, 3.0], [0.4, 0.5, 0.6]));
        assert_eq!(result, Ok(Correction::Applied));

        let after = estimator.state();
        assert_eq!(after.roll(), before.roll());
        assert_eq!(after.pitch(), before.pitch());
        assert_eq!(after.velocity(), before.velocity());
        for i in [PN, PE, PD, PSI] {
            assert_ne!(after.0[i], before.0[i], "component {} should be corrected", i);
        }
        assert_eq!(estimator.covariance()[(PHI, PHI)], config.p0[(PHI, PHI)]);
        assert_eq!(estimator.covariance()[(THETA, THETA)], config.p0[(THETA, THETA)]);
        assert_symmetric(estimator.covariance());
    }

    #[test]
    fn mocap_update_moves_tilt_through_predicted_correlation() {
        let mut config = EstimatorConfig::default();
        config.x0 = State::new(
            &Vector3::new(0.0, 0.0, -1.0),
            &Vector3::new(2.0, 1.0, 0.5),
            &Vector3::new(0.1, 0.2, 0.3),
        );
        let mut estimator = flying_estimator(&config);
        for _ in 0..40 {
            estimator.predict(0.0025).unwrap();
        }
        // position errors now correlate with attitude errors
        assert!(estimator.covariance()[(PN, THETA)].abs() > 1e-6);
        let before = *estimator.state();

        let result = estimator.update_mocap(&pose(0.1, [1.0, -0.5, 1.5], [0.0, 0.0, -0.3]));
        assert_eq!(result, Ok(Correction::Applied));

        // C has no roll/pitch rows, yet the gain does through P
        let after = estimator.state();
        assert!(
            (after.pitch() - before.pitch()).abs() > 1e-6,
            "pitch {} -> {}",
            before.pitch(),
            after.pitch()
        );
        assert!(after.is_finite());
        assert_symmetric(estimator.covariance());
    }

    #[test]
    fn overflowing_predict_is_rejected_without_side_effects() {
        let mut config = EstimatorConfig::default();
        config.x0 = State::new(
            &Vector3::zeros(),
            &Vector3::new(1e308, 1e308, 1e308),
            &Vector3::new(0.5, 0.5, 0.5),
        );
        let mut estimator = flying_estimator(&config);

        assert_eq!(estimator.predict(1000.0), Err(EstimatorError::NonFiniteResult));
        assert_eq!(*estimator.state(), config.x0);
        assert_eq!(*estimator.covariance(), config.p0);
        assert_eq!(estimator.previous_predict_s(), Some(0.0));
    }

    #[test]
    fn overflowing_correction_is_rejected_without_side_effects() {
        let mut config = EstimatorConfig::default();
        config.x0 = State::new(
            &Vector3::new(1.5e308, 0.0, 0.0),
            &Vector3::zeros(),
            &Vector3::zeros(),
        );
        let mut estimator = flying_estimator(&config);

        // S is well conditioned, the innovation itself overflows
        let result = estimator.update_mocap(&pose(0.0, [-1.5e308, 0.0, 0.0], [0.0; 3]));
        assert_eq!(result, Err(EstimatorError::NonFiniteResult));
        assert_eq!(*estimator.state(), config.x0);
        assert_eq!(*estimator.covariance(), config.p0);
    }

    #[test]
    fn zero_noise_fixed_point_does_not_drift() {
        let mut config = EstimatorConfig::default();
        config.q = Covariance::zeros();
        config.r_imu = SMatrix::zeros();
        config.r_mocap = SMatrix::zeros();
        config.p0 = Covariance::identity() * 0.5;
        config.x0 = State::new(
            &Vector3::new(1.0, -2.0, -3.0),
            &Vector3::zeros(),
            &Vector3::new(0.1, -0.2, -0.3),
        );
        let mut estimator = flying_estimator(&config);
        let x0 = *estimator.state();

        // measurements equal to the observed part of the state
        let matching_imu = imu(0.0, [0.1, -0.2, -0.3]);
        let matching_pose = pose(0.0, [1.0, 2.0, 3.0], [0.1, 0.2, 0.3]);

        // roll/pitch rows of the mocap model are zero, so with R = 0 the
        // innovation covariance is singular and the sample is skipped
        assert_eq!(
            estimator.update_mocap(&matching_pose),
            Err(EstimatorError::SingularInnovation)
        );
        assert_eq!(*estimator.state(), x0);
        assert_eq!(*estimator.covariance(), config.p0);

        // first attitude correction collapses the observed block of P
        assert_eq!(estimator.update_imu(&matching_imu), Ok(Correction::Applied));
        assert_relative_eq!(estimator.state().0, x0.0, epsilon = 1e-12);
        let p_fixed = *estimator.covariance();
        assert_eq!(p_fixed[(PHI, PHI)], 0.0);
        assert_eq!(p_fixed[(U, U)], 0.5);

        for _ in 0..10 {
            let _ = estimator.update_imu(&matching_imu);
            let _ = estimator.update_mocap(&matching_pose);
            assert_relative_eq!(estimator.state().0, x0.0, epsilon = 1e-12);
            assert_eq!(*estimator.covariance(), p_fixed);
        }
    }

    #[test]
    fn singular_innovation_leaves_state_untouched() {
        let mut config = EstimatorConfig::default();
        config.p0 = Covariance::zeros();
        config.r_imu = SMatrix::zeros();
        let mut estimator = flying_estimator(&config);

        assert_eq!(
            estimator.update_imu(&imu(0.0, [0.5, 0.5, 0.5])),
            Err(EstimatorError::SingularInnovation)
        );
        assert_eq!(*estimator.state(), config.x0);
        assert_eq!(*estimator.covariance(), Covariance::zeros());
    }

    #[test]
    fn estimate_reports_filtered_rates() {
        let mut estimator = flying_estimator(&EstimatorConfig::default());
        let mut sample = imu(0.0, [0.0; 3]);
        sample.angular_velocity = Vector3::new(0.1, 0.2, 0.3);
        estimator.update_imu(&sample).unwrap();

        let estimate = estimator.estimate(0.5);
        assert_eq!(estimate.angular_velocity_body, Vector3::new(0.1, 0.2, 0.3));
        assert_eq!(estimate.timestamp_s, 0.5);
        assert_eq!(estimate.twist_covariance[..3], [0.1, 0.1, 0.1]);
        assert_eq!(estimator.channels().acceleration(), Some(Vector3::new(0.0, 0.0, -G)));
    }
}
