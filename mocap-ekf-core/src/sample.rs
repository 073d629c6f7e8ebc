use nalgebra::{UnitQuaternion, Vector3};

use crate::state::{Covariance, PD, PE, PHI, PN, PSI, State, THETA, U, V, W};

/// Twist covariance reported for the body rates, which are not estimated.
pub const UNESTIMATED_RATE_VARIANCE: f64 = 0.05;

pub const ESTIMATE_FRAME_ID: &str = "body_link";

/// One IMU message. Acceleration and rates are in the IMU body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    pub timestamp_s: f64,
    pub linear_acceleration: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

/// One motion capture pose, in the mocap NWU (z up) convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub timestamp_s: f64,
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl PoseSample {
    /// NWU translation converted to NED.
    pub fn position_ned(&self) -> Vector3<f64> {
        nwu_to_ned(&self.translation)
    }

    /// `[roll, pitch, yaw]` converted to NED.
    pub fn euler_ned(&self) -> Vector3<f64> {
        nwu_to_ned(&euler(&self.rotation))
    }
}

/// `[roll, pitch, yaw]` of a fixed-axis XYZ rotation.
pub fn euler(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let (roll, pitch, yaw) = q.euler_angles();
    Vector3::new(roll, pitch, yaw)
}

/// Flips the second and third components. Used for both positions and
/// Euler angles so initialization and mocap correction always agree.
pub fn nwu_to_ned(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, -v.y, -v.z)
}

/// Published odometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub timestamp_s: f64,
    pub frame_id: &'static str,
    pub position_ned: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub velocity_body: Vector3<f64>,
    pub angular_velocity_body: Vector3<f64>,
    /// diagonal of the `[pn, pe, pd, roll, pitch, yaw]` covariance
    pub pose_covariance: [f64; 6],
    /// diagonal of the `[u, v, w, p, q, r]` covariance
    pub twist_covariance: [f64; 6],
}

impl Estimate {
    pub fn new(timestamp_s: f64, x: &State, p: &Covariance, body_rates: Vector3<f64>) -> Self {
        Self {
            timestamp_s,
            frame_id: ESTIMATE_FRAME_ID,
            position_ned: x.position(),
            orientation: UnitQuaternion::from_euler_angles(x.roll(), x.pitch(), x.yaw()),
            velocity_body: x.velocity(),
            angular_velocity_body: body_rates,
            pose_covariance: [
                p[(PN, PN)],
                p[(PE, PE)],
                p[(PD, PD)],
                p[(PHI, PHI)],
                p[(THETA, THETA)],
                p[(PSI, PSI)],
            ],
            twist_covariance: [
                p[(U, U)],
                p[(V, V)],
                p[(W, W)],
                UNESTIMATED_RATE_VARIANCE,
                UNESTIMATED_RATE_VARIANCE,
                UNESTIMATED_RATE_VARIANCE,
            ],
        }
    }
}
