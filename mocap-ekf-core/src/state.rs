use nalgebra::{SMatrix, SVector, Vector3};

pub const PN: usize = 0;
pub const PE: usize = 1;
pub const PD: usize = 2;
pub const U: usize = 3;
pub const V: usize = 4;
pub const W: usize = 5;
pub const PHI: usize = 6;
pub const THETA: usize = 7;
pub const PSI: usize = 8;

pub const STATE_SIZE: usize = 9;

pub type Covariance = SMatrix<f64, STATE_SIZE, STATE_SIZE>;

/// NED position, body-frame velocity and 3-2-1 Euler attitude.
///
/// Angles are kept as-is, no wrapping into `(-π, π]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct State(pub SVector<f64, STATE_SIZE>);

impl State {
    pub const SIZE: usize = STATE_SIZE;

    pub fn new(
        position_ned: &Vector3<f64>,
        velocity_body: &Vector3<f64>,
        euler: &Vector3<f64>,
    ) -> Self {
        let mut x = SVector::<f64, STATE_SIZE>::zeros();
        x.fixed_view_mut::<3, 1>(PN, 0).copy_from(position_ned);
        x.fixed_view_mut::<3, 1>(U, 0).copy_from(velocity_body);
        x.fixed_view_mut::<3, 1>(PHI, 0).copy_from(euler);
        Self(x)
    }

    pub fn zeros() -> Self {
        Self(SVector::zeros())
    }

    pub fn position(&self) -> Vector3<f64> {
        self.0.fixed_view::<3, 1>(PN, 0).into()
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.0.fixed_view::<3, 1>(U, 0).into()
    }

    /// `[roll, pitch, yaw]`
    pub fn euler(&self) -> Vector3<f64> {
        self.0.fixed_view::<3, 1>(PHI, 0).into()
    }

    pub fn roll(&self) -> f64 {
        self.0[PHI]
    }

    pub fn pitch(&self) -> f64 {
        self.0[THETA]
    }

    pub fn yaw(&self) -> f64 {
        self.0[PSI]
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}
