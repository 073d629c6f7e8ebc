use libm::{cos, sin};

use crate::state::{Covariance, PD, PE, PHI, PN, PSI, State, THETA, U, V, W};

pub const G: f64 = 9.80665;

/// Below this `|cos θ|` the Euler-rate denominators are clamped.
pub const GIMBAL_LOCK_EPSILON: f64 = 1e-6;

/// Low-passed IMU channels driving the motion model. They are inputs, not
/// part of the estimated state.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionInputs {
    /// body roll rate (rad/s)
    pub p: f64,
    /// body pitch rate (rad/s)
    pub q: f64,
    /// body yaw rate (rad/s)
    pub r: f64,
    /// body z specific force
    pub az: f64,
}

pub struct Derivative(pub State);

/// Shared trigonometric terms of `f` and `dfdx`.
struct Trig {
    sp: f64,
    cp: f64,
    st: f64,
    ct: f64,
    ss: f64,
    cs: f64,
    /// `cos θ` clamped away from zero, only for use as a denominator
    ct_guarded: f64,
}

impl Trig {
    fn new(state: &State) -> Self {
        let (phi, theta, psi) = (state.roll(), state.pitch(), state.yaw());
        let ct = cos(theta);
        let ct_guarded = if ct.abs() >= GIMBAL_LOCK_EPSILON {
            ct
        } else if ct.is_sign_negative() {
            -GIMBAL_LOCK_EPSILON
        } else {
            GIMBAL_LOCK_EPSILON
        };
        Self {
            sp: sin(phi),
            cp: cos(phi),
            st: sin(theta),
            ct,
            ss: sin(psi),
            cs: cos(psi),
            ct_guarded,
        }
    }

    fn tt(&self) -> f64 {
        self.st / self.ct_guarded
    }
}

/// `f(x)`: time derivative of the state.
pub fn state_derivative(state: &State, inputs: &MotionInputs) -> Derivative {
    let MotionInputs { p, q, r, az } = *inputs;
    let (u, v, w) = (state.0[U], state.0[V], state.0[W]);
    let Trig {
        sp,
        cp,
        st,
        ct,
        ss,
        cs,
        ct_guarded,
    } = Trig::new(state);
    let tt = st / ct_guarded;

    let mut x_dot = State::zeros();

    // position, body velocity rotated into NED
    x_dot.0[PN] = ct * cs * u + (sp * st * cs - cp * ss) * v + (cp * st * cs + sp * ss) * w;
    x_dot.0[PE] = ct * ss * u + (sp * st * ss + cp * cs) * v + (cp * st * ss - sp * cs) * w;
    x_dot.0[PD] = -st * u + sp * ct * v + cp * ct * w;

    // velocity, body frame
    x_dot.0[U] = r * v - q * w - G * st;
    x_dot.0[V] = p * w - r * u + G * ct * sp;
    x_dot.0[W] = q * u - p * v + G * ct * cp + az;

    // Euler rates
    x_dot.0[PHI] = p + sp * tt * q + cp * tt * r;
    x_dot.0[THETA] = cp * q - sp * r;
    x_dot.0[PSI] = (sp * q + cp * r) / ct_guarded;

    Derivative(x_dot)
}

/// `dfdx(x)`: analytic Jacobian of [`state_derivative`] with respect to the state.
pub fn state_derivative_jacobian(state: &State, inputs: &MotionInputs) -> Covariance {
    let MotionInputs { p, q, r, .. } = *inputs;
    let (u, v, w) = (state.0[U], state.0[V], state.0[W]);
    let trig = Trig::new(state);
    let tt = trig.tt();
    let Trig {
        sp,
        cp,
        st,
        ct,
        ss,
        cs,
        ct_guarded,
    } = trig;

    let mut a = Covariance::zeros();

    a[(PN, U)] = ct * cs;
    a[(PN, V)] = sp * st * cs - cp * ss;
    a[(PN, W)] = cp * st * cs + sp * ss;
    a[(PN, PHI)] = (cp * st * cs + sp * ss) * v + (-sp * st * cs + cp * ss) * w;
    a[(PN, THETA)] = -st * cs * u + sp * ct * cs * v + cp * ct * cs * w;
    a[(PN, PSI)] = -ct * ss * u + (-sp * st * ss - cp * cs) * v + (-cp * st * ss + sp * cs) * w;

    a[(PE, U)] = ct * ss;
    a[(PE, V)] = sp * st * ss + cp * cs;
    a[(PE, W)] = cp * st * ss - sp * cs;
    a[(PE, PHI)] = (cp * st * ss - sp * cs) * v + (-sp * st * ss - cp * cs) * w;
    a[(PE, THETA)] = -st * ss * u + sp * ct * ss * v + cp * ct * ss * w;
    a[(PE, PSI)] = ct * cs * u + (sp * st * cs - cp * ss) * v + (cp * st * cs + sp * ss) * w;

    a[(PD, U)] = -st;
    a[(PD, V)] = sp * ct;
    a[(PD, W)] = cp * ct;
    a[(PD, PHI)] = cp * ct * v - sp * ct * w;
    a[(PD, THETA)] = -ct * u - sp * st * v - cp * st * w;

    a[(U, V)] = r;
    a[(U, W)] = -q;
    a[(U, THETA)] = -G * ct;

    a[(V, U)] = -r;
    a[(V, W)] = p;
    a[(V, PHI)] = G * ct * cp;
    a[(V, THETA)] = -G * st * sp;

    a[(W, U)] = q;
    a[(W, V)] = -p;
    a[(W, PHI)] = -G * ct * sp;
    a[(W, THETA)] = -G * st * cp;

    let ct2 = ct_guarded * ct_guarded;
    a[(PHI, PHI)] = (cp * q - sp * r) * tt;
    a[(PHI, THETA)] = (sp * q + cp * r) / ct2;
    a[(THETA, PHI)] = -sp * q - cp * r;
    a[(PSI, PHI)] = (cp * q - sp * r) / ct_guarded;
    a[(PSI, THETA)] = (sp * q + cp * r) * st / ct2;

    a
}
