use nalgebra::{SMatrix, SVector};

use crate::{
    sample::{ImuSample, PoseSample, euler},
    state::{PD, PE, PHI, PN, PSI, STATE_SIZE, State, THETA},
};

/// Linear observation `y = C·x` of the state.
pub trait MeasurementModel<const M: usize> {
    type Sample;

    /// measurement vector extracted from a raw sample
    fn measurement(sample: &Self::Sample) -> SVector<f64, M>;

    /// observation matrix `C`
    fn jacobian() -> SMatrix<f64, M, STATE_SIZE>;

    /// measurement predicted from the state, `C·x`
    fn expected(state: &State) -> SVector<f64, M> {
        Self::jacobian() * state.0
    }
}

/// Direct attitude correction from the IMU's own orientation estimate.
pub struct ImuMeasurementModel;

impl MeasurementModel<3> for ImuMeasurementModel {
    type Sample = ImuSample;

    fn measurement(sample: &ImuSample) -> SVector<f64, 3> {
        euler(&sample.orientation)
    }

    fn jacobian() -> SMatrix<f64, 3, STATE_SIZE> {
        let mut c = SMatrix::zeros();
        c[(0, PHI)] = 1.0;
        c[(1, THETA)] = 1.0;
        c[(2, PSI)] = 1.0;
        c
    }
}

/// Mocap pose correction. Position and yaw only: rows 3 and 4 (roll, pitch)
/// are left zero so mocap never corrects tilt.
pub struct MocapMeasurementModel;

impl MeasurementModel<6> for MocapMeasurementModel {
    type Sample = PoseSample;

    fn measurement(sample: &PoseSample) -> SVector<f64, 6> {
        let mut y = SVector::<f64, 6>::zeros();
        y.fixed_view_mut::<3, 1>(0, 0)
            .copy_from(&sample.position_ned());
        y.fixed_view_mut::<3, 1>(3, 0).copy_from(&sample.euler_ned());
        y
    }

    fn jacobian() -> SMatrix<f64, 6, STATE_SIZE> {
        let mut c = SMatrix::zeros();
        c[(0, PN)] = 1.0;
        c[(1, PE)] = 1.0;
        c[(2, PD)] = 1.0;
        c[(5, PSI)] = 1.0;
        c
    }
}
