use crate::sample::ImuSample;

/// One-shot "now flying" signal, carries the timestamp of the sample that
/// triggered it.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlyingFlag {
    pub timestamp_s: f64,
}

/// Take-off gate. `Flying` is terminal.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub enum FlightDetector {
    NotFlying { acceleration_threshold: f64 },
    Flying { since_s: f64 },
}

impl FlightDetector {
    pub fn new(acceleration_threshold: f64) -> Self {
        Self::NotFlying {
            acceleration_threshold,
        }
    }

    /// Returns the flag on the sample that causes the transition, and never
    /// again after that.
    pub fn update(&mut self, sample: &ImuSample) -> Option<FlyingFlag> {
        match self {
            Self::NotFlying {
                acceleration_threshold,
            } => {
                let az = sample.linear_acceleration.z;
                if az.abs() > *acceleration_threshold {
                    log_warn!("[{}] now flying, a_z = {}", sample.timestamp_s, az);
                    *self = Self::Flying {
                        since_s: sample.timestamp_s,
                    };
                    Some(FlyingFlag {
                        timestamp_s: sample.timestamp_s,
                    })
                } else {
                    None
                }
            }
            Self::Flying { .. } => None,
        }
    }

    pub fn is_flying(&self) -> bool {
        matches!(self, Self::Flying { .. })
    }

    pub fn flying_since_s(&self) -> Option<f64> {
        match self {
            Self::Flying { since_s } => Some(*since_s),
            Self::NotFlying { .. } => None,
        }
    }
}
