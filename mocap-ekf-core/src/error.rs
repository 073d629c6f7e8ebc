use core::fmt;

/// Recoverable failure of a single predict or correction step.
///
/// Whenever one of these is returned the shared `(x, P)` pair is exactly
/// what it was before the call.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimatorError {
    /// `dt` was zero, negative or not finite
    InvalidTimeStep { dt: f64 },
    /// innovation covariance `R + C·P·Cᵀ` could not be inverted
    SingularInnovation,
    /// the step would have written NaN or Inf into the state or covariance
    NonFiniteResult,
}

impl fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimeStep { dt } => write!(f, "invalid time step: dt = {}", dt),
            Self::SingularInnovation => write!(f, "innovation covariance is singular"),
            Self::NonFiniteResult => write!(f, "step produced a non-finite state or covariance"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EstimatorError {}

/// Startup configuration rejected while building an [`crate::EstimatorConfig`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// a matrix or vector parameter has the wrong number of entries
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    /// a parameter contains NaN or Inf
    NonFinite { name: &'static str },
    /// a covariance matrix differs from its transpose
    NotSymmetric { name: &'static str },
    /// low-pass coefficient outside `[0, 1]`
    InvalidAlpha { alpha: f64 },
    /// loop rates must be positive
    InvalidRate { name: &'static str, hz: f64 },
    /// flight detection threshold must be positive
    InvalidThreshold { threshold: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "parameter `{}` has {} entries, expected {}",
                name, actual, expected
            ),
            Self::NonFinite { name } => write!(f, "parameter `{}` is not finite", name),
            Self::NotSymmetric { name } => write!(f, "covariance `{}` is not symmetric", name),
            Self::InvalidAlpha { alpha } => {
                write!(f, "alpha must be within [0, 1], got {}", alpha)
            }
            Self::InvalidRate { name, hz } => {
                write!(f, "`{}` must be a positive rate, got {} Hz", name, hz)
            }
            Self::InvalidThreshold { threshold } => write!(
                f,
                "flight detection threshold must be positive, got {}",
                threshold
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}
