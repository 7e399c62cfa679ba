//! Named numeric tolerances.
//!
//! Every log and divide site in the workspace adds one of these instead of
//! a literal, so would-be NaN/Inf values become large but finite numbers.

/// Added to activations before taking logarithms (SMOE scale).
pub const LOG_EPSILON: f32 = 1e-7;

/// Added to the upper tail mass `1 - CDF` of the truncated normal.
pub const TAIL_EPSILON: f32 = 1e-7;

/// Lower bound for a standard deviation used as a divisor.
pub const STD_EPSILON: f32 = 1e-7;

/// Added to the second-order (++) alpha denominator.
pub const GPP_EPSILON: f32 = 1e-7;

/// Lower bound for a min–max range used as a divisor.
pub const RANGE_EPSILON: f32 = 1e-8;

/// Added to map values before the gamma fit takes logarithms.
pub const GAMMA_EPSILON: f64 = 1e-7;

/// Lower bound for the gamma fit statistic `ln(mean) - mean(ln x)`.
///
/// Constant maps give a statistic of zero; the floor caps the fitted shape
/// parameter near 5000.
pub const GAMMA_SHAPE_FLOOR: f64 = 1e-4;
