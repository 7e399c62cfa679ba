//! Channel statistics.
//!
//! Each statistic collapses the channel axis of a `(B, C, H, W)` tensor
//! into a `(B, H, W)` map.

use std::f32::consts::{LN_2, SQRT_2};

use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use fastcam_core::tolerance::{LOG_EPSILON, STD_EPSILON, TAIL_EPSILON};
use fastcam_core::{ActivationShape, Result};

/// 1 / sqrt(2π)
const FRAC_1_SQRT_2PI: f32 = 0.398_942_3;
/// sqrt(2πe)
const SQRT_2PI_E: f32 = 4.132_731_4;

/// Statistic used to reduce the channel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatistic {
    /// SMOE scale: `(log2(mean) - mean(log2(x))) * mean`.
    ///
    /// Input must be positive. With `rectify` negative values are clamped
    /// to zero first.
    SmoeScale {
        /// Run a ReLU before the statistic.
        rectify: bool,
    },
    /// Standard deviation over channels.
    Std,
    /// Mean over channels.
    Mean,
    /// Maximum over channels.
    Max,
    /// Differential entropy of a normal truncated at zero.
    ///
    /// Fitted per location from the channel mean and standard deviation.
    /// Apply to raw activations, before any rectifier.
    TruncatedNormalEntropy,
}

impl Default for ChannelStatistic {
    fn default() -> Self {
        Self::SmoeScale { rectify: false }
    }
}

impl ChannelStatistic {
    /// SMOE scale without internal rectification.
    pub const fn smoe_scale() -> Self {
        Self::SmoeScale { rectify: false }
    }

    /// Whether the statistic expects rectified (non-negative) input.
    pub const fn expects_rectified(&self) -> bool {
        !matches!(self, Self::TruncatedNormalEntropy)
    }

    /// Reduce the channel axis of `x`.
    ///
    /// # Arguments
    ///
    /// * `x` - Tensor of shape (batch, channels, height, width)
    ///
    /// # Returns
    ///
    /// Map of shape (batch, height, width).
    ///
    /// # Errors
    ///
    /// Returns an error if any axis of `x` is empty.
    pub fn estimate<B: Backend>(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        let shape = ActivationShape::from(x.dims());
        shape.ensure_reducible()?;

        let map = match *self {
            Self::SmoeScale { rectify } => smoe_scale(if rectify { relu(x) } else { x }),
            Self::Std => channel_std(x, shape.channels()),
            Self::Mean => x.mean_dim(1),
            Self::Max => x.max_dim(1),
            Self::TruncatedNormalEntropy => truncated_normal_entropy(x, shape.channels()),
        };

        Ok(map.squeeze::<3>(1))
    }
}

fn smoe_scale<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    // avoid log(0)
    let x = x + LOG_EPSILON;

    let mean = x.clone().mean_dim(1);
    let log_mean = mean.clone().log() / LN_2;
    let mean_log = (x.log() / LN_2).mean_dim(1);

    (log_mean - mean_log) * mean
}

/// Unbiased standard deviation over channels, keeping the channel axis.
fn channel_std<B: Backend>(x: Tensor<B, 4>, channels: usize) -> Tensor<B, 4> {
    let mean = x.clone().mean_dim(1);
    let centered = x - mean;
    let dof = channels.saturating_sub(1).max(1) as f32;

    (centered.clone() * centered)
        .sum_dim(1)
        .div_scalar(dof)
        .sqrt()
}

fn truncated_normal_entropy<B: Backend>(x: Tensor<B, 4>, channels: usize) -> Tensor<B, 4> {
    let mean = x.clone().mean_dim(1);
    let std = channel_std(x, channels).clamp_min(STD_EPSILON);

    // Standardized truncation point for a = 0
    let alpha = mean.neg() / std.clone();

    let pdf = (alpha.clone() * alpha.clone() * -0.5).exp() * FRAC_1_SQRT_2PI;
    let cdf = ((alpha.clone() / SQRT_2).erf() + 1.0) * 0.5;
    let tail = cdf.neg() + (1.0 + TAIL_EPSILON);

    let t1 = (std * tail.clone() * SQRT_2PI_E).log();
    let t2 = alpha * pdf / (tail * 2.0);

    t1 + t2
}
