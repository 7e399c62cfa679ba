//! Gradient pooling.
//!
//! A 2×2 stride-2 pool (partial windows kept at odd edges) followed by
//! nearest upsampling back to the input resolution.

use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::module::{avg_pool2d, max_pool2d};
use serde::{Deserialize, Serialize};

use fastcam_core::SaliencyError;

use crate::resize::{resize, ResizeMode};

const WINDOW: [usize; 2] = [2, 2];

/// Pooling applied to captured gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradientPooling {
    /// Average over the in-bounds window elements.
    Avg,
    /// Algebraic maximum.
    Max,
    /// Value with the largest magnitude, sign preserved.
    Magnitude,
    /// Maximum where positive values dominate the window, zero elsewhere.
    PositiveMagnitude,
}

impl GradientPooling {
    /// Pool `x` and upsample the result back to its original size.
    ///
    /// # Arguments
    ///
    /// * `x` - Tensor of shape (batch, channels, height, width)
    pub fn apply<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();

        let pooled = match self {
            Self::Avg => avg_pool(x),
            Self::Max => max_pool(x),
            Self::Magnitude => magnitude_pool(x, false),
            Self::PositiveMagnitude => magnitude_pool(x, true),
        };

        resize(pooled, [height, width], ResizeMode::Nearest)
    }
}

impl FromStr for GradientPooling {
    type Err = SaliencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "avg" | "average" => Ok(Self::Avg),
            "max" => Ok(Self::Max),
            "mag" | "magnitude" => Ok(Self::Magnitude),
            "pos_mag" | "positive_magnitude" => Ok(Self::PositiveMagnitude),
            _ => Err(SaliencyError::UnsupportedPooling(s.to_string())),
        }
    }
}

impl std::fmt::Display for GradientPooling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Avg => "avg",
            Self::Max => "max",
            Self::Magnitude => "mag",
            Self::PositiveMagnitude => "pos_mag",
        };
        f.write_str(name)
    }
}

/// Pad odd spatial axes on the far side so 2×2 windows tile the tensor.
fn pad_to_even<B: Backend>(x: Tensor<B, 4>, fill: f32) -> Tensor<B, 4> {
    let [batch, channels, height, width] = x.dims();
    let device = x.device();

    let x = if height % 2 == 1 {
        let pad = Tensor::full([batch, channels, 1, width], fill, &device);
        Tensor::cat(vec![x, pad], 2)
    } else {
        x
    };

    let height = height + height % 2;
    if width % 2 == 1 {
        let pad = Tensor::full([batch, channels, height, 1], fill, &device);
        Tensor::cat(vec![x, pad], 3)
    } else {
        x
    }
}

fn max_pool<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    max_pool2d(pad_to_even(x, f32::MIN), WINDOW, WINDOW, [0, 0], [1, 1])
}

fn avg_pool<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let ones = x.ones_like();
    let sums = avg_pool2d(pad_to_even(x, 0.0), WINDOW, WINDOW, [0, 0], true);
    let counts = avg_pool2d(pad_to_even(ones, 0.0), WINDOW, WINDOW, [0, 0], true);

    sums / counts
}

fn magnitude_pool<B: Backend>(x: Tensor<B, 4>, positive_only: bool) -> Tensor<B, 4> {
    let high = max_pool(x.clone());
    let low = max_pool(x.neg()).neg();
    let positive = (high.clone() + low.clone()).greater_equal_elem(0.0);

    if positive_only {
        high.zeros_like().mask_where(positive, high)
    } else {
        low.mask_where(positive, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastcam_core::backend::NdArray;

    type TestBackend = NdArray;

    fn input(data: &[f32], shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats(data, &device).reshape(shape)
    }

    fn values(x: Tensor<TestBackend, 4>) -> Vec<f32> {
        x.into_data().to_vec::<f32>().unwrap()
    }

    // One 2x2 window holding 1, -3, 2, 0.
    fn window() -> Tensor<TestBackend, 4> {
        input(&[1.0, -3.0, 2.0, 0.0], [1, 1, 2, 2])
    }

    #[test]
    fn test_max_pool_restores_shape() {
        let out = GradientPooling::Max.apply(window());
        assert_eq!(out.dims(), [1, 1, 2, 2]);
        assert_eq!(values(out), vec![2.0; 4]);
    }

    #[test]
    fn test_avg_pool() {
        let out = GradientPooling::Avg.apply(window());
        assert!(values(out).iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_magnitude_pool_keeps_dominant_sign() {
        let out = GradientPooling::Magnitude.apply(window());
        assert_eq!(values(out), vec![-3.0; 4]);

        let out = GradientPooling::PositiveMagnitude.apply(window());
        assert_eq!(values(out), vec![0.0; 4]);
    }

    #[test]
    fn test_magnitude_pool_positive_window() {
        let x = input(&[4.0, -1.0, 0.5, 2.0], [1, 1, 2, 2]);
        assert_eq!(values(GradientPooling::Magnitude.apply(x.clone())), vec![4.0; 4]);
        assert_eq!(values(GradientPooling::PositiveMagnitude.apply(x)), vec![4.0; 4]);
    }

    #[test]
    fn test_odd_sizes_use_partial_windows() {
        // 1x3 row: windows [1, 5] and the partial [3].
        let x = input(&[1.0, 5.0, 3.0], [1, 1, 1, 3]);

        let max = values(GradientPooling::Max.apply(x.clone()));
        assert_eq!(max, vec![5.0, 5.0, 3.0]);

        let avg = values(GradientPooling::Avg.apply(x));
        assert!((avg[0] - 3.0).abs() < 1e-6);
        assert!((avg[2] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_pooling_from_str() {
        assert_eq!("avg".parse::<GradientPooling>().unwrap(), GradientPooling::Avg);
        assert_eq!("MAX".parse::<GradientPooling>().unwrap(), GradientPooling::Max);
        assert_eq!(
            "mag".parse::<GradientPooling>().unwrap(),
            GradientPooling::Magnitude
        );
        assert!("median".parse::<GradientPooling>().is_err());
    }

    #[test]
    fn test_pooling_display_round_trip() {
        for pooling in [
            GradientPooling::Avg,
            GradientPooling::Max,
            GradientPooling::Magnitude,
            GradientPooling::PositiveMagnitude,
        ] {
            assert_eq!(pooling.to_string().parse::<GradientPooling>().unwrap(), pooling);
        }
    }
}
