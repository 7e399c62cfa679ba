//! Map normalization.
//!
//! Normalizers rescale each batch item of a raw `(B, H, W)` map into a
//! bounded range so maps from different layers can be averaged.

use std::f32::consts::SQRT_2;

use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};
use statrs::function::gamma::checked_gamma_lr;

use fastcam_core::tolerance::{GAMMA_EPSILON, GAMMA_SHAPE_FLOOR, RANGE_EPSILON, STD_EPSILON};
use fastcam_core::{MapShape, Result, SaliencyError};

/// Per-item normalization of saliency maps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Normalizer {
    /// Gamma CDF of the values under a method-of-moments gamma fit.
    ///
    /// Negative values are treated as zero.
    Gamma,
    /// Standard normal CDF of the z-scored values.
    Gauss {
        /// Use this mean instead of the per-item mean.
        const_mean: Option<f32>,
        /// Use this standard deviation instead of the per-item one.
        const_std: Option<f32>,
    },
    /// Min–max rescale.
    Range,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::gauss()
    }
}

impl Normalizer {
    /// Gauss normalization with statistics taken from each map.
    pub const fn gauss() -> Self {
        Self::Gauss {
            const_mean: None,
            const_std: None,
        }
    }

    /// Closed range every normalized value falls into.
    pub const fn output_range(&self) -> (f32, f32) {
        match self {
            Self::Gamma | Self::Gauss { .. } | Self::Range => (0.0, 1.0),
        }
    }

    /// Normalize each batch item of `map`.
    ///
    /// # Arguments
    ///
    /// * `map` - Raw map of shape (batch, height, width)
    ///
    /// # Returns
    ///
    /// Map of the same shape with values in [`Normalizer::output_range`].
    ///
    /// # Errors
    ///
    /// Returns an error if the map is empty or its data cannot be read.
    pub fn normalize<B: Backend>(&self, map: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let shape = MapShape::from(map.dims());
        let [batch, height, width] = shape.as_array();
        if batch == 0 || height == 0 || width == 0 {
            return Err(SaliencyError::InvalidShape {
                expected: "non-empty (B, H, W)".to_string(),
                got: shape.to_string(),
            });
        }

        let flat = map.reshape([batch, height * width]);
        let normalized = match *self {
            Self::Gamma => gamma_cdf(flat)?,
            Self::Gauss {
                const_mean,
                const_std,
            } => gauss_cdf(flat, const_mean, const_std),
            Self::Range => min_max(flat),
        };

        Ok(normalized.reshape([batch, height, width]))
    }
}

fn gauss_cdf<B: Backend>(
    flat: Tensor<B, 2>,
    const_mean: Option<f32>,
    const_std: Option<f32>,
) -> Tensor<B, 2> {
    let [_, n] = flat.dims();
    let mean = flat.clone().mean_dim(1);

    let std = match const_std {
        Some(std) => mean.zeros_like() + std.max(STD_EPSILON),
        None => {
            let centered = flat.clone() - mean.clone();
            let dof = n.saturating_sub(1).max(1) as f32;
            (centered.clone() * centered)
                .sum_dim(1)
                .div_scalar(dof)
                .sqrt()
                .clamp_min(STD_EPSILON)
        }
    };

    let centered = match const_mean {
        Some(m) => flat - m,
        None => flat - mean,
    };

    let z = centered / std;
    ((z / SQRT_2).erf() + 1.0) * 0.5
}

fn min_max<B: Backend>(flat: Tensor<B, 2>) -> Tensor<B, 2> {
    let min = flat.clone().min_dim(1);
    let max = flat.clone().max_dim(1);
    let range = (max - min.clone()).clamp_min(RANGE_EPSILON);

    (flat - min) / range
}

fn gamma_cdf<B: Backend>(flat: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
    let [batch, n] = flat.dims();
    let device = flat.device();

    let values = flat
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| SaliencyError::InvalidTensor(format!("{e:?}")))?;

    let mut normalized = Vec::with_capacity(values.len());
    for row in values.chunks(n) {
        normalized.extend(gamma_cdf_row(row));
    }

    Ok(Tensor::from_data(
        TensorData::new(normalized, [batch, n]),
        &device,
    ))
}

/// Fit a gamma distribution to `row` and evaluate its CDF at every value.
///
/// Shape uses the closed-form approximation of the maximum likelihood
/// estimate from `s = ln(mean) - mean(ln x)`.
fn gamma_cdf_row(row: &[f32]) -> Vec<f32> {
    let values: Vec<f64> = row
        .iter()
        .map(|&v| {
            let v = if v.is_finite() { f64::from(v).max(0.0) } else { 0.0 };
            v + GAMMA_EPSILON
        })
        .collect();

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let mean_log = values.iter().map(|v| v.ln()).sum::<f64>() / n;

    let s = mean.ln() - mean_log;
    if s < GAMMA_SHAPE_FLOOR {
        tracing::debug!("Near-constant map (s = {:.3e}), gamma shape capped", s);
    }
    let s = s.max(GAMMA_SHAPE_FLOOR);

    let shape = (3.0 - s + ((s - 3.0).powi(2) + 24.0 * s).sqrt()) / (12.0 * s);
    let scale = mean / shape;

    values
        .iter()
        .map(|&v| checked_gamma_lr(shape, v / scale).unwrap_or(0.0).clamp(0.0, 1.0) as f32)
        .collect()
}
