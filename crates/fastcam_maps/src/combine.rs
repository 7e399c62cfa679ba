//! Weighted combination of per-layer saliency maps.

use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use fastcam_core::{MapShape, OutputSize, Result, SaliencyError};

use crate::resize::{resize, ResizeMode};

/// Weights given to each per-layer map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum LayerWeights {
    /// Weight 1.0 for every map.
    #[default]
    Uniform,
    /// The same positive weight for every map.
    Scalar(f32),
    /// One non-negative weight per map.
    PerLayer(Vec<f32>),
}

impl LayerWeights {
    /// Expand into one weight per map.
    ///
    /// # Errors
    ///
    /// Returns an error if a scalar weight is not positive, a list has the
    /// wrong length or a negative entry, or the weights sum to zero.
    pub fn resolve(&self, map_num: usize) -> Result<Vec<f32>> {
        let weights = match self {
            Self::Uniform => vec![1.0; map_num],
            Self::Scalar(w) => {
                if !(w.is_finite() && *w > 0.0) {
                    return Err(SaliencyError::InvalidConfig(format!(
                        "scalar layer weight must be positive, got {w}"
                    )));
                }
                vec![*w; map_num]
            }
            Self::PerLayer(list) => {
                if list.len() != map_num {
                    return Err(SaliencyError::InvalidConfig(format!(
                        "expected {map_num} layer weights, got {}",
                        list.len()
                    )));
                }
                if let Some(w) = list.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
                    return Err(SaliencyError::InvalidConfig(format!(
                        "layer weights must be non-negative, got {w}"
                    )));
                }
                list.clone()
            }
        };

        if weights.iter().sum::<f32>() <= 0.0 {
            return Err(SaliencyError::InvalidConfig(
                "layer weights sum to zero".to_string(),
            ));
        }

        Ok(weights)
    }
}

/// Configuration for [`MapCombiner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// Resolution of the combined map.
    pub output_size: OutputSize,
    /// Per-layer weights.
    pub weights: LayerWeights,
    /// Interpolation used to bring maps to `output_size`.
    pub resize_mode: ResizeMode,
    /// Square each resized map before weighting.
    ///
    /// Use when map values are signed and only their energy matters.
    pub magnitude: bool,
    /// Clamp negative values of the outputs to zero.
    pub rectify: bool,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            output_size: OutputSize::default(),
            weights: LayerWeights::Uniform,
            resize_mode: ResizeMode::Bilinear,
            magnitude: false,
            rectify: false,
        }
    }
}

impl CombinerConfig {
    /// Create a new config with the given output resolution.
    pub fn new(output_size: OutputSize) -> Self {
        Self {
            output_size,
            ..Default::default()
        }
    }

    /// Set the layer weights.
    pub fn with_weights(mut self, weights: LayerWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the interpolation mode.
    pub fn with_resize_mode(mut self, resize_mode: ResizeMode) -> Self {
        self.resize_mode = resize_mode;
        self
    }

    /// Enable or disable magnitude mode.
    pub fn with_magnitude(mut self, magnitude: bool) -> Self {
        self.magnitude = magnitude;
        self
    }

    /// Enable or disable final rectification.
    pub fn with_rectify(mut self, rectify: bool) -> Self {
        self.rectify = rectify;
        self
    }
}

/// Output of [`MapCombiner::combine`].
#[derive(Debug, Clone)]
pub struct CombinedMaps<B: Backend> {
    /// Weighted average, shape (batch, out_h, out_w).
    pub combined: Tensor<B, 3>,
    /// Individually resized maps, shape (batch, map_num, out_h, out_w).
    pub stacked: Tensor<B, 4>,
}

/// Resizes a fixed number of maps to one resolution and averages them.
#[derive(Debug, Clone)]
pub struct MapCombiner {
    output_size: OutputSize,
    weights: Vec<f32>,
    weight_sum: f32,
    resize_mode: ResizeMode,
    magnitude: bool,
    rectify: bool,
}

impl MapCombiner {
    /// Create a combiner for `map_num` maps.
    ///
    /// # Errors
    ///
    /// Returns an error if `map_num` is zero or the weights are invalid.
    pub fn new(config: &CombinerConfig, map_num: usize) -> Result<Self> {
        if map_num == 0 {
            return Err(SaliencyError::InvalidConfig(
                "at least one map is required".to_string(),
            ));
        }

        let weights = config.weights.resolve(map_num)?;
        let weight_sum = weights.iter().sum();

        Ok(Self {
            output_size: config.output_size,
            weights,
            weight_sum,
            resize_mode: config.resize_mode,
            magnitude: config.magnitude,
            rectify: config.rectify,
        })
    }

    /// Number of maps this combiner expects.
    pub fn map_num(&self) -> usize {
        self.weights.len()
    }

    /// Resolved per-map weights.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Output resolution.
    pub fn output_size(&self) -> OutputSize {
        self.output_size
    }

    /// Combine per-layer maps of shape (batch, h_i, w_i).
    ///
    /// # Errors
    ///
    /// Returns an error if the number of maps differs from
    /// [`MapCombiner::map_num`], the batch sizes disagree, or a map has an
    /// empty spatial axis.
    pub fn combine<B: Backend>(&self, maps: Vec<Tensor<B, 3>>) -> Result<CombinedMaps<B>> {
        if maps.len() != self.map_num() {
            return Err(SaliencyError::ShapeMismatch(format!(
                "expected {} maps, got {}",
                self.map_num(),
                maps.len()
            )));
        }

        let [batch, _, _] = maps[0].dims();
        let device = maps[0].device();
        let [out_h, out_w] = self.output_size.as_array();

        let mut combined = Tensor::<B, 4>::zeros([batch, 1, out_h, out_w], &device);
        let mut resized = Vec::with_capacity(maps.len());

        for (i, (map, &weight)) in maps.into_iter().zip(&self.weights).enumerate() {
            let [b, h, w] = map.dims();
            if b != batch {
                return Err(SaliencyError::ShapeMismatch(format!(
                    "map {i} has batch size {b}, expected {batch}"
                )));
            }
            if h == 0 || w == 0 {
                return Err(SaliencyError::InvalidShape {
                    expected: "non-empty (B, H, W)".to_string(),
                    got: MapShape::new(b, h, w).to_string(),
                });
            }

            let map = resize(map.reshape([b, 1, h, w]), [out_h, out_w], self.resize_mode);
            let map = if self.magnitude { map.clone() * map } else { map };

            combined = combined + map.clone() * weight;
            resized.push(map);
        }

        let combined = (combined / self.weight_sum).reshape([batch, out_h, out_w]);
        let stacked = Tensor::cat(resized, 1);

        Ok(if self.rectify {
            CombinedMaps {
                combined: relu(combined),
                stacked: relu(stacked),
            }
        } else {
            CombinedMaps { combined, stacked }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastcam_core::backend::NdArray;

    type TestBackend = NdArray;

    fn map(data: &[f32], shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats(data, &device).reshape(shape)
    }

    fn ramp(shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        let n = shape.iter().product::<usize>();
        let data: Vec<f32> = (0..n).map(|i| (i % 11) as f32 * 0.1 - 0.4).collect();
        map(&data, shape)
    }

    fn max_diff(a: Tensor<TestBackend, 3>, b: Tensor<TestBackend, 3>) -> f32 {
        (a - b).abs().max().into_scalar().elem()
    }

    fn config(h: usize, w: usize) -> CombinerConfig {
        CombinerConfig::new(OutputSize::new(h, w).unwrap())
    }

    #[test]
    fn test_single_map_identity() {
        let combiner = MapCombiner::new(
            &config(16, 16).with_weights(LayerWeights::PerLayer(vec![1.0])),
            1,
        )
        .unwrap();

        let input = ramp([2, 5, 7]);
        let out = combiner.combine(vec![input.clone()]).unwrap();

        let expected = resize(input.unsqueeze_dim::<4>(1), [16, 16], ResizeMode::Bilinear)
            .squeeze::<3>(1);
        assert_eq!(out.combined.dims(), [2, 16, 16]);
        assert!(max_diff(out.combined, expected) < 1e-6);
    }

    #[test]
    fn test_scalar_weight_matches_explicit_list() {
        let maps = vec![ramp([1, 4, 4]), ramp([1, 4, 4]), ramp([1, 4, 4])];

        let scalar = MapCombiner::new(&config(8, 8).with_weights(LayerWeights::Scalar(2.5)), 3)
            .unwrap()
            .combine(maps.clone())
            .unwrap();
        let list = MapCombiner::new(
            &config(8, 8).with_weights(LayerWeights::PerLayer(vec![2.5; 3])),
            3,
        )
        .unwrap()
        .combine(maps)
        .unwrap();

        assert!(max_diff(scalar.combined, list.combined) < 1e-6);
    }

    #[test]
    fn test_magnitude_mode_is_sign_invariant() {
        let combiner = MapCombiner::new(&config(6, 6).with_magnitude(true), 2).unwrap();
        let m = ramp([1, 3, 3]);

        let mixed = combiner.combine(vec![m.clone(), m.clone().neg()]).unwrap();
        let positive = combiner.combine(vec![m.clone(), m.clone()]).unwrap();
        let negative = combiner.combine(vec![m.clone().neg(), m.neg()]).unwrap();

        assert!(max_diff(mixed.combined.clone(), positive.combined) < 1e-6);
        assert!(max_diff(mixed.combined, negative.combined) < 1e-6);
    }

    #[test]
    fn test_weighted_average() {
        let combiner = MapCombiner::new(
            &config(2, 2).with_weights(LayerWeights::PerLayer(vec![1.0, 3.0])),
            2,
        )
        .unwrap();

        let out = combiner
            .combine(vec![map(&[0.0; 4], [1, 2, 2]), map(&[4.0; 4], [1, 2, 2])])
            .unwrap();

        let values = out.combined.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 3.0).abs() < 1e-6));
    }

    #[test]
    fn test_stacked_shape_with_mixed_resolutions() {
        let combiner = MapCombiner::new(&config(12, 10), 3).unwrap();
        let out = combiner
            .combine(vec![ramp([2, 3, 3]), ramp([2, 6, 5]), ramp([2, 12, 10])])
            .unwrap();

        assert_eq!(out.combined.dims(), [2, 12, 10]);
        assert_eq!(out.stacked.dims(), [2, 3, 12, 10]);
    }

    #[test]
    fn test_rectify_clamps_outputs() {
        let combiner = MapCombiner::new(&config(4, 4).with_rectify(true), 1).unwrap();
        let out = combiner.combine(vec![map(&[-1.0; 4], [1, 2, 2])]).unwrap();

        let min: f32 = out.combined.min().into_scalar().elem();
        let stacked_min: f32 = out.stacked.min().into_scalar().elem();
        assert!(min >= 0.0);
        assert!(stacked_min >= 0.0);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let bad = [
            LayerWeights::PerLayer(vec![1.0, 2.0]),
            LayerWeights::PerLayer(vec![1.0, -1.0, 1.0]),
            LayerWeights::PerLayer(vec![0.0; 3]),
            LayerWeights::Scalar(0.0),
            LayerWeights::Scalar(-2.0),
        ];
        for weights in bad {
            let result = MapCombiner::new(&config(4, 4).with_weights(weights.clone()), 3);
            assert!(result.is_err(), "{weights:?} accepted");
        }

        assert!(MapCombiner::new(&config(4, 4), 0).is_err());
    }

    #[test]
    fn test_wrong_map_count_rejected() {
        let combiner = MapCombiner::new(&config(4, 4), 2).unwrap();
        assert!(combiner.combine(vec![ramp([1, 2, 2])]).is_err());
    }

    #[test]
    fn test_batch_mismatch_rejected() {
        let combiner = MapCombiner::new(&config(4, 4), 2).unwrap();
        assert!(combiner
            .combine(vec![ramp([1, 2, 2]), ramp([2, 2, 2])])
            .is_err());
    }

    #[test]
    fn test_empty_spatial_axis_rejected() {
        let device = Default::default();
        let combiner = MapCombiner::new(&config(4, 4), 1).unwrap();

        for shape in [[1, 0, 3], [1, 3, 0]] {
            let err = combiner
                .combine(vec![Tensor::<TestBackend, 3>::zeros(shape, &device)])
                .unwrap_err();
            assert_eq!(err.kind(), fastcam_core::ErrorKind::Shape);
        }
    }

    #[test]
    fn test_config_serde() {
        let config = config(32, 32)
            .with_weights(LayerWeights::PerLayer(vec![1.0, 2.0]))
            .with_magnitude(true);
        let json = serde_json::to_string(&config).unwrap();
        let decoded: CombinerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);

        let partial: CombinerConfig = serde_json::from_str(r#"{"rectify": true}"#).unwrap();
        assert!(partial.rectify);
        assert_eq!(partial.output_size, OutputSize::default());
    }
}
