//! Plain SMOE saliency: per-layer activation statistics, no gradients.

use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use fastcam_core::{ActivationShape, OutputSize, Result, SaliencyError};
use fastcam_maps::{
    resize, ChannelStatistic, CombinedMaps, CombinerConfig, MapCombiner, Normalizer, ResizeMode,
};

use crate::classifier::{validate_layers, HookedClassifier};
use crate::hooks::CaptureHook;

/// Configuration for [`SaliencyMap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaliencyMapConfig {
    /// Observed layers, in combination order.
    pub layers: Vec<String>,
    /// Channel statistic applied to each layer.
    pub statistic: ChannelStatistic,
    /// Normalizer applied to each layer map.
    pub normalizer: Normalizer,
    /// Combination of the layer maps.
    pub combiner: CombinerConfig,
    /// Keep the autodiff graph through the forward pass.
    pub track_gradients: bool,
}

impl Default for SaliencyMapConfig {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            statistic: ChannelStatistic::default(),
            normalizer: Normalizer::default(),
            combiner: CombinerConfig::default(),
            track_gradients: false,
        }
    }
}

impl SaliencyMapConfig {
    /// Create a config observing `layers` with default settings.
    pub fn new<S: Into<String>>(layers: impl IntoIterator<Item = S>) -> Self {
        Self {
            layers: layers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the channel statistic.
    pub fn with_statistic(mut self, statistic: ChannelStatistic) -> Self {
        self.statistic = statistic;
        self
    }

    /// Set the normalizer.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Set the combiner configuration.
    pub fn with_combiner(mut self, combiner: CombinerConfig) -> Self {
        self.combiner = combiner;
        self
    }

    /// Set the output resolution.
    pub fn with_output_size(mut self, output_size: OutputSize) -> Self {
        self.combiner.output_size = output_size;
        self
    }

    /// Keep or drop the autodiff graph.
    pub fn with_gradient_tracking(mut self, track_gradients: bool) -> Self {
        self.track_gradients = track_gradients;
        self
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SaliencyError::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SaliencyError::SerializationError(e.to_string()))
    }
}

/// Result of [`SaliencyMap::compute`].
#[derive(Debug, Clone)]
pub struct SaliencyOutput<B: Backend> {
    /// Combined map of shape (batch, out_h, out_w).
    pub combined: Tensor<B, 3>,
    /// Resized layer maps of shape (batch, layers, out_h, out_w).
    pub layer_maps: Tensor<B, 4>,
    /// Classifier logits of shape (batch, num_classes).
    pub logits: Tensor<B, 2>,
}

/// Saliency from forward activations only.
///
/// Owns the classifier while its hooks are registered; use
/// [`SaliencyMap::into_model`] to get it back.
pub struct SaliencyMap<B: Backend, M: HookedClassifier<B>> {
    model: M,
    config: SaliencyMapConfig,
    combiner: MapCombiner,
    hooks: Vec<CaptureHook<B>>,
}

impl<B: Backend, M: HookedClassifier<B>> SaliencyMap<B, M> {
    /// Register one forward hook per configured layer.
    ///
    /// # Errors
    ///
    /// Returns an error if no layer is configured, a layer is unknown to
    /// the classifier, or the combiner configuration is invalid.
    pub fn new(model: M, config: SaliencyMapConfig) -> Result<Self> {
        validate_layers(&model, &config.layers)?;
        let combiner = MapCombiner::new(&config.combiner, config.layers.len())?;

        let hooks = config
            .layers
            .iter()
            .map(|layer| model.hooks().register_forward(layer))
            .collect();

        tracing::info!(
            "Saliency map over {} layer(s) {:?} at {}",
            config.layers.len(),
            config.layers,
            combiner.output_size()
        );

        Ok(Self {
            model,
            config,
            combiner,
            hooks,
        })
    }

    /// Compute the saliency of a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if a layer produced no activation or the captured
    /// shapes are inconsistent.
    pub fn compute(&self, input: Tensor<B, 4>) -> Result<SaliencyOutput<B>> {
        let [batch, _, _, _] = input.dims();
        let input = if self.config.track_gradients {
            input
        } else {
            input.detach()
        };

        let output = self.model.forward(input);

        let mut maps = Vec::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            let activations = hook.latest().ok_or_else(|| {
                SaliencyError::Precondition(format!(
                    "no activation captured for layer '{}'",
                    hook.layer()
                ))
            })?;
            let activations = if self.config.track_gradients {
                activations
            } else {
                activations.detach()
            };

            let shape = ActivationShape::from(activations.dims());
            if shape.batch() != batch {
                return Err(SaliencyError::ShapeMismatch(format!(
                    "layer '{}' produced {} for a batch of {}",
                    hook.layer(),
                    shape,
                    batch
                )));
            }
            tracing::debug!("Layer '{}' activations {}", hook.layer(), shape);

            // Entropy of a truncated normal is fitted to the raw activations.
            let activations = if self.config.statistic.expects_rectified() {
                relu(activations)
            } else {
                activations
            };
            warn_if_silent(hook.layer(), &activations);
            let map = self.config.statistic.estimate(activations)?;
            maps.push(self.config.normalizer.normalize(map)?);
        }

        let CombinedMaps { combined, stacked } = self.combiner.combine(maps)?;
        let combined = match output.attention {
            Some(attention) => gate(combined, attention, self.combiner.output_size())?,
            None => combined,
        };

        Ok(SaliencyOutput {
            combined,
            layer_maps: stacked,
            logits: output.logits,
        })
    }

    /// The observed classifier.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Active configuration.
    pub fn config(&self) -> &SaliencyMapConfig {
        &self.config
    }

    /// Release the hooks and return the classifier.
    pub fn into_model(self) -> M {
        let Self { model, hooks, .. } = self;
        drop(hooks);
        model
    }
}

/// Multiply `combined` by the classifier's attention map.
fn gate<B: Backend>(
    combined: Tensor<B, 3>,
    attention: Tensor<B, 3>,
    size: OutputSize,
) -> Result<Tensor<B, 3>> {
    let [batch, _, _] = combined.dims();
    let [b, h, w] = attention.dims();
    if b != batch {
        return Err(SaliencyError::ShapeMismatch(format!(
            "attention batch {b} differs from saliency batch {batch}"
        )));
    }

    let attention = resize(
        attention.reshape([b, 1, h, w]),
        size.as_array(),
        ResizeMode::Bilinear,
    )
    .reshape([b, size.height(), size.width()]);

    Ok(combined * attention)
}

/// Warn when a rectified layer carries no signal at all.
pub(crate) fn warn_if_silent<B: Backend, const D: usize>(layer: &str, x: &Tensor<B, D>) {
    let peak: f32 = x.clone().abs().max().into_scalar().elem();
    if peak == 0.0 {
        tracing::warn!("Layer '{}' is all zeros; its map is uninformative", layer);
    }
}
