//! FastCAM: gradient-weighted SMOE saliency.
//!
//! Each variant weights the rectified activations of a layer by a function
//! of the gradient of the target logit, then reduces the weighted tensor
//! with a channel statistic:
//!
//! | Variant | Saliency tensor          | Gradient  |
//! |---------|--------------------------|-----------|
//! | V0      | `a`                      | none      |
//! | V1      | `sign(mean_c g) · a`     | entering  |
//! | V2      | `mean_c g · a`           | entering  |
//! | V3      | `sign(g) · a`            | leaving   |
//! | V4      | `g · a`                  | leaving   |
//! | V5      | `g`                      | leaving   |
//! | V6      | `sign(g)`                | leaving   |

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use fastcam_core::tolerance::GPP_EPSILON;
use fastcam_core::{ActivationShape, OutputSize, Result, SaliencyError};
use fastcam_maps::{
    ChannelStatistic, CombinedMaps, CombinerConfig, GradientPooling, MapCombiner, Normalizer,
};

use crate::classifier::{validate_layers, HookedClassifier};
use crate::hooks::{CaptureHook, GradientFlow};
use crate::saliency::warn_if_silent;

/// Gradient weighting scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MethodVariant {
    /// Activations only.
    V0,
    /// Activations weighted by the sign of the channel-mean gradient.
    #[default]
    V1,
    /// Activations weighted by the channel-mean gradient.
    V2,
    /// Activations weighted by the element-wise gradient sign.
    V3,
    /// Activations weighted by the element-wise gradient.
    V4,
    /// Gradient only.
    V5,
    /// Gradient sign only.
    V6,
}

impl MethodVariant {
    /// All variants, in order.
    pub const ALL: [Self; 7] = [
        Self::V0,
        Self::V1,
        Self::V2,
        Self::V3,
        Self::V4,
        Self::V5,
        Self::V6,
    ];

    /// Whether forward activations are read.
    pub const fn uses_activations(self) -> bool {
        !matches!(self, Self::V5)
    }

    /// Whether gradients are read.
    pub const fn uses_gradients(self) -> bool {
        !matches!(self, Self::V0)
    }

    /// Which gradient the variant reads.
    pub const fn gradient_flow(self) -> GradientFlow {
        match self {
            Self::V0 | Self::V1 | Self::V2 => GradientFlow::Entering,
            Self::V3 | Self::V4 | Self::V5 | Self::V6 => GradientFlow::Leaving,
        }
    }
}

impl FromStr for MethodVariant {
    type Err = SaliencyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "V0" => Ok(Self::V0),
            "V1" => Ok(Self::V1),
            "V2" => Ok(Self::V2),
            "V3" => Ok(Self::V3),
            "V4" => Ok(Self::V4),
            "V5" => Ok(Self::V5),
            "V6" => Ok(Self::V6),
            _ => Err(SaliencyError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for MethodVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Configuration for [`FastCam`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastCamConfig {
    /// Observed layers, in combination order.
    pub layers: Vec<String>,
    /// Gradient weighting scheme.
    pub method: MethodVariant,
    /// Channel statistic applied to each weighted layer.
    pub statistic: ChannelStatistic,
    /// Normalizer; `None` picks one from `pos_neg_map`.
    pub normalizer: Option<Normalizer>,
    /// Apply the second-order (++) gradient correction.
    pub use_gpp: bool,
    /// Pool gradients over 2×2 windows before weighting.
    pub grad_pooling: Option<GradientPooling>,
    /// Keep positive and negative evidence as separate signed terms.
    pub pos_neg_map: bool,
    /// Combination of the layer maps.
    pub combiner: CombinerConfig,
}

impl Default for FastCamConfig {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            method: MethodVariant::default(),
            statistic: ChannelStatistic::default(),
            normalizer: None,
            use_gpp: false,
            grad_pooling: None,
            pos_neg_map: false,
            combiner: CombinerConfig::default(),
        }
    }
}

impl FastCamConfig {
    /// Create a config observing `layers` with the given variant.
    pub fn new<S: Into<String>>(
        layers: impl IntoIterator<Item = S>,
        method: MethodVariant,
    ) -> Self {
        Self {
            layers: layers.into_iter().map(Into::into).collect(),
            method,
            ..Default::default()
        }
    }

    /// Set the channel statistic.
    pub fn with_statistic(mut self, statistic: ChannelStatistic) -> Self {
        self.statistic = statistic;
        self
    }

    /// Set the normalizer explicitly.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Enable or disable the second-order correction.
    pub fn with_gpp(mut self, use_gpp: bool) -> Self {
        self.use_gpp = use_gpp;
        self
    }

    /// Set the gradient pooling.
    pub fn with_grad_pooling(mut self, pooling: GradientPooling) -> Self {
        self.grad_pooling = Some(pooling);
        self
    }

    /// Enable or disable signed positive/negative maps.
    pub fn with_pos_neg_map(mut self, pos_neg_map: bool) -> Self {
        self.pos_neg_map = pos_neg_map;
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

    /// Normalizer in effect: the explicit one, else Gauss for signed maps
    /// and Gamma otherwise.
    pub fn resolved_normalizer(&self) -> Normalizer {
        self.normalizer.unwrap_or(if self.pos_neg_map {
            Normalizer::gauss()
        } else {
            Normalizer::Gamma
        })
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

/// Which logit to explain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CamTarget {
    /// Target class; the arg-max class when `None`.
    pub class_idx: Option<usize>,
    /// Negate the gradients to explain evidence against the class.
    pub invert: bool,
}

impl CamTarget {
    /// Explain the top-scoring class.
    pub fn top_class() -> Self {
        Self::default()
    }

    /// Explain a given class.
    pub fn class(class_idx: usize) -> Self {
        Self {
            class_idx: Some(class_idx),
            invert: false,
        }
    }

    /// Explain evidence against the target instead.
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

/// Result of [`FastCam::compute`].
#[derive(Debug, Clone)]
pub struct FastCamOutput<B: Backend> {
    /// Combined map of shape (1, out_h, out_w).
    pub combined: Tensor<B, 3>,
    /// Resized layer maps of shape (1, layers, out_h, out_w).
    pub layer_maps: Tensor<B, 4>,
    /// Classifier logits of shape (1, num_classes).
    pub logits: Tensor<B, 2>,
    /// Explained class.
    pub class_idx: usize,
}

/// Gradient-weighted saliency over one image at a time.
///
/// Owns the classifier while its hooks are registered; use
/// [`FastCam::into_model`] to get it back.
pub struct FastCam<B: AutodiffBackend, M: HookedClassifier<B>> {
    model: M,
    config: FastCamConfig,
    normalizer: Normalizer,
    combiner: MapCombiner,
    activation_hooks: Vec<CaptureHook<B>>,
    gradient_hooks: Vec<CaptureHook<B>>,
}

impl<B: AutodiffBackend, M: HookedClassifier<B>> FastCam<B, M> {
    /// Register the hooks the configured variant needs.
    ///
    /// # Errors
    ///
    /// Returns an error if no layer is configured, a layer is unknown to
    /// the classifier, or the combiner configuration is invalid.
    pub fn new(model: M, config: FastCamConfig) -> Result<Self> {
        validate_layers(&model, &config.layers)?;
        let combiner = MapCombiner::new(&config.combiner, config.layers.len())?;
        let method = config.method;

        let activation_hooks = if method.uses_activations() {
            config
                .layers
                .iter()
                .map(|layer| model.hooks().register_forward(layer))
                .collect()
        } else {
            Vec::new()
        };
        let gradient_hooks = if method.uses_gradients() {
            config
                .layers
                .iter()
                .map(|layer| model.hooks().register_backward(layer, method.gradient_flow()))
                .collect()
        } else {
            Vec::new()
        };

        if config.use_gpp && !(method.uses_activations() && method.uses_gradients()) {
            tracing::warn!(
                "Second-order correction needs activations and gradients; ignored for {}",
                method
            );
        }

        let normalizer = config.resolved_normalizer();
        tracing::info!(
            "FastCAM {} over {} layer(s) {:?}, normalizer {:?}",
            method,
            config.layers.len(),
            config.layers,
            normalizer
        );

        Ok(Self {
            model,
            config,
            normalizer,
            combiner,
            activation_hooks,
            gradient_hooks,
        })
    }

    /// Compute the saliency of a single image.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch size is not 1, `invert` is requested
    /// for a variant without gradients, the class index is out of range,
    /// or a hook captured nothing.
    pub fn compute(&self, input: Tensor<B, 4>, target: CamTarget) -> Result<FastCamOutput<B>> {
        let [batch, _, _, _] = input.dims();
        if batch != 1 {
            return Err(SaliencyError::BatchNotSupported(batch));
        }

        let method = self.config.method;
        if target.invert && !method.uses_gradients() {
            return Err(SaliencyError::Precondition(format!(
                "cannot invert gradients: {method} does not capture them"
            )));
        }

        let input = if method.uses_gradients() {
            input
        } else {
            input.detach()
        };
        let output = self.model.forward(input);
        let class_idx = select_class(&output.logits, target.class_idx)?;
        tracing::debug!("FastCAM {} explaining class {}", method, class_idx);

        if method.uses_gradients() {
            let score = output
                .logits
                .clone()
                .slice([0..1, class_idx..class_idx + 1])
                .reshape([1]);
            self.model.zero_grad();
            self.model.backward(score);
        }

        let mut maps = Vec::with_capacity(self.config.layers.len());
        for (i, layer) in self.config.layers.iter().enumerate() {
            let gradients = match self.gradient_hooks.get(i) {
                Some(hook) => {
                    let gradients = captured(hook, "gradient")?;
                    Some(self.prepare_gradients(gradients, target.invert))
                }
                None => None,
            };
            let activations = match self.activation_hooks.get(i) {
                Some(hook) => Some(relu(captured(hook, "activation")?)),
                None => None,
            };

            if let Some(a) = &activations {
                let shape = ActivationShape::from(a.dims());
                tracing::debug!("Layer '{}' activations {}", layer, shape);
                warn_if_silent(layer, a);
            }
            maps.push(self.layer_map(activations, gradients)?);
        }

        let CombinedMaps { combined, stacked } = self.combiner.combine(maps)?;
        Ok(FastCamOutput {
            combined,
            layer_maps: stacked,
            logits: output.logits.detach(),
            class_idx,
        })
    }

    fn prepare_gradients(&self, gradients: Tensor<B, 4>, invert: bool) -> Tensor<B, 4> {
        let gradients = match self.config.grad_pooling {
            Some(pooling) => pooling.apply(gradients),
            None => gradients,
        };
        if invert {
            gradients.neg()
        } else {
            gradients
        }
    }

    fn layer_map(
        &self,
        activations: Option<Tensor<B, 4>>,
        gradients: Option<Tensor<B, 4>>,
    ) -> Result<Tensor<B, 3>> {
        let gradients = match (&activations, gradients) {
            (Some(a), Some(g)) if self.config.use_gpp => {
                Some(second_order_gradients(a.clone(), g)?)
            }
            (_, g) => g,
        };
        let saliency = weight_activations(self.config.method, activations, gradients)?;
        let raw = estimate_saliency(self.config.statistic, saliency, self.config.pos_neg_map)?;

        self.normalizer.normalize(raw)
    }

    /// The observed classifier.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Active configuration.
    pub fn config(&self) -> &FastCamConfig {
        &self.config
    }

    /// Release the hooks and return the classifier.
    pub fn into_model(self) -> M {
        let Self {
            model,
            activation_hooks,
            gradient_hooks,
            ..
        } = self;
        drop(activation_hooks);
        drop(gradient_hooks);
        model
    }
}

/// Combine activations and gradients of one layer as `method` prescribes.
///
/// Both tensors have shape (batch, channels, height, width). Channel-mean
/// variants (V1, V2) only need matching batch and channel sizes.
///
/// # Errors
///
/// Returns an error if a tensor the variant reads is missing or the shapes
/// are incompatible.
pub fn weight_activations<B: Backend>(
    method: MethodVariant,
    activations: Option<Tensor<B, 4>>,
    gradients: Option<Tensor<B, 4>>,
) -> Result<Tensor<B, 4>> {
    let saliency = match method {
        MethodVariant::V0 => require(activations, method, "activations")?,
        MethodVariant::V1 => {
            let (a, g) = paired(activations, gradients, method, false)?;
            signum(channel_mean(g)) * a
        }
        MethodVariant::V2 => {
            let (a, g) = paired(activations, gradients, method, false)?;
            channel_mean(g) * a
        }
        MethodVariant::V3 => {
            let (a, g) = paired(activations, gradients, method, true)?;
            signum(g) * a
        }
        MethodVariant::V4 => {
            let (a, g) = paired(activations, gradients, method, true)?;
            g * a
        }
        MethodVariant::V5 => require(gradients, method, "gradients")?,
        MethodVariant::V6 => signum(require(gradients, method, "gradients")?),
    };

    Ok(saliency)
}

/// Second-order (++) gradient correction.
///
/// `alpha = g² / (2g² + Σ_{h,w} a·g³ + ε)`, returning `alpha · relu(g)`.
///
/// # Errors
///
/// Returns an error if the shapes differ.
pub fn second_order_gradients<B: Backend>(
    activations: Tensor<B, 4>,
    gradients: Tensor<B, 4>,
) -> Result<Tensor<B, 4>> {
    if activations.dims() != gradients.dims() {
        return Err(SaliencyError::ShapeMismatch(format!(
            "second-order correction: activations {} vs gradients {}",
            ActivationShape::from(activations.dims()),
            ActivationShape::from(gradients.dims())
        )));
    }

    let g2 = gradients.clone() * gradients.clone();
    let g3 = g2.clone() * gradients.clone();
    let cross = (activations * g3).sum_dim(3).sum_dim(2);
    let alpha = g2.clone() / (g2 * 2.0 + cross + GPP_EPSILON);

    Ok(alpha * relu(gradients))
}

/// Reduce a weighted saliency tensor to a raw, unnormalized map.
///
/// With `pos_neg_map` the positive and negative parts are estimated
/// separately and the negative estimate is subtracted, so the map keeps
/// its sign.
fn estimate_saliency<B: Backend>(
    statistic: ChannelStatistic,
    saliency: Tensor<B, 4>,
    pos_neg_map: bool,
) -> Result<Tensor<B, 3>> {
    if !pos_neg_map {
        return statistic.estimate(relu(saliency));
    }

    let positive = statistic.estimate(relu(saliency.clone()))?;
    let negative = statistic.estimate(relu(saliency.neg()))?;
    Ok(positive - negative)
}

fn require<B: Backend>(
    tensor: Option<Tensor<B, 4>>,
    method: MethodVariant,
    what: &str,
) -> Result<Tensor<B, 4>> {
    tensor.ok_or_else(|| SaliencyError::Precondition(format!("{method} requires {what}")))
}

fn paired<B: Backend>(
    activations: Option<Tensor<B, 4>>,
    gradients: Option<Tensor<B, 4>>,
    method: MethodVariant,
    elementwise: bool,
) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
    let a = require(activations, method, "activations")?;
    let g = require(gradients, method, "gradients")?;

    let (a_dims, g_dims) = (a.dims(), g.dims());
    let compatible = if elementwise {
        a_dims == g_dims
    } else {
        a_dims[..2] == g_dims[..2]
    };
    if !compatible {
        return Err(SaliencyError::ShapeMismatch(format!(
            "{method}: activations {} vs gradients {}",
            ActivationShape::from(a_dims),
            ActivationShape::from(g_dims)
        )));
    }

    Ok((a, g))
}

/// Spatial mean per channel, shape (batch, channels, 1, 1).
fn channel_mean<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.mean_dim(3).mean_dim(2)
}

fn signum<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.clone().greater_elem(0.0).float() - x.lower_elem(0.0).float()
}

fn captured<B: Backend>(hook: &CaptureHook<B>, what: &str) -> Result<Tensor<B, 4>> {
    hook.latest().map(|t| t.detach()).ok_or_else(|| {
        SaliencyError::Precondition(format!("no {what} captured for layer '{}'", hook.layer()))
    })
}

fn select_class<B: Backend>(logits: &Tensor<B, 2>, requested: Option<usize>) -> Result<usize> {
    let [_, num_classes] = logits.dims();
    if num_classes == 0 {
        return Err(SaliencyError::InvalidTensor(
            "classifier returned no logits".to_string(),
        ));
    }

    match requested {
        Some(index) if index >= num_classes => {
            Err(SaliencyError::ClassOutOfRange { index, num_classes })
        }
        Some(index) => Ok(index),
        None => {
            let top: i64 = logits.clone().argmax(1).into_scalar().elem();
            Ok(top as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastcam_core::backend::NdArray;
    use fastcam_core::ErrorKind;

    type TestBackend = NdArray;

    fn tensor(data: &[f32], shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats(data, &device).reshape(shape)
    }

    fn values(x: Tensor<TestBackend, 4>) -> Vec<f32> {
        x.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_variant_capabilities() {
        assert!(!MethodVariant::V0.uses_gradients());
        assert!(MethodVariant::V0.uses_activations());
        assert!(!MethodVariant::V5.uses_activations());
        assert!(MethodVariant::V5.uses_gradients());

        for method in MethodVariant::ALL {
            let expected = matches!(
                method,
                MethodVariant::V3 | MethodVariant::V4 | MethodVariant::V5 | MethodVariant::V6
            );
            assert_eq!(method.gradient_flow() == GradientFlow::Leaving, expected);
        }
        assert_eq!(MethodVariant::default(), MethodVariant::V1);
    }

    #[test]
    fn test_variant_parsing() {
        for method in MethodVariant::ALL {
            assert_eq!(method.to_string().parse::<MethodVariant>().unwrap(), method);
        }
        assert_eq!(" v4 ".parse::<MethodVariant>().unwrap(), MethodVariant::V4);

        let err = "V7".parse::<MethodVariant>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_weighting_variants() {
        let a = tensor(&[1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]);
        let g = tensor(&[-1.0, 0.5, 0.0, -2.0], [1, 1, 2, 2]);
        let w = |m| values(weight_activations(m, Some(a.clone()), Some(g.clone())).unwrap());

        assert_eq!(w(MethodVariant::V0), vec![1.0, 2.0, 3.0, 4.0]);
        // Channel mean is -0.625.
        assert_eq!(w(MethodVariant::V1), vec![-1.0, -2.0, -3.0, -4.0]);
        assert_eq!(w(MethodVariant::V2), vec![-0.625, -1.25, -1.875, -2.5]);
        assert_eq!(w(MethodVariant::V3), vec![-1.0, 2.0, 0.0, -4.0]);
        assert_eq!(w(MethodVariant::V4), vec![-1.0, 1.0, 0.0, -8.0]);
        assert_eq!(w(MethodVariant::V5), vec![-1.0, 0.5, 0.0, -2.0]);
        assert_eq!(w(MethodVariant::V6), vec![-1.0, 1.0, 0.0, -1.0]);
    }

    #[test]
    fn test_v0_and_v5_ignore_the_other_capture() {
        let a = tensor(&[1.0, 2.0], [1, 1, 1, 2]);
        let g = tensor(&[3.0, 4.0], [1, 1, 1, 2]);

        let v0 = weight_activations(MethodVariant::V0, Some(a.clone()), None).unwrap();
        assert_eq!(values(v0), vec![1.0, 2.0]);
        let v5 = weight_activations(MethodVariant::V5, None, Some(g.clone())).unwrap();
        assert_eq!(values(v5), vec![3.0, 4.0]);

        // Zeroing the unused capture leaves each output unchanged.
        let zeros = a.zeros_like();
        let v0 =
            weight_activations(MethodVariant::V0, Some(a.clone()), Some(zeros.clone())).unwrap();
        assert_eq!(values(v0), vec![1.0, 2.0]);
        let v5 = weight_activations(MethodVariant::V5, Some(zeros), Some(g.clone())).unwrap();
        assert_eq!(values(v5), vec![3.0, 4.0]);

        let err = weight_activations(MethodVariant::V0, None, Some(g)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        let err = weight_activations(MethodVariant::V5, Some(a), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_weighting_shape_checks() {
        let a = tensor(&[1.0; 8], [1, 2, 2, 2]);
        let pooled = tensor(&[1.0, -1.0], [1, 2, 1, 1]);

        // Channel means only need batch and channel sizes to agree.
        let v2 = weight_activations(MethodVariant::V2, Some(a.clone()), Some(pooled.clone()));
        assert!(v2.is_ok());

        let err = weight_activations(MethodVariant::V4, Some(a), Some(pooled)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn test_second_order_gradients() {
        let a = tensor(&[1.0, 1.0], [1, 1, 1, 2]);
        let g = tensor(&[1.0, -1.0], [1, 1, 1, 2]);
        let out = values(second_order_gradients(a, g).unwrap());

        // Cross term: 1·1 + 1·(-1) = 0, so alpha = 1 / 2.
        assert!((out[0] - 0.5).abs() < 1e-5);
        assert_eq!(out[1], 0.0);

        let zero = tensor(&[0.0; 4], [1, 1, 2, 2]);
        let out = values(second_order_gradients(zero.clone(), zero).unwrap());
        assert!(out.iter().all(|v| *v == 0.0));

        let err = second_order_gradients(
            tensor(&[0.0; 4], [1, 1, 2, 2]),
            tensor(&[0.0; 2], [1, 1, 1, 2]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn test_pos_neg_map_keeps_sign() {
        // Channels x locations: location 0 all positive, location 1 all negative.
        let saliency = tensor(&[2.0, -1.0, 3.0, -2.0, 4.0, -3.0], [1, 3, 1, 2]);

        let signed = estimate_saliency(ChannelStatistic::Mean, saliency.clone(), true).unwrap();
        let signed = signed.into_data().to_vec::<f32>().unwrap();
        assert!((signed[0] - 3.0).abs() < 1e-6);
        assert!((signed[1] + 2.0).abs() < 1e-6);

        let signed = estimate_saliency(ChannelStatistic::smoe_scale(), saliency.clone(), true)
            .unwrap()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(signed[0] > 0.0);
        assert!(signed[1] < 0.0);

        let rectified = estimate_saliency(ChannelStatistic::Mean, saliency, false)
            .unwrap()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!((rectified[0] - 3.0).abs() < 1e-6);
        assert_eq!(rectified[1], 0.0);
    }

    #[test]
    fn test_select_class() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.1, 2.0, -1.0]], &device);

        assert_eq!(select_class(&logits, None).unwrap(), 1);
        assert_eq!(select_class(&logits, Some(2)).unwrap(), 2);
        let err = select_class(&logits, Some(3)).unwrap_err();
        assert!(matches!(
            err,
            SaliencyError::ClassOutOfRange {
                index: 3,
                num_classes: 3
            }
        ));
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = FastCamConfig::new(["layer1", "layer2"], MethodVariant::V2);
        assert_eq!(config.resolved_normalizer(), Normalizer::Gamma);
        assert_eq!(
            config.clone().with_pos_neg_map(true).resolved_normalizer(),
            Normalizer::gauss()
        );
        assert_eq!(
            config.clone().with_normalizer(Normalizer::Range).resolved_normalizer(),
            Normalizer::Range
        );

        let config = config
            .with_gpp(true)
            .with_grad_pooling(GradientPooling::Magnitude);
        let restored = FastCamConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);

        let partial =
            FastCamConfig::from_json(r#"{"layers": ["layer1"], "method": "V5"}"#).unwrap();
        assert_eq!(partial.method, MethodVariant::V5);
        assert!(partial.normalizer.is_none());
    }

    #[test]
    fn test_cam_target_builders() {
        assert_eq!(CamTarget::top_class(), CamTarget::default());
        let target = CamTarget::class(4).inverted();
        assert_eq!(target.class_idx, Some(4));
        assert!(target.invert);
    }
}
