//! Classifier contract for saliency computation.
//!
//! Defines the trait a classifier implements so the orchestrators can
//! observe its layers.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use fastcam_core::{Result, SaliencyError};

use crate::hooks::HookRegistry;

/// Output of a classifier forward pass.
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// Class logits of shape (batch, num_classes).
    pub logits: Tensor<B, 2>,
    /// Auxiliary attention map of shape (batch, h, w), if the classifier
    /// computes one.
    pub attention: Option<Tensor<B, 3>>,
}

impl<B: Backend> ClassifierOutput<B> {
    /// Output without attention map.
    pub fn new(logits: Tensor<B, 2>) -> Self {
        Self {
            logits,
            attention: None,
        }
    }

    /// Attach an attention map.
    pub fn with_attention(mut self, attention: Tensor<B, 3>) -> Self {
        self.attention = Some(attention);
        self
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.logits.dims()[1]
    }
}

/// A classifier whose named layers can be observed.
///
/// Implementations call [`HookRegistry::tap`] on the output of each named
/// layer during [`HookedClassifier::forward`] and continue with the
/// returned tensor.
pub trait HookedClassifier<B: Backend> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `input` - Image batch of shape (batch, channels, height, width)
    ///
    /// # Returns
    ///
    /// Logits of shape (batch, num_classes) and an optional attention map
    fn forward(&self, input: Tensor<B, 4>) -> ClassifierOutput<B>;

    /// Registry the classifier reports its layers to.
    fn hooks(&self) -> &HookRegistry<B>;

    /// Names of the observable layers.
    fn layer_names(&self) -> Vec<String>;

    /// Whether `name` is an observable layer.
    fn has_layer(&self, name: &str) -> bool {
        self.layer_names().iter().any(|layer| layer == name)
    }

    /// Reset captured gradients.
    fn zero_grad(&self) {
        self.hooks().clear_gradients();
    }

    /// Back-propagate a scalar score, filling the gradient hooks.
    fn backward(&self, score: Tensor<B, 1>)
    where
        B: AutodiffBackend,
    {
        self.hooks().backward(score);
    }
}

/// Check that `layers` is non-empty and only names layers of `model`.
pub(crate) fn validate_layers<B, M>(model: &M, layers: &[String]) -> Result<()>
where
    B: Backend,
    M: HookedClassifier<B>,
{
    if layers.is_empty() {
        return Err(SaliencyError::InvalidConfig(
            "at least one layer is required".to_string(),
        ));
    }

    match layers.iter().find(|layer| !model.has_layer(layer)) {
        Some(unknown) => Err(SaliencyError::UnknownLayer(unknown.clone())),
        None => Ok(()),
    }
}
