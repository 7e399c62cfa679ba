//! # fastcam
//!
//! Efficient saliency maps for image classifiers, in Rust.
//!
//! fastcam-rs computes where a convolutional classifier "looks" from a
//! single forward pass (SMOE scale saliency) or a forward and a backward
//! pass (FastCAM gradient weighting):
//!
//! - **Maps**: channel statistics, normalizers, resizing, gradient pooling
//! - **Combination**: weighted multi-layer fusion at a common resolution
//! - **Explain**: capture hooks, the classifier contract, orchestrators
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fastcam::prelude::*;
//!
//! // Observe two layers of a classifier implementing `HookedClassifier`
//! let config = FastCamConfig::new(["layer3", "layer4"], MethodVariant::V2)
//!     .with_output_size(OutputSize::new(224, 224)?);
//! let cam = FastCam::new(model, config)?;
//!
//! // Explain the top class of one image
//! let output = cam.compute(image, CamTarget::top_class())?;
//! let saliency = output.combined; // (1, 224, 224), values in [0, 1]
//!
//! // Get the classifier back, hooks released
//! let model = cam.into_model();
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray
//! - `backend-wgpu`: GPU backend using WGPU

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub use fastcam_core as core;
pub use fastcam_explain as explain;
pub use fastcam_maps as maps;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use fastcam::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use fastcam_core::{ActivationShape, ErrorKind, MapShape, OutputSize, Result, SaliencyError};

    // Maps
    pub use fastcam_maps::{
        ChannelStatistic, CombinerConfig, GradientPooling, LayerWeights, MapCombiner, Normalizer,
        ResizeMode,
    };

    // Explain
    pub use fastcam_explain::{
        CamTarget, ClassifierOutput, FastCam, FastCamConfig, FastCamOutput, GradientFlow,
        HookRegistry, HookedClassifier, MethodVariant, SaliencyMap, SaliencyMapConfig,
        SaliencyOutput,
    };
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    pub use fastcam_core::backend;
    pub use fastcam_core::tolerance;
    pub use fastcam_explain::{second_order_gradients, weight_activations, CaptureHook, HookHandle};
    pub use fastcam_maps::{resize, CombinedMaps};
}
