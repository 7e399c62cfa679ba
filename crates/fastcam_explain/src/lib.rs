//! # fastcam_explain
//!
//! Saliency maps for image classifiers built on burn.
//!
//! This crate provides:
//! - [`HookRegistry`]: forward and backward capture of named layers
//! - [`HookedClassifier`]: the contract a classifier implements to be observed
//! - [`SaliencyMap`]: SMOE saliency from activations alone
//! - [`FastCam`]: gradient-weighted saliency (variants V0 to V6)
//!
//! ## Example
//!
//! ```rust,ignore
//! use fastcam_explain::{CamTarget, FastCam, FastCamConfig, MethodVariant};
//!
//! let config = FastCamConfig::new(["layer3", "layer4"], MethodVariant::V2);
//! let cam = FastCam::new(model, config)?;
//! let output = cam.compute(image, CamTarget::top_class())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod classifier;
mod fastcam;
mod hooks;
mod saliency;

pub use classifier::{ClassifierOutput, HookedClassifier};
pub use fastcam::{
    second_order_gradients, weight_activations, CamTarget, FastCam, FastCamConfig, FastCamOutput,
    MethodVariant,
};
pub use hooks::{CaptureHook, GradientFlow, HookHandle, HookRegistry};
pub use saliency::{SaliencyMap, SaliencyMapConfig, SaliencyOutput};
