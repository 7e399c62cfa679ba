//! # fastcam_core
//!
//! Core types shared by the fastcam-rs crates.
//!
//! This crate provides:
//! - [`SaliencyError`] and the [`Result`] alias used across the workspace
//! - [`ActivationShape`], [`MapShape`] and [`OutputSize`] shape metadata
//! - [`tolerance`]: the named epsilons guarding every log and divide site
//!
//! ## Shape Convention
//!
//! Layer activations and gradients follow `(B, C, H, W)`:
//! - `B`: Batch size
//! - `C`: Channels
//! - `H`, `W`: Spatial height and width of the layer
//!
//! Saliency maps drop the channel axis and follow `(B, H, W)`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod shape;
pub mod tolerance;

pub use error::{ErrorKind, Result, SaliencyError};
pub use shape::{ActivationShape, MapShape, OutputSize};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-wgpu")]
    pub use burn_wgpu::Wgpu;
}
