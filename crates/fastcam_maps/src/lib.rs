//! # fastcam_maps
//!
//! Map-level building blocks for fastcam-rs.
//!
//! This crate provides:
//! - Channel statistics reducing `(B, C, H, W)` tensors to `(B, H, W)` maps
//! - Normalizers rescaling raw maps into a bounded range
//! - Resizing and 2×2 gradient pooling
//! - A weighted combiner merging per-layer maps at a common resolution

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod combine;
mod estimator;
mod norm;
mod pooling;
mod resize;

pub use combine::{CombinedMaps, CombinerConfig, LayerWeights, MapCombiner};
pub use estimator::ChannelStatistic;
pub use norm::Normalizer;
pub use pooling::GradientPooling;
pub use resize::{resize, ResizeMode};
