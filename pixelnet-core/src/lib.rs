#![warn(missing_docs)]
//! Backend-independent building blocks of convolutional networks for
//! pixel-based reinforcement learning agents.
//!
//! This crate holds the configuration vocabulary (closed enumerations instead of
//! type strings), the shape arithmetic of the convolutional presets, the plan used
//! to synchronize weights between a global network and its local copies, and the
//! checkpoint metadata file. Tensors live in backend crates such as `pixelnet-candle`.
pub mod checkpoint;
pub mod error;
pub mod shape;
pub mod sync;

mod base;
pub use base::{Activation, DataFormat, DeploymentTarget, HeaderType, Initializer, OutputType};
pub use checkpoint::CheckpointState;
pub use error::PixelNetError;
pub use shape::{ConvSpec, ObservationDims};
pub use sync::{Assignment, SyncPlan};
