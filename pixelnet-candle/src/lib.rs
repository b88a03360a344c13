//! Convolutional networks for pixel-based RL agents implemented with
//! [candle](https://crates.io/crates/candle-core).
//!
//! * [`Network`]: actor-critic network with policy and value heads and A3C losses.
//! * [`Cnn`]: Q-value network with a normal or dueling output stage.
//!
//! Both own a [`VarMap`](candle_nn::VarMap) and expose its variables as a read-only
//! [`WeightMap`]. A network built with a reference to a global network can copy the
//! global weights into its own with `copy_from_global`.
pub mod cnn;
pub mod header;
pub mod layers;
pub mod model;
pub mod network;
pub mod opt;
pub mod util;
pub mod weights;
use anyhow::Result;
pub use cnn::{Cnn, CnnConfig, QValues};
pub use model::ModelBase;
pub use network::{A3cLoss, Network, NetworkConfig, PolicyValue};
pub use opt::{GlobalOptimizer, OptimizerConfig};
pub use pixelnet_core::{
    Activation, DataFormat, DeploymentTarget, HeaderType, Initializer, ObservationDims,
    OutputType, PixelNetError,
};
pub use weights::{GlobalSync, NamedTensors, WeightMap};

/// Returns the candle device of a deployment target.
///
/// Fails for CUDA targets when candle was built without CUDA support.
pub fn device(target: DeploymentTarget) -> Result<candle_core::Device> {
    match target {
        DeploymentTarget::Cpu => Ok(candle_core::Device::Cpu),
        DeploymentTarget::Cuda(n) => Ok(candle_core::Device::new_cuda(n)?),
    }
}
