//! Actor-critic network for A3C style agents.
//!
//! A convolutional header (`nature` or `nips`) feeds a fully connected layer whose
//! output is shared by a policy head (softmax over actions) and a value head.
mod base;
mod config;
pub mod policy;
pub use base::{A3cLoss, Network, PolicyValue};
pub use config::NetworkConfig;
