//! Q-value network with a convolutional header.
//!
//! The output stage is either a stack of fully connected layers (`normal`) or a
//! dueling architecture combining a state value and centered advantages.
mod base;
mod config;
pub mod output;
pub use base::Cnn;
pub use config::CnnConfig;
pub use output::QValues;
