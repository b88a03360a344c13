//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug, PartialEq)]
pub enum PixelNetError {
    /// The data format string is neither `NCHW` nor `NHWC`.
    #[error("unknown data_format: {0}")]
    UnknownDataFormat(String),

    /// The header type string is neither `nature` nor `nips`.
    #[error("wrong header type: {0}")]
    UnknownHeaderType(String),

    /// The output type string is neither `normal` nor `dueling`.
    #[error("wrong output type: {0}")]
    UnknownOutputType(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An observation batch does not have the shape declared by the configuration.
    #[error("input shape mismatch: expected [N, {expected:?}], got {actual:?}")]
    InputShapeMismatch {
        /// Expected shape without the batch axis.
        expected: Vec<usize>,
        /// Shape of the given tensor.
        actual: Vec<usize>,
    },

    /// The weight keys of two networks differ.
    #[error("weight keys mismatch: missing in local {missing:?}, unexpected in local {unexpected:?}")]
    WeightKeyMismatch {
        /// Keys of the source that the destination does not have.
        missing: Vec<String>,
        /// Keys of the destination that the source does not have.
        unexpected: Vec<String>,
    },

    /// A weight has different shapes in two networks.
    #[error("weight shape mismatch for {key}: source {source_shape:?}, destination {dest_shape:?}")]
    WeightShapeMismatch {
        /// Parameter key.
        key: String,
        /// Shape in the source network.
        source_shape: Vec<usize>,
        /// Shape in the destination network.
        dest_shape: Vec<usize>,
    },

    /// `copy_from_global` was called on a network built without a global network.
    #[error("no global network is attached to {0}")]
    NoGlobalNetwork(String),
}
