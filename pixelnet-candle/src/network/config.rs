use anyhow::Result;
use pixelnet_core::{
    shape::validate_input, Activation, DataFormat, HeaderType, Initializer, ObservationDims,
    PixelNetError,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Network`](super::Network).
pub struct NetworkConfig {
    pub(super) data_format: DataFormat,
    pub(super) history_length: usize,
    pub(super) observation_dims: ObservationDims,
    pub(super) action_size: usize,
    #[serde(default)]
    pub(super) activation: Activation,
    #[serde(default = "default_weights_initializer")]
    pub(super) weights_initializer: Initializer,
    #[serde(default = "default_biases_initializer")]
    pub(super) biases_initializer: Initializer,
    #[serde(default)]
    pub(super) entropy_beta: f64,
    pub(super) header_type: HeaderType,
    #[serde(default = "default_name")]
    pub(super) name: String,
}

fn default_weights_initializer() -> Initializer {
    Initializer::TruncatedNormal {
        mean: 0.0,
        stdev: 0.02,
    }
}

fn default_biases_initializer() -> Initializer {
    Initializer::Zeros
}

fn default_name() -> String {
    "Network".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            data_format: DataFormat::Nhwc,
            history_length: 4,
            observation_dims: ObservationDims::default(),
            action_size: 1,
            activation: Activation::Relu,
            weights_initializer: default_weights_initializer(),
            biases_initializer: default_biases_initializer(),
            entropy_beta: 0.0,
            header_type: HeaderType::Nature,
            name: default_name(),
        }
    }
}

impl NetworkConfig {
    /// Sets the memory layout of observation batches.
    pub fn data_format(mut self, v: DataFormat) -> Self {
        self.data_format = v;
        self
    }

    /// Sets the number of stacked frames.
    pub fn history_length(mut self, v: usize) -> Self {
        self.history_length = v;
        self
    }

    /// Sets the spatial size of a frame.
    pub fn observation_dims(mut self, height: usize, width: usize) -> Self {
        self.observation_dims = ObservationDims::new(height, width);
        self
    }

    /// Sets the number of actions.
    pub fn action_size(mut self, v: usize) -> Self {
        self.action_size = v;
        self
    }

    /// Sets the activation function of the hidden layers.
    pub fn activation(mut self, v: Activation) -> Self {
        self.activation = v;
        self
    }

    /// Sets the initializer of weights.
    pub fn weights_initializer(mut self, v: Initializer) -> Self {
        self.weights_initializer = v;
        self
    }

    /// Sets the initializer of biases.
    pub fn biases_initializer(mut self, v: Initializer) -> Self {
        self.biases_initializer = v;
        self
    }

    /// Sets the coefficient of the entropy bonus in the policy loss.
    pub fn entropy_beta(mut self, v: f64) -> Self {
        self.entropy_beta = v;
        self
    }

    /// Sets the convolutional preset.
    pub fn header_type(mut self, v: HeaderType) -> Self {
        self.header_type = v;
        self
    }

    /// Sets the name used for checkpoint files.
    pub fn name(mut self, v: impl Into<String>) -> Self {
        self.name = v.into();
        self
    }

    /// Checks the configuration.
    ///
    /// Returns the number of features produced by the convolutional header.
    pub fn validate(&self) -> Result<usize, PixelNetError> {
        if self.action_size == 0 {
            return Err(PixelNetError::InvalidConfig(
                "action_size must be positive".to_string(),
            ));
        }
        if !(self.entropy_beta.is_finite() && self.entropy_beta >= 0.0) {
            return Err(PixelNetError::InvalidConfig(format!(
                "entropy_beta must be non-negative, got {}",
                self.entropy_beta
            )));
        }
        validate_input(
            self.data_format,
            self.header_type,
            self.history_length,
            self.observation_dims,
        )
    }

    /// Constructs [`NetworkConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`NetworkConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
