use anyhow::Result;
use pixelnet_core::{
    shape::{validate_hidden_sizes, validate_input},
    Activation, DataFormat, HeaderType, Initializer, ObservationDims, OutputType, PixelNetError,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Cnn`](super::Cnn).
pub struct CnnConfig {
    pub(super) data_format: DataFormat,
    pub(super) history_length: usize,
    pub(super) observation_dims: ObservationDims,
    pub(super) output_size: usize,
    #[serde(default)]
    pub(super) hidden_activation: Activation,
    #[serde(default)]
    pub(super) output_hidden_activation: Activation,
    #[serde(default)]
    pub(super) output_activation: Option<Activation>,
    #[serde(default = "default_weights_initializer")]
    pub(super) weights_initializer: Initializer,
    #[serde(default = "default_biases_initializer")]
    pub(super) biases_initializer: Initializer,
    #[serde(default)]
    pub(super) output_hidden_sizes: Option<Vec<usize>>,
    #[serde(default = "default_stream_sizes")]
    pub(super) value_hidden_sizes: Vec<usize>,
    #[serde(default = "default_stream_sizes")]
    pub(super) advantage_hidden_sizes: Vec<usize>,
    pub(super) output_type: OutputType,
    pub(super) header_type: HeaderType,
    #[serde(default = "default_name")]
    pub(super) name: String,
}

fn default_weights_initializer() -> Initializer {
    Initializer::XavierUniform
}

fn default_biases_initializer() -> Initializer {
    Initializer::Zeros
}

fn default_stream_sizes() -> Vec<usize> {
    vec![512]
}

fn default_name() -> String {
    "CNN".to_string()
}

impl Default for CnnConfig {
    fn default() -> Self {
        Self {
            data_format: DataFormat::Nhwc,
            history_length: 4,
            observation_dims: ObservationDims::default(),
            output_size: 1,
            hidden_activation: Activation::Relu,
            output_hidden_activation: Activation::Relu,
            output_activation: None,
            weights_initializer: default_weights_initializer(),
            biases_initializer: default_biases_initializer(),
            output_hidden_sizes: None,
            value_hidden_sizes: default_stream_sizes(),
            advantage_hidden_sizes: default_stream_sizes(),
            output_type: OutputType::Dueling,
            header_type: HeaderType::Nips,
            name: default_name(),
        }
    }
}

impl CnnConfig {
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

    /// Sets the number of outputs (actions).
    pub fn output_size(mut self, v: usize) -> Self {
        self.output_size = v;
        self
    }

    /// Sets the activation function of the convolutions.
    pub fn hidden_activation(mut self, v: Activation) -> Self {
        self.hidden_activation = v;
        self
    }

    /// Sets the activation function of the hidden layers of the output stage.
    pub fn output_hidden_activation(mut self, v: Activation) -> Self {
        self.output_hidden_activation = v;
        self
    }

    /// Sets the activation function applied to the outputs.
    pub fn output_activation(mut self, v: Option<Activation>) -> Self {
        self.output_activation = v;
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

    /// Sets the hidden layers of the normal output stage.
    ///
    /// If not set, the width of the header preset is used.
    pub fn output_hidden_sizes(mut self, v: Vec<usize>) -> Self {
        self.output_hidden_sizes = Some(v);
        self
    }

    /// Sets the hidden layers of the value stream of the dueling output stage.
    pub fn value_hidden_sizes(mut self, v: Vec<usize>) -> Self {
        self.value_hidden_sizes = v;
        self
    }

    /// Sets the hidden layers of the advantage stream of the dueling output stage.
    pub fn advantage_hidden_sizes(mut self, v: Vec<usize>) -> Self {
        self.advantage_hidden_sizes = v;
        self
    }

    /// Sets the output stage.
    pub fn output_type(mut self, v: OutputType) -> Self {
        self.output_type = v;
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

    /// Hidden layers of the normal output stage after applying the header default.
    pub fn resolved_output_hidden_sizes(&self) -> Vec<usize> {
        match &self.output_hidden_sizes {
            Some(sizes) => sizes.clone(),
            None => vec![self.header_type.hidden_size()],
        }
    }

    /// Checks the configuration.
    ///
    /// Returns the number of features produced by the convolutional header.
    pub fn validate(&self) -> Result<usize, PixelNetError> {
        if self.output_size == 0 {
            return Err(PixelNetError::InvalidConfig(
                "output_size must be positive".to_string(),
            ));
        }
        validate_hidden_sizes("output_hidden_sizes", &self.resolved_output_hidden_sizes())?;
        validate_hidden_sizes("value_hidden_sizes", &self.value_hidden_sizes)?;
        validate_hidden_sizes("advantage_hidden_sizes", &self.advantage_hidden_sizes)?;
        validate_input(
            self.data_format,
            self.header_type,
            self.history_length,
            self.observation_dims,
        )
    }

    /// Constructs [`CnnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CnnConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
