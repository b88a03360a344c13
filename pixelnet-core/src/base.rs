//! Configuration vocabulary shared by every backend.
use crate::error::PixelNetError;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt, str::FromStr};

/// Memory layout of observation batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataFormat {
    /// Channel-first, `[N, C, H, W]`.
    Nchw,

    /// Channel-last, `[N, H, W, C]`.
    Nhwc,
}

impl DataFormat {
    /// Shape of one observation (without the batch axis).
    pub fn input_shape(&self, history_length: usize, height: usize, width: usize) -> [usize; 3] {
        match self {
            Self::Nchw => [history_length, height, width],
            Self::Nhwc => [height, width, history_length],
        }
    }

    /// Index of the channel axis in a batched tensor.
    pub fn channel_axis(&self) -> usize {
        match self {
            Self::Nchw => 1,
            Self::Nhwc => 3,
        }
    }
}

impl FromStr for DataFormat {
    type Err = PixelNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NCHW" => Ok(Self::Nchw),
            "NHWC" => Ok(Self::Nhwc),
            _ => Err(PixelNetError::UnknownDataFormat(s.to_string())),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nchw => write!(f, "NCHW"),
            Self::Nhwc => write!(f, "NHWC"),
        }
    }
}

impl TryFrom<String> for DataFormat {
    type Error = PixelNetError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DataFormat> for String {
    fn from(v: DataFormat) -> Self {
        v.to_string()
    }
}

/// Convolutional topology preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HeaderType {
    /// Three convolutions (32/64/64 filters) as in the DQN Nature paper.
    Nature,

    /// Two convolutions (16/32 filters) as in the DQN NIPS workshop paper.
    Nips,
}

impl FromStr for HeaderType {
    type Err = PixelNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nature" => Ok(Self::Nature),
            "nips" => Ok(Self::Nips),
            _ => Err(PixelNetError::UnknownHeaderType(s.to_string())),
        }
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nature => write!(f, "nature"),
            Self::Nips => write!(f, "nips"),
        }
    }
}

impl TryFrom<String> for HeaderType {
    type Error = PixelNetError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HeaderType> for String {
    fn from(v: HeaderType) -> Self {
        v.to_string()
    }
}

/// Output stage of a Q-value network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputType {
    /// Fully connected layers followed by a linear output.
    Normal,

    /// Value and advantage streams recombined into action values.
    Dueling,
}

impl FromStr for OutputType {
    type Err = PixelNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "dueling" => Ok(Self::Dueling),
            _ => Err(PixelNetError::UnknownOutputType(s.to_string())),
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Dueling => write!(f, "dueling"),
        }
    }
}

impl TryFrom<String> for OutputType {
    type Error = PixelNetError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<OutputType> for String {
    fn from(v: OutputType) -> Self {
        v.to_string()
    }
}

/// Activation function applied after a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    /// Rectified linear unit.
    Relu,

    /// Hyperbolic tangent.
    Tanh,

    /// Logistic sigmoid.
    Sigmoid,

    /// Exponential linear unit with alpha = 1.
    Elu,

    /// No activation.
    Identity,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Relu
    }
}

/// Initial values of weights or biases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    /// Normal distribution clamped at two standard deviations around the mean.
    TruncatedNormal {
        /// Mean.
        mean: f64,
        /// Standard deviation.
        stdev: f64,
    },

    /// Normal distribution.
    Normal {
        /// Mean.
        mean: f64,
        /// Standard deviation.
        stdev: f64,
    },

    /// Uniform distribution on `[lo, up)`.
    Uniform {
        /// Lower bound.
        lo: f64,
        /// Upper bound.
        up: f64,
    },

    /// Glorot uniform, bound `sqrt(6 / (fan_in + fan_out))`.
    XavierUniform,

    /// Constant value.
    Constant {
        /// The value.
        value: f64,
    },

    /// All zeros.
    Zeros,
}

impl Initializer {
    /// Bound of [`Initializer::XavierUniform`] for the given fans.
    pub fn xavier_bound(fan_in: usize, fan_out: usize) -> f64 {
        (6.0 / (fan_in + fan_out) as f64).sqrt()
    }
}

/// Device on which the variables of a network are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentTarget {
    /// The main CPU.
    Cpu,

    /// A CUDA device with the given ordinal.
    Cuda(usize),
}

impl DeploymentTarget {
    /// Historical pairing of data format and device: channel-first batches on the
    /// first GPU, channel-last batches on the CPU.
    pub fn legacy_for(data_format: DataFormat) -> Self {
        match data_format {
            DataFormat::Nchw => Self::Cuda(0),
            DataFormat::Nhwc => Self::Cpu,
        }
    }
}

impl Default for DeploymentTarget {
    fn default() -> Self {
        Self::Cpu
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_data_format() {
        assert_eq!("NCHW".parse::<DataFormat>(), Ok(DataFormat::Nchw));
        assert_eq!("NHWC".parse::<DataFormat>(), Ok(DataFormat::Nhwc));
        assert_eq!(
            "nhwc".parse::<DataFormat>(),
            Err(PixelNetError::UnknownDataFormat("nhwc".to_string()))
        );
    }

    #[test]
    fn test_parse_header_type_ignores_case() {
        assert_eq!("Nature".parse::<HeaderType>(), Ok(HeaderType::Nature));
        assert_eq!("NIPS".parse::<HeaderType>(), Ok(HeaderType::Nips));
        assert!(matches!(
            "alexnet".parse::<HeaderType>(),
            Err(PixelNetError::UnknownHeaderType(_))
        ));
    }

    #[test]
    fn test_parse_output_type() {
        assert_eq!("dueling".parse::<OutputType>(), Ok(OutputType::Dueling));
        assert_eq!("Normal".parse::<OutputType>(), Ok(OutputType::Normal));
        assert!("mlp".parse::<OutputType>().is_err());
    }

    #[test]
    fn test_channel_axis_position() {
        assert_eq!(DataFormat::Nchw.input_shape(4, 84, 80), [4, 84, 80]);
        assert_eq!(DataFormat::Nhwc.input_shape(4, 84, 80), [84, 80, 4]);
        assert_eq!(DataFormat::Nchw.channel_axis(), 1);
        assert_eq!(DataFormat::Nhwc.channel_axis(), 3);
    }

    #[test]
    fn test_serde_enums() -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(&(DataFormat::Nhwc, HeaderType::Nips))?;
        let (f, h): (DataFormat, HeaderType) = serde_yaml::from_str(&yaml)?;
        assert_eq!(f, DataFormat::Nhwc);
        assert_eq!(h, HeaderType::Nips);

        assert!(serde_yaml::from_str::<DataFormat>("NWHC").is_err());
        assert!(serde_yaml::from_str::<OutputType>("advantage").is_err());
        Ok(())
    }

    #[test]
    fn test_legacy_target() {
        assert_eq!(DeploymentTarget::legacy_for(DataFormat::Nchw), DeploymentTarget::Cuda(0));
        assert_eq!(DeploymentTarget::legacy_for(DataFormat::Nhwc), DeploymentTarget::Cpu);
    }
}
