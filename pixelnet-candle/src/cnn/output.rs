//! Output stages of [`Cnn`](super::Cnn).
use crate::{
    layers::{forward_stack, LinearLayer, ParamFactory},
    util::activate,
};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use pixelnet_core::{Activation, OutputType};

/// Action values computed by [`Cnn::forward`](super::Cnn::forward).
pub struct QValues {
    /// Action values, `[N, output_size]`.
    pub outputs: Tensor,

    /// State value of the dueling stage, `[N, 1]`.
    pub value: Option<Tensor>,

    /// Advantages of the dueling stage before centering, `[N, output_size]`.
    pub advantage: Option<Tensor>,
}

impl QValues {
    /// Index of the largest action value of each row.
    pub fn greedy_actions(&self) -> Result<Vec<u32>> {
        Ok(self
            .outputs
            .argmax(D::Minus1)?
            .to_device(&Device::Cpu)?
            .to_vec1::<u32>()?)
    }

    /// Largest action value of each row, `[N]`.
    pub fn max_outputs(&self) -> Result<Tensor> {
        Ok(self.outputs.max(D::Minus1)?)
    }

    /// Value of the given action for each row, `[N]`.
    pub fn outputs_of_actions(&self, actions: &[u32]) -> Result<Tensor> {
        let ixs = Tensor::from_slice(actions, (actions.len(), 1), self.outputs.device())?;
        Ok(self.outputs.gather(&ixs, D::Minus1)?.squeeze(D::Minus1)?)
    }
}

/// Layers mapping convolutional features to action values.
pub enum OutputStage {
    /// Hidden layers `out_hid_<i>`, then the output layer `out`.
    Normal {
        /// Hidden layers, in order.
        hidden: Vec<LinearLayer>,
        /// Output layer with the optional output activation.
        out: LinearLayer,
    },

    /// Value stream `val_hid_<i>`, `val_out` and advantage stream `adv_hid_<i>`,
    /// `adv_out`, recombined as `V + (A - mean(A))`.
    Dueling {
        /// Hidden layers of the value stream.
        value_hidden: Vec<LinearLayer>,
        /// Single-unit value layer.
        value_out: LinearLayer,
        /// Hidden layers of the advantage stream.
        advantage_hidden: Vec<LinearLayer>,
        /// Advantage layer with one unit per output.
        advantage_out: LinearLayer,
        /// Applied to the recombined action values.
        output_activation: Option<Activation>,
    },
}

/// Sizes and activations of an output stage.
pub struct OutputStageParams<'a> {
    /// Normal or dueling.
    pub output_type: OutputType,
    /// Number of action values.
    pub output_size: usize,
    /// Hidden layers of the normal stage.
    pub output_hidden_sizes: &'a [usize],
    /// Hidden layers of the value stream.
    pub value_hidden_sizes: &'a [usize],
    /// Hidden layers of the advantage stream.
    pub advantage_hidden_sizes: &'a [usize],
    /// Activation of every hidden layer.
    pub hidden_activation: Activation,
    /// Activation of the action values, if any.
    pub output_activation: Option<Activation>,
}

impl OutputStage {
    /// Builds the output stage reading `in_dim` features.
    pub fn build(factory: &ParamFactory, in_dim: usize, params: &OutputStageParams) -> Result<Self> {
        match params.output_type {
            OutputType::Normal => {
                let (hidden, dim) = factory.mlp(
                    "out_hid",
                    in_dim,
                    params.output_hidden_sizes,
                    params.hidden_activation,
                )?;
                let out = factory.linear("out", dim, params.output_size, params.output_activation)?;
                Ok(Self::Normal { hidden, out })
            }
            OutputType::Dueling => {
                let (value_hidden, value_dim) = factory.mlp(
                    "val_hid",
                    in_dim,
                    params.value_hidden_sizes,
                    params.hidden_activation,
                )?;
                let value_out = factory.linear("val_out", value_dim, 1, None)?;
                let (advantage_hidden, advantage_dim) = factory.mlp(
                    "adv_hid",
                    in_dim,
                    params.advantage_hidden_sizes,
                    params.hidden_activation,
                )?;
                let advantage_out =
                    factory.linear("adv_out", advantage_dim, params.output_size, None)?;
                Ok(Self::Dueling {
                    value_hidden,
                    value_out,
                    advantage_hidden,
                    advantage_out,
                    output_activation: params.output_activation,
                })
            }
        }
    }

    /// Type of the stage.
    pub fn output_type(&self) -> OutputType {
        match self {
            Self::Normal { .. } => OutputType::Normal,
            Self::Dueling { .. } => OutputType::Dueling,
        }
    }

    /// Computes action values from features.
    pub fn forward(&self, features: &Tensor) -> Result<QValues> {
        match self {
            Self::Normal { hidden, out } => {
                let xs = forward_stack(hidden, features)?;
                Ok(QValues {
                    outputs: out.forward(&xs)?,
                    value: None,
                    advantage: None,
                })
            }
            Self::Dueling {
                value_hidden,
                value_out,
                advantage_hidden,
                advantage_out,
                output_activation,
            } => {
                let value = value_out.forward(&forward_stack(value_hidden, features)?)?;
                let advantage = advantage_out.forward(&forward_stack(advantage_hidden, features)?)?;
                let centered = advantage.broadcast_sub(&advantage.mean_keepdim(1)?)?;
                let mut outputs = centered.broadcast_add(&value)?;
                if let Some(activation) = output_activation {
                    outputs = activate(&outputs, *activation)?;
                }
                Ok(QValues {
                    outputs,
                    value: Some(value),
                    advantage: Some(advantage),
                })
            }
        }
    }
}
