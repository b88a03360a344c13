use super::{
    output::{OutputStage, OutputStageParams, QValues},
    CnnConfig,
};
use crate::{
    device,
    header::ConvHeader,
    layers::ParamFactory,
    model::ModelBase,
    weights::{GlobalSync, WeightMap},
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use log::info;
use pixelnet_core::DeploymentTarget;

/// Convolutional Q-value network.
///
/// The convolutions `l1`..`l3` are followed by a normal or dueling output stage
/// reading the flattened output of the last convolution.
pub struct Cnn {
    config: CnnConfig,
    device: Device,
    varmap: VarMap,
    weights: WeightMap,
    header: ConvHeader,
    output: OutputStage,
    global_sync: Option<GlobalSync>,
}

impl Cnn {
    /// Builds the network.
    ///
    /// When `global` is given, its weights can be copied into this network with
    /// [`ModelBase::copy_from_global`].
    pub fn build(config: CnnConfig, target: DeploymentTarget, global: Option<&Cnn>) -> Result<Self> {
        let feature_dim = config.validate()?;
        let device = device(target)?;
        let varmap = VarMap::new();

        let (header, output) = {
            let factory = ParamFactory::new(
                &varmap,
                &device,
                &config.weights_initializer,
                &config.biases_initializer,
            );
            let header = ConvHeader::build(
                &factory,
                &device,
                config.header_type,
                config.data_format,
                config.history_length,
                config.observation_dims,
                config.hidden_activation,
            )?;
            let output_hidden_sizes = config.resolved_output_hidden_sizes();
            let params = OutputStageParams {
                output_type: config.output_type,
                output_size: config.output_size,
                output_hidden_sizes: &output_hidden_sizes,
                value_hidden_sizes: &config.value_hidden_sizes,
                advantage_hidden_sizes: &config.advantage_hidden_sizes,
                hidden_activation: config.output_hidden_activation,
                output_activation: config.output_activation,
            };
            let output = OutputStage::build(&factory, feature_dim, &params)?;
            (header, output)
        };

        let weights = WeightMap::from_varmap(&varmap)?;
        let global_sync = match global {
            Some(global) => Some(GlobalSync::new(global.weights(), &weights)?),
            None => None,
        };
        info!(
            "Built {} ({} header, {} output, {}, {} parameters)",
            config.name,
            config.header_type,
            config.output_type,
            config.data_format,
            weights.num_elements()
        );

        Ok(Self {
            config,
            device,
            varmap,
            weights,
            header,
            output,
            global_sync,
        })
    }

    /// Configuration of the network.
    pub fn config(&self) -> &CnnConfig {
        &self.config
    }

    /// Device of the variables.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Convolutional header.
    pub fn header(&self) -> &ConvHeader {
        &self.header
    }

    /// Output stage.
    pub fn output_stage(&self) -> &OutputStage {
        &self.output
    }

    /// Shape of one observation.
    pub fn input_shape(&self) -> [usize; 3] {
        self.header.input_shape()
    }

    /// Number of outputs.
    pub fn output_size(&self) -> usize {
        self.config.output_size
    }

    /// Computes action values for a batch of observations.
    pub fn forward(&self, obs: &Tensor) -> Result<QValues> {
        let features = self.header.forward(obs)?;
        self.output.forward(&features)
    }
}

impl ModelBase for Cnn {
    fn model_name(&self) -> &str {
        &self.config.name
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn weights(&self) -> &WeightMap {
        &self.weights
    }

    fn global_sync(&self) -> Option<&GlobalSync> {
        self.global_sync.as_ref()
    }
}
