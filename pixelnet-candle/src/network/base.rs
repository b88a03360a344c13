use super::{policy, NetworkConfig};
use crate::{
    device,
    header::ConvHeader,
    layers::{LinearLayer, ParamFactory},
    model::ModelBase,
    weights::{GlobalSync, WeightMap},
};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use candle_nn::{ops, VarMap};
use log::info;
use pixelnet_core::DeploymentTarget;
use rand::Rng;

/// Outputs of [`Network::forward`].
pub struct PolicyValue {
    /// Output of the fully connected layer, `[N, hidden]`.
    pub hidden: Tensor,

    /// Unnormalized action scores, `[N, n_actions]`.
    pub policy_logits: Tensor,

    /// Action probabilities, `[N, n_actions]`.
    pub policy: Tensor,

    /// Log of the action probabilities, `[N, n_actions]`.
    pub log_policy: Tensor,

    /// Entropy of the policy, `[N]`.
    pub policy_entropy: Tensor,

    /// State value estimate, `[N]`.
    pub value: Tensor,
}

/// Per-sample loss terms of the actor-critic objective, each `[N]`.
pub struct A3cLoss {
    /// `-(log pi(a) * (R - V)) - beta * entropy`.
    pub policy_loss: Tensor,

    /// `(R - V)^2 / 2`.
    pub value_loss: Tensor,

    /// Sum of the policy and value losses.
    pub total_loss: Tensor,
}

impl A3cLoss {
    /// Total loss summed over the batch, the scalar to differentiate.
    pub fn total(&self) -> Result<Tensor> {
        Ok(self.total_loss.sum_all()?)
    }
}

/// Actor-critic network with a convolutional header, for A3C style agents.
///
/// Layers are named `l1`..`l3` (convolutions), `l4` (fully connected), `p` (policy
/// head) and `q` (value head).
pub struct Network {
    config: NetworkConfig,
    device: Device,
    varmap: VarMap,
    weights: WeightMap,
    header: ConvHeader,
    l4: LinearLayer,
    policy_head: LinearLayer,
    value_head: LinearLayer,
    global_sync: Option<GlobalSync>,
}

impl Network {
    /// Builds the network.
    ///
    /// When `global` is given, the copy of its weights into this network is planned
    /// here, so [`ModelBase::copy_from_global`] cannot fail on mismatched keys later.
    pub fn build(
        config: NetworkConfig,
        target: DeploymentTarget,
        global: Option<&Network>,
    ) -> Result<Self> {
        let feature_dim = config.validate()?;
        let device = device(target)?;
        let varmap = VarMap::new();

        let (header, l4, policy_head, value_head) = {
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
                config.activation,
            )?;
            let hidden_size = config.header_type.hidden_size();
            let l4 = factory.linear("l4", feature_dim, hidden_size, Some(config.activation))?;
            let p = factory.linear("p", hidden_size, config.action_size, None)?;
            let q = factory.linear("q", hidden_size, 1, None)?;
            (header, l4, p, q)
        };

        let weights = WeightMap::from_varmap(&varmap)?;
        let global_sync = match global {
            Some(global) => Some(GlobalSync::new(global.weights(), &weights)?),
            None => None,
        };
        info!(
            "Built {} ({} header, {}, {} parameters)",
            config.name,
            config.header_type,
            config.data_format,
            weights.num_elements()
        );

        Ok(Self {
            config,
            device,
            varmap,
            weights,
            header,
            l4,
            policy_head,
            value_head,
            global_sync,
        })
    }

    /// Configuration of the network.
    pub fn config(&self) -> &NetworkConfig {
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

    /// The fully connected layer following the convolutions.
    pub fn hidden_layer(&self) -> &LinearLayer {
        &self.l4
    }

    /// Shape of one observation.
    pub fn input_shape(&self) -> [usize; 3] {
        self.header.input_shape()
    }

    /// Number of actions.
    pub fn action_size(&self) -> usize {
        self.config.action_size
    }

    /// Computes the policy and value heads for a batch of observations.
    pub fn forward(&self, obs: &Tensor) -> Result<PolicyValue> {
        let features = self.header.forward(obs)?;
        let hidden = self.l4.forward(&features)?;

        let policy_logits = self.policy_head.forward(&hidden)?;
        let policy = ops::softmax(&policy_logits, D::Minus1)?;
        let log_policy = ops::log_softmax(&policy_logits, D::Minus1)?;
        let policy_entropy = policy::entropy(&policy, &log_policy)?;
        let value = self.value_head.forward(&hidden)?.squeeze(D::Minus1)?;

        Ok(PolicyValue {
            hidden,
            policy_logits,
            policy,
            log_policy,
            policy_entropy,
            value,
        })
    }

    /// Draws one action per observation from the policy.
    pub fn sample_actions<R: Rng + ?Sized>(&self, output: &PolicyValue, rng: &mut R) -> Result<Vec<u32>> {
        policy::sample_actions(&output.policy, rng)
    }

    /// Log-probability of the given action for each observation, `[N]`.
    pub fn log_policy_of_actions(&self, output: &PolicyValue, actions: &[u32]) -> Result<Tensor> {
        policy::log_policy_of_actions(&output.log_policy, actions)
    }

    /// Loss terms for target returns `returns` (`[N]`) and the log-probabilities of
    /// the actions taken (`[N]`).
    ///
    /// The advantage `R - V` is treated as a constant in the policy loss, so the
    /// policy gradient does not flow into the value head.
    pub fn losses(
        &self,
        output: &PolicyValue,
        returns: &Tensor,
        log_policy_of_actions: &Tensor,
    ) -> Result<A3cLoss> {
        let returns = returns.to_device(&self.device)?;
        let advantage = (returns - &output.value)?;

        let policy_loss = ((log_policy_of_actions * advantage.detach())?.neg()?
            - output.policy_entropy.affine(self.config.entropy_beta, 0.0)?)?;
        let value_loss = (advantage.sqr()? * 0.5)?;
        let total_loss = (&policy_loss + &value_loss)?;

        Ok(A3cLoss {
            policy_loss,
            value_loss,
            total_loss,
        })
    }
}

impl ModelBase for Network {
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
