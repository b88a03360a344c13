//! Optimizers updating a global network.
use crate::weights::{GlobalSync, WeightMap};
use anyhow::Result;
use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use log::{info, trace};
use serde::{Deserialize, Serialize};

/// Optimizer applied to the global network.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW with decoupled weight decay.
    AdamW {
        lr: f64,
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam with the default moments of `candle-optimisers`.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 7e-4 }
    }
}

impl OptimizerConfig {
    /// AdamW with the default moments and weight decay of `candle-nn`.
    pub fn adamw(lr: f64) -> Self {
        Self::AdamW {
            lr,
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
            weight_decay: default_weight_decay(),
        }
    }

    /// Overrides the learning rate.
    pub fn learning_rate(mut self, v: f64) -> Self {
        match &mut self {
            Self::AdamW { lr, .. } | Self::Adam { lr } => *lr = v,
        }
        self
    }

    /// Learning rate.
    pub fn lr(&self) -> f64 {
        match self {
            Self::AdamW { lr, .. } | Self::Adam { lr } => *lr,
        }
    }

    fn build(&self, vars: Vec<Var>) -> Result<Stepper> {
        match *self {
            Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr,
                    beta1,
                    beta2,
                    eps,
                    weight_decay,
                };
                Ok(Stepper::AdamW(AdamW::new(vars, params)?))
            }
            Self::Adam { lr } => {
                let params = ParamsAdam {
                    lr,
                    ..ParamsAdam::default()
                };
                Ok(Stepper::Adam(Adam::new(vars, params)?))
            }
        }
    }
}

enum Stepper {
    AdamW(AdamW),
    Adam(Adam),
}

impl Stepper {
    fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::AdamW(opt) => Ok(opt.step(grads)?),
            Self::Adam(opt) => Ok(opt.step(grads)?),
        }
    }
}

/// Updates the parameters of a global network with gradients computed on a local copy.
///
/// The loss is differentiated with respect to the local variables. Each gradient is
/// then attached to the global variable of the same key and the optimizer, which owns
/// the global variables, takes a step. The local network is not modified.
pub struct GlobalOptimizer {
    sync: GlobalSync,
    local: WeightMap,
    stepper: Stepper,
    n_steps: usize,
}

impl GlobalOptimizer {
    /// Creates an optimizer for the global side of `sync`.
    ///
    /// `local` must be the weight map `sync` copies into.
    pub fn new(config: &OptimizerConfig, sync: &GlobalSync, local: &WeightMap) -> Result<Self> {
        let vars = sync.global().iter().map(|(_, v)| v.clone()).collect();
        let stepper = config.build(vars)?;
        info!("Optimizer of global network: {:?}", config);

        Ok(Self {
            sync: sync.clone(),
            local: local.clone(),
            stepper,
            n_steps: 0,
        })
    }

    /// Number of steps taken so far.
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Backpropagates `loss` through the local network and updates the global network.
    pub fn step(&mut self, loss: &Tensor) -> Result<()> {
        let mut grads = loss.backward()?;

        for key in self.sync.plan().keys() {
            let (local, global) = match (self.local.get(key), self.sync.global().get(key)) {
                (Some(l), Some(g)) => (l, g),
                _ => continue,
            };
            if let Some(grad) = grads.remove(local.as_tensor()) {
                grads.insert(global.as_tensor(), grad.to_device(global.device())?);
                trace!("Gradient of {} moved to global network", key);
            }
        }

        self.stepper.step(&grads)?;
        self.n_steps += 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{model::ModelBase, util::max_abs_diff, Network, NetworkConfig};
    use candle_core::Device;
    use pixelnet_core::{DataFormat, DeploymentTarget, HeaderType};

    fn network(global: Option<&Network>) -> Result<Network> {
        let config = NetworkConfig::default()
            .header_type(HeaderType::Nips)
            .data_format(DataFormat::Nchw)
            .history_length(2)
            .observation_dims(36, 36)
            .action_size(3);
        Network::build(config, DeploymentTarget::Cpu, global)
    }

    fn snapshot(weights: &WeightMap) -> Result<Vec<(String, Tensor)>> {
        weights
            .iter()
            .map(|(k, v)| -> Result<(String, Tensor)> { Ok((k.to_string(), v.as_tensor().copy()?)) })
            .collect()
    }

    fn check_global_step(config: &OptimizerConfig) -> Result<()> {
        let global = network(None)?;
        let local = network(Some(&global))?;
        local.copy_from_global()?;

        let sync = local.global_sync().unwrap();
        let mut opt = GlobalOptimizer::new(config, sync, local.weights())?;

        let global_before = snapshot(global.weights())?;
        let local_before = snapshot(local.weights())?;

        let obs = Tensor::rand(0f32, 255f32, (4, 2, 36, 36), &Device::Cpu)?;
        let out = local.forward(&obs)?;
        let log_pi = local.log_policy_of_actions(&out, &[0, 1, 2, 0])?;
        let returns = Tensor::new(&[1f32, -1.0, 0.5, 2.0], &Device::Cpu)?;
        let loss = local.losses(&out, &returns, &log_pi)?.total()?;
        opt.step(&loss)?;
        assert_eq!(opt.n_steps(), 1);

        for (key, before) in local_before.iter() {
            let after = local.weights().get(key).unwrap();
            assert_eq!(max_abs_diff(after.as_tensor(), before)?, 0.0, "{}", key);
        }
        // Heads receive gradients from every sample.
        for key in ["p_w", "q_w"].iter() {
            let before = &global_before.iter().find(|(k, _)| k.as_str() == *key).unwrap().1;
            let after = global.weights().get(key).unwrap();
            assert!(max_abs_diff(after.as_tensor(), before)? > 0.0, "{}", key);
        }
        Ok(())
    }

    #[test]
    fn test_adam_updates_global_only() -> Result<()> {
        check_global_step(&OptimizerConfig::default().learning_rate(1e-2))
    }

    #[test]
    fn test_adamw_updates_global_only() -> Result<()> {
        check_global_step(&OptimizerConfig::adamw(1e-2))
    }

    #[test]
    fn test_learning_rate_override() {
        let config = OptimizerConfig::AdamW {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
        .learning_rate(5e-4);
        assert!(matches!(config, OptimizerConfig::AdamW { lr, .. } if lr == 5e-4));
        assert_eq!(OptimizerConfig::adamw(1e-3).learning_rate(2e-3).lr(), 2e-3);
        assert_eq!(
            OptimizerConfig::default().learning_rate(1e-2),
            OptimizerConfig::Adam { lr: 1e-2 }
        );
    }

    #[test]
    fn test_serde_optimizer_config() -> Result<()> {
        let config: OptimizerConfig = serde_yaml::from_str("AdamW:\n  lr: 0.001\n")?;
        assert_eq!(config, OptimizerConfig::adamw(1e-3));
        Ok(())
    }
}
