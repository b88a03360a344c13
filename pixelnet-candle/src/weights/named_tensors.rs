use super::WeightMap;
use anyhow::Result;
use candle_core::{Device, Tensor};
use pixelnet_core::SyncPlan;
use std::collections::BTreeMap;

/// Named tensors to send model parameters using a channel.
///
/// The tensors are detached copies on the CPU and do not share storage with the
/// network they were taken from.
pub struct NamedTensors {
    pub named_tensors: BTreeMap<String, Tensor>,
}

impl NamedTensors {
    /// Copies the values of a [`WeightMap`] to the CPU.
    pub fn copy_from(weights: &WeightMap) -> Result<Self> {
        let mut named_tensors = BTreeMap::new();
        for (k, v) in weights.iter() {
            let t = v.as_tensor().detach().to_device(&Device::Cpu)?.copy()?;
            named_tensors.insert(k.to_string(), t);
        }
        Ok(Self { named_tensors })
    }

    /// Copies the named tensors into a [`WeightMap`] with the same keys and shapes.
    pub fn copy_to(&self, weights: &WeightMap) -> Result<()> {
        let shapes = self
            .named_tensors
            .iter()
            .map(|(k, v)| (k.clone(), v.dims().to_vec()))
            .collect();
        let plan = SyncPlan::new(&shapes, &weights.shapes())?;
        weights.assign(&self.named_tensors, &plan)
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.named_tensors.len()
    }

    /// Returns `true` if there is no tensor.
    pub fn is_empty(&self) -> bool {
        self.named_tensors.is_empty()
    }
}

impl Clone for NamedTensors {
    fn clone(&self) -> Self {
        Self {
            named_tensors: self.named_tensors.clone(),
        }
    }
}
