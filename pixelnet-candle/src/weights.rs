//! Read-only view of the parameters of a network and their synchronization.
mod named_tensors;
use crate::util::lock_vars;
use anyhow::Result;
use candle_core::{Tensor, Var};
use candle_nn::VarMap;
use log::trace;
pub use named_tensors::NamedTensors;
use pixelnet_core::SyncPlan;
use std::collections::BTreeMap;

/// Mapping from parameter key to the variable holding it.
///
/// Built once when a network is constructed. The variables share their storage with
/// the layers of the network, so assigning to them changes the network in place.
#[derive(Clone)]
pub struct WeightMap {
    vars: BTreeMap<String, Var>,
}

impl WeightMap {
    /// Collects the variables of a [`VarMap`].
    pub fn from_varmap(varmap: &VarMap) -> Result<Self> {
        let vars = lock_vars(varmap)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self { vars })
    }

    /// Returns the variable of a key.
    pub fn get(&self, key: &str) -> Option<&Var> {
        self.vars.get(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(|k| k.as_str())
    }

    /// Iterates over keys and variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Var)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if there is no parameter.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Shapes of all parameters.
    pub fn shapes(&self) -> BTreeMap<String, Vec<usize>> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.dims().to_vec()))
            .collect()
    }

    /// Total number of scalar parameters.
    pub fn num_elements(&self) -> usize {
        self.vars.values().map(|v| v.elem_count()).sum()
    }

    /// Assigns the values of `source` to these variables following `plan`.
    pub fn assign(&self, source: &BTreeMap<String, Tensor>, plan: &SyncPlan) -> Result<()> {
        for assignment in plan.assignments() {
            let key = &assignment.key;
            if let (Some(src), Some(dest)) = (source.get(key), self.vars.get(key)) {
                dest.set(&src.to_device(dest.device())?.to_dtype(dest.dtype())?)?;
                trace!("Assigned {}", key);
            }
        }
        Ok(())
    }

    /// Current values of the variables.
    pub(crate) fn tensors(&self) -> BTreeMap<String, Tensor> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.as_tensor().clone()))
            .collect()
    }
}

/// Copies the weights of a global network into a local network.
///
/// Holds handles to the variables of both networks and the validated plan, so
/// [`GlobalSync::run`] always reads the current global values.
#[derive(Clone)]
pub struct GlobalSync {
    plan: SyncPlan,
    global: WeightMap,
    local: WeightMap,
}

impl GlobalSync {
    /// Validates that both weight maps have the same keys and shapes.
    pub fn new(global: &WeightMap, local: &WeightMap) -> Result<Self> {
        let plan = SyncPlan::new(&global.shapes(), &local.shapes())?;
        Ok(Self {
            plan,
            global: global.clone(),
            local: local.clone(),
        })
    }

    /// The plan executed by [`GlobalSync::run`].
    pub fn plan(&self) -> &SyncPlan {
        &self.plan
    }

    /// Global weight map.
    pub fn global(&self) -> &WeightMap {
        &self.global
    }

    /// Assigns every global parameter to the local parameter of the same key.
    pub fn run(&self) -> Result<()> {
        self.local.assign(&self.global.tensors(), &self.plan)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::max_abs_diff;
    use candle_core::{DType, Device};
    use candle_nn::Init;

    fn varmap(names: &[(&str, &[usize])], seed: f64) -> Result<VarMap> {
        let vm = VarMap::new();
        for (name, shape) in names {
            vm.get(*shape, name, Init::Const(seed), DType::F32, &Device::Cpu)?;
        }
        Ok(vm)
    }

    #[test]
    fn test_weight_map() -> Result<()> {
        let names: &[(&str, &[usize])] = &[("p_w", &[4, 8]), ("p_b", &[4])];
        let vm = varmap(names, 1.0)?;
        let weights = WeightMap::from_varmap(&vm)?;

        assert_eq!(weights.len(), 2);
        assert_eq!(weights.keys().collect::<Vec<_>>(), vec!["p_b", "p_w"]);
        assert_eq!(weights.num_elements(), 36);
        assert_eq!(weights.shapes()["p_w"], vec![4, 8]);
        Ok(())
    }

    #[test]
    fn test_global_sync() -> Result<()> {
        let names: &[(&str, &[usize])] = &[("l1_w", &[2, 3]), ("l1_b", &[2])];
        let global_vm = varmap(names, 1.0)?;
        let local_vm = varmap(names, 0.0)?;
        let global = WeightMap::from_varmap(&global_vm)?;
        let local = WeightMap::from_varmap(&local_vm)?;

        let sync = GlobalSync::new(&global, &local)?;
        assert_eq!(sync.plan().len(), 2);

        // Values set after the sync is built are the ones copied.
        let t = Tensor::new(&[[1f32, 2., 3.], [4., 5., 6.]], &Device::Cpu)?;
        global.get("l1_w").unwrap().set(&t)?;
        sync.run()?;

        for (key, var) in local.iter() {
            let src = global.get(key).unwrap();
            assert_eq!(max_abs_diff(var.as_tensor(), src.as_tensor())?, 0.0);
        }

        // Changing the local copy does not change the global network.
        local.get("l1_b").unwrap().set(&Tensor::new(&[9f32, 9.], &Device::Cpu)?)?;
        assert_eq!(global.get("l1_b").unwrap().to_vec1::<f32>()?, vec![1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_global_sync_rejects_other_topology() -> Result<()> {
        let nature: &[(&str, &[usize])] = &[("l3_w", &[2])];
        let nips: &[(&str, &[usize])] = &[("l4_w", &[2])];
        let global = WeightMap::from_varmap(&varmap(nature, 1.0)?)?;
        let local = WeightMap::from_varmap(&varmap(nips, 1.0)?)?;
        assert!(GlobalSync::new(&global, &local).is_err());
        Ok(())
    }
}
