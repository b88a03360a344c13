//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{Tensor, Var};
use candle_nn::VarMap;
use pixelnet_core::Activation;
use std::{collections::HashMap, sync::MutexGuard};

/// Applies an activation function.
pub fn activate(xs: &Tensor, activation: Activation) -> candle_core::Result<Tensor> {
    match activation {
        Activation::Relu => xs.relu(),
        Activation::Tanh => xs.tanh(),
        Activation::Sigmoid => candle_nn::ops::sigmoid(xs),
        Activation::Elu => xs.elu(1.0),
        Activation::Identity => Ok(xs.clone()),
    }
}

/// Locks the variables of a [`VarMap`].
pub(crate) fn lock_vars(varmap: &VarMap) -> Result<MutexGuard<'_, HashMap<String, Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("the variable map is poisoned"))
}

/// Returns the largest absolute element-wise difference of two tensors.
pub fn max_abs_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
    let b = b.to_device(a.device())?;
    Ok((a - b)?
        .abs()?
        .flatten_all()?
        .max(0)?
        .to_dtype(candle_core::DType::F32)?
        .to_scalar::<f32>()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_activate() -> Result<()> {
        let xs = Tensor::new(&[-1f32, 0.0, 2.0], &Device::Cpu)?;

        let relu = activate(&xs, Activation::Relu)?.to_vec1::<f32>()?;
        assert_eq!(relu, vec![0.0, 0.0, 2.0]);

        let id = activate(&xs, Activation::Identity)?.to_vec1::<f32>()?;
        assert_eq!(id, vec![-1.0, 0.0, 2.0]);

        let sig = activate(&xs, Activation::Sigmoid)?.to_vec1::<f32>()?;
        assert!((sig[1] - 0.5).abs() < 1e-6);

        let elu = activate(&xs, Activation::Elu)?.to_vec1::<f32>()?;
        assert!((elu[0] - ((-1f32).exp() - 1.0)).abs() < 1e-6);
        assert_eq!(elu[2], 2.0);
        Ok(())
    }

    #[test]
    fn test_max_abs_diff() -> Result<()> {
        let a = Tensor::new(&[[1f32, 2.0], [3.0, 4.0]], &Device::Cpu)?;
        let b = Tensor::new(&[[1f32, 2.5], [3.0, 3.0]], &Device::Cpu)?;
        assert_eq!(max_abs_diff(&a, &b)?, 1.0);
        assert_eq!(max_abs_diff(&a, &a)?, 0.0);
        Ok(())
    }
}
