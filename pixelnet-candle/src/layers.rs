//! Layers whose parameters are registered in a [`VarMap`] under flat keys.
//!
//! A layer named `l1` owns the variables `l1_w` and `l1_b`. Convolution weights
//! have the shape `[out, in, k, k]`, linear weights `[out, in]`.
use crate::util::{activate, lock_vars};
use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Init, Linear, Module, VarMap};
use pixelnet_core::{Activation, Initializer};

/// Key of the weight of a layer.
pub fn weight_key(layer: &str) -> String {
    format!("{}_w", layer)
}

/// Key of the bias of a layer.
pub fn bias_key(layer: &str) -> String {
    format!("{}_b", layer)
}

/// Creates the parameters of layers in a [`VarMap`].
pub struct ParamFactory<'a> {
    varmap: &'a VarMap,
    device: &'a Device,
    weights_initializer: &'a Initializer,
    biases_initializer: &'a Initializer,
}

impl<'a> ParamFactory<'a> {
    /// Creates a factory registering parameters in `varmap`.
    pub fn new(
        varmap: &'a VarMap,
        device: &'a Device,
        weights_initializer: &'a Initializer,
        biases_initializer: &'a Initializer,
    ) -> Self {
        Self {
            varmap,
            device,
            weights_initializer,
            biases_initializer,
        }
    }

    /// Creates a variable and returns a tensor sharing its storage.
    fn param(
        &self,
        key: &str,
        shape: &[usize],
        init: &Initializer,
        fan_in: usize,
        fan_out: usize,
    ) -> Result<Tensor> {
        if lock_vars(self.varmap)?.contains_key(key) {
            bail!("parameter {} is already defined", key);
        }

        let candle_init = match init {
            Initializer::TruncatedNormal { .. } | Initializer::Zeros => Init::Const(0.),
            Initializer::Constant { value } => Init::Const(*value),
            Initializer::Normal { mean, stdev } => Init::Randn {
                mean: *mean,
                stdev: *stdev,
            },
            Initializer::Uniform { lo, up } => Init::Uniform { lo: *lo, up: *up },
            Initializer::XavierUniform => {
                let bound = Initializer::xavier_bound(fan_in, fan_out);
                Init::Uniform {
                    lo: -bound,
                    up: bound,
                }
            }
        };
        let t = self
            .varmap
            .get(shape, key, candle_init, DType::F32, self.device)?;

        if let Initializer::TruncatedNormal { mean, stdev } = init {
            let values = truncated_normal(*mean as f32, *stdev as f32, shape, self.device)?;
            if let Some(var) = lock_vars(self.varmap)?.get(key) {
                var.set(&values)?;
            }
        }

        Ok(t)
    }

    /// Creates a 2D convolution with VALID padding.
    pub fn conv2d(
        &self,
        name: &str,
        in_channels: usize,
        filters: usize,
        kernel: usize,
        stride: usize,
        activation: Activation,
    ) -> Result<Conv2dLayer> {
        let fan_in = in_channels * kernel * kernel;
        let fan_out = filters * kernel * kernel;
        let w = self.param(
            &weight_key(name),
            &[filters, in_channels, kernel, kernel],
            self.weights_initializer,
            fan_in,
            fan_out,
        )?;
        let b = self.param(&bias_key(name), &[filters], self.biases_initializer, fan_in, fan_out)?;
        let config = Conv2dConfig {
            stride,
            ..Default::default()
        };

        Ok(Conv2dLayer {
            name: name.to_string(),
            filters,
            conv: Conv2d::new(w, Some(b), config),
            activation,
        })
    }

    /// Creates a fully connected layer.
    pub fn linear(
        &self,
        name: &str,
        in_dim: usize,
        out_dim: usize,
        activation: Option<Activation>,
    ) -> Result<LinearLayer> {
        let w = self.param(
            &weight_key(name),
            &[out_dim, in_dim],
            self.weights_initializer,
            in_dim,
            out_dim,
        )?;
        let b = self.param(&bias_key(name), &[out_dim], self.biases_initializer, in_dim, out_dim)?;

        Ok(LinearLayer {
            name: name.to_string(),
            out_dim,
            linear: Linear::new(w, Some(b)),
            activation,
        })
    }

    /// Creates a stack of fully connected layers named `<prefix>_<i>`.
    ///
    /// Returns the layers and the output dimension of the stack.
    pub fn mlp(
        &self,
        prefix: &str,
        in_dim: usize,
        sizes: &[usize],
        activation: Activation,
    ) -> Result<(Vec<LinearLayer>, usize)> {
        let mut layers = Vec::with_capacity(sizes.len());
        let mut in_dim = in_dim;

        for (i, &out_dim) in sizes.iter().enumerate() {
            layers.push(self.linear(&format!("{}_{}", prefix, i), in_dim, out_dim, Some(activation))?);
            in_dim = out_dim;
        }

        Ok((layers, in_dim))
    }
}

const MAX_RESAMPLING: usize = 100;

/// Normal samples restricted to `mean ± 2 stdev`.
///
/// Samples outside the interval are drawn again until none is left.
fn truncated_normal(mean: f32, stdev: f32, shape: &[usize], device: &Device) -> Result<Tensor> {
    let (lo, up) = (mean - 2.0 * stdev, mean + 2.0 * stdev);
    let mut values = Tensor::randn(mean, stdev, shape, device)?;

    for _ in 0..MAX_RESAMPLING {
        let inside = (values.ge(lo)? * values.le(up)?)?;
        let n_outside = values.elem_count()
            - inside.to_dtype(DType::U32)?.sum_all()?.to_scalar::<u32>()? as usize;
        if n_outside == 0 {
            return Ok(values);
        }
        let fresh = Tensor::randn(mean, stdev, shape, device)?;
        values = inside.where_cond(&values, &fresh)?;
    }

    bail!(
        "truncated normal sampling did not converge (mean {}, stdev {})",
        mean,
        stdev
    )
}

/// 2D convolution followed by an activation.
pub struct Conv2dLayer {
    name: String,
    filters: usize,
    conv: Conv2d,
    activation: Activation,
}

impl Conv2dLayer {
    /// Name of the layer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of output channels.
    pub fn filters(&self) -> usize {
        self.filters
    }

    /// Applies the layer to a channel-first batch.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        Ok(activate(&xs, self.activation)?)
    }
}

/// Fully connected layer followed by an optional activation.
pub struct LinearLayer {
    name: String,
    out_dim: usize,
    linear: Linear,
    activation: Option<Activation>,
}

impl LinearLayer {
    /// Name of the layer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of output units.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Applies the layer to a `[N, in]` batch.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.linear.forward(xs)?;
        match self.activation {
            None => Ok(xs),
            Some(activation) => Ok(activate(&xs, activation)?),
        }
    }
}

/// Applies a stack of layers in order.
pub fn forward_stack(layers: &[LinearLayer], xs: &Tensor) -> Result<Tensor> {
    let mut xs = xs.clone();
    for layer in layers {
        xs = layer.forward(&xs)?;
    }
    Ok(xs)
}

#[cfg(test)]
mod test {
    use super::*;

    fn factory_test<F>(weights: Initializer, biases: Initializer, f: F) -> Result<()>
    where
        F: FnOnce(&ParamFactory, &VarMap) -> Result<()>,
    {
        let varmap = VarMap::new();
        let device = Device::Cpu;
        let factory = ParamFactory::new(&varmap, &device, &weights, &biases);
        f(&factory, &varmap)
    }

    #[test]
    fn test_conv2d_params() -> Result<()> {
        factory_test(Initializer::XavierUniform, Initializer::Zeros, |factory, varmap| {
            let conv = factory.conv2d("l1", 4, 16, 8, 4, Activation::Relu)?;
            assert_eq!(conv.name(), "l1");
            assert_eq!(conv.filters(), 16);

            let vars = lock_vars(varmap)?;
            assert_eq!(vars["l1_w"].dims(), &[16, 4, 8, 8]);
            assert_eq!(vars["l1_b"].dims(), &[16]);

            let bound = Initializer::xavier_bound(4 * 64, 16 * 64) as f32;
            let w_max = vars["l1_w"].abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?;
            assert!(w_max <= bound);
            let b_max = vars["l1_b"].abs()?.max(0)?.to_scalar::<f32>()?;
            assert_eq!(b_max, 0.0);
            Ok(())
        })
    }

    #[test]
    fn test_conv2d_output_shape() -> Result<()> {
        factory_test(Initializer::XavierUniform, Initializer::Zeros, |factory, _| {
            let conv = factory.conv2d("l1", 4, 16, 8, 4, Activation::Relu)?;
            let xs = Tensor::ones((2, 4, 36, 36), DType::F32, &Device::Cpu)?;
            let ys = conv.forward(&xs)?;
            assert_eq!(ys.dims(), &[2, 16, 8, 8]);
            Ok(())
        })
    }

    #[test]
    fn test_truncated_normal() -> Result<()> {
        let init = Initializer::TruncatedNormal {
            mean: 0.0,
            stdev: 0.02,
        };
        factory_test(init, Initializer::Constant { value: 0.1 }, |factory, varmap| {
            factory.linear("l4", 1000, 64, None)?;

            let vars = lock_vars(varmap)?;
            let w = vars["l4_w"].flatten_all()?.to_vec1::<f32>()?;
            assert!(w.iter().all(|v| v.abs() <= 0.04));
            assert!(w.iter().any(|&v| v != 0.0));

            // Resampled, not clipped: the bounds carry no mass.
            let near_bounds = w.iter().filter(|v| v.abs() > 0.0398).count();
            assert!(near_bounds < w.len() / 100, "{} samples near the bounds", near_bounds);
            let b = vars["l4_b"].to_vec1::<f32>()?;
            assert!(b.iter().all(|&v| (v - 0.1).abs() < 1e-6));
            Ok(())
        })
    }

    #[test]
    fn test_duplicated_name() -> Result<()> {
        factory_test(Initializer::Zeros, Initializer::Zeros, |factory, _| {
            factory.linear("p", 8, 4, None)?;
            assert!(factory.linear("p", 8, 4, None).is_err());
            Ok(())
        })
    }

    #[test]
    fn test_mlp() -> Result<()> {
        factory_test(Initializer::XavierUniform, Initializer::Zeros, |factory, varmap| {
            let (layers, out_dim) = factory.mlp("val_hid", 10, &[32, 16], Activation::Relu)?;
            assert_eq!(layers.len(), 2);
            assert_eq!(out_dim, 16);
            assert_eq!(layers[1].name(), "val_hid_1");
            assert!(lock_vars(varmap)?.contains_key("val_hid_0_w"));

            let xs = Tensor::ones((3, 10), DType::F32, &Device::Cpu)?;
            let ys = forward_stack(&layers, &xs)?;
            assert_eq!(ys.dims(), &[3, 16]);

            let (empty, out_dim) = factory.mlp("adv_hid", 10, &[], Activation::Relu)?;
            assert!(empty.is_empty());
            assert_eq!(out_dim, 10);
            Ok(())
        })
    }
}
