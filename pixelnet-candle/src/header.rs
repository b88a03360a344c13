//! Convolutional header shared by [`Network`](crate::Network) and [`Cnn`](crate::Cnn).
//!
//! The input is cast to `f32` and scaled by 1 / 255 to normalize pixel intensities.
//! Channel-last batches are transposed to channel-first before the first convolution.
use crate::layers::{Conv2dLayer, ParamFactory};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use pixelnet_core::{Activation, DataFormat, HeaderType, ObservationDims, PixelNetError};

/// Stack of convolutions selected by a [`HeaderType`].
pub struct ConvHeader {
    header_type: HeaderType,
    data_format: DataFormat,
    input_shape: [usize; 3],
    feature_dim: usize,
    device: Device,
    layers: Vec<Conv2dLayer>,
}

impl ConvHeader {
    /// Builds the convolutions of the preset.
    pub fn build(
        factory: &ParamFactory,
        device: &Device,
        header_type: HeaderType,
        data_format: DataFormat,
        history_length: usize,
        dims: ObservationDims,
        activation: Activation,
    ) -> Result<Self> {
        let feature_dim = header_type.feature_dim(dims)?;
        let mut in_channels = history_length;
        let mut layers = vec![];

        for conv in header_type.conv_specs() {
            layers.push(factory.conv2d(
                conv.name,
                in_channels,
                conv.filters,
                conv.kernel,
                conv.stride,
                activation,
            )?);
            in_channels = conv.filters;
        }

        Ok(Self {
            header_type,
            data_format,
            input_shape: data_format.input_shape(history_length, dims.height, dims.width),
            feature_dim,
            device: device.clone(),
            layers,
        })
    }

    /// Shape of one observation in the configured data format.
    pub fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    /// Number of features produced by [`ConvHeader::forward`].
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// The preset.
    pub fn header_type(&self) -> HeaderType {
        self.header_type
    }

    /// Convolutional layers in order.
    pub fn layers(&self) -> &[Conv2dLayer] {
        &self.layers
    }

    /// Checks the shape of an observation batch.
    pub fn check_input(&self, obs: &Tensor) -> Result<(), PixelNetError> {
        let dims = obs.dims();
        if dims.len() != 4 || dims[1..] != self.input_shape[..] {
            return Err(PixelNetError::InputShapeMismatch {
                expected: self.input_shape.to_vec(),
                actual: dims.to_vec(),
            });
        }
        Ok(())
    }

    /// Normalized channel-first input.
    pub fn normalize(&self, obs: &Tensor) -> Result<Tensor> {
        self.check_input(obs)?;
        let xs = obs
            .to_device(&self.device)?
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?;

        match self.data_format {
            DataFormat::Nchw => Ok(xs),
            DataFormat::Nhwc => Ok(xs.permute((0, 3, 1, 2))?.contiguous()?),
        }
    }

    /// Outputs of every convolutional layer, channel-first.
    pub fn forward_layers(&self, obs: &Tensor) -> Result<Vec<Tensor>> {
        let mut xs = self.normalize(obs)?;
        let mut outputs = Vec::with_capacity(self.layers.len());

        for layer in self.layers.iter() {
            xs = layer.forward(&xs)?;
            outputs.push(xs.clone());
        }

        Ok(outputs)
    }

    /// Flattened output of the last convolutional layer, `[N, feature_dim]`.
    pub fn forward(&self, obs: &Tensor) -> Result<Tensor> {
        let mut xs = self.normalize(obs)?;
        for layer in self.layers.iter() {
            xs = layer.forward(&xs)?;
        }
        Ok(xs.flatten_from(1)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_nn::VarMap;
    use pixelnet_core::Initializer;

    fn header(header_type: HeaderType, data_format: DataFormat) -> Result<(ConvHeader, VarMap)> {
        let varmap = VarMap::new();
        let device = Device::Cpu;
        let (w, b) = (Initializer::XavierUniform, Initializer::Zeros);
        let factory = ParamFactory::new(&varmap, &device, &w, &b);
        let header = ConvHeader::build(
            &factory,
            &device,
            header_type,
            data_format,
            4,
            ObservationDims::new(36, 36),
            Activation::Relu,
        )?;
        Ok((header, varmap))
    }

    #[test]
    fn test_nips_layers() -> Result<()> {
        let (header, varmap) = header(HeaderType::Nips, DataFormat::Nchw)?;
        assert_eq!(header.layers().len(), 2);
        assert_eq!(varmap.all_vars().len(), 4);

        let obs = Tensor::zeros((2, 4, 36, 36), DType::U8, &Device::Cpu)?;
        let outputs = header.forward_layers(&obs)?;
        assert_eq!(outputs[0].dims(), &[2, 16, 8, 8]);
        assert_eq!(outputs[1].dims(), &[2, 32, 3, 3]);
        assert_eq!(header.forward(&obs)?.dims(), &[2, header.feature_dim()]);
        assert_eq!(header.feature_dim(), 288);
        Ok(())
    }

    #[test]
    fn test_nature_layers_channel_last() -> Result<()> {
        let (header, varmap) = header(HeaderType::Nature, DataFormat::Nhwc)?;
        assert_eq!(header.layers().len(), 3);
        assert_eq!(varmap.all_vars().len(), 6);
        assert_eq!(header.input_shape(), [36, 36, 4]);

        let obs = Tensor::ones((3, 36, 36, 4), DType::F32, &Device::Cpu)?;
        assert_eq!(header.forward(&obs)?.dims(), &[3, 64]);
        Ok(())
    }

    #[test]
    fn test_wrong_layout_is_rejected() -> Result<()> {
        let (header, _) = header(HeaderType::Nips, DataFormat::Nhwc)?;
        let obs = Tensor::zeros((1, 4, 36, 36), DType::F32, &Device::Cpu)?;
        let err = header.forward(&obs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PixelNetError>(),
            Some(PixelNetError::InputShapeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_pixels_are_scaled() -> Result<()> {
        let (header, _) = header(HeaderType::Nips, DataFormat::Nchw)?;
        let obs = Tensor::full(255u8, (1, 4, 36, 36), &Device::Cpu)?;
        let xs = header.normalize(&obs)?;
        let max = xs.flatten_all()?.max(0)?.to_scalar::<f32>()?;
        let min = xs.flatten_all()?.min(0)?.to_scalar::<f32>()?;
        assert!((max - 1.0).abs() < 1e-6);
        assert!((min - 1.0).abs() < 1e-6);
        Ok(())
    }
}
