//! Shape arithmetic of the convolutional presets.
use crate::{error::PixelNetError, DataFormat, HeaderType};
use serde::{Deserialize, Serialize};

/// Spatial size of one observation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationDims {
    /// Number of rows.
    pub height: usize,

    /// Number of columns.
    pub width: usize,
}

impl ObservationDims {
    /// Creates observation dimensions.
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }
}

impl Default for ObservationDims {
    fn default() -> Self {
        Self::new(84, 84)
    }
}

/// A convolutional layer of a preset, VALID padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSpec {
    /// Layer name, also the prefix of its parameter keys.
    pub name: &'static str,

    /// Number of output channels.
    pub filters: usize,

    /// Side of the square kernel.
    pub kernel: usize,

    /// Stride in both spatial directions.
    pub stride: usize,
}

impl ConvSpec {
    /// Output size along one spatial axis, `None` if the input is smaller than the kernel.
    pub fn out_size(&self, in_size: usize) -> Option<usize> {
        if in_size < self.kernel {
            None
        } else {
            Some((in_size - self.kernel) / self.stride + 1)
        }
    }
}

const NATURE: [ConvSpec; 3] = [
    ConvSpec { name: "l1", filters: 32, kernel: 8, stride: 4 },
    ConvSpec { name: "l2", filters: 64, kernel: 4, stride: 2 },
    ConvSpec { name: "l3", filters: 64, kernel: 3, stride: 1 },
];

const NIPS: [ConvSpec; 2] = [
    ConvSpec { name: "l1", filters: 16, kernel: 8, stride: 4 },
    ConvSpec { name: "l2", filters: 32, kernel: 4, stride: 2 },
];

impl HeaderType {
    /// Convolutional layers of the preset, in order.
    pub fn conv_specs(&self) -> &'static [ConvSpec] {
        match self {
            Self::Nature => &NATURE,
            Self::Nips => &NIPS,
        }
    }

    /// Width of the fully connected layer following the convolutions.
    pub fn hidden_size(&self) -> usize {
        match self {
            Self::Nature => 512,
            Self::Nips => 256,
        }
    }

    /// Shapes `[C, H, W]` of the outputs of every convolutional layer.
    pub fn conv_out_shapes(&self, dims: ObservationDims) -> Result<Vec<[usize; 3]>, PixelNetError> {
        let (mut h, mut w) = (dims.height, dims.width);
        let mut shapes = Vec::with_capacity(self.conv_specs().len());

        for spec in self.conv_specs() {
            h = spec.out_size(h).ok_or_else(|| too_small(self, spec, dims))?;
            w = spec.out_size(w).ok_or_else(|| too_small(self, spec, dims))?;
            shapes.push([spec.filters, h, w]);
        }

        Ok(shapes)
    }

    /// Number of features after flattening the output of the last convolution.
    pub fn feature_dim(&self, dims: ObservationDims) -> Result<usize, PixelNetError> {
        let shapes = self.conv_out_shapes(dims)?;
        Ok(shapes.last().map(|[c, h, w]| c * h * w).unwrap_or(0))
    }
}

fn too_small(header: &HeaderType, spec: &ConvSpec, dims: ObservationDims) -> PixelNetError {
    PixelNetError::InvalidConfig(format!(
        "observation {}x{} is too small for layer {} of the {} header",
        dims.height, dims.width, spec.name, header
    ))
}

/// Checks the sizes shared by every network configuration.
///
/// Returns the number of features produced by the convolutional header.
pub fn validate_input(
    data_format: DataFormat,
    header_type: HeaderType,
    history_length: usize,
    dims: ObservationDims,
) -> Result<usize, PixelNetError> {
    if history_length == 0 {
        return Err(PixelNetError::InvalidConfig(
            "history_length must be positive".to_string(),
        ));
    }
    if dims.height == 0 || dims.width == 0 {
        return Err(PixelNetError::InvalidConfig(format!(
            "observation dims must be positive, got {}x{} ({})",
            dims.height, dims.width, data_format
        )));
    }
    header_type.feature_dim(dims)
}

/// Checks a list of hidden layer sizes.
pub fn validate_hidden_sizes(name: &str, sizes: &[usize]) -> Result<(), PixelNetError> {
    if sizes.iter().any(|&n| n == 0) {
        return Err(PixelNetError::InvalidConfig(format!(
            "{} must not contain zero: {:?}",
            name, sizes
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_nature_feature_dim() {
        // 84 -> 20 -> 9 -> 7
        let dims = ObservationDims::new(84, 84);
        assert_eq!(HeaderType::Nature.feature_dim(dims), Ok(7 * 7 * 64));
    }

    #[test]
    fn test_nips_feature_dim() {
        // 84 -> 20 -> 9
        let dims = ObservationDims::new(84, 84);
        assert_eq!(HeaderType::Nips.feature_dim(dims), Ok(9 * 9 * 32));
        assert_eq!(HeaderType::Nips.conv_specs().len(), 2);
        assert_eq!(HeaderType::Nips.hidden_size(), 256);
        assert_eq!(HeaderType::Nature.conv_specs().len(), 3);
        assert_eq!(HeaderType::Nature.hidden_size(), 512);
    }

    #[test]
    fn test_non_square_frame() {
        let dims = ObservationDims::new(84, 36);
        let shapes = HeaderType::Nips.conv_out_shapes(dims).unwrap();
        assert_eq!(shapes, vec![[16, 20, 8], [32, 9, 3]]);
    }

    #[test]
    fn test_too_small_frame() {
        let dims = ObservationDims::new(16, 16);
        // 16 -> 3, then a 4x4 kernel does not fit
        assert!(matches!(
            HeaderType::Nips.feature_dim(dims),
            Err(PixelNetError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_input() {
        let dims = ObservationDims::new(84, 84);
        assert!(validate_input(DataFormat::Nhwc, HeaderType::Nips, 0, dims).is_err());
        assert!(validate_input(DataFormat::Nhwc, HeaderType::Nips, 4, ObservationDims::new(0, 84)).is_err());
        assert_eq!(validate_input(DataFormat::Nchw, HeaderType::Nips, 4, dims), Ok(2592));
        assert!(validate_hidden_sizes("value_hidden_sizes", &[512, 0]).is_err());
        assert!(validate_hidden_sizes("value_hidden_sizes", &[]).is_ok());
    }
}
