use super::ensure_params_layout;
use crate::common::*;

/// Unchecked tensor of batched areas.
#[derive(Debug, TensorLike)]
pub struct AreaTensorUnchecked {
    pub area: Tensor,
}

/// Checked tensor of batched areas in shape `[.., 1]`.
#[derive(Debug, TensorLike, Getters)]
pub struct AreaTensor {
    #[get = "pub"]
    pub(super) area: Tensor,
}

impl AreaTensor {
    pub fn device(&self) -> Device {
        self.area.device()
    }
}

impl TryFrom<AreaTensorUnchecked> for AreaTensor {
    type Error = Error;

    fn try_from(from: AreaTensorUnchecked) -> Result<Self, Self::Error> {
        let AreaTensorUnchecked { area } = from;
        ensure_params_layout(&[&area])?;
        Ok(Self { area })
    }
}

impl From<AreaTensor> for AreaTensorUnchecked {
    fn from(from: AreaTensor) -> Self {
        let AreaTensor { area } = from;
        Self { area }
    }
}
