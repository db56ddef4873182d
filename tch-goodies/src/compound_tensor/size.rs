use super::ensure_params_layout;
use crate::common::*;

/// Unchecked tensor of batched sizes.
#[derive(Debug, TensorLike)]
pub struct SizeTensorUnchecked {
    pub h: Tensor,
    pub w: Tensor,
}

/// Checked tensor of batched sizes in shape `[.., 1]`.
#[derive(Debug, TensorLike, Getters)]
pub struct SizeTensor {
    #[get = "pub"]
    pub(super) h: Tensor,
    #[get = "pub"]
    pub(super) w: Tensor,
}

impl SizeTensor {
    pub fn device(&self) -> Device {
        self.h.device()
    }

    /// Squared length of the box diagonal.
    pub fn diagonal_square(&self) -> Tensor {
        self.h.square() + self.w.square()
    }
}

impl TryFrom<SizeTensorUnchecked> for SizeTensor {
    type Error = Error;

    fn try_from(from: SizeTensorUnchecked) -> Result<Self, Self::Error> {
        let SizeTensorUnchecked { h, w } = from;
        ensure_params_layout(&[&h, &w])?;
        Ok(Self { h, w })
    }
}

impl From<SizeTensor> for SizeTensorUnchecked {
    fn from(from: SizeTensor) -> Self {
        let SizeTensor { h, w } = from;
        Self { h, w }
    }
}
