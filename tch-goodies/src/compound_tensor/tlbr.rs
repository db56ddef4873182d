use super::{
    area::AreaTensor, cycxhw::CyCxHWTensor, ensure_params_layout, size::SizeTensor,
};
use crate::{common::*, tensor::TensorExt as _};

/// Checked tensor of batched box parameters in TLBR format.
///
/// The parameters share one shape `[.., 1]`. Two box tensors with
/// broadcastable shapes can be compared pairwise, for example `[G, 1, 1]`
/// against `[1, M, 1]` gives `[G, M, 1]` scores.
#[derive(Debug, TensorLike, Getters)]
pub struct TlbrTensor {
    /// The top parameter in shape `[.., 1]`.
    #[get = "pub"]
    pub(crate) t: Tensor,
    /// The left parameter in shape `[.., 1]`.
    #[get = "pub"]
    pub(crate) l: Tensor,
    /// The bottom parameter in shape `[.., 1]`.
    #[get = "pub"]
    pub(crate) b: Tensor,
    /// The right parameter in shape `[.., 1]`.
    #[get = "pub"]
    pub(crate) r: Tensor,
}

/// Unchecked tensor of batched box parameters in TLBR format.
#[derive(Debug, TensorLike)]
pub struct TlbrTensorUnchecked {
    /// The top parameter in shape `[.., 1]`.
    pub t: Tensor,
    /// The left parameter in shape `[.., 1]`.
    pub l: Tensor,
    /// The bottom parameter in shape `[.., 1]`.
    pub b: Tensor,
    /// The right parameter in shape `[.., 1]`.
    pub r: Tensor,
}

impl TlbrTensor {
    /// Split a `[.., 4]` tensor of `x1, y1, x2, y2` boxes.
    pub fn from_xyxy(xyxy: &Tensor) -> Result<Self> {
        let columns = xyxy.unbind_last();
        let (l, t, r, b) = columns
            .into_iter()
            .collect_tuple()
            .ok_or_else(|| format_err!("expect a [.., 4] tensor, but get {:?}", xyxy.size()))?;
        TlbrTensorUnchecked { t, l, b, r }.try_into()
    }

    /// Merge the parameters back to a `[.., 4]` tensor of `x1, y1, x2, y2` boxes.
    pub fn to_xyxy(&self) -> Tensor {
        let Self { t, l, b, r } = self;
        Tensor::cat(&[l, t, r, b], -1)
    }

    pub fn device(&self) -> Device {
        self.t.device()
    }

    /// Compute the box size.
    pub fn size(&self) -> SizeTensor {
        let Self { t, l, b, r } = self;
        let h = b - t;
        let w = r - l;

        SizeTensor { h, w }
    }

    /// Compute the box area.
    pub fn area(&self) -> AreaTensor {
        let SizeTensor { h, w } = self.size();
        let area = h * w;
        AreaTensor { area }
    }

    /// Compute the intersection area with the other box tensor.
    pub fn intersect_area_with(&self, other: &Self) -> AreaTensor {
        let Self {
            t: lhs_t,
            l: lhs_l,
            b: lhs_b,
            r: lhs_r,
        } = self;
        let Self {
            t: rhs_t,
            l: rhs_l,
            b: rhs_b,
            r: rhs_r,
        } = other;

        let max_t = lhs_t.maximum(rhs_t);
        let max_l = lhs_l.maximum(rhs_l);
        let min_b = lhs_b.minimum(rhs_b);
        let min_r = lhs_r.minimum(rhs_r);

        let inner_h = (min_b - max_t).clamp_min(0.0);
        let inner_w = (min_r - max_l).clamp_min(0.0);

        let area = inner_h * inner_w;

        AreaTensor { area }
    }

    /// Compute the rectangle closure with the other box tensor.
    pub fn closure_with(&self, other: &Self) -> Self {
        let Self {
            t: lhs_t,
            l: lhs_l,
            b: lhs_b,
            r: lhs_r,
        } = self;
        let Self {
            t: rhs_t,
            l: rhs_l,
            b: rhs_b,
            r: rhs_r,
        } = other;

        Self {
            t: lhs_t.minimum(rhs_t),
            l: lhs_l.minimum(rhs_l),
            b: lhs_b.maximum(rhs_b),
            r: lhs_r.maximum(rhs_r),
        }
    }

    /// Tell if the points in `[.., 2]` (x, y) order lie strictly inside the boxes
    /// by a margin larger than `eps`. The output is a boolean tensor of the
    /// broadcasted shape `[.., 1]`.
    pub fn contains_points(&self, points: &Tensor, eps: f64) -> Tensor {
        let Self { t, l, b, r } = self;
        let x = points.narrow(-1, 0, 1);
        let y = points.narrow(-1, 1, 1);

        let dl = &x - l;
        let dt = &y - t;
        let dr = r - &x;
        let db = b - &y;

        dl.minimum(&dt).minimum(&dr).minimum(&db).gt(eps)
    }
}

impl TryFrom<TlbrTensorUnchecked> for TlbrTensor {
    type Error = Error;

    fn try_from(from: TlbrTensorUnchecked) -> Result<Self, Self::Error> {
        let TlbrTensorUnchecked { t, l, b, r } = from;
        ensure_params_layout(&[&t, &l, &b, &r])?;
        Ok(Self { t, l, b, r })
    }
}

impl From<TlbrTensor> for TlbrTensorUnchecked {
    fn from(from: TlbrTensor) -> Self {
        let TlbrTensor { t, l, b, r } = from;
        Self { t, l, b, r }
    }
}

impl From<&CyCxHWTensor> for TlbrTensor {
    fn from(from: &CyCxHWTensor) -> Self {
        let CyCxHWTensor { cy, cx, h, w } = from;

        let t = cy - h / 2.0;
        let b = cy + h / 2.0;
        let l = cx - w / 2.0;
        let r = cx + w / 2.0;

        Self { t, l, b, r }
    }
}
