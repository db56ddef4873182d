use super::{area::AreaTensor, ensure_params_layout, size::SizeTensor, tlbr::TlbrTensor};
use crate::{common::*, utils::EPSILON};

/// Checked tensor of batched box parameters in CyCxHW format.
#[derive(Debug, TensorLike, Getters)]
pub struct CyCxHWTensor {
    /// The center y parameter in shape `[.., 1]`.
    #[get = "pub"]
    pub(crate) cy: Tensor,
    /// The center x parameter in shape `[.., 1]`.
    #[get = "pub"]
    pub(crate) cx: Tensor,
    /// The height parameter in shape `[.., 1]`.
    #[get = "pub"]
    pub(crate) h: Tensor,
    /// The width parameter in shape `[.., 1]`.
    #[get = "pub"]
    pub(crate) w: Tensor,
}

/// Unchecked tensor of batched box parameters in CyCxHW format.
#[derive(Debug, TensorLike)]
pub struct CyCxHWTensorUnchecked {
    /// The center y parameter in shape `[.., 1]`.
    pub cy: Tensor,
    /// The center x parameter in shape `[.., 1]`.
    pub cx: Tensor,
    /// The height parameter in shape `[.., 1]`.
    pub h: Tensor,
    /// The width parameter in shape `[.., 1]`.
    pub w: Tensor,
}

impl CyCxHWTensor {
    /// Compute box area.
    pub fn area(&self) -> AreaTensor {
        let Self { h, w, .. } = self;
        let area = h * w;
        AreaTensor { area }
    }

    /// Compute box size.
    pub fn size(&self) -> SizeTensor {
        let Self { h, w, .. } = self;
        SizeTensor {
            h: h.shallow_clone(),
            w: w.shallow_clone(),
        }
    }

    /// Compute the intersection area with the other box tensor.
    pub fn intersect_area_with(&self, other: &Self) -> AreaTensor {
        TlbrTensor::from(self).intersect_area_with(&TlbrTensor::from(other))
    }

    /// Compute the rectangle closure with the other box tensor.
    pub fn closure_with(&self, other: &Self) -> CyCxHWTensor {
        (&TlbrTensor::from(self).closure_with(&TlbrTensor::from(other))).into()
    }

    fn union_area_with(&self, other: &Self, inter_area: &AreaTensor) -> Tensor {
        self.area().area() + other.area().area() - inter_area.area() + EPSILON
    }

    /// Squared center distance divided by the squared closure diagonal.
    fn center_penalty_with(&self, other: &Self) -> Tensor {
        let closure = self.closure_with(other);
        let diagonal_square = closure.size().diagonal_square() + EPSILON;
        let center_dist_square =
            (self.cy() - other.cy()).square() + (self.cx() - other.cx()).square();
        center_dist_square / diagonal_square
    }

    /// Compute the IoU score with the other box tensor.
    pub fn iou_with(&self, other: &Self) -> Tensor {
        let inter_area = self.intersect_area_with(other);
        let union_area = self.union_area_with(other, &inter_area);
        inter_area.area() / union_area
    }

    /// Compute the GIoU score with the other box tensor.
    pub fn giou_with(&self, other: &Self) -> Tensor {
        let inter_area = self.intersect_area_with(other);
        let union_area = self.union_area_with(other, &inter_area);
        let closure_area = self.closure_with(other).area();
        let iou = inter_area.area() / &union_area;
        iou - (closure_area.area() - &union_area) / (closure_area.area() + EPSILON)
    }

    /// Compute the DIoU score with the other box tensor.
    pub fn diou_with(&self, other: &Self) -> Tensor {
        self.iou_with(other) - self.center_penalty_with(other)
    }

    /// Compute the CIoU score with the other box tensor.
    ///
    /// The aspect ratio term is weighted by a coefficient that does not
    /// propagate gradients. The score is in range (-1, 1].
    pub fn ciou_with(&self, other: &Self) -> Tensor {
        let iou = self.iou_with(other);

        // padded height keeps the gradient finite for collapsed boxes
        let lhs_angle = (self.w() / (self.h() + EPSILON)).atan();
        let rhs_angle = (other.w() / (other.h() + EPSILON)).atan();
        let shape_loss = (&lhs_angle - &rhs_angle).square() * (4.0 / PI.powi(2));
        let shape_loss_coef =
            tch::no_grad(|| &shape_loss / (&shape_loss - &iou + (1.0 + EPSILON)));

        iou - self.center_penalty_with(other) - shape_loss_coef * shape_loss
    }
}

impl TryFrom<CyCxHWTensorUnchecked> for CyCxHWTensor {
    type Error = Error;

    fn try_from(from: CyCxHWTensorUnchecked) -> Result<Self, Self::Error> {
        let CyCxHWTensorUnchecked { cy, cx, h, w } = from;
        ensure_params_layout(&[&cy, &cx, &h, &w])?;
        Ok(Self { cy, cx, h, w })
    }
}

impl From<CyCxHWTensor> for CyCxHWTensorUnchecked {
    fn from(from: CyCxHWTensor) -> Self {
        let CyCxHWTensor { cy, cx, h, w } = from;
        Self { cy, cx, h, w }
    }
}

impl From<&TlbrTensor> for CyCxHWTensor {
    fn from(from: &TlbrTensor) -> Self {
        let TlbrTensor { t, l, b, r } = from;
        let h = b - t;
        let w = r - l;
        let cy = t + &h / 2.0;
        let cx = l + &w / 2.0;
        Self { cy, cx, h, w }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::prelude::*;

    fn boxes(xyxy: &[[f32; 4]]) -> CyCxHWTensor {
        let flat: Vec<f32> = xyxy.iter().flatten().copied().collect();
        let tensor = Tensor::of_slice(&flat).view([-1, 4]);
        (&TlbrTensor::from_xyxy(&tensor).unwrap()).into()
    }

    fn values(tensor: &Tensor) -> Vec<f32> {
        Vec::<f32>::from(&tensor.reshape(&[-1]))
    }

    #[test]
    fn ciou_of_identical_boxes_is_one() {
        let mut rng = StdRng::seed_from_u64(7);
        let xyxy: Vec<[f32; 4]> = (0..64)
            .map(|_| {
                let x1 = rng.gen_range(0.0..500.0);
                let y1 = rng.gen_range(0.0..500.0);
                let w = rng.gen_range(1.0..200.0);
                let h = rng.gen_range(1.0..200.0);
                [x1, y1, x1 + w, y1 + h]
            })
            .collect();
        let lhs = boxes(&xyxy);
        let rhs = boxes(&xyxy);

        values(&lhs.ciou_with(&rhs))
            .into_iter()
            .for_each(|score| assert_abs_diff_eq!(score, 1.0, epsilon = 1e-5));
        values(&lhs.iou_with(&rhs))
            .into_iter()
            .for_each(|score| assert_abs_diff_eq!(score, 1.0, epsilon = 1e-5));
    }

    #[test]
    fn iou_variants_of_disjoint_and_overlapping_boxes() {
        let lhs = boxes(&[[0.0, 0.0, 10.0, 10.0], [0.0, 0.0, 2.0, 2.0]]);
        let rhs = boxes(&[[5.0, 0.0, 15.0, 10.0], [4.0, 0.0, 6.0, 2.0]]);

        let iou = values(&lhs.iou_with(&rhs));
        assert_abs_diff_eq!(iou[0], 50.0 / 150.0, epsilon = 1e-5);
        assert_abs_diff_eq!(iou[1], 0.0, epsilon = 1e-6);

        // closure of the disjoint pair is 6x2, union is 8
        let giou = values(&lhs.giou_with(&rhs));
        assert_abs_diff_eq!(giou[1], -(12.0 - 8.0) / 12.0, epsilon = 1e-5);

        // center distance is 4, closure diagonal square is 40
        let diou = values(&lhs.diou_with(&rhs));
        assert_abs_diff_eq!(diou[1], -16.0 / 40.0, epsilon = 1e-5);

        // same aspect ratio, so CIoU reduces to DIoU
        let ciou = values(&lhs.ciou_with(&rhs));
        assert_abs_diff_eq!(ciou[0], values(&lhs.diou_with(&rhs))[0], epsilon = 1e-5);
        assert!(ciou.iter().all(|&score| score > -1.0 && score <= 1.0));
    }

    #[test]
    fn ciou_penalizes_aspect_ratio() {
        let lhs = boxes(&[[0.0, 0.0, 10.0, 10.0]]);
        let rhs = boxes(&[[0.0, 2.5, 10.0, 7.5]]);
        let ciou = values(&lhs.ciou_with(&rhs))[0];
        let diou = values(&lhs.diou_with(&rhs))[0];
        assert!(ciou < diou);
    }

    #[test]
    fn degenerate_boxes_are_finite() {
        let lhs = boxes(&[[3.0, 3.0, 3.0, 3.0], [0.0, 0.0, 0.0, 5.0]]);
        let rhs = boxes(&[[3.0, 3.0, 3.0, 3.0], [1.0, 1.0, 4.0, 4.0]]);

        for score in [
            lhs.iou_with(&rhs),
            lhs.giou_with(&rhs),
            lhs.diou_with(&rhs),
            lhs.ciou_with(&rhs),
        ] {
            assert!(bool::from(score.isfinite().all()));
        }
    }

    #[test]
    fn ciou_gradient_of_point_box_is_finite() -> Result<()> {
        let pred = Tensor::of_slice(&[3f32, 3.0, 3.0, 3.0])
            .view([1, 4])
            .set_requires_grad(true);
        let gt = Tensor::of_slice(&[1f32, 1.0, 5.0, 6.0]).view([1, 4]);
        let pred_boxes: CyCxHWTensor = (&TlbrTensor::from_xyxy(&pred)?).into();
        let gt_boxes: CyCxHWTensor = (&TlbrTensor::from_xyxy(&gt)?).into();

        let loss = (1.0_f64 - pred_boxes.ciou_with(&gt_boxes)).sum(Kind::Float);
        assert!(f64::from(&loss).is_finite());
        loss.backward();

        let grad = pred.grad();
        assert!(grad.defined());
        assert!(bool::from(grad.isfinite().all()));
        Ok(())
    }

    #[test]
    fn pairwise_broadcast() {
        let gt = Tensor::of_slice(&[0f32, 0.0, 10.0, 10.0, 20.0, 20.0, 30.0, 30.0]).view([2, 1, 4]);
        let pred = Tensor::of_slice(&[0f32, 0.0, 10.0, 10.0, 0.0, 0.0, 5.0, 10.0, 20.0, 20.0, 30.0, 30.0])
            .view([1, 3, 4]);
        let gt: CyCxHWTensor = (&TlbrTensor::from_xyxy(&gt).unwrap()).into();
        let pred: CyCxHWTensor = (&TlbrTensor::from_xyxy(&pred).unwrap()).into();

        let iou = gt.iou_with(&pred);
        assert_eq!(iou.size(), vec![2, 3, 1]);
        let iou = values(&iou);
        assert_abs_diff_eq!(iou[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(iou[1], 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(iou[2], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(iou[5], 1.0, epsilon = 1e-5);
    }
}
