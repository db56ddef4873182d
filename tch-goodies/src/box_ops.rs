//! Box metrics and box/distance conversions on `[.., 4]` tensors of
//! `x1, y1, x2, y2` boxes.

use crate::{
    common::*,
    compound_tensor::{CyCxHWTensor, TlbrTensor},
    utils::DIST_EPSILON,
};

/// The choice of box overlap metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxMetric {
    IoU,
    GIoU,
    DIoU,
    CIoU,
}

/// Compute the overlap score between two broadcastable `[.., 4]` box tensors.
///
/// The output has the broadcasted shape with the last dimension removed.
pub fn bbox_iou(lhs: &Tensor, rhs: &Tensor, metric: BoxMetric) -> Result<Tensor> {
    let lhs: CyCxHWTensor = (&TlbrTensor::from_xyxy(lhs)?).into();
    let rhs: CyCxHWTensor = (&TlbrTensor::from_xyxy(rhs)?).into();

    let score = match metric {
        BoxMetric::IoU => lhs.iou_with(&rhs),
        BoxMetric::GIoU => lhs.giou_with(&rhs),
        BoxMetric::DIoU => lhs.diou_with(&rhs),
        BoxMetric::CIoU => lhs.ciou_with(&rhs),
    };

    Ok(score.squeeze_dim(-1))
}

/// Convert boxes to the (left, top, right, bottom) distances from the anchor points.
///
/// The distances are clamped to `[0, max_bin - 0.01]` so that they fall in the
/// range of the regression bins.
pub fn bbox2dist(anchor_points: &Tensor, bboxes: &Tensor, max_bin: f64) -> Tensor {
    let x1y1 = bboxes.narrow(-1, 0, 2);
    let x2y2 = bboxes.narrow(-1, 2, 2);
    Tensor::cat(&[anchor_points - &x1y1, &x2y2 - anchor_points], -1)
        .clamp(0.0, max_bin - DIST_EPSILON)
}

/// Convert (left, top, right, bottom) distances from the anchor points to boxes.
pub fn dist2bbox(anchor_points: &Tensor, distances: &Tensor) -> Tensor {
    let lt = distances.narrow(-1, 0, 2);
    let rb = distances.narrow(-1, 2, 2);
    Tensor::cat(&[anchor_points - &lt, anchor_points + &rb], -1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::prelude::*;

    #[test]
    fn bbox2dist_stays_in_bin_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let num = 256;
        let max_bin = 15.0;

        let anchors: Vec<f32> = (0..num * 2).map(|_| rng.gen_range(0.0..40.0)).collect();
        let bboxes: Vec<f32> = (0..num)
            .flat_map(|_| {
                let x1: f32 = rng.gen_range(-10.0..40.0);
                let y1: f32 = rng.gen_range(-10.0..40.0);
                let w: f32 = rng.gen_range(0.0..30.0);
                let h: f32 = rng.gen_range(0.0..30.0);
                [x1, y1, x1 + w, y1 + h]
            })
            .collect();
        let anchors = Tensor::of_slice(&anchors).view([num, 2]);
        let bboxes = Tensor::of_slice(&bboxes).view([num, 4]);

        let dist = bbox2dist(&anchors, &bboxes, max_bin);
        assert_eq!(dist.size(), vec![num, 4]);
        Vec::<f32>::from(&dist).into_iter().for_each(|value| {
            assert!(value >= 0.0);
            assert!(value <= (max_bin - DIST_EPSILON) as f32 + 1e-6);
        });
    }

    #[test]
    fn dist_and_bbox_are_inverse_inside_range() {
        let anchors = Tensor::of_slice(&[4f32, 6.0, 10.0, 10.0]).view([2, 2]);
        let bboxes = Tensor::of_slice(&[1f32, 2.0, 7.0, 9.0, 8.0, 5.0, 12.0, 14.0]).view([2, 4]);

        let dist = bbox2dist(&anchors, &bboxes, 16.0);
        assert_eq!(
            Vec::<f32>::from(&dist),
            vec![3.0, 4.0, 3.0, 3.0, 2.0, 5.0, 2.0, 4.0]
        );
        let restored = dist2bbox(&anchors, &dist);
        assert_eq!(Vec::<f32>::from(&restored), Vec::<f32>::from(&bboxes));
    }

    #[test]
    fn bbox_iou_drops_last_dim() -> Result<()> {
        let lhs = Tensor::of_slice(&[0f32, 0.0, 4.0, 4.0, 0.0, 0.0, 4.0, 4.0]).view([2, 4]);
        let rhs = Tensor::of_slice(&[0f32, 0.0, 4.0, 4.0, 2.0, 0.0, 6.0, 4.0]).view([2, 4]);

        let iou = bbox_iou(&lhs, &rhs, BoxMetric::IoU)?;
        assert_eq!(iou.size(), vec![2]);
        let iou = Vec::<f32>::from(&iou);
        assert_abs_diff_eq!(iou[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(iou[1], 8.0 / 24.0, epsilon = 1e-5);

        let ciou = Vec::<f32>::from(&bbox_iou(&lhs, &rhs, BoxMetric::CIoU)?);
        assert_abs_diff_eq!(ciou[0], 1.0, epsilon = 1e-5);
        assert!(ciou[1] < iou[1]);
        Ok(())
    }
}
