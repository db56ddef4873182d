use super::distribution_focal_loss;
use crate::common::*;
use tch_goodies::{bbox2dist, bbox_iou, BoxMetric};

/// Box regression losses over the foreground anchors.
#[derive(Debug, Clone, CopyGetters)]
pub struct RegressionLoss {
    #[get_copy = "pub"]
    num_classes: usize,
    #[get_copy = "pub"]
    reg_max: i64,
    #[get_copy = "pub"]
    use_dfl: bool,
}

impl RegressionLoss {
    pub fn new(num_classes: usize, reg_max: i64, use_dfl: bool) -> Result<Self> {
        ensure!(reg_max >= 1, "reg_max must be positive, but get {}", reg_max);
        ensure!(
            !use_dfl || reg_max >= 2,
            "distribution focal loss requires reg_max >= 2, but get {}",
            reg_max
        );

        Ok(Self {
            num_classes,
            reg_max,
            use_dfl,
        })
    }

    /// Compute the CIoU loss and the distribution focal loss per foreground anchor.
    ///
    /// All inputs are flat over the anchors of all images:
    /// `pred_regs` in `[N, 4 * reg_max]`, `pred_boxes`, `gt_boxes` in `[N, 4]`,
    /// `anchors` in `[N, 2]`, `strides` in `[N, 1]`, `bbox_weight` in `[N]`
    /// and the boolean `fg_mask` in `[N]`.
    ///
    /// It returns two `[num_foregrounds]` tensors. A loss is a zero scalar
    /// attached to the predictions if there are no foregrounds or if it is
    /// disabled.
    #[allow(clippy::too_many_arguments)]
    pub fn forward(
        &self,
        pred_regs: &Tensor,
        pred_boxes: &Tensor,
        anchors: &Tensor,
        gt_boxes: &Tensor,
        bbox_weight: &Tensor,
        fg_mask: &Tensor,
        strides: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        let num_anchors = fg_mask.size()[0];
        assert_eq!(pred_boxes.size(), [num_anchors, 4]);
        assert_eq!(gt_boxes.size(), [num_anchors, 4]);
        assert_eq!(anchors.size(), [num_anchors, 2]);
        assert_eq!(strides.size(), [num_anchors, 1]);
        assert_eq!(bbox_weight.size(), [num_anchors]);
        if self.use_dfl {
            assert_eq!(pred_regs.size(), [num_anchors, 4 * self.reg_max]);
        }

        let fg_index = fg_mask.nonzero().view([-1]);
        let num_fg = fg_index.size()[0];

        let zero_dfl = || pred_regs.sum(Kind::Float) * 0.0;

        if num_fg == 0 {
            let zero_iou = pred_boxes.sum(Kind::Float) * 0.0;
            return Ok((zero_iou, zero_dfl()));
        }

        let weight = bbox_weight.index_select(0, &fg_index);
        let pred_boxes = pred_boxes.index_select(0, &fg_index);
        let gt_boxes = gt_boxes.index_select(0, &fg_index);

        let ious = bbox_iou(&pred_boxes, &gt_boxes, BoxMetric::CIoU)?;
        let loss_iou = (1.0 - ious) * &weight;

        let loss_dfl = if self.use_dfl {
            let strides = strides.index_select(0, &fg_index);
            let anchors = anchors.index_select(0, &fg_index) / &strides;
            let target_ltrb = bbox2dist(&anchors, &(gt_boxes / &strides), (self.reg_max - 1) as f64);
            let pred_regs = pred_regs.index_select(0, &fg_index);
            distribution_focal_loss(&pred_regs, &target_ltrb, self.reg_max) * &weight
        } else {
            zero_dfl()
        };

        Ok((loss_iou, loss_dfl))
    }
}
