//! Task-aligned assignment of ground truth boxes to anchor points.

use crate::common::*;
use tch_goodies::{bbox_iou, BoxMetric, TlbrTensor};

/// The initializer of [TaskAlignedAssigner].
#[derive(Debug, Clone)]
pub struct TaskAlignedAssignerInit {
    pub num_classes: usize,
    /// The maximum number of anchors selected per ground truth.
    pub topk_candidates: usize,
    /// The exponent of the class score in the alignment metric.
    pub alpha: f64,
    /// The exponent of the box overlap in the alignment metric.
    pub beta: f64,
    /// The margin by which an anchor point must lie inside a box.
    pub eps: f64,
}

impl TaskAlignedAssignerInit {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            topk_candidates: 10,
            alpha: 0.5,
            beta: 6.0,
            eps: 1e-9,
        }
    }

    pub fn build(self) -> Result<TaskAlignedAssigner> {
        let Self {
            num_classes,
            topk_candidates,
            alpha,
            beta,
            eps,
        } = self;

        ensure!(num_classes >= 1, "num_classes must be positive");
        ensure!(topk_candidates >= 1, "topk_candidates must be positive");
        ensure!(
            alpha.is_finite() && alpha >= 0.0,
            "alpha must be non-negative, but get {}",
            alpha
        );
        ensure!(
            beta.is_finite() && beta >= 0.0,
            "beta must be non-negative, but get {}",
            beta
        );
        ensure!(
            eps.is_finite() && eps >= 0.0,
            "eps must be non-negative, but get {}",
            eps
        );

        Ok(TaskAlignedAssigner {
            num_classes,
            topk_candidates,
            alpha,
            beta,
            eps,
        })
    }
}

/// Assigns ground truth boxes to anchors by a joint score of
/// classification confidence and box overlap.
#[derive(Debug, Clone, CopyGetters)]
pub struct TaskAlignedAssigner {
    #[get_copy = "pub"]
    num_classes: usize,
    #[get_copy = "pub"]
    topk_candidates: usize,
    #[get_copy = "pub"]
    alpha: f64,
    #[get_copy = "pub"]
    beta: f64,
    eps: f64,
}

/// The assignment of one image.
#[derive(Debug, TensorLike)]
pub struct AssignerOutput {
    /// The class label per anchor in shape `[1, M]`, zero for background.
    pub target_labels: Tensor,
    /// The assigned box per anchor in shape `[1, M, 4]`, zero for background.
    pub target_bboxes: Tensor,
    /// The soft class score per anchor in shape `[1, M, C]`.
    pub target_scores: Tensor,
    /// The foreground mask in shape `[1, M]`.
    pub fg_mask: Tensor,
    /// The index of the owning ground truth per anchor in shape `[1, M]`,
    /// zero for background.
    pub target_gt_index: Tensor,
}

impl AssignerOutput {
    /// An assignment where all anchors are background.
    pub fn background(num_anchors: i64, num_classes: i64, device: Device) -> Self {
        Self {
            target_labels: Tensor::zeros(&[1, num_anchors], (Kind::Int64, device)),
            target_bboxes: Tensor::zeros(&[1, num_anchors, 4], (Kind::Float, device)),
            target_scores: Tensor::zeros(&[1, num_anchors, num_classes], (Kind::Float, device)),
            fg_mask: Tensor::zeros(&[1, num_anchors], (Kind::Bool, device)),
            target_gt_index: Tensor::zeros(&[1, num_anchors], (Kind::Int64, device)),
        }
    }

    pub fn num_foregrounds(&self) -> i64 {
        i64::from(&self.fg_mask.sum(Kind::Int64))
    }
}

impl TaskAlignedAssigner {
    /// Assign the ground truth of one image to the anchors.
    ///
    /// - `pd_scores`: predicted class probabilities in shape `[1, M, C]`.
    /// - `pd_bboxes`: predicted `x1, y1, x2, y2` boxes in shape `[1, M, 4]`.
    /// - `anc_points`: anchor points in shape `[M, 2]`.
    /// - `gt_labels`: class labels in shape `[1, G, 1]`.
    /// - `gt_bboxes`: `x1, y1, x2, y2` boxes in shape `[1, G, 4]`, with `G >= 1`.
    ///
    /// No gradient is recorded.
    pub fn forward(
        &self,
        pd_scores: &Tensor,
        pd_bboxes: &Tensor,
        anc_points: &Tensor,
        gt_labels: &Tensor,
        gt_bboxes: &Tensor,
    ) -> Result<AssignerOutput> {
        tch::no_grad(|| {
            self.forward_impl(pd_scores, pd_bboxes, anc_points, gt_labels, gt_bboxes)
        })
    }

    fn forward_impl(
        &self,
        pd_scores: &Tensor,
        pd_bboxes: &Tensor,
        anc_points: &Tensor,
        gt_labels: &Tensor,
        gt_bboxes: &Tensor,
    ) -> Result<AssignerOutput> {
        let device = pd_scores.device();
        let num_classes = self.num_classes as i64;
        let num_anchors = anc_points.size()[0];
        let num_gts = gt_bboxes.size()[1];

        assert_eq!(
            pd_scores.size(),
            [1, num_anchors, num_classes],
            "pd_scores must have shape [1, {}, {}]",
            num_anchors,
            num_classes
        );
        assert_eq!(pd_bboxes.size(), [1, num_anchors, 4]);
        assert_eq!(anc_points.size(), [num_anchors, 2]);
        assert_eq!(gt_bboxes.size(), [1, num_gts, 4]);
        assert_eq!(gt_labels.size(), [1, num_gts, 1]);
        assert!(num_gts >= 1, "expect at least one ground truth box");

        let scores = pd_scores.squeeze_dim(0).to_kind(Kind::Float);
        let pred_boxes = pd_bboxes.squeeze_dim(0).to_kind(Kind::Float);
        let gt_boxes = gt_bboxes.squeeze_dim(0).to_kind(Kind::Float);
        let labels = gt_labels.reshape(&[-1]).to_kind(Kind::Int64);
        let anc_points = anc_points.to_kind(Kind::Float);

        let labels_vec = Vec::<i64>::from(&labels);
        if let Some(label) = labels_vec
            .iter()
            .find(|&&label| label < 0 || label >= num_classes)
        {
            bail!(
                "ground truth label {} is out of range [0, {})",
                label,
                num_classes
            );
        }

        // [G, M]
        let in_gts = TlbrTensor::from_xyxy(&gt_boxes.unsqueeze(1))?
            .contains_points(&anc_points.unsqueeze(0), self.eps)
            .squeeze_dim(-1);
        let candidate_mask = in_gts.to_kind(Kind::Float);

        // [G, M]
        let overlaps = bbox_iou(
            &gt_boxes.unsqueeze(1),
            &pred_boxes.unsqueeze(0),
            BoxMetric::CIoU,
        )?
        .clamp_min(0.0)
            * &candidate_mask;
        let bbox_scores = scores.index_select(1, &labels).transpose(0, 1);
        let align_metric = bbox_scores.pow_tensor_scalar(self.alpha)
            * overlaps.pow_tensor_scalar(self.beta)
            * &candidate_mask;

        let owners = self.select_owners(&align_metric, &in_gts, num_gts, num_anchors);

        // [G, M]
        let mask_pos = {
            let mask: Vec<bool> = (0..num_gts as usize)
                .flat_map(|gt_index| {
                    owners
                        .iter()
                        .map(move |owner| *owner == Some(gt_index))
                })
                .collect();
            Tensor::of_slice(&mask)
                .view([num_gts, num_anchors])
                .to_device(device)
                .to_kind(Kind::Float)
        };

        let (fg_vec, gt_index_vec): (Vec<bool>, Vec<i64>) = owners
            .iter()
            .map(|owner| (owner.is_some(), owner.unwrap_or(0) as i64))
            .unzip();
        let fg_mask = Tensor::of_slice(&fg_vec).to_device(device);
        let fg_float = fg_mask.to_kind(Kind::Float);
        let target_gt_index = Tensor::of_slice(&gt_index_vec).to_device(device);

        let target_labels = labels.index_select(0, &target_gt_index) * fg_mask.to_kind(Kind::Int64);
        let target_bboxes = gt_boxes.index_select(0, &target_gt_index) * fg_float.unsqueeze(-1);

        // scale the metric so that the best anchor of each gt scores its best overlap
        let norm_align_metric = {
            let align_metric = &align_metric * &mask_pos;
            let pos_align_metric = align_metric.amax(&[-1], true);
            let pos_overlaps = (&overlaps * &mask_pos).amax(&[-1], true);
            (align_metric * pos_overlaps / (pos_align_metric + self.eps)).amax(&[0], false)
        };
        let target_scores = target_labels.one_hot(num_classes).to_kind(Kind::Float)
            * (fg_float * norm_align_metric).unsqueeze(-1);

        let output = AssignerOutput {
            target_labels: target_labels.unsqueeze(0),
            target_bboxes: target_bboxes.unsqueeze(0),
            target_scores: target_scores.unsqueeze(0),
            fg_mask: fg_mask.unsqueeze(0),
            target_gt_index: target_gt_index.unsqueeze(0),
        };

        trace!(
            "assigned {} anchors to {} ground truth boxes",
            fg_vec.iter().filter(|&&fg| fg).count(),
            num_gts
        );

        Ok(output)
    }

    /// Pick the owning ground truth of each anchor.
    ///
    /// Each ground truth selects its top-k candidates by metric, preferring
    /// lower anchor indexes on ties. An anchor selected more than once goes
    /// to the ground truth with the highest metric, then the lowest index.
    fn select_owners(
        &self,
        align_metric: &Tensor,
        in_gts: &Tensor,
        num_gts: i64,
        num_anchors: i64,
    ) -> Vec<Option<usize>> {
        let num_anchors = num_anchors as usize;
        let metric_vec = Vec::<f32>::from(&align_metric.to_device(Device::Cpu).reshape(&[-1]));
        let candidate_vec = Vec::<bool>::from(&in_gts.to_device(Device::Cpu).reshape(&[-1]));

        let mut owners: Vec<Option<usize>> = vec![None; num_anchors];
        let mut owner_metrics = vec![0f32; num_anchors];

        (0..num_gts as usize).for_each(|gt_index| {
            let offset = gt_index * num_anchors;
            let metric = &metric_vec[offset..(offset + num_anchors)];
            let candidate = &candidate_vec[offset..(offset + num_anchors)];

            (0..num_anchors)
                .filter(|&anchor_index| candidate[anchor_index])
                .sorted_by(|&lhs, &rhs| {
                    metric[rhs]
                        .total_cmp(&metric[lhs])
                        .then_with(|| lhs.cmp(&rhs))
                })
                .take(self.topk_candidates)
                .for_each(|anchor_index| {
                    let value = metric[anchor_index];
                    let replace = match owners[anchor_index] {
                        None => true,
                        Some(_) => value > owner_metrics[anchor_index],
                    };
                    if replace {
                        owners[anchor_index] = Some(gt_index);
                        owner_metrics[anchor_index] = value;
                    }
                });
        });

        owners
    }
}
