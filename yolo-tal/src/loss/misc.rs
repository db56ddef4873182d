use crate::common::*;

/// Predictions of the detection heads grouped by scale.
///
/// The per-scale entries are concatenated in order, so the order of the
/// scales determines the global anchor indexes.
#[derive(Debug)]
pub struct MultiScaleOutput {
    /// Class logits in shape `[batch, anchors, num_classes]` per scale.
    pub pred_cls: Vec<Tensor>,
    /// Regression bin logits in shape `[batch, anchors, 4 * reg_max]` per scale.
    pub pred_reg: Vec<Tensor>,
    /// Decoded `x1, y1, x2, y2` boxes in shape `[batch, anchors, 4]` per scale.
    pub pred_box: Vec<Tensor>,
    /// Anchor points in shape `[anchors, 2]` per scale.
    pub anchors: Vec<Tensor>,
    /// Strides in shape `[anchors, 1]` per scale.
    pub stride_tensors: Vec<Tensor>,
}

/// The predictions of all scales concatenated along the anchor dimension.
#[derive(Debug, TensorLike)]
pub struct FlatOutput {
    /// Shape `[batch, anchors, num_classes]`.
    pub cls: Tensor,
    /// Shape `[batch, anchors, 4 * reg_max]`.
    pub reg: Tensor,
    /// Shape `[batch, anchors, 4]`.
    pub boxes: Tensor,
    /// Shape `[anchors, 2]`.
    pub anchors: Tensor,
    /// Shape `[anchors, 1]`.
    pub strides: Tensor,
}

impl FlatOutput {
    pub fn batch_size(&self) -> i64 {
        self.cls.size()[0]
    }

    pub fn num_anchors(&self) -> i64 {
        self.anchors.size()[0]
    }

    pub fn device(&self) -> Device {
        self.cls.device()
    }
}

impl MultiScaleOutput {
    pub fn num_scales(&self) -> usize {
        self.pred_cls.len()
    }

    /// Concatenate the scales into flat tensors.
    ///
    /// # Panics
    /// It panics if the scales disagree on the batch size or the number of
    /// anchors, or if the channel counts differ from `num_classes` and
    /// `4 * reg_max`.
    pub fn flatten(&self, num_classes: i64, reg_max: i64) -> FlatOutput {
        let Self {
            pred_cls,
            pred_reg,
            pred_box,
            anchors,
            stride_tensors,
        } = self;

        let num_scales = pred_cls.len();
        assert!(num_scales > 0, "expect at least one scale");
        assert!(
            [pred_reg.len(), pred_box.len(), anchors.len(), stride_tensors.len()]
                .iter()
                .all(|&len| len == num_scales),
            "the number of scales must agree among predictions, anchors and strides"
        );

        let batch_size = pred_cls[0].size()[0];

        izip!(pred_cls, pred_reg, pred_box, anchors, stride_tensors)
            .enumerate()
            .for_each(|(scale, (cls, reg, bbox, anchor, stride))| {
                let num_anchors = anchor.size()[0];
                assert_eq!(
                    anchor.size(),
                    [num_anchors, 2],
                    "anchors of scale {} must have shape [anchors, 2]",
                    scale
                );
                assert_eq!(
                    stride.size(),
                    [num_anchors, 1],
                    "strides of scale {} must have shape [{}, 1]",
                    scale,
                    num_anchors
                );
                assert_eq!(
                    cls.size(),
                    [batch_size, num_anchors, num_classes],
                    "class logits of scale {} have a wrong shape",
                    scale
                );
                assert_eq!(
                    reg.size(),
                    [batch_size, num_anchors, 4 * reg_max],
                    "regression logits of scale {} have a wrong shape",
                    scale
                );
                assert_eq!(
                    bbox.size(),
                    [batch_size, num_anchors, 4],
                    "boxes of scale {} have a wrong shape",
                    scale
                );
            });

        FlatOutput {
            cls: Tensor::cat(pred_cls, 1),
            reg: Tensor::cat(pred_reg, 1),
            boxes: Tensor::cat(pred_box, 1),
            anchors: Tensor::cat(anchors, 0),
            strides: Tensor::cat(stride_tensors, 0),
        }
    }
}

/// Ground truth of one image.
#[derive(Debug, TensorLike)]
pub struct DetectionTarget {
    /// Class labels in shape `[G]`.
    pub labels: Tensor,
    /// Absolute `x1, y1, x2, y2` boxes in shape `[G, 4]`.
    pub boxes: Tensor,
    /// The `(h, w)` size of the original image.
    #[tensor_like(copy)]
    pub orig_size: [i64; 2],
}

impl DetectionTarget {
    pub fn new(labels: &[i64], boxes: &[[f32; 4]], orig_size: [i64; 2]) -> Self {
        let flat: Vec<f32> = boxes.iter().flatten().copied().collect();
        Self {
            labels: Tensor::of_slice(labels),
            boxes: Tensor::of_slice(&flat).view([-1, 4]),
            orig_size,
        }
    }

    /// A target without objects.
    pub fn empty(orig_size: [i64; 2]) -> Self {
        Self::new(&[], &[], orig_size)
    }

    pub fn num_objects(&self) -> i64 {
        self.labels.size()[0]
    }

    /// Tell if no object can be assigned, that is, it has no labels or the
    /// largest box coordinate is zero.
    pub fn is_degenerate(&self) -> bool {
        self.labels.numel() == 0
            || self.boxes.numel() == 0
            || f64::from(&self.boxes.max()) == 0.0
    }

    /// Count boxes with non-positive width or height.
    pub fn num_collapsed_boxes(&self) -> i64 {
        if self.boxes.numel() == 0 {
            return 0;
        }
        let w = self.boxes.select(1, 2) - self.boxes.select(1, 0);
        let h = self.boxes.select(1, 3) - self.boxes.select(1, 1);
        i64::from(&w.le(0.0).logical_or(&h.le(0.0)).sum(Kind::Int64))
    }
}
