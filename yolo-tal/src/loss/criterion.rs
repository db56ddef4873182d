//! The training objective of the detector.

use super::{
    AssignerOutput, ClassificationLoss, ClassificationLossInit, ClassificationLossKind,
    DetectionTarget, FlatOutput, MultiScaleOutput, ProcessGroup, RegressionLoss,
    TaskAlignedAssigner, TaskAlignedAssignerInit,
};
use crate::{common::*, profiling::Timing};

pub use criterion_impl::*;
pub use criterion_output::*;

mod criterion_impl {
    use super::*;
    use tch_goodies::TensorExt as _;

    #[derive(Debug, Clone)]
    pub struct CriterionInit {
        pub num_classes: usize,
        /// The number of regression bins per box side.
        pub reg_max: usize,
        pub loss_cls_weight: f64,
        pub loss_box_weight: f64,
        pub loss_dfl_weight: f64,
        pub cls_loss: ClassificationLossKind,
        pub focal_gamma: f64,
        pub focal_alpha: f64,
        pub matcher: TaskAlignedAssignerInit,
    }

    impl CriterionInit {
        pub fn new(num_classes: usize) -> Self {
            Self {
                num_classes,
                reg_max: 16,
                loss_cls_weight: 0.5,
                loss_box_weight: 7.5,
                loss_dfl_weight: 1.5,
                cls_loss: ClassificationLossKind::Bce,
                focal_gamma: 1.5,
                focal_alpha: 0.25,
                matcher: TaskAlignedAssignerInit::new(num_classes),
            }
        }

        pub fn build(self) -> Result<Criterion> {
            let Self {
                num_classes,
                reg_max,
                loss_cls_weight,
                loss_box_weight,
                loss_dfl_weight,
                cls_loss,
                focal_gamma,
                focal_alpha,
                matcher,
            } = self;

            ensure!(num_classes >= 1, "num_classes must be positive");
            ensure!(reg_max >= 1, "reg_max must be positive");
            ensure!(
                matcher.num_classes == num_classes,
                "the matcher expects {} classes, but the criterion expects {}",
                matcher.num_classes,
                num_classes
            );
            [
                ("loss_cls_weight", loss_cls_weight),
                ("loss_box_weight", loss_box_weight),
                ("loss_dfl_weight", loss_dfl_weight),
            ]
            .iter()
            .try_for_each(|&(name, weight)| {
                ensure!(
                    weight.is_finite() && weight >= 0.0,
                    "{} must be non-negative, but get {}",
                    name,
                    weight
                );
                Ok(())
            })?;

            let reg_max = reg_max as i64;
            let use_dfl = reg_max > 1;

            let cls_loss = ClassificationLossInit {
                focal_gamma,
                focal_alpha,
                ..ClassificationLossInit::default(cls_loss, Reduction::None)
            }
            .build()?;
            let regression_loss = RegressionLoss::new(num_classes, reg_max, use_dfl)?;
            let assigner = matcher.build()?;

            Ok(Criterion {
                num_classes: num_classes as i64,
                reg_max,
                loss_cls_weight,
                loss_box_weight,
                loss_dfl_weight,
                cls_loss,
                regression_loss,
                assigner,
            })
        }
    }

    /// Computes classification, box and distribution focal losses against
    /// task-aligned assignments.
    #[derive(Debug)]
    pub struct Criterion {
        num_classes: i64,
        reg_max: i64,
        loss_cls_weight: f64,
        loss_box_weight: f64,
        loss_dfl_weight: f64,
        cls_loss: ClassificationLoss,
        regression_loss: RegressionLoss,
        assigner: TaskAlignedAssigner,
    }

    impl Criterion {
        pub fn use_dfl(&self) -> bool {
            self.regression_loss.use_dfl()
        }

        pub fn assigner(&self) -> &TaskAlignedAssigner {
            &self.assigner
        }

        /// Compute the losses of a batch.
        ///
        /// It must be called on every worker of the process group, even if
        /// the worker has no ground truth, because the normalizer is reduced
        /// across the group.
        ///
        /// # Panics
        /// It panics if the predictions have inconsistent shapes or the number
        /// of targets differs from the batch size.
        pub fn forward(
            &self,
            outputs: &MultiScaleOutput,
            targets: &[DetectionTarget],
            process_group: &dyn ProcessGroup,
        ) -> Result<(CriterionOutput, CriterionAuxiliary)> {
            let mut timing = Timing::new("criterion");
            let num_classes = self.num_classes;

            let flat = outputs.flatten(num_classes, self.reg_max);
            let batch_size = flat.batch_size();
            assert_eq!(
                targets.len() as i64,
                batch_size,
                "expect {} targets, but get {}",
                batch_size,
                targets.len()
            );
            timing.add_event("flatten");

            // assign ground truth image by image
            let assignments: Vec<AssignerOutput> = targets
                .iter()
                .enumerate()
                .map(|(batch_index, target)| self.assign_image(&flat, batch_index as i64, target))
                .collect::<Result<_>>()?;
            timing.add_event("assign");

            let (fg_masks, target_scores, target_bboxes) = assignments
                .iter()
                .map(|assignment| {
                    (
                        assignment.fg_mask.shallow_clone(),
                        assignment.target_scores.shallow_clone(),
                        assignment.target_bboxes.shallow_clone(),
                    )
                })
                .unzip_n_vec();
            let fg_mask = Tensor::cat(&fg_masks, 0).view([-1]);
            let target_scores = Tensor::cat(&target_scores, 0).view([-1, num_classes]);
            let target_bboxes = Tensor::cat(&target_bboxes, 0).view([-1, 4]);

            let normalizer =
                Self::normalizer(&target_scores.sum(Kind::Float), process_group)?;
            timing.add_event("normalizer");

            if log_enabled!(Level::Debug) {
                debug!(
                    "{} foreground anchors in {} images, normalizer {:.3}",
                    i64::from(&fg_mask.sum(Kind::Int64)),
                    batch_size,
                    f64::from(&normalizer)
                );
            }

            // classification loss over all anchors
            let loss_cls = self
                .cls_loss
                .forward(&flat.cls.view([-1, num_classes]), &target_scores)
                .sum(Kind::Float)
                / &normalizer;
            timing.add_event("classification_loss");

            // box losses over foreground anchors
            let (loss_box, loss_dfl) = {
                let bbox_weight = target_scores.sum_dim_intlist(&[-1], false, Kind::Float);
                let anchors = flat.anchors.repeat(&[batch_size, 1]);
                let strides = flat.strides.repeat(&[batch_size, 1]);
                let (loss_box, loss_dfl) = self.regression_loss.forward(
                    &flat.reg.view([-1, 4 * self.reg_max]),
                    &flat.boxes.view([-1, 4]),
                    &anchors,
                    &target_bboxes,
                    &bbox_weight,
                    &fg_mask,
                    &strides,
                )?;
                let loss_box = loss_box.sum(Kind::Float) / &normalizer;
                let loss_dfl = self
                    .use_dfl()
                    .then(|| loss_dfl.sum(Kind::Float) / &normalizer);
                (loss_box, loss_dfl)
            };
            timing.add_event("regression_loss");

            let losses = Tensor::f_sum_tensors(
                [
                    Some(&loss_cls * self.loss_cls_weight),
                    Some(&loss_box * self.loss_box_weight),
                    loss_dfl.as_ref().map(|loss_dfl| loss_dfl * self.loss_dfl_weight),
                ]
                .into_iter()
                .flatten(),
            )?;
            debug_assert!(!bool::from(losses.isnan().any()), "NaN detected");

            timing.report();

            Ok((
                CriterionOutput {
                    loss_cls,
                    loss_box,
                    loss_dfl,
                    losses,
                },
                CriterionAuxiliary {
                    fg_mask,
                    target_scores,
                    target_bboxes,
                    normalizer,
                },
            ))
        }

        /// The sum of target scores averaged over the workers and clamped
        /// to at least one.
        ///
        /// The reduction is a collective call that every worker must make.
        pub fn normalizer(
            target_scores_sum: &Tensor,
            process_group: &dyn ProcessGroup,
        ) -> Result<Tensor> {
            let reduced = process_group.all_reduce_sum(&target_scores_sum.detach())?;
            let world_size = process_group.world_size() as f64;
            Ok((reduced / world_size).clamp_min(1.0))
        }

        fn assign_image(
            &self,
            flat: &FlatOutput,
            batch_index: i64,
            target: &DetectionTarget,
        ) -> Result<AssignerOutput> {
            let num_anchors = flat.num_anchors();
            let device = flat.device();

            if target.is_degenerate() {
                return Ok(AssignerOutput::background(
                    num_anchors,
                    self.num_classes,
                    device,
                ));
            }

            let num_collapsed = target.num_collapsed_boxes();
            if num_collapsed > 0 {
                warn!(
                    "image {} has {} ground truth boxes with zero width or height",
                    batch_index, num_collapsed
                );
            }

            let gt_labels = target.labels.to_device(device).reshape(&[1, -1, 1]);
            let gt_bboxes = target
                .boxes
                .to_device(device)
                .to_kind(Kind::Float)
                .reshape(&[1, -1, 4]);

            tch::no_grad(|| {
                let pd_scores = flat.cls.narrow(0, batch_index, 1).detach().sigmoid();
                let pd_bboxes = flat.boxes.narrow(0, batch_index, 1).detach();
                self.assigner.forward(
                    &pd_scores,
                    &pd_bboxes,
                    &flat.anchors,
                    &gt_labels,
                    &gt_bboxes,
                )
            })
        }
    }
}

mod criterion_output {
    use super::*;

    pub const LOSS_CLS: &str = "loss_cls";
    pub const LOSS_BOX: &str = "loss_box";
    pub const LOSS_DFL: &str = "loss_dfl";
    pub const LOSSES: &str = "losses";

    /// The losses of a batch.
    #[derive(Debug)]
    pub struct CriterionOutput {
        pub loss_cls: Tensor,
        pub loss_box: Tensor,
        /// Present only if the regression uses more than one bin.
        pub loss_dfl: Option<Tensor>,
        /// The weighted sum of the losses.
        pub losses: Tensor,
    }

    impl CriterionOutput {
        /// Copy the scalar losses by name.
        pub fn to_dict(&self) -> IndexMap<&'static str, f64> {
            let Self {
                loss_cls,
                loss_box,
                loss_dfl,
                losses,
            } = self;

            let mut dict = IndexMap::new();
            dict.insert(LOSS_CLS, f64::from(loss_cls));
            dict.insert(LOSS_BOX, f64::from(loss_box));
            if let Some(loss_dfl) = loss_dfl {
                dict.insert(LOSS_DFL, f64::from(loss_dfl));
            }
            dict.insert(LOSSES, f64::from(losses));
            dict
        }
    }

    /// The assignment behind the losses, flattened over the batch.
    #[derive(Debug, TensorLike)]
    pub struct CriterionAuxiliary {
        /// Shape `[batch * anchors]`.
        pub fg_mask: Tensor,
        /// Shape `[batch * anchors, num_classes]`.
        pub target_scores: Tensor,
        /// Shape `[batch * anchors, 4]`.
        pub target_bboxes: Tensor,
        /// The scalar normalizer of the losses.
        pub normalizer: Tensor,
    }
}
