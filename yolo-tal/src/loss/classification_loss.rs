use super::{BceWithLogitsLoss, FocalLoss, FocalLossInit};
use crate::common::*;

/// The choice of classification loss function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationLossKind {
    /// Binary cross entropy on logits.
    Bce,
    /// Focal modulation wrapped around binary cross entropy.
    Focal,
}

impl Default for ClassificationLossKind {
    fn default() -> Self {
        Self::Bce
    }
}

#[derive(Debug)]
pub struct ClassificationLossInit {
    pub kind: ClassificationLossKind,
    pub reduction: Reduction,
    pub focal_gamma: f64,
    pub focal_alpha: f64,
}

impl ClassificationLossInit {
    pub fn default(kind: ClassificationLossKind, reduction: Reduction) -> Self {
        Self {
            kind,
            reduction,
            focal_gamma: 1.5,
            focal_alpha: 0.25,
        }
    }

    pub fn build(self) -> Result<ClassificationLoss> {
        let Self {
            kind,
            reduction,
            focal_gamma,
            focal_alpha,
        } = self;

        let loss = match kind {
            ClassificationLossKind::Bce => {
                ClassificationLoss::Bce(BceWithLogitsLoss::new(reduction))
            }
            ClassificationLossKind::Focal => {
                let bce = BceWithLogitsLoss::new(Reduction::None);
                let focal = FocalLossInit {
                    gamma: focal_gamma,
                    alpha: focal_alpha,
                    ..FocalLossInit::default(reduction, move |input, target| {
                        bce.forward(input, target)
                    })
                }
                .build()?;
                ClassificationLoss::Focal(focal)
            }
        };

        Ok(loss)
    }
}

/// Classification loss on logits against soft class scores.
#[derive(Debug)]
pub enum ClassificationLoss {
    Bce(BceWithLogitsLoss),
    Focal(FocalLoss),
}

impl ClassificationLoss {
    /// Compute the loss of `pred_logits` against `gt_score`, both in shape
    /// `[.., num_classes]`. Inputs are promoted to single precision.
    pub fn forward(&self, pred_logits: &Tensor, gt_score: &Tensor) -> Tensor {
        let pred_logits = pred_logits.to_kind(Kind::Float);
        let gt_score = gt_score.to_kind(Kind::Float);

        match self {
            Self::Bce(loss) => loss.forward(&pred_logits, &gt_score),
            Self::Focal(loss) => loss.forward(&pred_logits, &gt_score),
        }
    }

    pub fn kind(&self) -> ClassificationLossKind {
        match self {
            Self::Bce(_) => ClassificationLossKind::Bce,
            Self::Focal(_) => ClassificationLossKind::Focal,
        }
    }
}
