use super::{ClassificationLossKind, CriterionInit, TaskAlignedAssignerInit};
use crate::common::*;

/// The loss function configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The number of object classes.
    pub num_classes: usize,
    /// The number of regression bins per box side. The distribution focal
    /// loss is disabled if it is one.
    #[serde(default = "default_reg_max")]
    pub reg_max: usize,
    /// The weight factor of classification loss.
    #[serde(default = "default_loss_cls_weight")]
    pub loss_cls_weight: R64,
    /// The weight factor of box loss.
    #[serde(default = "default_loss_box_weight")]
    pub loss_box_weight: R64,
    /// The weight factor of distribution focal loss.
    #[serde(default = "default_loss_dfl_weight")]
    pub loss_dfl_weight: R64,
    /// The hyperparameters of the task-aligned assigner.
    #[serde(default)]
    pub matcher_hpy: MatcherConfig,
    /// The choice of classification loss function.
    #[serde(default)]
    pub cls_loss: ClassificationLossKind,
    /// The gamma coefficient of focal loss.
    #[serde(default = "default_focal_gamma")]
    pub focal_gamma: R64,
    /// The alpha coefficient of focal loss.
    #[serde(default = "default_focal_alpha")]
    pub focal_alpha: R64,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file '{}'", path.display()))?;
        Self::from_json5(&text)
    }

    pub fn from_json5(text: &str) -> Result<Self> {
        let config = json5::from_str(text)?;
        Ok(config)
    }

    pub fn criterion_init(&self) -> CriterionInit {
        let Self {
            num_classes,
            reg_max,
            loss_cls_weight,
            loss_box_weight,
            loss_dfl_weight,
            ref matcher_hpy,
            cls_loss,
            focal_gamma,
            focal_alpha,
        } = *self;

        CriterionInit {
            num_classes,
            reg_max,
            loss_cls_weight: loss_cls_weight.raw(),
            loss_box_weight: loss_box_weight.raw(),
            loss_dfl_weight: loss_dfl_weight.raw(),
            cls_loss,
            focal_gamma: focal_gamma.raw(),
            focal_alpha: focal_alpha.raw(),
            matcher: matcher_hpy.assigner_init(num_classes),
        }
    }
}

/// The task-aligned assigner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// The maximum number of anchors assigned to a ground truth box.
    #[serde(default = "default_topk_candidates")]
    pub topk_candidates: usize,
    /// The exponent of the class score.
    #[serde(default = "default_alpha")]
    pub alpha: R64,
    /// The exponent of the box overlap.
    #[serde(default = "default_beta")]
    pub beta: R64,
}

impl MatcherConfig {
    pub fn assigner_init(&self, num_classes: usize) -> TaskAlignedAssignerInit {
        TaskAlignedAssignerInit {
            topk_candidates: self.topk_candidates,
            alpha: self.alpha.raw(),
            beta: self.beta.raw(),
            ..TaskAlignedAssignerInit::new(num_classes)
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            topk_candidates: default_topk_candidates(),
            alpha: default_alpha(),
            beta: default_beta(),
        }
    }
}

fn default_reg_max() -> usize {
    16
}

fn default_loss_cls_weight() -> R64 {
    r64(0.5)
}

fn default_loss_box_weight() -> R64 {
    r64(7.5)
}

fn default_loss_dfl_weight() -> R64 {
    r64(1.5)
}

fn default_focal_gamma() -> R64 {
    r64(1.5)
}

fn default_focal_alpha() -> R64 {
    r64(0.25)
}

fn default_topk_candidates() -> usize {
    10
}

fn default_alpha() -> R64 {
    r64(0.5)
}

fn default_beta() -> R64 {
    r64(6.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_recipe() -> Result<()> {
        let config = Config::from_json5("{ num_classes: 80 }")?;
        assert_eq!(config.reg_max, 16);
        assert_eq!(config.loss_cls_weight, r64(0.5));
        assert_eq!(config.loss_box_weight, r64(7.5));
        assert_eq!(config.loss_dfl_weight, r64(1.5));
        assert_eq!(config.matcher_hpy, MatcherConfig::default());
        assert_eq!(config.cls_loss, ClassificationLossKind::Bce);

        let criterion = config.criterion_init().build()?;
        assert!(criterion.use_dfl());
        assert_eq!(criterion.assigner().topk_candidates(), 10);
        Ok(())
    }

    #[test]
    fn parse_full_config() -> Result<()> {
        let text = r#"
        {
            // single bin regression
            num_classes: 3,
            reg_max: 1,
            loss_cls_weight: 1.0,
            loss_box_weight: 2.0,
            loss_dfl_weight: 0.0,
            matcher_hpy: { topk_candidates: 13, alpha: 1.0, beta: 4.0 },
            cls_loss: "focal",
        }
        "#;
        let config = Config::from_json5(text)?;
        let init = config.criterion_init();
        assert_eq!(init.num_classes, 3);
        assert_eq!(init.matcher.num_classes, 3);
        assert_eq!(init.matcher.topk_candidates, 13);
        assert_eq!(init.cls_loss, ClassificationLossKind::Focal);

        let criterion = init.build()?;
        assert!(!criterion.use_dfl());
        Ok(())
    }

    #[test]
    fn reject_invalid_values() {
        let build = |text: &str| -> Result<_> { Config::from_json5(text)?.criterion_init().build() };
        assert!(build("{ num_classes: 0 }").is_err());
        assert!(build("{ num_classes: 2, reg_max: 0 }").is_err());
        assert!(build("{ num_classes: 2, matcher_hpy: { topk_candidates: 0 } }").is_err());
        assert!(build("{ num_classes: 2, loss_cls_weight: }").is_err());

        let init = CriterionInit {
            loss_box_weight: -1.0,
            ..CriterionInit::new(2)
        };
        assert!(init.build().is_err());
    }
}
