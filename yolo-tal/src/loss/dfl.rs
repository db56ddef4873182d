use super::CrossEntropyLoss;
use crate::common::*;

/// Distribution focal loss of the regression bins.
///
/// `pred_regs` holds the bin logits in shape `[N, 4 * reg_max]` and `target`
/// the left, top, right and bottom distances in shape `[N, 4]`, measured in
/// bins and lying in `[0, reg_max - 1)`. Each distance is split between its
/// two neighboring bins by linear interpolation. The output is the mean
/// over the four sides in shape `[N]`.
pub fn distribution_focal_loss(pred_regs: &Tensor, target: &Tensor, reg_max: i64) -> Tensor {
    assert!(reg_max >= 2, "reg_max must be at least 2");
    let target = target.to_kind(Kind::Float);
    let num_instances = target.size()[0];
    assert_eq!(
        pred_regs.size(),
        [num_instances, 4 * reg_max],
        "pred_regs must have shape [{}, {}]",
        num_instances,
        4 * reg_max
    );

    let target_left = target.to_kind(Kind::Int64);
    let target_right = &target_left + 1;
    let weight_left = target_right.to_kind(Kind::Float) - &target;
    let weight_right = 1.0 - &weight_left;

    let logits = pred_regs.reshape(&[-1, reg_max]);
    let cross_entropy = CrossEntropyLoss::new(true, Reduction::None);

    let loss_left = cross_entropy
        .forward(&logits, &target_left.reshape(&[-1]))
        .view([-1, 4])
        * &weight_left;
    let loss_right = cross_entropy
        .forward(&logits, &target_right.reshape(&[-1]))
        .view([-1, 4])
        * &weight_right;

    (loss_left + loss_right).mean_dim(&[-1], false, Kind::Float)
}
