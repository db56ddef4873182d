use crate::common::*;
use tch_goodies::TensorExt as _;

/// Binary cross entropy on logits against soft targets.
///
/// The targets are probabilities in `[0, 1]`, such as the normalized
/// alignment scores of the assigner, rather than hard labels. The loss of
/// each element is minimized where `sigmoid(input)` equals the target.
#[derive(Debug, Clone, Copy)]
pub struct BceWithLogitsLoss {
    reduction: Reduction,
}

impl BceWithLogitsLoss {
    pub fn new(reduction: Reduction) -> Self {
        Self { reduction }
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        assert_eq!(
            input.size(),
            target.size(),
            "input and target tensors must have equal shape"
        );
        debug_assert!(
            bool::from(target.ge(0.0).logical_and(&target.le(1.0)).all()),
            "target values must be in range of [0.0, 1.0]"
        );

        // return zero tensor if (1) input is empty and (2) using mean reduction
        if input.is_empty() && self.reduction == Reduction::Mean {
            return Tensor::zeros(&[], (Kind::Float, input.device())).set_requires_grad(false);
        }

        input.binary_cross_entropy_with_logits::<Tensor>(target, None, None, self.reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn matches_closed_form() {
        let input = Tensor::of_slice(&[0f32, 2.0, -1.0, 3.0]).view([2, 2]);
        let target = Tensor::of_slice(&[1f32, 0.0, 0.5, 1.0]).view([2, 2]);
        let loss = BceWithLogitsLoss::new(Reduction::None).forward(&input, &target);

        let expect: Vec<f32> = [(0f32, 1f32), (2.0, 0.0), (-1.0, 0.5), (3.0, 1.0)]
            .iter()
            .map(|&(x, y)| {
                let p = 1.0 / (1.0 + (-x).exp());
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .collect();

        izip!(Vec::<f32>::from(&loss.reshape(&[-1])), expect)
            .for_each(|(lhs, rhs)| assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-5));
    }

    #[test]
    fn soft_target_is_the_minimum() {
        // logits of the soft targets 0.2, 0.5 and 0.9
        let target = Tensor::of_slice(&[0.2f32, 0.5, 0.9]).view([1, 3]);
        let input = Tensor::of_slice(&[(0.2f32 / 0.8).ln(), 0.0, 9f32.ln()])
            .view([1, 3])
            .set_requires_grad(true);

        let loss = BceWithLogitsLoss::new(Reduction::Sum).forward(&input, &target);
        loss.backward();

        Vec::<f32>::from(&input.grad().reshape(&[-1]))
            .into_iter()
            .for_each(|grad| assert_abs_diff_eq!(grad, 0.0, epsilon = 1e-5));
    }

    #[test]
    fn empty_input_with_mean_reduction() {
        let input = Tensor::zeros(&[0, 3], (Kind::Float, Device::Cpu));
        let loss = BceWithLogitsLoss::new(Reduction::Mean).forward(&input, &input);
        assert_eq!(f64::from(&loss), 0.0);
    }
}
