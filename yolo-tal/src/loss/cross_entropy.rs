use crate::common::*;
use tch_goodies::TensorExt as _;

/// Cross entropy on logits in shape `[batch_size, num_classes]`.
///
/// The target is either class indices in shape `[batch_size]` (sparse) or
/// class probabilities in the shape of the input (dense).
#[derive(Debug)]
pub struct CrossEntropyLoss {
    reduction: Reduction,
    sparse_target: bool,
}

impl CrossEntropyLoss {
    pub fn new(sparse_target: bool, reduction: Reduction) -> Self {
        Self {
            reduction,
            sparse_target,
        }
    }

    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Tensor {
        let (batch_size, num_classes) = match input.size().as_slice() {
            &[batch_size, num_classes] => (batch_size, num_classes),
            size => panic!("expect a [batch_size, num_classes] input, but get {:?}", size),
        };

        // return zero tensor if (1) input is empty and (2) using mean reduction
        if input.is_empty() && self.reduction == Reduction::Mean {
            return Tensor::zeros(&[], (Kind::Float, input.device())).set_requires_grad(false);
        }

        let log_prob = input.log_softmax(-1, Kind::Float);

        let loss = if self.sparse_target {
            assert!(
                target.kind() == Kind::Int64 && target.size() == [batch_size],
                "expect target a [{}] int64 tensor",
                batch_size
            );
            debug_assert!(
                bool::from(target.ge(0).all()) && bool::from(target.lt(num_classes).all()),
                "target values must be in range of [0, {})",
                num_classes
            );

            -log_prob
                .gather(1, &target.unsqueeze(1), false)
                .squeeze_dim(1)
        } else {
            assert_eq!(
                target.size(),
                [batch_size, num_classes],
                "dense target must have the shape of the input"
            );
            -(target * &log_prob).sum_dim_intlist(&[1], false, Kind::Float)
        };

        match self.reduction {
            Reduction::None => loss,
            Reduction::Sum => loss.sum(Kind::Float),
            Reduction::Mean => loss.mean(Kind::Float),
            Reduction::Other(_) => unimplemented!(),
        }
    }
}
