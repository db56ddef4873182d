use crate::common::*;

pub trait TensorExt {
    fn is_empty(&self) -> bool;

    /// Sum up a non-empty sequence of tensors.
    fn f_sum_tensors<T>(tensors: impl IntoIterator<Item = T>) -> Result<Tensor>
    where
        T: Borrow<Tensor>,
    {
        let mut iter = tensors.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| format_err!("the input iterator must not be empty"))?
            .borrow()
            .shallow_clone();
        let sum = iter.try_fold(first, |lhs, rhs| lhs.f_add(rhs.borrow()))?;
        Ok(sum)
    }

    /// Split the last dimension into unit-sized columns.
    fn unbind_last(&self) -> Vec<Tensor>;
}

impl TensorExt for Tensor {
    fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    fn unbind_last(&self) -> Vec<Tensor> {
        let last = self.size().last().copied().unwrap_or(0);
        (0..last).map(|index| self.narrow(-1, index, 1)).collect()
    }
}
