mod area;
mod cycxhw;
mod size;
mod tlbr;

pub use area::*;
pub use cycxhw::*;
pub use size::*;
pub use tlbr::*;

use crate::common::*;

/// Check that the box parameters share one shape ending with a unit dimension
/// and live on one device.
pub(crate) fn ensure_params_layout(params: &[&Tensor]) -> Result<()> {
    let first = match params.first() {
        Some(first) => first,
        None => return Ok(()),
    };
    let shape = first.size();
    ensure!(
        shape.last() == Some(&1),
        "box parameters must have shape [.., 1], but get {:?}",
        shape
    );
    ensure!(
        params.iter().all(|param| param.size() == shape),
        "size mismatch"
    );
    ensure!(
        params.iter().map(|param| param.device()).all_equal(),
        "device mismatch"
    );
    Ok(())
}
