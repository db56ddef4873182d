pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use getset::Getters;
pub use itertools::Itertools;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    convert::{TryFrom, TryInto},
    f64::consts::PI,
};
pub use tch::{Device, Kind, Tensor};
pub use tch_tensor_like::TensorLike;
