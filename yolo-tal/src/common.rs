pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use getset::CopyGetters;
pub use indexmap::IndexMap;
pub use itertools::{izip, Itertools as _};
pub use log::{debug, log_enabled, trace, warn, Level};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{path::Path, sync::Mutex};
pub use tch::{Device, Kind, Reduction, Tensor};
pub use tch_tensor_like::TensorLike;

unzip_n::unzip_n!(pub 3);
unzip_n::unzip_n!(pub 5);
