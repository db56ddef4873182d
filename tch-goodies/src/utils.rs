/// Small constant added to box denominators.
pub const EPSILON: f64 = 1e-7;

/// The margin kept below the last regression bin by [bbox2dist](crate::bbox2dist).
pub const DIST_EPSILON: f64 = 0.01;
