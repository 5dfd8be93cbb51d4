//! Stable exit codes for `expbox` commands.

use crate::error::ExpboxError;

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input, config error or I/O failure.
pub const INVALID: i32 = 1;
/// The requested experiment (or the active one) does not exist.
pub const NOT_FOUND: i32 = 2;

/// Exit code for a library error.
pub fn for_error(err: &ExpboxError) -> i32 {
    if err.is_not_found() { NOT_FOUND } else { INVALID }
}
