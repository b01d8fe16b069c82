//! Checked integer and string-length arithmetic (§4.10).
//!
//! Every conversion and arithmetic op here goes through `TryFrom`/
//! `checked_add`/`checked_mul` rather than a silent-wraparound primitive, so
//! overflow always surfaces as a `DbError` instead of a corrupted value.

use crate::error::DbError;

/// Converts a decimal port string to `u16`, rejecting values above 65535
/// (§4.2 step 1).
pub fn port_from_str(s: &str) -> Result<u16, DbError> {
    if s.is_empty() {
        return Ok(0);
    }
    s.parse::<u16>()
        .map_err(|_| DbError::invalid_parameter(format!("invalid port: {s:?}")))
}

/// `i64` -> `u64`, rejecting negative values.
pub fn i64_to_u64(v: i64) -> Result<u64, DbError> {
    u64::try_from(v).map_err(|_| DbError::Overflow(format!("{v} does not fit in u64")))
}

/// `u64` -> `usize`, checked for the target platform's width.
pub fn u64_to_usize(v: u64) -> Result<usize, DbError> {
    usize::try_from(v).map_err(|_| DbError::Overflow(format!("{v} does not fit in usize")))
}

/// `i64` -> `usize`, rejecting negative values and values too wide for the platform.
pub fn i64_to_usize(v: i64) -> Result<usize, DbError> {
    usize::try_from(v).map_err(|_| DbError::Overflow(format!("{v} does not fit in usize")))
}

/// Checked addition, used for length+1 terminator arithmetic (§4.3).
pub fn checked_add(a: usize, b: usize) -> Result<usize, DbError> {
    a.checked_add(b)
        .ok_or_else(|| DbError::Overflow(format!("{a} + {b} overflows usize")))
}

/// Checked multiplication, used by callers that size a buffer as
/// `nelem * size` before allocating it.
pub fn checked_mul(nelem: usize, size: usize) -> Result<usize, DbError> {
    nelem
        .checked_mul(size)
        .ok_or_else(|| DbError::Overflow(format!("{nelem} * {size} overflows usize")))
}

/// Rejects `usize::MAX`, reserved to mean "unknown length" rather than a
/// real buffer size.
pub fn checked_len(len: usize) -> Result<usize, DbError> {
    if len == usize::MAX {
        return Err(DbError::Overflow("length is SIZE_MAX".into()));
    }
    Ok(len)
}
