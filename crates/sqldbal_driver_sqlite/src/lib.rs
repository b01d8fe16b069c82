//! SQLite adapter for SQLDBAL (§4.2 "Driver adapter — embedded engine").
//!
//! Wraps [`rusqlite`]: file-open with the caller's read/write/create flags,
//! direct exec with a per-row callback, prepare/bind/step/column, 1-based
//! positional binding translated from the public 0-based surface, and the
//! busy-retry/backoff loop from §4.9.

mod driver;

pub use driver::open;
