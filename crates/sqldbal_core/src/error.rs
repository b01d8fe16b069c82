use thiserror::Error;

use crate::driver::Driver;
use crate::status::Status;

/// Errors surfaced by any driver adapter or by the dispatch façade.
///
/// Every fallible operation returns `Result<T, DbError>`; the connection
/// additionally records the last `DbError` so that `status_get`/`errstr`
/// (the status-code side channel, §7) stay in sync with it.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("integer overflow: {0}")]
    Overflow(String),

    #[error("exec failed: {0}")]
    ExecFailed(String),

    #[error("prepare failed: {0}")]
    PrepareFailed(String),

    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("column coerce failed: {0}")]
    CoerceFailed(String),

    #[error("driver not supported: {0:?}")]
    DriverNotSupported(Driver),

    #[error("open failed: {0}")]
    OpenFailed(String),

    #[error("close failed: {0}")]
    CloseFailed(String),
}

impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::InvalidParameter(s) => DbError::InvalidParameter(s.clone()),
            DbError::OutOfMemory => DbError::OutOfMemory,
            DbError::Overflow(s) => DbError::Overflow(s.clone()),
            DbError::ExecFailed(s) => DbError::ExecFailed(s.clone()),
            DbError::PrepareFailed(s) => DbError::PrepareFailed(s.clone()),
            DbError::BindFailed(s) => DbError::BindFailed(s.clone()),
            DbError::FetchFailed(s) => DbError::FetchFailed(s.clone()),
            DbError::CoerceFailed(s) => DbError::CoerceFailed(s.clone()),
            DbError::DriverNotSupported(d) => DbError::DriverNotSupported(*d),
            DbError::OpenFailed(s) => DbError::OpenFailed(s.clone()),
            DbError::CloseFailed(s) => DbError::CloseFailed(s.clone()),
        }
    }
}

impl DbError {
    /// Maps this error onto the closed [`Status`] taxonomy (§7).
    pub fn status(&self) -> Status {
        match self {
            DbError::InvalidParameter(_) => Status::InvalidParameter,
            DbError::OutOfMemory => Status::OutOfMemory,
            DbError::Overflow(_) => Status::Overflow,
            DbError::ExecFailed(_) => Status::ExecFailed,
            DbError::PrepareFailed(_) => Status::PrepareFailed,
            DbError::BindFailed(_) => Status::BindFailed,
            DbError::FetchFailed(_) => Status::FetchFailed,
            DbError::CoerceFailed(_) => Status::CoerceFailed,
            DbError::DriverNotSupported(_) => Status::DriverNotSupported,
            DbError::OpenFailed(_) => Status::OpenFailed,
            DbError::CloseFailed(_) => Status::CloseFailed,
        }
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn exec_failed(msg: impl Into<String>) -> Self {
        Self::ExecFailed(msg.into())
    }

    pub fn prepare_failed(msg: impl Into<String>) -> Self {
        Self::PrepareFailed(msg.into())
    }

    pub fn bind_failed(msg: impl Into<String>) -> Self {
        Self::BindFailed(msg.into())
    }

    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::FetchFailed(msg.into())
    }

    pub fn coerce_failed(msg: impl Into<String>) -> Self {
        Self::CoerceFailed(msg.into())
    }

    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }
}
