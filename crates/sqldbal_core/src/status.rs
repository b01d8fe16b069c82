/// The closed, twelve-member status taxonomy every public operation reports.
///
/// Callers that only inspect [`Connection::status_get`] stay backend-
/// agnostic; idiomatic callers use the `Result<_, DbError>` return value
/// instead and never need to consult this directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    InvalidParameter,
    OutOfMemory,
    Overflow,
    ExecFailed,
    PrepareFailed,
    BindFailed,
    FetchFailed,
    CoerceFailed,
    DriverNotSupported,
    OpenFailed,
    CloseFailed,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Ok
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Ok => "ok",
            Status::InvalidParameter => "invalid-parameter",
            Status::OutOfMemory => "out-of-memory",
            Status::Overflow => "overflow",
            Status::ExecFailed => "exec-failed",
            Status::PrepareFailed => "prepare-failed",
            Status::BindFailed => "bind-failed",
            Status::FetchFailed => "fetch-failed",
            Status::CoerceFailed => "coerce-failed",
            Status::DriverNotSupported => "driver-not-supported",
            Status::OpenFailed => "open-failed",
            Status::CloseFailed => "close-failed",
        };
        f.write_str(s)
    }
}
