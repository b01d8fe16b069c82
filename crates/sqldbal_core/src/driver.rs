use bitflags::bitflags;
use std::collections::HashMap;

/// Driver tag selecting which adapter a connection dispatches onto (§6.2).
///
/// `MySql` and `MariaDb` are distinct tags that share one adapter
/// implementation, since the two wire protocols are identical at this
/// layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    Sqlite,
    MySql,
    MariaDb,
    Postgres,
    Invalid,
}

impl Driver {
    pub fn is_mysql_family(self) -> bool {
        matches!(self, Driver::MySql | Driver::MariaDb)
    }
}

bitflags! {
    /// Open-time flag set (§6.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const DEBUG = 1 << 0;
        const EMBEDDED_OPEN_READONLY = 1 << 1;
        const EMBEDDED_OPEN_READWRITE = 1 << 2;
        const EMBEDDED_OPEN_CREATE = 1 << 3;
        /// Reserved; never set by callers. Marks the static sentinel connection.
        const INVALID_MEMORY = 1 << 4;
    }
}

/// A borrowed key/value option pair recognized by §6.3.
#[derive(Debug, Clone, Copy)]
pub struct DriverOption<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// Arguments to `open` (§4.2, §6.1): location/port/user/password/database
/// plus flags and an option list. All string fields are borrowed for the
/// duration of the call, per §3's option-list lifetime invariant.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions<'a> {
    pub location: &'a str,
    pub port: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    pub database: &'a str,
    pub flags: OpenFlags,
    pub options: &'a [DriverOption<'a>],
}

impl<'a> OpenOptions<'a> {
    /// Builds the recognized-key subset as a plain map, leaving unknown
    /// keys for the caller to report as `Status::InvalidParameter`
    /// (§4.2 step 2: unknown keys do not abort prior accepted keys).
    pub fn option_map(&self) -> HashMap<&'a str, &'a str> {
        self.options.iter().map(|o| (o.key, o.value)).collect()
    }
}
