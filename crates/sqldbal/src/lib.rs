//! SQLDBAL: a uniform, thin abstraction over SQLite ([`rusqlite`]), the
//! MySQL/MariaDB family ([`mysql`]), and PostgreSQL ([`postgres`]) client
//! libraries (§1, §2).
//!
//! This crate is the dispatch façade: it owns no backend logic itself,
//! matching a [`Driver`] tag onto the right adapter crate's `open` function
//! and wrapping whatever comes back in a [`Connection`] — including the two
//! paths that never let `open` itself fail (§4.2): an unrecognized driver
//! tag, and the `sqldbal_core::fault` seam a test can use to force the
//! out-of-memory sentinel. Everything else — connection/statement
//! lifecycle, the bind/fetch protocol, status codes — lives in
//! `sqldbal_core` and is re-exported here for convenience.

pub use sqldbal_core::{
    BackendHandle, ColumnType, Connection, DbError, Driver, DriverOption, ExecRow, FetchStatus,
    OpenFlags, OpenOptions, RowCallback, Statement, Status,
};

/// Opens a connection for `driver` using `opts` (§4.2, §6.1/§6.2).
///
/// Always returns a usable [`Connection`]: a backend connect failure, an
/// unrecognized `driver` tag, or an armed [`sqldbal_core::fault`] flag all
/// produce a connection whose `status_get`/`errstr` report the failure
/// rather than a `Result` the caller must unwrap before having anything to
/// call `close` on.
pub fn open(driver: Driver, opts: &OpenOptions<'_>) -> Connection {
    if sqldbal_core::fault::take_forced_open_oom() {
        return Connection::sentinel();
    }

    let result = match driver {
        Driver::Sqlite => sqldbal_driver_sqlite::open(opts),
        Driver::MySql => sqldbal_driver_mysql::open(Driver::MySql, opts),
        Driver::MariaDb => sqldbal_driver_mysql::open(Driver::MariaDb, opts),
        Driver::Postgres => sqldbal_driver_postgres::open(opts),
        Driver::Invalid => return Connection::unsupported(Driver::Invalid),
    };

    match result {
        Ok(adapter) => Connection::from_adapter(driver, opts.flags, adapter),
        Err(e) => {
            if opts.flags.contains(OpenFlags::DEBUG) {
                log::debug!("[sqldbal] open({driver:?}) failed: {e}");
            }
            Connection::failed(driver, opts.flags, e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_driver_tag_yields_unsupported_connection() {
        let opts = OpenOptions {
            location: "",
            port: "",
            user: "",
            password: "",
            database: "",
            flags: OpenFlags::empty(),
            options: &[],
        };
        let conn = open(Driver::Invalid, &opts);
        assert_eq!(conn.status_get(), Status::DriverNotSupported);
        assert!(conn.db_handle().is_err());
    }

    #[test]
    fn forced_oom_flag_short_circuits_to_sentinel() {
        let opts = OpenOptions {
            location: "/does/not/matter",
            port: "",
            user: "",
            password: "",
            database: "",
            flags: OpenFlags::empty(),
            options: &[],
        };
        sqldbal_core::fault::force_next_open_oom();
        let conn = open(Driver::Sqlite, &opts);
        assert!(conn.is_sentinel());
        assert_eq!(conn.status_get(), Status::OutOfMemory);

        // The flag is one-shot: the very next open is unaffected by it.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel_followup.sqlite3");
        let opts = OpenOptions {
            location: path.to_str().unwrap(),
            port: "",
            user: "",
            password: "",
            database: "",
            flags: OpenFlags::EMBEDDED_OPEN_READWRITE | OpenFlags::EMBEDDED_OPEN_CREATE,
            options: &[],
        };
        let conn = open(Driver::Sqlite, &opts);
        assert!(!conn.is_sentinel());
        assert_eq!(conn.status_get(), Status::Ok);
    }

    #[test]
    fn unknown_option_key_fails_open_without_crashing() {
        let opts = OpenOptions {
            location: "/does/not/matter",
            port: "",
            user: "",
            password: "",
            database: "",
            flags: OpenFlags::empty(),
            options: &[DriverOption {
                key: "NOT_A_REAL_KEY",
                value: "x",
            }],
        };
        let conn = open(Driver::Sqlite, &opts);
        assert_eq!(conn.status_get(), Status::InvalidParameter);
        assert!(conn.last_error().is_some());
    }
}
