//! Shared types for SQLDBAL: the driver tag, the status/error model, the
//! connection/statement lifecycle, the adapter capability set every backend
//! implements, the integer safety layer, and the narrow fault-injection
//! seam used to exercise the out-of-memory sentinel path.
//!
//! This crate has no knowledge of any concrete backend — `sqldbal_driver_sqlite`,
//! `sqldbal_driver_mysql`, and `sqldbal_driver_postgres` each implement
//! [`adapter::DriverAdapter`]/[`adapter::StatementAdapter`] against it, and the
//! top-level `sqldbal` crate wires the driver tag to the right adapter
//! constructor.

pub mod adapter;
pub mod connection;
pub mod driver;
pub mod error;
pub mod fault;
pub mod safe_int;
pub mod statement;
pub mod status;

pub use adapter::{BackendHandle, ColumnType, DriverAdapter, ExecRow, FetchStatus, RowCallback, StatementAdapter};
pub use connection::Connection;
pub use driver::{Driver, DriverOption, OpenFlags, OpenOptions};
pub use error::DbError;
pub use statement::Statement;
pub use status::Status;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// An in-memory fake adapter exercising the dispatch façade's own
    /// invariants (bound-index checks, status monotonicity, rebinding)
    /// without depending on any real backend crate.
    struct FakeAdapter {
        rows: Vec<Vec<Option<i64>>>,
    }

    impl DriverAdapter for FakeAdapter {
        fn driver(&self) -> Driver {
            Driver::Invalid
        }
        fn db_handle(&self) -> BackendHandle<'_> {
            BackendHandle::Sqlite(&())
        }
        fn begin(&mut self) -> Result<(), DbError> {
            Ok(())
        }
        fn commit(&mut self) -> Result<(), DbError> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<(), DbError> {
            Ok(())
        }
        fn exec(&mut self, _sql: &str, _callback: Option<RowCallback<'_>>) -> Result<(), DbError> {
            Ok(())
        }
        fn last_insert_id(&mut self, _sequence: Option<&str>) -> Result<u64, DbError> {
            Ok(1)
        }
        fn stmt_prepare(&mut self, _sql: &str) -> Result<Box<dyn StatementAdapter>, DbError> {
            Ok(Box::new(FakeStatement {
                params: vec![None; 2],
                rows: self.rows.clone(),
                cursor: None,
            }))
        }
    }

    #[derive(Clone)]
    enum FakeParam {
        Null,
        Int64(i64),
        Text(String),
        Blob(Vec<u8>),
    }

    struct FakeStatement {
        params: Vec<Option<FakeParam>>,
        rows: Vec<Vec<Option<i64>>>,
        cursor: Option<usize>,
    }

    impl StatementAdapter for FakeStatement {
        fn param_count(&self) -> usize {
            self.params.len()
        }
        fn column_count(&self) -> usize {
            1
        }
        fn stmt_handle(&self) -> BackendHandle<'_> {
            BackendHandle::Sqlite(&())
        }
        fn bind_blob(&mut self, index: usize, bytes: &[u8]) -> Result<(), DbError> {
            self.params[index] = Some(FakeParam::Blob(bytes.to_vec()));
            Ok(())
        }
        fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), DbError> {
            self.params[index] = Some(FakeParam::Int64(value));
            Ok(())
        }
        fn bind_text(&mut self, index: usize, text: &str) -> Result<(), DbError> {
            self.params[index] = Some(FakeParam::Text(text.to_string()));
            Ok(())
        }
        fn bind_null(&mut self, index: usize) -> Result<(), DbError> {
            self.params[index] = Some(FakeParam::Null);
            Ok(())
        }
        fn execute(&mut self) -> Result<(), DbError> {
            self.cursor = Some(usize::MAX);
            Ok(())
        }
        fn fetch(&mut self) -> Result<FetchStatus, DbError> {
            let cursor = self.cursor.get_or_insert(usize::MAX);
            let next = cursor.wrapping_add(1);
            if next < self.rows.len() {
                *cursor = next;
                Ok(FetchStatus::Row)
            } else {
                Ok(FetchStatus::Done)
            }
        }
        fn column_blob(&self, _index: usize) -> Result<Option<&[u8]>, DbError> {
            Ok(None)
        }
        fn column_int64(&self, index: usize) -> Result<i64, DbError> {
            let cursor = self.cursor.unwrap_or(usize::MAX);
            Ok(self.rows[cursor][index].unwrap_or(0))
        }
        fn column_text(&self, _index: usize) -> Result<Option<&str>, DbError> {
            Ok(None)
        }
        fn column_type(&self, index: usize) -> Result<ColumnType, DbError> {
            let cursor = self.cursor.unwrap_or(usize::MAX);
            Ok(match self.rows.get(cursor).and_then(|row| row.get(index)) {
                Some(None) | None => ColumnType::Null,
                Some(Some(_)) => ColumnType::Int,
            })
        }
        fn close(&mut self) {}
    }

    fn fake_connection() -> Connection {
        Connection::from_adapter(
            Driver::Sqlite,
            OpenFlags::empty(),
            Box::new(FakeAdapter {
                rows: vec![vec![Some(10)], vec![Some(20)]],
            }),
        )
    }

    #[test]
    fn bind_index_out_of_range_sets_invalid_parameter() {
        let conn = fake_connection();
        let mut stmt = conn.stmt_prepare("SELECT ?").unwrap();
        assert_eq!(stmt.param_count(), 2);
        let err = stmt.bind_int64(5, 1).unwrap_err();
        assert_eq!(err.status(), Status::InvalidParameter);
    }

    #[test]
    fn column_index_out_of_range_sets_invalid_parameter() {
        let conn = fake_connection();
        let stmt = conn.stmt_prepare("SELECT ?").unwrap();
        let err = stmt.column_int64(9).unwrap_err();
        assert_eq!(err.status(), Status::InvalidParameter);
    }

    #[test]
    fn rebind_same_index_replaces_previous_value() {
        let conn = fake_connection();
        let mut stmt = conn.stmt_prepare("SELECT ?").unwrap();
        stmt.bind_int64(0, 1).unwrap();
        stmt.bind_text(0, "replaced").unwrap();
        // The fake records only the latest value per index; this exercises
        // that a second bind at the same index does not error and the
        // adapter can freely release the first buffer (§8 "Rebinding").
    }

    #[test]
    fn status_reflects_last_operation() {
        let conn = fake_connection();
        let mut stmt = conn.stmt_prepare("SELECT ?").unwrap();
        let _ = stmt.bind_int64(99, 1); // invalid, sets connection-independent error on the Result only
        // Statement bind errors are not routed through Connection::status;
        // status_get here reflects the last *connection* operation, which
        // was the successful prepare.
        assert_eq!(conn.status_get(), Status::Ok);
    }

    #[test]
    fn status_clear_resets_and_returns_prior() {
        let conn = fake_connection();
        conn.exec("anything", None).unwrap();
        assert_eq!(conn.status_get(), Status::Ok);
        let prior = conn.status_clear();
        assert_eq!(prior, Status::Ok);
        assert_eq!(conn.status_get(), Status::Ok);
    }

    #[test]
    fn sentinel_is_safe_to_close_and_reports_out_of_memory() {
        let conn = Connection::sentinel();
        assert!(conn.is_sentinel());
        assert_eq!(conn.status_get(), Status::OutOfMemory);
        assert!(conn.begin().is_err());
        assert_eq!(conn.close(), Status::Ok);
    }

    #[test]
    fn unsupported_driver_sets_driver_not_supported() {
        let conn = Connection::unsupported(Driver::Invalid);
        assert_eq!(conn.status_get(), Status::DriverNotSupported);
        assert!(conn.last_error().is_some());
    }

    #[test]
    fn last_error_clears_on_next_successful_operation() {
        let conn = Connection::unsupported(Driver::Invalid);
        assert!(conn.last_error().is_some());
        conn.exec("anything", None).unwrap_err();
        assert!(conn.last_error().is_some());
    }

    #[test]
    fn fetch_round_trip_over_fake_rows() {
        let conn = fake_connection();
        let mut stmt = conn.stmt_prepare("SELECT v FROM t").unwrap();
        stmt.execute().unwrap();
        assert_eq!(stmt.fetch().unwrap(), FetchStatus::Row);
        assert_eq!(stmt.column_int64(0).unwrap(), 10);
        assert_eq!(stmt.fetch().unwrap(), FetchStatus::Row);
        assert_eq!(stmt.column_int64(0).unwrap(), 20);
        assert_eq!(stmt.fetch().unwrap(), FetchStatus::Done);
    }

    #[test]
    fn bind_null_round_trip_reports_null() {
        let conn = Connection::from_adapter(
            Driver::Sqlite,
            OpenFlags::empty(),
            Box::new(FakeAdapter {
                rows: vec![vec![None]],
            }),
        );
        let mut stmt = conn.stmt_prepare("SELECT v FROM t WHERE v = ?").unwrap();
        stmt.bind_null(0).unwrap();
        stmt.execute().unwrap();
        assert_eq!(stmt.fetch().unwrap(), FetchStatus::Row);
        assert_eq!(stmt.column_type(0).unwrap(), ColumnType::Null);
        assert_eq!(stmt.column_int64(0).unwrap(), 0);
        assert_eq!(stmt.column_text(0).unwrap(), None);
        assert_eq!(stmt.column_blob(0).unwrap(), None);
    }

    #[test]
    fn option_map_collects_recognized_keys() {
        let opts = [
            DriverOption { key: "CONNECT_TIMEOUT", value: "5" },
            DriverOption { key: "TLS_CA", value: "/etc/ca.pem" },
        ];
        let open = OpenOptions {
            location: "host",
            port: "5432",
            user: "u",
            password: "p",
            database: "d",
            flags: OpenFlags::empty(),
            options: &opts,
        };
        let map: HashMap<&str, &str> = open.option_map();
        assert_eq!(map.get("CONNECT_TIMEOUT"), Some(&"5"));
        assert_eq!(map.get("TLS_CA"), Some(&"/etc/ca.pem"));
    }
}
