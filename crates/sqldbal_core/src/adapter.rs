use crate::driver::Driver;
use crate::error::DbError;

/// One row's worth of text-rendered column values, as delivered to an
/// `exec` callback (§4.1 `exec`, §6.1). Every backend renders columns as
/// nullable strings here regardless of its native wire type — callers that
/// need typed access use `stmt_prepare`/`stmt_column_*` instead.
pub struct ExecRow<'a> {
    pub values: &'a [Option<&'a str>],
    pub lengths: &'a [usize],
}

/// Callback invoked once per row by `exec`. Returning `false` aborts
/// iteration early.
pub type RowCallback<'a> = &'a mut dyn FnMut(ExecRow<'_>) -> bool;

/// Logical column kind reported by `stmt_column_type` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Text,
    Blob,
    Null,
    /// Reported by backends with richer native type systems (SQLite) for a
    /// type outside {int, text, blob, null}, e.g. REAL.
    Other,
}

/// Result of advancing a statement's cursor (§4.4). Fetch errors flow
/// through `Result`, so this enum only distinguishes ROW from DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Row,
    Done,
}

/// Opaque backend handle for escape-hatch use (§4.1 `db_handle`/`stmt_handle`,
/// Design Notes "opaque backend handles"). Tagged by `Driver` so a caller
/// must match on the driver before downcasting the contained reference.
pub enum BackendHandle<'a> {
    Sqlite(&'a dyn std::any::Any),
    MySql(&'a dyn std::any::Any),
    Postgres(&'a dyn std::any::Any),
}

impl BackendHandle<'_> {
    pub fn driver(&self) -> Driver {
        match self {
            BackendHandle::Sqlite(_) => Driver::Sqlite,
            BackendHandle::MySql(_) => Driver::MySql,
            BackendHandle::Postgres(_) => Driver::Postgres,
        }
    }
}

/// Per-backend implementation of the capability set in spec §4.1.
///
/// Every adapter is constructed already connected: `open` (the fallible
/// part) happens in each driver crate's free function that *builds* a
/// `Box<dyn DriverAdapter>`, not as a trait method, because by the time we
/// have a value implementing this trait the session is already established
/// (mirrors `rusqlite::Connection::open`, `mysql::Conn::new`,
/// `postgres::Client::connect` each being one constructor call rather than
/// an open-after-alloc two-step).
pub trait DriverAdapter: Send {
    fn driver(&self) -> Driver;

    fn db_handle(&self) -> BackendHandle<'_>;

    fn begin(&mut self) -> Result<(), DbError>;
    fn commit(&mut self) -> Result<(), DbError>;
    fn rollback(&mut self) -> Result<(), DbError>;

    /// Executes a self-contained SQL string, invoking `callback` once per
    /// result row when present (§4.1 `exec`).
    fn exec(&mut self, sql: &str, callback: Option<RowCallback<'_>>) -> Result<(), DbError>;

    /// Yields the last auto-increment/serial id. `sequence` is required for
    /// the PostgreSQL adapter and ignored by the others (§4.1).
    fn last_insert_id(&mut self, sequence: Option<&str>) -> Result<u64, DbError>;

    /// Compiles `sql`, returning a statement adapter whose `param_count`
    /// and `column_count` are already populated (§4.1 `stmt_prepare`).
    fn stmt_prepare(&mut self, sql: &str) -> Result<Box<dyn StatementAdapter>, DbError>;
}

/// Per-backend prepared-statement implementation (§4.1, §4.3, §4.4).
///
/// All indices here are 0-origin on this trait's surface; a backend that
/// needs a different origin internally (SQLite) translates at the edge.
pub trait StatementAdapter: Send {
    fn param_count(&self) -> usize;
    fn column_count(&self) -> usize;

    fn stmt_handle(&self) -> BackendHandle<'_>;

    fn bind_blob(&mut self, index: usize, bytes: &[u8]) -> Result<(), DbError>;
    fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), DbError>;
    fn bind_text(&mut self, index: usize, text: &str) -> Result<(), DbError>;
    fn bind_null(&mut self, index: usize) -> Result<(), DbError>;

    fn execute(&mut self) -> Result<(), DbError>;
    fn fetch(&mut self) -> Result<FetchStatus, DbError>;

    fn column_blob(&self, index: usize) -> Result<Option<&[u8]>, DbError>;
    fn column_int64(&self, index: usize) -> Result<i64, DbError>;
    fn column_text(&self, index: usize) -> Result<Option<&str>, DbError>;
    fn column_type(&self, index: usize) -> Result<ColumnType, DbError>;

    /// Releases the backend statement context and any bound buffers
    /// (§3 Lifecycle). Called exactly once by `Statement::close`/`Drop`.
    fn close(&mut self);
}
