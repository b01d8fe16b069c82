use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::types::{Null as SqliteNull, ValueRef};
use rusqlite::{Connection as RusqliteConnection, ErrorCode, OpenFlags as RusqliteOpenFlags, Row};

use sqldbal_core::{
    BackendHandle, ColumnType, Driver, DriverAdapter, DbError, ExecRow, FetchStatus, OpenFlags,
    OpenOptions, RowCallback, StatementAdapter,
};

const BUSY_RETRY_LIMIT: u32 = 10;
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Opens a SQLite session for the given options (§4.2, §4.9).
///
/// `opts.port`/`opts.user`/`opts.password`/`opts.database` are ignored:
/// SQLite is file-backed and has no concept of port or authentication.
pub fn open(opts: &OpenOptions<'_>) -> Result<Box<dyn DriverAdapter>, DbError> {
    let mut vfs: Option<&str> = None;
    let mut unknown_key: Option<&str> = None;
    for opt in opts.options {
        match opt.key {
            "VFS" => vfs = Some(opt.value),
            other => {
                if unknown_key.is_none() {
                    unknown_key = Some(other);
                }
            }
        }
    }
    if let Some(key) = unknown_key {
        return Err(DbError::invalid_parameter(format!(
            "unrecognized option key for sqlite: {key:?}"
        )));
    }

    let mut flags = RusqliteOpenFlags::SQLITE_OPEN_NO_MUTEX | RusqliteOpenFlags::SQLITE_OPEN_URI;
    flags |= if opts.flags.contains(OpenFlags::EMBEDDED_OPEN_READONLY) {
        RusqliteOpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        let mut rw = RusqliteOpenFlags::SQLITE_OPEN_READ_WRITE;
        if opts.flags.contains(OpenFlags::EMBEDDED_OPEN_CREATE)
            || !opts.flags.intersects(OpenFlags::EMBEDDED_OPEN_READWRITE)
        {
            rw |= RusqliteOpenFlags::SQLITE_OPEN_CREATE;
        }
        rw
    };

    let conn = match vfs {
        Some(name) => RusqliteConnection::open_with_flags_and_vfs(opts.location, flags, name),
        None => RusqliteConnection::open_with_flags(opts.location, flags),
    }
    .map_err(|e| DbError::open_failed(e.to_string()))?;

    // We implement our own bounded busy-retry (§4.9) instead of relying on
    // SQLite's built-in busy handler, so disable the latter.
    conn.busy_timeout(Duration::from_millis(0))
        .map_err(|e| DbError::open_failed(e.to_string()))?;

    if opts.flags.contains(OpenFlags::DEBUG) {
        log::debug!("[sqlite] opened {}", opts.location);
    }

    Ok(Box::new(SqliteAdapter {
        conn: Arc::new(Mutex::new(conn)),
        debug: opts.flags.contains(OpenFlags::DEBUG),
    }))
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::DatabaseBusy
    )
}

struct SqliteAdapter {
    conn: Arc<Mutex<RusqliteConnection>>,
    debug: bool,
}

impl DriverAdapter for SqliteAdapter {
    fn driver(&self) -> Driver {
        Driver::Sqlite
    }

    fn db_handle(&self) -> BackendHandle<'_> {
        BackendHandle::Sqlite(&self.conn)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.exec("BEGIN", None)
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.exec("COMMIT", None)
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.exec("ROLLBACK", None)
    }

    fn exec(&mut self, sql: &str, mut callback: Option<RowCallback<'_>>) -> Result<(), DbError> {
        if self.debug {
            log::debug!("[sqlite] exec: {sql}");
        }
        let conn = self
            .conn
            .lock()
            .map_err(|_| DbError::exec_failed("connection mutex poisoned"))?;
        let mut stmt = prepare_with_retry(&conn, sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.raw_query();
        loop {
            match next_row_with_retry(&mut rows)? {
                Some(row) => {
                    if let Some(cb) = callback.as_deref_mut() {
                        let mut text_values: Vec<Option<String>> = Vec::with_capacity(column_count);
                        for i in 0..column_count {
                            let v = row
                                .get_ref(i)
                                .map_err(|e| DbError::fetch_failed(e.to_string()))?;
                            text_values.push(value_ref_to_text(v));
                        }
                        let lengths: Vec<usize> =
                            text_values.iter().map(|v| v.as_deref().map_or(0, str::len)).collect();
                        let refs: Vec<Option<&str>> =
                            text_values.iter().map(|v| v.as_deref()).collect();
                        let keep_going = cb(ExecRow {
                            values: &refs,
                            lengths: &lengths,
                        });
                        if !keep_going {
                            break;
                        }
                    }
                }
                None => break,
            }
        }
        Ok(())
    }

    fn last_insert_id(&mut self, _sequence: Option<&str>) -> Result<u64, DbError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DbError::exec_failed("connection mutex poisoned"))?;
        sqldbal_core::safe_int::i64_to_u64(conn.last_insert_rowid())
    }

    fn stmt_prepare(&mut self, sql: &str) -> Result<Box<dyn StatementAdapter>, DbError> {
        let (param_count, column_count) = {
            let conn = self
                .conn
                .lock()
                .map_err(|_| DbError::prepare_failed("connection mutex poisoned"))?;
            let stmt = conn
                .prepare(sql)
                .map_err(|e| DbError::prepare_failed(e.to_string()))?;
            (stmt.parameter_count(), stmt.column_count())
        };
        Ok(Box::new(SqliteStatement {
            conn: Arc::clone(&self.conn),
            sql: sql.to_string(),
            param_count,
            column_count,
            params: vec![None; param_count],
            rows: Vec::new(),
            cursor: None,
            executed: false,
        }))
    }
}

fn prepare_with_retry<'c>(
    conn: &'c RusqliteConnection,
    sql: &str,
) -> Result<rusqlite::Statement<'c>, DbError> {
    let mut attempts = 0;
    loop {
        match conn.prepare(sql) {
            Ok(stmt) => return Ok(stmt),
            Err(e) if is_busy(&e) && attempts < BUSY_RETRY_LIMIT => {
                attempts += 1;
                std::thread::sleep(BUSY_RETRY_DELAY);
            }
            Err(e) => return Err(DbError::exec_failed(e.to_string())),
        }
    }
}

fn next_row_with_retry<'r, 's>(
    rows: &'r mut rusqlite::Rows<'s>,
) -> Result<Option<&'r Row<'s>>, DbError> {
    let mut attempts = 0;
    loop {
        match rows.next() {
            Ok(row) => return Ok(row),
            Err(e) if is_busy(&e) && attempts < BUSY_RETRY_LIMIT => {
                attempts += 1;
                std::thread::sleep(BUSY_RETRY_DELAY);
            }
            Err(e) => return Err(DbError::fetch_failed(e.to_string())),
        }
    }
}

fn value_ref_to_text(v: ValueRef<'_>) -> Option<String> {
    match v {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

#[derive(Clone)]
enum SqliteParam {
    Null,
    Int64(i64),
    Text(String),
    Blob(Vec<u8>),
}

/// Owned copy of a fetched column value (§3: statements materialize their
/// own row buffer rather than holding a `rusqlite::Rows` cursor, which
/// would borrow from the connection and create a self-referential struct —
/// see DESIGN.md).
#[derive(Clone)]
enum SqliteValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqliteValue {
    fn from_value_ref(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => SqliteValue::Null,
            ValueRef::Integer(i) => SqliteValue::Int(i),
            ValueRef::Real(f) => SqliteValue::Real(f),
            ValueRef::Text(t) => SqliteValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqliteValue::Blob(b.to_vec()),
        }
    }
}

struct SqliteStatement {
    conn: Arc<Mutex<RusqliteConnection>>,
    sql: String,
    param_count: usize,
    column_count: usize,
    params: Vec<Option<SqliteParam>>,
    rows: Vec<Vec<SqliteValue>>,
    cursor: Option<usize>,
    executed: bool,
}

fn bind_one(stmt: &mut rusqlite::Statement<'_>, index: usize, p: &SqliteParam) -> Result<(), DbError> {
    let pos = index + 1; // §4.3: the embedded engine is 1-origin internally.
    let result = match p {
        SqliteParam::Null => stmt.raw_bind_parameter(pos, SqliteNull),
        SqliteParam::Int64(v) => stmt.raw_bind_parameter(pos, *v),
        SqliteParam::Text(s) => stmt.raw_bind_parameter(pos, s.as_str()),
        SqliteParam::Blob(b) => stmt.raw_bind_parameter(pos, b.as_slice()),
    };
    result.map_err(|e| DbError::bind_failed(e.to_string()))
}

impl StatementAdapter for SqliteStatement {
    fn param_count(&self) -> usize {
        self.param_count
    }

    fn column_count(&self) -> usize {
        self.column_count
    }

    fn stmt_handle(&self) -> BackendHandle<'_> {
        BackendHandle::Sqlite(&self.conn)
    }

    fn bind_blob(&mut self, index: usize, bytes: &[u8]) -> Result<(), DbError> {
        self.params[index] = Some(SqliteParam::Blob(bytes.to_vec()));
        Ok(())
    }

    fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), DbError> {
        self.params[index] = Some(SqliteParam::Int64(value));
        Ok(())
    }

    fn bind_text(&mut self, index: usize, text: &str) -> Result<(), DbError> {
        self.params[index] = Some(SqliteParam::Text(text.to_string()));
        Ok(())
    }

    fn bind_null(&mut self, index: usize) -> Result<(), DbError> {
        self.params[index] = Some(SqliteParam::Null);
        Ok(())
    }

    fn execute(&mut self) -> Result<(), DbError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DbError::exec_failed("connection mutex poisoned"))?;
        let mut stmt = prepare_with_retry(&conn, &self.sql)?;
        for (i, param) in self.params.iter().enumerate() {
            if let Some(p) = param {
                bind_one(&mut stmt, i, p)?;
            }
        }
        let column_count = stmt.column_count();
        let mut buf = Vec::new();
        {
            let mut rows = stmt.raw_query();
            while let Some(row) = next_row_with_retry(&mut rows)? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let v = row
                        .get_ref(i)
                        .map_err(|e| DbError::fetch_failed(e.to_string()))?;
                    values.push(SqliteValue::from_value_ref(v));
                }
                buf.push(values);
            }
        }
        self.column_count = column_count;
        self.rows = buf;
        self.cursor = None;
        self.executed = true;
        Ok(())
    }

    fn fetch(&mut self) -> Result<FetchStatus, DbError> {
        if !self.executed {
            return Err(DbError::fetch_failed("statement has not been executed"));
        }
        let next = match self.cursor {
            None => 0,
            Some(c) => c + 1,
        };
        if next < self.rows.len() {
            self.cursor = Some(next);
            Ok(FetchStatus::Row)
        } else {
            self.cursor = Some(self.rows.len());
            Ok(FetchStatus::Done)
        }
    }

    fn column_blob(&self, index: usize) -> Result<Option<&[u8]>, DbError> {
        match self.current_value(index)? {
            SqliteValue::Null => Ok(None),
            SqliteValue::Blob(b) => Ok(Some(b.as_slice())),
            SqliteValue::Text(t) => Ok(Some(t.as_bytes())),
            SqliteValue::Int(_) | SqliteValue::Real(_) => Err(DbError::coerce_failed(
                "column value is not convertible to a blob",
            )),
        }
    }

    fn column_int64(&self, index: usize) -> Result<i64, DbError> {
        match self.current_value(index)? {
            SqliteValue::Null => Ok(0),
            SqliteValue::Int(v) => Ok(*v),
            SqliteValue::Real(f) => Ok(*f as i64),
            SqliteValue::Text(t) => t
                .trim()
                .parse::<i64>()
                .map_err(|_| DbError::coerce_failed(format!("cannot parse {t:?} as i64"))),
            SqliteValue::Blob(_) => Err(DbError::coerce_failed("cannot coerce blob to i64")),
        }
    }

    fn column_text(&self, index: usize) -> Result<Option<&str>, DbError> {
        match self.current_value(index)? {
            SqliteValue::Null => Ok(None),
            SqliteValue::Text(t) => Ok(Some(t.as_str())),
            SqliteValue::Blob(b) => std::str::from_utf8(b)
                .map(Some)
                .map_err(|_| DbError::coerce_failed("blob is not valid utf-8")),
            SqliteValue::Int(_) | SqliteValue::Real(_) => Err(DbError::coerce_failed(
                "numeric column requires column_int64",
            )),
        }
    }

    fn column_type(&self, index: usize) -> Result<ColumnType, DbError> {
        Ok(match self.current_value(index)? {
            SqliteValue::Null => ColumnType::Null,
            SqliteValue::Int(_) => ColumnType::Int,
            SqliteValue::Text(_) => ColumnType::Text,
            SqliteValue::Blob(_) => ColumnType::Blob,
            SqliteValue::Real(_) => ColumnType::Other,
        })
    }

    fn close(&mut self) {
        self.rows.clear();
    }
}

impl SqliteStatement {
    fn current_value(&self, index: usize) -> Result<&SqliteValue, DbError> {
        let cursor = self
            .cursor
            .filter(|c| *c < self.rows.len())
            .ok_or_else(|| DbError::fetch_failed("no current row"))?;
        Ok(&self.rows[cursor][index])
    }
}
