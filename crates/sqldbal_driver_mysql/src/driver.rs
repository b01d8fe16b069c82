use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mysql::consts::ColumnFlags;
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Params, SslOpts, Value};

use sqldbal_core::{
    BackendHandle, ColumnType, Driver, DriverAdapter, DbError, ExecRow, FetchStatus, OpenFlags,
    OpenOptions, RowCallback, StatementAdapter,
};

const MYSQL_CONNECT_TIMEOUT_MAX_SECS: f64 = 1000.0;

struct TlsOptions {
    key: Option<String>,
    cert: Option<String>,
    ca: Option<String>,
}

/// Opens a MySQL/MariaDB session for the given options (§4.2, §6.3).
///
/// Serves both the `MySql` and `MariaDb` driver tags; `driver` selects which
/// one is reported back by [`DriverAdapter::driver`].
pub fn open(driver: Driver, opts: &OpenOptions<'_>) -> Result<Box<dyn DriverAdapter>, DbError> {
    let port = sqldbal_core::safe_int::port_from_str(opts.port)?;

    let mut connect_timeout: Option<Duration> = None;
    let mut tls = TlsOptions {
        key: None,
        cert: None,
        ca: None,
    };
    let mut unknown_key: Option<&str> = None;
    for opt in opts.options {
        match opt.key {
            "CONNECT_TIMEOUT" => {
                let secs: f64 = opt
                    .value
                    .parse()
                    .map_err(|_| DbError::invalid_parameter(format!("invalid CONNECT_TIMEOUT: {:?}", opt.value)))?;
                if !(0.0..=MYSQL_CONNECT_TIMEOUT_MAX_SECS).contains(&secs) {
                    return Err(DbError::invalid_parameter(
                        "CONNECT_TIMEOUT exceeds the mysql-family bound of 1000 seconds",
                    ));
                }
                connect_timeout = Some(Duration::from_secs_f64(secs));
            }
            "TLS_KEY" => tls.key = Some(opt.value.to_string()),
            "TLS_CERT" => tls.cert = Some(opt.value.to_string()),
            "TLS_CA" => tls.ca = Some(opt.value.to_string()),
            // Accepted but without effect: the pure-Rust `mysql` client has no
            // capath/cipher-list knobs to forward these onto (see DESIGN.md).
            "TLS_CAPATH" | "TLS_CIPHER" => {}
            other => {
                if unknown_key.is_none() {
                    unknown_key = Some(other);
                }
            }
        }
    }
    if let Some(key) = unknown_key {
        return Err(DbError::invalid_parameter(format!(
            "unrecognized option key for mysql-family: {key:?}"
        )));
    }

    let mut builder = OptsBuilder::default()
        .ip_or_hostname(Some(opts.location))
        .tcp_port(port)
        .user(non_empty(opts.user))
        .pass(non_empty(opts.password));
    if let Some(db) = non_empty(opts.database) {
        builder = builder.db_name(Some(db));
    }
    if let Some(timeout) = connect_timeout {
        builder = builder.tcp_connect_timeout(Some(timeout));
    }
    if tls.key.is_some() || tls.cert.is_some() || tls.ca.is_some() {
        let mut ssl_opts = SslOpts::default();
        if let Some(ca) = &tls.ca {
            ssl_opts = ssl_opts.with_root_cert_path(Some(PathBuf::from(ca)));
        }
        if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
            ssl_opts =
                ssl_opts.with_client_identity(Some(mysql::ClientIdentity::new(cert.into(), key.into())));
        }
        builder = builder.ssl_opts(ssl_opts);
    }

    let conn = Conn::new(builder).map_err(|e| DbError::open_failed(e.to_string()))?;

    if opts.flags.contains(OpenFlags::DEBUG) {
        log::debug!("[mysql] connected to {}:{}", opts.location, port);
    }

    Ok(Box::new(MySqlAdapter {
        driver,
        conn: Arc::new(Mutex::new(conn)),
        debug: opts.flags.contains(OpenFlags::DEBUG),
    }))
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

struct MySqlAdapter {
    driver: Driver,
    conn: Arc<Mutex<Conn>>,
    debug: bool,
}

fn lock_conn(conn: &Arc<Mutex<Conn>>) -> std::sync::MutexGuard<'_, Conn> {
    match conn.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn value_to_text(v: &Value) -> Option<String> {
    match v {
        Value::NULL => None,
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Int(i) => Some(i.to_string()),
        Value::UInt(u) => Some(u.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Double(d) => Some(d.to_string()),
        other => Some(format!("{other:?}")),
    }
}

impl DriverAdapter for MySqlAdapter {
    fn driver(&self) -> Driver {
        self.driver
    }

    fn db_handle(&self) -> BackendHandle<'_> {
        BackendHandle::MySql(&self.conn)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.exec("SET autocommit=0", None)
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.exec("COMMIT", None)?;
        self.exec("SET autocommit=1", None)
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.exec("ROLLBACK", None)?;
        self.exec("SET autocommit=1", None)
    }

    fn exec(&mut self, sql: &str, mut callback: Option<RowCallback<'_>>) -> Result<(), DbError> {
        if self.debug {
            log::debug!("[mysql] exec: {sql}");
        }
        let mut conn = lock_conn(&self.conn);
        let rows: Vec<mysql::Row> = conn
            .query(sql)
            .map_err(|e| DbError::exec_failed(e.to_string()))?;
        if let Some(cb) = callback.as_deref_mut() {
            for row in &rows {
                let column_count = row.columns_ref().len();
                let text_values: Vec<Option<String>> = (0..column_count)
                    .map(|i| row.as_ref(i).and_then(value_to_text))
                    .collect();
                let lengths: Vec<usize> =
                    text_values.iter().map(|v| v.as_deref().map_or(0, str::len)).collect();
                let refs: Vec<Option<&str>> = text_values.iter().map(|v| v.as_deref()).collect();
                let keep_going = cb(ExecRow {
                    values: &refs,
                    lengths: &lengths,
                });
                if !keep_going {
                    break;
                }
            }
        }
        Ok(())
    }

    fn last_insert_id(&mut self, _sequence: Option<&str>) -> Result<u64, DbError> {
        let conn = lock_conn(&self.conn);
        Ok(conn.last_insert_id())
    }

    fn stmt_prepare(&mut self, sql: &str) -> Result<Box<dyn StatementAdapter>, DbError> {
        let (param_count, column_is_binary) = {
            let mut conn = lock_conn(&self.conn);
            let stmt = conn
                .prep(sql)
                .map_err(|e| DbError::prepare_failed(e.to_string()))?;
            let binary_flags: Vec<bool> = stmt
                .columns()
                .iter()
                .map(|c| c.flags().contains(ColumnFlags::BINARY_FLAG))
                .collect();
            (stmt.num_params() as usize, binary_flags)
        };
        Ok(Box::new(MySqlStatement {
            conn: Arc::clone(&self.conn),
            sql: sql.to_string(),
            param_count,
            column_is_binary,
            params: vec![None; param_count],
            rows: Vec::new(),
            cursor: None,
            executed: false,
        }))
    }
}

#[derive(Clone)]
enum MySqlParam {
    Null,
    Int64(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&MySqlParam> for Value {
    fn from(p: &MySqlParam) -> Self {
        match p {
            MySqlParam::Null => Value::NULL,
            MySqlParam::Int64(v) => Value::Int(*v),
            MySqlParam::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
            MySqlParam::Blob(b) => Value::Bytes(b.clone()),
        }
    }
}

/// Owned copy of one fetched column, materialized at `execute()` time for
/// the same reason as the embedded-engine adapter: a `mysql::QueryResult`
/// borrows from the connection, which we cannot store alongside it in one
/// struct without self-reference (see DESIGN.md).
#[derive(Clone)]
enum MySqlColumnValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl MySqlColumnValue {
    fn from_value(v: &Value) -> Self {
        match v {
            Value::NULL => MySqlColumnValue::Null,
            Value::Int(i) => MySqlColumnValue::Int(*i),
            Value::UInt(u) => MySqlColumnValue::UInt(*u),
            Value::Float(f) => MySqlColumnValue::Float(*f as f64),
            Value::Double(d) => MySqlColumnValue::Float(*d),
            Value::Bytes(b) => MySqlColumnValue::Bytes(b.clone()),
            other => MySqlColumnValue::Bytes(format!("{other:?}").into_bytes()),
        }
    }
}

struct MySqlStatement {
    conn: Arc<Mutex<Conn>>,
    sql: String,
    param_count: usize,
    column_is_binary: Vec<bool>,
    params: Vec<Option<MySqlParam>>,
    rows: Vec<Vec<MySqlColumnValue>>,
    cursor: Option<usize>,
    executed: bool,
}

impl StatementAdapter for MySqlStatement {
    fn param_count(&self) -> usize {
        self.param_count
    }

    fn column_count(&self) -> usize {
        self.column_is_binary.len()
    }

    fn stmt_handle(&self) -> BackendHandle<'_> {
        BackendHandle::MySql(&self.conn)
    }

    fn bind_blob(&mut self, index: usize, bytes: &[u8]) -> Result<(), DbError> {
        self.params[index] = Some(MySqlParam::Blob(bytes.to_vec()));
        Ok(())
    }

    fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), DbError> {
        self.params[index] = Some(MySqlParam::Int64(value));
        Ok(())
    }

    fn bind_text(&mut self, index: usize, text: &str) -> Result<(), DbError> {
        self.params[index] = Some(MySqlParam::Text(text.to_string()));
        Ok(())
    }

    fn bind_null(&mut self, index: usize) -> Result<(), DbError> {
        self.params[index] = Some(MySqlParam::Null);
        Ok(())
    }

    fn execute(&mut self) -> Result<(), DbError> {
        let mut conn = lock_conn(&self.conn);
        let stmt = conn
            .prep(&self.sql)
            .map_err(|e| DbError::prepare_failed(e.to_string()))?;

        self.column_is_binary = stmt
            .columns()
            .iter()
            .map(|c| c.flags().contains(ColumnFlags::BINARY_FLAG))
            .collect();

        let values: Vec<Value> = self
            .params
            .iter()
            .map(|p| p.as_ref().map(Value::from).unwrap_or(Value::NULL))
            .collect();
        let bound = if values.is_empty() {
            Params::Empty
        } else {
            Params::Positional(values)
        };

        let rows: Vec<mysql::Row> = conn
            .exec(&stmt, bound)
            .map_err(|e| DbError::exec_failed(e.to_string()))?;

        self.rows = rows
            .iter()
            .map(|row| {
                (0..row.columns_ref().len())
                    .map(|i| {
                        row.as_ref(i)
                            .map(MySqlColumnValue::from_value)
                            .unwrap_or(MySqlColumnValue::Null)
                    })
                    .collect()
            })
            .collect();
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
            MySqlColumnValue::Null => Ok(None),
            MySqlColumnValue::Bytes(b) => Ok(Some(b.as_slice())),
            _ => Err(DbError::coerce_failed("column value is not convertible to a blob")),
        }
    }

    fn column_int64(&self, index: usize) -> Result<i64, DbError> {
        match self.current_value(index)? {
            MySqlColumnValue::Null => Ok(0),
            MySqlColumnValue::Int(v) => Ok(*v),
            MySqlColumnValue::UInt(v) => {
                i64::try_from(*v).map_err(|_| DbError::coerce_failed("unsigned value overflows i64"))
            }
            MySqlColumnValue::Float(f) => Ok(*f as i64),
            MySqlColumnValue::Bytes(b) => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .ok_or_else(|| DbError::coerce_failed("cannot parse column bytes as i64")),
        }
    }

    fn column_text(&self, index: usize) -> Result<Option<&str>, DbError> {
        match self.current_value(index)? {
            MySqlColumnValue::Null => Ok(None),
            MySqlColumnValue::Bytes(b) => std::str::from_utf8(b)
                .map(Some)
                .map_err(|_| DbError::coerce_failed("column bytes are not valid utf-8")),
            _ => Err(DbError::coerce_failed("numeric column requires column_int64")),
        }
    }

    fn column_type(&self, index: usize) -> Result<ColumnType, DbError> {
        Ok(match self.current_value(index)? {
            MySqlColumnValue::Null => ColumnType::Null,
            _ => ColumnType::Blob,
        })
    }

    fn close(&mut self) {
        self.rows.clear();
    }
}

impl MySqlStatement {
    fn current_value(&self, index: usize) -> Result<&MySqlColumnValue, DbError> {
        let cursor = self
            .cursor
            .filter(|c| *c < self.rows.len())
            .ok_or_else(|| DbError::fetch_failed("no current row"))?;
        Ok(&self.rows[cursor][index])
    }
}
