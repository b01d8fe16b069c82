use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use native_tls::TlsConnector;
use postgres::types::ToSql;
use postgres::{Client, NoTls, Row};
use postgres_native_tls::MakeTlsConnector;

use sqldbal_core::{
    BackendHandle, ColumnType, Driver, DriverAdapter, DbError, ExecRow, FetchStatus, OpenFlags,
    OpenOptions, RowCallback, StatementAdapter,
};

use crate::connstring::{self, Field};
use crate::hex_bytea;
use crate::oid::OidCache;

/// `CONNECT_TIMEOUT`/`TLS_*` options recognized for this backend (§6.3).
struct PgOptions<'a> {
    connect_timeout: Option<&'a str>,
    tls_key: Option<&'a str>,
    tls_cert: Option<&'a str>,
    tls_ca: Option<&'a str>,
    tls_mode: &'a str,
}

fn parse_options<'a>(opts: &'a OpenOptions<'a>) -> Result<PgOptions<'a>, DbError> {
    let mut out = PgOptions {
        connect_timeout: None,
        tls_key: None,
        tls_cert: None,
        tls_ca: None,
        tls_mode: "prefer",
    };
    let mut unknown_key: Option<&str> = None;
    for opt in opts.options {
        match opt.key {
            "CONNECT_TIMEOUT" => {
                opt.value.parse::<u32>().map_err(|_| {
                    DbError::invalid_parameter(format!("invalid CONNECT_TIMEOUT: {:?}", opt.value))
                })?;
                out.connect_timeout = Some(opt.value);
            }
            "TLS_KEY" => out.tls_key = Some(opt.value),
            "TLS_CERT" => out.tls_cert = Some(opt.value),
            "TLS_CA" => out.tls_ca = Some(opt.value),
            "TLS_MODE" => {
                if !matches!(
                    opt.value,
                    "disable" | "allow" | "prefer" | "require" | "verify-ca" | "verify-full"
                ) {
                    return Err(DbError::invalid_parameter(format!(
                        "invalid TLS_MODE: {:?}",
                        opt.value
                    )));
                }
                out.tls_mode = opt.value;
            }
            other => {
                if unknown_key.is_none() {
                    unknown_key = Some(other);
                }
            }
        }
    }
    if let Some(key) = unknown_key {
        return Err(DbError::invalid_parameter(format!(
            "unrecognized option key for postgresql: {key:?}"
        )));
    }
    Ok(out)
}

/// Opens a PostgreSQL session (§4.2, §6.4).
pub fn open(opts: &OpenOptions<'_>) -> Result<Box<dyn DriverAdapter>, DbError> {
    let port = sqldbal_core::safe_int::port_from_str(opts.port)?;
    let pg_opts = parse_options(opts)?;

    let port_str = port.to_string();
    let fields = [
        Field { key: "host", value: opts.location },
        Field { key: "port", value: &port_str },
        Field { key: "dbname", value: opts.database },
        Field { key: "user", value: opts.user },
        Field { key: "password", value: opts.password },
        Field {
            key: "connect_timeout",
            value: pg_opts.connect_timeout.unwrap_or(""),
        },
        Field { key: "sslmode", value: pg_opts.tls_mode },
        Field { key: "sslcert", value: pg_opts.tls_cert.unwrap_or("") },
        Field { key: "sslkey", value: pg_opts.tls_key.unwrap_or("") },
        Field { key: "sslrootcert", value: pg_opts.tls_ca.unwrap_or("") },
    ];
    let conn_string = connstring::build(&fields)?;

    let mut client = connect(&conn_string, &pg_opts)?;

    let oid_cache = OidCache::load(&mut client).map_err(|e| {
        DbError::exec_failed(format!("failed to build pg_type OID cache: {e}"))
    })?;

    if opts.flags.contains(OpenFlags::DEBUG) {
        log::debug!("[postgres] connected to {}:{}", opts.location, port);
    }

    Ok(Box::new(PostgresAdapter {
        client: Arc::new(Mutex::new(client)),
        oid_cache: Arc::new(oid_cache),
        stmt_counter: Arc::new(AtomicU64::new(1)),
        debug: opts.flags.contains(OpenFlags::DEBUG),
    }))
}

fn connect(conn_string: &str, pg_opts: &PgOptions<'_>) -> Result<Client, DbError> {
    if pg_opts.tls_mode == "disable" {
        return Client::connect(conn_string, NoTls)
            .map_err(|e| DbError::open_failed(e.to_string()));
    }

    let accept_invalid = matches!(pg_opts.tls_mode, "allow" | "prefer");
    let mut builder = TlsConnector::builder();
    builder
        .danger_accept_invalid_certs(accept_invalid)
        .danger_accept_invalid_hostnames(pg_opts.tls_mode != "verify-full");

    if let Some(ca_path) = pg_opts.tls_ca {
        let pem = std::fs::read(ca_path)
            .map_err(|e| DbError::open_failed(format!("reading TLS_CA {ca_path:?}: {e}")))?;
        let cert = native_tls::Certificate::from_pem(&pem)
            .map_err(|e| DbError::open_failed(format!("parsing TLS_CA {ca_path:?}: {e}")))?;
        builder.add_root_certificate(cert);
    }
    if let (Some(cert_path), Some(key_path)) = (pg_opts.tls_cert, pg_opts.tls_key) {
        let cert_pem = std::fs::read(cert_path)
            .map_err(|e| DbError::open_failed(format!("reading TLS_CERT {cert_path:?}: {e}")))?;
        let key_pem = std::fs::read(key_path)
            .map_err(|e| DbError::open_failed(format!("reading TLS_KEY {key_path:?}: {e}")))?;
        let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem)
            .map_err(|e| DbError::open_failed(format!("loading client identity: {e}")))?;
        builder.identity(identity);
    }

    let connector = builder
        .build()
        .map_err(|e| DbError::open_failed(format!("TLS setup failed: {e}")))?;
    let tls = MakeTlsConnector::new(connector);

    match Client::connect(conn_string, tls) {
        Ok(client) => Ok(client),
        Err(e) if pg_opts.tls_mode == "prefer" => {
            Client::connect(conn_string, NoTls).map_err(|_| DbError::open_failed(e.to_string()))
        }
        Err(e) => Err(DbError::open_failed(e.to_string())),
    }
}

fn lock<'a>(client: &'a Arc<Mutex<Client>>) -> std::sync::MutexGuard<'a, Client> {
    match client.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct PostgresAdapter {
    client: Arc<Mutex<Client>>,
    oid_cache: Arc<OidCache>,
    stmt_counter: Arc<AtomicU64>,
    debug: bool,
}

impl DriverAdapter for PostgresAdapter {
    fn driver(&self) -> Driver {
        Driver::Postgres
    }

    fn db_handle(&self) -> BackendHandle<'_> {
        BackendHandle::Postgres(&self.client)
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
            log::debug!("[postgres] exec: {sql}");
        }
        let mut client = lock(&self.client);
        let rows = client
            .simple_query(sql)
            .map_err(|e| DbError::exec_failed(e.to_string()))?;
        if let Some(cb) = callback.as_deref_mut() {
            for msg in &rows {
                let Some(row) = msg.as_row() else { continue };
                let column_count = row.columns().len();
                let text_values: Vec<Option<&str>> = (0..column_count).map(|i| row.get(i)).collect();
                let lengths: Vec<usize> =
                    text_values.iter().map(|v| v.map_or(0, str::len)).collect();
                let keep_going = cb(ExecRow {
                    values: &text_values,
                    lengths: &lengths,
                });
                if !keep_going {
                    break;
                }
            }
        }
        Ok(())
    }

    /// `sequence` is required for this backend (§4.1, §6.1): the adapter
    /// reads it back via `currval`, which requires a `nextval` to already
    /// have run earlier in the same session.
    fn last_insert_id(&mut self, sequence: Option<&str>) -> Result<u64, DbError> {
        let sequence = sequence.ok_or_else(|| {
            DbError::invalid_parameter("last_insert_id requires a sequence name on postgresql")
        })?;
        let mut client = lock(&self.client);
        let row = client
            .query_one("SELECT currval($1::regclass)", &[&sequence])
            .map_err(|e| DbError::exec_failed(e.to_string()))?;
        let id: i64 = row.get(0);
        sqldbal_core::safe_int::i64_to_u64(id)
    }

    fn stmt_prepare(&mut self, sql: &str) -> Result<Box<dyn StatementAdapter>, DbError> {
        let pg_name = format!("pqs{}", self.stmt_counter.fetch_add(1, Ordering::SeqCst));
        let prepared = {
            let mut client = lock(&self.client);
            client
                .prepare(sql)
                .map_err(|e| DbError::prepare_failed(e.to_string()))?
        };
        let param_count = prepared.params().len();
        let column_count = prepared.columns().len();
        if self.debug {
            log::debug!("[postgres] prepared {pg_name} ({sql})");
        }
        Ok(Box::new(PostgresStatement {
            client: Arc::clone(&self.client),
            oid_cache: Arc::clone(&self.oid_cache),
            prepared,
            pg_name,
            param_count,
            column_count,
            params: vec![None; param_count],
            rows: Vec::new(),
            cursor: None,
            executed: false,
        }))
    }
}

const NULL_PARAM: Option<i32> = None;

#[derive(Clone)]
enum PgParam {
    Null,
    Int64(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl PgParam {
    fn as_to_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            PgParam::Null => &NULL_PARAM,
            PgParam::Int64(v) => v,
            PgParam::Text(s) => s,
            PgParam::Blob(b) => b,
        }
    }
}

/// Owned copy of one fetched column, materialized at `execute()` time, the
/// same shape as the SQLite/MySQL adapters use (§3, DESIGN.md).
#[derive(Clone)]
enum PgValue {
    Null,
    Int(i64),
    Text(String),
    Blob(Vec<u8>),
}

fn value_from_row(row: &Row, index: usize, oid_cache: &OidCache) -> PgValue {
    let oid = row.columns()[index].type_().oid();
    if oid_cache.is_bytea(oid) {
        return match row.try_get::<_, Option<Vec<u8>>>(index) {
            Ok(Some(bytes)) => PgValue::Blob(bytes),
            Ok(None) => PgValue::Null,
            Err(_) => PgValue::Null,
        };
    }
    match row.columns()[index].type_().name() {
        "int2" => opt(row.try_get::<_, Option<i16>>(index), |v| PgValue::Int(v as i64)),
        "int4" => opt(row.try_get::<_, Option<i32>>(index), |v| PgValue::Int(v as i64)),
        "int8" => opt(row.try_get::<_, Option<i64>>(index), PgValue::Int),
        "bool" => opt(row.try_get::<_, Option<bool>>(index), |v| {
            PgValue::Text(v.to_string())
        }),
        "float4" => opt(row.try_get::<_, Option<f32>>(index), |v| {
            PgValue::Text(v.to_string())
        }),
        "float8" => opt(row.try_get::<_, Option<f64>>(index), |v| {
            PgValue::Text(v.to_string())
        }),
        _ => match row.try_get::<_, Option<String>>(index) {
            Ok(Some(s)) => maybe_decode_bytea_text(s),
            Ok(None) => PgValue::Null,
            Err(_) => PgValue::Null,
        },
    }
}

fn opt<T>(result: Result<Option<T>, postgres::Error>, f: impl FnOnce(T) -> PgValue) -> PgValue {
    match result {
        Ok(Some(v)) => f(v),
        _ => PgValue::Null,
    }
}

/// A column typed `text` by its OID but carrying the `\x`-hex `bytea`
/// representation (e.g. the caller cast a bytea column with `::text`) is
/// decoded here rather than returned as opaque text (§4.4, §9).
fn maybe_decode_bytea_text(s: String) -> PgValue {
    if s.starts_with("\\x") {
        match hex_bytea::decode(&s) {
            Ok(bytes) => PgValue::Blob(bytes),
            Err(_) => PgValue::Text(s),
        }
    } else {
        PgValue::Text(s)
    }
}

struct PostgresStatement {
    client: Arc<Mutex<Client>>,
    oid_cache: Arc<OidCache>,
    prepared: postgres::Statement,
    pg_name: String,
    param_count: usize,
    column_count: usize,
    params: Vec<Option<PgParam>>,
    rows: Vec<Vec<PgValue>>,
    cursor: Option<usize>,
    executed: bool,
}

impl StatementAdapter for PostgresStatement {
    fn param_count(&self) -> usize {
        self.param_count
    }

    fn column_count(&self) -> usize {
        self.column_count
    }

    fn stmt_handle(&self) -> BackendHandle<'_> {
        BackendHandle::Postgres(&self.client)
    }

    fn bind_blob(&mut self, index: usize, bytes: &[u8]) -> Result<(), DbError> {
        self.params[index] = Some(PgParam::Blob(bytes.to_vec()));
        Ok(())
    }

    fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), DbError> {
        self.params[index] = Some(PgParam::Int64(value));
        Ok(())
    }

    fn bind_text(&mut self, index: usize, text: &str) -> Result<(), DbError> {
        self.params[index] = Some(PgParam::Text(text.to_string()));
        Ok(())
    }

    fn bind_null(&mut self, index: usize) -> Result<(), DbError> {
        self.params[index] = Some(PgParam::Null);
        Ok(())
    }

    fn execute(&mut self) -> Result<(), DbError> {
        let bound: Vec<&(dyn ToSql + Sync)> = self
            .params
            .iter()
            .map(|p| match p {
                Some(p) => p.as_to_sql(),
                None => &NULL_PARAM as &(dyn ToSql + Sync),
            })
            .collect();

        let rows = {
            let mut client = lock(&self.client);
            client
                .query(&self.prepared, &bound)
                .map_err(|e| DbError::exec_failed(e.to_string()))?
        };

        self.rows = rows
            .iter()
            .map(|row| {
                (0..self.column_count)
                    .map(|i| value_from_row(row, i, &self.oid_cache))
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
            PgValue::Null => Ok(None),
            PgValue::Blob(b) => Ok(Some(b.as_slice())),
            PgValue::Text(t) => Ok(Some(t.as_bytes())),
            PgValue::Int(_) => Err(DbError::coerce_failed("column value is not convertible to a blob")),
        }
    }

    fn column_int64(&self, index: usize) -> Result<i64, DbError> {
        match self.current_value(index)? {
            PgValue::Null => Ok(0),
            PgValue::Int(v) => Ok(*v),
            PgValue::Text(t) => t
                .trim()
                .parse::<i64>()
                .map_err(|_| DbError::coerce_failed(format!("cannot parse {t:?} as i64"))),
            PgValue::Blob(_) => Err(DbError::coerce_failed("cannot coerce blob to i64")),
        }
    }

    fn column_text(&self, index: usize) -> Result<Option<&str>, DbError> {
        match self.current_value(index)? {
            PgValue::Null => Ok(None),
            PgValue::Text(t) => Ok(Some(t.as_str())),
            PgValue::Int(_) => Err(DbError::coerce_failed("numeric column requires column_int64")),
            PgValue::Blob(b) => std::str::from_utf8(b)
                .map(Some)
                .map_err(|_| DbError::coerce_failed("blob is not valid utf-8")),
        }
    }

    fn column_type(&self, index: usize) -> Result<ColumnType, DbError> {
        Ok(match self.current_value(index)? {
            PgValue::Null => ColumnType::Null,
            _ => ColumnType::Blob,
        })
    }

    fn close(&mut self) {
        log::debug!("[postgres] closing prepared statement {}", self.pg_name);
        self.rows.clear();
    }
}

impl PostgresStatement {
    fn current_value(&self, index: usize) -> Result<&PgValue, DbError> {
        let cursor = self
            .cursor
            .filter(|c| *c < self.rows.len())
            .ok_or_else(|| DbError::fetch_failed("no current row"))?;
        Ok(&self.rows[cursor][index])
    }
}
