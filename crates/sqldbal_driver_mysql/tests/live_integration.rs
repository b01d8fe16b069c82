use sqldbal_core::{
    ColumnType, Connection, DbError, Driver, FetchStatus, OpenFlags, OpenOptions, Status,
};
use testcontainers::clients::Cli;
use testcontainers::core::WaitFor;
use testcontainers::GenericImage;

/// Starts a throwaway MySQL container and runs `body` against a connection
/// to it. The container and its `Cli` handle are kept alive for the
/// duration of `body` by staying in scope here.
fn with_mysql_connection<F>(body: F) -> Result<(), DbError>
where
    F: FnOnce(&Connection) -> Result<(), DbError>,
{
    let docker = Cli::default();
    let image = GenericImage::new("mysql", "8.4")
        .with_env_var("MYSQL_ROOT_PASSWORD", "root")
        .with_env_var("MYSQL_DATABASE", "testdb")
        .with_exposed_port(3306)
        .with_wait_for(WaitFor::message_on_stderr("ready for connections"));
    let container = docker.run(image);
    let port = container.get_host_port_ipv4(3306);

    let opts = OpenOptions {
        location: "127.0.0.1",
        port: &port.to_string(),
        user: "root",
        password: "root",
        database: "testdb",
        flags: OpenFlags::empty(),
        options: &[],
    };

    let mut last_err = None;
    let mut conn = None;
    for _ in 0..20 {
        match sqldbal_driver_mysql::open(Driver::MySql, &opts) {
            Ok(adapter) => {
                conn = Some(Connection::from_adapter(Driver::MySql, opts.flags, adapter));
                break;
            }
            Err(e) => {
                last_err = Some(e);
                std::thread::sleep(std::time::Duration::from_millis(250));
            }
        }
    }
    let conn = conn.ok_or_else(|| last_err.unwrap_or(DbError::OutOfMemory))?;
    body(&conn)
}

#[test]
fn create_insert_and_select_round_trip() -> Result<(), DbError> {
    with_mysql_connection(|conn| {
        conn.exec(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTO_INCREMENT, name TEXT NOT NULL)",
            None,
        )?;

        let mut insert = conn.stmt_prepare("INSERT INTO users (name) VALUES (?)")?;
        insert.bind_text(0, "alice")?;
        insert.execute()?;

        let mut select = conn.stmt_prepare("SELECT id, name FROM users WHERE name = ?")?;
        select.bind_text(0, "alice")?;
        select.execute()?;
        assert_eq!(select.fetch()?, FetchStatus::Row);
        assert_eq!(select.column_int64(0)?, 1);
        assert_eq!(select.column_text(1)?, Some("alice"));
        assert_eq!(select.fetch()?, FetchStatus::Done);

        assert_eq!(conn.status_get(), Status::Ok);
        Ok(())
    })
}

#[test]
fn transaction_rollback_discards_changes() -> Result<(), DbError> {
    with_mysql_connection(|conn| {
        conn.exec("CREATE TABLE t (v INTEGER)", None)?;
        conn.begin()?;
        conn.exec("INSERT INTO t (v) VALUES (1)", None)?;
        conn.rollback()?;

        let mut stmt = conn.stmt_prepare("SELECT COUNT(*) FROM t")?;
        stmt.execute()?;
        stmt.fetch()?;
        assert_eq!(stmt.column_int64(0)?, 0);
        Ok(())
    })
}

#[test]
fn transaction_commit_keeps_changes() -> Result<(), DbError> {
    with_mysql_connection(|conn| {
        conn.exec("CREATE TABLE t (v INTEGER)", None)?;
        conn.begin()?;
        conn.exec("INSERT INTO t (v) VALUES (1)", None)?;
        conn.commit()?;

        let mut stmt = conn.stmt_prepare("SELECT COUNT(*) FROM t")?;
        stmt.execute()?;
        stmt.fetch()?;
        assert_eq!(stmt.column_int64(0)?, 1);
        Ok(())
    })
}

#[test]
fn last_insert_id_tracks_autoincrement() -> Result<(), DbError> {
    with_mysql_connection(|conn| {
        conn.exec("CREATE TABLE t (id INTEGER PRIMARY KEY AUTO_INCREMENT)", None)?;
        conn.exec("INSERT INTO t VALUES (DEFAULT)", None)?;
        conn.exec("INSERT INTO t VALUES (DEFAULT)", None)?;
        assert_eq!(conn.last_insert_id(None)?, 2);
        Ok(())
    })
}

#[test]
fn blob_round_trips_exact_bytes() -> Result<(), DbError> {
    with_mysql_connection(|conn| {
        conn.exec("CREATE TABLE blobs (data BLOB)", None)?;
        let payload: Vec<u8> = vec![0, 1, 2, 255, 254, 0, 10];

        let mut insert = conn.stmt_prepare("INSERT INTO blobs (data) VALUES (?)")?;
        insert.bind_blob(0, &payload)?;
        insert.execute()?;

        let mut select = conn.stmt_prepare("SELECT data FROM blobs")?;
        select.execute()?;
        select.fetch()?;
        assert_eq!(select.column_blob(0)?, Some(payload.as_slice()));
        Ok(())
    })
}

#[test]
fn bind_null_round_trip_reports_null() -> Result<(), DbError> {
    with_mysql_connection(|conn| {
        conn.exec("CREATE TABLE t (v INTEGER)", None)?;
        let mut insert = conn.stmt_prepare("INSERT INTO t (v) VALUES (?)")?;
        insert.bind_null(0)?;
        insert.execute()?;

        let mut select = conn.stmt_prepare("SELECT v FROM t")?;
        select.execute()?;
        assert_eq!(select.fetch()?, FetchStatus::Row);
        assert_eq!(select.column_type(0)?, ColumnType::Null);
        assert_eq!(select.column_int64(0)?, 0);
        assert_eq!(select.column_text(0)?, None);
        assert_eq!(select.column_blob(0)?, None);
        Ok(())
    })
}

#[test]
fn prepare_invalid_sql_sets_prepare_failed() -> Result<(), DbError> {
    with_mysql_connection(|conn| {
        let err = conn.stmt_prepare("INVALID SQL COMMAND").unwrap_err();
        assert_eq!(err.status(), Status::PrepareFailed);
        Ok(())
    })
}

#[test]
fn unrecognized_option_key_is_rejected() {
    let opts = sqldbal_core::OpenOptions {
        location: "127.0.0.1",
        port: "3306",
        user: "root",
        password: "",
        database: "",
        flags: OpenFlags::empty(),
        options: &[sqldbal_core::DriverOption {
            key: "NOT_A_REAL_KEY",
            value: "x",
        }],
    };
    let err = sqldbal_driver_mysql::open(Driver::MySql, &opts).unwrap_err();
    assert_eq!(err.status(), Status::InvalidParameter);
}

#[test]
fn connect_timeout_above_bound_is_rejected() {
    let opt = sqldbal_core::DriverOption {
        key: "CONNECT_TIMEOUT",
        value: "2000",
    };
    let opts = sqldbal_core::OpenOptions {
        location: "127.0.0.1",
        port: "3306",
        user: "root",
        password: "",
        database: "",
        flags: OpenFlags::empty(),
        options: &[opt],
    };
    let err = sqldbal_driver_mysql::open(Driver::MySql, &opts).unwrap_err();
    assert_eq!(err.status(), Status::InvalidParameter);
}
