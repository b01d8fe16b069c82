use std::cell::{Cell, Ref, RefCell};

use crate::adapter::{BackendHandle, DriverAdapter, RowCallback};
use crate::driver::{Driver, OpenFlags};
use crate::error::DbError;
use crate::statement::Statement;
use crate::status::Status;

/// A connection handle (§3).
///
/// `open` always returns a usable `Connection`, even when the underlying
/// backend session could not be established — the sentinel idiom from §4.2.
/// The driver tag is fixed at construction; every other field is mutated
/// only through the methods below.
pub struct Connection {
    driver: Driver,
    flags: OpenFlags,
    adapter: RefCell<Option<Box<dyn DriverAdapter>>>,
    status: Cell<Status>,
    last_error: RefCell<Option<DbError>>,
}

impl Connection {
    /// Builds a connection around a successfully opened adapter.
    pub fn from_adapter(driver: Driver, flags: OpenFlags, adapter: Box<dyn DriverAdapter>) -> Self {
        Connection {
            driver,
            flags,
            adapter: RefCell::new(Some(adapter)),
            status: Cell::new(Status::Ok),
            last_error: RefCell::new(None),
        }
    }

    /// Builds a connection that failed to open (§4.2 step 3): no adapter,
    /// status/error set from the backend failure.
    pub fn failed(driver: Driver, flags: OpenFlags, err: DbError) -> Self {
        let status = err.status();
        Connection {
            driver,
            flags,
            adapter: RefCell::new(None),
            status: Cell::new(status),
            last_error: RefCell::new(Some(err)),
        }
    }

    /// Builds a connection for an unrecognized driver tag (§4.2: "an
    /// unsupported tag sets status driver-not-supported and open returns").
    pub fn unsupported(driver: Driver) -> Self {
        Connection::failed(
            driver,
            OpenFlags::empty(),
            DbError::DriverNotSupported(driver),
        )
    }

    /// The out-of-memory sentinel connection (§4.2). Every call just builds
    /// a fresh value with identical, permanently out-of-memory fields —
    /// there is no allocation that could itself fail here, so there is no
    /// benefit to sharing one static instance.
    pub fn sentinel() -> Self {
        Connection {
            driver: Driver::Invalid,
            flags: OpenFlags::INVALID_MEMORY,
            adapter: RefCell::new(None),
            status: Cell::new(Status::OutOfMemory),
            last_error: RefCell::new(Some(DbError::OutOfMemory)),
        }
    }

    pub fn driver_type(&self) -> Driver {
        self.driver
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn is_sentinel(&self) -> bool {
        self.flags.contains(OpenFlags::INVALID_MEMORY)
    }

    pub fn status_get(&self) -> Status {
        self.status.get()
    }

    /// Resets status to `Ok`, returning the prior value.
    pub fn status_clear(&self) -> Status {
        self.status.replace(Status::Ok)
    }

    pub fn errstr(&self) -> String {
        match self.last_error.borrow().as_ref() {
            Some(e) => e.to_string(),
            None => String::new(),
        }
    }

    /// The last error recorded by any fallible operation on this connection,
    /// or `None` if the last operation (or `status_clear`) succeeded. The
    /// idiomatic counterpart to `status_get`/`errstr` (§7) — a caller that
    /// wants the structured `DbError` rather than its rendered message and
    /// `Status` tag reaches for this instead.
    pub fn last_error(&self) -> Ref<'_, Option<DbError>> {
        self.last_error.borrow()
    }

    fn record<T>(&self, result: Result<T, DbError>) -> Result<T, DbError> {
        match result {
            Ok(value) => {
                self.status.set(Status::Ok);
                *self.last_error.borrow_mut() = None;
                Ok(value)
            }
            // Cloned rather than moved so the original can still be
            // returned to the caller.
            Err(e) => {
                self.status.set(e.status());
                *self.last_error.borrow_mut() = Some(e.clone());
                Err(e)
            }
        }
    }

    fn with_adapter<T>(
        &self,
        f: impl FnOnce(&mut dyn DriverAdapter) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut guard = self.adapter.borrow_mut();
        match guard.as_mut() {
            Some(adapter) => self.record(f(adapter.as_mut())),
            None => self.record(Err(DbError::OutOfMemory)),
        }
    }

    /// Closes the connection (§3 Lifecycle). Idempotent, and a safe no-op
    /// on the sentinel (§4.2).
    pub fn close(&self) -> Status {
        self.adapter.borrow_mut().take();
        self.status.set(Status::Ok);
        self.status.get()
    }

    pub fn begin(&self) -> Result<(), DbError> {
        self.with_adapter(|a| a.begin())
    }

    pub fn commit(&self) -> Result<(), DbError> {
        self.with_adapter(|a| a.commit())
    }

    pub fn rollback(&self) -> Result<(), DbError> {
        self.with_adapter(|a| a.rollback())
    }

    pub fn exec(&self, sql: &str, callback: Option<RowCallback<'_>>) -> Result<(), DbError> {
        self.with_adapter(|a| a.exec(sql, callback))
    }

    pub fn last_insert_id(&self, sequence: Option<&str>) -> Result<u64, DbError> {
        self.with_adapter(|a| a.last_insert_id(sequence))
    }

    pub fn stmt_prepare(&self, sql: &str) -> Result<Statement, DbError> {
        self.with_adapter(|a| {
            let adapter = a.stmt_prepare(sql)?;
            Ok(Statement::new(adapter))
        })
    }

    /// Escape hatch returning the opaque backend handle (§4.1 `db_handle`).
    pub fn db_handle(&self) -> Result<BackendHandleGuard<'_>, DbError> {
        let guard = self.adapter.borrow();
        if guard.is_some() {
            Ok(BackendHandleGuard { guard })
        } else {
            Err(DbError::OutOfMemory)
        }
    }
}

/// Borrow guard tying a [`BackendHandle`] to the connection's adapter slot.
pub struct BackendHandleGuard<'a> {
    guard: std::cell::Ref<'a, Option<Box<dyn DriverAdapter>>>,
}

impl BackendHandleGuard<'_> {
    pub fn handle(&self) -> BackendHandle<'_> {
        self.guard.as_ref().expect("checked Some in db_handle").db_handle()
    }
}
