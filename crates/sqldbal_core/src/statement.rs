use crate::adapter::{BackendHandle, ColumnType, FetchStatus, StatementAdapter};
use crate::error::DbError;

/// A prepared statement handle (§3).
///
/// Holds its own boxed adapter rather than a Rust borrow of its parent
/// [`Connection`] — each driver crate's adapter keeps whatever shared handle
/// it needs back to the live backend session internally. "Statement must not
/// outlive its connection" is therefore a documented contract, not a
/// borrow-checked one.
pub struct Statement {
    adapter: Box<dyn StatementAdapter>,
    param_count: usize,
    column_count: usize,
    closed: bool,
}

impl Statement {
    pub(crate) fn new(adapter: Box<dyn StatementAdapter>) -> Self {
        let param_count = adapter.param_count();
        let column_count = adapter.column_count();
        Statement {
            adapter,
            param_count,
            column_count,
            closed: false,
        }
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn stmt_handle(&self) -> Result<BackendHandle<'_>, DbError> {
        self.ensure_open()?;
        Ok(self.adapter.stmt_handle())
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            Err(DbError::invalid_parameter("statement is closed"))
        } else {
            Ok(())
        }
    }

    /// Validates a placeholder/column index against the matching count
    /// (§8 "Bound-index enforcement"): `index >= bound` sets
    /// `Status::InvalidParameter` via a `DbError::InvalidParameter`.
    fn check_index(index: usize, bound: usize, what: &str) -> Result<(), DbError> {
        if index >= bound {
            Err(DbError::invalid_parameter(format!(
                "{what} index {index} out of range (count = {bound})"
            )))
        } else {
            Ok(())
        }
    }

    pub fn bind_blob(&mut self, index: usize, bytes: &[u8]) -> Result<(), DbError> {
        self.ensure_open()?;
        Self::check_index(index, self.param_count, "parameter")?;
        self.adapter.bind_blob(index, bytes)
    }

    pub fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), DbError> {
        self.ensure_open()?;
        Self::check_index(index, self.param_count, "parameter")?;
        self.adapter.bind_int64(index, value)
    }

    /// Binds `text` at `index`. `&str` already carries its own length, so
    /// there is no separate length argument to pass or compute (§4.3).
    pub fn bind_text(&mut self, index: usize, text: &str) -> Result<(), DbError> {
        self.ensure_open()?;
        Self::check_index(index, self.param_count, "parameter")?;
        self.adapter.bind_text(index, text)
    }

    pub fn bind_null(&mut self, index: usize) -> Result<(), DbError> {
        self.ensure_open()?;
        Self::check_index(index, self.param_count, "parameter")?;
        self.adapter.bind_null(index)
    }

    pub fn execute(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        self.adapter.execute()
    }

    pub fn fetch(&mut self) -> Result<FetchStatus, DbError> {
        self.ensure_open()?;
        self.adapter.fetch()
    }

    pub fn column_blob(&self, index: usize) -> Result<Option<&[u8]>, DbError> {
        self.ensure_open()?;
        Self::check_index(index, self.column_count, "column")?;
        self.adapter.column_blob(index)
    }

    pub fn column_int64(&self, index: usize) -> Result<i64, DbError> {
        self.ensure_open()?;
        Self::check_index(index, self.column_count, "column")?;
        self.adapter.column_int64(index)
    }

    pub fn column_text(&self, index: usize) -> Result<Option<&str>, DbError> {
        self.ensure_open()?;
        Self::check_index(index, self.column_count, "column")?;
        self.adapter.column_text(index)
    }

    pub fn column_type(&self, index: usize) -> Result<ColumnType, DbError> {
        self.ensure_open()?;
        Self::check_index(index, self.column_count, "column")?;
        self.adapter.column_type(index)
    }

    /// Closes the statement (§3 Lifecycle). Safe to call more than once.
    pub fn close(&mut self) {
        if !self.closed {
            self.adapter.close();
            self.closed = true;
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        self.close();
    }
}
