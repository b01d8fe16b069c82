//! MySQL/MariaDB adapter for SQLDBAL (§4.2 "Driver adapter — network engine").
//!
//! Wraps [`mysql`]: `OptsBuilder` for connect parameters, `conn.prep`/
//! `conn.exec` for prepared statements, autocommit toggling for
//! transactions (§4.5), and metadata-driven column typing (§4.8). One
//! adapter implementation serves both the `MySql` and `MariaDb` driver
//! tags, as the two wire protocols are identical at this layer.

mod driver;

pub use driver::open;
