//! PostgreSQL adapter for SQLDBAL (§4.2 "Driver adapter — PostgreSQL").
//!
//! Wraps [`postgres`] + [`native_tls`]: connection-string assembly (§6.4),
//! an OID→typename cache built once at connect time (§4.6), server-side
//! prepared statements named `pqsN` (§4.7), bytea hex decoding (§4.4,
//! §9 "bytea decoding"), and transactions via literal `BEGIN`/`COMMIT`/
//! `ROLLBACK` (§4.5).

mod connstring;
mod driver;
mod hex_bytea;
mod oid;

pub use driver::open;
