//! PostgreSQL connection-string assembly (§6.4).
//!
//! Emits space-separated `key=value` tokens from the fixed key set, skipping
//! any key whose value is empty. Length arithmetic goes through
//! [`sqldbal_core::safe_int`] so the concatenation is checked for overflow
//! (§4.10).

use sqldbal_core::safe_int::checked_add;
use sqldbal_core::DbError;

/// One token in the fixed key order from spec §6.4.
pub struct Field<'a> {
    pub key: &'static str,
    pub value: &'a str,
}

/// Builds the libpq-style connection string, escaping single quotes and
/// backslashes in each value the way libpq's own quoting rules require, and
/// wrapping every value in single quotes so that values containing spaces
/// (e.g. `application_name`) survive the space-separated token format.
pub fn build(fields: &[Field<'_>]) -> Result<String, DbError> {
    let mut out = String::new();
    let mut total_len = 0usize;
    for field in fields {
        if field.value.is_empty() {
            continue;
        }
        let escaped = escape_value(field.value);
        let token_len = field.key.len() + 1 + escaped.len() + 2;
        total_len = checked_add(total_len, token_len)?;
        total_len = checked_add(total_len, 1)?; // separating space
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(field.key);
        out.push('=');
        out.push('\'');
        out.push_str(&escaped);
        out.push('\'');
    }
    Ok(out)
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
