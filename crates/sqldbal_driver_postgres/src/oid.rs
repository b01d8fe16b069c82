//! OID→typename cache, built once at connect time (§4.6).
//!
//! Stores `(oid, typname)` pairs sorted by OID ascending and answers lookups
//! with a linear scan — `bytea`'s OID is low and near the front of
//! `pg_type`, so a linear scan is already the fast path for the one lookup
//! the adapter actually performs.

use postgres::Client;

use sqldbal_core::DbError;

const TYPENAME_MAX_LEN: usize = 48;

pub struct OidCache {
    entries: Vec<(u32, String)>,
}

impl OidCache {
    /// Runs `SELECT oid, typname FROM pg_type ORDER BY oid ASC` and caches
    /// the result. Any failure aborts `open` with `exec-failed` (§4.6).
    pub fn load(client: &mut Client) -> Result<Self, DbError> {
        let rows = client
            .query("SELECT oid, typname FROM pg_type ORDER BY oid ASC", &[])
            .map_err(|e| DbError::exec_failed(format!("pg_type cache query failed: {e}")))?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let oid: u32 = row.get(0);
            let typname: String = row.get(1);
            let truncated: String = typname.chars().take(TYPENAME_MAX_LEN).collect();
            entries.push((oid, truncated));
        }
        Ok(OidCache { entries })
    }

    /// Linear scan for the typename registered under `oid` (§4.6).
    pub fn typename(&self, oid: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(o, _)| *o == oid)
            .map(|(_, name)| name.as_str())
    }

    pub fn is_bytea(&self, oid: u32) -> bool {
        self.typename(oid) == Some("bytea")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_from(pairs: &[(u32, &str)]) -> OidCache {
        OidCache {
            entries: pairs.iter().map(|(o, n)| (*o, n.to_string())).collect(),
        }
    }

    #[test]
    fn typename_found_by_linear_scan() {
        let cache = cache_from(&[(16, "bool"), (17, "bytea"), (23, "int4")]);
        assert_eq!(cache.typename(17), Some("bytea"));
        assert!(cache.is_bytea(17));
        assert!(!cache.is_bytea(23));
    }

    #[test]
    fn unknown_oid_yields_none() {
        let cache = cache_from(&[(16, "bool")]);
        assert_eq!(cache.typename(999), None);
    }

    #[test]
    fn typename_is_truncated_to_48_bytes() {
        let long_name: String = "x".repeat(80);
        let cache = cache_from(&[(1, long_name.as_str())]);
        assert_eq!(cache.typename(1).unwrap().len(), TYPENAME_MAX_LEN);
    }
}
