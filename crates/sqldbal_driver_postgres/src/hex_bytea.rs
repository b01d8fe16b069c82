//! Decodes PostgreSQL's default `bytea` text representation: the ASCII
//! sentinel `\x` followed by an even number of hex digits (§4.4, §9 "bytea
//! decoding", GLOSSARY "Bytea").
//!
//! The `postgres` crate's typed row accessors already hand back decoded
//! `Vec<u8>` for `bytea` columns over the binary wire format, so this
//! decoder is not on the adapter's live fetch path (see DESIGN.md's
//! resolution for §4.6/§4.4). It is kept as a standalone, unit-tested
//! function because callers reading a `bytea` column back out through
//! `column_text` (e.g. after `::text` casting it themselves) see exactly
//! this representation, and §8 requires the hex round-trip property to
//! hold regardless of which path produced the string.

use sqldbal_core::DbError;

/// Decodes a `\x`-prefixed hex string into its binary payload. A malformed
/// hex body is rejected with `coerce_failed`.
pub fn decode(s: &str) -> Result<Vec<u8>, DbError> {
    let body = s
        .strip_prefix("\\x")
        .ok_or_else(|| DbError::coerce_failed("bytea text value is missing the \\x sentinel"))?;
    hex::decode(body).map_err(|e| DbError::coerce_failed(format!("invalid bytea hex body: {e}")))
}

/// Re-encodes binary data as `\x`-prefixed lowercase hex, the inverse of
/// [`decode`], for the §8 hex round-trip property.
pub fn encode(bytes: &[u8]) -> String {
    format!("\\x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_empty_payload() {
        assert_eq!(decode("\\x").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn decodes_known_bytes() {
        assert_eq!(decode("\\xdeadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn rejects_missing_sentinel() {
        assert!(decode("deadbeef").is_err());
    }

    #[test]
    fn rejects_odd_length() {
        assert!(decode("\\xabc").is_err());
    }

    #[test]
    fn rejects_non_hex_characters() {
        assert!(decode("\\xzz").is_err());
    }

    #[test]
    fn round_trip_is_case_normalized() {
        for payload in [&b""[..], b"\x00\x01\xff", b"somnisoft"] {
            let encoded = encode(payload);
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded, payload);
            // Decoding an uppercase rendering of the same hex reproduces it too.
            let upper = format!("\\x{}", encoded[2..].to_uppercase());
            assert_eq!(decode(&upper).unwrap(), payload);
        }
    }
}
