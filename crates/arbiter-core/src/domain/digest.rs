//! Canonical JSON serialization and spec hash computation (RFC 8785-class).
//!
//! The same canonical form feeds both the spec hash and the snapshot file
//! handed to the query tool, so the two can never drift apart:
//! - object keys ordered by UTF-16 code units (RFC 8785 §3.2.3)
//! - integer-valued floats written as integers
//! - no insignificant whitespace
//! - SHA-256 hex digest over the canonical bytes

use crate::domain::error::{ArbiterError, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compare two keys by UTF-16 code units.
fn cmp_utf16(a: &str, b: &str) -> std::cmp::Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

/// Write a normalized number. Integer-valued floats collapse to integers.
fn write_number(n: &serde_json::Number, out: &mut String) -> Result<()> {
    if n.is_i64() || n.is_u64() {
        out.push_str(&n.to_string());
        return Ok(());
    }
    let f = n.as_f64().ok_or(ArbiterError::NonFiniteNumber)?;
    if !f.is_finite() {
        return Err(ArbiterError::NonFiniteNumber);
    }
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        out.push_str(&(f as i64).to_string());
    } else {
        out.push_str(&n.to_string());
    }
    Ok(())
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| cmp_utf16(a, b));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// Convert a JSON value to its canonical, byte-stable string form.
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

/// SHA-256 hex digest of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute the SHA-256 hex digest of a value's canonical JSON.
pub fn compute_digest(value: &Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_compact_and_sorted() {
        let input = json!({ "b": 1, "a": { "d": [1, 2], "c": null } });
        let canonical = canonical_json(&input).expect("canonical_json");
        assert_eq!(canonical, r#"{"a":{"c":null,"d":[1,2]},"b":1}"#);
    }

    #[test]
    fn test_canonical_json_utf16_key_order() {
        // U+FF61 sorts before U+1F600 in UTF-8 byte order but after it in UTF-16.
        let input = json!({ "\u{1F600}": 1, "\u{FF61}": 2 });
        let canonical = canonical_json(&input).expect("canonical_json");
        assert_eq!(canonical, "{\"\u{1F600}\":1,\"\u{FF61}\":2}");
    }

    #[test]
    fn test_canonical_json_integer_float() {
        let input = json!({ "value": 1.0, "neg": -1.0, "zero": 0.0, "big": 1e10 });
        let canonical = canonical_json(&input).expect("canonical_json");
        assert_eq!(canonical, r#"{"big":10000000000,"neg":-1,"value":1,"zero":0}"#);
    }

    #[test]
    fn test_canonical_json_float_beyond_i64_not_saturated() {
        // 2^63 is not representable as i64; it must not collapse onto i64::MAX.
        let float = canonical_json(&json!({ "n": 9_223_372_036_854_775_808.0_f64 })).unwrap();
        let max = canonical_json(&json!({ "n": i64::MAX })).unwrap();
        assert_ne!(float, max);
        assert!(!float.contains("9223372036854775807"));
    }

    #[test]
    fn test_canonical_json_fractional_float() {
        let input = json!({ "value": 1.5 });
        let canonical = canonical_json(&input).expect("canonical_json");
        assert_eq!(canonical, r#"{"value":1.5}"#);
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let input = json!({ "quote": "say \"hi\"\n" });
        let canonical = canonical_json(&input).expect("canonical_json");
        assert_eq!(canonical, r#"{"quote":"say \"hi\"\n"}"#);
    }

    #[test]
    fn test_canonical_json_nested_field_order_invariant() {
        let a: Value = serde_json::from_str(r#"{"outer":{"z":1,"y":2,"x":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{ "outer" : { "x":3, "y":2, "z":1 } }"#).unwrap();
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn test_canonical_json_array_order_preserved() {
        let a = json!({ "array": [3, 1, 2] });
        let b = json!({ "array": [1, 2, 3] });
        assert_ne!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn test_compute_digest_is_sha256_hex() {
        let digest = compute_digest(&json!({ "name": "test" })).expect("compute_digest");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_compute_digest_golden_value() {
        // sha256 of the literal bytes `{}`
        let digest = compute_digest(&json!({})).expect("compute_digest");
        assert_eq!(
            digest,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_compute_digest_single_field_delta() {
        let a = compute_digest(&json!({ "name": "test" })).unwrap();
        let b = compute_digest(&json!({ "name": "test_modified" })).unwrap();
        assert_ne!(a, b);
    }
}
