//! Helpers over the opaque IDL document. The IDL is treated as arbitrary
//! JSON; only a handful of well-known fields are ever inspected.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Placeholder name when the IDL carries none. Write paths refuse it.
pub const UNKNOWN_PROGRAM: &str = "unknown_program";

/// `idl.name`, falling back to `idl.metadata.name`.
pub fn idl_name(idl: &Value) -> Option<&str> {
    idl.get("name")
        .and_then(Value::as_str)
        .or_else(|| {
            idl.get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
        })
        .filter(|name| !name.is_empty())
}

pub fn resolve_name(idl: &Value) -> String {
    idl_name(idl).unwrap_or(UNKNOWN_PROGRAM).to_string()
}

/// Length of a top-level array field, 0 when absent or not an array.
pub fn array_len(idl: &Value, key: &str) -> usize {
    idl.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

/// True when the IDL has a non-empty `instructions` array — the minimum
/// shape accepted from uploads and on-chain accounts.
pub fn has_instructions(idl: &Value) -> bool {
    array_len(idl, "instructions") > 0
}

/// Serialize with object keys recursively sorted, so that two IDLs equal
/// under JSON semantics always produce identical bytes. The resulting hash
/// is stable across runs but intentionally not portable to insertion-order
/// serializers.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 of the canonical serialization, lowercase hex.
pub fn hash_idl(idl: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(idl).as_bytes());
    format!("{:x}", hasher.finalize())
}
