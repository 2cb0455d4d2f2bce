use std::hash::Hasher;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use twox_hash::XxHash64;

pub type Row = Map<String, Value>;

/// How a key's value is turned into its group string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyFormat {
    /// Strings render raw and everything else as compact JSON, so `1` and
    /// `"1"` share a group.
    #[default]
    Loose,
    /// Every value renders as canonical JSON text, so `1` and `"1"` differ.
    Typed,
}

/// A row must decode to a JSON object; anything else is a decode failure.
pub fn decode_row(line: &[u8]) -> serde_json::Result<Row> {
    serde_json::from_slice(line)
}

pub fn format_key(value: &Value, format: KeyFormat) -> String {
    match (format, value) {
        (KeyFormat::Loose, Value::String(text)) => text.clone(),
        _ => {
            let mut out = Vec::new();
            // Writing into a Vec cannot fail.
            let _ = write_canonical(&mut out, value);
            String::from_utf8_lossy(&out).into_owned()
        }
    }
}

/// Compact JSON with object keys sorted at every depth. Field order in the
/// source text therefore never changes the bytes.
pub fn canonical_bytes(row: &Row) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    let _ = write_canonical_object(&mut out, row);
    out
}

pub fn content_hash(row: &Row) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(&canonical_bytes(row));
    hasher.finish().to_string()
}

fn write_canonical<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
    match value {
        Value::Object(map) => write_canonical_object(out, map),
        Value::Array(items) => {
            out.write_all(b"[")?;
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.write_all(b",")?;
                }
                write_canonical(out, item)?;
            }
            out.write_all(b"]")
        }
        scalar => serde_json::to_writer(out, scalar).map_err(io::Error::from),
    }
}

fn write_canonical_object<W: Write>(out: &mut W, map: &Row) -> io::Result<()> {
    let mut entries = map.iter().collect::<Vec<_>>();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.write_all(b"{")?;
    for (index, (key, value)) in entries.into_iter().enumerate() {
        if index > 0 {
            out.write_all(b",")?;
        }
        serde_json::to_writer(&mut *out, key).map_err(io::Error::from)?;
        out.write_all(b":")?;
        write_canonical(out, value)?;
    }
    out.write_all(b"}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{canonical_bytes, content_hash, decode_row, format_key, KeyFormat};

    #[test]
    fn field_order_does_not_change_hash() {
        let a = decode_row(br#"{"id":1,"name":"x","tags":{"b":2,"a":1}}"#).expect("a");
        let b = decode_row(br#"{ "tags": {"a":1, "b":2}, "name":"x",  "id":1 }"#).expect("b");
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
        assert_eq!(content_hash(&a), content_hash(&b));

        let c = decode_row(br#"{"id":2,"name":"x","tags":{"a":1,"b":2}}"#).expect("c");
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn canonical_form_is_compact_and_sorted() {
        let row = decode_row(br#"{"z":[3, {"y":1,"x":"s"}], "a":null}"#).expect("row");
        assert_eq!(
            String::from_utf8(canonical_bytes(&row)).expect("utf8"),
            r#"{"a":null,"z":[3,{"x":"s","y":1}]}"#
        );
    }

    #[test]
    fn non_object_rows_fail_to_decode() {
        assert!(decode_row(b"[1,2,3]").is_err());
        assert!(decode_row(b"42").is_err());
        assert!(decode_row(b"{not json").is_err());
    }

    #[test]
    fn loose_format_collapses_number_and_string() {
        assert_eq!(format_key(&json!("1"), KeyFormat::Loose), "1");
        assert_eq!(format_key(&json!(1), KeyFormat::Loose), "1");
        assert_eq!(format_key(&json!(true), KeyFormat::Loose), "true");
        assert_eq!(format_key(&json!(null), KeyFormat::Loose), "null");
    }

    #[test]
    fn typed_format_keeps_types_apart() {
        assert_eq!(format_key(&json!("1"), KeyFormat::Typed), "\"1\"");
        assert_eq!(format_key(&json!(1), KeyFormat::Typed), "1");
        assert_eq!(
            format_key(&json!({"b": 1, "a": 2}), KeyFormat::Typed),
            r#"{"a":2,"b":1}"#
        );
    }
}
