//! Document value codec.
//!
//! EmberDB stores every field as a tagged wire value
//! (`stringValue`, `doubleValue`, `mapValue`, ...). This module converts
//! between plain `serde_json::Value` trees and that representation, plus
//! the ISO-8601 timestamp helpers the wire format relies on.
//!
//! Numbers always encode as `doubleValue`; the service may still answer
//! with `integerValue`, which decodes back to an integer. A value written
//! as an integer can therefore come back as a float. Known lossy edge.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{json, Map, Value};

/// Encode one generic value into its tagged wire form.
pub fn encode_value(v: &Value) -> Value {
  match v {
    Value::Null => json!({ "nullValue": null }),
    Value::Bool(b) => json!({ "booleanValue": b }),
    Value::Number(_) => json!({ "doubleValue": v }),
    Value::String(s) => {
      if is_iso8601_like(s) {
        json!({ "timestampValue": s })
      } else {
        json!({ "stringValue": s })
      }
    }
    Value::Array(items) => {
      let values: Vec<Value> = items.iter().map(encode_value).collect();
      json!({ "arrayValue": { "values": values } })
    }
    Value::Object(_) => json!({ "mapValue": encode_document(v) }),
  }
}

/// Wrap a whole object as a `{fields: {...}}` document envelope.
pub fn encode_document(doc: &Value) -> Value {
  let mut fields = Map::new();
  if let Some(obj) = doc.as_object() {
    for (key, val) in obj {
      fields.insert(key.clone(), encode_value(val));
    }
  }
  json!({ "fields": fields })
}

/// Decode a tagged wire value back into a generic value. First matching
/// tag wins; `None` means no recognized tag at all, which is not the same
/// as a decoded JSON null.
pub fn decode_value(v: &Value) -> Option<Value> {
  if let Some(fields) = v.get("fields") {
    return Some(decode_fields(fields));
  }
  if let Some(map) = v.get("mapValue") {
    return Some(decode_fields(map.get("fields").unwrap_or(&Value::Null)));
  }
  if let Some(s) = v.get("stringValue") {
    return Some(s.clone());
  }
  if let Some(b) = v.get("booleanValue") {
    return Some(b.clone());
  }
  if let Some(t) = v.get("timestampValue") {
    // Stays a string; callers convert with iso8601_to_time when needed.
    return Some(t.clone());
  }
  if let Some(a) = v.get("arrayValue") {
    let mut out = Vec::new();
    if let Some(values) = a.get("values").and_then(Value::as_array) {
      for el in values {
        out.push(decode_value(el).unwrap_or(Value::Null));
      }
    }
    return Some(Value::Array(out));
  }
  if let Some(d) = v.get("doubleValue") {
    return Some(d.clone());
  }
  if let Some(i) = v.get("integerValue") {
    // Only ever appears in responses, as a decimal string.
    let n = i.as_str().and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
    return Some(json!(n));
  }
  if let Some(obj) = v.as_object() {
    if obj.contains_key("nullValue") {
      return Some(Value::Null);
    }
  }
  None
}

fn decode_fields(fields: &Value) -> Value {
  let mut out = Map::new();
  if let Some(obj) = fields.as_object() {
    for (key, val) in obj {
      out.insert(key.clone(), decode_value(val).unwrap_or(Value::Null));
    }
  }
  Value::Object(out)
}

/// Does this string look like a wire timestamp? e.g. `2022-04-15T14:25:30Z`.
///
/// Shape check only, no calendar validation.
pub fn is_iso8601_like(s: &str) -> bool {
  let b = s.as_bytes();
  b.len() >= 20
    && b[4] == b'-'
    && b[7] == b'-'
    && b[10] == b'T'
    && b[13] == b':'
    && b[16] == b':'
    && b[b.len() - 1] == b'Z'
}

const ISO8601_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a unix timestamp as `YYYY-MM-DDTHH:MM:SSZ` (UTC, second precision).
pub fn time_to_iso8601(epoch_secs: i64) -> String {
  DateTime::from_timestamp(epoch_secs, 0)
    .map(|t| t.format(ISO8601_FORMAT).to_string())
    .unwrap_or_default()
}

/// Parse a `YYYY-MM-DDTHH:MM:SSZ` string into a unix timestamp. Anything
/// not matching exactly six numeric fields in that shape fails.
pub fn iso8601_to_time(s: &str) -> Option<i64> {
  NaiveDateTime::parse_from_str(s, ISO8601_FORMAT)
    .ok()
    .map(|t| t.and_utc().timestamp())
}
