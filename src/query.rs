//! Query DSL and structured-query compiler.
//!
//! A [`Query`] collects conditions, order-bys and an optional limit, and
//! compiles into the `:runQuery` wire document. Raw query responses are
//! reshaped back into plain decoded documents tagged with [`DOC_ID_KEY`].
//!
//! # Example
//! ```
//! use emberdb::query::{Direction, Op, Query};
//! use serde_json::json;
//!
//! let q = Query::new()
//!   .filter("age", Op::GreaterThan, json!(25))
//!   .order_by("age", Direction::Descending)
//!   .limit(3);
//! let wire = q.compile("projects/p/databases/(default)/documents/", "free");
//! assert_eq!(wire["structuredQuery"]["from"]["collectionId"], "free");
//! ```

use serde_json::{json, Value};

use crate::path::id_from_path;
use crate::value::{decode_value, encode_value};

/// Reserved field attached to each query hit, holding the document's
/// server-side id.
pub const DOC_ID_KEY: &str = "_doc_id";

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  Equal,
  NotEqual,
  GreaterThan,
  GreaterThanOrEqual,
  LessThan,
  LessThanOrEqual,
  ArrayContains,
  ArrayContainsAny,
  In,
  NotIn,
}

impl Op {
  /// Canonical wire name of the operator.
  pub fn wire_name(self) -> &'static str {
    match self {
      Op::Equal => "EQUAL",
      Op::NotEqual => "NOT_EQUAL",
      Op::GreaterThan => "GREATER_THAN",
      Op::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
      Op::LessThan => "LESS_THAN",
      Op::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
      Op::ArrayContains => "ARRAY_CONTAINS",
      Op::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
      Op::In => "IN",
      Op::NotIn => "NOT_IN",
    }
  }
}

/// Sort direction of an order-by clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
  #[default]
  Ascending,
  Descending,
}

impl Direction {
  fn wire_name(self) -> &'static str {
    match self {
      Direction::Ascending => "ASCENDING",
      Direction::Descending => "DESCENDING",
    }
  }
}

#[derive(Debug, Clone)]
pub struct Condition {
  pub field: String,
  pub op: Op,
  pub value: Value,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
  pub field: String,
  pub direction: Direction,
}

/// Filter/order/limit query over one collection.
#[derive(Debug, Clone, Default)]
pub struct Query {
  pub conditions: Vec<Condition>,
  pub order_by: Vec<OrderBy>,
  pub limit: Option<u32>,
  /// Accepted by the DSL but not part of the compiled output yet.
  pub offset: Option<u32>,
}

impl Query {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a condition. Multiple conditions compose with AND.
  pub fn filter(mut self, field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
    self.conditions.push(Condition {
      field: field.into(),
      op,
      value: value.into(),
    });
    self
  }

  /// Add a sort key. Input order is priority order.
  pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
    self.order_by.push(OrderBy {
      field: field.into(),
      direction,
    });
    self
  }

  /// Cap the number of results. Zero means unlimited.
  pub fn limit(mut self, n: u32) -> Self {
    self.limit = Some(n);
    self
  }

  /// Reserved. Stored but never emitted by `compile`.
  pub fn offset(mut self, n: u32) -> Self {
    self.offset = Some(n);
    self
  }

  /// Compile into the `:runQuery` wire document, executed under
  /// `parent_resource` against the collection `collection_id`.
  pub fn compile(&self, parent_resource: &str, collection_id: &str) -> Value {
    let mut sq = json!({
      "from": { "collectionId": collection_id }
    });

    if !self.conditions.is_empty() {
      let filters: Vec<Value> = self
        .conditions
        .iter()
        .map(|c| {
          json!({
            "fieldFilter": {
              "field": { "fieldPath": c.field },
              "op": c.op.wire_name(),
              "value": encode_value(&c.value)
            }
          })
        })
        .collect();
      sq["where"] = json!({
        "compositeFilter": { "filters": filters, "op": "AND" }
      });
    }

    if !self.order_by.is_empty() {
      let orders: Vec<Value> = self
        .order_by
        .iter()
        .map(|o| {
          json!({
            "field": { "fieldPath": o.field },
            "direction": o.direction.wire_name()
          })
        })
        .collect();
      sq["orderBy"] = Value::Array(orders);
    }

    if let Some(limit) = self.limit {
      if limit > 0 {
        sq["limit"] = json!(limit);
      }
    }

    json!({ "parent": parent_resource, "structuredQuery": sq })
  }
}

/// Reshape a raw `:runQuery` response into an array of decoded documents.
///
/// Envelopes without a `document` key (progress/read-time heartbeats) are
/// dropped; each kept document is tagged with [`DOC_ID_KEY`].
pub fn reshape_results(raw: &Value) -> Value {
  let mut out = Vec::new();
  if let Some(entries) = raw.as_array() {
    for entry in entries {
      let Some(doc) = entry.get("document") else {
        continue;
      };
      let mut decoded = decode_value(doc).unwrap_or(Value::Null);
      if let Some(name) = doc.get("name").and_then(Value::as_str) {
        if let Some(obj) = decoded.as_object_mut() {
          obj.insert(DOC_ID_KEY.to_string(), json!(id_from_path(name)));
        }
      }
      out.push(decoded);
    }
  }
  Value::Array(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn operator_wire_names_are_fixed() {
    assert_eq!(Op::Equal.wire_name(), "EQUAL");
    assert_eq!(Op::NotEqual.wire_name(), "NOT_EQUAL");
    assert_eq!(Op::ArrayContainsAny.wire_name(), "ARRAY_CONTAINS_ANY");
    assert_eq!(Op::NotIn.wire_name(), "NOT_IN");
  }

  #[test]
  fn empty_query_has_no_optional_sections() {
    let wire = Query::new().compile("root/", "free");
    let sq = &wire["structuredQuery"];
    assert_eq!(sq["from"]["collectionId"], "free");
    assert!(sq.get("where").is_none());
    assert!(sq.get("orderBy").is_none());
    assert!(sq.get("limit").is_none());
    assert_eq!(wire["parent"], "root/");
  }

  #[test]
  fn conditions_compose_as_and_composite() {
    let wire = Query::new()
      .filter("age", Op::GreaterThanOrEqual, json!(25))
      .filter("age", Op::LessThan, json!(45))
      .compile("root/", "free");
    let w = &wire["structuredQuery"]["where"]["compositeFilter"];
    assert_eq!(w["op"], "AND");
    let filters = w["filters"].as_array().unwrap();
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[0]["fieldFilter"]["op"], "GREATER_THAN_OR_EQUAL");
    assert_eq!(filters[0]["fieldFilter"]["field"]["fieldPath"], "age");
    assert_eq!(filters[0]["fieldFilter"]["value"], json!({ "doubleValue": 25 }));
    assert_eq!(filters[1]["fieldFilter"]["op"], "LESS_THAN");
  }

  #[test]
  fn order_by_preserves_input_order() {
    let wire = Query::new()
      .order_by("pinned", Direction::Descending)
      .order_by("age", Direction::Ascending)
      .compile("root/", "free");
    let orders = wire["structuredQuery"]["orderBy"].as_array().unwrap();
    assert_eq!(orders[0]["field"]["fieldPath"], "pinned");
    assert_eq!(orders[0]["direction"], "DESCENDING");
    assert_eq!(orders[1]["field"]["fieldPath"], "age");
    assert_eq!(orders[1]["direction"], "ASCENDING");
  }

  #[test]
  fn zero_limit_means_unlimited() {
    let wire = Query::new().limit(0).compile("root/", "free");
    assert!(wire["structuredQuery"].get("limit").is_none());
    let wire = Query::new().limit(3).compile("root/", "free");
    assert_eq!(wire["structuredQuery"]["limit"], json!(3));
  }

  #[test]
  fn offset_is_accepted_but_never_emitted() {
    let q = Query::new().offset(10);
    assert_eq!(q.offset, Some(10));
    let wire = q.compile("root/", "free");
    assert!(wire["structuredQuery"].get("offset").is_none());
    assert!(wire["structuredQuery"].get("skip").is_none());
  }

  #[test]
  fn reshape_keeps_documents_and_tags_ids() {
    let raw = json!([
      { "readTime": "2022-04-15T14:25:30Z" },
      {
        "document": {
          "name": "projects/p/databases/(default)/documents/free/doc1",
          "fields": { "age": { "doubleValue": 30 } }
        }
      },
      {
        "document": {
          "name": "projects/p/databases/(default)/documents/free/doc2",
          "fields": { "age": { "integerValue": "40" } }
        }
      }
    ]);
    let out = reshape_results(&raw);
    let hits = out.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["age"], json!(30));
    assert_eq!(hits[0][DOC_ID_KEY], "doc1");
    assert_eq!(hits[1]["age"], json!(40));
    assert_eq!(hits[1][DOC_ID_KEY], "doc2");
  }

  #[test]
  fn reshape_of_non_array_is_empty() {
    assert_eq!(reshape_results(&json!({})), json!([]));
  }
}
