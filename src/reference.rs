//! Document/collection references and the operation surface.
//!
//! A [`Ref`] pairs a session handle with a slash-delimited logical path.
//! It is a plain value: clone it freely, capture clones in callbacks.
//! Every operation returns the request id immediately; the outcome
//! arrives through the callback during a later [`crate::Session::poll`].

use serde_json::{json, Map, Value};

use crate::error::{Error, Result, ERR_DOC_MISSING};
use crate::path::{id_from_path, split_parent_and_id};
use crate::query::{reshape_results, Query};
use crate::scheduler::{OpResult, RpcFlags};
use crate::session::Session;
use crate::value::{decode_value, encode_document};

/// Logical handle to a document or collection.
#[derive(Clone)]
pub struct Ref {
  pub(crate) session: Session,
  pub(crate) path: String,
}

impl Ref {
  /// Descend into a sub-path. Empty sub-paths are a programming error.
  pub fn child(&self, sub: &str) -> Ref {
    assert!(!sub.is_empty(), "child() requires a non-empty sub-path");
    Ref {
      session: self.session.clone(),
      path: format!("{}/{}", self.path, sub),
    }
  }

  /// Trailing segment of the path.
  pub fn id(&self) -> &str {
    id_from_path(&self.path)
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  /// Fetch one document. A missing document reports
  /// [`ERR_DOC_MISSING`](crate::ERR_DOC_MISSING) with an empty object as
  /// the value.
  pub fn read(&self, cb: impl FnOnce(&mut OpResult) + 'static) -> Result<u64> {
    let body = json!({ "documents": [self.session.doc_name(&self.path)] });
    self.session.submit(
      ":batchGet",
      Some(body),
      RpcFlags::default(),
      "read",
      move |res| {
        if res.is_ok() {
          let first = res.value.get(0).cloned().unwrap_or(Value::Null);
          if let Some(found) = first.get("found") {
            res.value = decode_value(found).unwrap_or(Value::Null);
          } else if first.get("missing").is_some() {
            res.error = Some(Error::Protocol {
              code: ERR_DOC_MISSING,
            });
            res.value = json!({});
          }
        }
        cb(res);
      },
    )
  }

  /// Full-document overwrite at this path.
  pub fn write(&self, doc: &Value, cb: impl FnOnce(&mut OpResult) + 'static) -> Result<u64> {
    let mut document = encode_document(doc);
    document["name"] = json!(self.session.doc_name(&self.path));
    let body = json!({ "writes": [{ "update": document }] });
    self
      .session
      .submit(":commit", Some(body), RpcFlags::default(), "write", cb)
  }

  /// Create a document with a server-assigned id under this collection.
  /// On success the generated id lands in `OpResult::added_id`.
  pub fn add(&self, doc: &Value, cb: impl FnOnce(&mut OpResult) + 'static) -> Result<u64> {
    let body = encode_document(doc);
    self.session.submit(
      &self.path,
      Some(body),
      RpcFlags::default(),
      "add",
      move |res| {
        if res.is_ok() {
          let name = res.value.get("name").and_then(Value::as_str).unwrap_or("");
          assert!(!name.is_empty(), "create response carries no document name");
          res.added_id = Some(id_from_path(name).to_string());
        }
        cb(res);
      },
    )
  }

  /// Delete the document at this path.
  pub fn del(&self, cb: impl FnOnce(&mut OpResult) + 'static) -> Result<u64> {
    let flags = RpcFlags {
      delete: true,
      ..Default::default()
    };
    self.session.submit(&self.path, None, flags, "del", cb)
  }

  /// Atomically increment a numeric field. The callback value is the
  /// post-increment field value.
  pub fn inc(
    &self,
    field_path: &str,
    delta: f64,
    cb: impl FnOnce(&mut OpResult) + 'static,
  ) -> Result<u64> {
    let body = json!({
      "writes": [{
        "transform": {
          "document": self.session.doc_name(&self.path),
          "fieldTransforms": [{
            "fieldPath": field_path,
            "increment": { "doubleValue": delta }
          }]
        }
      }]
    });
    self.session.submit(
      ":commit",
      Some(body),
      RpcFlags::default(),
      "inc",
      move |res| {
        if res.is_ok() {
          // One write, one transform. Anything else is an internal
          // consistency failure, not a user-recoverable error.
          let writes = res.value.get("writeResults").and_then(Value::as_array);
          assert!(
            writes.map_or(false, |w| w.len() == 1),
            "commit answered with unexpected writeResults shape"
          );
          let transforms = res.value["writeResults"][0]
            .get("transformResults")
            .and_then(Value::as_array);
          assert!(
            transforms.map_or(false, |t| t.len() == 1),
            "commit answered with unexpected transformResults shape"
          );
          let new_value = res.value["writeResults"][0]["transformResults"][0].clone();
          res.value = decode_value(&new_value).unwrap_or(Value::Null);
        }
        cb(res);
      },
    )
  }

  /// Partial update of exactly one field path; other fields are left
  /// untouched.
  pub fn patch(
    &self,
    field_path: &str,
    new_value: &Value,
    cb: impl FnOnce(&mut OpResult) + 'static,
  ) -> Result<u64> {
    let mask = urlencoding::encode(field_path);
    let suffix = format!(
      "{}?updateMask.fieldPaths={mask}&mask.fieldPaths={mask}",
      self.path
    );
    let mut doc = Map::new();
    doc.insert(field_path.to_string(), new_value.clone());
    let body = encode_document(&Value::Object(doc));
    let flags = RpcFlags {
      patch: true,
      ..Default::default()
    };
    self.session.submit(&suffix, Some(body), flags, "patch", cb)
  }

  /// Unfiltered listing of this collection, passed through as received.
  pub fn list(&self, cb: impl FnOnce(&mut OpResult) + 'static) -> Result<u64> {
    let flags = RpcFlags {
      get: true,
      ..Default::default()
    };
    self.session.submit(&self.path, None, flags, "list", cb)
  }

  /// Run a filtered query against this collection. The callback value is
  /// an array of decoded documents, each tagged with
  /// [`DOC_ID_KEY`](crate::DOC_ID_KEY).
  pub fn query(&self, query: &Query, cb: impl FnOnce(&mut OpResult) + 'static) -> Result<u64> {
    let (parent, collection_id) = split_parent_and_id(&self.path);
    let parent_resource = self.session.doc_name(parent);
    let body = query.compile(&parent_resource, collection_id);
    let suffix = format!("{parent}:runQuery");
    self.session.submit(
      &suffix,
      Some(body),
      RpcFlags::default(),
      "query",
      move |res| {
        if res.is_ok() {
          res.value = reshape_results(&res.value);
        }
        cb(res);
      },
    )
  }
}
