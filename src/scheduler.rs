//! Request scheduler and pool.
//!
//! Owns every in-flight operation. Request slots live in a dense arena
//! and return to a LIFO free list once their callback has fired, so a
//! busy session settles into a fixed set of reusable slots. Request ids
//! keep increasing on every allocation regardless of slot reuse.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tracing::{debug, error, trace};

use crate::error::{Error, ERR_UNKNOWN};
use crate::transport::{Completion, HttpMethod, Transport, WireRequest};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Behavior flags attached to a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcFlags {
  pub delete: bool,
  pub get: bool,
  pub patch: bool,
  /// Pretty-print the outgoing body and log it.
  pub trace: bool,
  /// Auth endpoint request: absolute URL, no bearer header.
  pub auth: bool,
}

impl RpcFlags {
  pub(crate) fn auth() -> Self {
    Self {
      auth: true,
      ..Self::default()
    }
  }

  fn method(self) -> HttpMethod {
    if self.delete {
      HttpMethod::Delete
    } else if self.patch {
      HttpMethod::Patch
    } else if self.get {
      HttpMethod::Get
    } else {
      HttpMethod::Post
    }
  }
}

/// Outcome of one operation, handed to its callback exactly once.
#[derive(Debug, Default)]
pub struct OpResult {
  pub request_id: u64,
  /// `None` on success.
  pub error: Option<Error>,
  /// Raw response body as received.
  pub raw: String,
  /// Decoded/reshaped payload; operations rewrite this before the user
  /// callback sees it.
  pub value: Value,
  /// Server-generated id, set by `add` only.
  pub added_id: Option<String>,
}

impl OpResult {
  pub fn is_ok(&self) -> bool {
    self.error.is_none()
  }

  /// Numeric service code when the error is a protocol error.
  pub fn error_code(&self) -> Option<i64> {
    match self.error {
      Some(Error::Protocol { code }) => Some(code),
      _ => None,
    }
  }

  /// Deserialize the decoded value into a concrete type.
  pub fn get<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
    if !self.is_ok() {
      return None;
    }
    serde_json::from_value(self.value.clone()).ok()
  }
}

/// One-shot completion callback.
pub type Callback = Box<dyn FnOnce(&mut OpResult)>;

#[derive(Default)]
struct Slot {
  request_id: u64,
  url: String,
  label: &'static str,
  callback: Option<Callback>,
}

pub(crate) struct Scheduler {
  transport: Box<dyn Transport>,
  slots: Vec<Slot>,
  free: Vec<usize>,
  in_flight: HashMap<u64, usize>,
  done: VecDeque<Completion>,
  next_request_id: u64,
  bearer: Option<String>,
}

impl Scheduler {
  pub(crate) fn new(transport: Box<dyn Transport>) -> Self {
    Self {
      transport,
      slots: Vec::new(),
      free: Vec::new(),
      in_flight: HashMap::new(),
      done: VecDeque::new(),
      next_request_id: 0,
      bearer: None,
    }
  }

  pub(crate) fn set_token(&mut self, token: &str) {
    self.bearer = Some(token.to_string());
  }

  /// Allocate a slot, fill it in and hand the request to the transport.
  pub(crate) fn submit(
    &mut self,
    url: String,
    body: Option<Value>,
    flags: RpcFlags,
    label: &'static str,
    callback: Callback,
  ) -> u64 {
    let index = match self.free.pop() {
      Some(index) => index,
      None => {
        self.slots.push(Slot::default());
        trace!("pool grows to {} slots", self.slots.len());
        self.slots.len() - 1
      }
    };

    self.next_request_id += 1;
    let request_id = self.next_request_id;

    let body_text = body.map(|b| {
      if flags.trace {
        serde_json::to_string_pretty(&b).unwrap_or_default()
      } else {
        serde_json::to_string(&b).unwrap_or_default()
      }
    });
    if flags.trace {
      debug!(
        "URL: {url} BODY: {}",
        body_text.as_deref().unwrap_or("<none>")
      );
    }

    let mut headers = vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())];
    if !flags.auth {
      if let Some(token) = &self.bearer {
        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
      }
    }

    let slot = &mut self.slots[index];
    slot.request_id = request_id;
    slot.url = url.clone();
    slot.label = label;
    slot.callback = Some(callback);
    self.in_flight.insert(request_id, index);

    self.transport.dispatch(WireRequest {
      request_id,
      method: flags.method(),
      url,
      headers,
      body: body_text,
    });

    trace!("request #{request_id} ({label}) added");
    request_id
  }

  /// One non-blocking transport step: pull everything the transport has
  /// finished into the done queue.
  pub(crate) fn pump(&mut self) {
    let mut finished = Vec::new();
    self.transport.poll_completions(&mut finished);
    self.done.extend(finished);
  }

  /// Classify and detach the next finished request. The slot is released
  /// before the callback is handed back, so the callback may submit
  /// follow-up work without the scheduler borrowed.
  pub(crate) fn pop_completed(&mut self) -> Option<(Callback, OpResult)> {
    while let Some(finished) = self.done.pop_front() {
      let Some(index) = self.in_flight.remove(&finished.request_id) else {
        debug_assert!(false, "completion for unknown request");
        continue;
      };
      let slot = &mut self.slots[index];
      debug_assert_eq!(slot.request_id, finished.request_id);
      trace!(
        "request #{} ({}) completes: {}",
        finished.request_id,
        slot.label,
        finished.body
      );

      let (err, value) = classify(&finished.body);
      if err.is_some() {
        error!(
          "{}({}) failed: {}",
          slot.label, slot.url, finished.body
        );
      }

      let Some(callback) = slot.callback.take() else {
        debug_assert!(false, "request slot lost its callback");
        self.free.push(index);
        continue;
      };
      self.free.push(index);
      trace!("slot {index} back in the pool ({} free)", self.free.len());

      let result = OpResult {
        request_id: finished.request_id,
        error: err,
        raw: finished.body,
        value,
        added_id: None,
      };
      return Some((callback, result));
    }
    None
  }

  pub(crate) fn has_pending(&self) -> bool {
    !self.in_flight.is_empty()
  }

  /// Log every in-flight request.
  pub(crate) fn dump(&self) {
    for index in self.in_flight.values() {
      let slot = &self.slots[*index];
      debug!("in flight: #{} ({}) {}", slot.request_id, slot.label, slot.url);
    }
  }

  #[cfg(test)]
  fn pool_counts(&self) -> (usize, usize, usize) {
    (self.slots.len(), self.free.len(), self.in_flight.len())
  }
}

/// Classify a raw response body.
///
/// Empty body: connectivity failure. Unparseable body: malformed
/// response. A parseable payload can still carry a service failure,
/// flagged by an `error` key at the top level or in the first element of
/// an array response.
fn classify(raw: &str) -> (Option<Error>, Value) {
  if raw.is_empty() {
    return (Some(Error::Transport), Value::Null);
  }
  let parsed: Value = match serde_json::from_str(raw) {
    Ok(v) => v,
    Err(e) => return (Some(Error::MalformedResponse(e.to_string())), Value::Null),
  };
  if let Some(code) = sniff_error_code(&parsed) {
    return (Some(Error::Protocol { code }), parsed);
  }
  (None, parsed)
}

fn sniff_error_code(v: &Value) -> Option<i64> {
  let holder = if v.get("error").is_some() {
    v
  } else {
    let first = v.as_array().and_then(|a| a.first())?;
    if first.get("error").is_some() {
      first
    } else {
      return None;
    }
  };
  let code = holder["error"]
    .get("code")
    .and_then(Value::as_i64)
    .unwrap_or(ERR_UNKNOWN);
  Some(code)
}
