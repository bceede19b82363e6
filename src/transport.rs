//! Transport seam between the scheduler and the network.
//!
//! The scheduler never talks HTTP itself; it hands a [`WireRequest`]
//! descriptor to a [`Transport`] and later polls it for [`Completion`]s.
//! [`HttpTransport`] is the production implementation on reqwest; tests
//! plug in an in-memory one.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
  Post,
  Get,
  Delete,
  Patch,
}

/// One outgoing request, fully described.
#[derive(Debug, Clone)]
pub struct WireRequest {
  pub request_id: u64,
  pub method: HttpMethod,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<String>,
}

/// One finished round-trip as reported by the transport.
#[derive(Debug, Clone)]
pub struct Completion {
  pub request_id: u64,
  /// Raw response body. Empty when the round-trip failed at the
  /// connectivity level; the scheduler classifies that as a transport error.
  pub body: String,
}

/// Submit a request descriptor, poll for completions. Both calls must be
/// non-blocking.
pub trait Transport {
  fn dispatch(&mut self, req: WireRequest);
  fn poll_completions(&mut self, out: &mut Vec<Completion>);
}

/// Transport running each round-trip as a tokio task over a shared
/// reqwest client. Completions funnel through an unbounded channel that
/// `poll_completions` drains without blocking.
pub struct HttpTransport {
  client: reqwest::Client,
  handle: tokio::runtime::Handle,
  tx: UnboundedSender<Completion>,
  rx: UnboundedReceiver<Completion>,
}

impl HttpTransport {
  pub fn new() -> Result<Self> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
    let (tx, rx) = mpsc::unbounded_channel();
    Ok(Self {
      client: reqwest::Client::new(),
      handle,
      tx,
      rx,
    })
  }
}

impl Transport for HttpTransport {
  fn dispatch(&mut self, req: WireRequest) {
    let client = self.client.clone();
    let tx = self.tx.clone();
    self.handle.spawn(async move {
      let mut builder = match req.method {
        HttpMethod::Post => client.post(&req.url),
        HttpMethod::Get => client.get(&req.url),
        HttpMethod::Delete => client.delete(&req.url),
        HttpMethod::Patch => client.patch(&req.url),
      };
      for (name, value) in &req.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }
      if let Some(body) = req.body {
        builder = builder.body(body);
      }
      let body = match builder.send().await {
        Ok(response) => response.text().await.unwrap_or_default(),
        Err(e) => {
          warn!("request #{} network failure: {e}", req.request_id);
          String::new()
        }
      };
      // A closed receiver means the session was torn down; the completion
      // is discarded with it.
      let _ = tx.send(Completion {
        request_id: req.request_id,
        body,
      });
    });
  }

  fn poll_completions(&mut self, out: &mut Vec<Completion>) {
    while let Ok(done) = self.rx.try_recv() {
      out.push(done);
    }
  }
}
