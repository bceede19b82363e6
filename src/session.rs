//! Session facade: configuration, authentication and the poll loop.
//!
//! A [`Session`] is a cheap clonable handle over shared single-threaded
//! state. All forward progress happens inside caller-invoked
//! [`Session::poll`] steps; callbacks run synchronously on the polling
//! call stack and may submit follow-up operations, but the scheduler is
//! dispatched sequentially, never reentrantly.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Result, ERR_AUTH_EMAIL_NOT_FOUND};
use crate::reference::Ref;
use crate::scheduler::{OpResult, RpcFlags, Scheduler};
use crate::transport::{HttpTransport, Transport};

const AUTH_SIGNIN_URL: &str = "https://auth.emberdb.dev/v1/accounts:signInWithPassword";
const AUTH_SIGNUP_URL: &str = "https://auth.emberdb.dev/v1/accounts:signUp";
const API_URL_ROOT: &str = "https://api.emberdb.dev/v1/projects/";

struct Inner {
  project_id: String,
  api_key: String,
  /// Absolute REST root of the project's document tree.
  url_root: String,
  /// Resource-name prefix for absolute document names, trailing slash.
  doc_root: String,
  user_id: String,
  token: String,
  scheduler: Option<Scheduler>,
}

/// Handle to one configured EmberDB project.
#[derive(Clone)]
pub struct Session {
  inner: Rc<RefCell<Inner>>,
}

impl Session {
  /// Configure a session against the hosted service. Requires an ambient
  /// tokio runtime for the HTTP transport.
  pub fn configure(project_id: &str, api_key: &str) -> Result<Session> {
    let transport = HttpTransport::new()?;
    Ok(Self::with_transport(project_id, api_key, Box::new(transport)))
  }

  /// Configure a session over a caller-supplied transport. Intended for
  /// tests and custom environments.
  pub fn with_transport(
    project_id: &str,
    api_key: &str,
    transport: Box<dyn Transport>,
  ) -> Session {
    debug!("session configured for project {project_id}");
    Session {
      inner: Rc::new(RefCell::new(Inner {
        project_id: project_id.to_string(),
        api_key: api_key.to_string(),
        url_root: format!("{API_URL_ROOT}{project_id}/databases/(default)/documents"),
        doc_root: format!("projects/{project_id}/databases/(default)/documents/"),
        user_id: String::new(),
        token: String::new(),
        scheduler: Some(Scheduler::new(transport)),
      })),
    }
  }

  pub fn project_id(&self) -> String {
    self.inner.borrow().project_id.clone()
  }

  /// Authenticated user id, empty until `connect`/`sign_up` succeeds.
  pub fn uid(&self) -> String {
    self.inner.borrow().user_id.clone()
  }

  /// Current bearer token, empty until authenticated.
  pub fn token(&self) -> String {
    self.inner.borrow().token.clone()
  }

  /// Reference to a document or collection by logical path.
  pub fn reference(&self, path: &str) -> Ref {
    Ref {
      session: self.clone(),
      path: path.to_string(),
    }
  }

  /// Sign in with email and password. On success the session stores the
  /// user id and bearer token for every subsequent request.
  pub fn connect(
    &self,
    email: &str,
    password: &str,
    cb: impl FnOnce(&mut OpResult) + 'static,
  ) -> Result<u64> {
    self.auth_request(AUTH_SIGNIN_URL, email, password, cb)
  }

  /// Create an account with email and password, then behave as `connect`.
  pub fn sign_up(
    &self,
    email: &str,
    password: &str,
    cb: impl FnOnce(&mut OpResult) + 'static,
  ) -> Result<u64> {
    self.auth_request(AUTH_SIGNUP_URL, email, password, cb)
  }

  /// Try `connect`; fall back to `sign_up` only when the service answers
  /// with the email-not-found code.
  pub fn connect_or_sign_up(
    &self,
    email: &str,
    password: &str,
    cb: impl FnOnce(&mut OpResult) + 'static,
  ) -> Result<u64> {
    let weak = Rc::downgrade(&self.inner);
    let retry_email = email.to_string();
    let retry_password = password.to_string();
    self.connect(email, password, move |res| {
      if res.error_code() == Some(ERR_AUTH_EMAIL_NOT_FOUND) {
        if let Some(inner) = weak.upgrade() {
          debug!("email not found, signing up");
          let session = Session { inner };
          if let Err(e) = session.sign_up(&retry_email, &retry_password, cb) {
            warn!("sign-up fallback rejected: {e}");
          }
          return;
        }
      }
      cb(res);
    })
  }

  fn auth_request(
    &self,
    url_base: &str,
    email: &str,
    password: &str,
    cb: impl FnOnce(&mut OpResult) + 'static,
  ) -> Result<u64> {
    let api_key = self.inner.borrow().api_key.clone();
    let url = format!("{url_base}?key={}", urlencoding::encode(&api_key));
    let body = json!({
      "email": email,
      "password": password,
      "returnSecureToken": true
    });
    let weak = Rc::downgrade(&self.inner);
    self.submit(&url, Some(body), RpcFlags::auth(), "connect", move |res| {
      if res.is_ok() {
        let user_id = res
          .value
          .get("localId")
          .and_then(Value::as_str)
          .unwrap_or("")
          .to_string();
        let token = res
          .value
          .get("idToken")
          .and_then(Value::as_str)
          .unwrap_or("")
          .to_string();
        if let Some(inner) = weak.upgrade() {
          let mut inner = inner.borrow_mut();
          debug!("authenticated, uid {user_id}");
          inner.user_id = user_id;
          inner.token = token.clone();
          if let Some(sched) = inner.scheduler.as_mut() {
            sched.set_token(&token);
          }
        }
      }
      cb(res);
    })
  }

  /// Tear down the transport. In-flight requests are discarded and their
  /// callbacks never fire.
  pub fn disconnect(&self) {
    let mut inner = self.inner.borrow_mut();
    inner.scheduler = None;
    inner.token.clear();
    inner.user_id.clear();
    debug!("session disconnected");
  }

  /// Drive one non-blocking transport step and dispatch every completion
  /// it produced. Returns whether any callback fired.
  pub fn poll(&self) -> bool {
    {
      let mut inner = self.inner.borrow_mut();
      match inner.scheduler.as_mut() {
        Some(sched) => sched.pump(),
        None => return false,
      }
    }
    let mut worked = false;
    loop {
      // The scheduler borrow is released before the callback runs, so
      // callbacks may submit follow-up requests.
      let next = {
        let mut inner = self.inner.borrow_mut();
        inner.scheduler.as_mut().and_then(Scheduler::pop_completed)
      };
      match next {
        Some((cb, mut result)) => {
          cb(&mut result);
          worked = true;
        }
        None => break,
      }
    }
    worked
  }

  /// True while at least one request is in flight.
  pub fn has_pending(&self) -> bool {
    self
      .inner
      .borrow()
      .scheduler
      .as_ref()
      .map_or(false, Scheduler::has_pending)
  }

  /// Log every in-flight request at debug level.
  pub fn dump(&self) {
    if let Some(sched) = self.inner.borrow().scheduler.as_ref() {
      sched.dump();
    }
  }

  /// Absolute resource name of a logical path.
  pub(crate) fn doc_name(&self, path: &str) -> String {
    format!("{}{path}", self.inner.borrow().doc_root)
  }

  /// Resolve the URL and hand the request to the scheduler. Fails with
  /// `NotConnected` after `disconnect`; the callback is then never
  /// invoked.
  pub(crate) fn submit(
    &self,
    suffix: &str,
    body: Option<Value>,
    flags: RpcFlags,
    label: &'static str,
    cb: impl FnOnce(&mut OpResult) + 'static,
  ) -> Result<u64> {
    let mut inner = self.inner.borrow_mut();
    let url = if flags.auth {
      suffix.to_string()
    } else if suffix.starts_with(':') {
      format!("{}{suffix}", inner.url_root)
    } else {
      format!("{}/{suffix}", inner.url_root)
    };
    match inner.scheduler.as_mut() {
      Some(sched) => Ok(sched.submit(url, body, flags, label, Box::new(cb))),
      None => {
        warn!("{label} rejected: session has no active transport");
        Err(crate::error::Error::NotConnected)
      }
    }
  }
}
