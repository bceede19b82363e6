//! Error types for the EmberDB client SDK.

use thiserror::Error;

/// Protocol failure sentinel used when the service reports an error
/// without a numeric code.
pub const ERR_UNKNOWN: i64 = -1;

/// Service code attached to a read of a document that does not exist.
pub const ERR_DOC_MISSING: i64 = 1;

/// Service code returned by the auth endpoint when the email is not
/// registered. `connect_or_sign_up` keys its fallback on this value.
pub const ERR_AUTH_EMAIL_NOT_FOUND: i64 = 400;

#[derive(Error, Debug)]
pub enum Error {
  #[error("no tokio runtime available for the HTTP transport")]
  NoRuntime,

  #[error("session has no active transport")]
  NotConnected,

  #[error("transport failure: empty or unreadable response")]
  Transport,

  #[error("malformed response: {0}")]
  MalformedResponse(String),

  #[error("service error code {code}")]
  Protocol { code: i64 },
}

pub type Result<T> = std::result::Result<T, Error>;
