//! EmberDB Rust Client SDK
//!
//! An asynchronous client for EmberDB, a hosted document database with a
//! typed-value REST wire format. Operations never block: each one is
//! submitted against a [`Ref`] with a one-shot callback, and the caller
//! drives delivery by polling the [`Session`].
//!
//! # Example
//!
//! ```no_run
//! use emberdb::{OpResult, Session};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> emberdb::Result<()> {
//!   let session = Session::configure("my-project", "my-api-key")?;
//!
//!   session.connect_or_sign_up("user@example.com", "hunter2", |res: &mut OpResult| {
//!     println!("connected: {}", res.is_ok());
//!   })?;
//!
//!   let doc = session.reference("movies").child("alien");
//!   doc.write(&json!({ "title": "Alien", "year": 1979 }), |res| {
//!     println!("written: {}", res.is_ok());
//!   })?;
//!
//!   // Completions are dispatched only from poll().
//!   while session.has_pending() {
//!     session.poll();
//!     tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!   }
//!   Ok(())
//! }
//! ```

mod error;
pub mod path;
pub mod query;
mod reference;
mod scheduler;
mod session;
pub mod transport;
pub mod value;

pub use error::{Error, Result, ERR_AUTH_EMAIL_NOT_FOUND, ERR_DOC_MISSING, ERR_UNKNOWN};
pub use query::{Condition, Direction, Op, OrderBy, Query, DOC_ID_KEY};
pub use reference::Ref;
pub use scheduler::{Callback, OpResult, RpcFlags};
pub use session::Session;
