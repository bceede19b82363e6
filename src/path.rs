//! Slash-delimited resource path helpers.

use tracing::warn;

/// Split a path at its last `/` into `(parent, id)`. A path with no `/`
/// has an empty parent and is its own id.
pub fn split_parent_and_id(path: &str) -> (&str, &str) {
  match path.rfind('/') {
    Some(pos) => (&path[..pos], &path[pos + 1..]),
    None => ("", path),
  }
}

/// Trailing segment of a resource path.
pub fn id_from_path(path: &str) -> &str {
  match path.rfind('/') {
    Some(pos) => &path[pos + 1..],
    None => {
      warn!("no '/' separator in resource path {path:?}");
      path
    }
  }
}
