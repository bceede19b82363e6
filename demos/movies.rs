//! Demo walking through the EmberDB SDK: auth, writes, reads and a
//! filtered query, driven by a simple poll loop.

use std::time::Duration;

use emberdb::{Direction, Op, Query, Session, DOC_ID_KEY};
use serde_json::json;

/// Poll until every outstanding operation has delivered its callback.
async fn drain(session: &Session) {
  while session.has_pending() {
    session.poll();
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
}

#[tokio::main]
async fn main() -> emberdb::Result<()> {
  tracing_subscriber::fmt::init();

  let session = Session::configure("demo-project", "demo-api-key")?;

  session.connect_or_sign_up("user@example.com", "hunter2", |res| {
    println!("auth: ok={} code={:?}", res.is_ok(), res.error_code());
  })?;
  drain(&session).await;
  println!("signed in as {}", session.uid());

  let movies = session.reference("movies");

  movies.child("alien").write(
    &json!({
      "title": "Alien",
      "year": 1979.0,
      "director": { "name": "Ridley Scott", "age": 80.0 },
      "premiere": "1979-05-25T00:00:00Z"
    }),
    |res| println!("write: ok={}", res.is_ok()),
  )?;
  movies.add(
    &json!({ "title": "Blade Runner", "year": 1982.0 }),
    |res| println!("add: id={:?}", res.added_id),
  )?;
  drain(&session).await;

  movies
    .child("alien")
    .inc("director.age", 5.0, |res| {
      println!("director.age is now {}", res.value);
    })?;
  drain(&session).await;

  movies.child("alien").read(|res| {
    println!("read back: {}", res.value);
  })?;
  drain(&session).await;

  let recent = Query::new()
    .filter("year", Op::GreaterThan, json!(1980.0))
    .order_by("year", Direction::Descending)
    .limit(10);
  movies.query(&recent, |res| {
    if let Some(hits) = res.value.as_array() {
      for hit in hits {
        println!("hit {}: {}", hit[DOC_ID_KEY], hit["title"]);
      }
    }
  })?;
  drain(&session).await;

  session.disconnect();
  Ok(())
}
