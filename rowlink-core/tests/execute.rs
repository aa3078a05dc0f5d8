use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use rowlink_core::prelude::*;
use rowlink_core::{CompiledQuery, ExecOptions, Executor, ResponseMode};
use serde::Deserialize;
use serde_json::{json, Value};

/// Returns a fixed envelope and remembers every query it was given.
struct StubExecutor {
    reply: Envelope<Value>,
    seen: Mutex<Vec<CompiledQuery>>,
}

impl StubExecutor {
    fn new(reply: Envelope<Value>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl Executor for StubExecutor {
    fn execute<'a>(
        &'a self,
        query: CompiledQuery,
        _options: ExecOptions,
    ) -> Pin<Box<dyn Future<Output = Envelope<Value>> + Send + 'a>> {
        self.seen.lock().unwrap().push(query);
        let reply = self.reply.clone();
        Box::pin(async move { reply })
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: i64,
    #[serde(rename = "fullName")]
    full_name: String,
}

#[tokio::test]
async fn test_execute_decodes_rows() {
    let stub = StubExecutor::new(Envelope::success(
        Some(json!([{"id": 1, "fullName": "Ann"}, {"id": 2, "fullName": "Bob"}])),
        None,
        200,
    ));
    let env = QueryBuilder::with_executor("users", stub.clone())
        .select(["id", "name AS fullName"])
        .execute::<User>()
        .await
        .unwrap();
    assert!(env.is_ok());
    let rows = env.data.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].full_name, "Ann");

    let seen = stub.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].mode, ResponseMode::Many);
}

#[tokio::test]
async fn test_decode_failure_lands_in_envelope() {
    let stub = StubExecutor::new(Envelope::success(Some(json!([{"id": "x"}])), None, 200));
    let env = QueryBuilder::with_executor("users", stub)
        .execute::<User>()
        .await
        .unwrap();
    assert_eq!(env.data, None);
    assert_eq!(env.error.map(|e| e.kind()), Some(ErrorKind::Decode));
}

#[tokio::test]
async fn test_single_sends_single_mode() {
    let stub = StubExecutor::new(Envelope::success(
        Some(json!({"id": 7, "fullName": "Cy"})),
        None,
        200,
    ));
    let env = QueryBuilder::with_executor("users", stub.clone())
        .eq("id", 7)
        .single::<User>()
        .await
        .unwrap();
    assert_eq!(env.data.map(|u| u.id), Some(7));
    assert_eq!(stub.seen.lock().unwrap()[0].mode, ResponseMode::Single);
}

#[tokio::test]
async fn test_maybe_single_miss_is_none() {
    let stub = StubExecutor::new(Envelope::success(None, None, 200));
    let env = QueryBuilder::with_executor("users", stub)
        .eq("id", 99)
        .maybe_single::<User>()
        .await
        .unwrap();
    assert!(env.is_ok());
    assert!(env.data.is_none());
}

#[tokio::test]
async fn test_runtime_errors_are_not_returned_as_err() {
    let stub = StubExecutor::new(Envelope::failure(Error::network("connection refused"), 0));
    let result = QueryBuilder::with_executor("users", stub)
        .execute::<User>()
        .await;
    let env = result.expect("runtime errors stay in the envelope");
    assert_eq!(env.error.map(|e| e.kind()), Some(ErrorKind::Transport));
}

#[tokio::test]
async fn test_compile_errors_never_reach_executor() {
    let stub = StubExecutor::new(Envelope::success(Some(json!([])), None, 200));
    let err = QueryBuilder::with_executor("users", stub.clone())
        .in_("id", Vec::<i64>::new())
        .execute::<User>()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(stub.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_execute_with_pagination_builds_page() {
    let stub = StubExecutor::new(Envelope::success(
        Some(json!([{"id": 11, "fullName": "K"}, {"id": 12, "fullName": "L"}])),
        Some(25),
        200,
    ));
    let env = QueryBuilder::with_executor("users", stub.clone())
        .page(2, 10)
        .execute_with_pagination::<User>()
        .await
        .unwrap();
    let page = env.data.unwrap();
    assert_eq!(page.total_elements, 25);
    assert_eq!(page.total_pages, 3);
    assert!(page.has_next());
    assert_eq!(
        stub.seen.lock().unwrap()[0].header("Prefer"),
        Some("count=exact")
    );
}

#[tokio::test]
async fn test_execute_with_pagination_requires_page() {
    let stub = StubExecutor::new(Envelope::success(Some(json!([])), None, 200));
    let err = QueryBuilder::with_executor("users", stub)
        .limit(10)
        .execute_with_pagination::<User>()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_try_execute_flattens_runtime_error() {
    let stub = StubExecutor::new(Envelope::failure(
        Error::Database {
            status: 409,
            error: rowlink_core::ServerError::new("23505", "duplicate key"),
        },
        409,
    ));
    let err = QueryBuilder::with_executor("users", stub)
        .insert(json!({"id": 1}))
        .try_execute::<Value>()
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("23505"));
}
