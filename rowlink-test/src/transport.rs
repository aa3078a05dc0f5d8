use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use http::Request;
use http_body_util::BodyExt;
use rowlink_client::{HttpRequest, HttpResponse, Transport, TransportFailure};
use serde_json::Value;
use tower::util::ServiceExt;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dispatches requests to an in-process [`Router`] with `oneshot`, without
/// binding a port. Records every request.
pub struct RouterTransport {
    router: Router,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RouterTransport {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of requests that reached the router.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        lock(&self.requests).last().cloned()
    }
}

impl Transport for RouterTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportFailure>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());
        Box::pin(async move {
            let mut builder = Request::builder()
                .method(request.method)
                .uri(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            let body = request.body.map(Body::from).unwrap_or_else(Body::empty);
            let request = builder
                .body(body)
                .map_err(|e| TransportFailure::Network(e.to_string()))?;

            let response = match self.router.clone().oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| TransportFailure::Network(e.to_string()))?
                .to_bytes();
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

enum Step {
    Respond(HttpResponse),
    Fail(TransportFailure),
    Delay(Duration, HttpResponse),
    Hang,
}

/// Replays queued responses and failures in order, recording every request.
///
/// Once the queue is empty every call fails with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: HttpResponse) -> &Self {
        lock(&self.steps).push_back(Step::Respond(response));
        self
    }

    /// Queues a JSON response.
    pub fn respond_json(&self, status: u16, body: Value) -> &Self {
        self.respond(HttpResponse::new(status, body.to_string()))
    }

    /// Queues a JSON response with a `Content-Range` total.
    pub fn respond_counted(&self, body: Value, total: u64) -> &Self {
        let len = body.as_array().map_or(0, Vec::len);
        let range = if len == 0 {
            format!("*/{total}")
        } else {
            format!("0-{}/{total}", len - 1)
        };
        let mut response = HttpResponse::new(200, body.to_string());
        if let Ok(value) = range.parse() {
            response.headers.insert(http::header::CONTENT_RANGE, value);
        }
        self.respond(response)
    }

    pub fn respond_after(&self, delay: Duration, response: HttpResponse) -> &Self {
        lock(&self.steps).push_back(Step::Delay(delay, response));
        self
    }

    pub fn fail(&self, failure: TransportFailure) -> &Self {
        lock(&self.steps).push_back(Step::Fail(failure));
        self
    }

    /// Queues a call that never completes.
    pub fn hang(&self) -> &Self {
        lock(&self.steps).push_back(Step::Hang);
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.steps).len()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportFailure>> + Send + '_>> {
        lock(&self.requests).push(request);
        let step = lock(&self.steps).pop_front();
        Box::pin(async move {
            match step {
                Some(Step::Respond(response)) => Ok(response),
                Some(Step::Fail(failure)) => Err(failure),
                Some(Step::Delay(delay, response)) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Some(Step::Hang) => std::future::pending().await,
                None => Err(TransportFailure::Network("no scripted response left".to_string())),
            }
        })
    }
}
