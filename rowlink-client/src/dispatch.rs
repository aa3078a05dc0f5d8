use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use http::HeaderMap;
use rowlink_cache::{CachePattern, QueryCache};
use rowlink_core::{
    AuthErrorSource, CachePolicy, CompiledQuery, Envelope, Error, ExecOptions, Executor, Method,
    ResponseMode,
};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::credentials::CredentialProvider;
use crate::normalize::normalize;
use crate::transport::{HttpRequest, Transport, TransportFailure};

/// Status reported for cardinality violations detected client-side,
/// matching what the server uses for singular responses.
const NOT_ACCEPTABLE: u16 = 406;

/// Turns compiled queries into HTTP calls.
///
/// Each dispatch performs exactly one transport call (none on a cache hit)
/// and never retries. Reads consult the cache first and store successful
/// responses; writes bypass the cache and invalidate the written table
/// before returning.
pub struct Dispatcher {
    base_url: Url,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    cache: Option<QueryCache>,
    default_headers: HeaderMap,
    default_timeout: Option<Duration>,
    sent: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        base_url: Url,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            base_url,
            transport,
            credentials,
            cache: None,
            default_headers: HeaderMap::new(),
            default_timeout: None,
            sent: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn cache(&self) -> Option<&QueryCache> {
        self.cache.as_ref()
    }

    /// Number of requests handed to the transport so far.
    pub fn requests_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Full request URL for a compiled query.
    pub fn url_for(&self, query: &CompiledQuery) -> String {
        let mut url = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            query.table
        );
        let qs = query.query_string();
        if !qs.is_empty() {
            url.push('?');
            url.push_str(&qs);
        }
        url
    }

    pub async fn dispatch(&self, query: CompiledQuery, options: ExecOptions) -> Envelope<Value> {
        let started = Instant::now();
        let cache = match options.cache {
            CachePolicy::Bypass => None,
            _ if query.is_write() => None,
            _ => self.cache.as_ref(),
        };
        let ttl = match options.cache {
            CachePolicy::Ttl(ttl) => Some(ttl),
            _ => None,
        };

        if let Some(cache) = cache {
            if let Some(hit) = cache.get(&query) {
                debug!(
                    table = %query.table,
                    method = query.method.as_str(),
                    mode = query.mode.as_str(),
                    cache = "hit",
                    "dispatch"
                );
                return hit;
            }
        }
        let ticket = cache.map(|c| c.reserve(&query));

        let cancel = options.cancel.clone();
        if cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Envelope::failure(Error::cancelled(), 0);
        }

        let timeout = options.timeout.or(self.default_timeout);
        let envelope = match &cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Envelope::failure(Error::cancelled(), 0),
                    envelope = self.send_once(&query, timeout) => envelope,
                }
            }
            None => self.send_once(&query, timeout).await,
        };
        let envelope = shape(query.mode, envelope);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &envelope.error {
            None => debug!(
                table = %query.table,
                method = query.method.as_str(),
                mode = query.mode.as_str(),
                status = envelope.status,
                cache = if cache.is_some() { "miss" } else { "bypass" },
                elapsed_ms,
                "dispatch"
            ),
            Some(err) => warn!(
                table = %query.table,
                method = query.method.as_str(),
                status = envelope.status,
                error = %err,
                elapsed_ms,
                "dispatch failed"
            ),
        }

        // A write whose outcome is unknown may still have been applied.
        let maybe_applied = matches!(envelope.error, None | Some(Error::Transport { .. }));
        if query.is_write() && maybe_applied {
            if let Some(cache) = &self.cache {
                cache.invalidate(&CachePattern::Table(query.table.clone()));
            }
        }

        let cancelled = cancel.is_some_and(|t| t.is_cancelled());
        if let (Some(cache), Some(ticket)) = (cache, ticket) {
            if envelope.is_ok() && !cancelled {
                cache.commit(ticket, envelope.clone(), ttl);
            }
        }
        envelope
    }

    async fn send_once(&self, query: &CompiledQuery, timeout: Option<Duration>) -> Envelope<Value> {
        let request = match self.build_request(query).await {
            Ok(request) => request,
            Err(err) => return Envelope::failure(err, 0),
        };

        self.sent.fetch_add(1, Ordering::Relaxed);
        let call = self.transport.send(request);
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(TransportFailure::Timeout),
            },
            None => call.await,
        };

        match result {
            Ok(response) => normalize(&response),
            Err(TransportFailure::Timeout) => {
                let limit = timeout.map(|t| format!("{t:?}")).unwrap_or_default();
                Envelope::failure(Error::timeout(format!("no response within {limit}")), 0)
            }
            Err(TransportFailure::Network(msg)) => Envelope::failure(Error::network(msg), 0),
        }
    }

    async fn build_request(&self, query: &CompiledQuery) -> Result<HttpRequest, Error> {
        let mut headers = self.default_headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &query.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::invalid_argument(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::invalid_argument(format!("invalid value for header '{name}': {e}")))?;
            headers.insert(name, value);
        }

        let auth = self
            .credentials
            .auth_header()
            .await
            .map_err(|e| Error::credentials(e.0))?;
        if let Some(auth) = auth {
            let value = HeaderValue::from_str(&auth).map_err(|_| Error::Auth {
                origin: AuthErrorSource::Credentials,
                status: None,
                code: None,
                message: "credential provider returned an invalid header value".to_string(),
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(HttpRequest {
            method: http_method(query.method),
            url: self.url_for(query),
            headers,
            body: query.body.clone(),
        })
    }
}

impl Executor for Dispatcher {
    fn execute<'a>(
        &'a self,
        query: CompiledQuery,
        options: ExecOptions,
    ) -> Pin<Box<dyn Future<Output = Envelope<Value>> + Send + 'a>> {
        Box::pin(self.dispatch(query, options))
    }
}

fn http_method(method: Method) -> http::Method {
    match method {
        Method::Get => http::Method::GET,
        Method::Head => http::Method::HEAD,
        Method::Post => http::Method::POST,
        Method::Patch => http::Method::PATCH,
        Method::Delete => http::Method::DELETE,
    }
}

/// Applies the response mode to a normalized envelope.
///
/// `Single` and `MaybeSingle` collapse a row array into one row or a
/// cardinality error. `CountOnly` drops any payload.
pub fn shape(mode: ResponseMode, envelope: Envelope<Value>) -> Envelope<Value> {
    if !envelope.is_ok() {
        return envelope;
    }
    let Envelope {
        data,
        count,
        status,
        ..
    } = envelope;
    match mode {
        ResponseMode::Many => Envelope::success(data, count, status),
        ResponseMode::CountOnly => Envelope::success(None, count, status),
        ResponseMode::Single | ResponseMode::MaybeSingle => {
            let rows = match data {
                Some(Value::Array(rows)) => rows,
                Some(Value::Null) | None => Vec::new(),
                Some(row) => vec![row],
            };
            match (rows.len(), mode) {
                (0, ResponseMode::Single) => Envelope::failure(Error::NotFound, NOT_ACCEPTABLE),
                (0, _) => Envelope::success(None, count, status),
                (1, _) => Envelope::success(rows.into_iter().next(), count, status),
                (n, _) => Envelope::failure(Error::MultipleRowsFound(n), NOT_ACCEPTABLE),
            }
        }
    }
}
