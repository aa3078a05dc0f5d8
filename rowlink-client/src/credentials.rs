use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Failure reported by a [`CredentialProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialError(pub String);

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential error: {}", self.0)
    }
}

impl std::error::Error for CredentialError {}

/// Supplies the `Authorization` header value for each dispatch.
///
/// Called once per request, before sending. `Ok(None)` sends the request
/// without an `Authorization` header. An `Err` aborts the request and is
/// reported as an authentication error originating from the credentials.
pub trait CredentialProvider: Send + Sync + 'static {
    fn auth_header(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CredentialError>> + Send + '_>>;
}

/// Sends no `Authorization` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn auth_header(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CredentialError>> + Send + '_>> {
        Box::pin(async { Ok(None) })
    }
}

/// A fixed bearer token.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

impl CredentialProvider for StaticToken {
    fn auth_header(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CredentialError>> + Send + '_>> {
        let header = format!("Bearer {}", self.token);
        Box::pin(async move { Ok(Some(header)) })
    }
}

/// Adapts an async closure, e.g. one reading a session store.
pub struct FnCredentials<F> {
    f: F,
}

impl<F> FnCredentials<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> CredentialProvider for FnCredentials<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>, CredentialError>> + Send + 'static,
{
    fn auth_header(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CredentialError>> + Send + '_>> {
        Box::pin((self.f)())
    }
}
