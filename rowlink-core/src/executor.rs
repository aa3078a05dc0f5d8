use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::compiled::CompiledQuery;
use crate::envelope::Envelope;

/// Cache behaviour requested for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Use the executor's cache with its configured TTL.
    #[default]
    Default,
    /// Neither read from nor write to the cache.
    Bypass,
    /// Use the cache but store the result with this TTL.
    Ttl(Duration),
}

/// Per-dispatch execution options carried by a builder.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub cache: CachePolicy,
}

/// Runs compiled queries. Implemented by the HTTP dispatcher.
///
/// Each call performs at most one network request and never retries.
/// Runtime failures are reported inside the returned envelope.
pub trait Executor: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        query: CompiledQuery,
        options: ExecOptions,
    ) -> Pin<Box<dyn Future<Output = Envelope<serde_json::Value>> + Send + 'a>>;
}
