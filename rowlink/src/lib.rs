//! rowlink: a typed client for PostgREST-style REST-over-SQL endpoints.
//!
//! Queries are built as immutable values, compiled to a deterministic wire
//! request, dispatched once over HTTP and returned as an [`Envelope`]
//! carrying rows, an optional total count and an optional typed error.
//! Reads can be served from a shared [`QueryCache`]; successful writes
//! invalidate it.
//!
//! ```ignore
//! use rowlink::prelude::*;
//!
//! let client = Client::new(ClientConfig::load("application.yaml")?)?;
//! let page = client
//!     .from("users")
//!     .select(["id", "name AS fullName"])
//!     .relations(["posts!inner"])
//!     .eq("active", true)
//!     .order("id", Direction::Asc)
//!     .page(1, 20)
//!     .execute_with_pagination::<User>()
//!     .await?;
//! ```
//!
//! # Crates
//!
//! | Crate            | Contents                                              |
//! |------------------|-------------------------------------------------------|
//! | `rowlink-core`   | builder, compiler, operators, errors, envelope        |
//! | `rowlink-cache`  | TTL + LRU query cache with table invalidation         |
//! | `rowlink-client` | config, credentials, transport, dispatch, `Client`    |
//! | `rowlink-test`   | in-memory server and transports (dev only)            |

pub use rowlink_cache;
pub use rowlink_client;
pub use rowlink_core;

pub use rowlink_cache::{CacheConfig, CachePattern, CacheStats, QueryCache};
pub use rowlink_client::{
    Client, ClientBuilder, ClientConfig, ConfigError, CredentialError, CredentialProvider,
    FnCredentials, NoCredentials, ReqwestTransport, StaticToken, Transport,
};
pub use rowlink_core::*;

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber.
///
/// Respects `RUST_LOG`, falling back to `info,rowlink=debug`. Does nothing
/// if a global subscriber is already set.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,rowlink=debug"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    //! Everything needed to build and run queries.
    pub use rowlink_cache::{CacheConfig, CachePattern, QueryCache};
    pub use rowlink_client::{Client, ClientConfig, CredentialProvider, StaticToken};
    pub use rowlink_core::prelude::*;
    pub use rowlink_core::{MutationBuilder, Nulls};
}
