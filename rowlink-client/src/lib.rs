//! HTTP side of rowlink: configuration, credentials, the transport seam,
//! the dispatcher that turns [`CompiledQuery`](rowlink_core::CompiledQuery)
//! values into requests, and response normalization.

pub mod client;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod normalize;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ConfigError};
pub use credentials::{CredentialError, CredentialProvider, FnCredentials, NoCredentials, StaticToken};
pub use dispatch::Dispatcher;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportFailure};
