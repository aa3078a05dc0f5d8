use serde::{Deserialize, Serialize};

/// Fieldless discriminant of [`Error`], for branching without matching payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    UndeclaredRelation,
    DuplicateAlias,
    Transport,
    Auth,
    NotFound,
    MultipleRowsFound,
    Database,
    Decode,
}

/// Why a request never completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Network,
    Timeout,
    Cancelled,
}

/// Where an authentication failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorSource {
    /// The credential provider failed before the request was sent.
    Credentials,
    /// The server rejected the request's credentials or role.
    Server,
}

/// Structured error body returned by the REST server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ServerError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            details: None,
            hint: None,
        }
    }
}

/// Every failure the query layer can report.
///
/// Compile-time variants (`InvalidArgument`, `InvalidState`,
/// `UndeclaredRelation`, `DuplicateAlias`) are produced before any network
/// call. The remaining variants describe a dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed builder input: bad operator/value pairing, invalid pagination bounds.
    InvalidArgument(String),

    /// A terminal method was called on a builder whose state does not allow it.
    InvalidState(String),

    /// A select path or nested item refers to a relation that was never declared.
    UndeclaredRelation(String),

    /// Two items in the same select level share an output name.
    DuplicateAlias(String),

    /// The request never completed.
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// Credential provider failure or server-side authentication rejection.
    Auth {
        origin: AuthErrorSource,
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// Single-row mode matched zero rows.
    NotFound,

    /// Single-row mode matched more than one row.
    MultipleRowsFound(usize),

    /// Any other server-rejected request, with the server payload passed through.
    Database { status: u16, error: ServerError },

    /// The response payload could not be decoded into the requested row type.
    Decode(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::UndeclaredRelation(_) => ErrorKind::UndeclaredRelation,
            Error::DuplicateAlias(_) => ErrorKind::DuplicateAlias,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Auth { .. } => ErrorKind::Auth,
            Error::NotFound => ErrorKind::NotFound,
            Error::MultipleRowsFound(_) => ErrorKind::MultipleRowsFound,
            Error::Database { .. } => ErrorKind::Database,
            Error::Decode(_) => ErrorKind::Decode,
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Error::Transport {
            kind: TransportErrorKind::Network,
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Transport {
            kind: TransportErrorKind::Timeout,
            message: msg.into(),
        }
    }

    pub fn cancelled() -> Self {
        Error::Transport {
            kind: TransportErrorKind::Cancelled,
            message: "request cancelled by caller".into(),
        }
    }

    pub fn credentials(msg: impl Into<String>) -> Self {
        Error::Auth {
            origin: AuthErrorSource::Credentials,
            status: None,
            code: None,
            message: msg.into(),
        }
    }

    /// Whether this error was detected while compiling, before any I/O.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidArgument
                | ErrorKind::InvalidState
                | ErrorKind::UndeclaredRelation
                | ErrorKind::DuplicateAlias
        )
    }

    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Error::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Server-provided error code, if the server reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Database { error, .. } => error.code.as_deref(),
            Error::Auth { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Error::UndeclaredRelation(name) => write!(f, "Undeclared relation: {name}"),
            Error::DuplicateAlias(name) => write!(f, "Duplicate alias: {name}"),
            Error::Transport { kind, message } => {
                let kind = match kind {
                    TransportErrorKind::Network => "network",
                    TransportErrorKind::Timeout => "timeout",
                    TransportErrorKind::Cancelled => "cancelled",
                };
                write!(f, "Transport error ({kind}): {message}")
            }
            Error::Auth {
                origin, message, ..
            } => match origin {
                AuthErrorSource::Credentials => write!(f, "Credential provider failed: {message}"),
                AuthErrorSource::Server => write!(f, "Authentication rejected: {message}"),
            },
            Error::NotFound => write!(f, "No rows returned where exactly one was expected"),
            Error::MultipleRowsFound(n) => {
                write!(f, "{n} rows returned where at most one was expected")
            }
            Error::Database { status, error } => match &error.code {
                Some(code) => write!(f, "Database error {code} ({status}): {}", error.message),
                None => write!(f, "Database error ({status}): {}", error.message),
            },
            Error::Decode(msg) => write!(f, "Decode error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
