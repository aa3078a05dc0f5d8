//! Test support for rowlink: an in-memory REST server speaking the query
//! grammar, and transports for driving a client without a network.

mod eval;
mod server;
mod transport;
mod wire;

pub use server::{FakeServer, FAKE_URL};
pub use transport::{RouterTransport, ScriptedTransport};
