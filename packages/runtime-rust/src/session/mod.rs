//! Sessions, clients and the transport boundary.

pub mod client;
#[allow(clippy::module_inception)]
pub mod session;
pub mod transport;

pub use client::Client;
pub use session::{IncomingRequest, Session, SessionBuilder};
pub use transport::{ForwardingHandler, InProcessTransport, Transport};
