//! Stepwire runtime - backend transports, framing, and command correlation
//!
//! This crate carries commands from the session engine to an execution
//! backend and brings replies and notifications back:
//!
//! - **Framing**: splitting an undelimited stream of JSON objects into messages
//! - **Transport**: newline-terminated writes, re-framed reads over any byte stream
//! - **Connection**: correlation of replies to calls, event dispatch
//! - **HTTP**: one POST per command, notifications piggybacked on replies
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   stepwire   │  Session engine
//! └──────┬───────┘
//!        │ dyn Backend
//! ┌──────▼──────────────────────┐
//! │ Connection  │  HttpBackend  │
//! │ ┌─────────┐ │               │
//! │ │Transport│ │   reqwest     │
//! │ │ Framer  │ │               │
//! │ └─────────┘ │               │
//! └─────────────┴───────────────┘
//! ```
//!
//! Whatever goes wrong on the wire, a [`Backend::call`] resolves: failures
//! produce a `null` result plus a single `end` notification.

pub mod backend;
pub mod connection;
pub mod error;
pub mod framing;
pub mod http;
pub mod transport;

pub use backend::{Backend, BackendEvents, CallFuture, EventSender};
pub use connection::{Connection, ConnectionOptions, DEFAULT_REQUEST_TIMEOUT};
pub use error::{Error, Result};
pub use framing::{BraceFramer, DEFAULT_MAX_FRAME_LEN};
pub use http::HttpBackend;
pub use transport::{
	StreamTransport, StreamTransportReceiver, StreamTransportSender, TransportParts, TransportReceiver,
	TransportSender,
};
