//! Stepwire - a debug adapter for loosely coupled execution backends
//!
//! The [`Session`] engine accepts Debug Adapter Protocol operations one at a
//! time and turns each into backend commands over any
//! [`Backend`](stepwire_runtime::Backend): a framed TCP stream or plain HTTP.
//! Backend notifications come back out as [`SessionEvent`]s with positions
//! translated to the client's numbering.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stepwire::{Session, SessionOptions};
//! use stepwire_runtime::{Connection, ConnectionOptions};
//!
//! let (backend, backend_events) = Connection::connect_tcp("127.0.0.1:5005", ConnectionOptions::default()).await?;
//! let (mut session, mut events) = Session::new(backend, backend_events, SessionOptions::default());
//!
//! session.initialize(&Default::default());
//! session.configuration_done();
//! session.launch(&launch_args).await?;
//! while !session.next().await?.is_ended() {}
//! ```

pub mod breakpoints;
pub mod config;
pub mod coords;
pub mod error;
pub mod events;
pub mod runner;
pub mod session;
pub mod source;
pub mod trace;

pub use breakpoints::{BreakpointManager, BreakpointRecord};
pub use config::{DEFAULT_CONFIGURATION_TIMEOUT, SessionOptions};
pub use coords::{Coordinates, resolve_source};
pub use error::{Result, SessionError};
pub use events::{EventSink, EventStream, SessionEvent, StopReason};
pub use runner::{ContinueOutcome, RunState, Runner, StepOutcome};
pub use session::{LOCALS_REFERENCE, Session, SessionHandle, SessionState, THREAD_ID};
pub use source::{FsSourceReader, SourceReader};
