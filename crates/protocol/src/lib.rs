//! Wire types for stepwire.
//!
//! This crate contains the serde-serializable shapes that cross a process
//! boundary:
//!
//! - [`backend`]: commands, replies and notifications exchanged with the
//!   execution backend
//! - [`keys`]: field-name case normalization applied to backend payloads
//! - [`dap`]: the Debug Adapter Protocol bodies the adapter produces
//!
//! Types here are pure data. Correlation, framing and session semantics live
//! in `stepwire-runtime` and `stepwire`.

pub mod backend;
pub mod dap;
pub mod keys;

pub use backend::*;
pub use keys::KeyCase;
