//! The `stepwire` debug adapter binary, as a library.
//!
//! Parses the command line, resolves settings against the config file,
//! connects to the execution backend and serves the Debug Adapter Protocol
//! over stdio or TCP.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dap;
pub mod error;
pub mod logging;
pub mod styles;
