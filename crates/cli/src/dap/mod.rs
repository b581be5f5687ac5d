//! Debug Adapter Protocol front end.

pub mod codec;
mod server;

pub use server::serve;
