//! Optional logging of every backend exchange.
//!
//! Enabled per session by the `trace` launch flag; records go to the
//! `stepwire::trace` target at `info`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stepwire_protocol::Command;
use stepwire_runtime::{Backend, CallFuture};
use tracing::info;

/// Wraps a backend and logs commands and replies while the switch is on.
pub struct TracedBackend {
	inner: Arc<dyn Backend>,
	enabled: Arc<AtomicBool>,
}

impl TracedBackend {
	pub fn new(inner: Arc<dyn Backend>) -> Self {
		Self {
			inner,
			enabled: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Shared switch; flipping it affects calls already handed out.
	pub fn switch(&self) -> Arc<AtomicBool> {
		Arc::clone(&self.enabled)
	}
}

impl Backend for TracedBackend {
	fn call(&self, command: Command) -> CallFuture<'_> {
		Box::pin(async move {
			let enabled = self.enabled.load(Ordering::Relaxed);
			if enabled {
				info!(target: "stepwire::trace", command = command.name(), args = %command.args(), "->");
			}
			let name = command.name();
			let reply = self.inner.call(command).await;
			if enabled {
				info!(target: "stepwire::trace", command = name, reply = %reply, "<-");
			}
			reply
		})
	}

	fn close(&self) {
		self.inner.close();
	}
}
