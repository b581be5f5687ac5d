//! The uniform "send command, await result" contract.
//!
//! Both transports implement [`Backend`]. A call never fails from the
//! caller's point of view: transport errors resolve the call with
//! [`Value::Null`] and push [`BackendEvent::End`] onto the event channel, so
//! the session always reaches a terminal state instead of hanging.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use stepwire_protocol::{BackendEvent, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Stream of unsolicited backend notifications, in emission order.
pub type BackendEvents = mpsc::UnboundedReceiver<BackendEvent>;

/// Boxed future returned by [`Backend::call`].
pub type CallFuture<'a> = Pin<Box<dyn Future<Output = Value> + Send + 'a>>;

/// An execution backend reachable over some transport.
pub trait Backend: Send + Sync {
	/// Sends `command` and resolves with the backend's reply payload (camelCase keys).
	///
	/// Resolves with `null` on transport failure after raising an `end` event.
	fn call(&self, command: Command) -> CallFuture<'_>;

	/// Tears the transport down. In-flight calls resolve promptly. Never panics.
	fn close(&self);
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
	fn call(&self, command: Command) -> CallFuture<'_> {
		(**self).call(command)
	}

	fn close(&self) {
		(**self).close()
	}
}

/// Producer side of [`BackendEvents`].
///
/// Forwards events in order and guarantees `End` is delivered at most once,
/// with nothing after it.
#[derive(Debug, Clone)]
pub struct EventSender {
	tx: mpsc::UnboundedSender<BackendEvent>,
	ended: Arc<AtomicBool>,
}

impl EventSender {
	pub fn channel() -> (Self, BackendEvents) {
		let (tx, rx) = mpsc::unbounded_channel();
		(
			Self {
				tx,
				ended: Arc::new(AtomicBool::new(false)),
			},
			rx,
		)
	}

	pub fn send(&self, event: BackendEvent) {
		if self.ended.load(Ordering::SeqCst) {
			debug!(target: "stepwire.events", ?event, "dropping event after end");
			return;
		}
		if event.is_end() && self.ended.swap(true, Ordering::SeqCst) {
			return;
		}
		if self.tx.send(event).is_err() {
			debug!(target: "stepwire.events", "event receiver dropped");
		}
	}

	/// Raises the terminal `End` event (once).
	pub fn end(&self) {
		self.send(BackendEvent::End);
	}

	pub fn has_ended(&self) -> bool {
		self.ended.load(Ordering::SeqCst)
	}
}

/// Converts a raw call outcome into the backend contract.
///
/// Backend-reported errors become `{"error": message}` so reply decoders see
/// them as data; everything else ends the session.
pub(crate) fn settle(command: &str, outcome: Result<Value>, events: &EventSender) -> Value {
	match outcome {
		Ok(value) => value,
		Err(Error::Remote { name, message }) => {
			debug!(target: "stepwire.backend", command, name = %name, message = %message, "backend reported error");
			json!({ "error": message })
		}
		Err(err) => {
			warn!(
				target: "stepwire.backend",
				command,
				error = %err,
				timed_out = err.is_timeout(),
				"backend call failed, ending session"
			);
			events.end();
			Value::Null
		}
	}
}
