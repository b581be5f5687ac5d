//! Command correlation over a stream transport.
//!
//! This module implements the request/response correlation layer on top of
//! the transport. It handles:
//! - Generating unique correlation ids
//! - Correlating replies with pending calls
//! - Distinguishing unsolicited events from replies
//! - Forwarding events to the session in arrival order
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send_message`] with a command name and args
//! 2. Connection allocates the next id and parks a oneshot sender under it
//! 3. The envelope is key-normalized and queued for the writer task
//! 4. Caller awaits the oneshot receiver (optionally under a deadline)
//! 5. The dispatch loop receives a reply, claims the pending entry by id
//! 6. The result is sent through the oneshot; the caller resumes
//!
//! Anything without an id goes to the event channel instead.

#[cfg(test)]
mod tests;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use stepwire_protocol::keys::{self, KeyCase};
use stepwire_protocol::{BackendEvent, Command, Envelope, Inbound, Reply, ReplyError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, error, trace, warn};

use crate::backend::{Backend, BackendEvents, CallFuture, EventSender, settle};
use crate::error::{Error, Result};
use crate::transport::{StreamTransport, TransportParts};

/// Default deadline for a single call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables shared by both backend transports.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
	/// Casing applied to outgoing payload keys.
	pub key_case: KeyCase,
	/// Deadline for each call; `None` waits until the transport closes.
	pub request_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
	fn default() -> Self {
		Self {
			key_case: KeyCase::default(),
			request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
		}
	}
}

/// Pending calls keyed by correlation id.
type PendingCalls = Arc<DashMap<u64, oneshot::Sender<Result<Value>>>>;

/// RAII guard removing the pending entry when the awaiting future is dropped early.
struct CancelGuard {
	id: u64,
	pending: PendingCalls,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u64, pending: PendingCalls) -> Self {
		Self {
			id,
			pending,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.pending.remove(&self.id).is_some() {
			debug!(target: "stepwire.connection", id = self.id, "removed abandoned pending call");
		}
	}
}

/// Future returned by [`Connection::send_message`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Correlating connection to a stream backend.
pub struct Connection {
	/// Sequential correlation id counter
	last_id: AtomicU64,
	/// Pending calls keyed by correlation id
	pending: PendingCalls,
	/// Channel for sending outbound messages to the writer task
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Transport halves and queues, taken once by `run()`
	parts: Mutex<Option<(TransportParts, mpsc::UnboundedReceiver<Value>)>>,
	events: EventSender,
	options: ConnectionOptions,
	closed: AtomicBool,
	/// Tasks torn down by `close()`
	tasks: Mutex<Vec<AbortHandle>>,
}

impl Connection {
	/// Creates a connection over `parts`; call [`Connection::run`] to start it.
	pub fn new(parts: TransportParts, options: ConnectionOptions) -> (Self, BackendEvents) {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (events, event_rx) = EventSender::channel();

		let connection = Self {
			last_id: AtomicU64::new(0),
			pending: Arc::new(DashMap::new()),
			outbound_tx,
			parts: Mutex::new(Some((parts, outbound_rx))),
			events,
			options,
			closed: AtomicBool::new(false),
			tasks: Mutex::new(Vec::new()),
		};
		(connection, event_rx)
	}

	/// Creates a connection and spawns its dispatch loop.
	pub fn spawn(parts: TransportParts, options: ConnectionOptions) -> (Arc<Self>, BackendEvents) {
		let (connection, events) = Self::new(parts, options);
		let connection = Arc::new(connection);
		let runner = Arc::clone(&connection);
		let handle = tokio::spawn(async move { runner.run().await });
		connection.tasks.lock().push(handle.abort_handle());
		(connection, events)
	}

	/// Connects over TCP and spawns the dispatch loop.
	pub async fn connect_tcp(addr: &str, options: ConnectionOptions) -> Result<(Arc<Self>, BackendEvents)> {
		let parts = StreamTransport::connect(addr).await?;
		Ok(Self::spawn(parts, options))
	}

	/// Sends a command and awaits the correlated reply.
	///
	/// # Errors
	///
	/// [`Error::Remote`] when the backend answered with an error,
	/// [`Error::Timeout`] past the deadline, [`Error::ChannelClosed`] when the
	/// connection is or becomes closed.
	pub async fn send_message(&self, command: &str, args: Value) -> Result<Value> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		debug!(target: "stepwire.connection", id, command, "sending command");

		let (tx, rx) = oneshot::channel();
		self.pending.insert(id, tx);
		let guard = CancelGuard::new(id, Arc::clone(&self.pending));

		// A concurrent close may have drained the table before our insert.
		if self.closed.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}

		let envelope = Envelope { id, command, args };
		let message = keys::normalize(serde_json::to_value(&envelope)?, self.options.key_case);
		trace!(target: "stepwire.connection", %message, "request json");

		if self.outbound_tx.send(message).is_err() {
			error!(target: "stepwire.connection", "failed to queue command: outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		let response = ResponseFuture { rx, guard };
		match self.options.request_timeout {
			Some(limit) => tokio::time::timeout(limit, response)
				.await
				.map_err(|_| Error::Timeout(format!("{command} (id={id}) after {}ms", limit.as_millis())))?,
			None => response.await,
		}
	}

	/// Runs the dispatch loop until the transport closes.
	///
	/// Spawns the transport reader and writer, routes every inbound message,
	/// then fails outstanding calls and raises `End`.
	pub async fn run(self: &Arc<Self>) {
		let Some((parts, mut outbound_rx)) = self.parts.lock().take() else {
			warn!(target: "stepwire.connection", "run() called twice, ignoring");
			return;
		};
		let TransportParts {
			mut sender,
			receiver,
			mut message_rx,
		} = parts;

		let reader_handle = tokio::spawn(receiver.run());

		let writer_handle = tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(e) = sender.send(message).await {
					error!(target: "stepwire.connection", error = %e, "transport write error");
					break;
				}
			}
		});
		self.tasks
			.lock()
			.extend([reader_handle.abort_handle(), writer_handle.abort_handle()]);

		while let Some(value) = message_rx.recv().await {
			match serde_json::from_value::<Inbound>(keys::to_camel(value)) {
				Ok(message) => self.dispatch(message),
				Err(e) => error!(target: "stepwire.connection", error = %e, "failed to classify message"),
			}
		}

		match reader_handle.await {
			Ok(Ok(())) => debug!(target: "stepwire.connection", "transport closed"),
			Ok(Err(e)) => error!(target: "stepwire.connection", error = %e, "transport read error"),
			Err(e) => error!(target: "stepwire.connection", error = %e, "transport reader task failed"),
		}
		writer_handle.abort();
		self.shutdown();
	}

	fn dispatch(&self, message: Inbound) {
		match message {
			Inbound::Reply(reply) => self.resolve(reply),
			Inbound::Event(raw) => {
				let event = BackendEvent::from_raw(raw);
				trace!(target: "stepwire.connection", ?event, "event");
				self.events.send(event);
			}
			Inbound::Unknown(value) => {
				debug!(target: "stepwire.connection", %value, "unknown message shape (ignored)");
			}
		}
	}

	fn resolve(&self, reply: Reply) {
		let Reply { id, result, error } = reply;
		let Some((_, callback)) = self.pending.remove(&id) else {
			debug!(target: "stepwire.connection", id, "reply for unknown or abandoned call");
			return;
		};

		let result = match error {
			Some(err) => Err(Error::Remote {
				name: match &err {
					ReplyError::Detailed { name: Some(name), .. } => name.clone(),
					_ => "Error".to_string(),
				},
				message: err.message().to_string(),
			}),
			None => Ok(result.unwrap_or(Value::Null)),
		};
		let _ = callback.send(result);
	}

	/// Marks the connection closed, fails every pending call, raises `End`.
	fn shutdown(&self) {
		self.closed.store(true, Ordering::SeqCst);
		let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
		for id in ids {
			if let Some((_, callback)) = self.pending.remove(&id) {
				let _ = callback.send(Err(Error::ChannelClosed));
			}
		}
		self.events.end();
	}

	/// Number of calls awaiting a reply.
	pub fn pending_calls(&self) -> usize {
		self.pending.len()
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

impl Backend for Connection {
	fn call(&self, command: Command) -> CallFuture<'_> {
		Box::pin(async move {
			let outcome = self.send_message(command.name(), command.args()).await;
			settle(command.name(), outcome, &self.events)
		})
	}

	fn close(&self) {
		debug!(target: "stepwire.connection", "closing connection");
		self.shutdown();
		for handle in self.tasks.lock().drain(..) {
			handle.abort();
		}
	}
}
