//! Request-per-call backend over HTTP.
//!
//! Every command is an independent `POST {base_url}/{command}` whose body is
//! the key-normalized argument object. The response body is the result. A
//! result may embed an `events` array; those notifications are forwarded in
//! order before the call resolves, so a `stopOnEntry` raised during `start`
//! is observed ahead of the start reply, as on the stream transport.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use stepwire_protocol::keys;
use stepwire_protocol::{BackendEvent, Command, RawEvent};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::backend::{Backend, BackendEvents, CallFuture, EventSender, settle};
use crate::connection::ConnectionOptions;
use crate::error::{Error, Result};

/// Key under which a result carries piggybacked notifications.
const EVENTS_KEY: &str = "events";

/// HTTP implementation of [`Backend`].
pub struct HttpBackend {
	client: reqwest::Client,
	base_url: String,
	options: ConnectionOptions,
	events: EventSender,
	shutdown: watch::Sender<bool>,
	closed: AtomicBool,
}

impl HttpBackend {
	/// Builds a client for `base_url` (for example `http://127.0.0.1:5005/api`).
	pub fn new(base_url: impl Into<String>, options: ConnectionOptions) -> Result<(Self, BackendEvents)> {
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = options.request_timeout {
			builder = builder.timeout(timeout);
		}
		let client = builder.build()?;

		let base_url = base_url.into().trim_end_matches('/').to_string();
		let (events, event_rx) = EventSender::channel();
		let (shutdown, _) = watch::channel(false);

		debug!(target: "stepwire.http", %base_url, "http backend ready");
		Ok((
			Self {
				client,
				base_url,
				options,
				events,
				shutdown,
				closed: AtomicBool::new(false),
			},
			event_rx,
		))
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	/// Posts one command and returns its result with piggybacked events stripped.
	pub async fn post(&self, command: &str, args: Value) -> Result<Value> {
		let url = format!("{}/{}", self.base_url, command);
		let body = keys::normalize(args, self.options.key_case);
		trace!(target: "stepwire.http", %url, %body, "request");

		let response = self.client.post(&url).json(&body).send().await?.error_for_status()?;
		let bytes = response.bytes().await?;

		let result = if bytes.iter().all(u8::is_ascii_whitespace) {
			json!({})
		} else {
			let value: Value = serde_json::from_slice(&bytes)
				.map_err(|e| Error::ProtocolError(format!("Malformed reply to {command}: {e}")))?;
			keys::to_camel(value)
		};
		trace!(target: "stepwire.http", %result, "reply");

		Ok(self.forward_events(result))
	}

	fn forward_events(&self, mut result: Value) -> Value {
		let Some(Value::Array(raw_events)) = result.as_object_mut().and_then(|obj| obj.remove(EVENTS_KEY)) else {
			return result;
		};
		for raw in raw_events {
			match serde_json::from_value::<RawEvent>(raw) {
				Ok(raw) => self.events.send(BackendEvent::from_raw(raw)),
				Err(e) => debug!(target: "stepwire.http", error = %e, "skipping malformed piggybacked event"),
			}
		}
		result
	}
}

impl Backend for HttpBackend {
	fn call(&self, command: Command) -> CallFuture<'_> {
		Box::pin(async move {
			let mut shutdown = self.shutdown.subscribe();
			let outcome = if self.closed.load(Ordering::SeqCst) {
				Err(Error::ChannelClosed)
			} else {
				tokio::select! {
					result = self.post(command.name(), command.args()) => result,
					_ = shutdown.changed() => Err(Error::ChannelClosed),
				}
			};
			settle(command.name(), outcome, &self.events)
		})
	}

	fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		debug!(target: "stepwire.http", "closing http backend");
		self.shutdown.send_replace(true);
		self.events.end();
	}
}
