//! One debug session per client connection.
//!
//! Two tasks share the connection: a reader that queues requests (and
//! signals `configurationDone`/`disconnect` to the session right away) and a
//! writer that numbers and frames every outgoing message. Requests are
//! serviced one at a time in arrival order. Session notifications raised
//! while servicing a request are written after its response.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use stepwire::{EventStream, Session, SessionError, SessionEvent, SessionHandle, SessionOptions, StopReason, THREAD_ID};
use stepwire_protocol::dap::{
	Breakpoint, BreakpointEventBody, BreakpointLocationsArguments, BreakpointLocationsResponseBody, ContinueResponseBody,
	ErrorResponseBody, Event, InitializeArguments, LaunchArguments, Message, OutputEventBody, ProtocolMessage, Request,
	Response, ScopesArguments, ScopesResponseBody, SetBreakpointsArguments, SetBreakpointsResponseBody,
	SetVariableArguments, StackTraceArguments, StoppedEventBody, ThreadsResponseBody, VariablesArguments,
	VariablesResponseBody,
};
use stepwire_runtime::{Backend, BackendEvents};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::codec;
use crate::error::Result;

/// Error ids reported in `body.error.id`.
mod error_id {
	pub const ARGUMENTS: i64 = 1001;
	pub const UNSUPPORTED: i64 = 1002;
	pub const LAUNCH: i64 = 1003;
	pub const SOURCE: i64 = 1004;
	pub const STATE: i64 = 1005;
	pub const BACKEND: i64 = 1006;
}

/// Serves one client until it disconnects or closes the stream.
///
/// The backend belongs to this session and is closed when it ends.
pub async fn serve<R, W>(
	reader: R,
	writer: W,
	backend: Arc<dyn Backend>,
	events: BackendEvents,
	options: SessionOptions,
) -> Result<()>
where
	R: AsyncRead + Unpin + Send + 'static,
	W: AsyncWrite + Unpin + Send + 'static,
{
	let (session, session_events) = Session::new(backend, events, options);
	let handle = session.handle();

	let (out_tx, out_rx) = mpsc::unbounded_channel();
	let writer_task = tokio::spawn(write_loop(writer, out_rx));

	let (queue_tx, queue_rx) = mpsc::unbounded_channel();
	let reader_task = tokio::spawn(read_loop(reader, queue_tx.clone(), handle.clone()));

	let mut server = Server {
		session,
		events: session_events,
		out: out_tx,
		queue_tx,
		queue: queue_rx,
	};
	server.run().await;
	handle.terminate();

	reader_task.abort();
	drop(server);
	match writer_task.await {
		Ok(result) => result,
		Err(e) => {
			warn!(target: "stepwire.dap", error = %e, "writer task failed");
			Ok(())
		}
	}
}

enum Queued {
	Request(Request),
	/// Run a program launched without an entry stop.
	Resume,
	/// The client stream is gone.
	Closed,
}

enum Wake {
	Queued(Option<Queued>),
	Backend(stepwire_protocol::BackendEvent),
}

/// Work left after a response has gone out.
enum Then {
	Nothing,
	Initialized,
	Resume,
	Next,
	Continue,
	Exit,
}

#[derive(Debug)]
struct Failure {
	id: i64,
	message: String,
	show_user: bool,
}

impl Failure {
	fn new(id: i64, message: impl Into<String>) -> Self {
		Self {
			id,
			message: message.into(),
			show_user: false,
		}
	}
}

impl From<SessionError> for Failure {
	fn from(err: SessionError) -> Self {
		let id = match &err {
			SessionError::Launch(_) => error_id::LAUNCH,
			SessionError::SourceRead { .. } => error_id::SOURCE,
			SessionError::Arguments(_) => error_id::ARGUMENTS,
			SessionError::InvalidState(_) => error_id::STATE,
			SessionError::BackendUnavailable => error_id::BACKEND,
		};
		Self {
			id,
			message: err.to_string(),
			show_user: err.is_user_visible(),
		}
	}
}

struct Server {
	session: Session,
	events: EventStream,
	out: mpsc::UnboundedSender<ProtocolMessage>,
	queue_tx: mpsc::UnboundedSender<Queued>,
	queue: mpsc::UnboundedReceiver<Queued>,
}

impl Server {
	async fn run(&mut self) {
		loop {
			let wake = tokio::select! {
				queued = self.queue.recv() => Wake::Queued(queued),
				Some(event) = self.session.next_backend_event(), if !self.session.is_terminated() => Wake::Backend(event),
			};

			match wake {
				Wake::Backend(event) => {
					self.session.handle_backend_event(event);
					self.flush_events();
				}
				Wake::Queued(None | Some(Queued::Closed)) => {
					info!(target: "stepwire.dap", "client closed the connection");
					self.session.disconnect();
					self.flush_events();
					return;
				}
				Wake::Queued(Some(Queued::Resume)) => {
					if let Some(outcome) = self.session.resume().await {
						debug!(target: "stepwire.dap", ?outcome, "initial run finished");
					}
					self.flush_events();
				}
				Wake::Queued(Some(Queued::Request(request))) => {
					if matches!(self.handle_request(request).await, Then::Exit) {
						return;
					}
				}
			}
		}
	}

	/// Writes every session notification raised so far.
	fn flush_events(&mut self) {
		while let Ok(event) = self.events.try_recv() {
			self.send(event_message(event));
		}
	}

	async fn handle_request(&mut self, request: Request) -> Then {
		let Request { seq, command, arguments } = request;
		debug!(target: "stepwire.dap", seq, command = %command, "request");

		let then = match self.execute(&command, arguments).await {
			Ok((body, then)) => {
				self.send(ProtocolMessage::Response(Response {
					seq: 0,
					request_seq: seq,
					success: true,
					command,
					message: None,
					body,
				}));
				then
			}
			Err(failure) => {
				debug!(target: "stepwire.dap", seq, command = %command, error = %failure.message, "request failed");
				self.send(error_response(seq, command, failure));
				Then::Nothing
			}
		};
		self.flush_events();

		match then {
			Then::Nothing | Then::Exit => {}
			Then::Initialized => self.send_event("initialized", Value::Null),
			Then::Resume => {
				if self.queue_tx.send(Queued::Resume).is_err() {
					debug!(target: "stepwire.dap", "request queue closed before resume");
				}
			}
			Then::Next => {
				if let Err(e) = self.session.next().await {
					warn!(target: "stepwire.dap", error = %e, "next failed");
				}
			}
			Then::Continue => {
				if let Err(e) = self.session.continue_execution().await {
					warn!(target: "stepwire.dap", error = %e, "continue failed");
				}
			}
		}
		self.flush_events();
		then
	}

	async fn execute(&mut self, command: &str, arguments: Value) -> std::result::Result<(Value, Then), Failure> {
		let session = &mut self.session;
		let reply = match command {
			"initialize" => {
				let args: InitializeArguments = parse_arguments(command, arguments)?;
				(body(session.initialize(&args)), Then::Initialized)
			}
			"configurationDone" => {
				session.configuration_done();
				(Value::Null, Then::Nothing)
			}
			"launch" => {
				let args: LaunchArguments = parse_arguments(command, arguments)?;
				session.launch(&args).await?;
				let then = if session.has_pending_run() {
					Then::Resume
				} else {
					Then::Nothing
				};
				(Value::Null, then)
			}
			"disconnect" => {
				session.disconnect();
				(Value::Null, Then::Exit)
			}
			"setBreakpoints" => {
				let args: SetBreakpointsArguments = parse_arguments(command, arguments)?;
				let breakpoints = session.set_breakpoints(&args).await;
				(body(SetBreakpointsResponseBody { breakpoints }), Then::Nothing)
			}
			"breakpointLocations" => {
				let args: BreakpointLocationsArguments = parse_arguments(command, arguments)?;
				let breakpoints = session.breakpoint_locations(&args).await;
				(body(BreakpointLocationsResponseBody { breakpoints }), Then::Nothing)
			}
			"threads" => (
				body(ThreadsResponseBody {
					threads: session.threads(),
				}),
				Then::Nothing,
			),
			"stackTrace" => {
				let args: StackTraceArguments = parse_arguments(command, arguments)?;
				(body(session.stack_trace(&args).await), Then::Nothing)
			}
			"scopes" => {
				let _args: ScopesArguments = parse_arguments(command, arguments)?;
				(body(ScopesResponseBody { scopes: session.scopes() }), Then::Nothing)
			}
			"variables" => {
				let args: VariablesArguments = parse_arguments(command, arguments)?;
				let variables = session.variables(&args).await;
				(body(VariablesResponseBody { variables }), Then::Nothing)
			}
			"setVariable" => {
				let args: SetVariableArguments = parse_arguments(command, arguments)?;
				(body(session.set_variable(&args)), Then::Nothing)
			}
			"continue" => {
				ensure_launched(session)?;
				(
					body(ContinueResponseBody {
						all_threads_continued: true,
					}),
					Then::Continue,
				)
			}
			"next" => {
				ensure_launched(session)?;
				(Value::Null, Then::Next)
			}
			other => {
				return Err(Failure::new(error_id::UNSUPPORTED, format!("unsupported request: {other}")));
			}
		};
		Ok(reply)
	}

	fn send(&self, message: ProtocolMessage) {
		if self.out.send(message).is_err() {
			debug!(target: "stepwire.dap", "writer gone, dropping message");
		}
	}

	fn send_event(&self, event: &str, body: Value) {
		self.send(ProtocolMessage::Event(Event {
			seq: 0,
			event: event.to_string(),
			body,
		}));
	}
}

/// Stepping is refused before launch; after termination it is a harmless no-op.
fn ensure_launched(session: &Session) -> std::result::Result<(), Failure> {
	if session.program_path().is_none() && !session.is_terminated() {
		return Err(SessionError::InvalidState("no program launched").into());
	}
	Ok(())
}

fn parse_arguments<T: DeserializeOwned>(command: &str, arguments: Value) -> std::result::Result<T, Failure> {
	let arguments = if arguments.is_null() { json!({}) } else { arguments };
	serde_json::from_value(arguments)
		.map_err(|e| Failure::new(error_id::ARGUMENTS, format!("invalid arguments for {command}: {e}")))
}

fn body<T: Serialize>(value: T) -> Value {
	serde_json::to_value(value).unwrap_or_else(|e| {
		warn!(target: "stepwire.dap", error = %e, "unserializable response body");
		Value::Null
	})
}

fn error_response(request_seq: i64, command: String, failure: Failure) -> ProtocolMessage {
	ProtocolMessage::Response(Response {
		seq: 0,
		request_seq,
		success: false,
		command,
		message: Some(failure.message.clone()),
		body: body(ErrorResponseBody {
			error: Message {
				id: failure.id,
				format: failure.message,
				show_user: failure.show_user,
			},
		}),
	})
}

/// DAP form of a session notification.
fn event_message(event: SessionEvent) -> ProtocolMessage {
	let (name, event_body) = match event {
		SessionEvent::Stopped { reason } => {
			let (description, text) = match &reason {
				StopReason::Exception(detail) => (Some("Paused on exception".to_string()), detail.clone()),
				_ => (None, None),
			};
			(
				"stopped",
				body(StoppedEventBody {
					reason: reason.as_str().to_string(),
					description,
					thread_id: THREAD_ID,
					text,
					all_threads_stopped: true,
				}),
			)
		}
		SessionEvent::BreakpointChanged { id, verified } => (
			"breakpoint",
			body(BreakpointEventBody {
				reason: "changed".to_string(),
				breakpoint: Breakpoint {
					id: Some(id),
					verified,
					message: None,
					source: None,
					line: None,
				},
			}),
		),
		SessionEvent::Output {
			text,
			source,
			line,
			column,
		} => (
			"output",
			body(OutputEventBody {
				category: "stdout".to_string(),
				output: text,
				source,
				line: Some(line),
				column: Some(column),
			}),
		),
		SessionEvent::Terminated => ("terminated", Value::Null),
	};
	ProtocolMessage::Event(Event {
		seq: 0,
		event: name.to_string(),
		body: event_body,
	})
}

async fn read_loop<R>(reader: R, queue: mpsc::UnboundedSender<Queued>, handle: SessionHandle)
where
	R: AsyncRead + Unpin,
{
	let mut reader = BufReader::new(reader);
	loop {
		let message = match codec::read_message(&mut reader).await {
			Ok(Some(message)) => message,
			Ok(None) => break,
			Err(e) => {
				warn!(target: "stepwire.dap", error = %e, "unreadable client stream");
				break;
			}
		};

		let request = match serde_json::from_slice::<ProtocolMessage>(&message) {
			Ok(ProtocolMessage::Request(request)) => request,
			Ok(_) => {
				debug!(target: "stepwire.dap", "ignoring non-request message from client");
				continue;
			}
			Err(e) => {
				warn!(target: "stepwire.dap", error = %e, "malformed client message");
				continue;
			}
		};

		// Seen by a launch or continue in progress, not only when dequeued.
		match request.command.as_str() {
			"configurationDone" => handle.configuration_done(),
			"disconnect" => handle.terminate(),
			_ => {}
		}

		if queue.send(Queued::Request(request)).is_err() {
			return;
		}
	}

	handle.terminate();
	let _ = queue.send(Queued::Closed);
}

async fn write_loop<W>(mut writer: W, mut messages: mpsc::UnboundedReceiver<ProtocolMessage>) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let mut seq = 0;
	while let Some(mut message) = messages.recv().await {
		seq += 1;
		match &mut message {
			ProtocolMessage::Request(m) => m.seq = seq,
			ProtocolMessage::Response(m) => m.seq = seq,
			ProtocolMessage::Event(m) => m.seq = seq,
		}
		let bytes = serde_json::to_vec(&message)?;
		trace!(target: "stepwire.dap", seq, len = bytes.len(), "send");
		codec::write_message(&mut writer, &bytes).await?;
	}
	Ok(())
}
