//! The session engine.
//!
//! A [`Session`] services one client operation at a time. Each operation
//! maps onto backend calls through the breakpoint manager or the runner;
//! notifications the backend raised meanwhile are drained right after the
//! call resolves, so an entry stop raised during `start` is emitted before
//! `launch` returns. Notifications arriving between operations are fed in
//! through [`Session::handle_backend_event`].
//!
//! Out-of-band signals (configuration finished, disconnect) go through a
//! cloneable [`SessionHandle`], which works while an operation is in flight.

mod pump;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stepwire_protocol::dap::{
	Breakpoint, BreakpointLocation, BreakpointLocationsArguments, Capabilities, InitializeArguments, LaunchArguments,
	Scope, SetBreakpointsArguments, SetVariableArguments, SetVariableResponseBody, Source, StackFrame,
	StackTraceArguments, StackTraceResponseBody, Thread, Variable, VariablesArguments,
};
use stepwire_protocol::{BackendEvent, Command, FramesReply, VariablesReply};
use stepwire_runtime::{Backend, BackendEvents};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use self::pump::{Drained, EventPump, Notifier};
use crate::breakpoints::{BreakpointManager, BreakpointRecord};
use crate::config::SessionOptions;
use crate::coords::{Coordinates, resolve_source};
use crate::error::{Result, SessionError};
use crate::events::{EventStream, StopReason, event_channel};
use crate::runner::{ContinueOutcome, RunState, Runner, StartError, StepOutcome};
use crate::source::{FsSourceReader, SourceReader};
use crate::trace::TracedBackend;

/// The only thread the adapter reports.
pub const THREAD_ID: i64 = 1;

/// Variables reference of the single top-level scope.
pub const LOCALS_REFERENCE: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Uninitialized,
	Configuring,
	Running,
	Stopped,
	Terminated,
}

struct Signals {
	configured: watch::Sender<bool>,
	terminate: watch::Sender<bool>,
}

/// Out-of-band control of a [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
	signals: Arc<Signals>,
	backend: Arc<dyn Backend>,
}

impl SessionHandle {
	/// Releases a launch waiting for configuration.
	pub fn configuration_done(&self) {
		self.signals.configured.send_replace(true);
	}

	/// Stops any continue loop and fails in-flight backend calls.
	pub fn terminate(&self) {
		if !self.signals.terminate.send_replace(true) {
			debug!(target: "stepwire.session", "terminate requested");
			self.backend.close();
		}
	}

	pub fn is_terminating(&self) -> bool {
		*self.signals.terminate.borrow()
	}
}

struct Program {
	path: PathBuf,
	/// Present only when the text was read locally.
	text: Option<String>,
}

pub struct Session {
	backend: Arc<dyn Backend>,
	trace: Arc<AtomicBool>,
	reader: Arc<dyn SourceReader>,
	options: SessionOptions,
	state: SessionState,
	program: Option<Program>,
	breakpoints: BreakpointManager,
	runner: Runner,
	pump: EventPump,
	signals: Arc<Signals>,
	/// Launch without entry stop: run once queued requests are through.
	run_pending: bool,
}

impl Session {
	/// Creates a session over `backend` and the stream of its notifications.
	///
	/// Returns the session and the stream of outward events.
	pub fn new(backend: Arc<dyn Backend>, events: BackendEvents, options: SessionOptions) -> (Self, EventStream) {
		let traced = TracedBackend::new(backend);
		let trace = traced.switch();
		let backend: Arc<dyn Backend> = Arc::new(traced);

		let (configured, _) = watch::channel(false);
		let (terminate, _) = watch::channel(false);
		let signals = Arc::new(Signals { configured, terminate });

		let coords = Coordinates {
			backend_line_base: options.backend_line_base,
			backend_column_base: options.backend_column_base,
			..Coordinates::default()
		};
		let (sink, stream) = event_channel();
		let notifier = Notifier::new(sink, coords, signals.terminate.subscribe());

		let session = Self {
			breakpoints: BreakpointManager::new(Arc::clone(&backend)),
			runner: Runner::new(Arc::clone(&backend)),
			pump: EventPump::new(events, notifier),
			backend,
			trace,
			reader: Arc::new(FsSourceReader),
			options,
			state: SessionState::Uninitialized,
			program: None,
			signals,
			run_pending: false,
		};
		(session, stream)
	}

	/// Replaces the filesystem reader.
	pub fn with_reader(mut self, reader: Arc<dyn SourceReader>) -> Self {
		self.reader = reader;
		self
	}

	pub fn handle(&self) -> SessionHandle {
		SessionHandle {
			signals: Arc::clone(&self.signals),
			backend: Arc::clone(&self.backend),
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn is_terminated(&self) -> bool {
		self.state == SessionState::Terminated
	}

	pub fn coordinates(&self) -> Coordinates {
		self.pump.notifier.coords
	}

	/// Path of the launched program.
	pub fn program_path(&self) -> Option<&Path> {
		self.program.as_ref().map(|p| p.path.as_path())
	}

	/// Locally cached program text, when it was read.
	pub fn program_text(&self) -> Option<&str> {
		self.program.as_ref().and_then(|p| p.text.as_deref())
	}

	// ------------------------------------------------------------------------
	// Lifecycle

	pub fn initialize(&mut self, args: &InitializeArguments) -> Capabilities {
		self.pump.notifier.coords = self.pump.notifier.coords.with_client(args);
		if self.state == SessionState::Uninitialized {
			self.state = SessionState::Configuring;
		}
		debug!(
			target: "stepwire.session",
			client = args.client_id.as_deref().unwrap_or("unknown"),
			coords = ?self.pump.notifier.coords,
			"initialized"
		);
		Capabilities {
			supports_configuration_done_request: true,
			supports_breakpoint_locations_request: true,
			supports_set_variable: true,
		}
	}

	pub fn configuration_done(&self) {
		self.handle().configuration_done();
	}

	/// Loads and starts the program.
	///
	/// Waits for configuration (bounded), reads the program text if
	/// configured to, then loads and starts it in the backend. With
	/// `stop_on_entry` the entry stop is emitted before this returns;
	/// otherwise the program runs on the next [`Session::resume`].
	///
	/// # Errors
	///
	/// Backend rejection and unreadable programs are user-visible; either
	/// way the session is terminated afterwards.
	pub async fn launch(&mut self, args: &LaunchArguments) -> Result<()> {
		if self.program.is_some() {
			return Err(SessionError::InvalidState("a program is already launched"));
		}
		if self.is_terminated() {
			return Err(SessionError::InvalidState("session has terminated"));
		}

		self.trace.store(args.trace, Ordering::Relaxed);
		let path = program_path(&args.program)?;
		info!(target: "stepwire.session", program = %path.display(), stop_on_entry = args.stop_on_entry, "launching");

		let text = if self.options.send_source_text {
			match self.reader.read(&path).await {
				Ok(text) => Some(text),
				Err(source) => {
					self.terminate();
					return Err(SessionError::SourceRead { path, source });
				}
			}
		} else {
			None
		};

		if !self.wait_for_configuration().await {
			self.terminate();
			return Err(SessionError::InvalidState("disconnected during launch"));
		}

		let path_text = path.to_string_lossy().into_owned();
		match self.runner.start(&path_text, text.clone(), args.stop_on_entry).await {
			Ok(()) => {}
			Err(StartError::Rejected(message)) => {
				warn!(target: "stepwire.session", %message, "backend rejected program");
				self.terminate();
				return Err(SessionError::Launch(message));
			}
			Err(StartError::Lost) => {
				self.terminate();
				return Err(SessionError::BackendUnavailable);
			}
		}

		self.program = Some(Program { path, text });
		self.pump.notifier.program = Some(path_text);

		let mut drained = self.pump.drain();
		self.apply_deferred_breakpoints(&mut drained).await;

		if drained.ended {
			self.terminate();
		} else if args.stop_on_entry {
			self.stop(drained.stop.unwrap_or(StopReason::Entry));
		} else if let Some(reason) = drained.stop {
			self.stop(reason);
		} else {
			self.state = SessionState::Running;
			self.run_pending = true;
		}
		Ok(())
	}

	/// Returns `false` if the session was told to terminate while waiting.
	async fn wait_for_configuration(&self) -> bool {
		let mut configured = self.signals.configured.subscribe();
		let mut terminate = self.signals.terminate.subscribe();
		let limit = self.options.configuration_timeout;

		let configured = async move { configured.wait_for(|done| *done).await.is_ok() };
		let terminated = async move { terminate.wait_for(|flag| *flag).await.is_ok() };

		tokio::select! {
			result = tokio::time::timeout(limit, configured) => {
				if result.is_err() {
					warn!(
						target: "stepwire.session",
						timeout_ms = limit.as_millis() as u64,
						"configurationDone not received, launching anyway"
					);
				}
				true
			}
			true = terminated => false,
		}
	}

	async fn apply_deferred_breakpoints(&mut self, drained: &mut Drained) {
		for record in self.breakpoints.apply_deferred().await {
			self.pump.notifier.breakpoint_changed(record.id, record.verified);
		}
		let late = self.pump.drain();
		drained.ended |= late.ended;
		if late.stop.is_some() {
			drained.stop = late.stop;
		}
		self.apply_validations();
	}

	/// Runs a program launched without an entry stop. No-op otherwise.
	pub async fn resume(&mut self) -> Option<ContinueOutcome> {
		if !std::mem::take(&mut self.run_pending) {
			return None;
		}
		self.continue_execution().await.ok()
	}

	pub fn has_pending_run(&self) -> bool {
		self.run_pending
	}

	/// Ends the session on the client's request. Never fails.
	pub fn disconnect(&mut self) {
		info!(target: "stepwire.session", "disconnect");
		self.handle().terminate();
		self.pump.notifier.silence();
		self.runner.terminate();
		self.state = SessionState::Terminated;
		self.run_pending = false;
		self.program = None;
	}

	// ------------------------------------------------------------------------
	// Execution

	/// Steps once and emits exactly one of `stopped` or `terminated`.
	///
	/// After termination this is a no-op reporting `Ended`.
	pub async fn next(&mut self) -> Result<StepOutcome> {
		if self.is_terminated() {
			debug!(target: "stepwire.session", "next after termination ignored");
			return Ok(StepOutcome::Ended);
		}
		if self.program.is_none() {
			return Err(SessionError::InvalidState("no program launched"));
		}

		self.run_pending = false;
		self.state = SessionState::Running;
		let raw = self.runner.step().await;
		let outcome = self.pump.merge(raw);
		self.runner.record(&outcome);
		self.apply_validations();

		match &outcome {
			StepOutcome::Stopped(reason) => self.stop(reason.clone()),
			StepOutcome::Ended => self.terminate(),
		}
		Ok(outcome)
	}

	/// Steps until the program ends or stops for a reason other than a plain step.
	pub async fn continue_execution(&mut self) -> Result<ContinueOutcome> {
		if self.is_terminated() {
			debug!(target: "stepwire.session", "continue after termination ignored");
			return Ok(ContinueOutcome::Ended);
		}
		if self.program.is_none() {
			return Err(SessionError::InvalidState("no program launched"));
		}

		self.run_pending = false;
		self.state = SessionState::Running;
		let mut cancel = self.signals.terminate.subscribe();
		let pump = &mut self.pump;
		let outcome = self.runner.continue_until(&mut cancel, |raw| pump.merge(raw)).await;
		self.apply_validations();
		debug!(target: "stepwire.session", ?outcome, steps = self.runner.steps(), "continue finished");

		match &outcome {
			ContinueOutcome::Stopped(reason) => self.stop(reason.clone()),
			ContinueOutcome::Ended => self.terminate(),
			ContinueOutcome::Interrupted => {
				self.runner.terminate();
				self.state = SessionState::Terminated;
			}
		}
		Ok(outcome)
	}

	// ------------------------------------------------------------------------
	// Breakpoints

	/// Replaces the breakpoints of `args.source`.
	///
	/// Before launch the lines are remembered and reported unverified; they
	/// are registered right after the program loads.
	pub async fn set_breakpoints(&mut self, args: &SetBreakpointsArguments) -> Vec<Breakpoint> {
		let coords = self.coordinates();
		let lines: Vec<u32> = args
			.requested_lines()
			.into_iter()
			.map(|line| coords.line_from_client(line))
			.collect();

		let target = match &self.program {
			_ if self.is_terminated() => Target::Ended,
			None => Target::Deferred,
			Some(program) if !same_source(&program.path, &args.source) => Target::Foreign,
			Some(_) => Target::Loaded,
		};

		let (records, message) = match target {
			Target::Ended => (unverified(&lines), Some("Session has ended")),
			Target::Deferred => (
				self.breakpoints.defer(&lines),
				Some("Breakpoint will be set when the program launches"),
			),
			Target::Foreign => (unverified(&lines), Some("Source is not the launched program")),
			Target::Loaded => {
				let records = self.breakpoints.set_all(&lines).await;
				self.drain_idle();
				(records, None)
			}
		};

		records
			.into_iter()
			.map(|record| Breakpoint {
				id: Some(record.id),
				verified: record.verified,
				message: (!record.verified).then(|| message.unwrap_or("Line is not executable").to_string()),
				source: Some(args.source.clone()),
				line: Some(coords.line_to_client(record.line)),
			})
			.collect()
	}

	/// Backend-registered breakpoint lines within the requested range.
	pub async fn breakpoint_locations(&mut self, args: &BreakpointLocationsArguments) -> Vec<BreakpointLocation> {
		if self.program.is_none() || self.is_terminated() {
			return Vec::new();
		}
		let coords = self.coordinates();
		let first = args.line;
		let last = args.end_line.unwrap_or(args.line).max(first);

		let mut lines: Vec<u32> = self
			.breakpoints
			.get()
			.await
			.into_iter()
			.map(|line| coords.line_to_client(line))
			.filter(|line| (first..=last).contains(line))
			.collect();
		lines.sort_unstable();
		lines.dedup();
		self.drain_idle();

		lines
			.into_iter()
			.map(|line| BreakpointLocation { line, column: None })
			.collect()
	}

	pub fn breakpoints(&self) -> &[BreakpointRecord] {
		self.breakpoints.registered()
	}

	// ------------------------------------------------------------------------
	// Inspection

	pub fn threads(&self) -> Vec<Thread> {
		vec![Thread {
			id: THREAD_ID,
			name: "main".to_string(),
		}]
	}

	/// Fetches frames fresh from the backend; honors `startFrame`/`levels`.
	pub async fn stack_trace(&mut self, args: &StackTraceArguments) -> StackTraceResponseBody {
		if self.program.is_none() || self.is_terminated() {
			return StackTraceResponseBody {
				stack_frames: Vec::new(),
				total_frames: 0,
			};
		}

		let reply = self.backend.call(Command::GetStackFrames).await;
		let frames = serde_json::from_value::<FramesReply>(reply).unwrap_or_default().frames;
		self.drain_idle();

		let coords = self.coordinates();
		let program = self.pump.notifier.program.clone();
		let total_frames = frames.len();
		let start = args.start_frame.unwrap_or(0);
		let levels = match args.levels {
			Some(0) | None => total_frames,
			Some(levels) => levels,
		};

		let stack_frames = frames
			.into_iter()
			.skip(start)
			.take(levels)
			.map(|frame| StackFrame {
				id: i64::from(frame.index),
				name: frame.name,
				source: frame.file.or_else(|| program.clone()).map(|path| resolve_source(&path)),
				line: coords.line_to_client(frame.line),
				column: coords.column_to_client(coords.backend_column_base),
			})
			.collect();

		StackTraceResponseBody {
			stack_frames,
			total_frames,
		}
	}

	/// The single flat scope.
	pub fn scopes(&self) -> Vec<Scope> {
		vec![Scope {
			name: "Locals".to_string(),
			variables_reference: LOCALS_REFERENCE,
			expensive: false,
		}]
	}

	pub async fn variables(&mut self, args: &VariablesArguments) -> Vec<Variable> {
		if args.variables_reference != LOCALS_REFERENCE || self.program.is_none() || self.is_terminated() {
			return Vec::new();
		}

		let reply = self.backend.call(Command::GetVariables).await;
		let variables = serde_json::from_value::<VariablesReply>(reply).unwrap_or_default().variables;
		self.drain_idle();

		variables
			.into_iter()
			.map(|var| Variable {
				name: var.name,
				value: var.value,
				ty: var.ty,
				evaluate_name: var.evaluate_name,
				variables_reference: 0,
			})
			.collect()
	}

	/// Accepted and echoed back; the backend has no way to assign.
	pub fn set_variable(&self, args: &SetVariableArguments) -> SetVariableResponseBody {
		debug!(target: "stepwire.session", name = %args.name, value = %args.value, "setVariable ignored");
		SetVariableResponseBody {
			value: args.value.clone(),
		}
	}

	// ------------------------------------------------------------------------
	// Notifications

	/// Waits for the next notification raised outside an operation.
	pub async fn next_backend_event(&mut self) -> Option<BackendEvent> {
		self.pump.next().await
	}

	/// Translates a notification raised outside an operation.
	pub fn handle_backend_event(&mut self, event: BackendEvent) {
		let mut drained = Drained::default();
		self.pump.absorb(event, &mut drained);
		self.apply_validations();
		self.settle_idle(drained);
	}

	fn drain_idle(&mut self) {
		let drained = self.pump.drain();
		self.apply_validations();
		self.settle_idle(drained);
	}

	fn settle_idle(&mut self, drained: Drained) {
		if drained.ended {
			self.terminate();
		} else if let Some(reason) = drained.stop {
			self.runner.record(&StepOutcome::Stopped(reason.clone()));
			self.stop(reason);
		}
	}

	fn apply_validations(&mut self) {
		for (id, verified) in self.pump.take_validations() {
			match self.breakpoints.mark_verified(id, verified) {
				Some(record) => self.pump.notifier.breakpoint_changed(record.id, record.verified),
				None => debug!(target: "stepwire.session", id, "validation for unknown breakpoint"),
			}
		}
	}

	fn stop(&mut self, reason: StopReason) {
		if self.is_terminated() {
			return;
		}
		self.state = SessionState::Stopped;
		self.pump.notifier.stopped(reason);
	}

	fn terminate(&mut self) {
		if self.runner.state() != RunState::Terminated {
			self.runner.terminate();
		}
		self.state = SessionState::Terminated;
		self.run_pending = false;
		self.pump.notifier.terminated();
	}
}

/// Where a setBreakpoints request lands.
enum Target {
	Ended,
	Deferred,
	Foreign,
	Loaded,
}

fn unverified(lines: &[u32]) -> Vec<BreakpointRecord> {
	lines.iter().map(|line| BreakpointRecord::unverified(*line)).collect()
}

fn program_path(program: &str) -> Result<PathBuf> {
	if program.trim().is_empty() {
		return Err(SessionError::Arguments("launch requires a program path".into()));
	}
	std::path::absolute(program).map_err(|e| SessionError::Arguments(format!("bad program path {program}: {e}")))
}

/// A source without a path is taken to mean the launched program.
fn same_source(program: &Path, source: &Source) -> bool {
	match &source.path {
		Some(path) => std::path::absolute(path).map(|p| p == program).unwrap_or(false),
		None => true,
	}
}
