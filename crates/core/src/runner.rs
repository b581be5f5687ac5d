//! Start, step and continue.
//!
//! The backend has no "run" primitive: continue is a client-side loop of
//! single steps that ends when the program ends or a step reports a stop
//! other than a plain step. Stop reasons are backend-authoritative; the
//! runner never compares lines against breakpoints.

use std::sync::Arc;

use serde_json::Value;
use stepwire_protocol::{Command, LoadReply, StepReply, StopKind};
use stepwire_runtime::Backend;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::events::StopReason;

/// Result of one step as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
	Stopped(StopReason),
	Ended,
}

impl StepOutcome {
	pub fn is_ended(&self) -> bool {
		matches!(self, StepOutcome::Ended)
	}
}

/// How a continue loop finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinueOutcome {
	Stopped(StopReason),
	Ended,
	/// The session was told to terminate mid-loop.
	Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
	Idle,
	Running,
	Stopped,
	Terminated,
}

/// Why `start` did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartError {
	/// The backend answered with an error message.
	Rejected(String),
	/// The backend did not answer at all.
	Lost,
}

pub struct Runner {
	backend: Arc<dyn Backend>,
	state: RunState,
	steps: u64,
}

impl Runner {
	pub fn new(backend: Arc<dyn Backend>) -> Self {
		Self {
			backend,
			state: RunState::Idle,
			steps: 0,
		}
	}

	pub fn state(&self) -> RunState {
		self.state
	}

	/// Steps issued to the backend so far.
	pub fn steps(&self) -> u64 {
		self.steps
	}

	/// Loads the program and starts it.
	///
	/// With `stop_on_entry` the backend raises its entry stop before the
	/// start reply, so the event is already queued when this returns.
	pub async fn start(&mut self, path: &str, text: Option<String>, stop_on_entry: bool) -> Result<(), StartError> {
		let load = self
			.backend
			.call(Command::LoadSource {
				path: path.to_string(),
				text,
			})
			.await;
		self.check_start_reply("loadSource", load)?;

		let start = self.backend.call(Command::Start { stop_on_entry }).await;
		self.check_start_reply("start", start)?;

		self.state = if stop_on_entry {
			RunState::Stopped
		} else {
			RunState::Running
		};
		debug!(target: "stepwire.runner", path, stop_on_entry, "program started");
		Ok(())
	}

	fn check_start_reply(&mut self, command: &str, reply: Value) -> Result<(), StartError> {
		if reply.is_null() {
			self.state = RunState::Terminated;
			return Err(StartError::Lost);
		}
		match serde_json::from_value::<LoadReply>(reply) {
			Ok(LoadReply { error: Some(message) }) => {
				self.state = RunState::Terminated;
				Err(StartError::Rejected(message))
			}
			Ok(_) => Ok(()),
			Err(e) => {
				debug!(target: "stepwire.runner", command, error = %e, "ignoring unexpected reply shape");
				Ok(())
			}
		}
	}

	/// Advances exactly one unit.
	///
	/// After termination this returns [`StepOutcome::Ended`] without
	/// contacting the backend.
	pub async fn step(&mut self) -> StepOutcome {
		if self.state == RunState::Terminated {
			debug!(target: "stepwire.runner", "step after termination ignored");
			return StepOutcome::Ended;
		}

		self.state = RunState::Running;
		self.steps += 1;
		let reply = self.backend.call(Command::Step).await;
		let outcome = interpret_step(reply);
		self.record(&outcome);
		outcome
	}

	/// Steps until the program ends, a non-step stop is reported, or `cancel` flips.
	///
	/// `observe` sees every raw step outcome and may replace it, for instance
	/// with a stop reason or an end announced by a backend event.
	/// Intermediate plain-step stops are swallowed.
	pub async fn continue_until<F>(&mut self, cancel: &mut watch::Receiver<bool>, mut observe: F) -> ContinueOutcome
	where
		F: FnMut(StepOutcome) -> StepOutcome,
	{
		loop {
			if *cancel.borrow() {
				return ContinueOutcome::Interrupted;
			}

			let raw = tokio::select! {
				biased;
				_ = cancelled(cancel) => return ContinueOutcome::Interrupted,
				outcome = self.step() => outcome,
			};

			let outcome = observe(raw);
			self.record(&outcome);
			match outcome {
				StepOutcome::Stopped(StopReason::Step) => continue,
				StepOutcome::Stopped(reason) => return ContinueOutcome::Stopped(reason),
				StepOutcome::Ended => return ContinueOutcome::Ended,
			}
		}
	}

	/// Updates the state machine with a (possibly merged) outcome.
	pub fn record(&mut self, outcome: &StepOutcome) {
		self.state = match outcome {
			StepOutcome::Ended => RunState::Terminated,
			StepOutcome::Stopped(_) => RunState::Stopped,
		};
	}

	pub fn terminate(&mut self) {
		self.state = RunState::Terminated;
	}
}

/// Resolves once `cancel` reads `true`; never if its sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
	let sender_alive = cancel.wait_for(|flag| *flag).await.is_ok();
	if !sender_alive {
		std::future::pending::<()>().await;
	}
}

fn interpret_step(reply: Value) -> StepOutcome {
	if reply.is_null() {
		return StepOutcome::Ended;
	}
	if let Some(message) = reply.get("error").and_then(Value::as_str) {
		warn!(target: "stepwire.runner", message, "backend rejected step, ending session");
		return StepOutcome::Ended;
	}
	match serde_json::from_value::<StepReply>(reply) {
		Ok(StepReply { ended: true, .. }) => StepOutcome::Ended,
		Ok(StepReply { reason, detail, .. }) => StepOutcome::Stopped(stop_reason(reason.unwrap_or_default(), detail)),
		Err(e) => {
			warn!(target: "stepwire.runner", error = %e, "malformed step reply, ending session");
			StepOutcome::Ended
		}
	}
}

pub(crate) fn stop_reason(kind: StopKind, detail: Option<String>) -> StopReason {
	match kind {
		StopKind::Entry => StopReason::Entry,
		StopKind::Step => StopReason::Step,
		StopKind::Breakpoint => StopReason::Breakpoint,
		StopKind::Exception => StopReason::Exception(detail),
	}
}
