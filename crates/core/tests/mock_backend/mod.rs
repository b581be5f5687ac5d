//! In-process execution backend for session tests.
//!
//! Simulates a line-oriented program: execution starts at line 0 and each
//! step advances one line. Stepping onto a breakpoint reports a breakpoint
//! stop; stepping past the last line ends the program.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use stepwire::source::{SourceFuture, SourceReader};
use stepwire_protocol::{BackendEvent, Command};
use stepwire_runtime::{Backend, BackendEvents, CallFuture, EventSender};

#[derive(Debug, Default)]
struct MockState {
	lines: u32,
	current: u32,
	breakpoints: BTreeSet<u32>,
	commands: Vec<String>,
	steps: u32,
	closed: bool,
}

pub struct MockBackend {
	state: Mutex<MockState>,
	events: EventSender,
	load_error: Option<String>,
	/// Lines that refuse breakpoints.
	not_executable: BTreeSet<u32>,
	/// Also raise `stopOnStep` events alongside step replies.
	step_events: bool,
	/// Never end; each step takes this long.
	endless: Option<Duration>,
	/// Confirm breakpoints later through `breakpointValidated` instead of in the reply.
	late_validation: bool,
}

impl MockBackend {
	/// A program of `lines` lines, used when `loadSource` carries no text.
	pub fn new(lines: u32) -> (Self, BackendEvents) {
		let (events, rx) = EventSender::channel();
		(
			Self {
				state: Mutex::new(MockState {
					lines,
					..MockState::default()
				}),
				events,
				load_error: None,
				not_executable: BTreeSet::new(),
				step_events: false,
				endless: None,
				late_validation: false,
			},
			rx,
		)
	}

	pub fn with_load_error(mut self, message: &str) -> Self {
		self.load_error = Some(message.to_string());
		self
	}

	pub fn with_not_executable(mut self, lines: &[u32]) -> Self {
		self.not_executable = lines.iter().copied().collect();
		self
	}

	pub fn with_step_events(mut self) -> Self {
		self.step_events = true;
		self
	}

	pub fn endless(mut self, step_time: Duration) -> Self {
		self.endless = Some(step_time);
		self
	}

	pub fn with_late_validation(mut self) -> Self {
		self.late_validation = true;
		self
	}

	pub fn steps(&self) -> u32 {
		self.state.lock().unwrap().steps
	}

	pub fn breakpoint_lines(&self) -> Vec<u32> {
		self.state.lock().unwrap().breakpoints.iter().copied().collect()
	}

	pub fn commands(&self) -> Vec<String> {
		self.state.lock().unwrap().commands.clone()
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().unwrap().closed
	}

	/// Raises an arbitrary notification, as a backend would between commands.
	pub fn emit(&self, event: BackendEvent) {
		self.events.send(event);
	}

	fn handle(&self, command: &Command) -> Value {
		let mut state = self.state.lock().unwrap();
		state.commands.push(command.name().to_string());

		match command {
			Command::LoadSource { text, .. } => {
				if let Some(message) = &self.load_error {
					return json!({ "error": message });
				}
				if let Some(text) = text {
					state.lines = text.lines().count() as u32;
				}
				state.current = 0;
				json!({})
			}
			Command::Start { stop_on_entry } => {
				state.current = 0;
				if *stop_on_entry {
					self.events.send(BackendEvent::StopOnEntry);
				}
				json!({ "error": null })
			}
			Command::Step => {
				state.steps += 1;
				let next = state.current + 1;
				if next >= state.lines {
					self.events.send(BackendEvent::End);
					return json!({ "ended": true });
				}
				state.current = next;
				if state.breakpoints.contains(&next) {
					json!({ "ended": false, "reason": "breakpoint" })
				} else {
					if self.step_events {
						self.events.send(BackendEvent::StopOnStep);
					}
					json!({ "ended": false })
				}
			}
			Command::GetBreakpoints => json!({ "lines": state.breakpoints.iter().collect::<Vec<_>>() }),
			Command::SetBreakpoint { line } => {
				let executable = *line < state.lines && !self.not_executable.contains(line);
				if executable {
					state.breakpoints.insert(*line);
				}
				if self.late_validation {
					if executable {
						self.events.send(BackendEvent::BreakpointValidated {
							id: 100 + i64::from(*line),
							verified: true,
						});
					}
					json!({ "verified": false, "line": line, "id": 100 + i64::from(*line) })
				} else {
					json!({ "verified": executable, "line": line })
				}
			}
			Command::ClearBreakpoints => {
				state.breakpoints.clear();
				json!({})
			}
			Command::GetStackFrames => json!({
				"frames": [
					{ "index": 0, "name": "line", "line": state.current },
					{ "index": 1, "name": "program", "file": "/lib/prelude.txt", "line": 0 },
				]
			}),
			Command::GetVariables => json!({
				"variables": [
					{ "name": "line", "value": state.current, "type": "int" },
					{ "name": "greeting", "value": "hi", "evaluateName": "greeting" },
				]
			}),
		}
	}
}

impl Backend for MockBackend {
	fn call(&self, command: Command) -> CallFuture<'_> {
		Box::pin(async move {
			if self.state.lock().unwrap().closed {
				return Value::Null;
			}
			if let (Command::Step, Some(step_time)) = (&command, self.endless) {
				self.state.lock().unwrap().steps += 1;
				tokio::time::sleep(step_time).await;
				return json!({ "ended": false });
			}
			self.handle(&command)
		})
	}

	fn close(&self) {
		self.state.lock().unwrap().closed = true;
		self.events.end();
	}
}

/// In-memory program texts keyed by path.
#[derive(Default)]
pub struct StubReader {
	files: HashMap<PathBuf, String>,
}

impl StubReader {
	pub fn with(path: &str, text: &str) -> Arc<Self> {
		let mut files = HashMap::new();
		files.insert(PathBuf::from(path), text.to_string());
		Arc::new(Self { files })
	}
}

impl SourceReader for StubReader {
	fn read<'a>(&'a self, path: &'a Path) -> SourceFuture<'a> {
		Box::pin(async move {
			self.files
				.get(path)
				.cloned()
				.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such program"))
		})
	}
}
