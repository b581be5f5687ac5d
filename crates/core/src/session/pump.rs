//! Backend notification intake and outward emission.

use stepwire_protocol::BackendEvent;
use stepwire_runtime::BackendEvents;
use tokio::sync::watch;
use tracing::debug;

use crate::coords::{Coordinates, resolve_source};
use crate::events::{EventSink, SessionEvent, StopReason};
use crate::runner::StepOutcome;

/// Stop and end notifications collected by one drain.
#[derive(Debug, Default)]
pub(crate) struct Drained {
	pub stop: Option<StopReason>,
	pub ended: bool,
}

/// Sends outward events, translating positions to the client's numbering.
pub(crate) struct Notifier {
	sink: EventSink,
	pub coords: Coordinates,
	/// Path of the loaded program, used when output names no file.
	pub program: Option<String>,
	/// Set once the client asked to disconnect; suppresses `Terminated`.
	disconnect: watch::Receiver<bool>,
	terminated: bool,
}

impl Notifier {
	pub fn new(sink: EventSink, coords: Coordinates, disconnect: watch::Receiver<bool>) -> Self {
		Self {
			sink,
			coords,
			program: None,
			disconnect,
			terminated: false,
		}
	}

	/// Sends `event` unless the session has ended.
	fn emit(&self, event: SessionEvent) {
		if self.terminated {
			debug!(target: "stepwire.session", ?event, "session ended, dropping event");
			return;
		}
		self.send(event);
	}

	fn send(&self, event: SessionEvent) {
		if self.sink.send(event).is_err() {
			debug!(target: "stepwire.session", "event sink closed");
		}
	}

	pub fn stopped(&self, reason: StopReason) {
		self.emit(SessionEvent::Stopped { reason });
	}

	pub fn breakpoint_changed(&self, id: i64, verified: bool) {
		self.emit(SessionEvent::BreakpointChanged { id, verified });
	}

	pub fn output(&self, text: String, file: Option<String>, line: u32, column: u32) {
		let source = file.or_else(|| self.program.clone()).map(|path| resolve_source(&path));
		self.emit(SessionEvent::Output {
			text,
			source,
			line: self.coords.line_to_client(line),
			column: self.coords.column_to_client(column),
		});
	}

	/// Emits `Terminated` the first time only.
	pub fn terminated(&mut self) {
		if std::mem::replace(&mut self.terminated, true) {
			return;
		}
		if *self.disconnect.borrow() {
			debug!(target: "stepwire.session", "terminated after disconnect, not announced");
			return;
		}
		self.send(SessionEvent::Terminated);
	}

	/// Marks the session finished without announcing it.
	pub fn silence(&mut self) {
		self.terminated = true;
	}
}

/// Owns the backend notification channel.
pub(crate) struct EventPump {
	events: BackendEvents,
	pub notifier: Notifier,
	/// Late verifications not yet applied to the breakpoint table.
	validations: Vec<(i64, bool)>,
}

impl EventPump {
	pub fn new(events: BackendEvents, notifier: Notifier) -> Self {
		Self {
			events,
			notifier,
			validations: Vec::new(),
		}
	}

	pub async fn next(&mut self) -> Option<BackendEvent> {
		self.events.recv().await
	}

	/// Handles every queued notification.
	///
	/// Output goes out immediately. Validations are kept for
	/// [`EventPump::take_validations`]; stops and end are returned for the
	/// caller to decide on.
	pub fn drain(&mut self) -> Drained {
		let mut drained = Drained::default();
		while let Ok(event) = self.events.try_recv() {
			self.absorb(event, &mut drained);
		}
		drained
	}

	pub fn absorb(&mut self, event: BackendEvent, drained: &mut Drained) {
		let reason = match event {
			BackendEvent::StopOnEntry => StopReason::Entry,
			BackendEvent::StopOnStep => StopReason::Step,
			BackendEvent::StopOnBreakpoint => StopReason::Breakpoint,
			BackendEvent::StopOnException { detail } => StopReason::Exception(detail),
			BackendEvent::BreakpointValidated { id, verified } => {
				self.validations.push((id, verified));
				return;
			}
			BackendEvent::Output {
				text,
				file,
				line,
				column,
			} => {
				self.notifier.output(text, file, line, column);
				return;
			}
			BackendEvent::End => {
				drained.ended = true;
				return;
			}
			BackendEvent::Unknown { name } => {
				debug!(target: "stepwire.session", event = %name, "ignoring unknown backend event");
				return;
			}
		};
		// A plain step never hides a more specific stop from the same batch.
		drained.stop = match (drained.stop.take(), reason) {
			(Some(previous), StopReason::Step) => Some(previous),
			(_, reason) => Some(reason),
		};
	}

	/// Combines a step reply with whatever the backend announced meanwhile.
	pub fn merge(&mut self, outcome: StepOutcome) -> StepOutcome {
		let drained = self.drain();
		if drained.ended || outcome.is_ended() {
			return StepOutcome::Ended;
		}
		match drained.stop {
			Some(reason) => StepOutcome::Stopped(reason),
			None => outcome,
		}
	}

	pub fn take_validations(&mut self) -> Vec<(i64, bool)> {
		std::mem::take(&mut self.validations)
	}
}

#[cfg(test)]
mod tests {
	use stepwire_runtime::EventSender;

	use super::*;
	use crate::events::event_channel;

	fn pump() -> (EventPump, EventSender, crate::events::EventStream, watch::Sender<bool>) {
		let (sender, events) = EventSender::channel();
		let (sink, stream) = event_channel();
		let (disconnect_tx, disconnect_rx) = watch::channel(false);
		let notifier = Notifier::new(sink, Coordinates::default(), disconnect_rx);
		(EventPump::new(events, notifier), sender, stream, disconnect_tx)
	}

	#[test]
	fn merge_prefers_backend_stop_reason() {
		let (mut pump, sender, _stream, _disconnect) = pump();
		sender.send(BackendEvent::StopOnBreakpoint);
		sender.send(BackendEvent::StopOnStep);

		let merged = pump.merge(StepOutcome::Stopped(StopReason::Step));
		assert_eq!(merged, StepOutcome::Stopped(StopReason::Breakpoint));
	}

	#[test]
	fn merge_end_wins() {
		let (mut pump, sender, _stream, _disconnect) = pump();
		sender.send(BackendEvent::StopOnStep);
		sender.end();

		assert_eq!(pump.merge(StepOutcome::Stopped(StopReason::Step)), StepOutcome::Ended);
	}

	#[test]
	fn output_is_translated_and_sourced() {
		let (mut pump, sender, mut stream, _disconnect) = pump();
		pump.notifier.program = Some("/work/prog.txt".into());
		sender.send(BackendEvent::Output {
			text: "hello".into(),
			file: None,
			line: 0,
			column: 4,
		});

		let drained = pump.drain();
		assert!(drained.stop.is_none());
		match stream.try_recv().unwrap() {
			SessionEvent::Output {
				text,
				source,
				line,
				column,
			} => {
				assert_eq!(text, "hello");
				assert_eq!(source.unwrap().name.as_deref(), Some("prog.txt"));
				assert_eq!((line, column), (1, 5));
			}
			other => panic!("expected output, got {other:?}"),
		}
	}

	#[test]
	fn terminated_is_announced_once() {
		let (mut pump, _sender, mut stream, _disconnect) = pump();
		pump.notifier.terminated();
		pump.notifier.terminated();
		pump.notifier.stopped(StopReason::Step);

		assert_eq!(stream.try_recv().unwrap(), SessionEvent::Terminated);
		assert!(stream.try_recv().is_err());
	}

	#[test]
	fn terminated_after_disconnect_is_silent() {
		let (mut pump, _sender, mut stream, disconnect) = pump();
		disconnect.send_replace(true);
		pump.notifier.terminated();
		assert!(stream.try_recv().is_err());
	}
}
