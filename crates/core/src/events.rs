//! Outward session notifications.

use stepwire_protocol::dap::Source;
use tokio::sync::mpsc;

/// Why execution is paused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
	Entry,
	Step,
	Breakpoint,
	/// Carries the backend's detail text when it sent one.
	Exception(Option<String>),
}

impl StopReason {
	/// DAP `stopped.reason` string.
	pub fn as_str(&self) -> &'static str {
		match self {
			StopReason::Entry => "entry",
			StopReason::Step => "step",
			StopReason::Breakpoint => "breakpoint",
			StopReason::Exception(_) => "exception",
		}
	}
}

/// Notification for the client-facing layer. Positions are client-native.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
	Stopped { reason: StopReason },
	/// A breakpoint's verification changed after it was set.
	BreakpointChanged { id: i64, verified: bool },
	Output {
		text: String,
		source: Option<Source>,
		line: u32,
		column: u32,
	},
	/// Emitted once per session, last.
	Terminated,
}

pub type EventSink = mpsc::UnboundedSender<SessionEvent>;
pub type EventStream = mpsc::UnboundedReceiver<SessionEvent>;

pub fn event_channel() -> (EventSink, EventStream) {
	mpsc::unbounded_channel()
}
