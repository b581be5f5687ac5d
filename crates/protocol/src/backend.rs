//! Execution-backend wire types.
//!
//! Keys are declared in camelCase. Outgoing payloads are re-cased by
//! [`crate::keys::normalize`] before they hit the wire and incoming payloads
//! are folded back with [`crate::keys::to_camel`] before they are decoded
//! into the types below.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

/// A command addressed to the execution backend.
///
/// On the stream transport the command name travels in the envelope; on the
/// HTTP transport it selects the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	/// Hands the program to the backend. `text` is omitted when the backend reads the file itself.
	LoadSource { path: String, text: Option<String> },
	/// Begins execution of the loaded program.
	Start { stop_on_entry: bool },
	/// Executes one unit of the program.
	Step,
	/// Lines the backend currently holds breakpoints on.
	GetBreakpoints,
	/// Registers one breakpoint (zero-based line).
	SetBreakpoint { line: u32 },
	/// Drops every breakpoint of the loaded source.
	ClearBreakpoints,
	GetStackFrames,
	GetVariables,
}

impl Command {
	/// Command name, also used as the HTTP endpoint path.
	pub fn name(&self) -> &'static str {
		match self {
			Command::LoadSource { .. } => "loadSource",
			Command::Start { .. } => "start",
			Command::Step => "step",
			Command::GetBreakpoints => "getBreakpoints",
			Command::SetBreakpoint { .. } => "setBreakpoint",
			Command::ClearBreakpoints => "clearBreakpoints",
			Command::GetStackFrames => "getStackFrames",
			Command::GetVariables => "getVariables",
		}
	}

	/// Command arguments as a camelCase JSON object.
	pub fn args(&self) -> Value {
		match self {
			Command::LoadSource { path, text: Some(text) } => json!({ "path": path, "text": text }),
			Command::LoadSource { path, text: None } => json!({ "path": path }),
			Command::Start { stop_on_entry } => json!({ "stopOnEntry": stop_on_entry }),
			Command::SetBreakpoint { line } => json!({ "line": line }),
			Command::Step
			| Command::GetBreakpoints
			| Command::ClearBreakpoints
			| Command::GetStackFrames
			| Command::GetVariables => json!({}),
		}
	}
}

/// Outgoing stream-transport envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
	pub id: u64,
	pub command: &'a str,
	pub args: Value,
}

/// One inbound unit on the stream transport, classified by shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
	/// Carries a correlation id.
	Reply(Reply),
	/// Untagged notification.
	Event(RawEvent),
	/// Neither shape; kept for logging.
	Unknown(Value),
}

/// Reply to a previously sent command.
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
	pub id: u64,
	#[serde(default)]
	pub result: Option<Value>,
	#[serde(default)]
	pub error: Option<ReplyError>,
}

/// Error attached to a reply. Backends send either a bare string or an object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReplyError {
	Message(String),
	Detailed {
		message: String,
		#[serde(default)]
		name: Option<String>,
	},
}

impl ReplyError {
	pub fn message(&self) -> &str {
		match self {
			ReplyError::Message(message) | ReplyError::Detailed { message, .. } => message,
		}
	}
}

/// Named notification before interpretation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEvent {
	pub event: String,
	#[serde(default)]
	pub body: Value,
}

/// Unsolicited notification from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
	StopOnEntry,
	StopOnStep,
	StopOnBreakpoint,
	StopOnException { detail: Option<String> },
	/// A previously requested breakpoint was confirmed or rejected.
	BreakpointValidated { id: i64, verified: bool },
	/// Program output. `line`/`column` are zero-based.
	Output {
		text: String,
		file: Option<String>,
		line: u32,
		column: u32,
	},
	/// Program ended, or the transport failed.
	End,
	/// A name this adapter does not understand, or a body that did not decode.
	Unknown { name: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExceptionBody {
	#[serde(default)]
	detail: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidatedBody {
	id: i64,
	#[serde(default = "default_true")]
	verified: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputBody {
	#[serde(deserialize_with = "display_text")]
	text: String,
	#[serde(default)]
	file: Option<String>,
	#[serde(default)]
	line: u32,
	#[serde(default)]
	column: u32,
}

fn default_true() -> bool {
	true
}

impl BackendEvent {
	/// Interprets a raw notification. Never fails: undecodable input becomes [`BackendEvent::Unknown`].
	pub fn from_raw(raw: RawEvent) -> Self {
		let RawEvent { event, body } = raw;
		let body = if body.is_null() { json!({}) } else { body };
		let decoded = match event.as_str() {
			"stopOnEntry" => Some(BackendEvent::StopOnEntry),
			"stopOnStep" => Some(BackendEvent::StopOnStep),
			"stopOnBreakpoint" => Some(BackendEvent::StopOnBreakpoint),
			"stopOnException" => serde_json::from_value::<ExceptionBody>(body)
				.ok()
				.map(|b| BackendEvent::StopOnException { detail: b.detail }),
			"breakpointValidated" => serde_json::from_value::<ValidatedBody>(body)
				.ok()
				.map(|b| BackendEvent::BreakpointValidated {
					id: b.id,
					verified: b.verified,
				}),
			"output" => serde_json::from_value::<OutputBody>(body)
				.ok()
				.map(|b| BackendEvent::Output {
					text: b.text,
					file: b.file,
					line: b.line,
					column: b.column,
				}),
			"end" => Some(BackendEvent::End),
			_ => None,
		};
		decoded.unwrap_or(BackendEvent::Unknown { name: event })
	}

	/// Whether this notification ends the session.
	pub fn is_end(&self) -> bool {
		matches!(self, BackendEvent::End)
	}
}

/// Reason a step stopped, as reported in a [`StepReply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopKind {
	Entry,
	#[default]
	Step,
	Breakpoint,
	Exception,
}

/// Reply to `loadSource` and `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadReply {
	pub error: Option<String>,
}

/// Reply to `step`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepReply {
	pub ended: bool,
	pub reason: Option<StopKind>,
	pub detail: Option<String>,
}

/// Reply to `setBreakpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointReply {
	#[serde(default)]
	pub verified: bool,
	pub line: u32,
	/// Backend-assigned id; absent means "derive from line".
	#[serde(default)]
	pub id: Option<i64>,
}

/// Reply to `getBreakpoints`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakpointLines {
	pub lines: Vec<u32>,
}

/// Reply to `getStackFrames`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FramesReply {
	pub frames: Vec<FrameRecord>,
}

/// One backend stack frame. `line` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
	#[serde(default)]
	pub index: u32,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub file: Option<String>,
	#[serde(default)]
	pub line: u32,
}

/// Reply to `getVariables`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariablesReply {
	pub variables: Vec<VariableRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRecord {
	pub name: String,
	/// Display text; non-string values are rendered as JSON.
	#[serde(deserialize_with = "display_text")]
	pub value: String,
	#[serde(default, rename = "type")]
	pub ty: Option<String>,
	#[serde(default)]
	pub evaluate_name: Option<String>,
}

fn display_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Value::deserialize(deserializer)? {
		Value::String(s) => s,
		Value::Null => String::new(),
		other => other.to_string(),
	})
}
