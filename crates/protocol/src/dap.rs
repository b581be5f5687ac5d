//! Debug Adapter Protocol shapes.
//!
//! Only the subset the adapter services is modeled.
//! See <https://microsoft.github.io/debug-adapter-protocol/specification>.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Base protocol message, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
	Request(Request),
	Response(Response),
	Event(Event),
}

/// Client-initiated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	pub seq: i64,
	pub command: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub arguments: Value,
}

/// Adapter response to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	pub seq: i64,
	pub request_seq: i64,
	pub success: bool,
	pub command: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub body: Value,
}

/// Adapter-initiated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub seq: i64,
	pub event: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub body: Value,
}

/// Structured error carried in a failed response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
	pub id: i64,
	pub format: String,
	/// Whether the client should surface the message to the user.
	pub show_user: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponseBody {
	pub error: Message,
}

// ----------------------------------------------------------------------------
// Data types

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<i64>,
	pub verified: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<Source>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
	pub line: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointLocation {
	pub line: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
	pub id: i64,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<Source>,
	pub line: u32,
	pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
	pub name: String,
	pub variables_reference: i64,
	pub expensive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
	pub name: String,
	pub value: String,
	#[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
	pub ty: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub evaluate_name: Option<String>,
	pub variables_reference: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
	pub id: i64,
	pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
	pub supports_configuration_done_request: bool,
	pub supports_breakpoint_locations_request: bool,
	pub supports_set_variable: bool,
}

// ----------------------------------------------------------------------------
// Request arguments

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeArguments {
	#[serde(rename = "clientID")]
	pub client_id: Option<String>,
	#[serde(rename = "adapterID")]
	pub adapter_id: Option<String>,
	pub lines_start_at1: Option<bool>,
	pub columns_start_at1: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
	pub program: String,
	#[serde(default)]
	pub stop_on_entry: bool,
	#[serde(default)]
	pub trace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
	pub source: Source,
	#[serde(default)]
	pub breakpoints: Option<Vec<SourceBreakpoint>>,
	/// Deprecated form still sent by some clients.
	#[serde(default)]
	pub lines: Option<Vec<u32>>,
}

impl SetBreakpointsArguments {
	/// Requested lines in client order, preferring `breakpoints` over the deprecated `lines`.
	pub fn requested_lines(&self) -> Vec<u32> {
		match (&self.breakpoints, &self.lines) {
			(Some(bps), _) => bps.iter().map(|bp| bp.line).collect(),
			(None, Some(lines)) => lines.clone(),
			(None, None) => Vec::new(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointLocationsArguments {
	pub source: Source,
	pub line: u32,
	#[serde(default)]
	pub end_line: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StackTraceArguments {
	pub thread_id: i64,
	pub start_frame: Option<usize>,
	pub levels: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopesArguments {
	pub frame_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariablesArguments {
	pub variables_reference: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableArguments {
	pub variables_reference: i64,
	pub name: String,
	pub value: String,
}

// ----------------------------------------------------------------------------
// Response bodies

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBreakpointsResponseBody {
	pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointLocationsResponseBody {
	pub breakpoints: Vec<BreakpointLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadsResponseBody {
	pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
	pub stack_frames: Vec<StackFrame>,
	pub total_frames: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopesResponseBody {
	pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariablesResponseBody {
	pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetVariableResponseBody {
	pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseBody {
	pub all_threads_continued: bool,
}

// ----------------------------------------------------------------------------
// Event bodies

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
	/// `entry`, `step`, `breakpoint` or `exception`.
	pub reason: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub thread_id: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	pub all_threads_stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointEventBody {
	/// Always `changed` for this adapter.
	pub reason: String,
	pub breakpoint: Breakpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEventBody {
	pub category: String,
	pub output: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<Source>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub line: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column: Option<u32>,
}
