//! Line breakpoints of the loaded program.
//!
//! Every update replaces the whole set: the backend is cleared, then each
//! requested line is registered again. Lines are backend-native.

use std::collections::HashMap;
use std::sync::Arc;

use stepwire_protocol::{BreakpointLines, BreakpointReply, Command};
use stepwire_runtime::Backend;
use tracing::debug;

/// One registered (or rejected) breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointRecord {
	/// Backend-assigned, or the line when the backend assigns none.
	pub id: i64,
	pub line: u32,
	pub verified: bool,
}

impl BreakpointRecord {
	pub fn unverified(line: u32) -> Self {
		Self {
			id: i64::from(line),
			line,
			verified: false,
		}
	}
}

pub struct BreakpointManager {
	backend: Arc<dyn Backend>,
	/// At most one record per line.
	registered: Vec<BreakpointRecord>,
	/// Lines requested before any program was loaded.
	deferred: Option<Vec<u32>>,
	/// Backend id to the id the client was given, for deferred breakpoints.
	aliases: HashMap<i64, i64>,
}

impl BreakpointManager {
	pub fn new(backend: Arc<dyn Backend>) -> Self {
		Self {
			backend,
			registered: Vec::new(),
			deferred: None,
			aliases: HashMap::new(),
		}
	}

	/// Drops every breakpoint in the backend. Safe to repeat.
	pub async fn clear_all(&mut self) {
		self.backend.call(Command::ClearBreakpoints).await;
		self.registered.clear();
		self.aliases.clear();
	}

	/// Replaces the breakpoint set with `lines`.
	///
	/// Returns one record per requested line, in request order. Repeated
	/// lines are registered once and share a record.
	pub async fn set_all(&mut self, lines: &[u32]) -> Vec<BreakpointRecord> {
		self.clear_all().await;

		let mut by_request: HashMap<u32, BreakpointRecord> = HashMap::with_capacity(lines.len());
		for &line in lines {
			if by_request.contains_key(&line) {
				continue;
			}
			let record = self.register(line).await;
			if !self.registered.iter().any(|r| r.line == record.line) {
				self.registered.push(record);
			}
			by_request.insert(line, record);
		}

		debug!(
			target: "stepwire.breakpoints",
			requested = lines.len(),
			registered = self.registered.len(),
			"breakpoints replaced"
		);
		lines
			.iter()
			.map(|line| by_request.get(line).copied().unwrap_or(BreakpointRecord::unverified(*line)))
			.collect()
	}

	async fn register(&self, line: u32) -> BreakpointRecord {
		let reply = self.backend.call(Command::SetBreakpoint { line }).await;
		match serde_json::from_value::<BreakpointReply>(reply) {
			Ok(reply) => BreakpointRecord {
				id: reply.id.unwrap_or(i64::from(reply.line)),
				line: reply.line,
				verified: reply.verified,
			},
			Err(e) => {
				debug!(target: "stepwire.breakpoints", line, error = %e, "unusable setBreakpoint reply");
				BreakpointRecord::unverified(line)
			}
		}
	}

	/// Lines the backend currently holds breakpoints on.
	pub async fn get(&self) -> Vec<u32> {
		let reply = self.backend.call(Command::GetBreakpoints).await;
		serde_json::from_value::<BreakpointLines>(reply)
			.map(|b| b.lines)
			.unwrap_or_default()
	}

	/// Applies a late verification. Returns the updated record if the id is known.
	///
	/// `id` is the backend's; the returned record carries the client's.
	pub fn mark_verified(&mut self, id: i64, verified: bool) -> Option<BreakpointRecord> {
		let id = self.aliases.get(&id).copied().unwrap_or(id);
		let record = self.registered.iter_mut().find(|r| r.id == id)?;
		record.verified = verified;
		Some(*record)
	}

	/// Remembers `lines` until a program is loaded; all are reported unverified.
	pub fn defer(&mut self, lines: &[u32]) -> Vec<BreakpointRecord> {
		self.deferred = Some(lines.to_vec());
		lines.iter().map(|line| BreakpointRecord::unverified(*line)).collect()
	}

	/// Registers the deferred lines, if any.
	///
	/// Records keep the ids handed out by [`BreakpointManager::defer`], so
	/// later notifications match what the client holds. Returns only the
	/// records whose state differs from what the client was told.
	pub async fn apply_deferred(&mut self) -> Vec<BreakpointRecord> {
		let Some(lines) = self.deferred.take() else {
			return Vec::new();
		};
		let records = self.set_all(&lines).await;

		let mut changed = Vec::new();
		for (&line, record) in lines.iter().zip(records) {
			let told = BreakpointRecord::unverified(line);
			if record.id != told.id {
				self.aliases.insert(record.id, told.id);
				if let Some(registered) = self.registered.iter_mut().find(|r| r.id == record.id) {
					registered.id = told.id;
				}
			}
			let record = BreakpointRecord { id: told.id, ..record };
			if record != told && !changed.contains(&record) {
				changed.push(record);
			}
		}
		changed
	}

	pub fn registered(&self) -> &[BreakpointRecord] {
		&self.registered
	}
}
