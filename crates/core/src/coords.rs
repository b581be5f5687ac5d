//! Line/column translation between backend and client numbering.
//!
//! The session stores every position in backend-native numbering and
//! converts exactly once, at the point where a value leaves for (or arrives
//! from) the client.

use std::path::Path;

use stepwire_protocol::dap::{InitializeArguments, Source};

/// Numbering bases on both sides of the adapter. A base is `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinates {
	pub client_line_base: u32,
	pub client_column_base: u32,
	pub backend_line_base: u32,
	pub backend_column_base: u32,
}

impl Default for Coordinates {
	/// DAP clients count from one unless told otherwise; backends count from zero.
	fn default() -> Self {
		Self {
			client_line_base: 1,
			client_column_base: 1,
			backend_line_base: 0,
			backend_column_base: 0,
		}
	}
}

impl Coordinates {
	/// Adopts the client's numbering announced in `initialize`, keeping the backend side.
	pub fn with_client(self, args: &InitializeArguments) -> Self {
		Self {
			client_line_base: base(args.lines_start_at1.unwrap_or(true)),
			client_column_base: base(args.columns_start_at1.unwrap_or(true)),
			..self
		}
	}

	pub fn line_to_client(&self, line: u32) -> u32 {
		rebase(line, self.backend_line_base, self.client_line_base)
	}

	pub fn line_from_client(&self, line: u32) -> u32 {
		rebase(line, self.client_line_base, self.backend_line_base)
	}

	pub fn column_to_client(&self, column: u32) -> u32 {
		rebase(column, self.backend_column_base, self.client_column_base)
	}

	pub fn column_from_client(&self, column: u32) -> u32 {
		rebase(column, self.client_column_base, self.backend_column_base)
	}
}

fn base(starts_at_one: bool) -> u32 {
	u32::from(starts_at_one)
}

/// Values below the source base clamp to the target base.
fn rebase(value: u32, from: u32, to: u32) -> u32 {
	value.saturating_sub(from).saturating_add(to)
}

/// Builds the client-facing descriptor for a backend file path.
pub fn resolve_source(path: &str) -> Source {
	let name = Path::new(path)
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_else(|| path.to_string());
	Source {
		name: Some(name),
		path: Some(path.to_string()),
	}
}
