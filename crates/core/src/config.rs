use std::time::Duration;

/// How long launch waits for `configurationDone` before proceeding anyway.
pub const DEFAULT_CONFIGURATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-session tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
	pub configuration_timeout: Duration,
	/// Read the program locally and send its text with `loadSource`.
	/// Off for backends that read the file themselves.
	pub send_source_text: bool,
	/// First line number used by the backend (`0` or `1`).
	pub backend_line_base: u32,
	/// First column number used by the backend (`0` or `1`).
	pub backend_column_base: u32,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			configuration_timeout: DEFAULT_CONFIGURATION_TIMEOUT,
			send_source_text: true,
			backend_line_base: 0,
			backend_column_base: 0,
		}
	}
}
