use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid config file {}: {source}", path.display())]
	Config {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("no execution backend configured (use --backend-addr or --backend-url)")]
	NoBackend,

	#[error("both backendAddr and backendUrl are set; pick one transport")]
	ConflictingBackends,

	/// Malformed Debug Adapter Protocol framing from the client.
	#[error("DAP framing error: {0}")]
	Framing(String),

	#[error("DAP message of {len} bytes exceeds the {max} byte limit")]
	MessageTooLarge { len: usize, max: usize },

	#[error(transparent)]
	Backend(#[from] stepwire_runtime::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}
