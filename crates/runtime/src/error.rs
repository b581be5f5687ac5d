//! Error types for the stepwire runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised between the adapter and the execution backend.
///
/// None of these escape a [`Backend`](crate::Backend) call: the backend
/// implementations convert them into a null result plus an `end` event.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to establish a connection with the backend.
	#[error("Failed to connect to backend: {0}")]
	ConnectionFailed(String),

	/// Byte-level transport failure.
	#[error("Transport error: {0}")]
	TransportError(String),

	/// A message arrived that could not be understood.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// The backend answered a command with an error.
	#[error("{name}: {message}")]
	Remote {
		/// Error name reported by the backend (`Error` when absent)
		name: String,
		/// Human-readable error message
		message: String,
	},

	/// A single inbound message grew past the configured limit.
	#[error("Frame of {len} bytes exceeds limit of {max} bytes")]
	FrameTooLarge { len: usize, max: usize },

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// HTTP request error.
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	/// No reply before the call's deadline.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The connection was closed while a call was outstanding.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,
}

impl Error {
	/// Returns the error name if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Timeout(_) => true,
			Error::Http(err) => err.is_timeout(),
			_ => false,
		}
	}

	/// Returns true when the backend itself answered, as opposed to the link failing.
	pub fn is_remote(&self) -> bool {
		matches!(self, Error::Remote { .. })
	}
}
