use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures of a client operation.
///
/// Transport trouble never shows up here: it ends the session through a
/// `terminated` event instead. What remains is split into failures the user
/// should see (see [`SessionError::is_user_visible`]) and internal ones.
#[derive(Debug, Error)]
pub enum SessionError {
	/// The backend refused to load or start the program.
	#[error("launch failed: {0}")]
	Launch(String),

	#[error("cannot read program {}: {source}", path.display())]
	SourceRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid arguments: {0}")]
	Arguments(String),

	/// The operation is not allowed in the current session state.
	#[error("{0}")]
	InvalidState(&'static str),

	/// The backend went away before answering.
	#[error("execution backend is unavailable")]
	BackendUnavailable,
}

impl SessionError {
	/// Whether the client should present this failure to the user.
	pub fn is_user_visible(&self) -> bool {
		matches!(self, SessionError::Launch(_) | SessionError::SourceRead { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn launch_failures_are_user_visible() {
		assert!(SessionError::Launch("syntax error on line 3".into()).is_user_visible());
		assert!(
			SessionError::SourceRead {
				path: PathBuf::from("/nope.txt"),
				source: std::io::Error::from(std::io::ErrorKind::NotFound),
			}
			.is_user_visible()
		);
		assert!(!SessionError::BackendUnavailable.is_user_visible());
		assert!(!SessionError::InvalidState("not launched").is_user_visible());
	}

	#[test]
	fn source_read_message_names_path() {
		let err = SessionError::SourceRead {
			path: PathBuf::from("/tmp/prog.txt"),
			source: std::io::Error::from(std::io::ErrorKind::NotFound),
		};
		assert!(err.to_string().starts_with("cannot read program /tmp/prog.txt"));
	}
}
