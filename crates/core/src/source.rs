//! Program text access.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;

use tracing::debug;

pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = io::Result<String>> + Send + 'a>>;

/// Reads program text for a path. Injected into the session so tests can stub it.
pub trait SourceReader: Send + Sync {
	fn read<'a>(&'a self, path: &'a Path) -> SourceFuture<'a>;
}

/// Reads from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceReader;

impl SourceReader for FsSourceReader {
	fn read<'a>(&'a self, path: &'a Path) -> SourceFuture<'a> {
		Box::pin(async move {
			let text = tokio::fs::read_to_string(path).await?;
			debug!(target: "stepwire.source", path = %path.display(), bytes = text.len(), "read program");
			Ok(text)
		})
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[tokio::test]
	async fn reads_file_contents() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "one\ntwo\nthree\n").unwrap();

		let text = FsSourceReader.read(file.path()).await.unwrap();
		assert_eq!(text.lines().count(), 3);
	}

	#[tokio::test]
	async fn missing_file_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let err = FsSourceReader.read(&dir.path().join("absent.txt")).await.unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::NotFound);
	}
}
