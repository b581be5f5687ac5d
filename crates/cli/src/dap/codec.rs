//! `Content-Length` framing of DAP messages.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CliError, Result};

/// Largest accepted message body.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

const CONTENT_LENGTH: &str = "content-length";

/// Reads one message body. `Ok(None)` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
	R: AsyncBufRead + Unpin,
{
	let mut content_length = None;
	let mut line = String::new();
	let mut saw_header = false;

	loop {
		line.clear();
		if reader.read_line(&mut line).await? == 0 {
			if saw_header {
				return Err(CliError::Framing("stream ended inside a header block".into()));
			}
			return Ok(None);
		}

		let header = line.trim_end_matches(['\r', '\n']);
		if header.is_empty() {
			if saw_header {
				break;
			}
			// Blank lines between messages.
			continue;
		}
		saw_header = true;

		let Some((name, value)) = header.split_once(':') else {
			return Err(CliError::Framing(format!("malformed header: {header}")));
		};
		if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
			let len = value
				.trim()
				.parse::<usize>()
				.map_err(|_| CliError::Framing(format!("bad Content-Length: {}", value.trim())))?;
			content_length = Some(len);
		}
	}

	let len = content_length.ok_or_else(|| CliError::Framing("missing Content-Length header".into()))?;
	if len > MAX_MESSAGE_LEN {
		return Err(CliError::MessageTooLarge {
			len,
			max: MAX_MESSAGE_LEN,
		});
	}

	let mut body = vec![0u8; len];
	reader.read_exact(&mut body).await?;
	Ok(Some(body))
}

/// Writes one message with its header and flushes.
pub async fn write_message<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let header = format!("Content-Length: {}\r\n\r\n", body.len());
	writer.write_all(header.as_bytes()).await?;
	writer.write_all(body).await?;
	writer.flush().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use tokio::io::BufReader;

	use super::*;

	#[tokio::test]
	async fn reads_consecutive_messages() {
		let input = b"Content-Length: 2\r\n\r\n{}Content-Length: 13\r\nContent-Type: application/json\r\n\r\n{\"seq\":1}    ";
		let mut reader = BufReader::new(&input[..]);

		assert_eq!(read_message(&mut reader).await.unwrap().unwrap(), b"{}");
		assert_eq!(read_message(&mut reader).await.unwrap().unwrap(), b"{\"seq\":1}    ");
		assert!(read_message(&mut reader).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn header_name_is_case_insensitive() {
		let input = b"content-length: 4\r\n\r\nnull";
		let mut reader = BufReader::new(&input[..]);
		assert_eq!(read_message(&mut reader).await.unwrap().unwrap(), b"null");
	}

	#[tokio::test]
	async fn missing_length_is_an_error() {
		let input = b"Content-Type: application/json\r\n\r\n{}";
		let mut reader = BufReader::new(&input[..]);
		assert!(matches!(read_message(&mut reader).await, Err(CliError::Framing(_))));
	}

	#[tokio::test]
	async fn truncated_body_is_an_error() {
		let input = b"Content-Length: 10\r\n\r\n{}";
		let mut reader = BufReader::new(&input[..]);
		assert!(matches!(read_message(&mut reader).await, Err(CliError::Io(_))));
	}

	#[tokio::test]
	async fn oversized_message_is_rejected() {
		let input = format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_LEN + 1);
		let mut reader = BufReader::new(input.as_bytes());
		assert!(matches!(
			read_message(&mut reader).await,
			Err(CliError::MessageTooLarge { .. })
		));
	}

	#[tokio::test]
	async fn write_then_read() {
		let mut out = Vec::new();
		write_message(&mut out, br#"{"seq":7}"#).await.unwrap();
		assert_eq!(out, b"Content-Length: 9\r\n\r\n{\"seq\":7}");

		let mut reader = BufReader::new(&out[..]);
		assert_eq!(read_message(&mut reader).await.unwrap().unwrap(), br#"{"seq":7}"#);
	}
}
