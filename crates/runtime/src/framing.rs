//! Balanced-brace re-framing of a JSON byte stream.
//!
//! The stream backend writes JSON objects back to back with no length prefix
//! or delimiter. Reads hand us arbitrary slices of that stream: a chunk may
//! hold a fragment of one object, several whole objects, or both. The framer
//! tracks `{`/`}` nesting depth (ignoring braces inside string literals) and
//! emits a frame each time depth returns to zero.

use tracing::trace;

use crate::error::{Error, Result};

/// Default cap on a single inbound frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Incremental splitter for concatenated JSON objects.
#[derive(Debug)]
pub struct BraceFramer {
	buf: Vec<u8>,
	/// Bytes of `buf` already scanned.
	scanned: usize,
	/// Start of the frame under construction, if any.
	start: Option<usize>,
	depth: usize,
	in_string: bool,
	escaped: bool,
	max_frame_len: usize,
}

impl Default for BraceFramer {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_FRAME_LEN)
	}
}

impl BraceFramer {
	pub fn new(max_frame_len: usize) -> Self {
		Self {
			buf: Vec::new(),
			scanned: 0,
			start: None,
			depth: 0,
			in_string: false,
			escaped: false,
			max_frame_len,
		}
	}

	/// Feeds a chunk and returns every frame it completed, in stream order.
	///
	/// # Errors
	///
	/// Returns [`Error::FrameTooLarge`] when an unfinished frame exceeds the limit.
	/// The framer should be discarded afterwards.
	pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
		self.buf.extend_from_slice(chunk);
		let mut frames = Vec::new();

		for i in self.scanned..self.buf.len() {
			let byte = self.buf[i];

			let Some(start) = self.start else {
				match byte {
					b'{' => {
						self.start = Some(i);
						self.depth = 1;
					}
					b'}' => trace!(target: "stepwire.framing", offset = i, "skipping stray close brace"),
					_ => {}
				}
				continue;
			};

			if self.in_string {
				if self.escaped {
					self.escaped = false;
				} else if byte == b'\\' {
					self.escaped = true;
				} else if byte == b'"' {
					self.in_string = false;
				}
				continue;
			}

			match byte {
				b'"' => self.in_string = true,
				b'{' => self.depth += 1,
				b'}' => {
					self.depth -= 1;
					if self.depth == 0 {
						frames.push(self.buf[start..=i].to_vec());
						self.start = None;
					}
				}
				_ => {}
			}
		}

		match self.start {
			Some(start) => {
				self.buf.drain(..start);
				self.start = Some(0);
				if self.buf.len() > self.max_frame_len {
					return Err(Error::FrameTooLarge {
						len: self.buf.len(),
						max: self.max_frame_len,
					});
				}
			}
			None => self.buf.clear(),
		}
		self.scanned = self.buf.len();

		Ok(frames)
	}

	/// True when no partial frame is buffered.
	pub fn is_idle(&self) -> bool {
		self.start.is_none()
	}

	/// Number of buffered bytes belonging to an unfinished frame.
	pub fn pending_len(&self) -> usize {
		self.buf.len()
	}
}
