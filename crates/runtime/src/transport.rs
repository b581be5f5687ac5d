//! Byte-stream transport to the execution backend.
//!
//! Outgoing messages are written as compact JSON followed by a newline.
//! Incoming bytes are re-framed with [`BraceFramer`] and each complete frame
//! is parsed and forwarded over an unbounded channel to the connection's
//! dispatch loop.
//!
//! The transport is generic over `AsyncRead`/`AsyncWrite` so tests can drive
//! it with `tokio::io::duplex`; production code connects over TCP.

#[cfg(test)]
mod tests;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::framing::{BraceFramer, DEFAULT_MAX_FRAME_LEN};

const READ_CHUNK: usize = 8 * 1024;

/// Boxed future returned by transport halves.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Writing half of a transport.
pub trait TransportSender: Send {
	/// Writes one message.
	fn send(&mut self, message: Value) -> TransportFuture<'_, ()>;
}

/// Reading half of a transport.
pub trait TransportReceiver: Send {
	/// Reads until EOF or error, forwarding each parsed message.
	///
	/// Returns `Ok(())` on a clean close at a frame boundary.
	fn run(self: Box<Self>) -> TransportFuture<'static, ()>;
}

/// Both transport halves plus the channel the receiver feeds.
pub struct TransportParts {
	pub sender: Box<dyn TransportSender>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Transport over any async byte stream pair.
pub struct StreamTransport<W, R> {
	writer: W,
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
	max_frame_len: usize,
}

impl<W, R> StreamTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport and the receiver of parsed inbound messages.
	pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(
			Self {
				writer,
				reader,
				message_tx,
				max_frame_len: DEFAULT_MAX_FRAME_LEN,
			},
			message_rx,
		)
	}

	/// Overrides the inbound frame size limit.
	pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
		self.max_frame_len = max_frame_len;
		self
	}

	/// Runs the read loop in place. Mostly useful in tests.
	pub async fn run(&mut self) -> Result<()> {
		read_loop(&mut self.reader, &self.message_tx, self.max_frame_len).await
	}

	/// Splits into independently owned halves.
	pub fn into_parts(self) -> (StreamTransportSender<W>, StreamTransportReceiver<R>) {
		(
			StreamTransportSender { writer: self.writer },
			StreamTransportReceiver {
				reader: self.reader,
				message_tx: self.message_tx,
				max_frame_len: self.max_frame_len,
			},
		)
	}

	/// Boxes both halves for [`Connection::new`](crate::Connection::new).
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

impl StreamTransport<OwnedWriteHalf, OwnedReadHalf> {
	/// Connects to a backend listening on `addr`.
	pub async fn connect(addr: &str) -> Result<TransportParts> {
		let stream = TcpStream::connect(addr)
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{addr}: {e}")))?;
		stream.set_nodelay(true)?;
		debug!(target: "stepwire.transport", addr, "connected to backend");

		let (reader, writer) = stream.into_split();
		let (transport, message_rx) = StreamTransport::new(writer, reader);
		Ok(transport.into_transport_parts(message_rx))
	}
}

/// Writing half of a [`StreamTransport`].
pub struct StreamTransportSender<W> {
	writer: W,
}

impl<W> StreamTransportSender<W>
where
	W: AsyncWrite + Unpin + Send,
{
	pub async fn send(&mut self, message: Value) -> Result<()> {
		let mut bytes = serde_json::to_vec(&message)?;
		bytes.push(b'\n');
		trace!(target: "stepwire.transport", len = bytes.len(), "writing message");

		self.writer
			.write_all(&bytes)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to write message: {e}")))?;
		self.writer
			.flush()
			.await
			.map_err(|e| Error::TransportError(format!("Failed to flush message: {e}")))?;
		Ok(())
	}
}

impl<W> TransportSender for StreamTransportSender<W>
where
	W: AsyncWrite + Unpin + Send,
{
	fn send(&mut self, message: Value) -> TransportFuture<'_, ()> {
		Box::pin(StreamTransportSender::send(self, message))
	}
}

/// Reading half of a [`StreamTransport`].
pub struct StreamTransportReceiver<R> {
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
	max_frame_len: usize,
}

impl<R> TransportReceiver for StreamTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	fn run(self: Box<Self>) -> TransportFuture<'static, ()> {
		Box::pin(async move {
			let StreamTransportReceiver {
				mut reader,
				message_tx,
				max_frame_len,
			} = *self;
			read_loop(&mut reader, &message_tx, max_frame_len).await
		})
	}
}

async fn read_loop<R>(reader: &mut R, message_tx: &mpsc::UnboundedSender<Value>, max_frame_len: usize) -> Result<()>
where
	R: AsyncRead + Unpin,
{
	let mut framer = BraceFramer::new(max_frame_len);
	let mut chunk = vec![0u8; READ_CHUNK];

	loop {
		let n = reader
			.read(&mut chunk)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read from backend: {e}")))?;

		if n == 0 {
			if framer.is_idle() {
				debug!(target: "stepwire.transport", "backend closed the stream");
				return Ok(());
			}
			return Err(Error::TransportError(format!(
				"Stream closed with {} bytes of an unfinished message",
				framer.pending_len()
			)));
		}

		for frame in framer.push(&chunk[..n])? {
			let message: Value = serde_json::from_slice(&frame)
				.map_err(|e| Error::ProtocolError(format!("Malformed message from backend: {e}")))?;

			if message_tx.send(message).is_err() {
				debug!(target: "stepwire.transport", "message receiver dropped, stopping reader");
				return Ok(());
			}
		}
	}
}
