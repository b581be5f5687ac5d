use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::*;

#[tokio::test]
async fn test_send_message_is_newline_terminated_json() {
	// Transport writes into `to_backend_write`; the test reads the other end.
	let (to_backend_read, to_backend_write) = tokio::io::duplex(1024);
	let (from_backend_read, _from_backend_write) = tokio::io::duplex(1024);

	let (transport, _rx) = StreamTransport::new(to_backend_write, from_backend_read);
	let (mut sender, _receiver) = transport.into_parts();

	let message = serde_json::json!({"Id": 1, "Command": "step", "Args": {}});
	sender.send(message.clone()).await.unwrap();

	let mut lines = BufReader::new(to_backend_read).lines();
	let line = lines.next_line().await.unwrap().unwrap();
	let received: Value = serde_json::from_str(&line).unwrap();
	assert_eq!(received, message);
}

#[tokio::test]
async fn test_coalesced_and_split_messages() {
	let (_to_backend_read, to_backend_write) = tokio::io::duplex(4096);
	let (from_backend_read, mut from_backend_write) = tokio::io::duplex(4096);

	let (mut transport, mut rx) = StreamTransport::new(to_backend_write, from_backend_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	// Two whole messages and the head of a third in one write, the tail in another.
	from_backend_write
		.write_all(br#"{"Id":1,"Result":{}}{"Event":"stopOnEntry"}{"Id":2,"Res"#)
		.await
		.unwrap();
	from_backend_write.write_all(br#"ult":{"Ended":true}}"#).await.unwrap();
	from_backend_write.flush().await.unwrap();

	assert_eq!(rx.recv().await.unwrap(), serde_json::json!({"Id": 1, "Result": {}}));
	assert_eq!(rx.recv().await.unwrap(), serde_json::json!({"Event": "stopOnEntry"}));
	assert_eq!(
		rx.recv().await.unwrap(),
		serde_json::json!({"Id": 2, "Result": {"Ended": true}})
	);

	drop(from_backend_write);
	let result = read_task.await.unwrap();
	assert!(result.is_ok());
}

#[tokio::test]
async fn test_large_message() {
	let (_to_backend_read, to_backend_write) = tokio::io::duplex(1024 * 1024);
	let (from_backend_read, mut from_backend_write) = tokio::io::duplex(1024 * 1024);

	let (mut transport, mut rx) = StreamTransport::new(to_backend_write, from_backend_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	// Larger than one read chunk so the frame spans several reads.
	let large_string = "x".repeat(100_000);
	let large_message = serde_json::json!({"Event": "output", "Body": {"Text": large_string}});
	let bytes = serde_json::to_vec(&large_message).unwrap();
	assert!(bytes.len() > READ_CHUNK);

	from_backend_write.write_all(&bytes).await.unwrap();
	from_backend_write.flush().await.unwrap();

	let received = rx.recv().await.unwrap();
	assert_eq!(received, large_message);

	drop(from_backend_write);
	let _ = read_task.await;
}

#[tokio::test]
async fn test_eof_mid_message_is_error() {
	let (_to_backend_read, to_backend_write) = tokio::io::duplex(1024);
	let (from_backend_read, mut from_backend_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = StreamTransport::new(to_backend_write, from_backend_read);

	from_backend_write.write_all(br#"{"Id":1,"Res"#).await.unwrap();
	from_backend_write.flush().await.unwrap();
	drop(from_backend_write);

	let result = transport.run().await;
	let err = result.unwrap_err();
	assert!(err.to_string().contains("unfinished message"), "{err}");
}

#[tokio::test]
async fn test_malformed_frame_is_protocol_error() {
	let (_to_backend_read, to_backend_write) = tokio::io::duplex(1024);
	let (from_backend_read, mut from_backend_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = StreamTransport::new(to_backend_write, from_backend_read);

	from_backend_write.write_all(b"{not json}").await.unwrap();
	from_backend_write.flush().await.unwrap();

	let result = transport.run().await;
	assert!(matches!(result, Err(Error::ProtocolError(_))));
}

#[tokio::test]
async fn test_frame_limit_applies() {
	let (_to_backend_read, to_backend_write) = tokio::io::duplex(1024);
	let (from_backend_read, mut from_backend_write) = tokio::io::duplex(1024);

	let (transport, _rx) = StreamTransport::new(to_backend_write, from_backend_read);
	let mut transport = transport.with_max_frame_len(16);

	from_backend_write
		.write_all(br#"{"Event":"output","Body":{"Text":"#)
		.await
		.unwrap();
	from_backend_write.flush().await.unwrap();

	let result = transport.run().await;
	assert!(matches!(result, Err(Error::FrameTooLarge { max: 16, .. })));
}

#[tokio::test]
async fn test_graceful_shutdown() {
	let (_to_backend_read, to_backend_write) = tokio::io::duplex(1024);
	let (from_backend_read, mut from_backend_write) = tokio::io::duplex(1024);

	let (transport, mut rx) = StreamTransport::new(to_backend_write, from_backend_read);
	let (_sender, receiver) = transport.into_parts();
	let read_task = tokio::spawn(Box::new(receiver).run());

	from_backend_write.write_all(br#"{"Event":"end"}"#).await.unwrap();
	from_backend_write.flush().await.unwrap();

	assert_eq!(rx.recv().await.unwrap(), serde_json::json!({"Event": "end"}));

	drop(rx);
	drop(from_backend_write);

	let result = read_task.await.unwrap();
	assert!(result.is_ok());
}
