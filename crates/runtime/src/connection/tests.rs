use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

use super::*;
use crate::transport::StreamTransport;

/// Returns the connection plus the backend's ends: what it reads, what it writes.
fn create_test_connection(options: ConnectionOptions) -> (Connection, BackendEvents, DuplexStream, DuplexStream) {
	let (to_backend_read, to_backend_write) = duplex(64 * 1024);
	let (from_backend_read, from_backend_write) = duplex(64 * 1024);

	let (transport, message_rx) = StreamTransport::new(to_backend_write, from_backend_read);
	let parts = transport.into_transport_parts(message_rx);
	let (connection, events) = Connection::new(parts, options);

	(connection, events, to_backend_read, from_backend_write)
}

fn spawn_test_connection(options: ConnectionOptions) -> (Arc<Connection>, BackendEvents, DuplexStream, DuplexStream) {
	let (to_backend_read, to_backend_write) = duplex(64 * 1024);
	let (from_backend_read, from_backend_write) = duplex(64 * 1024);

	let (transport, message_rx) = StreamTransport::new(to_backend_write, from_backend_read);
	let (connection, events) = Connection::spawn(transport.into_transport_parts(message_rx), options);

	(connection, events, to_backend_read, from_backend_write)
}

async fn write_json(stream: &mut DuplexStream, value: Value) {
	stream.write_all(&serde_json::to_vec(&value).unwrap()).await.unwrap();
	stream.flush().await.unwrap();
}

#[test]
fn test_request_id_increments() {
	let (connection, _, _, _) = create_test_connection(ConnectionOptions::default());

	let id1 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let id2 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let id3 = connection.last_id.fetch_add(1, Ordering::SeqCst);

	assert_eq!(id1, 0);
	assert_eq!(id2, 1);
	assert_eq!(id3, 2);
}

#[tokio::test]
async fn test_dispatch_reply_success() {
	let (connection, _, _, _) = create_test_connection(ConnectionOptions::default());

	let (tx, rx) = oneshot::channel();
	connection.pending.insert(3, tx);

	let reply: Inbound = serde_json::from_value(json!({"id": 3, "result": {"ended": false}})).unwrap();
	connection.dispatch(reply);

	let result = rx.await.unwrap().unwrap();
	assert_eq!(result, json!({"ended": false}));
	assert_eq!(connection.pending_calls(), 0);
}

#[tokio::test]
async fn test_dispatch_reply_error() {
	let (connection, _, _, _) = create_test_connection(ConnectionOptions::default());

	let (tx, rx) = oneshot::channel();
	connection.pending.insert(0, tx);

	let reply: Inbound =
		serde_json::from_value(json!({"id": 0, "error": {"message": "no such file", "name": "LoadError"}})).unwrap();
	connection.dispatch(reply);

	let err = rx.await.unwrap().unwrap_err();
	assert!(err.is_remote());
	assert_eq!(err.error_name(), Some("LoadError"));
	assert!(err.to_string().contains("no such file"));
}

#[tokio::test]
async fn test_dispatch_event_is_forwarded() {
	let (connection, mut events, _, _) = create_test_connection(ConnectionOptions::default());

	let event: Inbound = serde_json::from_value(json!({"event": "stopOnBreakpoint"})).unwrap();
	connection.dispatch(event);

	assert_eq!(events.try_recv().unwrap(), BackendEvent::StopOnBreakpoint);
}

#[tokio::test]
async fn test_reply_for_unknown_id_is_ignored() {
	let (connection, mut events, _, _) = create_test_connection(ConnectionOptions::default());

	let (tx, mut rx) = oneshot::channel();
	connection.pending.insert(1, tx);

	let stray: Inbound = serde_json::from_value(json!({"id": 99, "result": {}})).unwrap();
	connection.dispatch(stray);

	assert_eq!(connection.pending_calls(), 1);
	assert!(rx.try_recv().is_err());
	assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_outgoing_keys_follow_key_case() {
	let (connection, _events, to_backend_read, mut from_backend_write) =
		spawn_test_connection(ConnectionOptions::default());

	let caller = {
		let connection = Arc::clone(&connection);
		tokio::spawn(async move { connection.call(Command::Start { stop_on_entry: true }).await })
	};

	let mut lines = BufReader::new(to_backend_read).lines();
	let line = lines.next_line().await.unwrap().unwrap();
	let sent: Value = serde_json::from_str(&line).unwrap();
	assert_eq!(
		sent,
		json!({"Id": 0, "Command": "start", "Args": {"StopOnEntry": true}})
	);

	// Pascal-cased reply folds back to camelCase for the caller.
	write_json(&mut from_backend_write, json!({"Id": 0, "Result": {"Error": null}})).await;
	assert_eq!(caller.await.unwrap(), json!({"error": null}));
}

#[tokio::test]
async fn test_concurrent_calls_resolve_out_of_order() {
	const CALLS: u32 = 8;

	let (connection, _events, to_backend_read, mut from_backend_write) =
		spawn_test_connection(ConnectionOptions::default());

	let mut callers = Vec::new();
	for line in 0..CALLS {
		let connection = Arc::clone(&connection);
		callers.push((
			line,
			tokio::spawn(async move { connection.call(Command::SetBreakpoint { line }).await }),
		));
	}

	// Collect every request, then answer newest first.
	let mut lines = BufReader::new(to_backend_read).lines();
	let mut requests = Vec::new();
	for _ in 0..CALLS {
		let line = lines.next_line().await.unwrap().unwrap();
		requests.push(serde_json::from_str::<Value>(&line).unwrap());
	}
	for request in requests.iter().rev() {
		let reply = json!({
			"Id": request["Id"],
			"Result": {"Verified": true, "Line": request["Args"]["Line"]}
		});
		write_json(&mut from_backend_write, reply).await;
	}

	for (line, caller) in callers {
		let result = caller.await.unwrap();
		assert_eq!(result, json!({"verified": true, "line": line}));
	}
	assert_eq!(connection.pending_calls(), 0);
}

#[tokio::test]
async fn test_event_before_reply_is_observed_first() {
	let (connection, mut events, to_backend_read, mut from_backend_write) =
		spawn_test_connection(ConnectionOptions::default());

	let caller = {
		let connection = Arc::clone(&connection);
		tokio::spawn(async move { connection.call(Command::Start { stop_on_entry: true }).await })
	};

	let mut lines = BufReader::new(to_backend_read).lines();
	lines.next_line().await.unwrap().unwrap();

	from_backend_write
		.write_all(br#"{"Event":"stopOnEntry"}{"Id":0,"Result":{}}"#)
		.await
		.unwrap();
	from_backend_write.flush().await.unwrap();

	assert_eq!(caller.await.unwrap(), json!({}));
	assert_eq!(events.try_recv().unwrap(), BackendEvent::StopOnEntry);
}

#[tokio::test]
async fn test_timeout_resolves_null_and_ends() {
	let options = ConnectionOptions {
		request_timeout: Some(Duration::from_millis(50)),
		..ConnectionOptions::default()
	};
	let (connection, mut events, _to_backend_read, _from_backend_write) = spawn_test_connection(options);

	let result = connection.call(Command::Step).await;

	assert_eq!(result, Value::Null);
	assert_eq!(events.recv().await.unwrap(), BackendEvent::End);
	assert_eq!(connection.pending_calls(), 0);
}

#[tokio::test]
async fn test_send_message_times_out() {
	let options = ConnectionOptions {
		request_timeout: Some(Duration::from_millis(20)),
		..ConnectionOptions::default()
	};
	let (connection, _events, _to_backend_read, _from_backend_write) = spawn_test_connection(options);

	let err = connection.send_message("step", json!({})).await.unwrap_err();

	assert!(err.is_timeout());
	assert!(!err.is_remote());
	assert_eq!(connection.pending_calls(), 0);
}

#[tokio::test]
async fn test_backend_error_reply_becomes_error_payload() {
	let (connection, mut events, to_backend_read, mut from_backend_write) =
		spawn_test_connection(ConnectionOptions::default());

	let caller = {
		let connection = Arc::clone(&connection);
		tokio::spawn(async move {
			connection
				.call(Command::LoadSource {
					path: "/missing.txt".into(),
					text: None,
				})
				.await
		})
	};

	let mut lines = BufReader::new(to_backend_read).lines();
	lines.next_line().await.unwrap().unwrap();
	write_json(&mut from_backend_write, json!({"Id": 0, "Error": "file not found"})).await;

	assert_eq!(caller.await.unwrap(), json!({"error": "file not found"}));
	assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_stream_close_fails_pending_and_ends_once() {
	let options = ConnectionOptions {
		request_timeout: None,
		..ConnectionOptions::default()
	};
	let (connection, mut events, to_backend_read, from_backend_write) = spawn_test_connection(options);

	let caller = {
		let connection = Arc::clone(&connection);
		tokio::spawn(async move { connection.call(Command::Step).await })
	};

	let mut lines = BufReader::new(to_backend_read).lines();
	lines.next_line().await.unwrap().unwrap();
	drop(from_backend_write);

	assert_eq!(caller.await.unwrap(), Value::Null);
	assert_eq!(events.recv().await.unwrap(), BackendEvent::End);
	assert!(connection.is_closed());

	// Calls after close resolve immediately without another End.
	assert_eq!(connection.call(Command::Step).await, Value::Null);
	assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_malformed_frame_ends_session() {
	let (connection, mut events, _to_backend_read, mut from_backend_write) =
		spawn_test_connection(ConnectionOptions::default());

	from_backend_write.write_all(b"{oops}").await.unwrap();
	from_backend_write.flush().await.unwrap();

	assert_eq!(events.recv().await.unwrap(), BackendEvent::End);
	assert!(connection.is_closed());
}

#[tokio::test]
async fn test_abandoned_call_is_removed() {
	let options = ConnectionOptions {
		request_timeout: None,
		..ConnectionOptions::default()
	};
	let (connection, _events, _to_backend_read, _from_backend_write) = spawn_test_connection(options);

	let abandoned = tokio::time::timeout(Duration::from_millis(20), connection.send_message("step", json!({}))).await;
	assert!(abandoned.is_err());
	assert_eq!(connection.pending_calls(), 0);
}

#[tokio::test]
async fn test_close_resolves_in_flight_calls() {
	let options = ConnectionOptions {
		request_timeout: None,
		..ConnectionOptions::default()
	};
	let (connection, mut events, to_backend_read, _from_backend_write) = spawn_test_connection(options);

	let caller = {
		let connection = Arc::clone(&connection);
		tokio::spawn(async move { connection.call(Command::GetVariables).await })
	};

	let mut lines = BufReader::new(to_backend_read).lines();
	lines.next_line().await.unwrap().unwrap();
	connection.close();

	assert_eq!(caller.await.unwrap(), Value::Null);
	assert_eq!(events.recv().await.unwrap(), BackendEvent::End);
}
