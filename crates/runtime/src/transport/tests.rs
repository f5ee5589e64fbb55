use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::*;

const BRIDGE: &str = "null";
const HOST: &str = "app://canvas-host";

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) {
	let bytes = serde_json::to_vec(message).unwrap();
	writer.write_all(&(bytes.len() as u32).to_le_bytes()).await.unwrap();
	writer.write_all(&bytes).await.unwrap();
	writer.flush().await.unwrap();
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Value {
	let mut len_buf = [0u8; 4];
	reader.read_exact(&mut len_buf).await.unwrap();
	let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
	reader.read_exact(&mut body).await.unwrap();
	serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn channel_pair_stamps_sender_origin() {
	let (host, mut bridge) = channel_pair(HOST, BRIDGE);

	host.sender.post(json!({"type": "ping", "reqId": "r1"}), "*").unwrap();

	let delivery = bridge.inbox.recv().await.unwrap();
	assert_eq!(delivery.origin, HOST);
	assert_eq!(delivery.data["type"], "ping");
}

#[tokio::test]
async fn channel_pair_drops_mismatched_target_origin() {
	let (mut host, bridge) = channel_pair(HOST, BRIDGE);

	bridge.sender.post(json!({"type": "ok"}), "https://evil.example").unwrap();
	bridge.sender.post(json!({"type": "ok", "reqId": "kept"}), HOST).unwrap();

	let delivery = host.inbox.recv().await.unwrap();
	assert_eq!(delivery.data["reqId"], "kept");
	assert!(host.inbox.try_recv().is_err());
}

#[tokio::test]
async fn channel_post_fails_once_peer_is_gone() {
	let (host, bridge) = channel_pair(HOST, BRIDGE);
	drop(bridge);

	let err = host.sender.post(json!({"type": "ping"}), "*").unwrap_err();
	assert!(err.is_closed());
}

#[tokio::test]
async fn pipe_send_writes_length_prefixed_json() {
	let (mut peer_read, transport_write) = tokio::io::duplex(1024);
	let (transport_read, _peer_write) = tokio::io::duplex(1024);

	let (transport, _rx) = PipeTransport::new(transport_write, transport_read, BRIDGE);
	let (mut sender, _receiver) = transport.into_parts();

	let message = json!({"type": "init", "reqId": "a", "payload": {"caps": {}}});
	sender.send(message.clone(), "*").await.unwrap();

	assert_eq!(read_frame(&mut peer_read).await, message);
}

#[tokio::test]
async fn pipe_reader_delivers_frames_in_order() {
	let (_peer_read, transport_write) = tokio::io::duplex(4096);
	let (transport_read, mut peer_write) = tokio::io::duplex(4096);

	let (mut transport, mut rx) = PipeTransport::new(transport_write, transport_read, BRIDGE);
	let read_task = tokio::spawn(async move { transport.run().await });

	let messages = vec![
		json!({"type": "bridge.ready", "reqId": null}),
		json!({"type": "ok", "reqId": "1"}),
		json!({"type": "err", "reqId": "2"}),
	];
	for msg in &messages {
		write_frame(&mut peer_write, msg).await;
	}

	for expected in &messages {
		let delivery = rx.recv().await.unwrap();
		assert_eq!(delivery.origin, BRIDGE);
		assert_eq!(&delivery.data, expected);
	}

	drop(peer_write);
	drop(rx);
	let _ = read_task.await;
}

#[tokio::test]
async fn pipe_reader_handles_large_frames() {
	let (_peer_read, transport_write) = tokio::io::duplex(1024 * 1024);
	let (transport_read, mut peer_write) = tokio::io::duplex(1024 * 1024);

	let (mut transport, mut rx) = PipeTransport::new(transport_write, transport_read, BRIDGE);
	let read_task = tokio::spawn(async move { transport.run().await });

	let large = json!({"type": "ok", "reqId": "big", "payload": {"text": "x".repeat(600_000)}});
	write_frame(&mut peer_write, &large).await;

	assert_eq!(rx.recv().await.unwrap().data, large);

	drop(peer_write);
	drop(rx);
	let _ = read_task.await;
}

#[tokio::test]
async fn pipe_reader_skips_malformed_json() {
	let (_peer_read, transport_write) = tokio::io::duplex(1024);
	let (transport_read, mut peer_write) = tokio::io::duplex(1024);

	let (mut transport, mut rx) = PipeTransport::new(transport_write, transport_read, BRIDGE);
	let read_task = tokio::spawn(async move { transport.run().await });

	let garbage = b"{not json";
	peer_write.write_all(&(garbage.len() as u32).to_le_bytes()).await.unwrap();
	peer_write.write_all(garbage).await.unwrap();
	write_frame(&mut peer_write, &json!({"type": "ok", "reqId": "after"})).await;

	assert_eq!(rx.recv().await.unwrap().data["reqId"], "after");

	drop(peer_write);
	drop(rx);
	let _ = read_task.await;
}

#[tokio::test]
async fn pipe_reader_rejects_oversized_prefix() {
	let (_peer_read, transport_write) = tokio::io::duplex(1024);
	let (transport_read, mut peer_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = PipeTransport::new(transport_write, transport_read, BRIDGE);

	let length = (MAX_FRAME_BYTES as u32) + 1;
	peer_write.write_all(&length.to_le_bytes()).await.unwrap();
	peer_write.flush().await.unwrap();

	let err = transport.run().await.unwrap_err();
	assert!(matches!(err, Error::FrameTooLarge(n) if n == MAX_FRAME_BYTES + 1));
}

#[tokio::test]
async fn test_malformed_length_prefix() {
	let (_peer_read, transport_write) = tokio::io::duplex(1024);
	let (transport_read, mut peer_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = PipeTransport::new(transport_write, transport_read, BRIDGE);

	peer_write.write_all(&[0x01, 0x02]).await.unwrap();
	peer_write.flush().await.unwrap();
	drop(peer_write);

	let result = transport.run().await;
	assert!(result.unwrap_err().to_string().contains("Failed to read length prefix"));
}

#[tokio::test]
async fn test_broken_pipe() {
	let (_peer_read, transport_write) = tokio::io::duplex(1024);
	let (transport_read, peer_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = PipeTransport::new(transport_write, transport_read, BRIDGE);
	drop(peer_write);

	let read_task = tokio::spawn(async move { transport.run().await });
	assert!(read_task.await.unwrap().is_err());
}

#[tokio::test]
async fn pipe_transport_parts_round_trip() {
	let (mut peer_read, transport_write) = tokio::io::duplex(4096);
	let (transport_read, mut peer_write) = tokio::io::duplex(4096);

	let (transport, inbox) = PipeTransport::new(transport_write, transport_read, BRIDGE);
	let mut parts = transport.into_transport_parts(inbox);

	parts.sender.post(json!({"type": "ping", "reqId": "p"}), "*").unwrap();
	parts.sender.post(json!({"type": "ping", "reqId": "dropped"}), HOST).unwrap();
	assert_eq!(read_frame(&mut peer_read).await["reqId"], "p");

	write_frame(&mut peer_write, &json!({"type": "ok", "reqId": "p"})).await;
	let delivery = parts.inbox.recv().await.unwrap();
	assert_eq!(delivery.origin, BRIDGE);
	assert_eq!(delivery.data["type"], "ok");
}
