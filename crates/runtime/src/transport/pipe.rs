//! Length-prefixed JSON framing over a byte pipe.
//!
//! Each frame is a little-endian `u32` byte count followed by that many bytes
//! of UTF-8 JSON. The pipe has exactly one peer, so the receiving end stamps
//! every frame with the peer origin it was constructed with and the sending
//! end applies target-origin filtering before anything is written.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::{Delivery, Transport, TransportParts, origin_matches};
use crate::{Error, Result};

/// Largest frame either end accepts.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Pipe transport before it is split.
///
/// `run()` reads frames until the pipe closes; `send()` writes one frame.
/// Most callers want [`into_transport_parts`](Self::into_transport_parts),
/// which spawns both loops and returns an endpoint usable by a Host or Bridge.
pub struct PipeTransport<W, R> {
	sender: PipeTransportSender<W>,
	receiver: PipeTransportReceiver<R>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Wraps a writer/reader pair. Inbound frames are delivered on the returned
	/// receiver as coming from `peer_origin`.
	pub fn new(writer: W, reader: R, peer_origin: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Delivery>) {
		let peer_origin = peer_origin.into();
		let (tx, rx) = mpsc::unbounded_channel();
		let transport = Self {
			sender: PipeTransportSender {
				writer,
				peer_origin: peer_origin.clone(),
			},
			receiver: PipeTransportReceiver { reader, peer_origin, tx },
		};
		(transport, rx)
	}

	pub async fn send(&mut self, message: Value, target_origin: &str) -> Result<()> {
		self.sender.send(message, target_origin).await
	}

	pub async fn run(&mut self) -> Result<()> {
		self.receiver.run().await
	}

	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(self.sender, self.receiver)
	}

	/// Spawns the reader and writer loops and returns a ready endpoint.
	///
	/// Must be called from within a Tokio runtime.
	pub fn into_transport_parts(self, inbox: mpsc::UnboundedReceiver<Delivery>) -> TransportParts {
		let (mut sender, mut receiver) = self.into_parts();
		let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<Value>();
		let peer_origin = sender.peer_origin.clone();

		tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				tracing::debug!(target = "canvas::transport", error = %e, "pipe reader stopped");
			}
		});

		tokio::spawn(async move {
			while let Some(message) = queue_rx.recv().await {
				if let Err(e) = sender.write_frame(&message).await {
					tracing::warn!(target = "canvas::transport", error = %e, "pipe write failed");
					break;
				}
			}
		});

		TransportParts {
			sender: Arc::new(QueuedPipeSender { peer_origin, queue_tx }),
			inbox,
		}
	}
}

/// Write half of a [`PipeTransport`].
pub struct PipeTransportSender<W> {
	writer: W,
	peer_origin: String,
}

impl<W: AsyncWrite + Unpin + Send> PipeTransportSender<W> {
	/// Writes `message` unless `target_origin` excludes the peer.
	pub async fn send(&mut self, message: Value, target_origin: &str) -> Result<()> {
		if !origin_matches(target_origin, &self.peer_origin) {
			tracing::debug!(target = "canvas::transport", target_origin, "dropping post for mismatched origin");
			return Ok(());
		}
		self.write_frame(&message).await
	}

	async fn write_frame(&mut self, message: &Value) -> Result<()> {
		let bytes = serde_json::to_vec(message)?;
		if bytes.len() > MAX_FRAME_BYTES {
			return Err(Error::FrameTooLarge(bytes.len()));
		}
		let length = bytes.len() as u32;
		self.writer.write_all(&length.to_le_bytes()).await?;
		self.writer.write_all(&bytes).await?;
		self.writer.flush().await?;
		Ok(())
	}
}

/// Read half of a [`PipeTransport`].
pub struct PipeTransportReceiver<R> {
	reader: R,
	peer_origin: String,
	tx: mpsc::UnboundedSender<Delivery>,
}

impl<R: AsyncRead + Unpin + Send> PipeTransportReceiver<R> {
	/// Reads frames until the pipe fails or nobody is listening.
	///
	/// A frame that is not valid JSON is skipped. An oversized length prefix
	/// ends the loop because the stream can no longer be resynchronized.
	pub async fn run(&mut self) -> Result<()> {
		loop {
			let mut len_buf = [0u8; 4];
			self.reader
				.read_exact(&mut len_buf)
				.await
				.map_err(|e| Error::TransportError(format!("Failed to read length prefix: {e}")))?;
			let length = u32::from_le_bytes(len_buf) as usize;
			if length > MAX_FRAME_BYTES {
				return Err(Error::FrameTooLarge(length));
			}

			let mut body = vec![0u8; length];
			self.reader
				.read_exact(&mut body)
				.await
				.map_err(|e| Error::TransportError(format!("Failed to read message body: {e}")))?;

			let data: Value = match serde_json::from_slice(&body) {
				Ok(data) => data,
				Err(e) => {
					tracing::warn!(target = "canvas::transport", error = %e, length, "skipping malformed frame");
					continue;
				}
			};

			if self.tx.send(Delivery::new(self.peer_origin.clone(), data)).is_err() {
				return Ok(());
			}
		}
	}
}

struct QueuedPipeSender {
	peer_origin: String,
	queue_tx: mpsc::UnboundedSender<Value>,
}

impl Transport for QueuedPipeSender {
	fn post(&self, message: Value, target_origin: &str) -> Result<()> {
		if !origin_matches(target_origin, &self.peer_origin) {
			tracing::debug!(target = "canvas::transport", target_origin, "dropping post for mismatched origin");
			return Ok(());
		}
		self.queue_tx.send(message).map_err(|_| Error::ChannelClosed)
	}
}
