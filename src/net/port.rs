//! Framed message port over a byte stream.
//!
//! Wire layout of one frame:
//!
//! ```text
//! [len: u32-le][id: u32-le][response_to: u32-le][payload: len - 8 bytes]
//! ```
//!
//! `len` covers everything after the prefix and is bounded by the port's
//! frame limit. The port counts the bytes it moves so the worker can report
//! each exchange to the network counters.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::{Message, HEADER_LEN};

/// Default frame limit: 48 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 48 * 1024 * 1024;

/// Smallest frame limit a server accepts.
pub const MIN_FRAME_LIMIT: usize = 4096;

/// Largest length the u32 prefix can carry.
pub const MAX_FRAME_LIMIT: usize = u32::MAX as usize;

/// Anything a port can run over: TCP streams, duplex pipes in tests.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

#[derive(Error, Debug)]
pub enum PortError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame too short: {size} bytes (header is 8)")]
    FrameTooShort { size: usize },

    /// `received` counts every byte of the frame read so far, prefix included.
    #[error("Connection closed mid-frame after {received} bytes")]
    Truncated { received: usize },

    #[error("Port is closed")]
    Closed,
}

pub struct MessagePort {
    stream: Box<dyn Transport>,
    peer: String,
    conn_id: u64,
    max_frame_size: usize,
    bytes_in: u64,
    bytes_out: u64,
    open: bool,
}

impl MessagePort {
    /// `max_frame_size` is capped at [`MAX_FRAME_LIMIT`].
    pub fn new(stream: impl Transport + 'static, peer: impl Into<String>, max_frame_size: usize) -> Self {
        Self {
            stream: Box::new(stream),
            peer: peer.into(),
            conn_id: 0,
            max_frame_size: max_frame_size.min(MAX_FRAME_LIMIT),
            bytes_in: 0,
            bytes_out: 0,
            open: true,
        }
    }

    pub fn with_conn_id(mut self, conn_id: u64) -> Self {
        self.conn_id = conn_id;
        self
    }

    /// Remote end, as a display string.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Connection number assigned at accept time (0 if never assigned).
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    pub fn clear_counters(&mut self) {
        self.bytes_in = 0;
        self.bytes_out = 0;
    }

    /// Read one complete message.
    ///
    /// `Ok(None)` means the peer closed cleanly between frames.
    pub async fn recv(&mut self) -> Result<Option<Message>, PortError> {
        if !self.open {
            return Err(PortError::Closed);
        }

        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self.stream.read(&mut len_buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(PortError::Truncated { received: filled });
            }
            filled += n;
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > self.max_frame_size {
            return Err(PortError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }
        if len < HEADER_LEN {
            return Err(PortError::FrameTooShort { size: len });
        }

        let mut body = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.stream.read(&mut body[filled..]).await?;
            if n == 0 {
                return Err(PortError::Truncated {
                    received: len_buf.len() + filled,
                });
            }
            filled += n;
        }
        self.bytes_in += (4 + len) as u64;

        let id = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        let response_to = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
        body.drain(..HEADER_LEN);

        tracing::debug!(
            peer = %self.peer,
            id,
            response_to,
            len,
            "recv"
        );
        Ok(Some(Message::from_parts(id, response_to, body)))
    }

    /// Write one message as a single frame.
    pub async fn send(&mut self, message: &Message) -> Result<(), PortError> {
        if !self.open {
            return Err(PortError::Closed);
        }

        let len = message.size();
        if len > self.max_frame_size {
            return Err(PortError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        let prefix = u32::try_from(len).map_err(|_| PortError::FrameTooLarge {
            size: len,
            max: self.max_frame_size,
        })?;

        let mut frame = Vec::with_capacity(4 + len);
        frame.extend_from_slice(&prefix.to_le_bytes());
        frame.extend_from_slice(&message.id().to_le_bytes());
        frame.extend_from_slice(&message.response_to().to_le_bytes());
        frame.extend_from_slice(message.payload());

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        self.bytes_out += frame.len() as u64;
        Ok(())
    }

    /// Answer `request` with `payload`.
    pub async fn reply(&mut self, request: &Message, payload: impl Into<Vec<u8>>) -> Result<(), PortError> {
        let response = Message::reply_to(request, payload);
        self.send(&response).await
    }

    /// Close the write side and mark the port closed. Safe to call twice.
    pub async fn shutdown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(peer = %self.peer, error = %e, "shutdown on closed socket");
        }
    }
}

impl std::fmt::Debug for MessagePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePort")
            .field("peer", &self.peer)
            .field("conn_id", &self.conn_id)
            .field("open", &self.open)
            .finish()
    }
}
