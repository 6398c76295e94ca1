//! The unit of traffic exchanged over a message port.
//!
//! A message is an opaque payload plus two ids: its own, and the id of the
//! request it answers (zero when it answers nothing). What the payload means
//! is the handler's business.

use std::sync::atomic::{AtomicU32, Ordering};

/// Bytes of the `id` and `response_to` fields that precede the payload.
pub const HEADER_LEN: usize = 8;

static NEXT_MESSAGE_ID: AtomicU32 = AtomicU32::new(1);

fn next_message_id() -> u32 {
    NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: u32,
    response_to: u32,
    payload: Vec<u8>,
}

impl Message {
    /// A fresh message with a process-unique id.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: next_message_id(),
            response_to: 0,
            payload: payload.into(),
        }
    }

    /// A reply to `request`.
    pub fn reply_to(request: &Message, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: next_message_id(),
            response_to: request.id,
            payload: payload.into(),
        }
    }

    pub(crate) fn from_parts(id: u32, response_to: u32, payload: Vec<u8>) -> Self {
        Self {
            id,
            response_to,
            payload,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn response_to(&self) -> u32 {
        self.response_to
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Size on the wire, excluding the length prefix.
    pub fn size(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}
