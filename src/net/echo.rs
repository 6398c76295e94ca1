//! Bundled handler: replies to every message with its own payload.

use std::sync::Arc;

use async_trait::async_trait;

use super::fault::Fault;
use super::handler::MessageHandler;
use super::last_error::LastError;
use super::message::Message;
use super::port::MessagePort;
use crate::clock::CoarseClock;

/// Error code recorded for an empty request.
pub const EMPTY_PAYLOAD: u32 = 40;

#[derive(Debug, Default, Clone)]
pub struct EchoHandler {
    clock: Option<Arc<CoarseClock>>,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `clock` for skew before every reply.
    pub fn with_clock(clock: Arc<CoarseClock>) -> Self {
        Self { clock: Some(clock) }
    }
}

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn connected(&self, port: &mut MessagePort) {
        tracing::debug!(peer = %port.peer(), "echo session started");
    }

    async fn process(
        &self,
        message: Message,
        port: &mut MessagePort,
        last_error: &mut LastError,
    ) -> Result<(), Fault> {
        if message.payload().is_empty() {
            last_error.record(EMPTY_PAYLOAD, "empty message");
            return Err(Fault::protocol(EMPTY_PAYLOAD, "empty message"));
        }
        if let Some(clock) = &self.clock {
            clock.check()?;
        }
        let reply = Message::reply_to(&message, message.payload());
        port.send(&reply).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::fault::FaultClass;
    use crate::net::port::DEFAULT_MAX_FRAME_SIZE;

    fn pair() -> (MessagePort, MessagePort) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            MessagePort::new(a, "client", DEFAULT_MAX_FRAME_SIZE),
            MessagePort::new(b, "server", DEFAULT_MAX_FRAME_SIZE),
        )
    }

    #[tokio::test]
    async fn echoes_payload_with_response_to() {
        let (mut client, mut server) = pair();
        let handler = EchoHandler::new();
        let mut last_error = LastError::new();

        let request = Message::new(b"ping".to_vec());
        handler
            .process(request.clone(), &mut server, &mut last_error)
            .await
            .unwrap();

        let reply = client.recv().await.unwrap().unwrap();
        assert_eq!(reply.payload(), b"ping");
        assert_eq!(reply.response_to(), request.id());
        assert!(!last_error.is_set());
    }

    #[tokio::test]
    async fn empty_payload_is_protocol_fault() {
        let (_client, mut server) = pair();
        let handler = EchoHandler::new();
        let mut last_error = LastError::new();

        let err = handler
            .process(Message::new(Vec::new()), &mut server, &mut last_error)
            .await
            .unwrap_err();
        assert_eq!(err.class(), FaultClass::Recoverable);
        assert_eq!(last_error.code(), Some(EMPTY_PAYLOAD));
        assert_eq!(last_error.message(), Some("empty message"));
    }

    #[tokio::test]
    async fn closed_peer_is_transport_fault() {
        let (client, mut server) = pair();
        drop(client);
        let handler = EchoHandler::new();
        let mut last_error = LastError::new();

        // The first write may land in the pipe buffer; the port fails once
        // the other end is gone.
        let mut result = Ok(());
        for _ in 0..4 {
            result = handler
                .process(Message::new(b"x".to_vec()), &mut server, &mut last_error)
                .await;
            if result.is_err() {
                break;
            }
        }
        let err = result.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
