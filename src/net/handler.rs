//! The handler capability and its one-per-process binding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use super::fault::Fault;
use super::last_error::LastError;
use super::message::Message;
use super::port::MessagePort;
use super::server::ServerError;

/// Callbacks a server invokes for each connection.
///
/// For one connection the calls never overlap: `connected` once, then zero or
/// more `process`, then `disconnected` once. Different connections call in
/// parallel, so implementations share state through `&self` only.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn connected(&self, _port: &mut MessagePort) {}

    /// Handle one inbound message. Returning `Err` ends the connection, and
    /// the fault's class decides whether it also ends the process.
    async fn process(
        &self,
        message: Message,
        port: &mut MessagePort,
        last_error: &mut LastError,
    ) -> Result<(), Fault>;

    async fn disconnected(&self, _port: &mut MessagePort) {}
}

/// Claim that at most one handler is bound at a time.
///
/// Servers use [`HandlerSlot::process`] unless given another slot, which makes
/// a second concurrently constructed server a configuration error.
#[derive(Clone, Default)]
pub struct HandlerSlot {
    bound: Arc<AtomicBool>,
}

static PROCESS_SLOT: OnceLock<HandlerSlot> = OnceLock::new();

impl HandlerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide slot.
    pub fn process() -> HandlerSlot {
        PROCESS_SLOT.get_or_init(HandlerSlot::new).clone()
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    /// Bind `handler`, failing if another binding is still alive.
    pub fn bind(&self, handler: Arc<dyn MessageHandler>) -> Result<HandlerBinding, ServerError> {
        self.bound
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ServerError::HandlerAlreadyBound)?;
        Ok(HandlerBinding {
            handler,
            slot: self.clone(),
        })
    }
}

/// A live binding. Dropping it frees the slot.
pub struct HandlerBinding {
    handler: Arc<dyn MessageHandler>,
    slot: HandlerSlot,
}

impl HandlerBinding {
    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }
}

impl Drop for HandlerBinding {
    fn drop(&mut self) {
        self.slot.bound.store(false, Ordering::SeqCst);
    }
}
