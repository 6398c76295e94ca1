//! TCP message server.
//!
//! A [`MessageServer`] listens on one or more addresses. Each admitted
//! connection gets its own worker that reads framed [`Message`]s from a
//! [`MessagePort`] and hands them to the bound [`MessageHandler`]. An
//! [`AdmissionController`] caps how many workers exist at once.

pub mod admission;
pub mod echo;
pub mod fault;
pub mod handler;
pub mod last_error;
mod listener;
pub mod message;
pub mod port;
pub mod server;
pub mod spawn;
pub mod worker;

pub use admission::{AdmissionConfig, AdmissionController, DrainResult, Permit};
pub use echo::EchoHandler;
pub use fault::{Fault, FaultClass};
pub use handler::{HandlerBinding, HandlerSlot, MessageHandler};
pub use last_error::LastError;
pub use listener::TIME_TRACK_INTERVAL;
pub use message::{Message, HEADER_LEN};
pub use port::{
    MessagePort, PortError, Transport, DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_LIMIT, MIN_FRAME_LIMIT,
};
pub use server::{MessageServer, ServerBuilder, ServerConfig, ServerError};
pub use spawn::{SpawnError, ThreadSpawner, TokioSpawner, WorkerSpawner};
pub use worker::{serve_connection, WorkerContext, WorkerExit};
