//! msgport: a multi-connection TCP message server.
//!
//! Accepts many concurrent connections, runs one worker per connection and
//! dispatches each framed message to a single bound handler.
//!
//! # Guarantees
//!
//! - **Bounded**: at most `max_connections` workers exist; extra connections
//!   are closed on accept, never queued.
//! - **Conserving**: every admitted connection returns its permit exactly
//!   once, however its worker ends.
//! - **Contained**: protocol and socket failures end one connection; only
//!   clock skew and uncaught failures end the process, with distinct exit
//!   statuses.
//! - **Orderly**: the shutdown signal stops the accept loops and every worker
//!   at its next iteration.

pub mod cli;
pub mod clock;
pub mod config;
pub mod exit;
pub mod net;
pub mod shutdown;
pub mod telemetry;

pub use clock::CoarseClock;
pub use exit::ExitStatus;
pub use net::{
    EchoHandler, Fault, FaultClass, HandlerSlot, LastError, Message, MessageHandler,
    MessagePort, MessageServer, ServerConfig, ServerError,
};
pub use shutdown::{ShutdownSignal, ShutdownState};
