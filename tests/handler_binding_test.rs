//! One handler per process: a second server fails at construction.
//!
//! Everything touching the process-wide slot lives in one test, since test
//! functions in a binary run in parallel.

use std::sync::Arc;

use msgport::net::{EchoHandler, HandlerSlot, MessageServer, ServerConfig, ServerError};

fn config() -> ServerConfig {
    ServerConfig {
        port: 0,
        time_tracker: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_second_server_rejected_until_first_dropped() {
    let slot = HandlerSlot::process();
    assert!(!slot.is_bound());

    let mut first = MessageServer::new(config(), Arc::new(EchoHandler::new())).unwrap();
    assert!(slot.is_bound());
    let addrs = first.bind().await.unwrap();
    assert_eq!(addrs.len(), 1);

    // Fails before any socket is opened, even with an address that would
    // not bind.
    let busy = ServerConfig {
        port: addrs[0].port(),
        ..config()
    };
    let second = MessageServer::new(busy, Arc::new(EchoHandler::new()));
    assert!(matches!(second, Err(ServerError::HandlerAlreadyBound)));

    drop(first);
    assert!(!slot.is_bound());

    let third = MessageServer::new(config(), Arc::new(EchoHandler::new()));
    assert!(third.is_ok());
}

#[test]
fn test_invalid_address_fails_before_binding_handler() {
    let slot = HandlerSlot::new();
    let bad = ServerConfig {
        bind_addresses: vec!["300.1.1.1".into()],
        ..config()
    };
    let result = MessageServer::builder(bad, Arc::new(EchoHandler::new()))
        .handler_slot(slot.clone())
        .build();
    assert!(matches!(result, Err(ServerError::InvalidAddress(_))));
    assert!(!slot.is_bound());
}
