//! End-to-end tests for the bundled echo handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime::Handle;

use msgport::net::{
    EchoHandler, HandlerSlot, Message, MessagePort, MessageServer, ServerConfig, ThreadSpawner,
    WorkerSpawner, DEFAULT_MAX_FRAME_SIZE,
};
use msgport::{CoarseClock, ExitStatus};

fn config() -> ServerConfig {
    ServerConfig {
        bind_addresses: vec!["127.0.0.1".into()],
        port: 0,
        shutdown_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

async fn connect(addr: std::net::SocketAddr) -> MessagePort {
    let stream = TcpStream::connect(addr).await.unwrap();
    MessagePort::new(stream, "client", DEFAULT_MAX_FRAME_SIZE)
}

#[tokio::test]
async fn test_echo_with_time_tracker() {
    let clock = Arc::new(CoarseClock::default());
    let handler = Arc::new(EchoHandler::with_clock(Arc::clone(&clock)));
    let mut server = MessageServer::builder(config(), handler)
        .handler_slot(HandlerSlot::new())
        .clock(Arc::clone(&clock))
        .build()
        .unwrap();
    let addr = server.bind().await.unwrap()[0];
    let shutdown = server.shutdown_signal().clone();
    let counters = Arc::clone(server.counters());
    let run = tokio::spawn(server.run());

    let mut client = connect(addr).await;
    for i in 0..5u8 {
        let request = Message::new(vec![i; 16]);
        client.send(&request).await.unwrap();
        let reply = client.recv().await.unwrap().unwrap();
        assert_eq!(reply.response_to(), request.id());
        assert_eq!(reply.payload(), request.payload());
    }
    assert!(clock.now_millis() > 0, "time tracker refreshed the clock");

    let snapshot = counters.snapshot();
    assert!(snapshot.requests >= 4);
    assert!(snapshot.bytes_in > 0 && snapshot.bytes_out > 0);

    shutdown.request(ExitStatus::Clean);
    assert_eq!(run.await.unwrap().unwrap(), ExitStatus::Clean);
}

#[tokio::test]
async fn test_empty_message_closes_connection() {
    let mut server = MessageServer::builder(config(), Arc::new(EchoHandler::new()))
        .handler_slot(HandlerSlot::new())
        .build()
        .unwrap();
    let addr = server.bind().await.unwrap()[0];
    let shutdown = server.shutdown_signal().clone();
    let admission = Arc::clone(server.admission());
    let run = tokio::spawn(server.run());

    let mut client = connect(addr).await;
    client.send(&Message::new(Vec::new())).await.unwrap();
    assert!(!matches!(client.recv().await, Ok(Some(_))));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while admission.used() != 0 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!shutdown.is_requested());

    shutdown.request(ExitStatus::Clean);
    assert_eq!(run.await.unwrap().unwrap(), ExitStatus::Clean);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_thread_per_connection_spawner() {
    let spawner: Arc<dyn WorkerSpawner> = Arc::new(ThreadSpawner::new(Handle::current()));
    let mut server = MessageServer::builder(config(), Arc::new(EchoHandler::new()))
        .handler_slot(HandlerSlot::new())
        .spawner(spawner)
        .build()
        .unwrap();
    let addr = server.bind().await.unwrap()[0];
    let shutdown = server.shutdown_signal().clone();
    let run = tokio::spawn(server.run());

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(connect(addr).await);
    }
    for (i, client) in clients.iter_mut().enumerate() {
        let request = Message::new(format!("client {}", i).into_bytes());
        client.send(&request).await.unwrap();
        let reply = client.recv().await.unwrap().unwrap();
        assert_eq!(reply.payload(), request.payload());
    }

    shutdown.request(ExitStatus::Clean);
    assert_eq!(run.await.unwrap().unwrap(), ExitStatus::Clean);
}
