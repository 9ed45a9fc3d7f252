use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use shc_device::{MemoryStore, NetworkScanner, SensorSource};
use shc_frame::{FrameAssembler, Op, RelayCodec, RelayFrame, COMPACT_FRAME_SIZE};
use shc_peripheral::{att, ChannelConfig, PeripheralService, RelayServer};
use shc_transport::RelaySocket;

struct StubScanner {
    calls: AtomicUsize,
}

#[async_trait]
impl NetworkScanner for StubScanner {
    async fn scan(&self) -> shc_device::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["Net-A".to_string(), "Net-B".to_string()])
    }
}

struct StubSensor;

#[async_trait]
impl SensorSource for StubSensor {
    async fn temperature(&self) -> shc_device::Result<f64> {
        Ok(21.5)
    }
}

fn make_sock_path(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/shc-relay-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir.join("relay.sock")
}

type Client = Framed<UnixStream, RelayCodec>;

async fn recv(client: &mut Client) -> RelayFrame {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("relay reply should arrive")
        .expect("relay should stay open")
        .expect("relay frame should decode")
}

async fn handle_of(client: &mut Client, name: &str) -> u16 {
    client.send(RelayFrame::empty(Op::Describe, 0)).await.unwrap();
    let table = recv(client).await;
    assert_eq!(table.op, Op::ServiceTable);
    let table: serde_json::Value = serde_json::from_slice(&table.payload).unwrap();
    table["characteristics"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == name)
        .and_then(|c| c["handle"].as_u64())
        .map(|h| h as u16)
        .unwrap_or_else(|| panic!("no characteristic named {name}"))
}

#[tokio::test]
async fn network_discovery_over_relay() {
    let sock_path = make_sock_path("discovery");
    let scanner = Arc::new(StubScanner {
        calls: AtomicUsize::new(0),
    });
    let config = ChannelConfig {
        poll_interval: Duration::from_millis(20),
        ..ChannelConfig::default()
    };
    let service = PeripheralService::standard(
        Arc::new(MemoryStore::new()),
        scanner.clone(),
        Arc::new(StubSensor),
        config,
    )
    .unwrap();
    let server = Arc::new(RelayServer::bind(&sock_path, Arc::new(service)).unwrap());
    let shutdown = CancellationToken::new();
    let server_task = {
        let server = server.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.serve(shutdown).await })
    };

    let stream = RelaySocket::connect(&sock_path).await.unwrap();
    let mut client = Framed::new(stream, RelayCodec::new());

    let trigger = handle_of(&mut client, "networks-trigger").await;
    let notify = handle_of(&mut client, "networks").await;

    // A start followed by a stop before any producer polls cancels the
    // request: subscribing afterwards must not scan.
    client
        .send(RelayFrame::new(Op::Write, trigger, vec![0x79]))
        .await
        .unwrap();
    assert_eq!(recv(&mut client).await.payload.as_ref(), &[att::SUCCESS]);
    client
        .send(RelayFrame::new(Op::Write, trigger, vec![0x00]))
        .await
        .unwrap();
    assert_eq!(recv(&mut client).await.payload.as_ref(), &[att::SUCCESS]);
    client
        .send(RelayFrame::empty(Op::Subscribe, notify))
        .await
        .unwrap();

    let quiet = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(quiet.is_err(), "cancelled request must not stream");
    assert_eq!(scanner.calls.load(Ordering::SeqCst), 0);

    client
        .send(RelayFrame::new(Op::Write, trigger, vec![0x79]))
        .await
        .unwrap();

    let mut assembler = FrameAssembler::new(COMPACT_FRAME_SIZE).unwrap();
    loop {
        let frame = recv(&mut client).await;
        match frame.op {
            Op::WriteResponse => {
                assert_eq!(frame.handle, trigger);
                assert_eq!(frame.payload.as_ref(), &[att::SUCCESS]);
            }
            Op::Notify => {
                assert_eq!(frame.handle, notify);
                assembler.push(&frame.payload).unwrap();
            }
            Op::NotifyEnd => break,
            other => panic!("unexpected op {}", other.name()),
        }
    }
    let payload: serde_json::Value = serde_json::from_slice(&assembler.finish()).unwrap();
    assert_eq!(payload, serde_json::json!({ "ssids": ["Net-A", "Net-B"] }));

    // The grant was consumed by the transfer above; nothing more follows.
    let extra = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(extra.is_err(), "no further frames expected");
    assert_eq!(scanner.calls.load(Ordering::SeqCst), 1);

    drop(client);
    shutdown.cancel();
    server_task.await.unwrap().unwrap();
    if let Some(parent) = sock_path.parent() {
        let _ = std::fs::remove_dir_all(parent);
    }
}

#[tokio::test]
async fn rejected_write_reports_status_and_keeps_value() {
    let sock_path = make_sock_path("reject");
    let store = Arc::new(MemoryStore::new());
    let service = PeripheralService::standard(
        store.clone(),
        Arc::new(StubScanner {
            calls: AtomicUsize::new(0),
        }),
        Arc::new(StubSensor),
        ChannelConfig::default(),
    )
    .unwrap();
    let server = Arc::new(RelayServer::bind(&sock_path, Arc::new(service)).unwrap());
    let shutdown = CancellationToken::new();
    let server_task = {
        let server = server.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.serve(shutdown).await })
    };

    let stream = RelaySocket::connect(&sock_path).await.unwrap();
    let mut client = Framed::new(stream, RelayCodec::new());
    let read = handle_of(&mut client, "environment").await;
    let write = handle_of(&mut client, "environment-write").await;

    client
        .send(RelayFrame::new(Op::Write, write, b"prod".to_vec()))
        .await
        .unwrap();
    assert_eq!(recv(&mut client).await.payload.as_ref(), &[att::SUCCESS]);

    client
        .send(RelayFrame::new(Op::Write, write, b"qa".to_vec()))
        .await
        .unwrap();
    assert_eq!(
        recv(&mut client).await.payload.as_ref(),
        &[att::VALUE_NOT_ALLOWED]
    );

    client.send(RelayFrame::empty(Op::Read, read)).await.unwrap();
    let value = recv(&mut client).await;
    assert_eq!(value.op, Op::ReadResponse);
    assert_eq!(value.payload.as_ref(), b"prod");

    client.send(RelayFrame::empty(Op::Read, 0x7fff)).await.unwrap();
    let err = recv(&mut client).await;
    assert_eq!(err.op, Op::Error);
    assert_eq!(err.payload[0], att::INVALID_HANDLE);

    // Ops flowing bridge-to-daemon are refused when they come back in.
    client
        .send(RelayFrame::new(Op::Notify, read, b"spoof".to_vec()))
        .await
        .unwrap();
    let err = recv(&mut client).await;
    assert_eq!(err.op, Op::Error);
    assert_eq!(err.handle, read);
    assert_eq!(err.payload[0], att::REQUEST_NOT_SUPPORTED);

    drop(client);
    shutdown.cancel();
    server_task.await.unwrap().unwrap();
    if let Some(parent) = sock_path.parent() {
        let _ = std::fs::remove_dir_all(parent);
    }
}
