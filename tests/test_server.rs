//! End-to-end tests through the real reactor on an ephemeral port

use pollserve::client;
use pollserve::config::{Config, ListenConfig};
use pollserve::server::Reactor;
use pollserve::transfer::{FileResource, MemoryResource, Resource};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;

fn test_config(chunk_size: usize) -> Config {
    let mut cfg = Config::default();
    cfg.listen = ListenConfig {
        host: Some("127.0.0.1".to_string()),
        port: 0,
        backlog: 64,
    };
    cfg.transfer.chunk_size = chunk_size;
    cfg.registry.initial_capacity = 2;
    cfg
}

/// Starts a reactor on a background thread. It runs until the test process exits.
fn spawn_server<R: Resource + Send + 'static>(cfg: Config, resource: R) -> SocketAddr {
    let mut reactor = Reactor::bind(&cfg, resource).unwrap();
    let addr = reactor.local_addr();
    thread::spawn(move || reactor.run());
    addr
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[test]
fn test_single_client_receives_whole_resource() {
    let data = pattern(100_000);
    let addr = spawn_server(test_config(4096), MemoryResource::new(data.clone()));

    let mut received = Vec::new();
    let report = client::fetch("127.0.0.1", addr.port(), &mut received).unwrap();

    assert_eq!(report.bytes, data.len() as u64);
    assert_eq!(received, data);
}

#[test]
fn test_concurrent_clients_receive_identical_streams() {
    let data = pattern(250_000);
    let addr = spawn_server(test_config(8192), MemoryResource::new(data.clone()));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            thread::spawn(move || {
                let mut received = Vec::new();
                client::fetch("127.0.0.1", addr.port(), &mut received).unwrap();
                received
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), data);
    }
}

#[test]
fn test_serves_file_resource() {
    let data = pattern(10_000);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&data).unwrap();
    file.flush().unwrap();

    let addr = spawn_server(test_config(4096), FileResource::new(file.path()));

    let mut received = Vec::new();
    client::fetch("127.0.0.1", addr.port(), &mut received).unwrap();
    assert_eq!(received, data);
}

#[test]
fn test_missing_resource_closes_without_data() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(test_config(4096), FileResource::new(dir.path().join("missing")));

    let mut received = Vec::new();
    let report = client::fetch("127.0.0.1", addr.port(), &mut received).unwrap();
    assert_eq!(report.bytes, 0);

    // The server keeps serving after a failed connection.
    let report = client::fetch("127.0.0.1", addr.port(), &mut received).unwrap();
    assert_eq!(report.bytes, 0);
}

#[test]
fn test_slow_reader_gets_every_byte() {
    let data = pattern(2_000_000);
    let addr = spawn_server(test_config(16 * 1024), MemoryResource::new(data.clone()));

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(client::REQUEST).unwrap();

    let mut received = Vec::with_capacity(data.len());
    let mut buf = [0u8; 1000];
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
        if received.len() % 100_000 < 1000 {
            thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    assert_eq!(received.len(), data.len());
    assert_eq!(received, data);
}

#[test]
fn test_client_closing_early_does_not_stop_others() {
    let data = pattern(500_000);
    let addr = spawn_server(test_config(4096), MemoryResource::new(data.clone()));

    let mut quitter = TcpStream::connect(addr).unwrap();
    quitter.write_all(client::REQUEST).unwrap();
    let mut first = [0u8; 10];
    quitter.read_exact(&mut first).unwrap();
    drop(quitter);

    let mut received = Vec::new();
    client::fetch("127.0.0.1", addr.port(), &mut received).unwrap();
    assert_eq!(received, data);
}
