//! Blocking client for the wire protocol
//!
//! Sends `GET\n` and reads until the server closes the connection.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const REQUEST: &[u8] = b"GET\n";

/// What one fetch transferred.
#[derive(Debug, Clone, Copy)]
pub struct FetchReport {
    pub peer: SocketAddr,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Connects to the first address of `host:port` that accepts.
pub fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {host}:{port}"))?;

    for addr in addrs {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                debug!(%addr, "Connected");
                return Ok(stream);
            }
            Err(e) => warn!(%addr, error = %e, "Connect failed, trying next address"),
        }
    }

    anyhow::bail!("failed to connect to {host}:{port}")
}

/// Requests the resource and copies it into `out`.
pub fn fetch<W: Write + ?Sized>(host: &str, port: u16, out: &mut W) -> Result<FetchReport> {
    let mut stream = connect(host, port)?;
    let peer = stream.peer_addr()?;
    let start = Instant::now();

    stream.write_all(REQUEST).context("failed to send the request")?;
    let bytes = io::copy(&mut stream, out).context("failed to receive the resource")?;

    Ok(FetchReport {
        peer,
        bytes,
        elapsed: start.elapsed(),
    })
}
