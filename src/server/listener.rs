use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use tracing::{info, warn};

use crate::config::ListenConfig;
use crate::server::Handle;

/// The bound, non-blocking listening socket.
#[derive(Debug)]
pub struct Listener {
    socket: TcpListener,
    handle: Handle,
    local_addr: SocketAddr,
}

impl Listener {
    /// Resolves the configured address and binds the first candidate that works.
    ///
    /// Without a host the passive wildcards are tried, IPv6 first so that a
    /// dual-stack socket can take IPv4 peers as well.
    pub fn bind(cfg: &ListenConfig, handle: Handle) -> Result<Self> {
        let candidates: Vec<SocketAddr> = match &cfg.host {
            Some(host) => (host.as_str(), cfg.port)
                .to_socket_addrs()
                .with_context(|| format!("failed to resolve {host}:{}", cfg.port))?
                .collect(),
            None => vec![
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, cfg.port)),
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.port)),
            ],
        };

        for addr in &candidates {
            match create_listener(*addr, cfg.backlog) {
                Ok(socket) => {
                    let local_addr = socket.local_addr()?;
                    info!(%local_addr, "Listening");
                    return Ok(Self {
                        socket,
                        handle,
                        local_addr,
                    });
                }
                Err(e) => warn!(%addr, error = %e, "Could not bind, trying next address"),
            }
        }

        anyhow::bail!("no usable address to listen on among {candidates:?}")
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn socket(&self) -> &TcpListener {
        &self.socket
    }

    /// Accepts one queued connection. Fails with `WouldBlock` once the
    /// queue is empty.
    pub fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.socket.accept()
    }
}

fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
