use anyhow::{Context, Result};
use bytes::BytesMut;
use polling::{Event, Events, PollMode, Poller};
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpStream};
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::server::listener::Listener;
use crate::server::registry::{Registry, Slot};
use crate::server::{Connection, Handle};
use crate::transfer::{Phase, Resource, Step};

const LISTENER: Handle = Handle(0);
const READ_BUFFER_SIZE: usize = 1024;

/// Conditions the poller reported for one socket during a wake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub hangup: bool,
    pub error: bool,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        !(self.readable || self.writable || self.hangup || self.error)
    }

    fn merge(&mut self, other: Readiness) {
        self.readable |= other.readable;
        self.writable |= other.writable;
        self.hangup |= other.hangup;
        self.error |= other.error;
    }
}

impl From<&Event> for Readiness {
    fn from(event: &Event) -> Self {
        Self {
            readable: event.readable,
            writable: event.writable,
            hangup: event.is_interrupt(),
            error: event.is_err().unwrap_or(false),
        }
    }
}

/// The event loop: one poller, one registry, one resource.
pub struct Reactor<R> {
    // Dropped before the sockets it watches.
    poller: Poller,
    registry: Registry<Listener, Connection>,
    resource: R,
    chunk: BytesMut,
    read_buf: BytesMut,
    events: Events,
    ready: HashMap<Handle, Readiness>,
    next_handle: usize,
}

impl<R: Resource> Reactor<R> {
    /// Binds the listener and registers it for readable reports.
    pub fn bind(cfg: &Config, resource: R) -> Result<Self> {
        cfg.validate()?;

        let poller = Poller::new().context("failed to create the poller")?;
        if !poller.supports_level() {
            anyhow::bail!("the platform poller does not support level-triggered mode");
        }

        let listener = Listener::bind(&cfg.listen, LISTENER)?;
        // SAFETY: the listener lives in registry slot 0 for as long as the
        // reactor, and the poller is dropped first.
        unsafe {
            poller
                .add_with_mode(listener.socket(), Event::readable(LISTENER.0), PollMode::Level)
                .context("failed to watch the listener")?;
        }

        Ok(Self {
            poller,
            registry: Registry::new(listener, cfg.registry.initial_capacity),
            resource,
            chunk: BytesMut::zeroed(cfg.transfer.chunk_size),
            read_buf: BytesMut::zeroed(READ_BUFFER_SIZE),
            events: Events::new(),
            ready: HashMap::new(),
            next_handle: LISTENER.0 + 1,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.registry.listener().local_addr()
    }

    pub fn registry(&self) -> &Registry<Listener, Connection> {
        &self.registry
    }

    /// Serves forever. Returns only if waiting for readiness fails.
    pub fn run(&mut self) -> Result<()> {
        info!(addr = %self.local_addr(), "Serving");
        loop {
            self.turn()?;
        }
    }

    /// Waits for readiness once and services every ready socket.
    pub fn turn(&mut self) -> Result<()> {
        self.events.clear();
        loop {
            match self.poller.wait(&mut self.events, None) {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("waiting for readiness failed"),
            }
        }

        self.ready.clear();
        for event in self.events.iter() {
            self.ready
                .entry(Handle(event.key))
                .or_default()
                .merge(Readiness::from(&event));
        }

        self.dispatch();
        Ok(())
    }

    fn dispatch(&mut self) {
        let mut index = 0;
        while index < self.registry.len() {
            let handle = match self.registry.get(index) {
                Some(Slot::Listener(listener)) => listener.handle(),
                Some(Slot::Connection(conn)) => conn.handle,
                None => break,
            };

            // Each socket is serviced at most once per wake.
            let readiness = match self.ready.remove(&handle) {
                Some(readiness) if !readiness.is_empty() => readiness,
                _ => {
                    index += 1;
                    continue;
                }
            };
            debug!(%handle, ?readiness, "Ready");

            if index == 0 {
                if readiness.readable {
                    self.accept_all();
                } else {
                    warn!(?readiness, "Unexpected listener readiness");
                }
                index += 1;
                continue;
            }

            if self.service(index, readiness) {
                index += 1;
            } else {
                // The last connection now sits at `index` and has not been
                // looked at yet.
                self.close(index);
            }
        }
    }

    /// Accepts every queued connection before returning.
    fn accept_all(&mut self) {
        loop {
            match self.registry.listener().accept() {
                Ok((stream, peer)) => self.register(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn register(&mut self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!(%peer, error = %e, "Dropping connection, could not make it non-blocking");
            return;
        }

        let handle = Handle(self.next_handle);
        self.next_handle += 1;

        // SAFETY: the stream is deleted from the poller in `close` before it
        // is dropped, or outlived by nothing once the poller itself is gone.
        let added = unsafe {
            self.poller
                .add_with_mode(&stream, Event::all(handle.0), PollMode::Level)
        };
        if let Err(e) = added {
            warn!(%peer, error = %e, "Dropping connection, could not watch it");
            return;
        }

        let index = self.registry.push(Connection::new(handle, peer, stream));
        info!(%peer, %handle, index, "New connection");
    }

    /// Services one ready connection. Returns false when it must be closed.
    fn service(&mut self, index: usize, readiness: Readiness) -> bool {
        let Some(Slot::Connection(conn)) = self.registry.get_mut(index) else {
            return true;
        };

        if readiness.hangup || readiness.error {
            warn!(
                handle = %conn.handle,
                peer = %conn.peer,
                ?readiness,
                "Connection hung up or errored"
            );
            return false;
        }

        let result = if readiness.readable {
            conn.transfer.on_readable(&mut conn.stream, &mut self.read_buf)
        } else if readiness.writable {
            let before = conn.transfer.send_offset();
            let result =
                conn.transfer
                    .on_writable(&mut conn.stream, &self.resource, &mut self.chunk);
            let sent = conn.transfer.send_offset() - before;
            if sent > 0 {
                debug!(handle = %conn.handle, offset = before, sent, "Chunk sent");
            } else if matches!(result, Ok(Step::Continue)) {
                trace!(handle = %conn.handle, "Send would block");
            }
            result
        } else {
            Ok(Step::Continue)
        };

        match result {
            Ok(Step::Continue) => true,
            Ok(Step::ResumeWrites) => {
                debug!(handle = %conn.handle, bytes = conn.transfer.received(), "Request received");
                set_writes(&self.poller, conn, true)
            }
            Ok(Step::ParkWrites) => set_writes(&self.poller, conn, false),
            Ok(Step::Finished) => false,
            Err(e) => {
                warn!(
                    handle = %conn.handle,
                    peer = %conn.peer,
                    error = %format!("{e:#}"),
                    "Transfer failed"
                );
                false
            }
        }
    }

    fn close(&mut self, index: usize) {
        let Some(conn) = self.registry.swap_remove(index) else {
            return;
        };

        if let Err(e) = self.poller.delete(&conn.stream) {
            warn!(handle = %conn.handle, error = %e, "Failed to unwatch connection");
        }

        let transfer = &conn.transfer;
        match transfer.phase() {
            Phase::Complete => info!(
                handle = %conn.handle,
                peer = %conn.peer,
                size = transfer.send_offset(),
                "Transfer complete"
            ),
            phase => info!(
                handle = %conn.handle,
                peer = %conn.peer,
                ?phase,
                offset = transfer.send_offset(),
                "Connection closed"
            ),
        }
    }
}

/// Switches writable reports on or off for a connection.
fn set_writes(poller: &Poller, conn: &mut Connection, enabled: bool) -> bool {
    let parked = !enabled;
    if conn.writes_parked == parked {
        return true;
    }

    let interest = Event::new(conn.handle.0, true, enabled);
    match poller.modify_with_mode(&conn.stream, interest, PollMode::Level) {
        Ok(()) => {
            conn.writes_parked = parked;
            true
        }
        Err(e) => {
            warn!(handle = %conn.handle, error = %e, "Failed to change interest");
            false
        }
    }
}
