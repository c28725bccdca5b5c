//! Single-threaded readiness server.
//!
//! One thread owns every socket. It blocks until the poller reports that
//! some of them are ready, then walks the registry once and services each
//! ready socket with non-blocking calls.
//!
//! ```text
//!              ┌──────────────────────────────┐
//!              │   Poller::wait (no timeout)  │
//!              └──────────────┬───────────────┘
//!                             │ readiness by handle
//!                             ▼
//!   ┌──────────────────── scan slots 0..len ─────────────────────┐
//!   │ slot 0  (listener)  readable  → accept until WouldBlock    │
//!   │ slot i  hangup / error        → close, re-inspect slot i   │
//!   │ slot i  readable              → take the request           │
//!   │ slot i  writable              → send the next chunk        │
//!   │ slot i  finished              → close, re-inspect slot i   │
//!   └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pollserve::config::Config;
//! use pollserve::server::Reactor;
//! use pollserve::transfer::FileResource;
//!
//! fn main() -> anyhow::Result<()> {
//!     let cfg = Config::load()?;
//!     let resource = FileResource::new(&cfg.transfer.resource);
//!     Reactor::bind(&cfg, resource)?.run()
//! }
//! ```

pub mod listener;
pub mod reactor;
pub mod registry;

use std::fmt;
use std::net::{SocketAddr, TcpStream};

use crate::transfer::Transfer;

pub use listener::Listener;
pub use reactor::{Reactor, Readiness};
pub use registry::{Registry, Slot};

/// Identity of a watched socket, stable while it is open.
///
/// Registry slots move around on removal, so the poller reports readiness
/// by handle and never by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub usize);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An accepted client and the state of its transfer.
#[derive(Debug)]
pub struct Connection {
    pub handle: Handle,
    pub peer: SocketAddr,
    pub stream: TcpStream,
    pub transfer: Transfer,
    /// Whether writable reports are currently switched off.
    pub writes_parked: bool,
}

impl Connection {
    pub fn new(handle: Handle, peer: SocketAddr, stream: TcpStream) -> Self {
        Self {
            handle,
            peer,
            stream,
            transfer: Transfer::new(),
            writes_parked: false,
        }
    }
}
