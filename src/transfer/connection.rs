use anyhow::{Context, Result};
use std::io::{self, Read, Write};

use crate::transfer::resource::Resource;

/// Where a connection is in its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingRequest,
    Streaming,
    /// Every byte of the resource was accepted by the transport.
    Complete,
    /// The peer closed before the transfer finished.
    Closed,
    Failed,
}

/// What the reactor should do with the connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Writable reports are useless until a request arrives.
    ParkWrites,
    /// The request arrived, report writability again.
    ResumeWrites,
    /// Close the connection and drop it from the registry.
    Finished,
}

/// Resumable transfer of the resource to one client.
///
/// Progress is a plain byte offset. A send that the transport only partly
/// accepts advances the offset by the confirmed count, and the next chunk
/// starts exactly there.
#[derive(Debug, Clone)]
pub struct Transfer {
    phase: Phase,
    send_offset: u64,
    resource_size: Option<u64>,
    received: usize,
}

impl Default for Transfer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transfer {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingRequest,
            send_offset: 0,
            resource_size: None,
            received: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn send_offset(&self) -> u64 {
        self.send_offset
    }

    /// Size of the resource, once the first write attempt has read it.
    pub fn resource_size(&self) -> Option<u64> {
        self.resource_size
    }

    pub fn request_received(&self) -> bool {
        !matches!(self.phase, Phase::AwaitingRequest)
    }

    /// Bytes read from the client so far.
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Complete | Phase::Closed | Phase::Failed)
    }

    /// Handles a readable report with a single non-blocking read.
    ///
    /// The payload is not interpreted: any bytes count as the request. Input
    /// arriving while streaming is discarded. A zero-length read is the peer
    /// closing and ends the connection.
    pub fn on_readable<S>(&mut self, stream: &mut S, buf: &mut [u8]) -> Result<Step>
    where
        S: Read + ?Sized,
    {
        if self.is_finished() {
            return Ok(Step::Finished);
        }

        match stream.read(buf) {
            Ok(0) => {
                self.phase = Phase::Closed;
                Ok(Step::Finished)
            }
            Ok(n) => {
                self.received += n;
                if self.phase == Phase::AwaitingRequest {
                    self.phase = Phase::Streaming;
                    Ok(Step::ResumeWrites)
                } else {
                    Ok(Step::Continue)
                }
            }
            Err(e) if is_transient(&e) => Ok(Step::Continue),
            Err(e) => {
                self.phase = Phase::Failed;
                Err(e).context("read from client failed")
            }
        }
    }

    /// Handles a writable report by sending at most one chunk.
    ///
    /// The chunk is `min(chunk.len(), size - offset)` bytes read from the
    /// resource at the current offset.
    pub fn on_writable<S, R>(
        &mut self,
        stream: &mut S,
        resource: &R,
        chunk: &mut [u8],
    ) -> Result<Step>
    where
        S: Write + ?Sized,
        R: Resource + ?Sized,
    {
        match self.phase {
            Phase::AwaitingRequest => return Ok(Step::ParkWrites),
            Phase::Streaming => {}
            Phase::Complete | Phase::Closed | Phase::Failed => return Ok(Step::Finished),
        }

        self.send_chunk(stream, resource, chunk).inspect_err(|_| {
            self.phase = Phase::Failed;
        })
    }

    fn send_chunk<S, R>(&mut self, stream: &mut S, resource: &R, chunk: &mut [u8]) -> Result<Step>
    where
        S: Write + ?Sized,
        R: Resource + ?Sized,
    {
        let size = match self.resource_size {
            Some(size) => size,
            None => {
                let size = resource.size().context("failed to size the resource")?;
                self.resource_size = Some(size);
                size
            }
        };

        if self.send_offset >= size {
            self.phase = Phase::Complete;
            return Ok(Step::Finished);
        }

        let remaining = size - self.send_offset;
        let want = usize::try_from(remaining).map_or(chunk.len(), |r| r.min(chunk.len()));

        let read = resource
            .read_at(self.send_offset, &mut chunk[..want])
            .with_context(|| {
                format!("failed to read the resource at offset {}", self.send_offset)
            })?;
        if read == 0 {
            anyhow::bail!(
                "resource ended at offset {} but its size was {size}",
                self.send_offset
            );
        }

        match stream.write(&chunk[..read]) {
            Ok(0) => anyhow::bail!("connection accepted no bytes"),
            Ok(n) => {
                self.send_offset += n as u64;
                if self.send_offset == size {
                    self.phase = Phase::Complete;
                    Ok(Step::Finished)
                } else {
                    Ok(Step::Continue)
                }
            }
            Err(e) if is_transient(&e) => Ok(Step::Continue),
            Err(e) => Err(e).context("send to client failed"),
        }
    }
}

/// Would-block and interrupted calls just mean "try again next wake".
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
