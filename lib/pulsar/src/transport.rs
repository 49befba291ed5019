//! The transport capability the session engine runs on.
use crate::net::support::NetworkResult;
use std::cmp::min;
use std::io;
use std::time::{Duration, Instant};

/// Opaque identity of the socket behind a channel.
pub type SocketId = u64;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChannelState {
    Initializing,
    Active,
    Closed,
}

/// Parameters negotiated during channel initialization.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ChannelInfo {
    pub max_fragment_size: usize,
    pub ping_timeout: Duration,
}

/// Progress of a single initialization step.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InitProgress {
    InProgress,
    SocketChanged { old: SocketId, new: SocketId },
    Active,
}

/// Outcome of a successful read.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ReadEvent {
    /// A complete message. `more` is set when further input can be read without waiting.
    Message { payload: Vec<u8>, more: bool },
    /// A fragment was consumed, the message it belongs to is still incomplete.
    Partial,
    /// A protocol level ping was consumed.
    Ping,
    /// The socket was replaced, readiness must be registered for the new one.
    SocketChanged { old: SocketId, new: SocketId },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WriteStatus {
    /// Written and fully flushed.
    Done,
    /// Written, the given number of bytes is still queued for flushing.
    Pending(usize),
    /// Only part of a fragmented message was queued, write the same buffer again.
    CallAgain,
    /// Written, but the internal flush failed.
    FlushFailed,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlushStatus {
    Done,
    Pending(usize),
}

/// Output buffer handed out by a transport. The transport tracks how much of a fragmented
/// message has already been queued in `progress`.
#[derive(Debug)]
pub struct TransportBuffer {
    data: Vec<u8>,
    capacity: usize,
    progress: usize,
}

impl TransportBuffer {
    #[inline]
    pub fn new(capacity: usize) -> TransportBuffer {
        TransportBuffer {
            data: Vec::with_capacity(capacity),
            capacity,
            progress: 0,
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// Bytes already queued by the transport.
    #[inline]
    pub fn progress(&self) -> usize {
        self.progress
    }

    #[inline]
    pub fn set_progress(&mut self, progress: usize) {
        self.progress = min(progress, self.data.len());
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.progress = 0;
    }
}

impl io::Write for TransportBuffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = min(buf.len(), self.free_capacity());
        self.data.extend_from_slice(&buf[..count]);
        Ok(count)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Connection oriented, non-blocking message transport.
///
/// Reads and writes never block. `NetworkError::Wait` from `read` means no complete message is
/// available, from `get_buffer` that no output buffer is available right now.
pub trait Transport {
    /// Advances channel initialization by one step.
    fn init(&mut self, now: Instant) -> NetworkResult<InitProgress>;

    /// Reads the next message or ping.
    fn read(&mut self) -> NetworkResult<ReadEvent>;

    /// Acquires an output buffer able to hold `size` bytes.
    fn get_buffer(&mut self, size: usize) -> NetworkResult<TransportBuffer>;

    /// Queues the buffer contents and attempts to flush.
    fn write(&mut self, buffer: &mut TransportBuffer) -> NetworkResult<WriteStatus>;

    /// Flushes queued output.
    fn flush(&mut self) -> NetworkResult<FlushStatus>;

    /// Queues a heartbeat and attempts to flush.
    fn ping(&mut self) -> NetworkResult<FlushStatus>;

    /// Closes the channel. Closing an already closed channel has no effect.
    fn close(&mut self);

    fn state(&self) -> ChannelState;

    /// Negotiated parameters, available once the channel is active.
    fn info(&self) -> Option<ChannelInfo>;

    /// Returns true if input is buffered or the socket was not fully drained.
    fn has_buffered_input(&self) -> bool;

    /// Returns true if queued output is waiting for a flush.
    fn has_pending_output(&self) -> bool;

    fn register(&mut self, registry: &mio::Registry, token: mio::Token, interest: mio::Interest) -> NetworkResult<()>;

    fn reregister(&mut self, registry: &mio::Registry, token: mio::Token, interest: mio::Interest) -> NetworkResult<()>;

    fn deregister(&mut self, registry: &mio::Registry) -> NetworkResult<()>;
}
