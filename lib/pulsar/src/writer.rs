//! Backpressure aware message output.
use crate::codec::MessageCodec;
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use crate::rdm::Msg;
use crate::transport::{ChannelState, FlushStatus, Transport, TransportBuffer, WriteStatus};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Delivery {
    /// Written and flushed.
    Sent,
    /// Written, output is queued and write readiness must stay armed.
    Pending,
}

/// Wraps transport writes. Tracks whether queued output still awaits a flush.
#[derive(Debug, Default)]
pub struct OutboundWriter {
    pending: bool,
}

impl OutboundWriter {
    #[inline]
    pub fn new() -> OutboundWriter {
        OutboundWriter::default()
    }

    /// Returns true if a flush is outstanding.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Acquires an output buffer. When none is available, flushes once and retries once.
    /// `Wait` means the transport still has no buffer to give.
    pub fn acquire(&mut self, transport: &mut dyn Transport, size: usize) -> NetworkResult<TransportBuffer> {
        match transport.get_buffer(size) {
            Err(NetworkError::Wait) => {
                self.flush(transport)?;
                transport.get_buffer(size)
            }
            result => result,
        }
    }

    /// Encodes and writes a message.
    pub fn send(&mut self, transport: &mut dyn Transport, codec: &dyn MessageCodec, msg: &Msg) -> NetworkResult<Delivery> {
        let size = codec.encoded_len(msg)?;
        let mut buffer = self.acquire(transport, size)?;

        codec.encode(msg, &mut buffer)?;
        self.write(transport, &mut buffer)
    }

    /// Writes a filled buffer. Continuation requests are served by flushing and writing the same
    /// buffer again.
    pub fn write(&mut self, transport: &mut dyn Transport, buffer: &mut TransportBuffer) -> NetworkResult<Delivery> {
        loop {
            match transport.write(buffer)? {
                WriteStatus::CallAgain => {
                    self.flush(transport)?;
                }
                WriteStatus::Done => {
                    self.pending = false;
                    return Ok(Delivery::Sent);
                }
                WriteStatus::Pending(_) => {
                    self.pending = true;
                    return Ok(Delivery::Pending);
                }
                WriteStatus::FlushFailed => {
                    if transport.state() == ChannelState::Closed {
                        return Err(NetworkError::Fatal(ErrorType::Closed));
                    }

                    self.pending = true;
                    return Ok(Delivery::Pending);
                }
            }
        }
    }

    /// Flushes queued output, tracking whether anything remains.
    pub fn flush(&mut self, transport: &mut dyn Transport) -> NetworkResult<FlushStatus> {
        let status = transport.flush()?;
        self.pending = status != FlushStatus::Done;
        Ok(status)
    }
}
