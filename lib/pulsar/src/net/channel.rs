use crate::net::buffer::{Buffer, Ingress, BUF_SIZE_INCREMENT};
use crate::net::frame::{self, ConnectAck, Frame, Reassembly, MAX_MESSAGE_SIZE};
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use crate::transport::{
    ChannelInfo, ChannelState, FlushStatus, InitProgress, ReadEvent, SocketId, Transport, TransportBuffer, WriteStatus,
};
use flux::{MAJOR_VERSION, MINOR_VERSION, PROTOCOL_ID};
use mio::net::TcpStream;
use std::cmp::{max, min};
use std::net::Shutdown;
use std::time::{Duration, Instant};

const READ_BUF_SIZE: usize = BUF_SIZE_INCREMENT;
const WRITE_BUF_SIZE: usize = 4 * BUF_SIZE_INCREMENT;
// Fragments queued per write call
const FRAGMENT_BURST: usize = 8;

/// Channel parameters offered by the server.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ChannelConfig {
    pub ping_timeout: Duration,
    pub min_ping_timeout: Duration,
    pub max_fragment_size: usize,
    /// Pending output above which no further buffers are handed out.
    pub output_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            ping_timeout: Duration::from_secs(60),
            min_ping_timeout: Duration::from_secs(30),
            max_fragment_size: 6144,
            output_capacity: 4 * BUF_SIZE_INCREMENT,
        }
    }
}

/// A framed, non-blocking TCP channel to a single client.
pub struct Channel {
    stream: TcpStream,
    id: SocketId,
    state: ChannelState,
    config: ChannelConfig,
    info: Option<ChannelInfo>,

    read_buffer: Buffer,
    write_buffer: Buffer,
    reassembly: Reassembly,
    // Frame serialization scratch space
    scratch: Vec<u8>,

    // The last ingress stopped because the read buffer was full
    undrained: bool,
    peer_closed: bool,
}

impl Channel {
    #[inline]
    pub fn new(stream: TcpStream, id: SocketId, config: ChannelConfig) -> Channel {
        Channel {
            stream,
            id,
            state: ChannelState::Initializing,
            config,
            info: None,
            read_buffer: Buffer::new(READ_BUF_SIZE),
            write_buffer: Buffer::new(WRITE_BUF_SIZE),
            reassembly: Reassembly::default(),
            scratch: Vec::new(),
            undrained: false,
            peer_closed: false,
        }
    }

    #[inline]
    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Reads everything the socket has to offer into the read buffer.
    fn fill(&mut self) -> NetworkResult<()> {
        if self.peer_closed {
            return Ok(());
        }

        match self.read_buffer.ingress(&mut self.stream)? {
            Ingress::Drained(_) => self.undrained = false,
            Ingress::Full(_) => self.undrained = true,
            Ingress::Closed(_) => {
                self.undrained = false;
                self.peer_closed = true;
            }
        }

        Ok(())
    }

    /// Sends as much buffered output as the socket accepts. A socket error closes the channel.
    fn egress(&mut self) -> NetworkResult<()> {
        match self.write_buffer.egress(&mut self.stream) {
            Ok(_) => Ok(()),
            Err(err) => {
                self.close();
                Err(err.into())
            }
        }
    }

    #[inline]
    fn flush_status(&self) -> FlushStatus {
        match self.write_buffer.len() {
            0 => FlushStatus::Done,
            pending => FlushStatus::Pending(pending),
        }
    }

    #[inline]
    fn ensure_active(&self) -> NetworkResult<()> {
        match self.state {
            ChannelState::Active => Ok(()),
            ChannelState::Initializing => Err(NetworkError::Wait),
            ChannelState::Closed => Err(NetworkError::Fatal(ErrorType::Closed)),
        }
    }

    /// Validates the connection request and answers with an ack or a nak.
    fn negotiate(&mut self, request: frame::ConnectRequest) -> NetworkResult<InitProgress> {
        self.scratch.clear();

        if request.protocol != PROTOCOL_ID || request.major != MAJOR_VERSION {
            frame::write_nak(&mut self.scratch);
            self.write_buffer.append(&self.scratch);
            drop(self.egress());
            self.close();
            return Err(NetworkError::Fatal(ErrorType::ProtocolMismatch));
        }

        let offered = Duration::from_secs(u64::from(request.ping_timeout));
        let ping_timeout = min(
            max(min(offered, self.config.ping_timeout), self.config.min_ping_timeout),
            Duration::from_secs(u64::from(u16::MAX)),
        );

        let ack = ConnectAck {
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
            ping_timeout: ping_timeout.as_secs() as u16,
            max_fragment_size: self.config.max_fragment_size as u32,
        };

        ack.write(&mut self.scratch);
        self.write_buffer.append(&self.scratch);
        self.egress()?;

        self.state = ChannelState::Active;
        self.info = Some(ChannelInfo {
            max_fragment_size: self.config.max_fragment_size,
            ping_timeout,
        });

        Ok(InitProgress::Active)
    }

    /// Consumes the frame at the head of the read buffer. Returns `None` for a fragment that does
    /// not complete a message.
    fn next_event(&mut self) -> NetworkResult<ReadEvent> {
        let (event, size) = match Frame::parse(self.read_buffer.read_slice())? {
            (Frame::Data(payload), size) => (ReadEvent::Message {
                payload: payload.to_vec(),
                more: false,
            }, size),
            (Frame::Fragment { last, chunk }, size) => match self.reassembly.push(last, chunk)? {
                Some(payload) => (ReadEvent::Message { payload, more: false }, size),
                None => (ReadEvent::Partial, size),
            },
            (Frame::Ping, size) => (ReadEvent::Ping, size),
            _ => return Err(NetworkError::Fatal(ErrorType::IncorrectCategory)),
        };

        self.read_buffer.move_head(size);

        Ok(match event {
            ReadEvent::Message { payload, .. } => ReadEvent::Message {
                payload,
                more: self.has_buffered_input(),
            },
            other => other,
        })
    }
}

impl Transport for Channel {
    fn init(&mut self, _now: Instant) -> NetworkResult<InitProgress> {
        match self.state {
            ChannelState::Active => return Ok(InitProgress::Active),
            ChannelState::Closed => return Err(NetworkError::Fatal(ErrorType::Closed)),
            ChannelState::Initializing => (),
        }

        self.fill()?;

        let request = match Frame::parse(self.read_buffer.read_slice()) {
            Ok((Frame::ConnectRequest(request), size)) => Ok((request, size)),
            Ok(_) => Err(NetworkError::Fatal(ErrorType::IncorrectCategory)),
            Err(err) => Err(err),
        };

        match request {
            Ok((request, size)) => {
                self.read_buffer.move_head(size);
                self.negotiate(request)
            }
            Err(NetworkError::Wait) if self.peer_closed => Err(NetworkError::Fatal(ErrorType::Disconnected)),
            Err(NetworkError::Wait) => Ok(InitProgress::InProgress),
            Err(err) => Err(err),
        }
    }

    fn read(&mut self) -> NetworkResult<ReadEvent> {
        self.ensure_active()?;

        let mut filled = false;

        loop {
            match self.next_event() {
                Ok(event) => return Ok(event),
                Err(NetworkError::Wait) if !filled || self.undrained => {
                    self.fill()?;
                    filled = true;
                }
                Err(NetworkError::Wait) if self.peer_closed => {
                    return Err(NetworkError::Fatal(ErrorType::Disconnected))
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn get_buffer(&mut self, size: usize) -> NetworkResult<TransportBuffer> {
        match self.ensure_active() {
            Err(NetworkError::Wait) => return Err(NetworkError::Fatal(ErrorType::Closed)),
            other => other?,
        }

        if size > MAX_MESSAGE_SIZE {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        if self.write_buffer.len() >= self.config.output_capacity {
            return Err(NetworkError::Wait);
        }

        Ok(TransportBuffer::new(size))
    }

    fn write(&mut self, buffer: &mut TransportBuffer) -> NetworkResult<WriteStatus> {
        match self.ensure_active() {
            Err(NetworkError::Wait) => return Err(NetworkError::Fatal(ErrorType::Closed)),
            other => other?,
        }

        if buffer.is_empty() {
            return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
        }

        let data = buffer.data();
        let len = data.len();
        let mut progress = buffer.progress();

        self.scratch.clear();

        if progress == 0 && len <= self.config.max_fragment_size {
            frame::write_data(&mut self.scratch, data);
            progress = len;
        } else {
            let chunk = frame::fragment_chunk_size(self.config.max_fragment_size);

            for _ in 0..FRAGMENT_BURST {
                if progress >= len {
                    break;
                }

                let end = min(progress + chunk, len);
                frame::write_fragment(&mut self.scratch, end == len, &data[progress..end]);
                progress = end;
            }
        }

        self.write_buffer.append(&self.scratch);
        buffer.set_progress(progress);

        if self.egress().is_err() {
            return Ok(WriteStatus::FlushFailed);
        }

        if progress < len {
            return Ok(WriteStatus::CallAgain);
        }

        Ok(match self.flush_status() {
            FlushStatus::Done => WriteStatus::Done,
            FlushStatus::Pending(pending) => WriteStatus::Pending(pending),
        })
    }

    fn flush(&mut self) -> NetworkResult<FlushStatus> {
        if self.state == ChannelState::Closed {
            return Err(NetworkError::Fatal(ErrorType::Closed));
        }

        self.egress()?;
        Ok(self.flush_status())
    }

    fn ping(&mut self) -> NetworkResult<FlushStatus> {
        match self.ensure_active() {
            Err(NetworkError::Wait) => return Err(NetworkError::Fatal(ErrorType::Closed)),
            other => other?,
        }

        self.scratch.clear();
        frame::write_ping(&mut self.scratch);
        self.write_buffer.append(&self.scratch);

        self.flush()
    }

    fn close(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }

        self.state = ChannelState::Closed;
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.reassembly.clear();
        self.undrained = false;

        // The peer may already be gone
        drop(self.stream.shutdown(Shutdown::Both));
    }

    #[inline]
    fn state(&self) -> ChannelState {
        self.state
    }

    #[inline]
    fn info(&self) -> Option<ChannelInfo> {
        self.info
    }

    #[inline]
    fn has_buffered_input(&self) -> bool {
        if self.state == ChannelState::Closed {
            return false;
        }

        self.undrained
            || self.peer_closed
            || !matches!(Frame::parse(self.read_buffer.read_slice()), Err(NetworkError::Wait))
    }

    #[inline]
    fn has_pending_output(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    #[inline]
    fn register(&mut self, registry: &mio::Registry, token: mio::Token, interest: mio::Interest) -> NetworkResult<()> {
        registry.register(&mut self.stream, token, interest).map_err(Into::into)
    }

    #[inline]
    fn reregister(&mut self, registry: &mio::Registry, token: mio::Token, interest: mio::Interest) -> NetworkResult<()> {
        registry.reregister(&mut self.stream, token, interest).map_err(Into::into)
    }

    #[inline]
    fn deregister(&mut self, registry: &mio::Registry) -> NetworkResult<()> {
        registry.deregister(&mut self.stream).map_err(Into::into)
    }
}
