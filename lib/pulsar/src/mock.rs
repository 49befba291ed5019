//! Scripted in-memory transport for unit tests.
use crate::codec::{BinaryCodec, MessageCodec};
use crate::net::support::{NetworkError, NetworkResult};
use crate::rdm::Msg;
use crate::transport::{
    ChannelInfo, ChannelState, FlushStatus, InitProgress, ReadEvent, Transport, TransportBuffer, WriteStatus,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub(crate) struct MockTransport {
    pub state: ChannelState,
    pub info: Option<ChannelInfo>,

    // Scripted results, consumed front to back. Empty scripts yield the happy path.
    pub init_script: VecDeque<NetworkResult<InitProgress>>,
    pub inbound: VecDeque<NetworkResult<ReadEvent>>,
    pub buffer_script: VecDeque<NetworkResult<()>>,
    pub write_script: VecDeque<NetworkResult<WriteStatus>>,
    pub flush_script: VecDeque<NetworkResult<FlushStatus>>,
    pub ping_script: VecDeque<NetworkResult<FlushStatus>>,

    // Recorded activity
    pub written: Vec<Vec<u8>>,
    pub writes: usize,
    pub flushes: usize,
    pub pings: usize,
    pub registrations: Vec<(mio::Token, mio::Interest)>,
    pub deregistered: bool,
    pub pending_output: bool,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport {
            state: ChannelState::Initializing,
            info: None,
            init_script: VecDeque::new(),
            inbound: VecDeque::new(),
            buffer_script: VecDeque::new(),
            write_script: VecDeque::new(),
            flush_script: VecDeque::new(),
            ping_script: VecDeque::new(),
            written: Vec::new(),
            writes: 0,
            flushes: 0,
            pings: 0,
            registrations: Vec::new(),
            deregistered: false,
            pending_output: false,
        }
    }

    /// Transport that completed its handshake.
    pub fn active() -> MockTransport {
        let mut transport = MockTransport::new();
        transport.state = ChannelState::Active;
        transport.info = Some(ChannelInfo {
            max_fragment_size: 6144,
            ping_timeout: Duration::from_secs(60),
        });
        transport
    }

    /// Queues an encoded inbound message.
    pub fn push_msg(&mut self, msg: &Msg, more: bool) {
        let payload = BinaryCodec.encode_to_vec(msg).unwrap();
        self.inbound.push_back(Ok(ReadEvent::Message { payload, more }));
    }

    /// Decodes every message written so far.
    pub fn decoded(&self) -> Vec<Msg> {
        self.written
            .iter()
            .map(|raw| BinaryCodec.decode(raw).unwrap())
            .collect()
    }

    /// Decodes and forgets every message written so far.
    pub fn take_decoded(&mut self) -> Vec<Msg> {
        let decoded = self.decoded();
        self.written.clear();
        decoded
    }
}

impl Transport for MockTransport {
    fn init(&mut self, _now: Instant) -> NetworkResult<InitProgress> {
        let result = self.init_script.pop_front().unwrap_or(Ok(InitProgress::Active));

        if let Ok(InitProgress::Active) = result {
            self.state = ChannelState::Active;
            if self.info.is_none() {
                self.info = Some(ChannelInfo {
                    max_fragment_size: 6144,
                    ping_timeout: Duration::from_secs(60),
                });
            }
        }

        result
    }

    fn read(&mut self) -> NetworkResult<ReadEvent> {
        self.inbound.pop_front().unwrap_or(Err(NetworkError::Wait))
    }

    fn get_buffer(&mut self, size: usize) -> NetworkResult<TransportBuffer> {
        self.buffer_script.pop_front().unwrap_or(Ok(()))?;
        Ok(TransportBuffer::new(size))
    }

    fn write(&mut self, buffer: &mut TransportBuffer) -> NetworkResult<WriteStatus> {
        self.writes += 1;
        let result = self.write_script.pop_front().unwrap_or(Ok(WriteStatus::Done));

        match result {
            Ok(WriteStatus::CallAgain) | Err(_) => (),
            Ok(_) => self.written.push(buffer.data().to_vec()),
        }

        result
    }

    fn flush(&mut self) -> NetworkResult<FlushStatus> {
        self.flushes += 1;
        self.flush_script.pop_front().unwrap_or(Ok(FlushStatus::Done))
    }

    fn ping(&mut self) -> NetworkResult<FlushStatus> {
        self.pings += 1;
        self.ping_script.pop_front().unwrap_or(Ok(FlushStatus::Done))
    }

    fn close(&mut self) {
        self.state = ChannelState::Closed;
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn info(&self) -> Option<ChannelInfo> {
        self.info
    }

    fn has_buffered_input(&self) -> bool {
        !self.inbound.is_empty()
    }

    fn has_pending_output(&self) -> bool {
        self.pending_output
    }

    fn register(&mut self, _registry: &mio::Registry, token: mio::Token, interest: mio::Interest) -> NetworkResult<()> {
        self.registrations.push((token, interest));
        Ok(())
    }

    fn reregister(&mut self, _registry: &mio::Registry, token: mio::Token, interest: mio::Interest) -> NetworkResult<()> {
        self.registrations.push((token, interest));
        Ok(())
    }

    fn deregister(&mut self, _registry: &mio::Registry) -> NetworkResult<()> {
        self.deregistered = true;
        Ok(())
    }
}
