//! Everything the provider tracks for one client channel.
use crate::codec::MessageCodec;
use crate::dispatch::Dispatcher;
use crate::handler::Responder;
use crate::init::{ChannelInitializer, InitOutcome};
use crate::net::support::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
use crate::ping::PingSupervisor;
use crate::rdm::Msg;
use crate::transport::{ChannelState, ReadEvent, Transport};
use crate::writer::OutboundWriter;
use flux::logging;
use mio::{Interest, Registry, Token};
use std::rc::Rc;
use std::time::{Duration, Instant};

pub struct Session<T: Transport> {
    token: Token,
    transport: T,
    initializer: ChannelInitializer,
    ping: Option<PingSupervisor>,
    writer: OutboundWriter,
    dispatcher: Dispatcher,
    codec: Rc<dyn MessageCodec>,
    log: logging::Logger,
    // Write readiness is requested only while output is queued
    writable: bool,
}

impl<T: Transport> Session<T> {
    pub fn new(
        token: Token,
        transport: T,
        dispatcher: Dispatcher,
        codec: Rc<dyn MessageCodec>,
        init_timeout: Duration,
        now: Instant,
        log: logging::Logger,
    ) -> Session<T> {
        Session {
            token,
            transport,
            initializer: ChannelInitializer::new(init_timeout, now),
            ping: None,
            writer: OutboundWriter::new(),
            dispatcher,
            codec,
            log,
            writable: false,
        }
    }

    #[inline]
    pub fn token(&self) -> Token {
        self.token
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns true once the handshake completed.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.ping.is_some()
    }

    #[inline]
    fn interest(&self) -> Interest {
        match self.writable {
            true => Interest::READABLE | Interest::WRITABLE,
            false => Interest::READABLE,
        }
    }

    pub fn register(&mut self, registry: &Registry) -> NetworkResult<()> {
        let interest = self.interest();
        self.transport.register(registry, self.token, interest)
    }

    #[inline]
    fn reregister(&mut self, registry: &Registry) -> NetworkResult<()> {
        let interest = self.interest();
        self.transport.reregister(registry, self.token, interest)
    }

    /// Handles read readiness: advances the handshake, then processes input until the transport
    /// has nothing more to give without waiting.
    pub fn on_readable(&mut self, registry: &Registry, now: Instant) -> NetworkResult<()> {
        if self.ping.is_none() {
            self.advance(registry, now)?;

            if self.ping.is_none() {
                return Ok(());
            }
        }

        self.read(registry)
    }

    fn advance(&mut self, registry: &Registry, now: Instant) -> NetworkResult<()> {
        match self.initializer.advance(&mut self.transport, now) {
            InitOutcome::InProgress => Ok(()),
            InitOutcome::SocketChanged { old, new } => {
                logging::debug!(self.log, "socket changed during initialization"; "old" => old, "new" => new);
                self.reregister(registry)
            }
            InitOutcome::Active(info) => {
                logging::info!(self.log, "channel active";
                               "ping_timeout" => info.ping_timeout.as_secs(),
                               "max_fragment_size" => info.max_fragment_size);
                self.ping = Some(PingSupervisor::new(info.ping_timeout, now));
                Ok(())
            }
            InitOutcome::Failed(err) => Err(err),
        }
    }

    fn read(&mut self, registry: &Registry) -> NetworkResult<()> {
        loop {
            match self.transport.read() {
                Ok(ReadEvent::Message { payload, more }) => {
                    self.mark_received();

                    let msg = match self.codec.decode(&payload) {
                        Ok(msg) => msg,
                        Err(err) => {
                            logging::error!(self.log, "undecodable message"; "error" => %err, "size" => payload.len());
                            return Err(err.into());
                        }
                    };

                    self.dispatch(&msg)?;

                    if !more {
                        return Ok(());
                    }
                }
                // Fragments count as contact while a large message is still arriving
                Ok(ReadEvent::Partial) => self.mark_received(),
                Ok(ReadEvent::Ping) => {
                    self.mark_received();
                    return Ok(());
                }
                Ok(ReadEvent::SocketChanged { old, new }) => {
                    logging::debug!(self.log, "socket changed"; "old" => old, "new" => new);
                    return self.reregister(registry);
                }
                Err(NetworkError::Wait) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    #[inline]
    fn mark_received(&mut self) {
        if let Some(ping) = &mut self.ping {
            ping.mark_received();
        }
    }

    fn dispatch(&mut self, msg: &Msg) -> NetworkResult<()> {
        logging::trace!(self.log, "message"; "domain" => %msg.domain, "class" => ?msg.class, "stream_id" => msg.stream_id);

        let mut responder = Responder::new(&mut self.transport, &mut self.writer, &*self.codec, &self.log);

        match self.dispatcher.dispatch(&mut responder, msg) {
            // Output stayed blocked after a flush and retry
            Err(NetworkError::Wait) => Err(NetworkError::Fatal(ErrorType::NoBuffers)),
            result => result,
        }
    }

    /// Handles write readiness by flushing queued output.
    pub fn on_writable(&mut self) -> NetworkResult<()> {
        if self.writer.has_pending() || self.transport.has_pending_output() {
            match self.writer.flush(&mut self.transport) {
                Err(NetworkError::Wait) => (),
                result => drop(result?),
            }
        }

        Ok(())
    }

    /// Checks the handshake deadline or supervises heartbeats.
    pub fn tick(&mut self, now: Instant) -> NetworkResult<()> {
        match &mut self.ping {
            None => self.initializer.check(now),
            Some(ping) => ping.tick(&mut self.transport, now),
        }
    }

    #[inline]
    pub fn has_buffered_input(&self) -> bool {
        self.transport.has_buffered_input()
    }

    /// Arms write readiness while output is queued and disarms it once drained.
    pub fn update_interest(&mut self, registry: &Registry) -> NetworkResult<()> {
        let writable = self.writer.has_pending() || self.transport.has_pending_output();

        if writable != self.writable {
            self.writable = writable;
            self.reregister(registry)?;
        }

        Ok(())
    }

    /// Closes the open streams of an active channel, flushes what it can and closes the channel.
    /// Failures are only logged.
    pub fn shutdown(&mut self, registry: &Registry) {
        if self.is_active() && self.transport.state() == ChannelState::Active {
            let result = {
                let mut responder = Responder::new(&mut self.transport, &mut self.writer, &*self.codec, &self.log);
                self.dispatcher.shutdown(&mut responder)
            };

            if result.has_failed() {
                logging::warn!(self.log, "failed to close streams"; "error" => ?result);
            }

            let flushed = self.writer.flush(&mut self.transport);
            if flushed.has_failed() {
                logging::warn!(self.log, "final flush failed"; "error" => ?flushed);
            }
        }

        self.close(registry);
    }

    /// Deregisters and closes the channel. Every record of the channel is forgotten.
    pub fn close(&mut self, registry: &Registry) {
        drop(self.transport.deregister(registry));
        self.transport.close();
        self.dispatcher.reset();
        self.ping = None;
    }
}
