//! The provider event loop.
//!
//! Connections are taken from the acceptor, which owns its own poll. Live channels share a
//! second poll and are addressed by their slot in the session vector. Failures of a single
//! channel close that channel only.
use crate::codec::{BinaryCodec, MessageCodec};
use crate::config::ProviderConfig;
use crate::dictionary::DataDictionary;
use crate::dispatch::Dispatcher;
use crate::net::acceptor::{Accepted, Acceptor};
use crate::net::channel::Channel;
use crate::net::support::{NetworkError, NetworkResult};
use crate::session::Session;
use crate::transport::Transport;
use flux::{choose, logging, time};
use indexmap::IndexSet;
use mio::Token;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub type SlotId = usize;

#[derive(Debug, Copy, Clone)]
struct Readiness {
    slot: SlotId,
    readable: bool,
    writable: bool,
}

pub struct Server {
    acceptor: Acceptor,
    poll: mio::Poll,
    events: mio::Events,

    // Storage
    sessions: Vec<Option<Session<Channel>>>,
    // Ids of unused slots
    free: Vec<SlotId>,
    live: IndexSet<SlotId>,

    // Scratch
    ready: Vec<Readiness>,
    failed: Vec<(SlotId, NetworkError)>,

    config: ProviderConfig,
    dictionary: Rc<DataDictionary>,
    codec: Rc<dyn MessageCodec>,
    log: logging::Logger,
}

impl Server {
    /// Binds the listening socket. The dictionary is shared by every session.
    pub fn bind(config: ProviderConfig, dictionary: Rc<DataDictionary>, log: logging::Logger) -> NetworkResult<Server> {
        let acceptor = Acceptor::bind(&config.server.address, config.server.port, config.channel())?;
        let addr = acceptor.local_addr()?;

        logging::info!(log, "listening"; "address" => %addr, "service" => &config.service.name);

        Ok(Server {
            acceptor,
            poll: mio::Poll::new()?,
            events: mio::Events::with_capacity(1024),
            sessions: Vec::new(),
            free: Vec::new(),
            live: IndexSet::new(),
            ready: Vec::new(),
            failed: Vec::new(),
            config,
            dictionary,
            codec: Rc::new(BinaryCodec),
            log,
        })
    }

    #[inline]
    pub fn local_addr(&self) -> NetworkResult<SocketAddr> {
        self.acceptor.local_addr()
    }

    /// Number of connected channels.
    #[inline]
    pub fn session_count(&self) -> usize {
        self.live.len()
    }

    /// Runs for the configured runtime.
    #[inline]
    pub fn run(&mut self) -> NetworkResult<()> {
        self.run_for(self.config.runtime())
    }

    #[inline]
    pub fn run_for(&mut self, runtime: Duration) -> NetworkResult<()> {
        self.run_until(Instant::now() + runtime)
    }

    /// Serves clients until the deadline, then closes every channel in an orderly way.
    pub fn run_until(&mut self, deadline: Instant) -> NetworkResult<()> {
        let result = loop {
            match self.step(deadline) {
                Ok(true) => (),
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        self.shutdown();
        result
    }

    /// Runs a single loop iteration. Returns false once the deadline has passed.
    pub fn step(&mut self, deadline: Instant) -> NetworkResult<bool> {
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }

        self.accept(now, deadline);
        self.poll_live(deadline)?;
        self.service(Instant::now());

        Ok(Instant::now() < deadline)
    }

    /// Takes every pending connection. Blocks only while no channel is live.
    fn accept(&mut self, now: Instant, deadline: Instant) {
        let mut timeout = choose!(self.live.is_empty() =>
            time::bounded_wait(self.config.accept_timeout(), now, deadline),
            Duration::from_secs(0));

        loop {
            match self.acceptor.accept_next(Some(timeout)) {
                Ok(Accepted::Channel(channel, addr)) => self.admit(channel, addr),
                Ok(Accepted::Timeout) => return,
                Err(err) => {
                    logging::warn!(self.log, "accept failed"; "code" => err.code(), "error" => %err);
                    return;
                }
            }

            timeout = Duration::from_secs(0);
        }
    }

    fn admit(&mut self, mut channel: Channel, addr: SocketAddr) {
        if self.live.len() >= usize::from(self.config.server.max_clients) {
            logging::warn!(self.log, "client limit reached, connection refused"; "peer" => %addr);
            channel.close();
            return;
        }

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.sessions.push(None);
                self.sessions.len() - 1
            }
        };

        let log = self.log.new(logging::o!("channel" => channel.id(), "peer" => addr.to_string()));
        let dispatcher = Dispatcher::provider(&self.config, self.dictionary.clone(), log.clone());
        let mut session = Session::new(
            Token(slot),
            channel,
            dispatcher,
            self.codec.clone(),
            self.config.init_timeout(),
            Instant::now(),
            log,
        );

        if let Err(err) = session.register(self.poll.registry()) {
            logging::error!(self.log, "channel registration failed"; "code" => err.code(), "error" => %err);
            session.close(self.poll.registry());
            self.free.push(slot);
            return;
        }

        logging::info!(self.log, "client connected"; "slot" => slot, "peer" => %addr);

        self.sessions[slot] = Some(session);
        self.live.insert(slot);
    }

    /// Waits for readiness on the live channels and handles it.
    fn poll_live(&mut self, deadline: Instant) -> NetworkResult<()> {
        if self.live.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let sessions = &self.sessions;

        // Buffered input must not wait for a readiness event that will not come
        let buffered = self.live.iter().any(|&slot| {
            sessions[slot]
                .as_ref()
                .map_or(false, |session| session.has_buffered_input())
        });
        let timeout = choose!(buffered =>
            Duration::from_secs(0),
            time::bounded_wait(self.config.loop_timeout(), now, deadline));

        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => (),
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(err) => {
                logging::crit!(self.log, "readiness wait failed"; "error" => %err);
                return Err(err.into());
            }
        }

        let mut ready = std::mem::take(&mut self.ready);
        ready.clear();
        ready.extend(self.events.iter().map(|event| Readiness {
            slot: event.token().0,
            readable: event.is_readable() || event.is_read_closed() || event.is_error(),
            writable: event.is_writable(),
        }));

        let now = Instant::now();
        for readiness in ready.iter() {
            let registry = self.poll.registry();
            let session = match self.sessions.get_mut(readiness.slot).and_then(Option::as_mut) {
                Some(session) => session,
                None => continue,
            };

            let mut result = Ok(());
            if readiness.writable {
                result = session.on_writable();
            }
            if readiness.readable && result.is_ok() {
                result = session.on_readable(registry, now);
            }

            match result {
                Ok(()) | Err(NetworkError::Wait) => (),
                Err(err) => self.failed.push((readiness.slot, err)),
            }
        }

        self.ready = ready;
        self.close_failed();
        Ok(())
    }

    /// Serves buffered input, enforces timeouts and keeps write readiness in line with queued
    /// output for every live channel.
    fn service(&mut self, now: Instant) {
        let registry = self.poll.registry();

        for &slot in self.live.iter() {
            let session = match self.sessions[slot].as_mut() {
                Some(session) => session,
                None => continue,
            };

            let mut result = Ok(());
            if session.has_buffered_input() {
                result = session.on_readable(registry, now);
            }

            let result = result
                .and_then(|_| session.tick(now))
                .and_then(|_| session.update_interest(registry));

            match result {
                Ok(()) | Err(NetworkError::Wait) => (),
                Err(err) => self.failed.push((slot, err)),
            }
        }

        self.close_failed();
    }

    fn close_failed(&mut self) {
        while let Some((slot, err)) = self.failed.pop() {
            self.close_session(slot, err);
        }
    }

    fn close_session(&mut self, slot: SlotId, err: NetworkError) {
        if let Some(mut session) = self.sessions[slot].take() {
            logging::warn!(self.log, "closing channel"; "slot" => slot, "code" => err.code(), "error" => %err);
            session.close(self.poll.registry());
            self.free.push(slot);
        }

        self.live.swap_remove(&slot);
    }

    /// Closes the open streams of every channel and the channels themselves.
    fn shutdown(&mut self) {
        logging::info!(self.log, "shutting down"; "sessions" => self.session_count());

        let registry = self.poll.registry();
        for slot in self.live.drain(..) {
            if let Some(mut session) = self.sessions[slot].take() {
                session.shutdown(registry);
                self.free.push(slot);
            }
        }
    }
}
