//! Heartbeat supervision for a single channel.
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use crate::transport::Transport;
use std::time::{Duration, Instant};

/// Sends pings at a third of the negotiated timeout and checks for inbound activity once per
/// full timeout, so a client has to miss at least two heartbeats before it is declared dead.
#[derive(Debug)]
pub struct PingSupervisor {
    send_interval: Duration,
    receive_timeout: Duration,
    next_send: Instant,
    next_receive: Instant,
    received: bool,
}

impl PingSupervisor {
    pub fn new(timeout: Duration, now: Instant) -> PingSupervisor {
        let send_interval = timeout / 3;

        PingSupervisor {
            send_interval,
            receive_timeout: timeout,
            next_send: now + send_interval,
            next_receive: now + timeout,
            received: false,
        }
    }

    /// Records inbound activity, data or heartbeat alike.
    #[inline]
    pub fn mark_received(&mut self) {
        self.received = true;
    }

    #[inline]
    pub fn next_send(&self) -> Instant {
        self.next_send
    }

    #[inline]
    pub fn next_receive(&self) -> Instant {
        self.next_receive
    }

    /// Sends a heartbeat when due and checks liveness. A failed heartbeat write or a silent
    /// client is fatal.
    pub fn tick(&mut self, transport: &mut dyn Transport, now: Instant) -> NetworkResult<()> {
        if now >= self.next_send {
            match transport.ping() {
                // Queued but not flushed yet
                Ok(_) | Err(NetworkError::Wait) => (),
                Err(err) => return Err(err),
            }

            self.next_send = now + self.send_interval;
        }

        if now >= self.next_receive {
            if !self.received {
                return Err(NetworkError::Fatal(ErrorType::LostContact));
            }

            self.received = false;
            self.next_receive = now + self.receive_timeout;
        }

        Ok(())
    }
}
