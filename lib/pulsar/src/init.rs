//! Channel handshake progression.
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use crate::transport::{ChannelInfo, InitProgress, SocketId, Transport};
use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InitOutcome {
    InProgress,
    /// The socket was replaced, readiness must be registered for the new one.
    SocketChanged { old: SocketId, new: SocketId },
    Active(ChannelInfo),
    Failed(NetworkError),
}

/// Drives a channel handshake until it is active, fails or times out.
#[derive(Debug)]
pub struct ChannelInitializer {
    deadline: Instant,
}

impl ChannelInitializer {
    #[inline]
    pub fn new(timeout: Duration, now: Instant) -> ChannelInitializer {
        ChannelInitializer { deadline: now + timeout }
    }

    /// Advances the handshake by one step.
    pub fn advance(&mut self, transport: &mut dyn Transport, now: Instant) -> InitOutcome {
        match transport.init(now) {
            Ok(InitProgress::Active) => match transport.info() {
                Some(info) => InitOutcome::Active(info),
                None => InitOutcome::Failed(NetworkError::Fatal(ErrorType::ProtocolMismatch)),
            },
            Ok(InitProgress::SocketChanged { old, new }) => InitOutcome::SocketChanged { old, new },
            Ok(InitProgress::InProgress) | Err(NetworkError::Wait) => match self.check(now) {
                Ok(()) => InitOutcome::InProgress,
                Err(err) => InitOutcome::Failed(err),
            },
            Err(err) => InitOutcome::Failed(err),
        }
    }

    /// Fails once the handshake deadline has passed.
    #[inline]
    pub fn check(&self, now: Instant) -> NetworkResult<()> {
        match now >= self.deadline {
            true => Err(NetworkError::Fatal(ErrorType::HandshakeTimeout)),
            false => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    const TIMEOUT: Duration = Duration::from_secs(60);

    #[test]
    fn test_handshake_steps() {
        let start = Instant::now();
        let mut transport = MockTransport::new();
        transport.init_script.push_back(Ok(InitProgress::InProgress));
        transport
            .init_script
            .push_back(Ok(InitProgress::SocketChanged { old: 3, new: 4 }));

        let mut init = ChannelInitializer::new(TIMEOUT, start);

        assert_eq!(init.advance(&mut transport, start), InitOutcome::InProgress);
        assert_eq!(
            init.advance(&mut transport, start),
            InitOutcome::SocketChanged { old: 3, new: 4 }
        );

        match init.advance(&mut transport, start) {
            InitOutcome::Active(info) => assert_eq!(info.ping_timeout, Duration::from_secs(60)),
            other => panic!("Expected active channel, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_timeout() {
        let start = Instant::now();
        let mut transport = MockTransport::new();
        transport.init_script.push_back(Ok(InitProgress::InProgress));

        let mut init = ChannelInitializer::new(TIMEOUT, start);

        assert_eq!(
            init.advance(&mut transport, start + TIMEOUT),
            InitOutcome::Failed(NetworkError::Fatal(ErrorType::HandshakeTimeout))
        );
        assert!(init.check(start).is_ok());
    }

    #[test]
    fn test_handshake_failure() {
        let start = Instant::now();
        let mut transport = MockTransport::new();
        transport
            .init_script
            .push_back(Err(NetworkError::Fatal(ErrorType::ProtocolMismatch)));

        let mut init = ChannelInitializer::new(TIMEOUT, start);

        assert_eq!(
            init.advance(&mut transport, start),
            InitOutcome::Failed(NetworkError::Fatal(ErrorType::ProtocolMismatch))
        );
    }
}
