use crate::net::channel::{Channel, ChannelConfig};
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use crate::transport::SocketId;
use mio::net::TcpListener;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Result of waiting for an inbound connection.
pub enum Accepted {
    Channel(Channel, SocketAddr),
    Timeout,
}

/// Owns the listening socket and its poll. Accepted channels start out initializing.
pub struct Acceptor {
    listener: TcpListener,
    poll: mio::Poll,
    events: mio::Events,
    config: ChannelConfig,
    next_id: SocketId,
}

impl Acceptor {
    const LISTENER_TOKEN: mio::Token = mio::Token(0);

    pub fn bind(address: &str, port: u16, config: ChannelConfig) -> NetworkResult<Acceptor> {
        let addr = (address, port)
            .to_socket_addrs()?
            .next()
            .ok_or(NetworkError::Fatal(ErrorType::AddrParse))?;

        let mut listener = TcpListener::bind(addr)?;
        let poll = mio::Poll::new()?;

        poll.registry()
            .register(&mut listener, Self::LISTENER_TOKEN, mio::Interest::READABLE)?;

        Ok(Acceptor {
            listener,
            poll,
            events: mio::Events::with_capacity(64),
            config,
            next_id: 0,
        })
    }

    #[inline]
    pub fn local_addr(&self) -> NetworkResult<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// Accepts the next pending connection, waiting at most `timeout` for one to arrive.
    pub fn accept_next(&mut self, timeout: Option<Duration>) -> NetworkResult<Accepted> {
        if let Some(accepted) = self.try_accept()? {
            return Ok(accepted);
        }

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => (),
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => return Ok(Accepted::Timeout),
            Err(err) => return Err(err.into()),
        }

        Ok(self.try_accept()?.unwrap_or(Accepted::Timeout))
    }

    fn try_accept(&mut self) -> NetworkResult<Option<Accepted>> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                // Latency matters more than throughput for small responses
                drop(stream.set_nodelay(true));
                self.next_id += 1;

                Ok(Some(Accepted::Channel(
                    Channel::new(stream, self.next_id, self.config),
                    addr,
                )))
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelState, Transport};
    use std::net;

    #[test]
    fn test_accept_timeout() {
        let mut acceptor = Acceptor::bind("127.0.0.1", 0, ChannelConfig::default()).unwrap();

        match acceptor.accept_next(Some(Duration::from_millis(20))).unwrap() {
            Accepted::Timeout => (),
            Accepted::Channel(_, addr) => panic!("Unexpected connection from {}", addr),
        }
    }

    #[test]
    fn test_accept_connection() {
        let mut acceptor = Acceptor::bind("127.0.0.1", 0, ChannelConfig::default()).unwrap();
        let _client = net::TcpStream::connect(acceptor.local_addr().unwrap()).unwrap();

        let mut accepted = None;
        for _ in 0..50 {
            if let Accepted::Channel(channel, _) = acceptor.accept_next(Some(Duration::from_millis(100))).unwrap() {
                accepted = Some(channel);
                break;
            }
        }

        let channel = accepted.expect("Connection was not accepted");
        assert_eq!(channel.state(), ChannelState::Initializing);
        assert_eq!(channel.id(), 1);
    }

    #[test]
    fn test_bind_invalid_address() {
        assert!(Acceptor::bind("not an address", 0, ChannelConfig::default()).is_err());
    }
}
