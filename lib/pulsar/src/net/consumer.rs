//! Blocking client side of the channel protocol. Backs the loopback tests and the probe utility.
use crate::net::frame::{self, ConnectAck, ConnectRequest, Frame, Reassembly};
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use flux::{MAJOR_VERSION, MINOR_VERSION, PROTOCOL_ID};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Received {
    Message(Vec<u8>),
    Ping,
}

enum Inbound {
    Ack(ConnectAck),
    Nak,
    Ping,
    Data(Vec<u8>),
    Fragment(bool, Vec<u8>),
    Other,
}

pub struct SimpleConsumer {
    stream: TcpStream,
    info: ConnectAck,
    pending: Vec<u8>,
    reassembly: Reassembly,
    chunk: Vec<u8>,
}

impl SimpleConsumer {
    /// Connects and performs the handshake. Reads give up after `timeout` without input.
    pub fn connect(addr: SocketAddr, ping_timeout: u16, timeout: Duration) -> NetworkResult<SimpleConsumer> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let mut consumer = SimpleConsumer {
            stream,
            info: ConnectAck {
                major: 0,
                minor: 0,
                ping_timeout: 0,
                max_fragment_size: 0,
            },
            pending: Vec::new(),
            reassembly: Reassembly::default(),
            chunk: vec![0; READ_CHUNK],
        };

        let mut out = Vec::new();
        ConnectRequest {
            protocol: PROTOCOL_ID,
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
            ping_timeout,
        }
        .write(&mut out);
        consumer.stream.write_all(&out)?;

        match consumer.read_frame()? {
            Inbound::Ack(ack) => consumer.info = ack,
            Inbound::Nak => return Err(NetworkError::Fatal(ErrorType::ProtocolMismatch)),
            _ => return Err(NetworkError::Fatal(ErrorType::IncorrectCategory)),
        }

        Ok(consumer)
    }

    /// Parameters granted by the server.
    #[inline]
    pub fn info(&self) -> ConnectAck {
        self.info
    }

    /// Sends an encoded message, fragmenting it to the negotiated size.
    pub fn send(&mut self, payload: &[u8]) -> NetworkResult<()> {
        let max_fragment_size = self.info.max_fragment_size as usize;
        let mut out = Vec::with_capacity(payload.len() + frame::HEADER_SIZE);

        if payload.len() <= max_fragment_size {
            frame::write_data(&mut out, payload);
        } else {
            let mut chunks = payload.chunks(frame::fragment_chunk_size(max_fragment_size)).peekable();
            while let Some(chunk) = chunks.next() {
                frame::write_fragment(&mut out, chunks.peek().is_none(), chunk);
            }
        }

        self.stream.write_all(&out).map_err(Into::into)
    }

    pub fn send_ping(&mut self) -> NetworkResult<()> {
        let mut out = Vec::new();
        frame::write_ping(&mut out);
        self.stream.write_all(&out).map_err(Into::into)
    }

    /// Blocks until a message or ping arrives. Returns `Wait` when the read timeout expires.
    pub fn receive(&mut self) -> NetworkResult<Received> {
        loop {
            match self.read_frame()? {
                Inbound::Ping => return Ok(Received::Ping),
                Inbound::Data(payload) => return Ok(Received::Message(payload)),
                Inbound::Fragment(last, chunk) => {
                    if let Some(payload) = self.reassembly.push(last, &chunk)? {
                        return Ok(Received::Message(payload));
                    }
                }
                _ => return Err(NetworkError::Fatal(ErrorType::IncorrectCategory)),
            }
        }
    }

    /// Blocks until a message arrives, skipping pings.
    pub fn receive_message(&mut self) -> NetworkResult<Vec<u8>> {
        loop {
            if let Received::Message(payload) = self.receive()? {
                return Ok(payload);
            }
        }
    }

    pub fn close(&mut self) {
        drop(self.stream.shutdown(Shutdown::Both));
    }

    fn read_frame(&mut self) -> NetworkResult<Inbound> {
        loop {
            let parsed = match Frame::parse(&self.pending) {
                Ok((frame, size)) => {
                    let inbound = match frame {
                        Frame::ConnectAck(ack) => Inbound::Ack(ack),
                        Frame::ConnectNak => Inbound::Nak,
                        Frame::Ping => Inbound::Ping,
                        Frame::Data(payload) => Inbound::Data(payload.to_vec()),
                        Frame::Fragment { last, chunk } => Inbound::Fragment(last, chunk.to_vec()),
                        Frame::ConnectRequest(_) => Inbound::Other,
                    };
                    Some((inbound, size))
                }
                Err(NetworkError::Wait) => None,
                Err(err) => return Err(err),
            };

            if let Some((inbound, size)) = parsed {
                self.pending.drain(..size);
                return Ok(inbound);
            }

            match self.stream.read(&mut self.chunk) {
                Ok(0) => return Err(NetworkError::Fatal(ErrorType::Disconnected)),
                Ok(count) => self.pending.extend_from_slice(&self.chunk[..count]),
                // Unix reports an expired read timeout as WouldBlock
                Err(ref err) if err.kind() == io::ErrorKind::TimedOut || err.kind() == io::ErrorKind::WouldBlock => {
                    return Err(NetworkError::Wait)
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::channel::tests::read_frame;
    use std::net::TcpListener;
    use std::thread;

    fn serve_ack(listener: TcpListener, max_fragment_size: u32) -> thread::JoinHandle<Vec<(u8, Vec<u8>)>> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut frames = vec![read_frame(&mut stream)];

            let mut out = Vec::new();
            ConnectAck {
                major: MAJOR_VERSION,
                minor: MINOR_VERSION,
                ping_timeout: 60,
                max_fragment_size,
            }
            .write(&mut out);
            frame::write_ping(&mut out);
            frame::write_fragment(&mut out, false, b"ab");
            frame::write_fragment(&mut out, true, b"cd");
            stream.write_all(&out).unwrap();

            // Two fragments of the consumer's message
            for _ in 0..2 {
                frames.push(read_frame(&mut stream));
            }
            frames
        })
    }

    #[test]
    fn test_handshake_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = serve_ack(listener, 4);

        let mut consumer = SimpleConsumer::connect(addr, 45, Duration::from_secs(2)).unwrap();

        assert_eq!(consumer.info().max_fragment_size, 4);
        assert_eq!(consumer.receive().unwrap(), Received::Ping);
        assert_eq!(consumer.receive_message().unwrap(), b"abcd".to_vec());

        consumer.send(b"xyzuvw").unwrap();

        let frames = server.join().unwrap();

        assert_eq!(frames[0].0, 1);
        assert_eq!(u16::from_be_bytes([frames[0].1[4], frames[0].1[5]]), 45);

        let chunks: Vec<&[u8]> = frames[1..].iter().map(|(_, payload)| &payload[..]).collect();
        assert_eq!(chunks, vec![&b"\x00xyz"[..], &b"\x01uvw"[..]]);
    }
}
