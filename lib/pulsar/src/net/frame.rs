//! Framing of the connection oriented wire protocol.
//!
//! Every frame starts with a five byte header: the category (u8) followed by the payload length
//! (u32, big endian). Messages larger than the negotiated fragment size travel as a sequence of
//! `Fragment` frames whose first payload byte flags the final fragment.
use crate::net::buffer::BUF_SIZE_INCREMENT;
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

pub const HEADER_SIZE: usize = 5;
/// Largest frame payload, bounded by the channel read buffer.
pub const MAX_FRAME_PAYLOAD: usize = BUF_SIZE_INCREMENT - HEADER_SIZE;
/// Largest reassembled message.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const LAST_FRAGMENT: u8 = 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Category {
    ConnectRequest = 1,
    ConnectAck = 2,
    ConnectNak = 3,
    Ping = 4,
    Data = 5,
    Fragment = 6,
}

impl From<Category> for u8 {
    #[inline]
    fn from(cat: Category) -> Self {
        cat as u8
    }
}

/// Sent by the client to open the channel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConnectRequest {
    pub protocol: u16,
    pub major: u8,
    pub minor: u8,
    pub ping_timeout: u16,
}

/// Sent by the server once the channel parameters have been negotiated.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConnectAck {
    pub major: u8,
    pub minor: u8,
    pub ping_timeout: u16,
    pub max_fragment_size: u32,
}

#[derive(Debug, Eq, PartialEq)]
pub enum Frame<'a> {
    ConnectRequest(ConnectRequest),
    ConnectAck(ConnectAck),
    ConnectNak,
    Ping,
    Data(&'a [u8]),
    Fragment { last: bool, chunk: &'a [u8] },
}

impl<'a> Frame<'a> {
    /// Parses the frame at the start of the supplied buffer. Returns the frame along with the
    /// number of bytes it occupies, or `Wait` if the frame is incomplete.
    pub fn parse(mut buffer: &'a [u8]) -> NetworkResult<(Frame<'a>, usize)> {
        if buffer.len() < HEADER_SIZE {
            return Err(NetworkError::Wait);
        }

        let category = buffer.read_u8()?;
        let payload_size = buffer.read_u32::<BigEndian>()? as usize;

        if payload_size > MAX_FRAME_PAYLOAD {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        if buffer.len() < payload_size {
            return Err(NetworkError::Wait);
        }

        let mut payload = &buffer[..payload_size];

        let frame = match category {
            1 => Frame::ConnectRequest(ConnectRequest {
                protocol: payload.read_u16::<BigEndian>()?,
                major: payload.read_u8()?,
                minor: payload.read_u8()?,
                ping_timeout: payload.read_u16::<BigEndian>()?,
            }),
            2 => Frame::ConnectAck(ConnectAck {
                major: payload.read_u8()?,
                minor: payload.read_u8()?,
                ping_timeout: payload.read_u16::<BigEndian>()?,
                max_fragment_size: payload.read_u32::<BigEndian>()?,
            }),
            3 => Frame::ConnectNak,
            4 => Frame::Ping,
            5 => {
                if payload.is_empty() {
                    return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
                }
                Frame::Data(payload)
            }
            6 => {
                if payload.len() < 2 {
                    return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
                }
                Frame::Fragment {
                    last: payload[0] == LAST_FRAGMENT,
                    chunk: &payload[1..],
                }
            }
            _ => return Err(NetworkError::Fatal(ErrorType::IncorrectCategory)),
        };

        Ok((frame, HEADER_SIZE + payload_size))
    }
}

/// Serializes a frame header followed by the payload.
#[inline]
fn write_frame(out: &mut Vec<u8>, category: Category, payload: &[u8]) {
    out.reserve(HEADER_SIZE + payload.len());
    // Writes into a Vec cannot fail
    drop(out.write_u8(category.into()));
    drop(out.write_u32::<BigEndian>(payload.len() as u32));
    out.extend_from_slice(payload);
}

impl ConnectRequest {
    pub fn write(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::with_capacity(6);
        drop(payload.write_u16::<BigEndian>(self.protocol));
        drop(payload.write_u8(self.major));
        drop(payload.write_u8(self.minor));
        drop(payload.write_u16::<BigEndian>(self.ping_timeout));
        write_frame(out, Category::ConnectRequest, &payload);
    }
}

impl ConnectAck {
    pub fn write(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::with_capacity(8);
        drop(payload.write_u8(self.major));
        drop(payload.write_u8(self.minor));
        drop(payload.write_u16::<BigEndian>(self.ping_timeout));
        drop(payload.write_u32::<BigEndian>(self.max_fragment_size));
        write_frame(out, Category::ConnectAck, &payload);
    }
}

#[inline]
pub fn write_nak(out: &mut Vec<u8>) {
    write_frame(out, Category::ConnectNak, &[]);
}

#[inline]
pub fn write_ping(out: &mut Vec<u8>) {
    write_frame(out, Category::Ping, &[]);
}

#[inline]
pub fn write_data(out: &mut Vec<u8>, payload: &[u8]) {
    write_frame(out, Category::Data, payload);
}

/// Writes one fragment frame carrying `chunk`.
#[inline]
pub fn write_fragment(out: &mut Vec<u8>, last: bool, chunk: &[u8]) {
    out.reserve(HEADER_SIZE + 1 + chunk.len());
    drop(out.write_u8(Category::Fragment.into()));
    drop(out.write_u32::<BigEndian>(chunk.len() as u32 + 1));
    out.push(if last { LAST_FRAGMENT } else { 0 });
    out.extend_from_slice(chunk);
}

/// Largest chunk carried by a single fragment frame.
#[inline]
pub fn fragment_chunk_size(max_fragment_size: usize) -> usize {
    max_fragment_size.saturating_sub(1).max(1)
}

/// Collects fragment chunks until the final one arrives.
#[derive(Default)]
pub struct Reassembly {
    data: Vec<u8>,
}

impl Reassembly {
    /// Appends a chunk, returning the complete message once the final fragment is seen.
    pub fn push(&mut self, last: bool, chunk: &[u8]) -> NetworkResult<Option<Vec<u8>>> {
        if self.data.len() + chunk.len() > MAX_MESSAGE_SIZE {
            self.data.clear();
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        self.data.extend_from_slice(chunk);

        match last {
            true => Ok(Some(std::mem::replace(&mut self.data, Vec::new()))),
            false => Ok(None),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request() {
        let request = ConnectRequest {
            protocol: 82,
            major: 14,
            minor: 1,
            ping_timeout: 60,
        };

        let mut out = Vec::new();
        request.write(&mut out);

        assert_eq!(out.len(), HEADER_SIZE + 6);
        assert_eq!(Frame::parse(&out).unwrap(), (Frame::ConnectRequest(request), out.len()));
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut out = Vec::new();
        write_data(&mut out, b"hello");

        assert_eq!(Frame::parse(&out[..3]).err(), Some(NetworkError::Wait));
        assert_eq!(Frame::parse(&out[..7]).err(), Some(NetworkError::Wait));
        assert_eq!(Frame::parse(&out).unwrap(), (Frame::Data(b"hello"), out.len()));
    }

    #[test]
    fn test_consecutive_frames() {
        let mut out = Vec::new();
        write_ping(&mut out);
        write_data(&mut out, &[1, 2, 3]);

        let (frame, consumed) = Frame::parse(&out).unwrap();
        assert_eq!(frame, Frame::Ping);
        assert_eq!(consumed, HEADER_SIZE);

        let (frame, _) = Frame::parse(&out[consumed..]).unwrap();
        assert_eq!(frame, Frame::Data(&[1, 2, 3]));
    }

    #[test]
    fn test_incorrect_category() {
        let out = vec![42, 0, 0, 0, 0];

        assert_eq!(
            Frame::parse(&out).err(),
            Some(NetworkError::Fatal(ErrorType::IncorrectCategory))
        );
    }

    #[test]
    fn test_empty_data_frame() {
        let mut out = Vec::new();
        write_data(&mut out, &[]);

        assert_eq!(
            Frame::parse(&out).err(),
            Some(NetworkError::Fatal(ErrorType::EmptyPayload))
        );
    }

    #[test]
    fn test_oversized_frame() {
        let mut out = vec![Category::Data.into()];
        out.write_u32::<BigEndian>(MAX_FRAME_PAYLOAD as u32 + 1).unwrap();

        assert_eq!(
            Frame::parse(&out).err(),
            Some(NetworkError::Fatal(ErrorType::PayloadTooLarge))
        );
    }

    #[test]
    fn test_fragment_reassembly() {
        let message: Vec<u8> = (0..100u8).collect();
        let mut out = Vec::new();

        let chunks: Vec<_> = message.chunks(30).collect();
        for (idx, chunk) in chunks.iter().enumerate() {
            write_fragment(&mut out, idx == chunks.len() - 1, chunk);
        }

        let mut reassembly = Reassembly::default();
        let mut offset = 0;
        let mut complete = None;

        while offset < out.len() {
            let (frame, consumed) = Frame::parse(&out[offset..]).unwrap();
            offset += consumed;

            if let Frame::Fragment { last, chunk } = frame {
                complete = reassembly.push(last, chunk).unwrap();
            }
        }

        assert_eq!(complete, Some(message));
        assert!(reassembly.is_empty());
    }
}
