use std::fmt;
use std::io;
use std::net;

pub type NetworkResult<T> = Result<T, NetworkError>;

/// `Wait` signals a transient condition (would block, no buffers yet), `Fatal` ends the channel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NetworkError {
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CodecFailure {
    Decode,
    Encode,
    BufferTooSmall,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorType {
    PayloadTooLarge,
    EmptyPayload,
    IncorrectCategory,
    ProtocolMismatch,
    HandshakeTimeout,
    LostContact,
    Disconnected,
    Closed,
    NoBuffers,
    UnexpectedMessage,
    Codec(CodecFailure),
    AddrParse,
    Io(io::ErrorKind),
}

impl ErrorType {
    /// Numeric identifier reported next to the error text.
    pub fn code(self) -> i32 {
        match self {
            ErrorType::Io(_) => -1,
            ErrorType::AddrParse => -2,
            ErrorType::Disconnected => -3,
            ErrorType::Closed => -4,
            ErrorType::HandshakeTimeout => -5,
            ErrorType::LostContact => -6,
            ErrorType::ProtocolMismatch => -7,
            ErrorType::IncorrectCategory => -8,
            ErrorType::PayloadTooLarge => -9,
            ErrorType::EmptyPayload => -10,
            ErrorType::NoBuffers => -11,
            ErrorType::UnexpectedMessage => -12,
            ErrorType::Codec(_) => -13,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorType::PayloadTooLarge => write!(f, "payload exceeds the maximum size"),
            ErrorType::EmptyPayload => write!(f, "empty payload"),
            ErrorType::IncorrectCategory => write!(f, "unexpected frame category"),
            ErrorType::ProtocolMismatch => write!(f, "protocol or version mismatch"),
            ErrorType::HandshakeTimeout => write!(f, "channel initialization timed out"),
            ErrorType::LostContact => write!(f, "lost contact with client"),
            ErrorType::Disconnected => write!(f, "connection closed by peer"),
            ErrorType::Closed => write!(f, "channel is closed"),
            ErrorType::NoBuffers => write!(f, "no output buffers available"),
            ErrorType::UnexpectedMessage => write!(f, "unexpected message class"),
            ErrorType::Codec(CodecFailure::Decode) => write!(f, "message decoding failed"),
            ErrorType::Codec(CodecFailure::Encode) => write!(f, "message encoding failed"),
            ErrorType::Codec(CodecFailure::BufferTooSmall) => write!(f, "message does not fit the buffer"),
            ErrorType::AddrParse => write!(f, "invalid address"),
            ErrorType::Io(kind) => write!(f, "I/O error: {:?}", kind),
        }
    }
}

impl NetworkError {
    /// Numeric identifier of the error, zero for `Wait`.
    #[inline]
    pub fn code(self) -> i32 {
        match self {
            NetworkError::Wait => 0,
            NetworkError::Fatal(kind) => kind.code(),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkError::Wait => write!(f, "operation would block"),
            NetworkError::Fatal(kind) => kind.fmt(f),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<ErrorType> for NetworkError {
    #[inline]
    fn from(kind: ErrorType) -> Self {
        NetworkError::Fatal(kind)
    }
}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            io::ErrorKind::UnexpectedEof => NetworkError::Fatal(ErrorType::Disconnected),
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetworkError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddrParse)
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(NetworkError::Wait) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_conversion() {
        let wait: NetworkError = io::Error::from(io::ErrorKind::WouldBlock).into();
        let reset: NetworkError = io::Error::from(io::ErrorKind::ConnectionReset).into();

        assert_eq!(wait, NetworkError::Wait);
        assert_eq!(reset, NetworkError::Fatal(ErrorType::Io(io::ErrorKind::ConnectionReset)));
    }

    #[test]
    fn test_has_failed() {
        let ok: NetworkResult<()> = Ok(());
        let wait: NetworkResult<()> = Err(NetworkError::Wait);
        let fatal: NetworkResult<()> = Err(NetworkError::Fatal(ErrorType::Closed));

        assert!(!ok.has_failed());
        assert!(!wait.has_failed());
        assert!(fatal.has_failed());
    }

    #[test]
    fn test_codes_are_distinct() {
        let kinds = [
            ErrorType::PayloadTooLarge,
            ErrorType::EmptyPayload,
            ErrorType::IncorrectCategory,
            ErrorType::ProtocolMismatch,
            ErrorType::HandshakeTimeout,
            ErrorType::LostContact,
            ErrorType::Disconnected,
            ErrorType::Closed,
            ErrorType::NoBuffers,
            ErrorType::UnexpectedMessage,
            ErrorType::Codec(CodecFailure::Decode),
            ErrorType::AddrParse,
            ErrorType::Io(io::ErrorKind::Other),
        ];

        let mut codes: Vec<i32> = kinds.iter().map(|kind| kind.code()).collect();
        codes.sort();
        codes.dedup();

        assert_eq!(codes.len(), kinds.len());
        assert!(codes.iter().all(|&code| code < 0));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            NetworkError::Fatal(ErrorType::LostContact).to_string(),
            "lost contact with client"
        );
    }
}
