//! Per-domain request bookkeeping.
//!
//! Each handler owns the request records of its domain for one channel and answers requests
//! through a `Responder`. Protocol rejections are answered with a status message and never
//! escalate, only transport failures are returned to the dispatcher.
use crate::codec::MessageCodec;
use crate::net::frame::MAX_FRAME_PAYLOAD;
use crate::net::support::NetworkResult;
use crate::rdm::{DomainType, Msg};
use crate::transport::Transport;
use crate::writer::{Delivery, OutboundWriter};
use flux::logging;

pub mod dictionary;
pub mod directory;
pub mod login;

pub use self::dictionary::DictionaryHandler;
pub use self::directory::DirectoryHandler;
pub use self::login::LoginHandler;

/// Everything a handler needs to answer on its channel.
pub struct Responder<'a> {
    transport: &'a mut dyn Transport,
    writer: &'a mut OutboundWriter,
    codec: &'a dyn MessageCodec,
    log: &'a logging::Logger,
}

impl<'a> Responder<'a> {
    #[inline]
    pub fn new(
        transport: &'a mut dyn Transport,
        writer: &'a mut OutboundWriter,
        codec: &'a dyn MessageCodec,
        log: &'a logging::Logger,
    ) -> Responder<'a> {
        Responder {
            transport,
            writer,
            codec,
            log,
        }
    }

    /// Encodes and sends a message on the channel.
    #[inline]
    pub fn send(&mut self, msg: &Msg) -> NetworkResult<Delivery> {
        self.writer.send(&mut *self.transport, self.codec, msg)
    }

    /// Negotiated fragment size, or the largest frame payload before negotiation.
    #[inline]
    pub fn max_fragment_size(&self) -> usize {
        self.transport
            .info()
            .map(|info| info.max_fragment_size)
            .unwrap_or(MAX_FRAME_PAYLOAD)
    }

    #[inline]
    pub fn codec(&self) -> &'a dyn MessageCodec {
        self.codec
    }

    #[inline]
    pub fn log(&self) -> &'a logging::Logger {
        self.log
    }
}

/// Request bookkeeping for one of the administrative domains.
pub trait DomainHandler {
    fn domain(&self) -> DomainType;

    fn on_request(&mut self, responder: &mut Responder, msg: &Msg) -> NetworkResult<()>;

    /// Releases the record open on `stream_id`, if any. Closes are never answered.
    fn on_close(&mut self, responder: &mut Responder, stream_id: i32) -> NetworkResult<()>;

    /// Tells the client that every open stream is going away.
    fn on_shutdown(&mut self, responder: &mut Responder) -> NetworkResult<()>;

    /// Forgets every record.
    fn reset(&mut self);
}

/// Receives messages on the market data item domains.
pub trait ItemHandler {
    fn on_message(&mut self, responder: &mut Responder, msg: &Msg) -> NetworkResult<()>;
}
