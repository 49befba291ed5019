//! The message codec capability and its bincode implementation.
use crate::dictionary::{self, DataDictionary};
use crate::net::frame::MAX_MESSAGE_SIZE;
use crate::net::support::{CodecFailure, ErrorType, NetworkError};
use crate::rdm::{Data, Msg, Series};
use crate::transport::TransportBuffer;
use bincode::Options;
use std::fmt;

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CodecError {
    Decode(String),
    Encode(String),
    BufferTooSmall { needed: usize, capacity: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecError::Decode(reason) => write!(f, "decode failed: {}", reason),
            CodecError::Encode(reason) => write!(f, "encode failed: {}", reason),
            CodecError::BufferTooSmall { needed, capacity } => {
                write!(f, "{} bytes needed, buffer holds {}", needed, capacity)
            }
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for NetworkError {
    #[inline]
    fn from(err: CodecError) -> Self {
        let failure = match err {
            CodecError::Decode(_) => CodecFailure::Decode,
            CodecError::Encode(_) => CodecFailure::Encode,
            CodecError::BufferTooSmall { .. } => CodecFailure::BufferTooSmall,
        };

        NetworkError::Fatal(ErrorType::Codec(failure))
    }
}

/// Where a multi-part dictionary encode stands after producing a part.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DictionaryProgress {
    /// More entries remain, continue from the given cursor.
    PartEncoded(i32),
    /// The part holds the last entries.
    Complete,
}

/// One part of a dictionary payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryPart {
    pub series: Series,
    pub progress: DictionaryProgress,
}

/// Encodes and decodes messages.
pub trait MessageCodec {
    fn decode(&self, raw: &[u8]) -> CodecResult<Msg>;

    /// Exact size of the encoded message.
    fn encoded_len(&self, msg: &Msg) -> CodecResult<usize>;

    /// Encodes the message into the buffer. Fails without writing if it does not fit.
    fn encode(&self, msg: &Msg, buffer: &mut TransportBuffer) -> CodecResult<()>;

    /// Exact size of an encoded series.
    fn series_len(&self, series: &Series) -> CodecResult<usize>;

    /// Encodes field definitions starting at fid `cursor` into a series of at most `max_size`
    /// bytes. The part starting at the lowest fid carries the dictionary summary.
    fn encode_field_dictionary_part(
        &self,
        dictionary: &DataDictionary,
        cursor: i32,
        verbosity: u32,
        max_size: usize,
    ) -> CodecResult<DictionaryPart>;

    /// Encodes enum tables starting at table index `cursor` into a series of at most `max_size`
    /// bytes. The part starting at index zero carries the dictionary summary.
    fn encode_enum_dictionary_part(
        &self,
        dictionary: &DataDictionary,
        cursor: i32,
        verbosity: u32,
        max_size: usize,
    ) -> CodecResult<DictionaryPart>;
}

/// Codec backed by bincode with fixed width integers, which keeps entry sizes additive.
#[derive(Debug, Copy, Clone, Default)]
pub struct BinaryCodec;

#[inline]
fn wire() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_MESSAGE_SIZE as u64)
}

impl BinaryCodec {
    /// Exact size of an encoded payload value.
    #[inline]
    pub fn data_len(&self, data: &Data) -> CodecResult<usize> {
        wire()
            .serialized_size(data)
            .map(|size| size as usize)
            .map_err(|err| CodecError::Encode(err.to_string()))
    }

    /// Encodes a message into a fresh vector.
    #[inline]
    pub fn encode_to_vec(&self, msg: &Msg) -> CodecResult<Vec<u8>> {
        wire().serialize(msg).map_err(|err| CodecError::Encode(err.to_string()))
    }

    /// Fills a series with entries until the next one would exceed `max_size`.
    fn fill_series<I>(&self, summary: Option<Data>, entries: I, max_size: usize) -> CodecResult<DictionaryPart>
    where
        I: Iterator<Item = (i32, Data)>,
    {
        let mut series = Series {
            summary: summary.map(Box::new),
            entries: Vec::new(),
        };

        let mut size = self.series_len(&series)?;

        if size > max_size {
            return Err(CodecError::BufferTooSmall {
                needed: size,
                capacity: max_size,
            });
        }

        for (cursor, entry) in entries {
            let entry_size = self.data_len(&entry)?;

            if size + entry_size > max_size {
                if series.entries.is_empty() {
                    return Err(CodecError::BufferTooSmall {
                        needed: size + entry_size,
                        capacity: max_size,
                    });
                }

                return Ok(DictionaryPart {
                    series,
                    progress: DictionaryProgress::PartEncoded(cursor),
                });
            }

            size += entry_size;
            series.entries.push(entry);
        }

        Ok(DictionaryPart {
            series,
            progress: DictionaryProgress::Complete,
        })
    }
}

impl MessageCodec for BinaryCodec {
    #[inline]
    fn decode(&self, raw: &[u8]) -> CodecResult<Msg> {
        wire().deserialize(raw).map_err(|err| CodecError::Decode(err.to_string()))
    }

    #[inline]
    fn encoded_len(&self, msg: &Msg) -> CodecResult<usize> {
        wire()
            .serialized_size(msg)
            .map(|size| size as usize)
            .map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn encode(&self, msg: &Msg, buffer: &mut TransportBuffer) -> CodecResult<()> {
        let needed = self.encoded_len(msg)?;

        if needed > buffer.free_capacity() {
            return Err(CodecError::BufferTooSmall {
                needed,
                capacity: buffer.free_capacity(),
            });
        }

        wire()
            .serialize_into(&mut *buffer, msg)
            .map_err(|err| CodecError::Encode(err.to_string()))
    }

    #[inline]
    fn series_len(&self, series: &Series) -> CodecResult<usize> {
        wire()
            .serialized_size(series)
            .map(|size| size as usize)
            .map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn encode_field_dictionary_part(
        &self,
        dictionary: &DataDictionary,
        cursor: i32,
        verbosity: u32,
        max_size: usize,
    ) -> CodecResult<DictionaryPart> {
        let summary = match cursor <= i32::from(dictionary.min_fid()) {
            true => Some(dictionary::field_summary(dictionary)),
            false => None,
        };

        let entries = dictionary
            .fields_from(cursor)
            .filter(|_| verbosity & dictionary::VERBOSITY_MINIMAL != 0)
            .map(|def| (i32::from(def.fid), dictionary::field_entry(def, verbosity)));

        self.fill_series(summary, entries, max_size)
    }

    fn encode_enum_dictionary_part(
        &self,
        dictionary: &DataDictionary,
        cursor: i32,
        verbosity: u32,
        max_size: usize,
    ) -> CodecResult<DictionaryPart> {
        let start = cursor.max(0) as usize;

        let summary = match start == 0 {
            true => Some(dictionary::enum_summary(dictionary)),
            false => None,
        };

        let entries = dictionary
            .enum_tables()
            .iter()
            .enumerate()
            .skip(start)
            .filter(|_| verbosity & dictionary::VERBOSITY_MINIMAL != 0)
            .map(|(idx, table)| (idx as i32, dictionary::enum_entry(table, verbosity)));

        self.fill_series(summary, entries, max_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::fixtures;
    use crate::dictionary::{VERBOSITY_INFO, VERBOSITY_VERBOSE};
    use crate::rdm::{DomainType, MsgClass, MsgFlags, MsgKey, State, MAX_NESTING};

    #[test]
    fn test_message_roundtrip() {
        let codec = BinaryCodec;
        let msg = Msg::refresh(DomainType::LOGIN, 1, State::open_ok("Login accepted by host localhost"))
            .with_flags(MsgFlags::SOLICITED | MsgFlags::REFRESH_COMPLETE)
            .with_key(MsgKey::named("user1"));

        let size = codec.encoded_len(&msg).unwrap();
        let mut buffer = TransportBuffer::new(size);
        codec.encode(&msg, &mut buffer).unwrap();

        assert_eq!(buffer.len(), size);
        assert_eq!(codec.decode(buffer.data()).unwrap(), msg);
    }

    #[test]
    fn test_encode_into_small_buffer() {
        let codec = BinaryCodec;
        let msg = Msg::request(DomainType::LOGIN, 1, MsgKey::named("user1"));
        let size = codec.encoded_len(&msg).unwrap();
        let mut buffer = TransportBuffer::new(size - 1);

        assert_eq!(
            codec.encode(&msg, &mut buffer),
            Err(CodecError::BufferTooSmall {
                needed: size,
                capacity: size - 1
            })
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_garbage() {
        let codec = BinaryCodec;

        match codec.decode(&[0xff, 0xff, 0xff]) {
            Err(CodecError::Decode(_)) => (),
            other => panic!("Expected decode error, got {:?}", other),
        }
    }

    fn nested(depth: usize) -> Data {
        (0..depth).fold(Data::NoData, |inner, _| Data::Array(vec![inner]))
    }

    #[test]
    fn test_decode_refuses_deep_nesting() {
        let codec = BinaryCodec;

        let shallow = Msg::new(MsgClass::Generic, DomainType::MARKET_PRICE, 5).with_payload(nested(MAX_NESTING - 1));
        let deep = Msg::new(MsgClass::Generic, DomainType::MARKET_PRICE, 5).with_payload(nested(MAX_NESTING + 1));

        match codec.decode(&codec.encode_to_vec(&deep).unwrap()) {
            Err(CodecError::Decode(_)) => (),
            other => panic!("Expected decode error, got {:?}", other),
        }

        // The nesting count starts over for the next message
        assert_eq!(codec.decode(&codec.encode_to_vec(&shallow).unwrap()).unwrap(), shallow);
    }

    #[test]
    fn test_decode_refuses_nesting_bomb() {
        // Array tag and a single element, repeated far past any sane depth
        let mut raw = Vec::with_capacity(12 * 1_000_000 + 4);
        for _ in 0..1_000_000 {
            raw.extend_from_slice(&7u32.to_le_bytes());
            raw.extend_from_slice(&1u64.to_le_bytes());
        }
        raw.extend_from_slice(&0u32.to_le_bytes());

        assert!(raw.len() < MAX_MESSAGE_SIZE);

        match wire().deserialize::<Data>(&raw) {
            Err(err) => assert!(err.to_string().contains("nested deeper")),
            Ok(_) => panic!("Expected nesting error"),
        }
    }

    #[test]
    fn test_field_part_respects_budget() {
        let codec = BinaryCodec;
        let dictionary = fixtures::dictionary();
        let budget = 400;

        let part = codec
            .encode_field_dictionary_part(&dictionary, i32::from(dictionary.min_fid()), VERBOSITY_VERBOSE, budget)
            .unwrap();

        assert!(part.series.summary.is_some());
        assert!(!part.series.entries.is_empty());
        assert!(codec.series_len(&part.series).unwrap() <= budget);

        match part.progress {
            DictionaryProgress::PartEncoded(next) => {
                let rest = codec
                    .encode_field_dictionary_part(&dictionary, next, VERBOSITY_VERBOSE, budget)
                    .unwrap();
                assert!(rest.series.summary.is_none());
            }
            DictionaryProgress::Complete => panic!("Fixture must not fit a {} byte part", budget),
        }
    }

    #[test]
    fn test_info_verbosity_has_summary_only() {
        let codec = BinaryCodec;
        let dictionary = fixtures::dictionary();

        let part = codec
            .encode_enum_dictionary_part(&dictionary, 0, VERBOSITY_INFO, 12800)
            .unwrap();

        assert!(part.series.summary.is_some());
        assert!(part.series.entries.is_empty());
        assert_eq!(part.progress, DictionaryProgress::Complete);
    }

    #[test]
    fn test_entry_larger_than_budget() {
        let codec = BinaryCodec;
        let dictionary = fixtures::dictionary();
        let empty = codec.series_len(&Series::default()).unwrap();

        // Room for an entry-less series without summary only
        let result = codec.encode_enum_dictionary_part(&dictionary, 1, VERBOSITY_VERBOSE, empty);

        match result {
            Err(CodecError::BufferTooSmall { capacity, .. }) => assert_eq!(capacity, empty),
            other => panic!("Expected buffer too small, got {:?}", other),
        }
    }
}
