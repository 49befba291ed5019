use crate::dictionary::{DataDictionary, DictionaryKind, DictionaryParts, VERBOSITY_NORMAL};
use crate::handler::{DomainHandler, Responder};
use crate::net::support::NetworkResult;
use crate::rdm::{DataState, DomainType, Msg, MsgKey, State, StateCode, StreamState};
use flux::logging;
use std::rc::Rc;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DictionaryRejectReason {
    UnknownDictionaryName,
    MaxDictionaryRequestsReached,
}

impl DictionaryRejectReason {
    fn state(self, stream_id: i32) -> State {
        match self {
            DictionaryRejectReason::UnknownDictionaryName => State::new(
                StreamState::Closed,
                DataState::Suspect,
                StateCode::NotFound,
                format!(
                    "Dictionary request rejected for stream id {} - dictionary name unknown",
                    stream_id
                ),
            ),
            DictionaryRejectReason::MaxDictionaryRequestsReached => State::new(
                StreamState::ClosedRecover,
                DataState::Suspect,
                StateCode::TooManyItems,
                format!(
                    "Dictionary request rejected for stream id {} - max request count reached",
                    stream_id
                ),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryRequestRecord {
    pub stream_id: i32,
    pub name: String,
    pub key: MsgKey,
}

/// Serves the field and enum type dictionaries, one stream each.
pub struct DictionaryHandler {
    dictionary: Rc<DataDictionary>,
    service_id: u16,
    field: Option<DictionaryRequestRecord>,
    enum_type: Option<DictionaryRequestRecord>,
}

impl DictionaryHandler {
    pub fn new(dictionary: Rc<DataDictionary>, service_id: u16) -> DictionaryHandler {
        DictionaryHandler {
            dictionary,
            service_id,
            field: None,
            enum_type: None,
        }
    }

    #[inline]
    pub fn record(&self, kind: DictionaryKind) -> Option<&DictionaryRequestRecord> {
        match kind {
            DictionaryKind::Field => self.field.as_ref(),
            DictionaryKind::EnumType => self.enum_type.as_ref(),
        }
    }

    #[inline]
    fn slot(&mut self, kind: DictionaryKind) -> &mut Option<DictionaryRequestRecord> {
        match kind {
            DictionaryKind::Field => &mut self.field,
            DictionaryKind::EnumType => &mut self.enum_type,
        }
    }

    fn reject(&self, responder: &mut Responder, stream_id: i32, reason: DictionaryRejectReason) -> NetworkResult<()> {
        logging::info!(responder.log(), "dictionary request rejected"; "stream_id" => stream_id, "reason" => ?reason);

        let status = Msg::status(DomainType::DICTIONARY, stream_id, reason.state(stream_id));
        responder.send(&status).map(drop)
    }

    /// Sends every part of the dictionary. Stops at the first failed send.
    fn send_parts(&self, responder: &mut Responder, kind: DictionaryKind, record: &DictionaryRequestRecord) -> NetworkResult<()> {
        let max_size = kind.max_part_size(responder.max_fragment_size());
        let parts = DictionaryParts::new(
            responder.codec(),
            &self.dictionary,
            kind,
            record.stream_id,
            record.key.clone(),
            max_size,
        );

        let mut count = 0usize;
        for part in parts {
            responder.send(&part?)?;
            count += 1;
        }

        logging::debug!(responder.log(), "dictionary sent"; "name" => kind.name(), "stream_id" => record.stream_id, "parts" => count);
        Ok(())
    }
}

impl DomainHandler for DictionaryHandler {
    #[inline]
    fn domain(&self) -> DomainType {
        DomainType::DICTIONARY
    }

    fn on_request(&mut self, responder: &mut Responder, msg: &Msg) -> NetworkResult<()> {
        let kind = match msg.key_name().and_then(DictionaryKind::from_name) {
            Some(kind) => kind,
            None => return self.reject(responder, msg.stream_id, DictionaryRejectReason::UnknownDictionaryName),
        };

        if let Some(record) = self.record(kind) {
            if record.stream_id != msg.stream_id {
                return self.reject(responder, msg.stream_id, DictionaryRejectReason::MaxDictionaryRequestsReached);
            }
        }

        let filter = msg.key.as_ref().and_then(|key| key.filter).unwrap_or(VERBOSITY_NORMAL);
        let record = DictionaryRequestRecord {
            stream_id: msg.stream_id,
            name: kind.name().to_string(),
            key: MsgKey::named(kind.name())
                .with_service_id(self.service_id)
                .with_filter(filter),
        };

        logging::info!(responder.log(), "dictionary request"; "stream_id" => msg.stream_id, "name" => kind.name(), "filter" => filter);

        let result = self.send_parts(responder, kind, &record);
        *self.slot(kind) = Some(record);
        result
    }

    fn on_close(&mut self, responder: &mut Responder, stream_id: i32) -> NetworkResult<()> {
        for kind in [DictionaryKind::Field, DictionaryKind::EnumType].iter() {
            let slot = self.slot(*kind);

            if slot.as_ref().map(|record| record.stream_id) == Some(stream_id) {
                logging::info!(responder.log(), "dictionary stream closed"; "stream_id" => stream_id, "name" => kind.name());
                *slot = None;
            }
        }

        Ok(())
    }

    fn on_shutdown(&mut self, responder: &mut Responder) -> NetworkResult<()> {
        for record in self.field.take().into_iter().chain(self.enum_type.take()) {
            let status = Msg::status(
                DomainType::DICTIONARY,
                record.stream_id,
                State::new(StreamState::Closed, DataState::Suspect, StateCode::None, "Dictionary stream closed"),
            );

            responder.send(&status)?;
        }

        Ok(())
    }

    #[inline]
    fn reset(&mut self) {
        self.field = None;
        self.enum_type = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::fixtures;
    use crate::dictionary::{VERBOSITY_VERBOSE, ENUM_TYPE_DICTIONARY_NAME, FIELD_DICTIONARY_NAME};
    use crate::handler::testing::with_responder;
    use crate::mock::MockTransport;
    use crate::rdm::{Data, MsgClass, MsgFlags};
    use crate::transport::ChannelInfo;
    use std::time::Duration;

    fn handler() -> DictionaryHandler {
        DictionaryHandler::new(Rc::new(fixtures::dictionary()), 1)
    }

    fn download(stream_id: i32, name: &str, verbosity: u32) -> Msg {
        Msg::request(
            DomainType::DICTIONARY,
            stream_id,
            MsgKey::named(name).with_service_id(1).with_filter(verbosity),
        )
    }

    fn request(handler: &mut DictionaryHandler, transport: &mut MockTransport, msg: &Msg) -> Vec<Msg> {
        with_responder(transport, |responder| handler.on_request(responder, msg)).unwrap();
        transport.take_decoded()
    }

    /// Rebuilds a dictionary from refresh parts, checking the part flags on the way.
    fn apply(parts: &[Msg], kind: DictionaryKind, into: &mut DataDictionary) {
        for (index, part) in parts.iter().enumerate() {
            assert_eq!(part.class, MsgClass::Refresh);
            assert!(part.has_flag(MsgFlags::SOLICITED));
            assert_eq!(part.has_flag(MsgFlags::CLEAR_CACHE), index == 0);
            assert_eq!(part.has_flag(MsgFlags::REFRESH_COMPLETE), index == parts.len() - 1);

            let series = match &part.payload {
                Data::Series(series) => series,
                other => panic!("Expected series payload, got {:?}", other),
            };

            match kind {
                DictionaryKind::Field => into.apply_field_part(series).unwrap(),
                DictionaryKind::EnumType => into.apply_enum_part(series).unwrap(),
            }
        }
    }

    #[test]
    fn test_field_dictionary_download() {
        let mut transport = MockTransport::active();
        transport.info = Some(ChannelInfo {
            max_fragment_size: 600,
            ping_timeout: Duration::from_secs(60),
        });
        let mut handler = handler();

        let parts = request(&mut handler, &mut transport, &download(3, FIELD_DICTIONARY_NAME, VERBOSITY_VERBOSE));
        assert!(parts.len() > 1);

        let key = parts[0].key.as_ref().unwrap();
        assert_eq!(key.name.as_deref(), Some(FIELD_DICTIONARY_NAME));
        assert_eq!(key.service_id, Some(1));
        assert_eq!(key.filter, Some(VERBOSITY_VERBOSE));

        let mut rebuilt = DataDictionary::new();
        apply(&parts, DictionaryKind::Field, &mut rebuilt);

        let source = fixtures::dictionary();
        assert_eq!(rebuilt.field_count(), source.field_count());
        assert_eq!(rebuilt.field(22), source.field(22));
        assert_eq!(rebuilt.field_tag("Version"), Some("4.20.29"));

        assert_eq!(handler.record(DictionaryKind::Field).map(|record| record.stream_id), Some(3));
        assert!(handler.record(DictionaryKind::EnumType).is_none());
    }

    #[test]
    fn test_enum_dictionary_download() {
        let mut transport = MockTransport::active();
        let mut handler = handler();

        let parts = request(&mut handler, &mut transport, &download(4, ENUM_TYPE_DICTIONARY_NAME, VERBOSITY_VERBOSE));
        assert_eq!(parts.len(), 1);

        let mut rebuilt = DataDictionary::new();
        apply(&parts, DictionaryKind::EnumType, &mut rebuilt);

        assert_eq!(rebuilt.enum_display(15, 840), Some("USD"));
        assert_eq!(rebuilt.enum_display(131, 1), Some("CLS"));
        assert_eq!(rebuilt.enum_tag("DT_Version"), Some("17.91"));
    }

    #[test]
    fn test_unknown_dictionary_rejected() {
        let mut transport = MockTransport::active();
        let mut handler = handler();

        let sent = request(&mut handler, &mut transport, &download(5, "RWFUnknown", VERBOSITY_NORMAL));
        assert_eq!(sent.len(), 1);

        let state = sent[0].state.as_ref().unwrap();
        assert_eq!(sent[0].class, MsgClass::Status);
        assert_eq!(state.stream_state, StreamState::Closed);
        assert_eq!(state.code, StateCode::NotFound);
        assert_eq!(state.text, "Dictionary request rejected for stream id 5 - dictionary name unknown");

        let nameless = Msg::new(MsgClass::Request, DomainType::DICTIONARY, 6);
        let sent = request(&mut handler, &mut transport, &nameless);
        assert_eq!(sent[0].state.as_ref().unwrap().code, StateCode::NotFound);

        assert!(handler.record(DictionaryKind::Field).is_none());
        assert!(handler.record(DictionaryKind::EnumType).is_none());
    }

    #[test]
    fn test_dictionary_in_use_rejected() {
        let mut transport = MockTransport::active();
        let mut handler = handler();

        request(&mut handler, &mut transport, &download(3, FIELD_DICTIONARY_NAME, VERBOSITY_NORMAL));
        request(&mut handler, &mut transport, &download(4, ENUM_TYPE_DICTIONARY_NAME, VERBOSITY_NORMAL));

        let sent = request(&mut handler, &mut transport, &download(5, FIELD_DICTIONARY_NAME, VERBOSITY_NORMAL));
        assert_eq!(sent.len(), 1);

        let state = sent[0].state.as_ref().unwrap();
        assert_eq!(state.stream_state, StreamState::ClosedRecover);
        assert_eq!(state.code, StateCode::TooManyItems);
        assert!(state.text.ends_with("max request count reached"));

        // Reissue on the open stream sends the dictionary again
        let parts = request(&mut handler, &mut transport, &download(3, FIELD_DICTIONARY_NAME, VERBOSITY_NORMAL));
        assert_eq!(parts[0].class, MsgClass::Refresh);
    }

    #[test]
    fn test_close_matches_stream() {
        let mut transport = MockTransport::active();
        let mut handler = handler();

        request(&mut handler, &mut transport, &download(3, FIELD_DICTIONARY_NAME, VERBOSITY_NORMAL));
        request(&mut handler, &mut transport, &download(4, ENUM_TYPE_DICTIONARY_NAME, VERBOSITY_NORMAL));

        with_responder(&mut transport, |responder| handler.on_close(responder, 4)).unwrap();

        assert!(handler.record(DictionaryKind::Field).is_some());
        assert!(handler.record(DictionaryKind::EnumType).is_none());
        assert!(transport.written.is_empty());
    }

    #[test]
    fn test_shutdown_closes_open_streams() {
        let mut transport = MockTransport::active();
        let mut handler = handler();

        request(&mut handler, &mut transport, &download(3, FIELD_DICTIONARY_NAME, VERBOSITY_NORMAL));
        request(&mut handler, &mut transport, &download(4, ENUM_TYPE_DICTIONARY_NAME, VERBOSITY_NORMAL));

        with_responder(&mut transport, |responder| handler.on_shutdown(responder)).unwrap();

        let sent = transport.take_decoded();
        let streams: Vec<i32> = sent.iter().map(|msg| msg.stream_id).collect();

        assert_eq!(streams, vec![3, 4]);
        for msg in &sent {
            assert_eq!(msg.class, MsgClass::Status);
            assert_eq!(msg.state.as_ref().unwrap().text, "Dictionary stream closed");
        }
        assert!(handler.record(DictionaryKind::Field).is_none());
    }

    #[test]
    fn test_part_send_failure_propagates() {
        use crate::net::support::{ErrorType, NetworkError};

        let mut transport = MockTransport::active();
        transport
            .buffer_script
            .push_back(Err(NetworkError::Fatal(ErrorType::Closed)));
        let mut handler = handler();

        let msg = download(3, FIELD_DICTIONARY_NAME, VERBOSITY_NORMAL);
        let result = with_responder(&mut transport, |responder| handler.on_request(responder, &msg));

        assert_eq!(result, Err(NetworkError::Fatal(ErrorType::Closed)));
    }
}
