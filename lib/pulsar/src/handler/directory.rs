use crate::config::ServiceConfig;
use crate::dictionary::{ENUM_TYPE_DICTIONARY_NAME, FIELD_DICTIONARY_NAME};
use crate::handler::{DomainHandler, Responder};
use crate::net::support::NetworkResult;
use crate::rdm::{
    Data, DataState, DomainType, ElementList, FilterAction, FilterEntry, MapAction, MapEntry, Msg, MsgFlags, MsgKey,
    Qos, State, StateCode, StreamState, SERVICE_GROUP_FILTER, SERVICE_INFO_FILTER, SERVICE_INFO_ID,
    SERVICE_STATE_FILTER, SERVICE_STATE_ID,
};
use flux::logging;

/// Filters a directory request has to ask for.
pub const REQUIRED_FILTER: u32 = SERVICE_INFO_FILTER | SERVICE_STATE_FILTER | SERVICE_GROUP_FILTER;

const SERVICE_STATE_UP: u64 = 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DirectoryRejectReason {
    IncorrectFilterFlags,
    MaxSrcdirRequestsReached,
}

impl DirectoryRejectReason {
    #[inline]
    pub fn code(self) -> StateCode {
        match self {
            DirectoryRejectReason::IncorrectFilterFlags => StateCode::UsageError,
            DirectoryRejectReason::MaxSrcdirRequestsReached => StateCode::TooManyItems,
        }
    }

    pub fn text(self, stream_id: i32) -> String {
        match self {
            DirectoryRejectReason::IncorrectFilterFlags => format!(
                "Source directory request rejected for stream id {} - request must minimally have \
                 RDM_DIRECTORY_SERVICE_INFO_FILTER, RDM_DIRECTORY_SERVICE_STATE_FILTER, and \
                 RDM_DIRECTORY_SERVICE_GROUP_FILTER filter flags",
                stream_id
            ),
            DirectoryRejectReason::MaxSrcdirRequestsReached => format!(
                "Source directory request rejected for stream id {} - max request count reached",
                stream_id
            ),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DirectoryRequestRecord {
    pub stream_id: i32,
    pub service_name: String,
    pub service_id: u16,
}

/// Publishes the single service of this provider.
pub struct DirectoryHandler {
    service: ServiceConfig,
    record: Option<DirectoryRequestRecord>,
}

impl DirectoryHandler {
    pub fn new(service: ServiceConfig) -> DirectoryHandler {
        DirectoryHandler { service, record: None }
    }

    #[inline]
    pub fn record(&self) -> Option<&DirectoryRequestRecord> {
        self.record.as_ref()
    }

    fn reject(&self, responder: &mut Responder, stream_id: i32, reason: DirectoryRejectReason) -> NetworkResult<()> {
        logging::info!(responder.log(), "directory request rejected"; "stream_id" => stream_id, "reason" => ?reason);

        let status = Msg::status(
            DomainType::SOURCE,
            stream_id,
            State::new(StreamState::ClosedRecover, DataState::Suspect, reason.code(), reason.text(stream_id)),
        );

        responder.send(&status).map(drop)
    }

    fn info(&self) -> FilterEntry {
        let mut info = ElementList::new();
        info.push("Name", Data::ascii(self.service.name.as_str()))
            .push("Vendor", Data::ascii(self.service.vendor.as_str()))
            .push(
                "Capabilities",
                Data::uint_array(self.service.capabilities.iter().map(|&domain| u64::from(domain))),
            )
            .push(
                "DictionariesProvided",
                Data::ascii_array(vec![FIELD_DICTIONARY_NAME, ENUM_TYPE_DICTIONARY_NAME]),
            )
            .push(
                "DictionariesUsed",
                Data::ascii_array(vec![FIELD_DICTIONARY_NAME, ENUM_TYPE_DICTIONARY_NAME]),
            )
            .push("QoS", Data::Array(vec![Data::Qos(Qos::realtime_tick_by_tick())]));

        FilterEntry {
            id: SERVICE_INFO_ID,
            action: FilterAction::Set,
            data: Data::ElementList(info),
        }
    }

    fn state(&self) -> FilterEntry {
        let mut state = ElementList::new();
        state
            .push("ServiceState", Data::UInt(SERVICE_STATE_UP))
            .push("AcceptingRequests", Data::UInt(1))
            .push("Status", Data::State(State::open_ok("OK")));

        FilterEntry {
            id: SERVICE_STATE_ID,
            action: FilterAction::Set,
            data: Data::ElementList(state),
        }
    }

    fn refresh(&self, stream_id: i32, filter: u32) -> Msg {
        let mut filters = Vec::with_capacity(2);
        if filter & SERVICE_INFO_FILTER != 0 {
            filters.push(self.info());
        }
        if filter & SERVICE_STATE_FILTER != 0 {
            filters.push(self.state());
        }

        let service = MapEntry {
            action: MapAction::Add,
            key: u64::from(self.service.id),
            data: Data::FilterList(filters),
        };

        Msg::refresh(
            DomainType::SOURCE,
            stream_id,
            State::open_ok("Source Directory Refresh Completed"),
        )
        .with_flags(MsgFlags::SOLICITED | MsgFlags::REFRESH_COMPLETE | MsgFlags::CLEAR_CACHE)
        .with_key(MsgKey::default().with_filter(filter))
        .with_payload(Data::Map(vec![service]))
    }
}

impl DomainHandler for DirectoryHandler {
    #[inline]
    fn domain(&self) -> DomainType {
        DomainType::SOURCE
    }

    fn on_request(&mut self, responder: &mut Responder, msg: &Msg) -> NetworkResult<()> {
        let filter = msg.key.as_ref().and_then(|key| key.filter).unwrap_or(0);

        if filter & REQUIRED_FILTER != REQUIRED_FILTER {
            return self.reject(responder, msg.stream_id, DirectoryRejectReason::IncorrectFilterFlags);
        }

        if let Some(record) = &self.record {
            if record.stream_id != msg.stream_id {
                return self.reject(responder, msg.stream_id, DirectoryRejectReason::MaxSrcdirRequestsReached);
            }
        }

        logging::info!(responder.log(), "directory request"; "stream_id" => msg.stream_id, "filter" => filter);

        self.record = Some(DirectoryRequestRecord {
            stream_id: msg.stream_id,
            service_name: self.service.name.clone(),
            service_id: self.service.id,
        });

        let refresh = self.refresh(msg.stream_id, filter);
        responder.send(&refresh).map(drop)
    }

    fn on_close(&mut self, responder: &mut Responder, stream_id: i32) -> NetworkResult<()> {
        if self.record.as_ref().map(|record| record.stream_id) == Some(stream_id) {
            logging::info!(responder.log(), "directory stream closed"; "stream_id" => stream_id);
            self.record = None;
        }

        Ok(())
    }

    #[inline]
    fn on_shutdown(&mut self, _responder: &mut Responder) -> NetworkResult<()> {
        self.record = None;
        Ok(())
    }

    #[inline]
    fn reset(&mut self) {
        self.record = None;
    }
}
