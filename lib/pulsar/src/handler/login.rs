use crate::handler::{DomainHandler, Responder};
use crate::net::support::NetworkResult;
use crate::rdm::{
    Data, DataState, DomainType, ElementList, Msg, MsgFlags, MsgKey, State, StateCode, StreamState,
    NAME_TYPE_USER_NAME,
};
use flux::logging;

pub const ELEMENT_APPLICATION_ID: &str = "ApplicationId";
pub const ELEMENT_APPLICATION_NAME: &str = "ApplicationName";
pub const ELEMENT_POSITION: &str = "Position";
pub const ELEMENT_PASSWORD: &str = "Password";
pub const ELEMENT_INSTANCE_ID: &str = "InstanceId";
pub const ELEMENT_ROLE: &str = "Role";
pub const ELEMENT_SUPPORT_BATCH_REQUESTS: &str = "SupportBatchRequests";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoginRejectReason {
    MaxLoginRequestsReached,
    NoUserNameInRequest,
}

impl LoginRejectReason {
    #[inline]
    pub fn code(self) -> StateCode {
        match self {
            LoginRejectReason::MaxLoginRequestsReached => StateCode::TooManyItems,
            LoginRejectReason::NoUserNameInRequest => StateCode::UsageError,
        }
    }

    pub fn text(self, stream_id: i32) -> String {
        match self {
            LoginRejectReason::MaxLoginRequestsReached => format!(
                "Login request rejected for stream id {} - max request count reached",
                stream_id
            ),
            LoginRejectReason::NoUserNameInRequest => format!(
                "Login request rejected for stream id {} - request does not contain user name",
                stream_id
            ),
        }
    }
}

/// The login stream open on a channel.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LoginRequestRecord {
    pub stream_id: i32,
    pub user_name: String,
    pub application_id: Option<String>,
    pub application_name: Option<String>,
    pub position: Option<String>,
    pub password: Option<String>,
    pub instance_id: Option<String>,
    pub role: Option<u64>,
}

/// Text form of an ascii or numeric attribute.
fn text_attribute(attrib: &ElementList, name: &str) -> Option<String> {
    match attrib.get(name) {
        Some(Data::Ascii(text)) => Some(text.clone()),
        Some(Data::UInt(value)) => Some(value.to_string()),
        Some(Data::Int(value)) => Some(value.to_string()),
        _ => None,
    }
}

impl LoginRequestRecord {
    pub fn from_request(stream_id: i32, user_name: &str, attrib: Option<&ElementList>) -> LoginRequestRecord {
        let mut record = LoginRequestRecord {
            stream_id,
            user_name: user_name.to_string(),
            ..LoginRequestRecord::default()
        };

        if let Some(attrib) = attrib {
            record.application_id = text_attribute(attrib, ELEMENT_APPLICATION_ID);
            record.application_name = text_attribute(attrib, ELEMENT_APPLICATION_NAME);
            record.position = text_attribute(attrib, ELEMENT_POSITION);
            record.password = text_attribute(attrib, ELEMENT_PASSWORD);
            record.instance_id = text_attribute(attrib, ELEMENT_INSTANCE_ID);
            record.role = attrib.uint(ELEMENT_ROLE);
        }

        record
    }
}

/// Accepts at most one login stream per channel.
pub struct LoginHandler {
    host_name: String,
    application_id: String,
    application_name: String,
    record: Option<LoginRequestRecord>,
}

impl LoginHandler {
    pub fn new<S: Into<String>>(host_name: S, application_id: S, application_name: S) -> LoginHandler {
        LoginHandler {
            host_name: host_name.into(),
            application_id: application_id.into(),
            application_name: application_name.into(),
            record: None,
        }
    }

    #[inline]
    pub fn record(&self) -> Option<&LoginRequestRecord> {
        self.record.as_ref()
    }

    /// User name of a login key. Keys naming anything but a user are treated as nameless.
    fn user_name(key: Option<&MsgKey>) -> Option<&str> {
        let key = key?;

        match key.name_type {
            None | Some(NAME_TYPE_USER_NAME) => key.name.as_deref().filter(|name| !name.is_empty()),
            Some(_) => None,
        }
    }

    fn reject(&self, responder: &mut Responder, stream_id: i32, reason: LoginRejectReason) -> NetworkResult<()> {
        logging::info!(responder.log(), "login request rejected"; "stream_id" => stream_id, "reason" => ?reason);

        let status = Msg::status(
            DomainType::LOGIN,
            stream_id,
            State::new(StreamState::ClosedRecover, DataState::Suspect, reason.code(), reason.text(stream_id)),
        );

        responder.send(&status).map(drop)
    }

    fn refresh(&self, record: &LoginRequestRecord) -> Msg {
        let application_id = record.application_id.as_ref().unwrap_or(&self.application_id);

        let mut attrib = ElementList::new();
        attrib
            .push(ELEMENT_APPLICATION_ID, Data::ascii(application_id.as_str()))
            .push(ELEMENT_APPLICATION_NAME, Data::ascii(self.application_name.as_str()));

        if let Some(position) = &record.position {
            attrib.push(ELEMENT_POSITION, Data::ascii(position.as_str()));
        }

        attrib.push(ELEMENT_SUPPORT_BATCH_REQUESTS, Data::UInt(0));

        let key = MsgKey::named(record.user_name.as_str())
            .with_name_type(NAME_TYPE_USER_NAME)
            .with_attrib(attrib);

        Msg::refresh(
            DomainType::LOGIN,
            record.stream_id,
            State::open_ok(format!("Login accepted by host {}", self.host_name)),
        )
        .with_flags(MsgFlags::SOLICITED | MsgFlags::REFRESH_COMPLETE | MsgFlags::CLEAR_CACHE)
        .with_key(key)
    }
}

impl DomainHandler for LoginHandler {
    #[inline]
    fn domain(&self) -> DomainType {
        DomainType::LOGIN
    }

    fn on_request(&mut self, responder: &mut Responder, msg: &Msg) -> NetworkResult<()> {
        let user_name = match Self::user_name(msg.key.as_ref()) {
            Some(user_name) => user_name,
            None => return self.reject(responder, msg.stream_id, LoginRejectReason::NoUserNameInRequest),
        };

        if let Some(record) = &self.record {
            if record.stream_id != msg.stream_id {
                return self.reject(responder, msg.stream_id, LoginRejectReason::MaxLoginRequestsReached);
            }
        }

        let attrib = msg.key.as_ref().and_then(|key| key.attrib.as_ref());
        let record = LoginRequestRecord::from_request(msg.stream_id, user_name, attrib);

        logging::info!(responder.log(), "login request"; "stream_id" => msg.stream_id, "user" => user_name);

        let refresh = self.refresh(&record);
        self.record = Some(record);

        responder.send(&refresh).map(drop)
    }

    fn on_close(&mut self, responder: &mut Responder, stream_id: i32) -> NetworkResult<()> {
        if self.record.as_ref().map(|record| record.stream_id) == Some(stream_id) {
            logging::info!(responder.log(), "login stream closed"; "stream_id" => stream_id);
            self.record = None;
        }

        Ok(())
    }

    fn on_shutdown(&mut self, responder: &mut Responder) -> NetworkResult<()> {
        let record = match self.record.take() {
            Some(record) => record,
            None => return Ok(()),
        };

        let status = Msg::status(
            DomainType::LOGIN,
            record.stream_id,
            State::new(StreamState::Closed, DataState::Suspect, StateCode::None, "Login stream closed"),
        );

        responder.send(&status).map(drop)
    }

    #[inline]
    fn reset(&mut self) {
        self.record = None;
    }
}
