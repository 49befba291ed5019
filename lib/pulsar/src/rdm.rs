//! Message model of the domain protocol: message classes, domains, stream and data states, keys
//! and the container types carried in message payloads.
use serde::de::{self, Deserializer};
use serde_derive::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Message category a stream belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct DomainType(pub u8);

impl DomainType {
    pub const LOGIN: DomainType = DomainType(1);
    pub const SOURCE: DomainType = DomainType(4);
    pub const DICTIONARY: DomainType = DomainType(5);
    pub const MARKET_PRICE: DomainType = DomainType(6);
    pub const MARKET_BY_ORDER: DomainType = DomainType(7);
    pub const MARKET_BY_PRICE: DomainType = DomainType(8);
    pub const MARKET_MAKER: DomainType = DomainType(9);
    pub const SYMBOL_LIST: DomainType = DomainType(10);
    pub const YIELD_CURVE: DomainType = DomainType(22);

    /// Returns true for the market data item domains.
    #[inline]
    pub fn is_item(self) -> bool {
        match self {
            DomainType::MARKET_PRICE
            | DomainType::MARKET_BY_ORDER
            | DomainType::MARKET_BY_PRICE
            | DomainType::MARKET_MAKER
            | DomainType::SYMBOL_LIST
            | DomainType::YIELD_CURVE => true,
            _ => false,
        }
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DomainType::LOGIN => write!(f, "LOGIN"),
            DomainType::SOURCE => write!(f, "SOURCE"),
            DomainType::DICTIONARY => write!(f, "DICTIONARY"),
            DomainType::MARKET_PRICE => write!(f, "MARKET_PRICE"),
            DomainType::MARKET_BY_ORDER => write!(f, "MARKET_BY_ORDER"),
            DomainType::MARKET_BY_PRICE => write!(f, "MARKET_BY_PRICE"),
            DomainType::MARKET_MAKER => write!(f, "MARKET_MAKER"),
            DomainType::SYMBOL_LIST => write!(f, "SYMBOL_LIST"),
            DomainType::YIELD_CURVE => write!(f, "YIELD_CURVE"),
            DomainType(other) => write!(f, "{}", other),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum MsgClass {
    Request,
    Refresh,
    Status,
    Update,
    Close,
    Ack,
    Generic,
    Post,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum StreamState {
    Unspecified,
    Open,
    NonStreaming,
    ClosedRecover,
    Closed,
    Redirected,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum DataState {
    NoChange,
    Ok,
    Suspect,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum StateCode {
    None,
    NotFound,
    Timeout,
    NotEntitled,
    InvalidArgument,
    UsageError,
    Preempted,
    NoResources,
    TooManyItems,
    AlreadyOpen,
    SourceUnknown,
    NotOpen,
}

/// Stream and data state carried by refresh and status messages.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub stream_state: StreamState,
    pub data_state: DataState,
    pub code: StateCode,
    pub text: String,
}

impl State {
    #[inline]
    pub fn new<S: Into<String>>(stream_state: StreamState, data_state: DataState, code: StateCode, text: S) -> State {
        State {
            stream_state,
            data_state,
            code,
            text: text.into(),
        }
    }

    /// Open stream with good data.
    #[inline]
    pub fn open_ok<S: Into<String>>(text: S) -> State {
        State::new(StreamState::Open, DataState::Ok, StateCode::None, text)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Timeliness {
    Unspecified,
    Realtime,
    DelayedUnknown,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Rate {
    Unspecified,
    TickByTick,
    JitConflated,
}

/// Quality of service.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Qos {
    pub timeliness: Timeliness,
    pub rate: Rate,
}

impl Qos {
    #[inline]
    pub fn realtime_tick_by_tick() -> Qos {
        Qos {
            timeliness: Timeliness::Realtime,
            rate: Rate::TickByTick,
        }
    }
}

/// Message flag set.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MsgFlags(pub u16);

impl MsgFlags {
    pub const NONE: MsgFlags = MsgFlags(0);
    pub const SOLICITED: MsgFlags = MsgFlags(0x0001);
    pub const REFRESH_COMPLETE: MsgFlags = MsgFlags(0x0002);
    pub const CLEAR_CACHE: MsgFlags = MsgFlags(0x0004);
    pub const STREAMING: MsgFlags = MsgFlags(0x0008);
    pub const PRIVATE_STREAM: MsgFlags = MsgFlags(0x0010);
    pub const NO_REFRESH: MsgFlags = MsgFlags(0x0020);

    #[inline]
    pub fn contains(self, other: MsgFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: MsgFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for MsgFlags {
    type Output = MsgFlags;

    #[inline]
    fn bitor(self, rhs: MsgFlags) -> MsgFlags {
        MsgFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for MsgFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: MsgFlags) {
        self.0 |= rhs.0;
    }
}

/// Login name types.
pub const NAME_TYPE_USER_NAME: u8 = 1;
pub const NAME_TYPE_EMAIL_ADDRESS: u8 = 2;
pub const NAME_TYPE_TOKEN: u8 = 3;

/// Source directory filter masks.
pub const SERVICE_INFO_FILTER: u32 = 0x01;
pub const SERVICE_STATE_FILTER: u32 = 0x02;
pub const SERVICE_GROUP_FILTER: u32 = 0x04;
pub const SERVICE_LOAD_FILTER: u32 = 0x08;
pub const SERVICE_DATA_FILTER: u32 = 0x10;
pub const SERVICE_LINK_FILTER: u32 = 0x20;

/// Source directory filter entry ids.
pub const SERVICE_INFO_ID: u8 = 1;
pub const SERVICE_STATE_ID: u8 = 2;
pub const SERVICE_GROUP_ID: u8 = 3;

/// Identifies the item a stream refers to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MsgKey {
    pub name: Option<String>,
    pub name_type: Option<u8>,
    pub service_id: Option<u16>,
    pub filter: Option<u32>,
    pub attrib: Option<ElementList>,
}

impl MsgKey {
    #[inline]
    pub fn named<S: Into<String>>(name: S) -> MsgKey {
        MsgKey {
            name: Some(name.into()),
            ..MsgKey::default()
        }
    }

    #[inline]
    pub fn with_filter(mut self, filter: u32) -> MsgKey {
        self.filter = Some(filter);
        self
    }

    #[inline]
    pub fn with_service_id(mut self, service_id: u16) -> MsgKey {
        self.service_id = Some(service_id);
        self
    }

    #[inline]
    pub fn with_name_type(mut self, name_type: u8) -> MsgKey {
        self.name_type = Some(name_type);
        self
    }

    #[inline]
    pub fn with_attrib(mut self, attrib: ElementList) -> MsgKey {
        self.attrib = Some(attrib);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementEntry {
    pub name: String,
    pub data: Data,
}

/// Ordered list of named entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementList {
    pub entries: Vec<ElementEntry>,
}

impl ElementList {
    #[inline]
    pub fn new() -> ElementList {
        ElementList { entries: Vec::new() }
    }

    #[inline]
    pub fn push<S: Into<String>>(&mut self, name: S, data: Data) -> &mut Self {
        self.entries.push(ElementEntry { name: name.into(), data });
        self
    }

    /// First entry with the given name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Data> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.data)
    }

    #[inline]
    pub fn ascii(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Data::Ascii(value)) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn uint(&self, name: &str) -> Option<u64> {
        match self.get(name) {
            Some(Data::UInt(value)) => Some(*value),
            _ => None,
        }
    }

    #[inline]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Data::Int(value)) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum MapAction {
    Update,
    Add,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub action: MapAction,
    pub key: u64,
    pub data: Data,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum FilterAction {
    Update,
    Set,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub id: u8,
    pub action: FilterAction,
    pub data: Data,
}

/// Sequence of uniform entries with an optional summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub summary: Option<Box<Data>>,
    pub entries: Vec<Data>,
}

/// Deepest container nesting accepted when decoding a payload.
pub const MAX_NESTING: usize = 64;

/// Payload data. Decoding refuses containers nested deeper than [`MAX_NESTING`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Data {
    NoData,
    UInt(u64),
    Int(i64),
    Ascii(String),
    Enum(u16),
    Qos(Qos),
    State(State),
    Array(Vec<Data>),
    ElementList(ElementList),
    Map(Vec<MapEntry>),
    FilterList(Vec<FilterEntry>),
    Series(Series),
}

impl Data {
    #[inline]
    pub fn ascii<S: Into<String>>(value: S) -> Data {
        Data::Ascii(value.into())
    }

    /// Array of ascii strings.
    pub fn ascii_array<I, S>(values: I) -> Data
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Data::Array(values.into_iter().map(|value| Data::Ascii(value.into())).collect())
    }

    /// Array of unsigned integers.
    pub fn uint_array<I: IntoIterator<Item = u64>>(values: I) -> Data {
        Data::Array(values.into_iter().map(Data::UInt).collect())
    }
}

thread_local! {
    static NESTING: Cell<usize> = Cell::new(0);
}

/// Holds one level of payload nesting on the decoding thread.
struct NestingGuard;

impl NestingGuard {
    fn enter() -> Option<NestingGuard> {
        NESTING.with(|depth| {
            if depth.get() >= MAX_NESTING {
                return None;
            }

            depth.set(depth.get() + 1);
            Some(NestingGuard)
        })
    }
}

impl Drop for NestingGuard {
    fn drop(&mut self) {
        NESTING.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Wire layout of `Data`, variant for variant. Nested values decode through `Data` again.
#[derive(Deserialize)]
#[serde(rename = "Data")]
enum WireData {
    NoData,
    UInt(u64),
    Int(i64),
    Ascii(String),
    Enum(u16),
    Qos(Qos),
    State(State),
    Array(Vec<Data>),
    ElementList(ElementList),
    Map(Vec<MapEntry>),
    FilterList(Vec<FilterEntry>),
    Series(Series),
}

impl From<WireData> for Data {
    fn from(wire: WireData) -> Data {
        match wire {
            WireData::NoData => Data::NoData,
            WireData::UInt(value) => Data::UInt(value),
            WireData::Int(value) => Data::Int(value),
            WireData::Ascii(value) => Data::Ascii(value),
            WireData::Enum(value) => Data::Enum(value),
            WireData::Qos(qos) => Data::Qos(qos),
            WireData::State(state) => Data::State(state),
            WireData::Array(values) => Data::Array(values),
            WireData::ElementList(elements) => Data::ElementList(elements),
            WireData::Map(entries) => Data::Map(entries),
            WireData::FilterList(entries) => Data::FilterList(entries),
            WireData::Series(series) => Data::Series(series),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Data {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Data, D::Error> {
        let _level = NestingGuard::enter().ok_or_else(|| {
            <D::Error as de::Error>::custom(format_args!("payload nested deeper than {} levels", MAX_NESTING))
        })?;

        <WireData as serde::Deserialize>::deserialize(deserializer).map(Data::from)
    }
}

/// A message on a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    pub class: MsgClass,
    pub domain: DomainType,
    pub stream_id: i32,
    pub flags: MsgFlags,
    pub key: Option<MsgKey>,
    pub state: Option<State>,
    pub payload: Data,
}

impl Msg {
    #[inline]
    pub fn new(class: MsgClass, domain: DomainType, stream_id: i32) -> Msg {
        Msg {
            class,
            domain,
            stream_id,
            flags: MsgFlags::NONE,
            key: None,
            state: None,
            payload: Data::NoData,
        }
    }

    /// Streaming request for the given key.
    #[inline]
    pub fn request(domain: DomainType, stream_id: i32, key: MsgKey) -> Msg {
        let mut msg = Msg::new(MsgClass::Request, domain, stream_id);
        msg.flags = MsgFlags::STREAMING;
        msg.key = Some(key);
        msg
    }

    #[inline]
    pub fn refresh(domain: DomainType, stream_id: i32, state: State) -> Msg {
        let mut msg = Msg::new(MsgClass::Refresh, domain, stream_id);
        msg.state = Some(state);
        msg
    }

    #[inline]
    pub fn status(domain: DomainType, stream_id: i32, state: State) -> Msg {
        let mut msg = Msg::new(MsgClass::Status, domain, stream_id);
        msg.state = Some(state);
        msg
    }

    #[inline]
    pub fn close(domain: DomainType, stream_id: i32) -> Msg {
        Msg::new(MsgClass::Close, domain, stream_id)
    }

    #[inline]
    pub fn with_flags(mut self, flags: MsgFlags) -> Msg {
        self.flags |= flags;
        self
    }

    #[inline]
    pub fn with_key(mut self, key: MsgKey) -> Msg {
        self.key = Some(key);
        self
    }

    #[inline]
    pub fn with_payload(mut self, payload: Data) -> Msg {
        self.payload = payload;
        self
    }

    #[inline]
    pub fn has_flag(&self, flag: MsgFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Name carried in the message key, if any.
    #[inline]
    pub fn key_name(&self) -> Option<&str> {
        self.key.as_ref().and_then(|key| key.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let mut flags = MsgFlags::SOLICITED | MsgFlags::CLEAR_CACHE;

        assert!(flags.contains(MsgFlags::SOLICITED));
        assert!(!flags.contains(MsgFlags::REFRESH_COMPLETE));

        flags.insert(MsgFlags::REFRESH_COMPLETE);

        assert!(flags.contains(MsgFlags::SOLICITED | MsgFlags::REFRESH_COMPLETE));
    }

    #[test]
    fn test_item_domains() {
        assert!(DomainType::MARKET_PRICE.is_item());
        assert!(DomainType::YIELD_CURVE.is_item());
        assert!(!DomainType::LOGIN.is_item());
        assert!(!DomainType(200).is_item());
    }

    #[test]
    fn test_element_list_lookup() {
        let mut elements = ElementList::new();
        elements
            .push("ApplicationId", Data::ascii("256"))
            .push("SupportBatchRequests", Data::UInt(0));

        assert_eq!(elements.ascii("ApplicationId"), Some("256"));
        assert_eq!(elements.uint("SupportBatchRequests"), Some(0));
        assert_eq!(elements.ascii("SupportBatchRequests"), None);
        assert_eq!(elements.get("Position"), None);
    }

    #[test]
    fn test_key_name() {
        let msg = Msg::request(DomainType::LOGIN, 1, MsgKey::named("user1"));

        assert_eq!(msg.key_name(), Some("user1"));
        assert!(msg.has_flag(MsgFlags::STREAMING));
        assert_eq!(Msg::close(DomainType::LOGIN, 1).key_name(), None);
    }
}
