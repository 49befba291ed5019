pub use crate::codec::{BinaryCodec, CodecError, MessageCodec};
pub use crate::config::ProviderConfig;
pub use crate::dictionary::DataDictionary;
pub use crate::net::consumer::{Received, SimpleConsumer};
pub use crate::net::support::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
pub use crate::rdm::{DataState, DomainType, Msg, MsgClass, MsgFlags, MsgKey, State, StateCode, StreamState};
pub use crate::server::Server;
pub use crate::transport::{ChannelInfo, ChannelState, Transport};
