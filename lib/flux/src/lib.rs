#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

/// Protocol identifier exchanged in the connection request.
pub const PROTOCOL_ID: u16 = 0x0052;
/// Major wire format version. Peers with a different major version are refused.
pub const MAJOR_VERSION: u8 = 14;
/// Minor wire format version.
pub const MINOR_VERSION: u8 = 1;

/// Process exit code used for unrecoverable failures.
pub const FAILURE: i32 = -1;

pub mod logging;
pub mod time;
#[macro_use]
pub mod util;
