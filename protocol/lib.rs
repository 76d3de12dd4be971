//! Wire format shared by the instrument and its practice peer.
//!
//! A command is a bare concatenation of section markers and values:
//! `<:COMMAND:>PRACTICE<:FILEPATH:>/abs/path/to/take.wav`.

pub mod error;
pub mod framing;
pub mod message;

pub use error::Protocol;
pub use framing::{strip_header, Framing, RESPONSE_AOK, RESPONSE_ERR};
pub use message::{CommandKind, CommandMessage};
