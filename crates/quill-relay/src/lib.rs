//! Wire protocol for pushing incremental completion output to clients.
//!
//! Each event is a single `data: <JSON>` line followed by a blank line,
//! where the JSON is one of `{"chunk": ...}`, `{"done": true}` or
//! `{"error": ...}`. The server encodes with [`encode_frame`]; receivers
//! reassemble with [`RelayDecoder`], which tolerates events split across
//! network reads and multiple events arriving in one read.

mod decoder;
mod protocol;

pub use decoder::{DecodeError, RelayDecoder};
pub use protocol::{RelayEvent, encode_frame};
