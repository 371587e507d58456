//! MIDI playback pipeline
//!
//! Provides the path from file bytes to live channel state:
//! - Parser: variable-length event records and cursors over track regions
//! - Smf: header and track chunks, sequential track lookup
//! - Channel: per-channel note state with a tick-synchronised active cache
//! - Scheduler: multi-track player driving a render backend
//! - Dump: human-readable event listing

pub mod channel;
pub mod dump;
pub mod parser;
pub mod scheduler;
pub mod smf;

pub use channel::Channel;
pub use parser::{decode_varint, encode_varint, Event, EventKind, EventStream, VarInt};
pub use scheduler::{
    LoopCount, PlayState, Player, PlayerConfig, RenderBackend, StopHandle, TempoMode,
    CHANNEL_COUNT,
};
pub use smf::{File, Track};
