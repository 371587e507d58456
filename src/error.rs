//! Crate-wide error type.
//!
//! Header and track-tag failures abort parsing of a file. Unknown events are
//! contained by the scheduler (only the owning track stops) and only surface
//! as errors from explicit checks such as [`crate::pipeline::Event::checked_kind`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("malformed track at byte {offset}: {reason}")]
    MalformedTrack { offset: usize, reason: String },

    #[error("invalid track index {index}: file only contains {available} tracks")]
    InvalidTrackIndex { index: usize, available: usize },

    #[error("unknown event kind (status {status:#04x}) at byte {offset}")]
    UnknownEventKind { status: u8, offset: usize },

    #[error("sink write failed: {0}")]
    SinkIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
