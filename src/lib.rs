//! Standard MIDI file player with a small built-in synthesizer
//!
//! Bytes go through [`pipeline`] (parsing and scheduling into live channel
//! state), [`generator`] turns that state into 16-bit samples, and [`sink`]
//! and [`wav`] carry the samples out.

pub mod error;
pub mod generator;
pub mod pipeline;
pub mod sink;
pub mod wav;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};

/// Validate the file header and borrow `bytes` as a MIDI file
pub fn parse(bytes: &[u8]) -> Result<pipeline::File<'_>> {
    pipeline::File::parse(bytes)
}
