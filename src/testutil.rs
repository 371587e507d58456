//! Builders for assembling MIDI file bytes in tests

use crate::pipeline::parser::encode_varint;

/// Accumulates delta-prefixed events for one track chunk
#[derive(Default)]
pub(crate) struct TrackBuilder {
    events: Vec<u8>,
}

impl TrackBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn raw(mut self, delta: u64, body: &[u8]) -> Self {
        self.events.extend(encode_varint(delta));
        self.events.extend_from_slice(body);
        self
    }

    pub(crate) fn note_on(self, delta: u64, channel: u8, key: u8, velocity: u8) -> Self {
        self.raw(delta, &[0x90 | channel, key, velocity])
    }

    pub(crate) fn note_off(self, delta: u64, channel: u8, key: u8) -> Self {
        self.raw(delta, &[0x80 | channel, key, 0x40])
    }

    pub(crate) fn program(self, delta: u64, channel: u8, program: u8) -> Self {
        self.raw(delta, &[0xc0 | channel, program])
    }

    pub(crate) fn tempo(self, delta: u64, micros_per_quarter: u32) -> Self {
        let [_, a, b, c] = micros_per_quarter.to_be_bytes();
        self.raw(delta, &[0xff, 0x51, 0x03, a, b, c])
    }

    pub(crate) fn text(self, delta: u64, text: &str) -> Self {
        let mut body = vec![0xff, 0x01];
        body.extend(encode_varint(text.len() as u64));
        body.extend_from_slice(text.as_bytes());
        self.raw(delta, &body)
    }

    pub(crate) fn end(self, delta: u64) -> Self {
        self.raw(delta, &[0xff, 0x2f, 0x00])
    }

    /// Finished "MTrk" chunk, header included
    pub(crate) fn build(self) -> Vec<u8> {
        let mut chunk = b"MTrk".to_vec();
        chunk.extend((self.events.len() as u32).to_be_bytes());
        chunk.extend(self.events);
        chunk
    }
}

/// A complete file: "MThd" header followed by the given track chunks
pub(crate) fn smf(format: u16, division: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = b"MThd".to_vec();
    bytes.extend(6u32.to_be_bytes());
    bytes.extend(format.to_be_bytes());
    bytes.extend((tracks.len() as u16).to_be_bytes());
    bytes.extend(division.to_be_bytes());

    for track in tracks {
        bytes.extend_from_slice(track);
    }

    bytes
}
