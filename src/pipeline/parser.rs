//! Event-level parser for Standard MIDI File track data
//!
//! Track events have no fixed layout:
//! <delta-time varint> <status> <payload...>
//!
//! - Channel voice: status 0x8n-0xEn, one or two data bytes
//! - Meta:          0xFF <type> [<varint length> <payload>]
//! - SysEx:         0xF0/0xF7 <varint length> <payload>
//!
//! Nothing is cached. An [`Event`] is a borrowed view at a byte position and
//! every accessor re-derives kind and length from the bytes.

use crate::error::{Error, Result};

/// A decoded variable-length quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt {
    pub value: u64,
    /// Number of bytes consumed
    pub len: usize,
}

/// Read a big-endian u32 from the first four bytes
pub fn decode_u32be(bytes: &[u8]) -> Option<u32> {
    let field: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(field))
}

/// Read a big-endian u16 from the first two bytes
pub fn decode_u16be(bytes: &[u8]) -> Option<u16> {
    let field: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
    Some(u16::from_be_bytes(field))
}

/// Decode a MIDI variable-length integer
///
/// Each byte carries 7 payload bits; the high bit flags a continuation.
/// There is no cap on the number of bytes. A region that ends mid-number
/// yields whatever was accumulated, with `len` equal to the bytes available.
pub fn decode_varint(bytes: &[u8]) -> VarInt {
    let mut value = 0u64;

    for (i, &byte) in bytes.iter().enumerate() {
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return VarInt { value, len: i + 1 };
        }
    }

    VarInt {
        value,
        len: bytes.len(),
    }
}

/// Encode a value as a MIDI variable-length integer
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    let mut rest = value >> 7;

    while rest > 0 {
        out.push((rest & 0x7f) as u8 | 0x80);
        rest >>= 7;
    }

    out.reverse();
    out
}

/// Classification of a track event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // Channel voice
    NoteOn,
    NoteOff,
    PolyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchWheel,

    // Channel mode (controller numbers 0x78-0x7F)
    ChannelMode,

    // Meta
    Text,
    SequenceNumber,
    TrackEnd,
    Tempo,
    TimeSignature,
    KeySignature,
    SequencerSpecific,
    MidiPort,
    ChannelPrefix,

    Unknown,
}

impl EventKind {
    /// Stable lower-case name, used by track dumps
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::NoteOn => "note_on",
            EventKind::NoteOff => "note_off",
            EventKind::PolyPressure => "poly_pressure",
            EventKind::ControlChange => "control_change",
            EventKind::ProgramChange => "program_change",
            EventKind::ChannelPressure => "channel_pressure",
            EventKind::PitchWheel => "pitch_wheel",
            EventKind::ChannelMode => "channel_mode",
            EventKind::Text => "text",
            EventKind::SequenceNumber => "sequence_number",
            EventKind::TrackEnd => "track_end",
            EventKind::Tempo => "tempo",
            EventKind::TimeSignature => "time_signature",
            EventKind::KeySignature => "key_signature",
            EventKind::SequencerSpecific => "sequencer_specific",
            EventKind::MidiPort => "midi_port",
            EventKind::ChannelPrefix => "channel_prefix",
            EventKind::Unknown => "unknown",
        }
    }

    /// Whether events of this kind carry a MIDI channel in their status byte
    pub fn is_channel_voice(&self) -> bool {
        matches!(
            self,
            EventKind::NoteOn
                | EventKind::NoteOff
                | EventKind::PolyPressure
                | EventKind::ControlChange
                | EventKind::ProgramChange
                | EventKind::ChannelPressure
                | EventKind::PitchWheel
                | EventKind::ChannelMode
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A view of one event record inside a track region
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    region: &'a [u8],
    offset: usize,
}

impl<'a> Event<'a> {
    /// View the event starting at `offset` within `region`
    pub fn new(region: &'a [u8], offset: usize) -> Self {
        Self { region, offset }
    }

    /// Byte position of this event within its track region
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte at `index` relative to the event start; 0 past the end of the region
    fn byte(&self, index: usize) -> u8 {
        self.offset
            .checked_add(index)
            .and_then(|i| self.region.get(i))
            .copied()
            .unwrap_or(0)
    }

    fn bytes_from(&self, index: usize) -> &'a [u8] {
        self.offset
            .checked_add(index)
            .and_then(|i| self.region.get(i..))
            .unwrap_or(&[])
    }

    pub fn delta_time(&self) -> VarInt {
        decode_varint(self.bytes_from(0))
    }

    /// Index of the status byte relative to the event start
    fn status_index(&self) -> usize {
        self.delta_time().len
    }

    pub fn status(&self) -> u8 {
        self.byte(self.status_index())
    }

    pub fn kind(&self) -> EventKind {
        let s = self.status_index();
        let status = self.byte(s);

        if status & 0xf0 != 0xf0 {
            return match status >> 4 {
                0x8 => EventKind::NoteOff,
                0x9 => EventKind::NoteOn,
                0xa => EventKind::PolyPressure,
                0xb if self.byte(s + 1) >= 0x78 => EventKind::ChannelMode,
                0xb => EventKind::ControlChange,
                0xc => EventKind::ProgramChange,
                0xd => EventKind::ChannelPressure,
                0xe => EventKind::PitchWheel,
                // data byte in status position (running status is not supported)
                _ => EventKind::Unknown,
            };
        }

        if status != 0xff {
            return EventKind::Unknown;
        }

        match self.byte(s + 1) {
            0x01..=0x0f => EventKind::Text,
            0x00 if self.byte(s + 2) == 0x02 => EventKind::SequenceNumber,
            0x20 => EventKind::ChannelPrefix,
            0x21 => EventKind::MidiPort,
            0x2f => EventKind::TrackEnd,
            0x51 => EventKind::Tempo,
            0x58 => EventKind::TimeSignature,
            0x59 => EventKind::KeySignature,
            0x7f => EventKind::SequencerSpecific,
            _ => EventKind::Unknown,
        }
    }

    /// Like [`Event::kind`], but an unknown status is an error
    pub fn checked_kind(&self) -> Result<EventKind> {
        match self.kind() {
            EventKind::Unknown => Err(Error::UnknownEventKind {
                status: self.status(),
                offset: self.offset,
            }),
            kind => Ok(kind),
        }
    }

    /// Encoded length of the whole record, delta-time included. Never zero.
    pub fn length(&self) -> usize {
        let delta = self.status_index();

        let body = match self.kind() {
            EventKind::NoteOn
            | EventKind::NoteOff
            | EventKind::PolyPressure
            | EventKind::ControlChange
            | EventKind::ChannelMode
            | EventKind::PitchWheel
            | EventKind::TrackEnd => 3,
            EventKind::ProgramChange | EventKind::ChannelPressure => 2,
            EventKind::Tempo => 6,
            EventKind::TimeSignature => 7,
            EventKind::KeySignature => 5,
            EventKind::Text
            | EventKind::SequencerSpecific
            | EventKind::SequenceNumber
            | EventKind::MidiPort
            | EventKind::ChannelPrefix => self.prefixed_len(2),
            EventKind::Unknown => match self.status() {
                0xff => self.prefixed_len(2),
                0xf0 | 0xf7 => self.prefixed_len(1),
                _ => 2,
            },
        };

        delta.saturating_add(body)
    }

    /// Length of `<head bytes> <varint n> <n bytes>` starting at the status byte
    fn prefixed_len(&self, head: usize) -> usize {
        let nested = decode_varint(self.bytes_from(self.status_index() + head));
        let payload = usize::try_from(nested.value).unwrap_or(usize::MAX);

        head.saturating_add(nested.len).saturating_add(payload)
    }

    pub fn is_channel_voice(&self) -> bool {
        self.kind().is_channel_voice()
    }

    /// MIDI channel (0-15) for channel voice events
    pub fn channel(&self) -> Option<u8> {
        self.is_channel_voice().then(|| self.status() & 0x0f)
    }

    /// Channel voice payload
    ///
    /// Two-byte kinds pack as `(second << 7) | first`, so for note events the
    /// key sits in the low 7 bits and the velocity above it. Program change and
    /// channel pressure carry a single byte.
    pub fn midi_data(&self) -> u16 {
        let s = self.status_index();
        let first = u16::from(self.byte(s + 1) & 0x7f);

        match self.kind() {
            EventKind::ProgramChange | EventKind::ChannelPressure => first,
            _ => (u16::from(self.byte(s + 2) & 0x7f) << 7) | first,
        }
    }

    /// Microseconds per quarter note carried by a tempo event
    pub fn tempo(&self) -> Option<u32> {
        if self.kind() != EventKind::Tempo {
            return None;
        }

        let s = self.status_index();
        Some(
            (u32::from(self.byte(s + 3)) << 16)
                | (u32::from(self.byte(s + 4)) << 8)
                | u32::from(self.byte(s + 5)),
        )
    }

    /// Payload of a length-prefixed meta event, clamped to the region
    pub fn meta_payload(&self) -> Option<&'a [u8]> {
        if self.status() != 0xff {
            return None;
        }

        let s = self.status_index();
        let nested = decode_varint(self.bytes_from(s + 2));
        let payload = self.bytes_from(s + 2 + nested.len);
        let len = usize::try_from(nested.value)
            .unwrap_or(usize::MAX)
            .min(payload.len());

        Some(&payload[..len])
    }

    pub fn text(&self) -> Option<String> {
        if self.kind() != EventKind::Text {
            return None;
        }
        self.meta_payload()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Cursor over the events of one track region
///
/// Holds only a byte position. Once the cursor rests on a track-end event it
/// never moves again.
#[derive(Debug, Clone, Copy)]
pub struct EventStream<'a> {
    region: &'a [u8],
    position: usize,
}

impl<'a> EventStream<'a> {
    pub fn new(region: &'a [u8]) -> Self {
        Self {
            region,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// The event under the cursor
    pub fn get_event(&self) -> Event<'a> {
        Event::new(self.region, self.position)
    }

    /// Step past the current event, unless it is a track end
    pub fn advance(&mut self) {
        let event = self.get_event();

        if event.kind() == EventKind::TrackEnd {
            return;
        }

        self.position = self.position.saturating_add(event.length());
    }

    /// Iterate from the cursor through the track end or first unknown event
    pub fn iter(&self) -> Events<'a> {
        Events {
            stream: *self,
            finished: false,
        }
    }
}

impl<'a> IntoIterator for EventStream<'a> {
    type Item = Event<'a>;
    type IntoIter = Events<'a>;

    fn into_iter(self) -> Events<'a> {
        self.iter()
    }
}

/// Iterator returned by [`EventStream::iter`]
pub struct Events<'a> {
    stream: EventStream<'a>,
    finished: bool,
}

impl<'a> Iterator for Events<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        if self.finished {
            return None;
        }

        let event = self.stream.get_event();
        match event.kind() {
            EventKind::TrackEnd | EventKind::Unknown => self.finished = true,
            _ => self.stream.advance(),
        }

        Some(event)
    }
}
