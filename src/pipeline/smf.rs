//! Chunk containers of a Standard MIDI File
//!
//! Layout:
//! "MThd" <u32 length = 6> <u16 format> <u16 tracks> <u16 division>
//! "MTrk" <u32 length> <length bytes of events>   (repeated)
//!
//! Tracks are not indexed. The Nth track is found by walking chunk headers
//! from the first one, so [`File::track`] costs O(n) per call. Callers that
//! need every track should walk once with [`File::tracks`].

use crate::error::{Error, Result};
use crate::pipeline::parser::{decode_u16be, decode_u32be, EventStream};

pub const HEADER_TAG: &[u8; 4] = b"MThd";
pub const TRACK_TAG: &[u8; 4] = b"MTrk";

/// Tag plus length field
pub const CHUNK_HEADER_LEN: usize = 8;

/// Header chunk with its standard 6-byte body
pub const FILE_HEADER_LEN: usize = 14;

/// One "MTrk" chunk
#[derive(Debug, Clone, Copy)]
pub struct Track<'a> {
    region: &'a [u8],
    length: u32,
    offset: usize,
}

impl<'a> Track<'a> {
    /// Exact tag comparison on the first four bytes
    pub fn valid(bytes: &[u8]) -> bool {
        bytes.get(..4) == Some(TRACK_TAG.as_slice())
    }

    /// Parse a track chunk from the start of `bytes`
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        Self::at(bytes, 0)
    }

    /// Parse the track chunk starting at `offset` within `data`
    pub(crate) fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        let chunk = data.get(offset..).unwrap_or(&[]);

        if !Self::valid(chunk) {
            return Err(Error::MalformedTrack {
                offset,
                reason: format!(
                    "expected \"MTrk\", found {:02x?}",
                    &chunk[..chunk.len().min(4)]
                ),
            });
        }

        let length = decode_u32be(&chunk[4..]).ok_or_else(|| Error::MalformedTrack {
            offset,
            reason: "truncated chunk header".to_string(),
        })?;

        let end = CHUNK_HEADER_LEN.saturating_add(length as usize);
        let region = chunk
            .get(CHUNK_HEADER_LEN..end)
            .ok_or_else(|| Error::MalformedTrack {
                offset,
                reason: format!(
                    "declares {} bytes but only {} remain",
                    length,
                    chunk.len() - CHUNK_HEADER_LEN
                ),
            })?;

        Ok(Self {
            region,
            length,
            offset,
        })
    }

    /// Declared length of the event region
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Byte offset of the chunk within the file
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Event bytes following the chunk header
    pub fn region(&self) -> &'a [u8] {
        self.region
    }

    /// A fresh cursor at the first event
    pub fn events(&self) -> EventStream<'a> {
        EventStream::new(self.region)
    }
}

/// A parsed "MThd" file over borrowed bytes
#[derive(Debug, Clone, Copy)]
pub struct File<'a> {
    data: &'a [u8],
}

impl<'a> File<'a> {
    /// Exact tag comparison on the first four bytes
    pub fn valid(bytes: &[u8]) -> bool {
        bytes.get(..4) == Some(HEADER_TAG.as_slice())
    }

    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if !Self::valid(data) {
            return Err(Error::MalformedHeader(format!(
                "expected \"MThd\", found {:02x?}",
                &data[..data.len().min(4)]
            )));
        }

        if data.len() < FILE_HEADER_LEN {
            return Err(Error::MalformedHeader(format!(
                "header needs {} bytes, file has {}",
                FILE_HEADER_LEN,
                data.len()
            )));
        }

        let file = Self { data };
        if file.length() < 6 {
            return Err(Error::MalformedHeader(format!(
                "header length {} is shorter than 6",
                file.length()
            )));
        }

        tracing::debug!(
            format = file.format(),
            tracks = file.track_count(),
            division = file.division(),
            "parsed MIDI header"
        );

        Ok(file)
    }

    /// Declared header body length (6 for every known format)
    pub fn length(&self) -> u32 {
        decode_u32be(&self.data[4..]).unwrap_or(0)
    }

    pub fn format(&self) -> u16 {
        decode_u16be(&self.data[8..]).unwrap_or(0)
    }

    /// Track count declared by the header
    pub fn track_count(&self) -> u16 {
        decode_u16be(&self.data[10..]).unwrap_or(0)
    }

    pub fn division(&self) -> u16 {
        decode_u16be(&self.data[12..]).unwrap_or(0)
    }

    fn first_track_offset(&self) -> usize {
        CHUNK_HEADER_LEN.saturating_add(self.length() as usize)
    }

    /// Find the track at `index` by walking chunk headers from the first
    pub fn track(&self, index: usize) -> Result<Track<'a>> {
        let mut offset = self.first_track_offset();
        let mut current = 0;

        loop {
            if offset >= self.data.len() {
                return Err(Error::InvalidTrackIndex {
                    index,
                    available: current,
                });
            }

            let track = Track::at(self.data, offset)?;
            if current == index {
                return Ok(track);
            }

            offset = offset
                .saturating_add(CHUNK_HEADER_LEN)
                .saturating_add(track.length() as usize);
            current += 1;
        }
    }

    /// Walk the tracks declared by the header in a single pass
    pub fn tracks(&self) -> Tracks<'a> {
        Tracks {
            data: self.data,
            offset: self.first_track_offset(),
            index: 0,
            remaining: self.track_count() as usize,
        }
    }
}

/// Iterator returned by [`File::tracks`]
///
/// Yields at most the header's track count, stopping after the first error.
pub struct Tracks<'a> {
    data: &'a [u8],
    offset: usize,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for Tracks<'a> {
    type Item = Result<Track<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        if self.offset >= self.data.len() {
            self.remaining = 0;
            return Some(Err(Error::InvalidTrackIndex {
                index: self.index,
                available: self.index,
            }));
        }

        match Track::at(self.data, self.offset) {
            Ok(track) => {
                self.offset = self
                    .offset
                    .saturating_add(CHUNK_HEADER_LEN)
                    .saturating_add(track.length() as usize);
                self.index += 1;
                self.remaining -= 1;
                Some(Ok(track))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}
