//! WAV file writer
//!
//! 16-bit mono PCM. The header sizes are only known once the last sample is
//! written, so [`WavSink`] writes a stub header up front and rewrites it in
//! place on [`finish`](crate::sink::AudioSink::finish).

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::sink::AudioSink;

const HEADER_LEN: u64 = 44;

/// Streaming WAV writer over any seekable output
pub struct WavSink<W: Write + Seek> {
    writer: W,
    sample_rate: u32,
    samples: u64,
    finished: bool,
}

impl WavSink<BufWriter<File>> {
    /// Create (or truncate) a WAV file at `path`
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> io::Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), sample_rate)
    }
}

impl<W: Write + Seek> WavSink<W> {
    /// Wrap `writer` and write the stub header
    pub fn new(mut writer: W, sample_rate: u32) -> io::Result<Self> {
        write_header(&mut writer, sample_rate, 0)?;
        Ok(Self {
            writer,
            sample_rate,
            samples: 0,
            finished: false,
        })
    }

    pub fn samples_written(&self) -> u64 {
        self.samples
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Seek> AudioSink for WavSink<W> {
    fn write(&mut self, samples: &[i16]) -> io::Result<()> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.writer.write_all(&bytes)?;
        self.samples += samples.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }

        // pad byte for an odd sample count
        if self.samples % 2 == 1 {
            self.writer.write_all(&[0])?;
        }

        self.writer.seek(SeekFrom::Start(0))?;
        write_header(&mut self.writer, self.sample_rate, self.samples)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        self.finished = true;

        debug!(samples = self.samples, "wav header finalized");
        Ok(())
    }
}

fn write_header(writer: &mut impl Write, sample_rate: u32, samples: u64) -> io::Result<()> {
    let num_channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * u32::from(num_channels) * u32::from(bits_per_sample / 8);
    let block_align = num_channels * (bits_per_sample / 8);

    // sizes saturate rather than wrap for outputs beyond the 4 GiB RIFF limit
    let data_size = u32::try_from(samples * 2).unwrap_or(u32::MAX);
    let pad = (samples % 2) as u32;
    let riff_size = data_size.saturating_add(36 + pad);

    let mut header = Vec::with_capacity(HEADER_LEN as usize);

    // RIFF chunk
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&riff_size.to_le_bytes());
    header.extend_from_slice(b"WAVE");

    // fmt subchunk
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes()); // PCM
    header.extend_from_slice(&num_channels.to_le_bytes());
    header.extend_from_slice(&sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data subchunk
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_size.to_le_bytes());

    writer.write_all(&header)
}

/// Write a complete 16-bit PCM WAV file in one call
///
/// # Example
/// ```
/// use midisynth::wav::write_wav_16bit;
///
/// let dir = std::env::temp_dir().join("midisynth-doc.wav");
/// write_wav_16bit(&dir, &[0i16; 16000], 16000).unwrap();
/// ```
pub fn write_wav_16bit(path: impl AsRef<Path>, samples: &[i16], sample_rate: u32) -> io::Result<()> {
    let mut sink = WavSink::create(path, sample_rate)?;
    sink.write(samples)?;
    sink.finish()
}
