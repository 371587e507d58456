//! Audio sinks and the chunked renderer that feeds them
//!
//! [`Renderer`] is the [`RenderBackend`] used for real playback: it pulls
//! samples from a [`Synthesizer`] in bounded chunks and hands each chunk to
//! an [`AudioSink`]. A blocking sink therefore paces the whole player.

use std::io::{self, Write};

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::generator::Synthesizer;
use crate::pipeline::channel::Channel;
use crate::pipeline::scheduler::{RenderBackend, StopHandle, CHANNEL_COUNT};

/// Destination for rendered 16-bit mono samples
pub trait AudioSink {
    fn write(&mut self, samples: &[i16]) -> io::Result<()>;

    /// Flush and finalize; called once after the last write
    fn finish(&mut self) -> io::Result<()>;
}

/// Collects samples in memory
#[derive(Debug, Default)]
pub struct BufferSink {
    samples: Vec<i16>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

impl AudioSink for BufferSink {
    fn write(&mut self, samples: &[i16]) -> io::Result<()> {
        self.samples.extend_from_slice(samples);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Headerless little-endian PCM, e.g. for piping into `aplay -f cd`
pub struct RawPcmSink<W: Write> {
    writer: W,
    /// Duplicate every sample into left and right
    stereo: bool,
    bytes: Vec<u8>,
}

impl<W: Write> RawPcmSink<W> {
    pub fn mono(writer: W) -> Self {
        Self {
            writer,
            stereo: false,
            bytes: Vec::new(),
        }
    }

    pub fn stereo(writer: W) -> Self {
        Self {
            writer,
            stereo: true,
            bytes: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> AudioSink for RawPcmSink<W> {
    fn write(&mut self, samples: &[i16]) -> io::Result<()> {
        self.bytes.clear();
        for sample in samples {
            let le = sample.to_le_bytes();
            self.bytes.extend_from_slice(&le);
            if self.stereo {
                self.bytes.extend_from_slice(&le);
            }
        }
        self.writer.write_all(&self.bytes)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Chunked synthesizer-to-sink bridge
pub struct Renderer<S: AudioSink> {
    synth: Synthesizer,
    sink: S,
    buffer: Vec<i16>,
    stop: Option<StopHandle>,
    samples_rendered: u64,
    /// First sink error; later writes are skipped
    failure: Option<io::Error>,
}

impl<S: AudioSink> Renderer<S> {
    pub fn new(synth: Synthesizer, sink: S) -> Self {
        let chunk = synth.config().chunk_samples.max(1);
        Self {
            synth,
            sink,
            buffer: vec![0; chunk],
            stop: None,
            samples_rendered: 0,
            failure: None,
        }
    }

    /// Abandon the current gap between chunks once `stop` is requested
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synth
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn samples_rendered(&self) -> u64 {
        self.samples_rendered
    }

    /// Finalize the sink, reporting the first write failure if any
    pub fn finish(mut self) -> Result<S> {
        if let Some(err) = self.failure.take() {
            // finalize what was written before the failure; the first error wins
            if let Err(second) = self.sink.finish() {
                debug!(error = %second, "sink finish after write failure also failed");
            }
            return Err(Error::SinkIo(err));
        }

        self.sink.finish()?;
        debug!(samples = self.samples_rendered, "renderer finished");
        Ok(self.sink)
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(StopHandle::is_stopped)
    }
}

impl<S: AudioSink> RenderBackend for Renderer<S> {
    fn render(&mut self, channels: &[Channel; CHANNEL_COUNT], micros: u64) -> Result<()> {
        let mut remaining = self.synth.samples_for(micros);

        while remaining > 0 {
            if self.stop_requested() {
                debug!(remaining, "stop requested, dropping rest of gap");
                break;
            }

            let count = remaining.min(self.buffer.len());
            let chunk = &mut self.buffer[..count];
            self.synth.render_into(channels, chunk);

            if self.failure.is_none() {
                if let Err(err) = self.sink.write(chunk) {
                    warn!(error = %err, "sink write failed, discarding further audio");
                    self.failure = Some(err);
                }
            }

            self.samples_rendered += count as u64;
            remaining -= count;
            trace!(samples = count, "chunk rendered");
        }

        Ok(())
    }
}
