pub mod envelope;
pub mod limiter;
pub mod synth;
pub mod voices;

pub use envelope::DecayEnvelope;
pub use limiter::PeakLimiter;
pub use synth::{SynthConfig, Synthesizer, PERCUSSION_CHANNEL};
pub use voices::{InstrumentFamily, PercussionVoice, Waveform};

/// Represents the current state of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Envelope is still producing a voice
    Running,
    /// Envelope has decayed and contributes nothing
    Complete,
}
