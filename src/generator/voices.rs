//! Waveform shapes for melodic instruments and percussion hits
//!
//! Every shape is a pure function of the synthesizer phase (radians at the
//! base pitch) and, for percussion, the elapsed fraction of the hit's
//! envelope. Key numbers are MIDI keys; pitch ratios are equal-tempered
//! relative to key 0.

use std::sync::OnceLock;

use crate::pipeline::channel::NOTE_COUNT;

/// Lowest key with a percussion voice (acoustic bass drum)
pub const PERCUSSION_FIRST_KEY: u8 = 35;
/// Highest key with a percussion voice (open triangle)
pub const PERCUSSION_LAST_KEY: u8 = 81;

fn ratio_table() -> &'static [f64; NOTE_COUNT] {
    static TABLE: OnceLock<[f64; NOTE_COUNT]> = OnceLock::new();
    TABLE.get_or_init(|| std::array::from_fn(|key| 2f64.powf(key as f64 / 12.0)))
}

/// Frequency ratio of `key` relative to key 0: 2^(key/12)
pub fn note_ratio(key: i32) -> f64 {
    match usize::try_from(key) {
        Ok(index) if index < NOTE_COUNT => ratio_table()[index],
        _ => 2f64.powf(f64::from(key) / 12.0),
    }
}

/// Ratio for a fractional key, used by pitch sweeps
pub fn fractional_ratio(key: f64) -> f64 {
    2f64.powf(key / 12.0)
}

/// Sine that snaps to ±1 once it passes ±clip
pub fn clipped_sin(x: f64, clip: f64) -> f64 {
    let s = x.sin();
    if s > clip {
        1.0
    } else if s < -clip {
        -1.0
    } else {
        s
    }
}

pub fn square_wave(x: f64) -> f64 {
    clipped_sin(x, 0.0)
}

/// Push a signal away from zero by `amount`, then clamp to [-1, 1]
pub fn amplify(x: f64, amount: f64) -> f64 {
    let pushed = if x > 0.0 {
        x + amount
    } else if x < 0.0 {
        x - amount
    } else {
        x
    };
    pushed.clamp(-1.0, 1.0)
}

/// General MIDI instrument family (program number / 8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentFamily {
    Piano,
    ChromaticPercussion,
    Organ,
    Guitar,
    Bass,
    Strings,
    Ensemble,
    Brass,
    Reed,
    Pipe,
    SynthLead,
    SynthPad,
    SynthEffects,
    Ethnic,
    Percussive,
    SoundEffects,
}

impl InstrumentFamily {
    pub fn from_program(program: u8) -> Self {
        match (program & 0x7f) >> 3 {
            0 => InstrumentFamily::Piano,
            1 => InstrumentFamily::ChromaticPercussion,
            2 => InstrumentFamily::Organ,
            3 => InstrumentFamily::Guitar,
            4 => InstrumentFamily::Bass,
            5 => InstrumentFamily::Strings,
            6 => InstrumentFamily::Ensemble,
            7 => InstrumentFamily::Brass,
            8 => InstrumentFamily::Reed,
            9 => InstrumentFamily::Pipe,
            10 => InstrumentFamily::SynthLead,
            11 => InstrumentFamily::SynthPad,
            12 => InstrumentFamily::SynthEffects,
            13 => InstrumentFamily::Ethnic,
            14 => InstrumentFamily::Percussive,
            _ => InstrumentFamily::SoundEffects,
        }
    }

    /// Families without a dedicated shape fall back to the pad
    pub fn waveform(&self) -> Waveform {
        match self {
            InstrumentFamily::Organ => Waveform::Organ,
            InstrumentFamily::Guitar => Waveform::Guitar,
            InstrumentFamily::Bass => Waveform::Bass,
            InstrumentFamily::Ensemble => Waveform::Ensemble,
            InstrumentFamily::SynthLead => Waveform::Lead,
            _ => Waveform::Pad,
        }
    }
}

/// Melodic voice shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Organ,
    Guitar,
    Bass,
    Ensemble,
    Lead,
    Pad,
}

impl Waveform {
    /// One sample of `key` at synthesizer phase `phase`, in [-1, 1]
    pub fn sample(&self, phase: f64, key: u8) -> f64 {
        let key = i32::from(key);
        let x = phase * note_ratio(key);

        match self {
            Waveform::Organ => {
                let a = clipped_sin(x, 0.9);
                let b = (phase * note_ratio(key - 12)).sin();
                (a * 1.2 + b * 0.8) / 2.0
            }
            Waveform::Guitar => {
                let wobble = phase.sin() / 8.0;
                let a = clipped_sin(x, 0.5);
                let b = clipped_sin(phase * note_ratio(key + 12), 0.8 - wobble);
                (a + b) / 2.0 * 0.8
            }
            Waveform::Bass => clipped_sin(x, 0.8),
            Waveform::Ensemble => amplify(x.sin(), 0.3),
            Waveform::Lead => clipped_sin(x, 0.4) * 0.8,
            Waveform::Pad => {
                let wobble = (phase / 100.0).sin() / 8.0;
                clipped_sin(x, 0.7 + wobble) * 0.7
            }
        }
    }
}

/// Drum groups with a synthesized shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercussionVoice {
    Kick,
    Snare,
    Tom,
    HiHat,
}

impl PercussionVoice {
    /// Voice for a General MIDI percussion key, if it has one
    pub fn for_key(key: u8) -> Option<Self> {
        match key {
            35 | 36 => Some(PercussionVoice::Kick),
            37..=40 => Some(PercussionVoice::Snare),
            // floor, low and mid toms
            41 | 43 | 45 | 47 | 48 | 50 => Some(PercussionVoice::Tom),
            // closed, pedal and open hihat, crash and ride cymbals
            42 | 44 | 46 | 49 | 51 => Some(PercussionVoice::HiHat),
            _ => None,
        }
    }

    /// One sample of a hit, `elapsed` in [0, 1] of its envelope
    ///
    /// `noise` is a white-noise sample in [-1, 1]; only the hihat uses it.
    pub fn sample(&self, elapsed: f64, phase: f64, noise: f64) -> f64 {
        let level = 1.0 - elapsed;
        let impulse = elapsed / 32.0;
        let click = square_wave(phase * note_ratio(24)) * impulse;

        match self {
            PercussionVoice::Kick => {
                let a = clipped_sin(phase * note_ratio(70), 0.3);
                let b = clipped_sin(phase * fractional_ratio(80.0 - elapsed * 8.0), 0.4 + elapsed / 2.0);
                amplify((a * 1.4 + b * 1.5 + click * 0.2) / (2.0 + impulse), 0.55) * level
            }
            PercussionVoice::Snare => {
                let a = clipped_sin(phase * note_ratio(84), elapsed);
                let b = clipped_sin(phase * fractional_ratio(92.0 - elapsed * 10.0), elapsed);
                amplify((a * 1.35 + b * 1.45 + click * 0.2) / (2.0 + impulse), 0.7) * level
            }
            PercussionVoice::Tom => {
                let a = clipped_sin(phase * note_ratio(78), elapsed);
                let b = clipped_sin(phase * fractional_ratio(84.0 - elapsed * 10.0), elapsed);
                amplify((a * 1.4 + b * 1.5 + click * 0.2) / (2.0 + impulse), 0.7) * level
            }
            PercussionVoice::HiHat => {
                let strength = elapsed / 8.0;
                let a = noise * strength;
                let b = square_wave(phase * note_ratio(24)) * (strength / 4.0);
                amplify((a + b) / 2.0, 0.7) * 0.4 * level
            }
        }
    }
}
