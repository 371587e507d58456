//! Pull synthesizer
//!
//! Turns the live channel state into 16-bit samples. The synthesizer never
//! mutates channels; everything it owns (phase, percussion envelopes, limiter
//! threshold, noise source) is private to the instance, so independent
//! sessions can run side by side.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use super::envelope::DecayEnvelope;
use super::limiter::PeakLimiter;
use super::voices::{InstrumentFamily, PercussionVoice, PERCUSSION_FIRST_KEY, PERCUSSION_LAST_KEY};
use crate::pipeline::channel::Channel;
use crate::pipeline::scheduler::CHANNEL_COUNT;

/// General MIDI percussion channel (channel 10, zero-based)
pub const PERCUSSION_CHANNEL: usize = 9;

/// Number of percussion envelope slots
pub const PERCUSSION_SLOTS: usize = 64;

const MICROS_PER_SECOND: u128 = 1_000_000;

/// Configuration for the synthesizer and its renderer
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub sample_rate: u32,
    /// Samples rendered per chunk; stop requests are observed between chunks
    pub chunk_samples: usize,
    /// Frequency of key 0 in Hz
    pub base_frequency: f64,
    pub melodic_gain: f64,
    pub percussion_gain: f64,
    /// Length of a percussion hit in samples
    pub percussion_duration: u16,
    pub noise_seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_samples: 256,
            // C0, an octave down
            base_frequency: 16.35 / 2.0,
            melodic_gain: 0.3,
            percussion_gain: 0.33,
            percussion_duration: 4000,
            noise_seed: 0x7ff7_ff7f,
        }
    }
}

pub struct Synthesizer {
    config: SynthConfig,
    /// Phase at the base frequency, radians
    phase: f64,
    increment: f64,
    /// One envelope per percussion key, indexed by key - 35
    percussion: [DecayEnvelope; PERCUSSION_SLOTS],
    limiter: PeakLimiter,
    rng: StdRng,
    /// Sub-sample remainder of rendered time, in microsecond-samples
    carry: u128,
}

impl Synthesizer {
    pub fn new(config: SynthConfig) -> Self {
        let sample_rate = config.sample_rate.max(1);
        let increment = config.base_frequency * std::f64::consts::TAU / f64::from(sample_rate);

        debug!(
            sample_rate,
            chunk_samples = config.chunk_samples,
            "synthesizer created"
        );

        Self {
            phase: 0.0,
            increment,
            percussion: [DecayEnvelope::new(config.percussion_duration); PERCUSSION_SLOTS],
            limiter: PeakLimiter::default(),
            rng: StdRng::seed_from_u64(config.noise_seed),
            carry: 0,
            config,
        }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Envelope counter for a percussion key, 0 outside 35..=81
    pub fn percussion_remaining(&self, key: u8) -> u16 {
        percussion_slot(key)
            .map(|slot| self.percussion[slot].remaining())
            .unwrap_or(0)
    }

    /// Number of whole samples covering `micros`, carrying the remainder
    pub fn samples_for(&mut self, micros: u64) -> usize {
        let total = u128::from(micros) * u128::from(self.config.sample_rate) + self.carry;
        self.carry = total % MICROS_PER_SECOND;
        usize::try_from(total / MICROS_PER_SECOND).unwrap_or(usize::MAX)
    }

    /// Append `micros` worth of samples to `out`
    pub fn render(&mut self, channels: &[Channel; CHANNEL_COUNT], micros: u64, out: &mut Vec<i16>) {
        let count = self.samples_for(micros);
        let start = out.len();
        out.resize(start + count, 0);
        self.render_into(channels, &mut out[start..]);
    }

    /// Fill `buffer` with consecutive samples
    pub fn render_into(&mut self, channels: &[Channel; CHANNEL_COUNT], buffer: &mut [i16]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample(channels);
        }
    }

    pub fn next_sample(&mut self, channels: &[Channel; CHANNEL_COUNT]) -> i16 {
        (self.next_level(channels) * f64::from(i16::MAX)) as i16
    }

    /// Next limited sample in [-1, 1]
    fn next_level(&mut self, channels: &[Channel; CHANNEL_COUNT]) -> f64 {
        self.phase += self.increment;

        self.sync_percussion(&channels[PERCUSSION_CHANNEL]);

        let mut sum = 0.0;

        for (index, channel) in channels.iter().enumerate() {
            if index == PERCUSSION_CHANNEL {
                continue;
            }

            let waveform = InstrumentFamily::from_program(channel.instrument()).waveform();
            for key in channel.active_keys() {
                let velocity = f64::from(channel.velocity(key)) / 127.0;
                sum += waveform.sample(self.phase, key) * velocity * self.config.melodic_gain;
            }
        }

        for (slot, envelope) in self.percussion.iter_mut().enumerate() {
            if !envelope.is_armed() {
                continue;
            }

            let elapsed = envelope.advance();
            let Some(voice) = PercussionVoice::for_key(PERCUSSION_FIRST_KEY + slot as u8) else {
                continue;
            };

            let noise = match voice {
                PercussionVoice::HiHat => self.rng.gen::<f64>() - self.rng.gen::<f64>(),
                _ => 0.0,
            };

            let velocity = f64::from(envelope.velocity()) / 127.0;
            sum += voice.sample(elapsed, self.phase, noise) * velocity * self.config.percussion_gain;
        }

        self.limiter.process(sum)
    }

    /// Edge-detect percussion keys from the channel's active cache
    fn sync_percussion(&mut self, channel: &Channel) {
        let mut sounding = [false; PERCUSSION_SLOTS];
        for key in channel.active_keys() {
            if let Some(slot) = percussion_slot(key) {
                sounding[slot] = true;
            }
        }

        for (slot, envelope) in self.percussion.iter_mut().enumerate() {
            if !sounding[slot] {
                envelope.release();
                continue;
            }

            let key = PERCUSSION_FIRST_KEY + slot as u8;
            if envelope.trigger(channel.velocity(key)) {
                trace!(key, "percussion hit");
            }
        }
    }
}

fn percussion_slot(key: u8) -> Option<usize> {
    (PERCUSSION_FIRST_KEY..=PERCUSSION_LAST_KEY)
        .contains(&key)
        .then(|| usize::from(key - PERCUSSION_FIRST_KEY))
}
