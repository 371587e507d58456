use super::GeneratorState;

/// Counter value at or below which an envelope no longer sounds
pub const ARMED_THRESHOLD: u16 = 2;

/// Edge-triggered decaying envelope for one percussion key
///
/// Triggering a silent envelope arms it for a fixed number of samples.
/// Triggering again while it is armed (or while it rests at the threshold
/// after decaying) does nothing; only a [`release`](Self::release) makes it
/// triggerable again. This turns a level ("key is held") into an edge
/// ("key went down").
#[derive(Debug, Clone, Copy)]
pub struct DecayEnvelope {
    /// Samples left; 0 = silent and ready to trigger
    remaining: u16,
    /// Total duration in samples
    duration: u16,
    /// Velocity latched at trigger time
    velocity: u8,
}

impl DecayEnvelope {
    /// Create a silent envelope
    ///
    /// # Example
    /// ```
    /// use midisynth::generator::DecayEnvelope;
    ///
    /// let mut hit = DecayEnvelope::new(4000);
    /// assert!(hit.trigger(100));
    /// assert!(!hit.trigger(100));
    /// ```
    pub fn new(duration_samples: u16) -> Self {
        Self {
            remaining: 0,
            // must stay above the threshold or a trigger would be inaudible
            duration: duration_samples.max(ARMED_THRESHOLD + 1),
            velocity: 0,
        }
    }

    /// Arm the envelope if it is silent. Returns whether it was armed.
    pub fn trigger(&mut self, velocity: u8) -> bool {
        if self.remaining != 0 {
            return false;
        }

        self.remaining = self.duration;
        self.velocity = velocity;
        true
    }

    /// Silence the envelope and make it triggerable again
    pub fn release(&mut self) {
        self.remaining = 0;
    }

    /// Whether the envelope currently contributes a voice
    pub fn is_armed(&self) -> bool {
        self.remaining > ARMED_THRESHOLD
    }

    /// Step one sample and return the elapsed fraction in [0, 1]
    pub fn advance(&mut self) -> f64 {
        if self.is_armed() {
            self.remaining -= 1;
        }
        self.elapsed()
    }

    /// Fraction of the duration already played
    pub fn elapsed(&self) -> f64 {
        if self.remaining == 0 {
            return 1.0;
        }
        1.0 - f64::from(self.remaining) / f64::from(self.duration)
    }

    pub fn remaining(&self) -> u16 {
        self.remaining
    }

    pub fn duration(&self) -> u16 {
        self.duration
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn state(&self) -> GeneratorState {
        if self.is_armed() {
            GeneratorState::Running
        } else {
            GeneratorState::Complete
        }
    }
}
