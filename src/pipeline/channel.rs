//! Per-channel note state
//!
//! The scheduler writes note velocities as events arrive; the synthesizer
//! only reads the active-key cache, which is rebuilt once per scheduler tick
//! by [`Channel::update`]. Between mutations and the next `update` the cache
//! is stale by design, so a half-applied batch of events is never heard.

/// Number of MIDI keys per channel
pub const NOTE_COUNT: usize = 128;

#[derive(Debug, Clone)]
pub struct Channel {
    /// Velocity per key, 0 = silent
    notemap: [u8; NOTE_COUNT],
    /// Sounding keys in ascending order, 0-terminated when not full
    active: [u8; NOTE_COUNT],
    active_len: usize,
    instrument: u8,
    dirty: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            notemap: [0; NOTE_COUNT],
            active: [0; NOTE_COUNT],
            active_len: 0,
            instrument: 0,
            dirty: false,
        }
    }
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_on(&mut self, key: u8, velocity: u8) {
        self.notemap[usize::from(key & 0x7f)] = velocity & 0x7f;
        self.dirty = true;
    }

    pub fn note_off(&mut self, key: u8, _velocity: u8) {
        self.notemap[usize::from(key & 0x7f)] = 0;
        self.dirty = true;
    }

    /// Silence every key
    pub fn all_notes_off(&mut self) {
        self.notemap = [0; NOTE_COUNT];
        self.dirty = true;
    }

    pub fn set_instrument(&mut self, program: u8) {
        self.instrument = program & 0x7f;
    }

    pub fn instrument(&self) -> u8 {
        self.instrument
    }

    /// Current velocity of `key` (0 when silent)
    pub fn velocity(&self, key: u8) -> u8 {
        self.notemap[usize::from(key & 0x7f)]
    }

    pub fn notemap(&self) -> &[u8; NOTE_COUNT] {
        &self.notemap
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rebuild the active-key cache if any note changed since the last call
    pub fn update(&mut self) {
        if !self.dirty {
            return;
        }

        let mut len = 0;
        for (key, &velocity) in self.notemap.iter().enumerate() {
            if velocity != 0 {
                self.active[len] = key as u8;
                len += 1;
            }
        }

        if len < NOTE_COUNT {
            self.active[len] = 0;
        }

        self.active_len = len;
        self.dirty = false;
    }

    /// Keys in the active cache, ascending
    ///
    /// The cache carries its own length, so key 0 is reported like any other
    /// key even though 0 also serves as the terminator.
    pub fn active_keys(&self) -> impl Iterator<Item = u8> + '_ {
        self.active[..self.active_len].iter().copied()
    }

    pub fn active_count(&self) -> usize {
        self.active_len
    }
}
