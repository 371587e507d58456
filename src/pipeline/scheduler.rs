//! Multi-track scheduler
//!
//! The [`Player`] owns the 16 channels and one cursor per track. Each
//! scheduling step drains every event due at the current tick (one atomic
//! batch per track), refreshes the channel caches, then asks a
//! [`RenderBackend`] to fill the gap up to the next due tick with audio.
//! Time only moves forward when the backend has consumed that gap, so a
//! blocking audio sink paces playback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::pipeline::channel::Channel;
use crate::pipeline::parser::{Event, EventKind, EventStream};
use crate::pipeline::smf::{File, Track};

pub const CHANNEL_COUNT: usize = 16;

/// 120 BPM
pub const DEFAULT_TEMPO_US: u32 = 500_000;

/// Consumer of rendered time
pub trait RenderBackend {
    /// Produce `micros` microseconds of audio from the current channel state
    fn render(&mut self, channels: &[Channel; CHANNEL_COUNT], micros: u64) -> Result<()>;
}

/// How tempo meta events affect timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempoMode {
    /// Keep the initial tempo for the whole song; tempo events are ignored
    #[default]
    Fixed,
    /// Re-derive microseconds-per-tick from each tempo event
    FollowMeta,
}

/// Configuration for the player
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub tempo_mode: TempoMode,
    /// Microseconds per quarter note before any tempo event
    pub default_tempo_us: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tempo_mode: TempoMode::Fixed,
            default_tempo_us: DEFAULT_TEMPO_US,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Initialized,
    Started,
    Stopped,
}

/// How many passes [`Player::play_looped`] makes over the song
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    /// Play the song this many times (0 behaves like 1)
    Times(u32),
    Forever,
}

/// Cross-thread stop request, observed between scheduling steps and render chunks
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Tick duration as an exact ratio: `micros / ticks`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TickRate {
    micros: u64,
    ticks: u64,
}

impl TickRate {
    /// Division with the high bit clear is ticks per quarter note; with the
    /// high bit set it is SMPTE: negative frames per second in the high byte
    /// and ticks per frame in the low byte.
    fn new(tempo_us: u32, division: u16) -> Self {
        if division & 0x8000 != 0 {
            let fps = u64::from(((division >> 8) as u8 as i8).wrapping_neg() as u8);
            let per_frame = u64::from(division & 0xff);
            return Self {
                micros: 1_000_000,
                ticks: (fps * per_frame).max(1),
            };
        }

        Self {
            micros: u64::from(tempo_us),
            ticks: u64::from(division).max(1),
        }
    }

    fn micros_for(&self, ticks: u64) -> u64 {
        let micros = u128::from(ticks) * u128::from(self.micros) / u128::from(self.ticks);
        u64::try_from(micros).unwrap_or(u64::MAX)
    }

    fn usecs_per_tick(&self) -> f64 {
        self.micros as f64 / self.ticks as f64
    }
}

/// Scheduling state of one track
struct PlayerTrack<'a> {
    track: Track<'a>,
    stream: EventStream<'a>,
    next_tick: u64,
    active: bool,
}

impl<'a> PlayerTrack<'a> {
    fn new(track: Track<'a>) -> Self {
        let stream = track.events();
        Self {
            track,
            stream,
            next_tick: stream.get_event().delta_time().value,
            active: true,
        }
    }

    fn rewind(&mut self) {
        *self = Self::new(self.track);
    }
}

/// Multi-track MIDI player
pub struct Player<'a> {
    config: PlayerConfig,
    channels: [Channel; CHANNEL_COUNT],
    tracks: Vec<PlayerTrack<'a>>,
    division: u16,
    rate: TickRate,
    tick: u64,
    state: PlayState,
    stop: StopHandle,
}

impl<'a> Player<'a> {
    /// Load every track declared by the file header
    pub fn new(file: &File<'a>, config: PlayerConfig) -> Result<Self> {
        let tracks = file
            .tracks()
            .map(|track| track.map(PlayerTrack::new))
            .collect::<Result<Vec<_>>>()?;

        let division = file.division();
        let rate = TickRate::new(config.default_tempo_us, division);

        info!(
            tracks = tracks.len(),
            division,
            usecs_per_tick = rate.usecs_per_tick(),
            "player loaded"
        );

        Ok(Self {
            config,
            channels: std::array::from_fn(|_| Channel::new()),
            tracks,
            division,
            rate,
            tick: 0,
            state: PlayState::Initialized,
            stop: StopHandle::new(),
        })
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    /// Current logical tick
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn channels(&self) -> &[Channel; CHANNEL_COUNT] {
        &self.channels
    }

    pub fn tracks_active(&self) -> usize {
        self.tracks.iter().filter(|track| track.active).count()
    }

    pub fn usecs_per_tick(&self) -> f64 {
        self.rate.usecs_per_tick()
    }

    /// A handle that can stop playback from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request a stop; observed before the next scheduling step
    pub fn stop(&mut self) {
        self.stop.stop();
        self.state = PlayState::Stopped;
        info!(tick = self.tick, "playback stopped");
    }

    /// Apply one event to channel state
    pub fn interpret(&mut self, event: &Event<'_>) {
        apply_event(
            &mut self.channels,
            &mut self.rate,
            &self.config,
            self.division,
            event,
        );
    }

    /// Run one scheduling pass and report the resulting state
    pub fn step(&mut self, backend: &mut impl RenderBackend) -> Result<PlayState> {
        if self.state == PlayState::Stopped {
            return Ok(PlayState::Stopped);
        }

        if self.stop.is_stopped() {
            self.state = PlayState::Stopped;
            info!(tick = self.tick, "playback stopped");
            return Ok(PlayState::Stopped);
        }

        if self.state == PlayState::Initialized {
            self.state = PlayState::Started;
            info!("playback started");
        }

        let tick = self.tick;
        let Self {
            tracks,
            channels,
            rate,
            config,
            division,
            ..
        } = self;

        for (index, track) in tracks.iter_mut().enumerate() {
            if !track.active || track.next_tick > tick {
                continue;
            }

            // all events due at this tick apply as one batch
            loop {
                let event = track.stream.get_event();

                match event.kind() {
                    EventKind::Unknown => {
                        warn!(
                            track = index,
                            status = event.status(),
                            offset = event.offset(),
                            "unknown event, deactivating track"
                        );
                        track.active = false;
                        break;
                    }
                    EventKind::TrackEnd => {
                        debug!(track = index, tick, "track end");
                        track.active = false;
                        break;
                    }
                    _ => {}
                }

                apply_event(channels, rate, config, *division, &event);
                track.stream.advance();

                let delta = track.stream.get_event().delta_time().value;
                if delta != 0 {
                    track.next_tick = tick.saturating_add(delta);
                    break;
                }
            }
        }

        let next_tick = self
            .tracks
            .iter()
            .filter(|track| track.active)
            .map(|track| track.next_tick)
            .min();

        for channel in self.channels.iter_mut() {
            channel.update();
        }

        let Some(next_tick) = next_tick else {
            self.state = PlayState::Stopped;
            info!(tick = self.tick, "all tracks finished");
            return Ok(PlayState::Stopped);
        };

        let gap = next_tick.saturating_sub(tick);
        if gap > 0 {
            backend.render(&self.channels, self.rate.micros_for(gap))?;
        }
        self.tick = next_tick;

        Ok(PlayState::Started)
    }

    /// Play the song once
    pub fn play(&mut self, backend: &mut impl RenderBackend) -> Result<()> {
        self.play_looped(LoopCount::Times(1), backend)
    }

    /// Play the song repeatedly, rewinding every track between passes
    pub fn play_looped(&mut self, count: LoopCount, backend: &mut impl RenderBackend) -> Result<()> {
        let mut passes = 0u32;

        loop {
            while self.step(backend)? != PlayState::Stopped {}
            passes = passes.saturating_add(1);

            if self.stop.is_stopped() {
                return Ok(());
            }

            match count {
                LoopCount::Times(times) if passes >= times => return Ok(()),
                _ => {}
            }

            self.rewind();
            info!(pass = passes + 1, "looping");
        }
    }

    /// Reset every cursor, the tick counter and all sounding notes for another pass
    fn rewind(&mut self) {
        for track in self.tracks.iter_mut() {
            track.rewind();
        }
        for channel in self.channels.iter_mut() {
            channel.all_notes_off();
            channel.update();
        }
        self.tick = 0;
        self.state = PlayState::Started;
    }
}

fn apply_event(
    channels: &mut [Channel; CHANNEL_COUNT],
    rate: &mut TickRate,
    config: &PlayerConfig,
    division: u16,
    event: &Event<'_>,
) {
    let kind = event.kind();
    let data = event.midi_data();
    let channel = event.channel().map(usize::from);

    debug!(
        kind = kind.name(),
        delta = event.delta_time().value,
        channel,
        data,
        "event"
    );

    match (kind, channel) {
        (EventKind::NoteOn, Some(ch)) => {
            channels[ch].note_on((data & 0x7f) as u8, (data >> 7) as u8);
        }
        (EventKind::NoteOff, Some(ch)) => {
            channels[ch].note_off((data & 0x7f) as u8, (data >> 7) as u8);
        }
        (EventKind::ProgramChange, Some(ch)) => {
            channels[ch].set_instrument(data as u8);
        }
        (EventKind::Tempo, _) if config.tempo_mode == TempoMode::FollowMeta => {
            if let Some(tempo) = event.tempo() {
                *rate = TickRate::new(tempo, division);
                debug!(tempo, usecs_per_tick = rate.usecs_per_tick(), "tempo change");
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{smf, TrackBuilder};

    /// Records the sounding (channel, key) pairs seen by every render call
    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<(u64, Vec<(usize, u8)>)>,
    }

    impl RenderBackend for RecordingBackend {
        fn render(&mut self, channels: &[Channel; CHANNEL_COUNT], micros: u64) -> Result<()> {
            let sounding = channels
                .iter()
                .enumerate()
                .flat_map(|(ch, channel)| channel.active_keys().map(move |key| (ch, key)))
                .collect();
            self.calls.push((micros, sounding));
            Ok(())
        }
    }

    fn sounding(player: &Player<'_>) -> Vec<(usize, u8)> {
        player
            .channels()
            .iter()
            .enumerate()
            .flat_map(|(ch, channel)| channel.active_keys().map(move |key| (ch, key)))
            .collect()
    }

    #[test]
    fn test_single_note_file_stops_without_rendering() {
        let bytes = smf(
            0,
            96,
            &[TrackBuilder::new().note_on(0, 0, 60, 100).end(0).build()],
        );
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        assert_eq!(player.tracks_active(), 1);
        assert_eq!(player.state(), PlayState::Initialized);

        let state = player.step(&mut backend).unwrap();

        assert_eq!(state, PlayState::Stopped);
        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(player.tracks_active(), 0);
        assert!(backend.calls.is_empty());
        assert_eq!(player.channels()[0].velocity(60), 100);
    }

    #[test]
    fn test_simultaneous_events_across_tracks() {
        // A: ticks 0, 0, 10 / B: ticks 0, 5
        let a = TrackBuilder::new()
            .note_on(0, 0, 60, 100)
            .note_on(0, 0, 61, 100)
            .note_on(10, 0, 62, 100)
            .end(0)
            .build();
        let b = TrackBuilder::new()
            .note_on(0, 1, 70, 100)
            .note_on(5, 1, 71, 100)
            .end(0)
            .build();
        let bytes = smf(1, 96, &[a, b]);
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        assert_eq!(player.step(&mut backend).unwrap(), PlayState::Started);
        assert_eq!(player.tick(), 5);
        assert_eq!(backend.calls.len(), 1);
        assert_eq!(backend.calls[0].1, vec![(0, 60), (0, 61), (1, 70)]);

        assert_eq!(player.step(&mut backend).unwrap(), PlayState::Started);
        assert_eq!(player.tick(), 10);
        assert_eq!(player.tracks_active(), 1);
        assert_eq!(backend.calls.len(), 2);
        assert_eq!(backend.calls[1].1, vec![(0, 60), (0, 61), (1, 70), (1, 71)]);

        assert_eq!(player.step(&mut backend).unwrap(), PlayState::Stopped);
        assert_eq!(backend.calls.len(), 2);
        assert_eq!(
            sounding(&player),
            vec![(0, 60), (0, 61), (0, 62), (1, 70), (1, 71)]
        );

        // 5 ticks at 500000us / 96 ticks
        assert_eq!(backend.calls[0].0, 5 * 500_000 / 96);
    }

    #[test]
    fn test_first_event_delay_is_honored() {
        let bytes = smf(
            0,
            96,
            &[TrackBuilder::new().note_on(48, 0, 60, 100).end(0).build()],
        );
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        player.step(&mut backend).unwrap();
        assert_eq!(player.tick(), 48);
        assert_eq!(backend.calls.len(), 1);
        assert!(backend.calls[0].1.is_empty());

        player.step(&mut backend).unwrap();
        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(player.channels()[0].velocity(60), 100);
    }

    #[test]
    fn test_note_off_and_program_change() {
        let bytes = smf(
            0,
            96,
            &[TrackBuilder::new()
                .program(0, 2, 17)
                .note_on(0, 2, 64, 90)
                .note_off(24, 2, 64)
                .end(0)
                .build()],
        );
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        player.play(&mut backend).unwrap();

        assert_eq!(player.channels()[2].instrument(), 17);
        assert_eq!(player.channels()[2].velocity(64), 0);
        assert_eq!(backend.calls.len(), 1);
        assert_eq!(backend.calls[0].1, vec![(2, 64)]);
    }

    #[test]
    fn test_unknown_event_only_stops_its_track() {
        let broken = TrackBuilder::new()
            .note_on(0, 0, 60, 100)
            .raw(4, &[0xf2, 0x00, 0x00])
            .note_on(4, 0, 61, 100)
            .end(0)
            .build();
        let healthy = TrackBuilder::new()
            .note_on(0, 1, 40, 100)
            .note_on(20, 1, 41, 100)
            .end(0)
            .build();
        let bytes = smf(1, 96, &[broken, healthy]);
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        player.play(&mut backend).unwrap();

        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(player.channels()[0].velocity(61), 0);
        assert_eq!(player.channels()[1].velocity(41), 100);
        assert_eq!(player.tick(), 20);
    }

    #[test]
    fn test_tempo_fixed_by_default() {
        let bytes = smf(
            0,
            100,
            &[TrackBuilder::new()
                .tempo(0, 1_000_000)
                .note_on(10, 0, 60, 100)
                .end(0)
                .build()],
        );
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        player.play(&mut backend).unwrap();

        assert_eq!(backend.calls[0].0, 10 * 5_000);
        assert_eq!(player.usecs_per_tick(), 5_000.0);
    }

    #[test]
    fn test_tempo_follow_meta() {
        let bytes = smf(
            0,
            100,
            &[TrackBuilder::new()
                .tempo(0, 1_000_000)
                .note_on(10, 0, 60, 100)
                .end(0)
                .build()],
        );
        let file = File::parse(&bytes).unwrap();
        let config = PlayerConfig {
            tempo_mode: TempoMode::FollowMeta,
            ..Default::default()
        };
        let mut player = Player::new(&file, config).unwrap();
        let mut backend = RecordingBackend::default();

        player.play(&mut backend).unwrap();

        assert_eq!(backend.calls[0].0, 10 * 10_000);
        assert_eq!(player.usecs_per_tick(), 10_000.0);
    }

    #[test]
    fn test_smpte_division() {
        // 25 fps, 40 ticks per frame = 1000us per tick
        let division = (((-25i8) as u8 as u16) << 8) | 40;
        let rate = TickRate::new(DEFAULT_TEMPO_US, division);

        assert_eq!(rate.micros_for(3), 3_000);
        assert_eq!(rate.usecs_per_tick(), 1_000.0);
    }

    #[test]
    fn test_loop_replays_song() {
        let bytes = smf(
            0,
            96,
            &[TrackBuilder::new()
                .note_on(0, 0, 60, 100)
                .note_off(12, 0, 60)
                .end(0)
                .build()],
        );
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        player
            .play_looped(LoopCount::Times(3), &mut backend)
            .unwrap();

        assert_eq!(backend.calls.len(), 3);
        assert!(backend.calls.iter().all(|(_, keys)| keys == &vec![(0, 60)]));
        assert_eq!(player.state(), PlayState::Stopped);
    }

    #[test]
    fn test_loop_starts_each_pass_silent() {
        let bytes = smf(
            0,
            96,
            &[TrackBuilder::new()
                .note_on(0, 0, 60, 100)
                .note_on(10, 0, 62, 100)
                .end(10)
                .build()],
        );
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        player
            .play_looped(LoopCount::Times(2), &mut backend)
            .unwrap();

        let keys: Vec<_> = backend.calls.iter().map(|(_, keys)| keys.clone()).collect();
        assert_eq!(
            keys,
            vec![
                vec![(0, 60)],
                vec![(0, 60), (0, 62)],
                vec![(0, 60)],
                vec![(0, 60), (0, 62)],
            ]
        );
    }

    #[test]
    fn test_player_stop_before_play() {
        let bytes = smf(
            0,
            96,
            &[TrackBuilder::new()
                .note_on(0, 0, 60, 100)
                .note_off(10, 0, 60)
                .end(0)
                .build()],
        );
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        player.stop();
        assert_eq!(player.state(), PlayState::Stopped);

        player.play(&mut backend).unwrap();

        assert_eq!(player.state(), PlayState::Stopped);
        assert!(backend.calls.is_empty());
        assert_eq!(player.tick(), 0);
    }

    #[test]
    fn test_player_stop_mid_song() {
        let bytes = smf(
            0,
            96,
            &[TrackBuilder::new()
                .note_on(0, 0, 60, 100)
                .note_on(10, 0, 61, 100)
                .note_on(10, 0, 62, 100)
                .end(0)
                .build()],
        );
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        assert_eq!(player.step(&mut backend).unwrap(), PlayState::Started);
        player.stop();
        assert_eq!(player.state(), PlayState::Stopped);

        player
            .play_looped(LoopCount::Forever, &mut backend)
            .unwrap();

        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(backend.calls.len(), 1);
        assert_eq!(player.tick(), 10);
        assert!(player.stop_handle().is_stopped());
    }

    #[test]
    fn test_stop_is_observed_between_steps() {
        let bytes = smf(
            0,
            96,
            &[TrackBuilder::new()
                .note_on(0, 0, 60, 100)
                .note_on(10, 0, 61, 100)
                .note_on(10, 0, 62, 100)
                .end(0)
                .build()],
        );
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();
        let mut backend = RecordingBackend::default();

        player.step(&mut backend).unwrap();
        player.stop_handle().stop();

        assert_eq!(player.step(&mut backend).unwrap(), PlayState::Stopped);
        assert_eq!(player.tick(), 10);
        assert_eq!(player.channels()[0].velocity(61), 0);

        // stopped is terminal, even when looping is requested
        player
            .play_looped(LoopCount::Forever, &mut backend)
            .unwrap();
        assert_eq!(backend.calls.len(), 1);
    }

    #[test]
    fn test_interpret_applies_to_channels() {
        let bytes = smf(0, 96, &[TrackBuilder::new().end(0).build()]);
        let file = File::parse(&bytes).unwrap();
        let mut player = Player::new(&file, PlayerConfig::default()).unwrap();

        let note = [0x00, 0x93, 0x45, 0x50];
        player.interpret(&Event::new(&note, 0));

        assert_eq!(player.channels()[3].velocity(0x45), 0x50);
    }

    #[test]
    fn test_missing_track_fails_construction() {
        let mut bytes = smf(1, 96, &[TrackBuilder::new().end(0).build()]);
        bytes[11] = 2;
        let file = File::parse(&bytes).unwrap();

        assert!(Player::new(&file, PlayerConfig::default()).is_err());
    }
}
