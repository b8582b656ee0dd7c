use std::time::{Duration, Instant};

use crate::Result;

/// Read-only view of the audio playback service.
///
/// The runtime never decodes audio; it only asks where playback is and
/// whether it is still running.
pub trait PlaybackSource {
    /// Starts playback. Called once, before the host's start callback.
    fn start(&mut self) -> Result<()>;

    /// Current playback position in milliseconds.
    fn position_ms(&self) -> f32;

    fn is_playing(&self) -> bool;

    /// Stops playback. Called once during teardown.
    fn stop(&mut self);
}

/// Playback timeline driven by the wall clock.
///
/// Stands in for an audio device: position advances in real time from
/// [`PlaybackSource::start`] and playback ends after `duration`, if one is set.
#[derive(Debug, Clone)]
pub struct ClockPlayback {
    duration: Option<Duration>,
    started: Option<Instant>,
    stopped: bool,
}

impl ClockPlayback {
    pub fn new(duration: Option<Duration>) -> Self {
        Self {
            duration,
            started: None,
            stopped: false,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }
}

impl PlaybackSource for ClockPlayback {
    fn start(&mut self) -> Result<()> {
        self.started = Some(Instant::now());
        self.stopped = false;
        Ok(())
    }

    fn position_ms(&self) -> f32 {
        let elapsed = match self.duration {
            Some(duration) => self.elapsed().min(duration),
            None => self.elapsed(),
        };
        elapsed.as_secs_f32() * 1000.0
    }

    fn is_playing(&self) -> bool {
        if self.stopped || self.started.is_none() {
            return false;
        }
        self.duration
            .map(|duration| self.elapsed() < duration)
            .unwrap_or(true)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Playback whose position is set by the caller.
///
/// Useful for simulations and deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct ManualPlayback {
    position_ms: f32,
    playing: bool,
    started: usize,
    stopped: usize,
}

impl ManualPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&mut self, position_ms: f32) {
        self.position_ms = position_ms;
    }

    pub fn advance(&mut self, delta_ms: f32) {
        self.position_ms += delta_ms;
    }

    /// Simulates the track reaching its end.
    pub fn finish(&mut self) {
        self.playing = false;
    }

    pub fn start_count(&self) -> usize {
        self.started
    }

    pub fn stop_count(&self) -> usize {
        self.stopped
    }
}

impl PlaybackSource for ManualPlayback {
    fn start(&mut self) -> Result<()> {
        self.started += 1;
        self.playing = true;
        Ok(())
    }

    fn position_ms(&self) -> f32 {
        self.position_ms
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn stop(&mut self) {
        self.stopped += 1;
        self.playing = false;
    }
}
