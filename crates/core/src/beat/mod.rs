/// Derives a beat index from the playback position.
#[derive(Debug, Clone)]
pub struct BeatTracker {
    beat_duration_ms: f32,
    last_beat: u64,
}

impl BeatTracker {
    /// Returns `None` when `bpm` is not positive; such a show has no beats.
    pub fn new(bpm: f32) -> Option<Self> {
        (bpm > 0.0).then(|| Self {
            beat_duration_ms: 60_000.0 / bpm,
            last_beat: 0,
        })
    }

    pub fn beat_duration_ms(&self) -> f32 {
        self.beat_duration_ms
    }

    pub fn last_beat(&self) -> u64 {
        self.last_beat
    }

    pub fn beat_index(&self, position_ms: f32) -> u64 {
        (position_ms.max(0.0) / self.beat_duration_ms).floor() as u64
    }

    /// Returns the new beat index when the position crossed into a later beat.
    ///
    /// Skipped beats are not reported individually; only the latest index is.
    pub fn update(&mut self, position_ms: f32) -> Option<u64> {
        let beat = self.beat_index(position_ms);
        if beat > self.last_beat {
            self.last_beat = beat;
            Some(beat)
        } else {
            None
        }
    }
}
