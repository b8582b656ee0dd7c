use serde::{Deserialize, Serialize};

/// Elapsed show time in milliseconds, advanced once per tick.
///
/// This clock drives timed functions. It is independent of the playback
/// position that drives timed flashes and beats.
#[derive(Debug, Default, Clone)]
pub struct ShowClock {
    pub elapsed_ms: f32,
}

impl ShowClock {
    pub fn reset(&mut self) {
        self.elapsed_ms = 0.0;
    }

    pub fn advance(&mut self, delta_ms: f32) {
        self.elapsed_ms = (self.elapsed_ms + delta_ms).max(0.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventState {
    Pending,
    Fired,
}

/// Named one-shot trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedFunction {
    pub name: String,
    pub fire_at_ms: f32,
    pub state: EventState,
}

impl TimedFunction {
    pub fn new(name: impl Into<String>, fire_at_ms: f32) -> Self {
        Self {
            name: name.into(),
            fire_at_ms,
            state: EventState::Pending,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.state == EventState::Fired
    }
}

/// Outcome of one scheduler update.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TimedUpdate {
    /// Names that fired this tick, in registration order.
    pub fired: Vec<String>,
    /// A reset was processed this tick.
    pub reset: bool,
    /// Every timed function had already fired before this tick.
    pub all_fired_before: bool,
}

#[derive(Debug, Default)]
pub struct TimedScheduler {
    events: Vec<TimedFunction>,
}

impl TimedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, name: impl Into<String>, fire_at_ms: f32) {
        self.events.push(TimedFunction::new(name, fire_at_ms));
    }

    pub fn events(&self) -> &[TimedFunction] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Advances the state machine against `elapsed_ms`.
    ///
    /// A requested reset returns every event to `Pending` and fires nothing in
    /// the same update.
    pub fn update(&mut self, elapsed_ms: f32, reset_requested: bool) -> TimedUpdate {
        let all_fired_before = self.events.iter().all(TimedFunction::is_fired);

        if reset_requested {
            for event in &mut self.events {
                event.state = EventState::Pending;
            }
            return TimedUpdate {
                fired: Vec::new(),
                reset: true,
                all_fired_before,
            };
        }

        let fired = self
            .events
            .iter_mut()
            .filter(|event| !event.is_fired() && event.fire_at_ms <= elapsed_ms)
            .map(|event| {
                event.state = EventState::Fired;
                event.name.clone()
            })
            .collect();

        TimedUpdate {
            fired,
            reset: false,
            all_fired_before,
        }
    }

    /// Completion policy: at least one timed function exists, all of them had
    /// fired before this tick and no reset happened.
    pub fn is_complete(&self, update: &TimedUpdate) -> bool {
        !self.events.is_empty() && update.all_fired_before && !update.reset
    }
}
