//! Transient color flashes with linear decay.
//!
//! Only one flash decays at a time. Triggering another flash replaces the
//! active one immediately; the previous fixture keeps whatever color it had
//! reached.

use crate::{
    color::{Color, ColorChannel},
    error::SetupError,
    registry::{FixtureId, Registry},
    Result,
};

/// Channels below this value count as dark.
pub const FADE_FLOOR: f32 = 1.0;

/// Flash scheduled against the playback position.
#[derive(Debug, Clone)]
pub struct TimedFlash {
    pub fixture: String,
    pub fire_at_ms: f32,
    pub fired: bool,
    pub color: Color,
    /// Decay per millisecond.
    pub speed: f32,
    target: Option<FixtureId>,
}

/// The flash currently owning a fixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveFlash {
    pub fixture: FixtureId,
    pub peak: Color,
    pub speed: f32,
}

/// What the engine changed this tick. The caller writes the fixture color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStep {
    /// The fixture was set to the flash's peak color.
    Peak(FixtureId),
    /// The fixture faded by one step and is still lit.
    Decay(FixtureId),
    /// The fixture faded below the floor; the flash is over and the runtime
    /// writes nothing for it.
    Settled(FixtureId),
}

impl FlashStep {
    pub fn fixture(&self) -> FixtureId {
        match *self {
            FlashStep::Peak(id) | FlashStep::Decay(id) | FlashStep::Settled(id) => id,
        }
    }
}

#[derive(Debug, Default)]
pub struct FlashEngine {
    scheduled: Vec<TimedFlash>,
    pending: Option<ActiveFlash>,
    active: Option<ActiveFlash>,
}

impl FlashEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, fixture: impl Into<String>, fire_at_ms: f32, speed: f32, color: Color) {
        self.scheduled.push(TimedFlash {
            fixture: fixture.into(),
            fire_at_ms,
            fired: false,
            color,
            speed,
            target: None,
        });
    }

    /// Binds scheduled flashes to fixtures. Fails on the first unknown name.
    pub fn resolve(&mut self, registry: &Registry) -> Result<()> {
        for flash in &mut self.scheduled {
            let id = registry
                .find_fixture(&flash.fixture)
                .ok_or_else(|| SetupError::UnknownFlashTarget(flash.fixture.clone()))?;
            flash.target = Some(id);
        }
        Ok(())
    }

    /// Queues an ad-hoc flash; it takes over at the next update.
    pub fn trigger(&mut self, fixture: FixtureId, speed: f32, color: Color) {
        self.pending = Some(ActiveFlash {
            fixture,
            peak: color,
            speed,
        });
    }

    pub fn scheduled(&self) -> &[TimedFlash] {
        &self.scheduled
    }

    pub fn active(&self) -> Option<&ActiveFlash> {
        self.active.as_ref()
    }

    /// Runs one tick against `position_ms` on the playback clock.
    pub fn update(
        &mut self,
        registry: &mut Registry,
        position_ms: f32,
        delta_ms: f32,
    ) -> Option<FlashStep> {
        let mut triggered = self.pending.take();
        for flash in self
            .scheduled
            .iter_mut()
            .filter(|flash| !flash.fired && position_ms >= flash.fire_at_ms)
        {
            flash.fired = true;
            if let Some(fixture) = flash.target {
                triggered = Some(ActiveFlash {
                    fixture,
                    peak: flash.color,
                    speed: flash.speed,
                });
            }
        }

        if let Some(flash) = triggered {
            if let Some(previous) = self.active.filter(|prev| prev.fixture != flash.fixture) {
                tracing::debug!(
                    fixture = %registry.fixture(previous.fixture).name,
                    "flash preempted mid-fade"
                );
            }
            registry.fixture_mut(flash.fixture).color = flash.peak;
            self.active = Some(flash);
            return Some(FlashStep::Peak(flash.fixture));
        }

        let flash = self.active?;
        let fixture = registry.fixture_mut(flash.fixture);
        fixture.color = decay(fixture.color, flash.speed, delta_ms);
        if fixture.color.all_below(FADE_FLOOR) {
            self.active = None;
            Some(FlashStep::Settled(flash.fixture))
        } else {
            Some(FlashStep::Decay(flash.fixture))
        }
    }
}

/// One linear decay step. A channel only fades while it is above `speed`,
/// and never below zero.
pub fn decay(mut color: Color, speed: f32, delta_ms: f32) -> Color {
    for channel in ColorChannel::ALL {
        let value = color.get(channel);
        if value - speed > 0.0 {
            color.set(channel, (value - speed * delta_ms).max(0.0));
        }
    }
    color
}
