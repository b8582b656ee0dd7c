//! Boundary between the show runtime and whatever scripts the show.
//!
//! The runtime calls into a [`ScriptHost`] at fixed points of the show
//! lifecycle; the host calls back through [`ShowApi`] to declare fixtures
//! during setup and to change fixture state while the show runs.

use crate::{
    color::{Color, ColorChannel},
    registry::{FixtureId, GroupId},
    Result,
};

/// Calls the scripting host accepts from the runtime.
///
/// `setup` and `start` are required. An error from either aborts startup.
/// An error from any other callback stops the loop and tears the show down.
pub trait ScriptHost {
    /// Declares fixtures, groups, timed events and settings. Runs once.
    fn setup(&mut self, api: &mut dyn ShowApi) -> Result<()>;

    /// Runs once after the transport is open, before the first tick.
    fn start(&mut self, api: &mut dyn ShowApi) -> Result<()>;

    /// Whether [`ScriptHost::tick`] does anything. A show without a tick
    /// callback, timed functions or sound skips the loop entirely.
    fn has_tick_callback(&self) -> bool {
        false
    }

    fn tick(&mut self, _api: &mut dyn ShowApi, _delta_ms: f32) -> Result<()> {
        Ok(())
    }

    fn beat(&mut self, _api: &mut dyn ShowApi, _beat: u64) -> Result<()> {
        Ok(())
    }

    /// Invoked when the timed function `name` fires.
    fn event(&mut self, api: &mut dyn ShowApi, name: &str) -> Result<()>;

    /// Runs once when the show ends normally.
    fn exit(&mut self, _api: &mut dyn ShowApi) -> Result<()> {
        Ok(())
    }
}

/// Calls the runtime accepts from the scripting host.
pub trait ShowApi {
    // Setup phase only.

    /// Selects the model for subsequent fixture declarations and resets the
    /// universe and channel-mode options.
    fn use_model(&mut self, name: &str) -> Result<()>;

    /// `key` is `"universe"` or `"channel-mode"`.
    fn set_option(&mut self, key: &str, value: i64) -> Result<()>;

    /// Declares a fixture of the current model. Without an explicit address
    /// it gets `channel_mode * fixtures_declared_so_far`.
    fn declare_fixture(&mut self, name: &str, address: Option<u16>) -> Result<FixtureId>;

    fn declare_group(&mut self, name: &str, members: &[&str]) -> Result<GroupId>;

    fn set_port(&mut self, port: &str) -> Result<()>;

    fn set_sound(&mut self, path: &str, bpm: Option<f32>, bpm_resolution: Option<u32>) -> Result<()>;

    fn schedule_timed_function(&mut self, name: &str, fire_at_ms: f32) -> Result<()>;

    /// Schedules a flash against the playback position.
    fn schedule_timed_flash(
        &mut self,
        fixture: &str,
        fire_at_ms: f32,
        speed: f32,
        color: Color,
    ) -> Result<()>;

    // Any phase.

    /// Starts a flash at the next tick, replacing any active flash.
    fn trigger_immediate_flash(&mut self, fixture: &str, speed: f32, color: Color) -> Result<()>;

    /// Zeroes the elapsed clock and re-arms every timed function at the next
    /// tick.
    fn reset_timer(&mut self);

    fn request_exit(&mut self);

    // Runtime mutators. Each one writes to the hardware.

    fn set_channel(&mut self, fixture: &str, channel: ColorChannel, value: u8) -> Result<()>;

    fn set_rgb(&mut self, fixture: &str, r: u8, g: u8, b: u8) -> Result<()>;

    fn set_rgbw(&mut self, fixture: &str, r: u8, g: u8, b: u8, w: u8) -> Result<()>;

    fn set_brightness(&mut self, fixture: &str, brightness: u8) -> Result<()>;

    fn set_tilt(&mut self, fixture: &str, angle: f32, speed: f32) -> Result<()>;

    fn set_pan(&mut self, fixture: &str, angle: f32, speed: f32) -> Result<()>;

    /// Blacks out the fixture and returns tilt and pan to zero.
    fn reset_fixture(&mut self, fixture: &str) -> Result<()>;

    fn set_group_rgbw(&mut self, group: &str, r: u8, g: u8, b: u8, w: u8) -> Result<()>;

    fn set_group_brightness(&mut self, group: &str, brightness: u8) -> Result<()>;

    fn reset_group(&mut self, group: &str) -> Result<()>;

    // Readers.

    fn fixture_color(&self, fixture: &str) -> Result<Color>;

    fn elapsed_ms(&self) -> f32;

    fn set_r(&mut self, fixture: &str, value: u8) -> Result<()> {
        self.set_channel(fixture, ColorChannel::Red, value)
    }

    fn set_g(&mut self, fixture: &str, value: u8) -> Result<()> {
        self.set_channel(fixture, ColorChannel::Green, value)
    }

    fn set_b(&mut self, fixture: &str, value: u8) -> Result<()> {
        self.set_channel(fixture, ColorChannel::Blue, value)
    }

    fn set_w(&mut self, fixture: &str, value: u8) -> Result<()> {
        self.set_channel(fixture, ColorChannel::White, value)
    }
}
