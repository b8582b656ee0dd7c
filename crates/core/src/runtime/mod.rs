//! The show context: every piece of state a running show owns.
//!
//! [`ShowRuntime`] is created once per process. During setup it collects
//! declarations from the host; [`ShowRuntime::finish_setup`] then freezes the
//! registry and installs the transport, after which the runtime only accepts
//! state changes that are written straight to the hardware.

use crate::{
    audio::PlaybackSource,
    beat::BeatTracker,
    color::{to_dmx, Color, ColorChannel},
    config::ShowConfig,
    error::{SetupError, TransportError},
    flash::{FlashEngine, FlashStep},
    host::{ScriptHost, ShowApi},
    model::FixtureModel,
    protocol::{Codec, Command, DmxWrite},
    registry::{FixtureId, GroupId, ModelId, Registry},
    show::ExitReason,
    timeline::{ShowClock, TimedScheduler},
    transport::Transport,
    Result, ShowError,
};

/// Sound track settings declared by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundSettings {
    pub path: String,
    /// Zero when the track has no tempo.
    pub bpm: f32,
    pub bpm_resolution: u32,
}

/// Declaration context carried between setup calls.
#[derive(Debug)]
struct SetupCursor {
    model: Option<ModelId>,
    universe: u8,
    channel_mode: u8,
    declared: u16,
}

impl Default for SetupCursor {
    fn default() -> Self {
        Self {
            model: None,
            universe: 1,
            channel_mode: 0,
            declared: 0,
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickOutcome {
    pub beat: Option<u64>,
    pub fired: Vec<String>,
    pub flash: Option<FlashStep>,
    /// Flash writes that failed on the transport this tick.
    pub transport_errors: usize,
    pub exit: Option<ExitReason>,
}

#[derive(Debug)]
pub struct ShowRuntime {
    config: ShowConfig,
    registry: Registry,
    cursor: SetupCursor,
    port: Option<String>,
    sound: Option<SoundSettings>,
    clock: ShowClock,
    timed: TimedScheduler,
    flashes: FlashEngine,
    beats: Option<BeatTracker>,
    codec: Option<Codec>,
    reset_requested: bool,
    exit_requested: bool,
    closed: bool,
}

impl ShowRuntime {
    pub fn new(config: ShowConfig) -> Self {
        Self {
            registry: Registry::new(config.max_models, config.max_fixtures),
            config,
            cursor: SetupCursor::default(),
            port: None,
            sound: None,
            clock: ShowClock::default(),
            timed: TimedScheduler::new(),
            flashes: FlashEngine::new(),
            beats: None,
            codec: None,
            reset_requested: false,
            exit_requested: false,
            closed: false,
        }
    }

    /// Creates a runtime with `models` already registered.
    pub fn with_models(config: ShowConfig, models: Vec<FixtureModel>) -> Result<Self> {
        let mut runtime = Self::new(config);
        for model in models {
            runtime.registry.register_model(model)?;
        }
        Ok(runtime)
    }

    /// Checks the declarations collected so far without ending setup.
    ///
    /// Timed flashes are bound to their fixtures here, so a flash naming an
    /// unknown fixture fails before any port is opened.
    pub fn validate_setup(&mut self) -> Result<()> {
        self.ensure_setup("validate_setup")?;
        self.flashes.resolve(&self.registry)
    }

    /// Ends the setup phase and installs the hardware link.
    ///
    /// On a validation error the transport is closed and not installed.
    pub fn finish_setup(&mut self, mut transport: Box<dyn Transport>) -> Result<()> {
        if let Err(err) = self.validate_setup() {
            transport.close();
            return Err(err);
        }
        self.beats = self
            .sound
            .as_ref()
            .and_then(|sound| BeatTracker::new(sound.bpm));
        self.registry.close_setup();
        self.codec = Some(Codec::new(transport));

        tracing::info!(
            fixtures = self.registry.fixtures().len(),
            groups = self.registry.groups().len(),
            timed_functions = self.timed.len(),
            timed_flashes = self.flashes.scheduled().len(),
            "setup complete"
        );
        Ok(())
    }

    /// Closes the transport. Safe to call more than once; only the first call
    /// has an effect.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(codec) = self.codec.as_mut() {
            codec.close();
            tracing::debug!(mismatches = codec.mismatches(), "transport closed");
        }
    }

    /// Runs one tick of the show.
    ///
    /// `playback` is consulted only when the show has sound. Flash write
    /// failures are logged and counted; callback errors abort the tick.
    pub fn tick(
        &mut self,
        host: &mut dyn ScriptHost,
        playback: Option<&mut (dyn PlaybackSource + '_)>,
        delta_ms: f32,
    ) -> Result<TickOutcome> {
        let mut outcome = TickOutcome::default();
        self.clock.advance(delta_ms);

        if host.has_tick_callback() {
            host.tick(self, delta_ms)?;
        }

        let mut position_ms = self.clock.elapsed_ms;
        if let Some(playback) = playback.filter(|_| self.sound.is_some()) {
            if !playback.is_playing() {
                outcome.exit.get_or_insert(ExitReason::PlaybackEnded);
            }
            position_ms = playback.position_ms();

            let beat = self
                .beats
                .as_mut()
                .and_then(|tracker| tracker.update(position_ms));
            if let Some(beat) = beat {
                outcome.beat = Some(beat);
                host.beat(self, beat)?;
            }
        }

        outcome.flash = self.flashes.update(&mut self.registry, position_ms, delta_ms);
        let lit = outcome.flash.filter(|step| !matches!(step, FlashStep::Settled(_)));
        if let Some(step) = lit {
            let id = step.fixture();
            let color = self.registry.fixture(id).color;
            if let Err(err) = self.send_color(id, color) {
                outcome.transport_errors += 1;
                tracing::error!(
                    fixture = %self.registry.fixture(id).name,
                    %err,
                    "failed to write flash color"
                );
            }
        }

        let reset = std::mem::take(&mut self.reset_requested);
        let update = self.timed.update(self.clock.elapsed_ms, reset);
        if update.reset {
            self.clock.reset();
            tracing::debug!("timer reset");
        }
        for name in &update.fired {
            tracing::debug!(event = %name, elapsed_ms = self.clock.elapsed_ms, "timed function fired");
            host.event(self, name)?;
        }
        if self.config.exit_after_timed_functions && self.timed.is_complete(&update) {
            outcome.exit.get_or_insert(ExitReason::TimedFunctionsComplete);
        }
        outcome.fired = update.fired;

        if self.exit_requested {
            outcome.exit.get_or_insert(ExitReason::Requested);
        }
        Ok(outcome)
    }

    pub fn config(&self) -> &ShowConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn sound(&self) -> Option<&SoundSettings> {
        self.sound.as_ref()
    }

    pub fn has_sound(&self) -> bool {
        self.sound.is_some()
    }

    pub fn timed(&self) -> &TimedScheduler {
        &self.timed
    }

    pub fn flashes(&self) -> &FlashEngine {
        &self.flashes
    }

    pub fn beats(&self) -> Option<&BeatTracker> {
        self.beats.as_ref()
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn fixture_id(&self, name: &str) -> Result<FixtureId> {
        self.registry
            .find_fixture(name)
            .ok_or_else(|| ShowError::UnknownFixture(name.to_string()))
    }

    fn group_members(&self, name: &str) -> Result<Vec<FixtureId>> {
        let id = self
            .registry
            .find_group(name)
            .ok_or_else(|| ShowError::UnknownGroup(name.to_string()))?;
        Ok(self.registry.group(id).members.clone())
    }

    fn ensure_setup(&self, operation: &'static str) -> Result<()> {
        if self.registry.is_setup_closed() {
            Err(ShowError::SetupClosed { operation })
        } else {
            Ok(())
        }
    }

    fn codec(&mut self) -> Result<&mut Codec> {
        self.codec
            .as_mut()
            .filter(|_| !self.closed)
            .ok_or(ShowError::Transport(TransportError::NotOpen))
    }

    fn send(&mut self, writes: Vec<DmxWrite>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        self.codec()?.send_command(&Command::DmxWrite(writes))?;
        Ok(())
    }

    /// Writes every wired color channel of the fixture in a single frame.
    fn send_color(&mut self, id: FixtureId, color: Color) -> Result<()> {
        let writes = self
            .registry
            .model_of(id)
            .channels
            .color_channels()
            .map(|(channel, offset)| DmxWrite::new(offset, to_dmx(color.get(channel))))
            .collect();
        self.send(writes)
    }

    fn apply_color(&mut self, id: FixtureId, color: Color) -> Result<()> {
        self.send_color(id, color)?;
        self.registry.fixture_mut(id).color = color;
        Ok(())
    }

    fn apply_brightness(&mut self, id: FixtureId, brightness: u8) -> Result<()> {
        let offset = self.required_channel(id, "brightness", |model| model.channels.brightness)?;
        self.send(vec![DmxWrite::new(offset, brightness)])?;
        self.registry.fixture_mut(id).brightness = brightness;
        Ok(())
    }

    fn apply_reset(&mut self, id: FixtureId) -> Result<()> {
        self.apply_color(id, Color::BLACK)?;

        let model = self.registry.model_of(id);
        let tilt = model.channels.tilt.filter(|_| model.supports_tilt);
        let pan = model.channels.pan.filter(|_| model.supports_pan);
        if let Some(offset) = tilt {
            self.send(vec![DmxWrite::new(offset, 0)])?;
        }
        self.registry.fixture_mut(id).tilt = 0.0;
        if let Some(offset) = pan {
            self.send(vec![DmxWrite::new(offset, 0)])?;
        }
        self.registry.fixture_mut(id).pan = 0.0;
        Ok(())
    }

    fn required_channel(
        &self,
        id: FixtureId,
        channel: &'static str,
        offset: impl Fn(&FixtureModel) -> Option<u8>,
    ) -> Result<u8> {
        offset(self.registry.model_of(id)).ok_or_else(|| ShowError::UnsupportedChannel {
            fixture: self.registry.fixture(id).name.clone(),
            channel,
        })
    }

    fn apply_axis(&mut self, name: &str, axis: Axis, angle: f32, speed: f32) -> Result<()> {
        let id = self.fixture_id(name)?;
        let offset = self.required_channel(id, axis.name(), |model| axis.offset(model))?;
        let model = self.registry.model_of(id);
        let mut writes = vec![DmxWrite::new(offset, angle_to_dmx(angle, axis.max_angle(model)))];
        if let Some(motor) = model.channels.motor_speed {
            writes.push(DmxWrite::new(motor, to_dmx(speed)));
        }

        self.send(writes)?;
        let fixture = self.registry.fixture_mut(id);
        match axis {
            Axis::Tilt => fixture.tilt = angle,
            Axis::Pan => fixture.pan = angle,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Tilt,
    Pan,
}

impl Axis {
    fn name(self) -> &'static str {
        match self {
            Axis::Tilt => "tilt",
            Axis::Pan => "pan",
        }
    }

    fn offset(self, model: &FixtureModel) -> Option<u8> {
        match self {
            Axis::Tilt => model.channels.tilt,
            Axis::Pan => model.channels.pan,
        }
    }

    fn max_angle(self, model: &FixtureModel) -> f32 {
        match self {
            Axis::Tilt => model.max_tilt,
            Axis::Pan => model.max_pan,
        }
    }
}

/// Scales an angle against the model's calibrated maximum.
fn angle_to_dmx(angle: f32, max_angle: f32) -> u8 {
    if max_angle <= 0.0 {
        return 0;
    }
    to_dmx(angle / max_angle * 255.0)
}

fn option_byte(key: &str, value: i64) -> Result<u8> {
    u8::try_from(value)
        .map_err(|_| ShowError::msg(format!("option `{key}` out of range: {value}")))
}

impl ShowApi for ShowRuntime {
    fn use_model(&mut self, name: &str) -> Result<()> {
        self.ensure_setup("use_model")?;
        let model = self
            .registry
            .find_model(name)
            .ok_or_else(|| ShowError::UnknownModel(name.to_string()))?;
        self.cursor.model = Some(model);
        self.cursor.universe = 1;
        self.cursor.channel_mode = 0;
        tracing::debug!(model = name, "using model");
        Ok(())
    }

    fn set_option(&mut self, key: &str, value: i64) -> Result<()> {
        self.ensure_setup("set_option")?;
        match key {
            "universe" => self.cursor.universe = option_byte(key, value)?,
            "channel-mode" => self.cursor.channel_mode = option_byte(key, value)?,
            _ => return Err(ShowError::InvalidOption { key: key.to_string() }),
        }
        tracing::debug!(option = key, value, "option set");
        Ok(())
    }

    fn declare_fixture(&mut self, name: &str, address: Option<u16>) -> Result<FixtureId> {
        self.ensure_setup("declare_fixture")?;
        let model = self
            .cursor
            .model
            .ok_or_else(|| SetupError::NoModelSelected(name.to_string()))?;
        let address = address.unwrap_or_else(|| {
            u16::from(self.cursor.channel_mode).saturating_mul(self.cursor.declared)
        });

        let id = self.registry.register_fixture(
            name,
            model,
            address,
            self.cursor.universe,
            self.cursor.channel_mode,
        )?;
        self.cursor.declared = self.cursor.declared.saturating_add(1);
        tracing::debug!(
            fixture = name,
            model = %self.registry.model(model).name,
            address,
            universe = self.cursor.universe,
            "created fixture"
        );
        Ok(id)
    }

    fn declare_group(&mut self, name: &str, members: &[&str]) -> Result<GroupId> {
        self.ensure_setup("declare_group")?;
        let id = self.registry.register_group(name, members)?;
        tracing::debug!(group = name, ?members, "created group");
        Ok(id)
    }

    fn set_port(&mut self, port: &str) -> Result<()> {
        self.ensure_setup("set_port")?;
        self.port = Some(port.to_string());
        tracing::debug!(port, "using port");
        Ok(())
    }

    fn set_sound(&mut self, path: &str, bpm: Option<f32>, bpm_resolution: Option<u32>) -> Result<()> {
        self.ensure_setup("set_sound")?;
        self.sound = Some(SoundSettings {
            path: path.to_string(),
            bpm: bpm.unwrap_or(0.0),
            bpm_resolution: bpm_resolution.unwrap_or(1),
        });
        tracing::debug!(path, ?bpm, "sound configured");
        Ok(())
    }

    fn schedule_timed_function(&mut self, name: &str, fire_at_ms: f32) -> Result<()> {
        self.ensure_setup("schedule_timed_function")?;
        self.timed.schedule(name, fire_at_ms);
        Ok(())
    }

    fn schedule_timed_flash(
        &mut self,
        fixture: &str,
        fire_at_ms: f32,
        speed: f32,
        color: Color,
    ) -> Result<()> {
        self.ensure_setup("schedule_timed_flash")?;
        self.flashes.schedule(fixture, fire_at_ms, speed, color);
        Ok(())
    }

    fn trigger_immediate_flash(&mut self, fixture: &str, speed: f32, color: Color) -> Result<()> {
        let id = self.fixture_id(fixture)?;
        self.flashes.trigger(id, speed, color);
        Ok(())
    }

    fn reset_timer(&mut self) {
        self.reset_requested = true;
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    fn set_channel(&mut self, fixture: &str, channel: ColorChannel, value: u8) -> Result<()> {
        let id = self.fixture_id(fixture)?;
        self.required_channel(id, channel.name(), |model| model.channels.color(channel))?;
        let mut color = self.registry.fixture(id).color;
        color.set(channel, f32::from(value));
        self.apply_color(id, color)
    }

    fn set_rgb(&mut self, fixture: &str, r: u8, g: u8, b: u8) -> Result<()> {
        let id = self.fixture_id(fixture)?;
        let current = self.registry.fixture(id).color;
        let color = Color::rgbw(f32::from(r), f32::from(g), f32::from(b), current.w);
        self.apply_color(id, color)
    }

    fn set_rgbw(&mut self, fixture: &str, r: u8, g: u8, b: u8, w: u8) -> Result<()> {
        let id = self.fixture_id(fixture)?;
        self.apply_color(id, Color::from_bytes([r, g, b, w]))
    }

    fn set_brightness(&mut self, fixture: &str, brightness: u8) -> Result<()> {
        let id = self.fixture_id(fixture)?;
        self.apply_brightness(id, brightness)
    }

    fn set_tilt(&mut self, fixture: &str, angle: f32, speed: f32) -> Result<()> {
        self.apply_axis(fixture, Axis::Tilt, angle, speed)
    }

    fn set_pan(&mut self, fixture: &str, angle: f32, speed: f32) -> Result<()> {
        self.apply_axis(fixture, Axis::Pan, angle, speed)
    }

    fn reset_fixture(&mut self, fixture: &str) -> Result<()> {
        let id = self.fixture_id(fixture)?;
        self.apply_reset(id)
    }

    fn set_group_rgbw(&mut self, group: &str, r: u8, g: u8, b: u8, w: u8) -> Result<()> {
        let color = Color::from_bytes([r, g, b, w]);
        for id in self.group_members(group)? {
            self.apply_color(id, color)?;
        }
        Ok(())
    }

    fn set_group_brightness(&mut self, group: &str, brightness: u8) -> Result<()> {
        for id in self.group_members(group)? {
            self.apply_brightness(id, brightness)?;
        }
        Ok(())
    }

    fn reset_group(&mut self, group: &str) -> Result<()> {
        for id in self.group_members(group)? {
            self.apply_reset(id)?;
        }
        Ok(())
    }

    fn fixture_color(&self, fixture: &str) -> Result<Color> {
        let id = self.fixture_id(fixture)?;
        Ok(self.registry.fixture(id).color)
    }

    fn elapsed_ms(&self) -> f32 {
        self.clock.elapsed_ms
    }
}
