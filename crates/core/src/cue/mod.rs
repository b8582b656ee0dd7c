//! Declarative JSON show scripts.
//!
//! A cue sheet lists the rig, the timed events and the actions to run at each
//! point of the show lifecycle:
//!
//! ```json
//! {
//!   "port": "/dev/ttyUSB0",
//!   "sound": { "path": "track.ogg", "bpm": 120, "duration_ms": 180000 },
//!   "rigs": [{ "model": "par", "channel_mode": 4, "fixtures": [{ "name": "par1" }] }],
//!   "groups": [{ "name": "front", "fixtures": ["par1"] }],
//!   "timed": [{ "event": "drop", "at_ms": 30000 }],
//!   "flashes": [{ "fixture": "par1", "at_ms": 1000, "speed": 0.5, "color": [255, 0, 0, 0] }],
//!   "on_start": [{ "action": "reset", "fixture": "par1" }],
//!   "events": { "drop": [{ "action": "group_rgbw", "group": "front", "color": [0, 0, 255, 0] }] },
//!   "on_beat": { "every": 2, "actions": [{ "action": "flash", "fixture": "par1", "speed": 1.0, "color": [0, 0, 0, 255] }] }
//! }
//! ```

use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    color::{Color, ColorChannel},
    error::{ScriptError, ShowError},
    host::{ScriptHost, ShowApi},
    Result,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CueSheet {
    pub port: String,
    #[serde(default)]
    pub sound: Option<SoundCue>,
    #[serde(default)]
    pub rigs: Vec<Rig>,
    #[serde(default)]
    pub groups: Vec<GroupCue>,
    #[serde(default)]
    pub timed: Vec<TimedCue>,
    #[serde(default)]
    pub flashes: Vec<FlashCue>,
    #[serde(default)]
    pub on_start: Vec<Action>,
    #[serde(default)]
    pub on_exit: Vec<Action>,
    #[serde(default)]
    pub events: BTreeMap<String, Vec<Action>>,
    #[serde(default)]
    pub on_beat: Option<BeatCue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundCue {
    pub path: String,
    #[serde(default)]
    pub bpm: Option<f32>,
    #[serde(default)]
    pub bpm_resolution: Option<u32>,
    /// Track length. Without it playback never ends on its own.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// Fixtures sharing one model and option set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rig {
    pub model: String,
    #[serde(default)]
    pub universe: Option<u8>,
    #[serde(default)]
    pub channel_mode: Option<u8>,
    pub fixtures: Vec<FixtureCue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCue {
    pub name: String,
    #[serde(default)]
    pub address: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCue {
    pub name: String,
    pub fixtures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedCue {
    pub event: String,
    pub at_ms: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashCue {
    pub fixture: String,
    pub at_ms: f32,
    pub speed: f32,
    pub color: [u8; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatCue {
    /// Run the actions on every n-th beat.
    #[serde(default = "default_every")]
    pub every: u64,
    pub actions: Vec<Action>,
}

fn default_every() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Rgb {
        fixture: String,
        color: [u8; 3],
    },
    Rgbw {
        fixture: String,
        color: [u8; 4],
    },
    Channel {
        fixture: String,
        channel: ColorChannel,
        value: u8,
    },
    Brightness {
        fixture: String,
        value: u8,
    },
    Tilt {
        fixture: String,
        angle: f32,
        #[serde(default)]
        speed: f32,
    },
    Pan {
        fixture: String,
        angle: f32,
        #[serde(default)]
        speed: f32,
    },
    Reset {
        fixture: String,
    },
    Flash {
        fixture: String,
        speed: f32,
        color: [u8; 4],
    },
    GroupRgbw {
        group: String,
        color: [u8; 4],
    },
    GroupBrightness {
        group: String,
        value: u8,
    },
    GroupReset {
        group: String,
    },
    ResetTimer,
    Exit,
}

impl Action {
    pub fn apply(&self, api: &mut dyn ShowApi) -> Result<()> {
        match self {
            Action::Rgb { fixture, color: [r, g, b] } => api.set_rgb(fixture, *r, *g, *b),
            Action::Rgbw { fixture, color: [r, g, b, w] } => api.set_rgbw(fixture, *r, *g, *b, *w),
            Action::Channel {
                fixture,
                channel,
                value,
            } => api.set_channel(fixture, *channel, *value),
            Action::Brightness { fixture, value } => api.set_brightness(fixture, *value),
            Action::Tilt {
                fixture,
                angle,
                speed,
            } => api.set_tilt(fixture, *angle, *speed),
            Action::Pan {
                fixture,
                angle,
                speed,
            } => api.set_pan(fixture, *angle, *speed),
            Action::Reset { fixture } => api.reset_fixture(fixture),
            Action::Flash {
                fixture,
                speed,
                color,
            } => api.trigger_immediate_flash(fixture, *speed, Color::from_bytes(*color)),
            Action::GroupRgbw { group, color: [r, g, b, w] } => {
                api.set_group_rgbw(group, *r, *g, *b, *w)
            }
            Action::GroupBrightness { group, value } => api.set_group_brightness(group, *value),
            Action::GroupReset { group } => api.reset_group(group),
            Action::ResetTimer => {
                api.reset_timer();
                Ok(())
            }
            Action::Exit => {
                api.request_exit();
                Ok(())
            }
        }
    }
}

impl CueSheet {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Declared track length, if any.
    pub fn sound_duration(&self) -> Option<Duration> {
        self.sound
            .as_ref()
            .and_then(|sound| sound.duration_ms)
            .map(Duration::from_millis)
    }
}

/// [`ScriptHost`] that plays back a [`CueSheet`].
#[derive(Debug, Clone)]
pub struct CueSheetHost {
    sheet: CueSheet,
}

impl CueSheetHost {
    pub fn new(sheet: CueSheet) -> Self {
        Self { sheet }
    }

    pub fn sheet(&self) -> &CueSheet {
        &self.sheet
    }
}

/// Runs a callback's actions in order. Hardware and lookup failures are
/// logged and the next action runs; anything else aborts the callback.
fn run_actions(callback: &str, actions: &[Action], api: &mut dyn ShowApi) -> Result<()> {
    for action in actions {
        match action.apply(api) {
            Ok(()) => {}
            Err(
                err @ (ShowError::Transport(_)
                | ShowError::UnknownFixture(_)
                | ShowError::UnknownGroup(_)
                | ShowError::UnsupportedChannel { .. }),
            ) => {
                tracing::error!(callback, %err, "cue action failed");
            }
            Err(err) => {
                return Err(ScriptError::Failed {
                    callback: callback.to_string(),
                    message: err.to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}

impl ScriptHost for CueSheetHost {
    fn setup(&mut self, api: &mut dyn ShowApi) -> Result<()> {
        let sheet = &self.sheet;
        api.set_port(&sheet.port)?;
        if let Some(sound) = &sheet.sound {
            api.set_sound(&sound.path, sound.bpm, sound.bpm_resolution)?;
        }

        for rig in &sheet.rigs {
            api.use_model(&rig.model)?;
            if let Some(universe) = rig.universe {
                api.set_option("universe", i64::from(universe))?;
            }
            if let Some(mode) = rig.channel_mode {
                api.set_option("channel-mode", i64::from(mode))?;
            }
            for fixture in &rig.fixtures {
                api.declare_fixture(&fixture.name, fixture.address)?;
            }
        }

        for group in &sheet.groups {
            let members: Vec<&str> = group.fixtures.iter().map(String::as_str).collect();
            api.declare_group(&group.name, &members)?;
        }

        for timed in &sheet.timed {
            api.schedule_timed_function(&timed.event, timed.at_ms)?;
        }
        for flash in &sheet.flashes {
            api.schedule_timed_flash(
                &flash.fixture,
                flash.at_ms,
                flash.speed,
                Color::from_bytes(flash.color),
            )?;
        }
        Ok(())
    }

    fn start(&mut self, api: &mut dyn ShowApi) -> Result<()> {
        run_actions("start", &self.sheet.on_start, api)
    }

    fn beat(&mut self, api: &mut dyn ShowApi, beat: u64) -> Result<()> {
        match &self.sheet.on_beat {
            Some(cue) if beat % cue.every.max(1) == 0 => run_actions("beat", &cue.actions, api),
            _ => Ok(()),
        }
    }

    fn event(&mut self, api: &mut dyn ShowApi, name: &str) -> Result<()> {
        let actions = self
            .sheet
            .events
            .get(name)
            .ok_or_else(|| ScriptError::MissingCallback {
                name: name.to_string(),
            })?;
        run_actions(name, actions, api)
    }

    fn exit(&mut self, api: &mut dyn ShowApi) -> Result<()> {
        run_actions("exit", &self.sheet.on_exit, api)
    }
}
