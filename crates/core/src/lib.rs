//! Core library for the showlight DMX show runner.
//!
//! The crate holds the show runtime: the fixture registry, the timed-event,
//! flash and beat engines, and the wire protocol spoken to the DMX bridge.
//! Scripting, audio playback and the serial link itself sit behind small
//! traits ([`ScriptHost`], [`PlaybackSource`], [`Transport`]) so the runtime
//! can be driven by the command line front end or by tests alike.

pub mod audio;
pub mod beat;
pub mod color;
pub mod config;
pub mod cue;
pub mod error;
pub mod flash;
pub mod host;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod runtime;
pub mod show;
pub mod timeline;
pub mod transport;

pub use audio::{ClockPlayback, ManualPlayback, PlaybackSource};
pub use beat::BeatTracker;
pub use color::{ChannelLayout, Color, ColorChannel};
pub use config::{ShowConfig, TransportConfig};
pub use cue::{CueSheet, CueSheetHost};
pub use error::{Result, ScriptError, SetupError, ShowError, TransportError};
pub use flash::{FlashEngine, FlashStep, TimedFlash};
pub use host::{ScriptHost, ShowApi};
pub use model::{load_models_dir, FixtureModel};
pub use protocol::{Codec, Command, DmxWrite, CMD_DMX_WRITE};
pub use registry::{Fixture, FixtureId, Group, GroupId, ModelId, Registry};
pub use runtime::{ShowRuntime, SoundSettings, TickOutcome};
pub use show::{run_show, ExitReason, ShowLoop, ShowReport, ShutdownFlag};
pub use timeline::{ShowClock, TimedFunction, TimedScheduler};
pub use transport::{open_port, LoopbackTransport, Transport};
