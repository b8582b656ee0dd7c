//! Fixed-rate show loop and the setup → start → loop → exit lifecycle.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    audio::PlaybackSource,
    config::ShowConfig,
    error::SetupError,
    host::ScriptHost,
    runtime::{ShowRuntime, TickOutcome},
    transport::Transport,
    Result, ShowError,
};

/// Cancellation handle shared with signal handlers.
///
/// Checked at the top of every loop iteration; it never interrupts a tick
/// in progress.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the show stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The host asked to exit.
    Requested,
    /// The shutdown flag was raised, usually by Ctrl-C.
    Interrupted,
    /// The sound track finished.
    PlaybackEnded,
    /// Every timed function fired and the show was configured to stop then.
    TimedFunctionsComplete,
    /// Nothing needed ticking, so the loop never ran.
    NothingToRun,
}

/// Summary of a finished show.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowReport {
    pub ticks: u64,
    pub beats: u64,
    pub events_fired: u64,
    pub transport_errors: u64,
    pub reason: ExitReason,
}

impl ShowReport {
    fn new(reason: ExitReason) -> Self {
        Self {
            ticks: 0,
            beats: 0,
            events_fired: 0,
            transport_errors: 0,
            reason,
        }
    }

    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        self.beats += u64::from(outcome.beat.is_some());
        self.events_fired += outcome.fired.len() as u64;
        self.transport_errors += outcome.transport_errors as u64;
    }
}

/// Drives [`ShowRuntime::tick`] at the configured update rate.
#[derive(Debug, Clone)]
pub struct ShowLoop {
    interval: Duration,
    shutdown: ShutdownFlag,
}

impl ShowLoop {
    pub fn new(config: &ShowConfig, shutdown: ShutdownFlag) -> Self {
        Self {
            interval: Duration::from_millis(config.tick_interval_ms()),
            shutdown,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs ticks until an exit condition is met. A callback error stops the
    /// loop and is returned.
    pub fn run(
        &self,
        runtime: &mut ShowRuntime,
        host: &mut dyn ScriptHost,
        mut playback: Option<&mut (dyn PlaybackSource + '_)>,
    ) -> Result<ShowReport> {
        let mut report = ShowReport::new(ExitReason::Requested);
        let mut last_tick = Instant::now();

        loop {
            if self.shutdown.is_requested() {
                report.reason = ExitReason::Interrupted;
                break;
            }
            if runtime.exit_requested() {
                report.reason = ExitReason::Requested;
                break;
            }

            let now = Instant::now();
            let since = now.duration_since(last_tick);
            if since < self.interval {
                thread::sleep(self.interval - since);
                continue;
            }
            last_tick = now;

            let delta_ms = since.as_secs_f32() * 1000.0;
            let outcome = runtime.tick(host, playback.as_deref_mut(), delta_ms)?;
            report.record(&outcome);
            if let Some(reason) = outcome.exit {
                report.reason = reason;
                break;
            }
        }

        tracing::info!(ticks = report.ticks, reason = ?report.reason, "show loop stopped");
        Ok(report)
    }
}

/// Runs a complete show.
///
/// Calls the host's setup, validates it, opens the transport for the declared
/// port with `open_port`, starts playback and the host, runs the loop and finally the
/// host's exit callback. Playback and transport are released exactly once on
/// every path after they were opened.
pub fn run_show<F>(
    runtime: &mut ShowRuntime,
    host: &mut dyn ScriptHost,
    playback: Option<&mut (dyn PlaybackSource + '_)>,
    open_port: F,
    shutdown: ShutdownFlag,
) -> Result<ShowReport>
where
    F: FnOnce(&str) -> Result<Box<dyn Transport>>,
{
    host.setup(runtime)?;

    let port = runtime.port().ok_or(SetupError::NoPort)?.to_string();
    runtime.validate_setup()?;
    let transport = open_port(&port)?;
    runtime.finish_setup(transport)?;

    let mut playback = match (runtime.has_sound(), playback) {
        (false, _) => None,
        (true, Some(playback)) => Some(playback),
        (true, None) => {
            runtime.shutdown();
            return Err(ShowError::msg("sound configured but no playback source given"));
        }
    };

    let result = run_started(runtime, host, playback.as_deref_mut(), shutdown);

    if let Some(playback) = playback {
        playback.stop();
    }
    runtime.shutdown();
    result
}

fn run_started(
    runtime: &mut ShowRuntime,
    host: &mut dyn ScriptHost,
    mut playback: Option<&mut (dyn PlaybackSource + '_)>,
    shutdown: ShutdownFlag,
) -> Result<ShowReport> {
    if let Some(playback) = playback.as_deref_mut() {
        playback.start()?;
        if let Some(sound) = runtime.sound() {
            tracing::info!(path = %sound.path, bpm = sound.bpm, "playback started");
        }
    }

    host.start(runtime)?;

    let needs_loop = host.has_tick_callback()
        || !runtime.timed().is_empty()
        || !runtime.flashes().scheduled().is_empty()
        || runtime.has_sound();
    let report = if needs_loop {
        ShowLoop::new(runtime.config(), shutdown).run(runtime, host, playback)?
    } else {
        ShowReport::new(ExitReason::NothingToRun)
    };

    host.exit(runtime)?;
    Ok(report)
}
