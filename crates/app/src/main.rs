use std::{
    path::{Path, PathBuf},
    thread,
};

use clap::{Parser, Subcommand};
use showlight_core::{
    load_models_dir, run_show, transport, ClockPlayback, CueSheet, CueSheetHost,
    LoopbackTransport, PlaybackSource, ShowConfig, ShowRuntime, ShutdownFlag, Transport,
};
use tracing_subscriber::EnvFilter;

fn main() -> showlight_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Models(args) => list_models(args),
    }
}

fn run(args: RunArgs) -> showlight_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => ShowConfig::load(path)?,
        None => ShowConfig::default(),
    };
    args.apply(&mut config);
    init_tracing(config.debug);

    let models = load_models_dir(Path::new(&config.models_dir), config.max_models)?;
    tracing::info!(count = models.len(), dir = %config.models_dir, "loaded fixture models");

    let sheet = CueSheet::load(&args.cue_sheet)?;
    tracing::info!(cue_sheet = ?args.cue_sheet, port = %sheet.port, "starting show");
    let mut playback = ClockPlayback::new(sheet.sound_duration());
    let mut host = CueSheetHost::new(sheet);
    let mut runtime = ShowRuntime::with_models(config.clone(), models)?;

    let shutdown = ShutdownFlag::new();
    spawn_ctrl_c_listener(shutdown.clone());

    let dry_run = args.dry_run;
    let transport_config = config.transport.clone();
    let report = run_show(
        &mut runtime,
        &mut host,
        Some(&mut playback as &mut dyn PlaybackSource),
        |port| {
            if dry_run {
                tracing::info!(port, "dry run, frames go to loopback");
                return Ok(Box::new(LoopbackTransport::new()) as Box<dyn Transport>);
            }
            Ok(transport::open_port(port, &transport_config)?)
        },
        shutdown,
    )?;

    tracing::info!(
        ticks = report.ticks,
        beats = report.beats,
        events = report.events_fired,
        transport_errors = report.transport_errors,
        reason = ?report.reason,
        "show finished"
    );
    Ok(())
}

fn list_models(args: ModelsArgs) -> showlight_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => ShowConfig::load(path)?,
        None => ShowConfig::default(),
    };
    if let Some(max) = args.max_models {
        config.max_models = max;
    }
    init_tracing(config.debug);

    for model in load_models_dir(&args.models, config.max_models)? {
        println!(
            "{:<16} modes={:?} tilt={} pan={} white={}",
            model.name, model.channel_modes, model.supports_tilt, model.supports_pan, model.supports_white
        );
    }
    Ok(())
}

/// Raises `flag` on Ctrl-C. The listener thread lives until the process exits.
fn spawn_ctrl_c_listener(flag: ShutdownFlag) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!(%err, "ctrl-c handler unavailable");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping show");
                flag.request();
            }
        });
    });
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "DMX lighting show runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a show described by a cue sheet.
    Run(RunArgs),
    /// Load every model file in a directory and list it.
    Models(ModelsArgs),
}

#[derive(clap::Args, Debug)]
struct ModelsArgs {
    /// Directory holding `*.json` model files.
    #[arg(short, long, default_value = "models")]
    models: PathBuf,
    /// Optional JSON configuration file; its `max_models` caps the listing.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    max_models: Option<usize>,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// JSON cue sheet describing the rig and the show.
    cue_sheet: PathBuf,
    /// Optional JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding `*.json` model files.
    #[arg(short, long)]
    models: Option<PathBuf>,
    /// Loop updates per second.
    #[arg(long)]
    ups: Option<u32>,
    #[arg(long)]
    max_models: Option<usize>,
    #[arg(long)]
    max_fixtures: Option<usize>,
    /// Log at debug level.
    #[arg(short, long)]
    debug: bool,
    /// Record frames instead of opening the port.
    #[arg(long)]
    dry_run: bool,
    /// Stop once every timed function has fired.
    #[arg(long)]
    exit_after_timed: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut ShowConfig) {
        if let Some(models) = &self.models {
            config.models_dir = models.display().to_string();
        }
        if let Some(ups) = self.ups {
            config.ups = ups;
        }
        if let Some(max) = self.max_models {
            config.max_models = max;
        }
        if let Some(max) = self.max_fixtures {
            config.max_fixtures = max;
        }
        config.debug |= self.debug;
        config.exit_after_timed_functions |= self.exit_after_timed;
    }
}
