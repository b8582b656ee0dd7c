use showlight_core::{
    run_show, transport::SentFrames, ChannelLayout, Color, CueSheet, CueSheetHost, ExitReason,
    FixtureModel, FlashStep, LoopbackTransport, ManualPlayback, PlaybackSource, Result,
    ScriptError, ScriptHost, SetupError, ShowApi, ShowConfig, ShowError, ShowRuntime,
    ShutdownFlag, Transport,
};

type Hook = fn(&mut dyn ShowApi) -> Result<()>;

fn models() -> Vec<FixtureModel> {
    vec![
        FixtureModel::new(
            "par",
            ChannelLayout {
                red: Some(0),
                green: Some(1),
                blue: Some(2),
                white: Some(3),
                ..Default::default()
            },
        ),
        FixtureModel::new(
            "head",
            ChannelLayout {
                red: Some(0),
                green: Some(1),
                blue: Some(2),
                white: Some(3),
                tilt: Some(4),
                pan: Some(5),
                ..Default::default()
            },
        )
        .with_calibration(180.0, 540.0),
    ]
}

fn par_rig(api: &mut dyn ShowApi) -> Result<()> {
    api.set_port("loopback")?;
    api.use_model("par")?;
    api.set_option("channel-mode", 4)?;
    api.declare_fixture("par1", None)?;
    api.declare_fixture("par2", None)?;
    api.declare_group("all", &["par1", "par2"])?;
    Ok(())
}

/// Host that records every callback and reacts to named events.
struct RecordingHost {
    rig: Hook,
    on_exit: Option<Hook>,
    tick_callback: bool,
    reset_on: Option<&'static str>,
    exit_on: Option<&'static str>,
    fail_on: Option<&'static str>,
    starts: usize,
    ticks: usize,
    fired: Vec<String>,
    beats: Vec<u64>,
    exits: usize,
}

impl RecordingHost {
    fn new(rig: Hook) -> Self {
        Self {
            rig,
            on_exit: None,
            tick_callback: false,
            reset_on: None,
            exit_on: None,
            fail_on: None,
            starts: 0,
            ticks: 0,
            fired: Vec::new(),
            beats: Vec::new(),
            exits: 0,
        }
    }
}

impl ScriptHost for RecordingHost {
    fn setup(&mut self, api: &mut dyn ShowApi) -> Result<()> {
        (self.rig)(api)
    }

    fn start(&mut self, _api: &mut dyn ShowApi) -> Result<()> {
        self.starts += 1;
        Ok(())
    }

    fn has_tick_callback(&self) -> bool {
        self.tick_callback
    }

    fn tick(&mut self, _api: &mut dyn ShowApi, _delta_ms: f32) -> Result<()> {
        self.ticks += 1;
        Ok(())
    }

    fn beat(&mut self, _api: &mut dyn ShowApi, beat: u64) -> Result<()> {
        self.beats.push(beat);
        Ok(())
    }

    fn event(&mut self, api: &mut dyn ShowApi, name: &str) -> Result<()> {
        self.fired.push(name.to_string());
        if self.fail_on == Some(name) {
            return Err(ScriptError::Failed {
                callback: name.to_string(),
                message: "boom".into(),
            }
            .into());
        }
        if self.reset_on == Some(name) {
            api.reset_timer();
        }
        if self.exit_on == Some(name) {
            api.request_exit();
        }
        Ok(())
    }

    fn exit(&mut self, api: &mut dyn ShowApi) -> Result<()> {
        self.exits += 1;
        match self.on_exit {
            Some(hook) => hook(api),
            None => Ok(()),
        }
    }
}

fn started(config: ShowConfig, host: &mut RecordingHost) -> (ShowRuntime, SentFrames) {
    let mut runtime = ShowRuntime::with_models(config, models()).unwrap();
    host.setup(&mut runtime).unwrap();
    let transport = LoopbackTransport::new();
    let frames = transport.frames();
    runtime.finish_setup(Box::new(transport)).unwrap();
    (runtime, frames)
}

fn fast_config() -> ShowConfig {
    ShowConfig {
        ups: 1000,
        ..ShowConfig::default()
    }
}

#[test]
fn rgbw_write_is_a_single_frame() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        api.set_port("loopback")?;
        api.use_model("par")?;
        api.declare_fixture("par1", Some(10))?;
        Ok(())
    }
    let mut host = RecordingHost::new(rig);
    let (mut runtime, frames) = started(ShowConfig::default(), &mut host);

    runtime.set_rgbw("par1", 255, 0, 0, 255).unwrap();

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0], vec![10, 1, 4, 0, 255, 1, 0, 2, 0, 3, 255]);
    assert_eq!(
        runtime.fixture_color("par1").unwrap(),
        Color::rgbw(255.0, 0.0, 0.0, 255.0)
    );
    assert_eq!(runtime.registry().fixture(runtime.fixture_id("par1").unwrap()).address, 10);
}

#[test]
fn timed_flash_peaks_at_its_threshold_and_settles_dark() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_flash("par1", 1000.0, 5.0, Color::rgbw(255.0, 0.0, 0.0, 0.0))
    }
    let mut host = RecordingHost::new(rig);
    let (mut runtime, frames) = started(ShowConfig::default(), &mut host);
    let par1 = runtime.fixture_id("par1").unwrap();

    for _ in 0..9 {
        let outcome = runtime.tick(&mut host, None, 100.0).unwrap();
        assert_eq!(outcome.flash, None);
    }

    let peak = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(peak.flash, Some(FlashStep::Peak(par1)));
    assert_eq!(runtime.fixture_color("par1").unwrap().r, 255.0);

    let settled = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(settled.flash, Some(FlashStep::Settled(par1)));
    assert!(runtime.fixture_color("par1").unwrap().r < 1.0);

    let idle = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(idle.flash, None);

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0], vec![10, 1, 4, 0, 255, 1, 0, 2, 0, 3, 0]);
}

#[test]
fn immediate_flash_preempts_a_fading_timed_flash() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_flash("par1", 0.0, 0.1, Color::rgbw(255.0, 0.0, 0.0, 0.0))
    }
    let mut host = RecordingHost::new(rig);
    let (mut runtime, frames) = started(ShowConfig::default(), &mut host);
    let par1 = runtime.fixture_id("par1").unwrap();
    let par2 = runtime.fixture_id("par2").unwrap();

    assert_eq!(runtime.tick(&mut host, None, 100.0).unwrap().flash, Some(FlashStep::Peak(par1)));
    assert_eq!(runtime.tick(&mut host, None, 100.0).unwrap().flash, Some(FlashStep::Decay(par1)));
    let faded = runtime.fixture_color("par1").unwrap();
    assert_eq!(faded.r, 245.0);

    runtime
        .trigger_immediate_flash("par2", 0.1, Color::rgbw(0.0, 0.0, 255.0, 0.0))
        .unwrap();
    let peak = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(peak.flash, Some(FlashStep::Peak(par2)));
    assert_eq!(runtime.fixture_color("par2").unwrap().b, 255.0);

    let decay = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(decay.flash, Some(FlashStep::Decay(par2)));
    assert_eq!(runtime.fixture_color("par1").unwrap(), faded);

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[2], vec![10, 1, 4, 0, 0, 1, 0, 2, 255, 3, 0]);
}

#[test]
fn timed_flash_wins_over_immediate_flash_in_the_same_tick() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_flash("par1", 200.0, 0.1, Color::rgbw(255.0, 0.0, 0.0, 0.0))
    }
    let mut host = RecordingHost::new(rig);
    let (mut runtime, frames) = started(ShowConfig::default(), &mut host);
    let par1 = runtime.fixture_id("par1").unwrap();

    assert_eq!(runtime.tick(&mut host, None, 100.0).unwrap().flash, None);
    runtime
        .trigger_immediate_flash("par2", 0.1, Color::rgbw(0.0, 0.0, 255.0, 0.0))
        .unwrap();

    let crossing = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(crossing.flash, Some(FlashStep::Peak(par1)));
    assert_eq!(runtime.fixture_color("par2").unwrap(), Color::BLACK);
    assert_eq!(frames.lock().unwrap().len(), 1);
}

#[test]
fn flash_write_failure_is_counted_and_the_show_goes_on() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_flash("par1", 0.0, 0.1, Color::rgbw(255.0, 0.0, 0.0, 0.0))
    }
    let mut host = RecordingHost::new(rig);
    let mut runtime = ShowRuntime::with_models(ShowConfig::default(), models()).unwrap();
    host.setup(&mut runtime).unwrap();
    runtime.finish_setup(Box::new(LoopbackTransport::failing())).unwrap();
    let par1 = runtime.fixture_id("par1").unwrap();

    let peak = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(peak.flash, Some(FlashStep::Peak(par1)));
    assert_eq!(peak.transport_errors, 1);

    let decay = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(decay.flash, Some(FlashStep::Decay(par1)));
    assert_eq!(decay.transport_errors, 1);
    assert_eq!(runtime.fixture_color("par1").unwrap().r, 245.0);
}

#[test]
fn reset_blacks_out_and_homes_a_moving_head() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        api.set_port("loopback")?;
        api.use_model("head")?;
        api.declare_fixture("spot1", Some(1))?;
        Ok(())
    }
    let mut host = RecordingHost::new(rig);
    let (mut runtime, frames) = started(ShowConfig::default(), &mut host);

    runtime.set_rgbw("spot1", 9, 9, 9, 9).unwrap();
    runtime.reset_fixture("spot1").unwrap();

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[1], vec![10, 1, 4, 0, 0, 1, 0, 2, 0, 3, 0]);
    assert_eq!(frames[2], vec![4, 1, 1, 4, 0]);
    assert_eq!(frames[3], vec![4, 1, 1, 5, 0]);
    assert_eq!(runtime.fixture_color("spot1").unwrap(), Color::BLACK);
}

#[test]
fn beats_follow_playback_position() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.set_sound("track.ogg", Some(120.0), None)
    }
    let mut host = RecordingHost::new(rig);
    let (mut runtime, _frames) = started(ShowConfig::default(), &mut host);
    let mut playback = ManualPlayback::new();
    playback.start().unwrap();

    for position in [0.0, 499.0, 500.0, 999.0, 1000.0, 2600.0] {
        playback.set_position(position);
        runtime
            .tick(&mut host, Some(&mut playback as &mut dyn PlaybackSource), 16.0)
            .unwrap();
    }
    assert_eq!(host.beats, vec![1, 2, 5]);

    playback.finish();
    let outcome = runtime
        .tick(&mut host, Some(&mut playback as &mut dyn PlaybackSource), 16.0)
        .unwrap();
    assert_eq!(outcome.exit, Some(ExitReason::PlaybackEnded));
}

#[test]
fn timed_functions_fire_once_and_rearm_after_reset() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_function("a", 150.0)?;
        api.schedule_timed_function("b", 300.0)
    }
    let mut host = RecordingHost::new(rig);
    host.reset_on = Some("b");
    let (mut runtime, _frames) = started(ShowConfig::default(), &mut host);

    let mut fired_per_tick = Vec::new();
    for _ in 0..6 {
        let outcome = runtime.tick(&mut host, None, 100.0).unwrap();
        fired_per_tick.push(outcome.fired);
    }

    assert_eq!(
        fired_per_tick,
        vec![
            vec![],
            vec!["a".to_string()],
            vec!["b".to_string()],
            vec![],
            vec![],
            vec!["a".to_string()],
        ]
    );
    assert_eq!(host.fired, vec!["a", "b", "a"]);
    assert_eq!(runtime.elapsed_ms(), 200.0);
}

#[test]
fn completion_policy_waits_one_tick_after_the_last_event() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_function("only", 0.0)
    }
    let config = ShowConfig {
        exit_after_timed_functions: true,
        ..ShowConfig::default()
    };
    let mut host = RecordingHost::new(rig);
    let (mut runtime, _frames) = started(config, &mut host);

    let first = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(first.fired, vec!["only".to_string()]);
    assert_eq!(first.exit, None);

    let second = runtime.tick(&mut host, None, 100.0).unwrap();
    assert_eq!(second.exit, Some(ExitReason::TimedFunctionsComplete));
}

#[test]
fn completion_policy_is_off_by_default() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_function("only", 0.0)
    }
    let mut host = RecordingHost::new(rig);
    let (mut runtime, _frames) = started(ShowConfig::default(), &mut host);

    for _ in 0..3 {
        assert_eq!(runtime.tick(&mut host, None, 100.0).unwrap().exit, None);
    }
}

#[test]
fn requested_exit_runs_exit_callback_and_closes_once() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_function("go", 0.0)
    }
    fn black_out(api: &mut dyn ShowApi) -> Result<()> {
        api.reset_group("all")
    }
    let mut host = RecordingHost::new(rig);
    host.exit_on = Some("go");
    host.on_exit = Some(black_out);
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();
    let transport = LoopbackTransport::new();
    let frames = transport.frames();
    let closed = transport.close_count();

    let report = run_show(
        &mut runtime,
        &mut host,
        None,
        |_| Ok(Box::new(transport) as Box<dyn Transport>),
        ShutdownFlag::new(),
    )
    .unwrap();

    assert_eq!(report.reason, ExitReason::Requested);
    assert_eq!(report.events_fired, 1);
    assert_eq!((host.starts, host.exits), (1, 1));
    assert_eq!(frames.lock().unwrap().len(), 2);
    assert_eq!(*closed.lock().unwrap(), 1);
}

#[test]
fn show_without_work_skips_the_loop() {
    let mut host = RecordingHost::new(par_rig);
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();

    let report = run_show(
        &mut runtime,
        &mut host,
        None,
        |_| Ok(Box::new(LoopbackTransport::new()) as Box<dyn Transport>),
        ShutdownFlag::new(),
    )
    .unwrap();

    assert_eq!(report.reason, ExitReason::NothingToRun);
    assert_eq!(report.ticks, 0);
    assert_eq!((host.starts, host.exits), (1, 1));
}

#[test]
fn raised_shutdown_flag_interrupts_the_loop() {
    let mut host = RecordingHost::new(par_rig);
    host.tick_callback = true;
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();
    let shutdown = ShutdownFlag::new();
    shutdown.request();

    let report = run_show(
        &mut runtime,
        &mut host,
        None,
        |_| Ok(Box::new(LoopbackTransport::new()) as Box<dyn Transport>),
        shutdown,
    )
    .unwrap();

    assert_eq!(report.reason, ExitReason::Interrupted);
    assert_eq!(host.ticks, 0);
    assert_eq!(host.exits, 1);
}

#[test]
fn callback_error_tears_down_without_exit_callback() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_function("bad", 0.0)
    }
    let mut host = RecordingHost::new(rig);
    host.fail_on = Some("bad");
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();
    let transport = LoopbackTransport::new();
    let closed = transport.close_count();

    let err = run_show(
        &mut runtime,
        &mut host,
        None,
        |_| Ok(Box::new(transport) as Box<dyn Transport>),
        ShutdownFlag::new(),
    )
    .unwrap_err();

    assert!(matches!(err, ShowError::Script(ScriptError::Failed { .. })));
    assert_eq!(host.exits, 0);
    assert_eq!(*closed.lock().unwrap(), 1);
}

#[test]
fn show_without_port_fails_setup() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        api.use_model("par")?;
        api.declare_fixture("par1", None)?;
        Ok(())
    }
    let mut host = RecordingHost::new(rig);
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();

    let err = run_show(
        &mut runtime,
        &mut host,
        None,
        |_| Ok(Box::new(LoopbackTransport::new()) as Box<dyn Transport>),
        ShutdownFlag::new(),
    )
    .unwrap_err();

    assert!(matches!(err, ShowError::Setup(SetupError::NoPort)));
    assert_eq!(host.starts, 0);
}

#[test]
fn unknown_flash_target_fails_before_the_port_opens() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.schedule_timed_flash("ghost", 0.0, 1.0, Color::rgbw(255.0, 0.0, 0.0, 0.0))
    }
    let mut host = RecordingHost::new(rig);
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();
    let mut opened = false;

    let err = run_show(
        &mut runtime,
        &mut host,
        None,
        |_| {
            opened = true;
            Ok(Box::new(LoopbackTransport::new()) as Box<dyn Transport>)
        },
        ShutdownFlag::new(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ShowError::Setup(SetupError::UnknownFlashTarget(ref name)) if name == "ghost"
    ));
    assert!(!opened);
    assert_eq!(host.starts, 0);
}

#[test]
fn group_with_unknown_member_fails_setup() {
    fn rig(api: &mut dyn ShowApi) -> Result<()> {
        par_rig(api)?;
        api.declare_group("broken", &["par1", "ghost"])?;
        Ok(())
    }
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();
    let err = rig(&mut runtime).unwrap_err();

    assert!(matches!(
        err,
        ShowError::Setup(SetupError::UnknownFixture { index: 2, .. })
    ));
}

const CUE_SHEET: &str = r#"{
    "port": "loopback",
    "rigs": [
        { "model": "par", "channel_mode": 4, "fixtures": [{ "name": "par1" }, { "name": "par2" }] }
    ],
    "groups": [{ "name": "all", "fixtures": ["par1", "par2"] }],
    "timed": [{ "event": "drop", "at_ms": 0 }],
    "on_start": [{ "action": "rgbw", "fixture": "par1", "color": [1, 2, 3, 4] }],
    "events": {
        "drop": [
            { "action": "group_reset", "group": "all" },
            { "action": "exit" }
        ]
    }
}"#;

#[test]
fn cue_sheet_drives_a_complete_show() {
    let mut host = CueSheetHost::new(CueSheet::from_json_str(CUE_SHEET).unwrap());
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();
    let transport = LoopbackTransport::new();
    let frames = transport.frames();

    let report = run_show(
        &mut runtime,
        &mut host,
        None,
        |port| {
            assert_eq!(port, "loopback");
            Ok(Box::new(transport) as Box<dyn Transport>)
        },
        ShutdownFlag::new(),
    )
    .unwrap();

    assert_eq!(report.reason, ExitReason::Requested);
    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], vec![10, 1, 4, 0, 1, 1, 2, 2, 3, 3, 4]);
    assert_eq!(runtime.fixture_color("par1").unwrap(), Color::BLACK);
    assert_eq!(runtime.registry().fixture(runtime.fixture_id("par2").unwrap()).address, 4);
}

#[test]
fn cue_sheet_event_without_actions_is_a_missing_callback() {
    let json = r#"{
        "port": "loopback",
        "rigs": [{ "model": "par", "fixtures": [{ "name": "par1" }] }],
        "timed": [{ "event": "ghost", "at_ms": 0 }]
    }"#;
    let mut host = CueSheetHost::new(CueSheet::from_json_str(json).unwrap());
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();

    let err = run_show(
        &mut runtime,
        &mut host,
        None,
        |_| Ok(Box::new(LoopbackTransport::new()) as Box<dyn Transport>),
        ShutdownFlag::new(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ShowError::Script(ScriptError::MissingCallback { .. })
    ));
}

#[test]
fn failed_cue_action_is_logged_and_the_show_continues() {
    let json = r#"{
        "port": "loopback",
        "rigs": [{ "model": "par", "fixtures": [{ "name": "par1" }] }],
        "timed": [
            { "event": "go", "at_ms": 0 },
            { "event": "done", "at_ms": 50 }
        ],
        "events": {
            "go": [
                { "action": "rgbw", "fixture": "par1", "color": [255, 0, 0, 0] },
                { "action": "rgbw", "fixture": "nobody", "color": [255, 0, 0, 0] }
            ],
            "done": [{ "action": "exit" }]
        }
    }"#;
    let mut host = CueSheetHost::new(CueSheet::from_json_str(json).unwrap());
    let mut runtime = ShowRuntime::with_models(fast_config(), models()).unwrap();
    let transport = LoopbackTransport::failing();
    let closed = transport.close_count();

    let report = run_show(
        &mut runtime,
        &mut host,
        None,
        |_| Ok(Box::new(transport) as Box<dyn Transport>),
        ShutdownFlag::new(),
    )
    .unwrap();

    assert_eq!(report.reason, ExitReason::Requested);
    assert_eq!(report.events_fired, 2);
    assert_eq!(runtime.fixture_color("par1").unwrap(), Color::BLACK);
    assert_eq!(*closed.lock().unwrap(), 1);
}
