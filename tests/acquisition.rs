//! Whole sessions against the simulated SDK

use std::sync::{Arc, Mutex};

use camgrab::capture::FrameMeta;
use camgrab::display::preview::{compose, HISTOGRAM_HEIGHT};
use camgrab::display::{FileSink, FrameSink};
use camgrab::input::ScriptedInput;
use camgrab::pipeline::run_session;
use camgrab::process::Processed;
use camgrab::sdk::sim::{SimDevice, SimFaults, SimulatedSdk};
use camgrab::sdk::{SdkError, TransportKind};
use camgrab::{Config, Error, PixelFormat, Profile};

fn quiet(profile: Profile, max_frames: u64) -> Config {
    let mut config = Config::default();
    config.capture.profile = profile;
    config.stream.max_frames = Some(max_frames);
    config.stream.stop_on_key = false;
    config.display.print_statistics = false;
    config
}

fn two_cameras() -> SimulatedSdk {
    SimulatedSdk::new(vec![
        SimDevice::mono(0, TransportKind::Network),
        SimDevice::mono(1, TransportKind::Bus),
    ])
}

/// Keeps what every sink call saw.
#[derive(Clone, Default)]
struct Recorder {
    frames: Arc<Mutex<Vec<(FrameMeta, Processed)>>>,
    fail: bool,
}

impl FrameSink for Recorder {
    fn frame(&mut self, meta: &FrameMeta, processed: &Processed) -> camgrab::Result<()> {
        self.frames.lock().unwrap().push((meta.clone(), processed.clone()));
        if self.fail {
            return Err(Error::Display("window went away".into()));
        }
        Ok(())
    }
}

#[test]
fn select_second_camera_and_grab_once() {
    let mut sdk = two_cameras();
    let mut input = ScriptedInput::new(["1"]);
    let recorder = Recorder::default();

    let summary = run_session(
        &mut sdk,
        &mut input,
        &quiet(Profile::Mono, 1),
        None,
        vec![Box::new(recorder.clone())],
        None,
    )
    .unwrap();

    assert_eq!(summary.frames_processed, 1);
    let log = sdk.log();
    assert_eq!(log.connects, 1);
    assert_eq!(log.disconnects, 1);
    assert_eq!(log.grabs, 1);
    assert_eq!(log.freezes, 1);
    let stream = log.stream.unwrap();
    assert_eq!(stream.buffer_count, 100);
    assert_eq!(stream.transport, TransportKind::Bus);
    assert!(log.feature_writes.iter().all(|(name, _)| name != "DoubleRate_Enable"));
    assert_eq!((log.delivered, log.released), (1, 1));

    let frames = recorder.frames.lock().unwrap();
    let (meta, processed) = &frames[0];
    assert_eq!((meta.width, meta.height), (1024, 1024));
    assert_eq!(processed.image.format, PixelFormat::Mono8);
}

#[test]
fn out_of_range_selection_never_connects() {
    let mut sdk = two_cameras();
    let err = run_session(
        &mut sdk,
        &mut ScriptedInput::new(["2"]),
        &quiet(Profile::Mono, 1),
        None,
        Vec::new(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Selection(_)));
    assert_eq!(sdk.log().connects, 0);
}

#[test]
fn color_double_rate_saves_bgr_frames() {
    let dir = tempfile::tempdir().unwrap();
    let device = SimDevice::color(0, TransportKind::Network).with_scene([200, 120, 40]);
    let mut sdk = SimulatedSdk::new(vec![device]);
    let recorder = Recorder::default();
    let files = FileSink::new(dir.path(), "DR", 1).unwrap();

    let summary = run_session(
        &mut sdk,
        &mut ScriptedInput::default(),
        &quiet(Profile::ColorDoubleRate, 2),
        Some(0),
        vec![Box::new(recorder.clone()), Box::new(files)],
        None,
    )
    .unwrap();
    assert_eq!(summary.frames_processed, 2);

    let frames = recorder.frames.lock().unwrap();
    let (_, processed) = &frames[1];
    assert_eq!(processed.image.format, PixelFormat::Bgr8);
    assert_eq!(processed.image.width, 600);
    assert_eq!(processed.image.height, 450);
    assert!(processed.image.data.chunks_exact(3).all(|px| px == [40, 120, 200]));
    assert!(processed.adjusted.is_some());

    let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(saved.len(), 2);
    let path = saved[0].as_ref().unwrap().path();
    let rgb = image::open(path).unwrap().to_rgb8();
    assert_eq!(rgb.get_pixel(10, 10).0, [200, 120, 40]);
}

#[test]
fn double_rate_profile_rejects_plain_camera() {
    let device = SimDevice::mono(0, TransportKind::Network);
    let mut sdk = SimulatedSdk::new(vec![device]);
    let err = run_session(
        &mut sdk,
        &mut ScriptedInput::default(),
        &quiet(Profile::MonoDoubleRate, 1),
        Some(0),
        Vec::new(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Capability(_)));
    assert!(sdk.log().stream.is_none());
}

#[test]
fn mono_double_rate_equalizes() {
    let device = SimDevice::mono(0, TransportKind::Bus).with_double_rate(true);
    let mut sdk = SimulatedSdk::new(vec![device]);
    let recorder = Recorder::default();
    run_session(
        &mut sdk,
        &mut ScriptedInput::default(),
        &quiet(Profile::MonoDoubleRate, 1),
        Some(0),
        vec![Box::new(recorder.clone())],
        None,
    )
    .unwrap();

    let frames = recorder.frames.lock().unwrap();
    let (_, processed) = &frames[0];
    assert_eq!(processed.image.width, 600);
    let adjusted = processed.adjusted.as_ref().unwrap();
    assert_eq!(adjusted.format, PixelFormat::Mono8);
    assert_eq!(*adjusted.data.iter().max().unwrap(), 255);
}

#[test]
fn failing_sink_still_releases_frame() {
    let mut sdk = two_cameras();
    let recorder = Recorder {
        fail: true,
        ..Default::default()
    };
    let err = run_session(
        &mut sdk,
        &mut ScriptedInput::default(),
        &quiet(Profile::Mono, 5),
        Some(0),
        vec![Box::new(recorder)],
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Display(_)));
    let log = sdk.log();
    assert_eq!((log.delivered, log.released), (1, 1));
}

#[test]
fn connect_failure_is_fatal() {
    let mut sdk = two_cameras().with_faults(SimFaults {
        connect: true,
        ..Default::default()
    });
    let err = run_session(
        &mut sdk,
        &mut ScriptedInput::default(),
        &quiet(Profile::Mono, 1),
        Some(0),
        Vec::new(),
        None,
    )
    .unwrap_err();
    match err {
        Error::Connection(SdkError { code, .. }) => assert_eq!(code, SdkError::TRANSPORT),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn stream_failure_is_fatal() {
    let mut sdk = two_cameras().with_faults(SimFaults {
        open_stream: true,
        ..Default::default()
    });
    let err = run_session(
        &mut sdk,
        &mut ScriptedInput::default(),
        &quiet(Profile::Mono, 1),
        Some(0),
        Vec::new(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Stream(_)));
    assert_eq!(sdk.log().grabs, 0);
}

#[test]
fn disconnect_failure_is_reported() {
    let mut sdk = two_cameras().with_faults(SimFaults {
        disconnect: true,
        ..Default::default()
    });
    let err = run_session(
        &mut sdk,
        &mut ScriptedInput::default(),
        &quiet(Profile::Mono, 1),
        Some(0),
        Vec::new(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Disconnect(_)));
    assert_eq!(sdk.log().freezes, 1);
}

#[test]
fn error_callback_does_not_stop_acquisition() {
    let mut sdk = two_cameras().with_faults(SimFaults {
        comm_error_on_grab: true,
        ..Default::default()
    });
    let summary = run_session(
        &mut sdk,
        &mut ScriptedInput::default(),
        &quiet(Profile::Mono, 3),
        Some(0),
        Vec::new(),
        None,
    )
    .unwrap();
    assert_eq!(summary.frames_processed, 3);
}

#[test]
fn single_shot_writes_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quiet(Profile::SingleShot, 50);
    config.display.save_dir = Some(dir.path().to_path_buf());
    let sinks = camgrab::display::build_sinks(&config).unwrap();

    let mut sdk = two_cameras();
    let summary = run_session(&mut sdk, &mut ScriptedInput::default(), &config, Some(1), sinks, None).unwrap();

    assert_eq!(summary.attempts, 1);
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("MV1_"));
}

#[test]
fn settings_saved_by_one_session_configure_the_next() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updatedConfigurationFile.toml");

    let mut config = quiet(Profile::Mono, 1);
    config.capture.exposure_us = Some(2500.0);
    config.capture.software_trigger = true;
    config.capture.save_settings = Some(path.clone());
    let mut sdk = two_cameras();
    run_session(&mut sdk, &mut ScriptedInput::default(), &config, Some(0), Vec::new(), None).unwrap();
    assert_eq!(sdk.log().triggers, 1);

    let mut config = quiet(Profile::Mono, 2);
    config.capture.load_settings = Some(path);
    let mut sdk = two_cameras();
    let summary = run_session(&mut sdk, &mut ScriptedInput::default(), &config, Some(0), Vec::new(), None).unwrap();

    // The file re-arms the software trigger, so every frame is triggered.
    assert_eq!(summary.frames_processed, 2);
    let log = sdk.log();
    assert_eq!(log.triggers, 2);
    assert!(log
        .feature_writes
        .contains(&("ExposureTime".to_string(), "2500".to_string())));
}

#[test]
fn preview_shows_captured_and_adjusted_frames() {
    let device = SimDevice::color(0, TransportKind::Network).with_scene([200, 120, 40]);
    let mut sdk = SimulatedSdk::new(vec![device]);
    let recorder = Recorder::default();
    run_session(
        &mut sdk,
        &mut ScriptedInput::default(),
        &quiet(Profile::ColorDoubleRate, 1),
        Some(0),
        vec![Box::new(recorder.clone())],
        None,
    )
    .unwrap();

    let frames = recorder.frames.lock().unwrap();
    let canvas = compose(&frames[0].1).unwrap();
    assert_eq!(canvas.format, PixelFormat::Rgb8);
    assert_eq!((canvas.width, canvas.height), (1200, 450 + HISTOGRAM_HEIGHT));
    let at = |x: u32, y: u32| {
        let i = (y * canvas.width + x) as usize * 3;
        [canvas.data[i], canvas.data[i + 1], canvas.data[i + 2]]
    };
    assert_eq!(at(10, 10), [200, 120, 40]);
    // Gamma 2 brightens the right-hand copy.
    assert!(at(610, 10)[2] > 40);
}

#[test]
fn demodulate_command_restores_saved_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (input, output) = (dir.path().join("image_0_mod.png"), dir.path().join("image_0_demod.png"));
    let original = camgrab::Image::from_raw(8, 2, PixelFormat::Mono8, (0..16).collect()).unwrap();
    let encoded = camgrab::process::demodulate::modulate(&original, false).unwrap();
    camgrab::process::convert::to_dynamic(&encoded).unwrap().save(&input).unwrap();

    camgrab::process::offline::demodulate_file(&input, &output, false, None).unwrap();
    assert_eq!(image::open(&output).unwrap().into_luma8().into_raw(), original.data);
}
