//! End-to-end scenarios: configuration file to composed frames.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use nalgebra::Vector3;

use bard::calibration::{CalibrationStore, read_rigid_transform, read_values};
use bard::config::{self, GroupId, ModelId, ResolveOptions, RigidBodyId, VideoSource};
use bard::geometry::SE3;
use bard::interaction::pointer_writer::{MATRIX_DIR, TIP_DIR};
use bard::interaction::{GroupVisibility, Pedal, RawInput, VisibilityState};
use bard::overlay::{LoggingCompositor, SyntheticFrameSource, VideoFrame};
use bard::registration::{RegistrationEngine, RegistrationStatus};
use bard::system::BardSystem;
use bard::tracking::{BodyObservation, FeedSender, TrackedPose, feed_channel};

fn write_config(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("config.json5");
    fs::write(&path, text).unwrap();
    path
}

fn frame(index: u64) -> VideoFrame {
    VideoFrame {
        index,
        timestamp_ns: index * 33_000_000,
        width: 4,
        height: 4,
        pixels: Arc::new(vec![0; 48]),
    }
}

fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

fn observe(name: &str, pose: SE3, ts: u64, valid: bool) -> BodyObservation {
    BodyObservation {
        name: name.to_string(),
        pose,
        timestamp_ns: ts,
        valid,
    }
}

/// Feed-backed system built from a JSON5 file in `dir`.
fn feed_system(dir: &Path, text: &str) -> (BardSystem, FeedSender) {
    let path = write_config(dir, text);
    let config = config::load(&path, &ResolveOptions::default()).unwrap();
    let calibration = CalibrationStore::load(&config, dir).unwrap();
    let (feed, backend) = feed_channel(8);
    (BardSystem::new(config, calibration, Box::new(backend)), feed)
}

const TRACKED_SCENE: &str = r#"{
    // ndi without a calibration directory: tracker and camera frames coincide
    tracker: {
        type: 'sksnditracker',
        rigid_bodies: [{ name: 'reference' }, { name: 'pointer' }],
    },
    models: [
        {
            name: 'liver',
            'port handle': 'reference',
            reference_to_model: [1, 0, 0, 5,  0, 1, 0, 0,  0, 0, 1, 0,  0, 0, 0, 1],
            visible_anatomy: 1,
        },
        { name: 'tumour', visible_anatomy: 2, target: true },
    ],
    pointer: { 'port handle': 'pointer', pointer_tag_to_tip: [0, 0, -100] },
    interaction: { keyboard: true, footswitch: true, 'maximum delay': 2.0 },
}"#;

#[test]
fn test_occluded_reference_goes_stale_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let (mut system, feed) = feed_system(dir.path(), TRACKED_SCENE);
    let shared = Arc::clone(system.shared_state());
    let mut compositor = LoggingCompositor::default();

    let tracker_t_reference = SE3::from_translation(Vector3::new(0.0, 0.0, 500.0));
    feed.send(vec![observe("reference", tracker_t_reference, 1, true)]).unwrap();
    wait_for("reference pose", || {
        shared.poses.latest(RigidBodyId(0)).is_some_and(|p| p.valid)
    });

    let first = system.process_frame(&frame(0), &mut compositor).unwrap();
    let liver = first.model(ModelId(0)).unwrap();
    assert_eq!(liver.status, RegistrationStatus::Current);
    let registered = liver.transform.unwrap();
    assert_relative_eq!(registered.translation, Vector3::new(5.0, 0.0, 500.0), epsilon = 1e-9);

    feed.send(vec![observe("reference", SE3::identity(), 2, false)]).unwrap();
    wait_for("reference occlusion", || {
        shared.poses.latest(RigidBodyId(0)).is_some_and(|p| !p.valid)
    });

    for i in 1..=10 {
        let snapshot = system.process_frame(&frame(i), &mut compositor).unwrap();
        let liver = snapshot.model(ModelId(0)).unwrap();
        assert_eq!(liver.status, RegistrationStatus::Stale);
        assert!(liver.transform.unwrap().approx_eq(&registered, 1e-12));
    }

    let moved = SE3::from_translation(Vector3::new(0.0, 10.0, 500.0));
    feed.send(vec![observe("reference", moved, 3, true)]).unwrap();
    wait_for("reference reacquired", || {
        shared.poses.latest(RigidBodyId(0)).is_some_and(|p| p.valid)
    });
    let recovered = system.process_frame(&frame(11), &mut compositor).unwrap();
    let liver = recovered.model(ModelId(0)).unwrap();
    assert_eq!(liver.status, RegistrationStatus::Current);
    assert_relative_eq!(
        liver.transform.unwrap().translation,
        Vector3::new(5.0, 10.0, 500.0),
        epsilon = 1e-9
    );

    assert_eq!(compositor.frames(), 12);
    system.shutdown();
}

#[test]
fn test_detector_reporting_no_markers_makes_model_stale() {
    let dir = tempfile::tempdir().unwrap();
    let (mut system, feed) = feed_system(dir.path(), TRACKED_SCENE);
    let shared = Arc::clone(system.shared_state());
    let mut compositor = LoggingCompositor::default();

    let tracker_t_reference = SE3::from_translation(Vector3::new(0.0, 0.0, 500.0));
    feed.send(vec![observe("reference", tracker_t_reference, 1, true)]).unwrap();
    wait_for("reference pose", || {
        shared.poses.latest(RigidBodyId(0)).is_some_and(|p| p.valid)
    });
    let first = system.process_frame(&frame(0), &mut compositor).unwrap();
    assert_eq!(first.model(ModelId(0)).unwrap().status, RegistrationStatus::Current);

    // Every marker occluded: the detector sends a frame with no observations.
    feed.send(Vec::new()).unwrap();
    wait_for("reference occlusion", || {
        shared.poses.latest(RigidBodyId(0)).is_some_and(|p| !p.valid)
    });
    let occluded = system.process_frame(&frame(1), &mut compositor).unwrap();
    let liver = occluded.model(ModelId(0)).unwrap();
    assert_eq!(liver.status, RegistrationStatus::Stale);
    assert!(liver.transform.is_some());
    system.shutdown();
}

#[test]
fn test_footswitch_debounce_through_system() {
    let dir = tempfile::tempdir().unwrap();
    let (mut system, _feed) = feed_system(dir.path(), TRACKED_SCENE);
    let shared = Arc::clone(system.shared_state());
    const SECOND: u64 = 1_000_000_000;

    assert_eq!(system.bindings().primary_group(), GroupId(1));
    assert!(system.submit(RawInput::Pedal(Pedal::Left), 10 * SECOND));
    assert!(system.submit(RawInput::Pedal(Pedal::Left), 10 * SECOND + SECOND / 2));
    // Events are applied in order, so once this keyboard toggle lands both
    // pedal presses have been handled.
    assert!(system.submit(RawInput::Key('2'), 10 * SECOND + SECOND / 2));
    wait_for("keyboard toggle", || {
        shared.visibility.read().group(GroupId(2)) == Some(GroupVisibility::Hidden)
    });
    assert_eq!(
        shared.visibility.read().group(GroupId(1)),
        Some(GroupVisibility::Hidden),
        "second press within the delay must be dropped"
    );

    assert!(system.submit(RawInput::Pedal(Pedal::Left), 13 * SECOND));
    wait_for("second toggle", || {
        shared.visibility.read().group(GroupId(1)) == Some(GroupVisibility::Visible)
    });
    system.shutdown();
}

#[test]
fn test_nudge_key_moves_registered_model() {
    let dir = tempfile::tempdir().unwrap();
    let (mut system, feed) = feed_system(dir.path(), TRACKED_SCENE);
    let shared = Arc::clone(system.shared_state());
    let mut compositor = LoggingCompositor::default();

    let tracker_t_reference = SE3::from_translation(Vector3::new(0.0, 0.0, 500.0));
    feed.send(vec![observe("reference", tracker_t_reference, 1, true)]).unwrap();
    wait_for("reference pose", || {
        shared.poses.latest(RigidBodyId(0)).is_some_and(|p| p.valid)
    });

    // `7` moves the models +1 mm along z of the reference frame.
    assert!(system.submit(RawInput::Key('7'), 1));
    wait_for("nudge applied", || shared.visibility.read().model_offset().translation.z == 1.0);

    let snapshot = system.process_frame(&frame(0), &mut compositor).unwrap();
    let liver = snapshot.model(ModelId(0)).unwrap();
    assert_eq!(liver.status, RegistrationStatus::Current);
    assert_relative_eq!(
        liver.transform.unwrap().translation,
        Vector3::new(5.0, 0.0, 501.0),
        epsilon = 1e-9
    );
    system.shutdown();
}

#[test]
fn test_pointer_write_on_keypress() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let text = TRACKED_SCENE.replace(
        "pointer_tag_to_tip: [0, 0, -100] }",
        &format!("pointer_tag_to_tip: [0, 0, -100], 'output directory': '{}' }}", out.display()),
    );
    let (mut system, feed) = feed_system(dir.path(), &text);
    let shared = Arc::clone(system.shared_state());
    let mut compositor = LoggingCompositor::default();

    let tracker_t_reference = SE3::from_translation(Vector3::new(0.0, 0.0, 500.0));
    let tracker_t_pointer = SE3::from_translation(Vector3::new(20.0, 0.0, 500.0));
    feed.send(vec![
        observe("reference", tracker_t_reference, 1, true),
        observe("pointer", tracker_t_pointer, 1, true),
    ])
    .unwrap();
    wait_for("both bodies", || shared.poses.snapshot().iter().all(|p| p.valid));

    assert!(system.submit(RawInput::Key('d'), 1));
    wait_for("write request", || shared.visibility.read().pointer_write_requests() == 1);

    let snapshot = system.process_frame(&frame(0), &mut compositor).unwrap();
    assert_eq!(snapshot.pointer.as_ref().unwrap().status, RegistrationStatus::Current);

    let matrices: Vec<_> = fs::read_dir(out.join(MATRIX_DIR)).unwrap().collect();
    let tips: Vec<_> = fs::read_dir(out.join(TIP_DIR)).unwrap().collect();
    assert_eq!(matrices.len(), 1);
    assert_eq!(tips.len(), 1);

    let matrix = read_rigid_transform(&matrices[0].as_ref().unwrap().path()).unwrap();
    assert_relative_eq!(matrix.translation, Vector3::new(20.0, 0.0, 0.0), epsilon = 1e-9);
    let tip = read_values(&tips[0].as_ref().unwrap().path()).unwrap();
    assert_eq!(tip.len(), 3);
    assert_relative_eq!(
        Vector3::from_column_slice(&tip),
        Vector3::new(20.0, 0.0, -100.0),
        epsilon = 1e-9
    );

    // The request is serviced once.
    system.process_frame(&frame(1), &mut compositor).unwrap();
    assert_eq!(fs::read_dir(out.join(MATRIX_DIR)).unwrap().count(), 1);
    system.shutdown();
}

#[test]
fn test_replay_end_stops_frame_loop() {
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("poses.csv");
    fs::write(
        &recording,
        "\
0,reference,0,0,500,1,0,0,0
1000000,reference,0,0,501,1,0,0,0
2000000,reference,0,0,502,1,0,0,0
",
    )
    .unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            tracker: {
                type: 'replay',
                filename: 'poses.csv',
                rigid_bodies: [{ name: 'reference' }],
            },
            models: [{ name: 'liver' }],
        }"#,
    );
    let config = config::load(&path, &ResolveOptions::default()).unwrap();
    let mut system = BardSystem::from_config(config, dir.path(), None).unwrap();
    assert!(system.tracker_feed().is_none());

    let mut source = SyntheticFrameSource::new(4, 4, 1000.0).with_limit(100_000);
    let mut compositor = LoggingCompositor::default();
    let composed = system.run(&mut source, &mut compositor, None).unwrap();

    assert!(system.shared_state().is_tracker_exhausted());
    assert!(composed < 100_000);
    assert_eq!(compositor.frames(), composed);
    system.shutdown();
}

#[test]
fn test_frame_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (mut system, _feed) = feed_system(dir.path(), "{}");
    let mut source = SyntheticFrameSource::new(2, 2, 0.0);
    let mut compositor = LoggingCompositor::default();
    assert_eq!(system.run(&mut source, &mut compositor, Some(5)).unwrap(), 5);
    system.shutdown();
}

#[test]
fn test_command_line_calibration_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            camera: { source: 1, 'calibration directory': 'from_file' },
            tracker: { type: 'aruco', 'calibration directory': 'tracker_dir' },
        }"#,
    );
    let options = ResolveOptions {
        calibration_dir_override: Some(PathBuf::from("from_command_line")),
    };
    let config = config::load(&path, &options).unwrap();
    assert_eq!(config.camera.calibration_dir, Some(PathBuf::from("from_command_line")));
    assert_eq!(config.tracker.source, VideoSource::Device(1));
    assert_eq!(config.tracker.calibration_dir, Some(PathBuf::from("from_command_line")));
}

#[test]
fn test_missing_calibration_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            tracker: { rigid_bodies: [{ name: 'reference' }] },
            models: [{ name: 'liver', reference_to_model: 'missing.txt' }],
        }"#,
    );
    let config = config::load(&path, &ResolveOptions::default()).unwrap();
    assert!(BardSystem::from_config(config, dir.path(), None).is_err());
}

#[test]
fn test_port_handle_with_identity_offset() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            tracker: { rigid_bodies: [{ name: 'reference' }] },
            models: [{ name: 'liver', 'port handle': 'reference' }],
        }"#,
    );
    let config = config::load(&path, &ResolveOptions::default()).unwrap();
    let calibration = CalibrationStore::load(&config, dir.path()).unwrap();
    let mut engine = RegistrationEngine::new(&config, &calibration);
    let visibility = VisibilityState::from_config(&config);

    let poses = [TrackedPose {
        rigid_body: RigidBodyId(0),
        pose: SE3::from_translation(Vector3::new(1.0, 0.0, 0.0)),
        timestamp_ns: 0,
        valid: true,
    }];
    let snapshot = engine.register(&poses, &visibility, 0);
    let liver = snapshot.model(ModelId(0)).unwrap();
    assert_eq!(liver.status, RegistrationStatus::Current);
    let expected = SE3::from_translation(Vector3::new(1.0, 0.0, 0.0));
    assert!(liver.transform.unwrap().approx_eq(&expected, 1e-12));
}
