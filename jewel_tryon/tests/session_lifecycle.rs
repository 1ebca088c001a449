// Session state machine driven by in-memory devices.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::{Rgb, Rgba, RgbaImage};
use jewel_tryon::core_modules::landmarks::face_mesh;
use jewel_tryon::{
    Capture, CaptureSource, Command, Detection, Error, Frame, FrameSink, LandmarkDetector, LandmarkSet,
    Point2D, Product, Report, Result, Session, SessionState, StepOutcome, TryOnConfig,
};

struct Workspace {
    root: PathBuf,
}

impl Workspace {
    fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!("jewel_tryon_session_{}_{name}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("assets")).expect("assets dir");
        RgbaImage::from_pixel(40, 20, Rgba([255, 215, 0, 255]))
            .save(root.join("assets").join("necklace.png"))
            .expect("write asset");
        Self { root }
    }

    fn config(&self) -> TryOnConfig {
        TryOnConfig {
            assets_dir: self.root.join("assets"),
            snapshot_dir: self.root.join("snapshots"),
            ..TryOnConfig::default()
        }
    }

    fn snapshots(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.root.join("snapshots")) {
            Ok(entries) => entries.map(|e| e.expect("dir entry").path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn necklace(image_path: Option<&str>) -> Product {
    Product {
        id: 1,
        name: "Elegant Pearl Necklace".into(),
        category: "Necklace".into(),
        image_path: image_path.map(PathBuf::from),
    }
}

fn captured_frame() -> Frame {
    Frame::from_fn(640, 480, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 50]))
}

struct FakeCamera {
    reads: VecDeque<Result<Capture>>,
    released: Rc<Cell<bool>>,
}

impl FakeCamera {
    fn with_frames(count: usize, released: &Rc<Cell<bool>>) -> Self {
        Self {
            reads: (0..count).map(|_| Ok(Capture::Frame(captured_frame()))).collect(),
            released: Rc::clone(released),
        }
    }
}

impl CaptureSource for FakeCamera {
    fn next_frame(&mut self) -> Result<Capture> {
        self.reads.pop_front().unwrap_or(Ok(Capture::Closed))
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.released.set(true);
    }
}

struct FakeDetector {
    face: bool,
    released: Rc<Cell<bool>>,
}

impl LandmarkDetector for FakeDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Detection> {
        if !self.face {
            return Ok(Detection::NoFace);
        }
        let mut points = vec![Point2D::new(0.5, 0.5); face_mesh::NUM_LANDMARKS];
        points[face_mesh::CHIN] = Point2D::new(0.5, 0.625);
        points[face_mesh::FOREHEAD] = Point2D::new(0.5, 0.2);
        points[face_mesh::LEFT_EAR_LOBE] = Point2D::new(0.34375, 0.5);
        points[face_mesh::RIGHT_EAR_LOBE] = Point2D::new(0.65625, 0.5);
        Ok(Detection::Face(LandmarkSet::new(points)))
    }
}

impl Drop for FakeDetector {
    fn drop(&mut self) {
        self.released.set(true);
    }
}

#[derive(Default)]
struct ScriptedWindow {
    shown: Vec<Frame>,
    commands: VecDeque<Option<Command>>,
    broken: bool,
    /// Frames still to be rejected with a non-fatal error before showing works.
    glitches: usize,
}

impl ScriptedWindow {
    fn with_commands(commands: impl IntoIterator<Item = Option<Command>>) -> Self {
        Self {
            commands: commands.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl FrameSink for ScriptedWindow {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        if self.broken {
            return Err(Error::Display("window went away".into()));
        }
        if self.glitches > 0 {
            self.glitches -= 1;
            return Err(Error::Detection("frame dropped".into()));
        }
        self.shown.push(frame.clone());
        Ok(())
    }

    fn poll_command(&mut self) -> Result<Option<Command>> {
        Ok(self.commands.pop_front().flatten())
    }
}

struct Flags {
    camera_released: Rc<Cell<bool>>,
    detector_released: Rc<Cell<bool>>,
}

impl Flags {
    fn new() -> Self {
        Self {
            camera_released: Rc::new(Cell::new(false)),
            detector_released: Rc::new(Cell::new(false)),
        }
    }

    fn camera(&self, frames: usize) -> FakeCamera {
        FakeCamera::with_frames(frames, &self.camera_released)
    }

    fn detector(&self, face: bool) -> FakeDetector {
        FakeDetector {
            face,
            released: Rc::clone(&self.detector_released),
        }
    }
}

fn started(ws: &Workspace, flags: &Flags, frames: usize, face: bool) -> Session<FakeCamera, FakeDetector> {
    let mut session = Session::new(&ws.config());
    session
        .start(&necklace(Some("necklace.png")), || Ok(flags.camera(frames)), || Ok(flags.detector(face)))
        .expect("session starts");
    session
}

#[test]
fn missing_asset_aborts_before_touching_the_camera() {
    let ws = Workspace::new("missing_asset");
    let mut session: Session<FakeCamera, FakeDetector> = Session::new(&ws.config());
    let camera_opened = Cell::new(false);
    let detector_opened = Cell::new(false);

    let err = session
        .start(
            &necklace(Some("does_not_exist.png")),
            || {
                camera_opened.set(true);
                Err(Error::CaptureUnavailable("should not be opened".into()))
            },
            || {
                detector_opened.set(true);
                Err(Error::DetectorUnavailable("should not be opened".into()))
            },
        )
        .expect_err("asset is missing");

    assert!(matches!(err, Error::AssetNotFound(ref path) if path.ends_with("does_not_exist.png")));
    assert!(err.is_fatal());
    assert!(!camera_opened.get());
    assert!(!detector_opened.get());
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn product_without_image_path_is_rejected() {
    let ws = Workspace::new("no_image_path");
    let flags = Flags::new();
    let mut session = Session::new(&ws.config());

    let err = session
        .start(&necklace(None), || Ok(flags.camera(1)), || Ok(flags.detector(true)))
        .expect_err("no image path");

    assert!(matches!(err, Error::MissingImagePath(_)));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn camera_failure_skips_the_detector() {
    let ws = Workspace::new("camera_failure");
    let mut session: Session<FakeCamera, FakeDetector> = Session::new(&ws.config());
    let detector_opened = Cell::new(false);

    let err = session
        .start(
            &necklace(Some("necklace.png")),
            || Err(Error::CaptureUnavailable("camera 0".into())),
            || {
                detector_opened.set(true);
                Err(Error::DetectorUnavailable("unused".into()))
            },
        )
        .expect_err("no camera");

    assert!(matches!(err, Error::CaptureUnavailable(_)));
    assert!(!detector_opened.get());
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn detector_failure_releases_the_camera() {
    let ws = Workspace::new("detector_failure");
    let flags = Flags::new();
    let mut session: Session<FakeCamera, FakeDetector> = Session::new(&ws.config());

    let err = session
        .start(
            &necklace(Some("necklace.png")),
            || Ok(flags.camera(3)),
            || Err(Error::DetectorUnavailable("model file missing".into())),
        )
        .expect_err("no detector");

    assert!(matches!(err, Error::DetectorUnavailable(_)));
    assert!(flags.camera_released.get());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.asset().is_none());
}

#[test]
fn capture_then_quit_saves_one_snapshot_and_releases_everything() {
    let ws = Workspace::new("capture_then_quit");
    let flags = Flags::new();
    let mut session = started(&ws, &flags, 10, true);
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.asset().map(|a| a.category()), Some("Necklace"));

    let mut window = ScriptedWindow::with_commands([None, Some(Command::Capture), Some(Command::Quit)]);
    session.run(&mut window).expect("run");

    assert_eq!(window.shown.len(), 3);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(flags.camera_released.get());
    assert!(flags.detector_released.get());

    let snapshots = ws.snapshots();
    assert_eq!(snapshots.len(), 1);
    let name = snapshots[0].file_name().and_then(|n| n.to_str()).expect("utf-8 name");
    assert!(name.starts_with("snapshot_") && name.ends_with(".png"), "{name}");
    let saved = image::open(&snapshots[0]).expect("decodable snapshot").to_rgb8();
    assert_eq!(saved, window.shown[1]);
}

#[test]
fn capture_keeps_the_session_running() {
    let ws = Workspace::new("capture_running");
    let flags = Flags::new();
    let mut session = started(&ws, &flags, 10, true);
    let mut window = ScriptedWindow::with_commands([Some(Command::Capture), Some(Command::Capture)]);

    for _ in 0..2 {
        let outcome = session.step(&mut window).expect("step");
        let StepOutcome::Frame { command, snapshot, .. } = outcome else {
            panic!("expected a frame");
        };
        assert_eq!(command, Some(Command::Capture));
        assert!(snapshot.as_deref().is_some_and(Path::is_file));
        assert_eq!(session.state(), SessionState::Running);
    }
    assert_eq!(ws.snapshots().len(), 2);
    assert!(!flags.camera_released.get());
}

#[test]
fn exhausted_source_closes_the_session() {
    let ws = Workspace::new("exhausted");
    let flags = Flags::new();
    let mut session = started(&ws, &flags, 2, true);
    let mut window = ScriptedWindow::default();

    session.run(&mut window).expect("run");

    assert_eq!(window.shown.len(), 2);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(flags.camera_released.get());
    assert!(ws.snapshots().is_empty());
}

#[test]
fn read_error_closes_the_session() {
    let ws = Workspace::new("read_error");
    let flags = Flags::new();
    let mut camera = flags.camera(1);
    camera.reads.push_back(Err(Error::CaptureUnavailable("usb unplugged".into())));
    let mut session = Session::new(&ws.config());
    session
        .start(&necklace(Some("necklace.png")), move || Ok(camera), || Ok(flags.detector(true)))
        .expect("session starts");
    let mut window = ScriptedWindow::default();

    assert!(matches!(session.step(&mut window), Ok(StepOutcome::Frame { .. })));
    assert_eq!(session.step(&mut window).expect("step"), StepOutcome::Closed);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(flags.camera_released.get());
}

#[test]
fn no_face_frames_are_shown_untouched() {
    let ws = Workspace::new("no_face");
    let flags = Flags::new();
    let mut session = started(&ws, &flags, 1, false);
    let mut window = ScriptedWindow::default();

    let outcome = session.step(&mut window).expect("step");

    assert!(matches!(outcome, StepOutcome::Frame { report: Report::NoFace, .. }));
    assert_eq!(window.shown, vec![captured_frame()]);
}

#[test]
fn face_frames_get_the_necklace() {
    let ws = Workspace::new("face");
    let flags = Flags::new();
    let mut session = started(&ws, &flags, 1, true);
    let mut window = ScriptedWindow::default();

    let outcome = session.step(&mut window).expect("step");

    let StepOutcome::Frame { report: Report::Overlaid(data), .. } = outcome else {
        panic!("expected an overlay");
    };
    assert_eq!(data.anchors.face_width, 200.0);
    assert_eq!((data.placements[0].x, data.placements[0].y), (220, 330));
    assert_eq!(*window.shown[0].get_pixel(320, 350), Rgb([255, 215, 0]));
    assert_eq!(window.shown[0].get_pixel(10, 10), captured_frame().get_pixel(10, 10));
}

#[test]
fn unwritable_snapshot_dir_is_not_fatal() {
    let ws = Workspace::new("unwritable");
    let flags = Flags::new();
    let blocker = ws.root.join("blocked");
    fs::write(&blocker, b"not a directory").expect("blocker file");
    let config = TryOnConfig {
        snapshot_dir: blocker.join("snapshots"),
        ..ws.config()
    };
    let mut session = Session::new(&config);
    session
        .start(&necklace(Some("necklace.png")), || Ok(flags.camera(3)), || Ok(flags.detector(true)))
        .expect("session starts");
    let mut window = ScriptedWindow::with_commands([Some(Command::Capture)]);

    let outcome = session.step(&mut window).expect("snapshot failure is swallowed");

    assert!(matches!(outcome, StepOutcome::Frame { snapshot: None, command: Some(Command::Capture), .. }));
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn display_error_closes_and_propagates() {
    let ws = Workspace::new("display_error");
    let flags = Flags::new();
    let mut session = started(&ws, &flags, 3, true);
    let mut window = ScriptedWindow {
        broken: true,
        ..ScriptedWindow::default()
    };

    assert!(session.run(&mut window).is_err());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(flags.camera_released.get());
    assert!(flags.detector_released.get());
}

#[test]
fn non_fatal_step_error_keeps_the_session_running() {
    let ws = Workspace::new("glitch_step");
    let flags = Flags::new();
    let mut session = started(&ws, &flags, 3, false);
    let mut window = ScriptedWindow {
        glitches: 1,
        ..ScriptedWindow::default()
    };

    let err = session.step(&mut window).unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(session.state(), SessionState::Running);
    assert!(!flags.camera_released.get());

    assert!(session.step(&mut window).is_ok());
    assert_eq!(window.shown.len(), 1);
}

#[test]
fn run_skips_non_fatal_errors_until_quit() {
    let ws = Workspace::new("glitch_run");
    let flags = Flags::new();
    let mut session = started(&ws, &flags, 5, false);
    let mut window = ScriptedWindow {
        glitches: 2,
        commands: [None, Some(Command::Quit)].into_iter().collect(),
        ..ScriptedWindow::default()
    };

    session.run(&mut window).expect("glitches are not fatal");

    assert_eq!(window.shown.len(), 2);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(flags.camera_released.get());
}

#[test]
fn transitions_out_of_order_are_rejected() {
    let ws = Workspace::new("out_of_order");
    let flags = Flags::new();
    let mut window = ScriptedWindow::default();

    let mut idle: Session<FakeCamera, FakeDetector> = Session::new(&ws.config());
    assert!(matches!(idle.step(&mut window), Err(Error::InvalidState(SessionState::Idle))));
    assert!(matches!(idle.run(&mut window), Err(Error::InvalidState(SessionState::Idle))));
    assert_eq!(idle.state(), SessionState::Idle);

    let mut session = started(&ws, &flags, 3, true);
    let again = session.start(&necklace(Some("necklace.png")), || Ok(flags.camera(1)), || Ok(flags.detector(true)));
    assert!(matches!(again, Err(Error::InvalidState(SessionState::Running))));

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.run(&mut window), Err(Error::InvalidState(SessionState::Closed))));
}

#[test]
fn dropping_a_running_session_releases_devices() {
    let ws = Workspace::new("drop");
    let flags = Flags::new();
    let session = started(&ws, &flags, 3, true);
    assert!(!flags.camera_released.get());

    drop(session);

    assert!(flags.camera_released.get());
    assert!(flags.detector_released.get());
}
