// THEORY:
// The `session` module is the interactive loop of a try-on, formalized as a
// three-state machine: `Idle → Running → Closed`.
//
// Key architectural principles:
// 1.  **Explicit Context**: The capture device, the detector and the overlay asset
//     live in one `SessionContext` that exists only while the session is
//     `Running`. Nothing is process-global.
// 2.  **Abort Before Acquire**: `start` loads the overlay asset before opening the
//     capture device, and opens the device before the detector. Whatever fails
//     first sends the session to `Closed`, releasing anything already acquired.
// 3.  **Scoped Release**: Leaving `Running` drops the context, which releases the
//     device and the detector. That happens on quit, on an exhausted source, on
//     any fatal error, and when the `Session` itself is dropped. A non-fatal
//     error (see `Error::is_fatal`) only costs the current frame.
// 4.  **Polled Commands**: The display side is asked once per iteration whether
//     a command arrived. A quit therefore waits for at most one in-flight frame.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::config::TryOnConfig;
use crate::core_modules::landmarks::LandmarkDetector;
use crate::core_modules::overlay_asset::{OverlayAsset, Product};
use crate::core_modules::placement::PlacementPolicy;
use crate::core_modules::snapshot::SnapshotRecorder;
use crate::error::{Error, Result};
use crate::pipeline::{Report, TryOnPipeline};
use crate::Frame;

/// Lifecycle state of a `Session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Closed,
}

/// One read from a capture source.
#[derive(Debug, Clone)]
pub enum Capture {
    Frame(Frame),
    /// The source is exhausted or the device stopped delivering frames.
    Closed,
}

/// A blocking source of frames, e.g. a webcam. Opened by its constructor and
/// released on drop.
pub trait CaptureSource {
    fn next_frame(&mut self) -> Result<Capture>;
}

/// A user command polled from the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Capture,
    Quit,
}

/// Where composited frames go, and where commands come from.
pub trait FrameSink {
    fn show(&mut self, frame: &Frame) -> Result<()>;
    fn poll_command(&mut self) -> Result<Option<Command>>;
}

/// Everything a running session owns exclusively.
struct SessionContext<C, D> {
    capture: C,
    pipeline: TryOnPipeline<D>,
}

/// What a single `step` did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Frame {
        report: Report,
        command: Option<Command>,
        /// Set when a `Capture` command saved a snapshot.
        snapshot: Option<PathBuf>,
    },
    Closed,
}

pub struct Session<C, D> {
    state: SessionState,
    assets_dir: PathBuf,
    policy: PlacementPolicy,
    recorder: SnapshotRecorder,
    context: Option<SessionContext<C, D>>,
}

impl<C: CaptureSource, D: LandmarkDetector> Session<C, D> {
    pub fn new(config: &TryOnConfig) -> Self {
        Self {
            state: SessionState::Idle,
            assets_dir: config.assets_dir.clone(),
            policy: config.placement.clone(),
            recorder: SnapshotRecorder::new(&config.snapshot_dir),
            context: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn snapshot_dir(&self) -> &Path {
        self.recorder.dest_dir()
    }

    /// The overlay asset of a running session.
    pub fn asset(&self) -> Option<&OverlayAsset> {
        self.context.as_ref().map(|ctx| ctx.pipeline.asset())
    }

    /// `Idle → Running`. Loads the asset, then opens the capture source, then the
    /// detector. On any failure the session is `Closed` and the error returned.
    pub fn start<FC, FD>(&mut self, product: &Product, open_capture: FC, open_detector: FD) -> Result<()>
    where
        FC: FnOnce() -> Result<C>,
        FD: FnOnce() -> Result<D>,
    {
        if self.state != SessionState::Idle {
            return Err(Error::InvalidState(self.state));
        }

        let acquired = OverlayAsset::load(product, &self.assets_dir).and_then(|asset| {
            let capture = open_capture()?;
            let detector = open_detector()?;
            Ok(SessionContext {
                capture,
                pipeline: TryOnPipeline::new(detector, asset, self.policy.clone()),
            })
        });

        match acquired {
            Ok(context) => {
                info!(
                    "try-on started for `{}` ({})",
                    product.name,
                    context.pipeline.asset().category()
                );
                self.context = Some(context);
                self.state = SessionState::Running;
                Ok(())
            }
            Err(err) => {
                error!("try-on for `{}` aborted: {err}", product.name);
                self.state = SessionState::Closed;
                Err(err)
            }
        }
    }

    /// Runs one iteration: capture, process, show, poll. A fatal error closes the
    /// session; a non-fatal one is returned and the session stays `Running`.
    pub fn step<S: FrameSink>(&mut self, sink: &mut S) -> Result<StepOutcome> {
        if self.state != SessionState::Running {
            return Err(Error::InvalidState(self.state));
        }
        let result = self.step_inner(sink);
        match &result {
            Err(err) if err.is_fatal() => {
                error!("try-on stopped: {err}");
                self.close();
            }
            Err(err) => warn!("frame skipped: {err}"),
            Ok(_) => {}
        }
        result
    }

    fn step_inner<S: FrameSink>(&mut self, sink: &mut S) -> Result<StepOutcome> {
        let Some(context) = self.context.as_mut() else {
            return Err(Error::InvalidState(self.state));
        };

        let frame = match context.capture.next_frame() {
            Ok(Capture::Frame(frame)) => frame,
            Ok(Capture::Closed) => {
                info!("capture source closed");
                self.close();
                return Ok(StepOutcome::Closed);
            }
            Err(err) => {
                error!("error reading frame: {err}");
                self.close();
                return Ok(StepOutcome::Closed);
            }
        };

        let analysis = context.pipeline.process_frame(frame);
        sink.show(&analysis.frame)?;

        let command = sink.poll_command()?;
        let mut snapshot = None;
        match command {
            Some(Command::Capture) => match self.recorder.save(&analysis.frame) {
                Ok(path) => snapshot = Some(path),
                Err(err) => warn!("snapshot not saved: {err}"),
            },
            Some(Command::Quit) => {
                info!("quit requested");
                self.close();
            }
            None => {}
        }

        Ok(StepOutcome::Frame {
            report: analysis.report,
            command,
            snapshot,
        })
    }

    /// Steps until the session is `Closed`. Non-fatal errors are skipped.
    pub fn run<S: FrameSink>(&mut self, sink: &mut S) -> Result<()> {
        if self.state != SessionState::Running {
            return Err(Error::InvalidState(self.state));
        }
        while self.state == SessionState::Running {
            if let Err(err) = self.step(sink) {
                if err.is_fatal() {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Releases the capture source and detector. Idempotent.
    pub fn close(&mut self) {
        if let Some(context) = self.context.take() {
            info!("closing session after {} frame(s)", context.pipeline.frame_count());
            drop(context);
        }
        self.state = SessionState::Closed;
    }
}
