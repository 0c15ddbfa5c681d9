//! The inference loop.
//!
//! `run` drives one source, one detector and one display sink until the stop
//! signal is observed, the source ends or fails, or the detector fails.
//!
//! State machine, recorded on the `RunControl`:
//!
//! ```text
//! Idle -> Running -> Stopping -> Stopped
//!   \_________________^            (source failed to open)
//! ```
//!
//! Every exit path goes through `RunGuard::finish`, which releases the source and
//! the detector's resources exactly once. The guard's `Drop` runs the same routine,
//! so a panic unwinding out of a detector or sink still releases the camera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::detect::{Detector, Thresholds};
use crate::display::{DisplaySink, Notice, Panel};
use crate::ingest::{FrameSource, ReadOutcome, SourceError};

/// Frames between throughput log lines.
const STATS_EVERY: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Cloneable, polled stop flag. Safe to set from a signal handler thread.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
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

#[derive(Debug)]
struct StateLog {
    current: RunState,
    history: Vec<RunState>,
}

/// Stop signal plus the observable state of the run it is handed to.
///
/// A control drives exactly one run: `Stopped` is terminal and `run` rejects a
/// control that is not `Idle`. Use `next_run` to get a fresh control for the
/// next run that still honours this one's stop signal.
#[derive(Clone, Debug)]
pub struct RunControl {
    stop: StopSignal,
    /// Signals of the controls this one was derived from.
    upstream: Vec<StopSignal>,
    state: Arc<Mutex<StateLog>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::with_stop_signal(StopSignal::new())
    }

    /// Share an existing signal, e.g. one wired to Ctrl-C.
    pub fn with_stop_signal(stop: StopSignal) -> Self {
        Self {
            stop,
            upstream: Vec::new(),
            state: Arc::new(Mutex::new(StateLog {
                current: RunState::Idle,
                history: vec![RunState::Idle],
            })),
        }
    }

    /// A new `Idle` control with its own stop signal.
    ///
    /// The new run also stops when this control (or anything it was derived
    /// from) is asked to stop, so a shutdown signal reaches every run. Stopping
    /// the derived control does not affect this one.
    pub fn next_run(&self) -> Self {
        let mut upstream = self.upstream.clone();
        upstream.push(self.stop.clone());
        Self {
            upstream,
            ..Self::new()
        }
    }

    /// This control's own signal; setting it stops this run only.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.request();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_requested() || self.upstream.iter().any(StopSignal::is_requested)
    }

    pub fn state(&self) -> RunState {
        self.state_log().current
    }

    /// Every state the run has been in, in order, starting with `Idle`.
    pub fn transitions(&self) -> Vec<RunState> {
        self.state_log().history.clone()
    }

    fn set_state(&self, state: RunState) {
        let mut entry = self.state_log();
        if entry.current != state {
            entry.current = state;
            entry.history.push(state);
        }
    }

    fn state_log(&self) -> MutexGuard<'_, StateLog> {
        // never held across user code
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    StopRequested,
    EndOfStream,
    ReadFailed(String),
    FrameLimit,
}

/// Outcome of a run that ended without a fatal error.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub frames_processed: u64,
    pub stop_reason: StopReason,
    pub mean_infer_ms: f64,
    pub fps_estimate: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after this many processed frames, as if a stop had been requested.
    pub max_frames: Option<u64>,
}

/// Failures that end a run with an error. Read failures and end-of-stream are not
/// errors; they end the run with a `RunReport`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunError {
    #[error("source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },
    #[error("detector {detector} failed on frame {frame}: {message}")]
    Inference {
        detector: String,
        frame: u64,
        message: String,
    },
    #[error("run control already used (state {state:?}); start each run with a fresh control")]
    ControlReused { state: RunState },
    #[error("inference loop thread panicked")]
    Panicked,
}

impl RunError {
    fn from_open(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable { source_id, reason }
            | SourceError::Read { source_id, reason } => {
                RunError::SourceUnavailable { source_id, reason }
            }
        }
    }
}

/// Run until stopped with default options.
pub fn run(
    source: &mut dyn FrameSource,
    detector: &mut dyn Detector,
    thresholds: Thresholds,
    display: &mut dyn DisplaySink,
    control: &RunControl,
) -> Result<RunReport, RunError> {
    run_with_options(
        source,
        detector,
        thresholds,
        display,
        control,
        RunOptions::default(),
    )
}

pub fn run_with_options(
    source: &mut dyn FrameSource,
    detector: &mut dyn Detector,
    thresholds: Thresholds,
    display: &mut dyn DisplaySink,
    control: &RunControl,
    options: RunOptions,
) -> Result<RunReport, RunError> {
    // nothing has been opened yet, so there is nothing to release
    let state = control.state();
    if state != RunState::Idle {
        return Err(RunError::ControlReused { state });
    }

    let mut guard = RunGuard {
        source,
        detector,
        control,
        finished: false,
    };

    if let Err(err) = guard.source.open() {
        display.notify(&Notice::error(err.to_string()));
        guard.finish();
        return Err(RunError::from_open(err));
    }

    control.set_state(RunState::Running);
    log::info!(
        "run started: source={} detector={} confidence={} overlap={}",
        guard.source.source_id(),
        guard.detector.name(),
        thresholds.confidence(),
        thresholds.overlap()
    );

    let mut stats = RunStats::new();
    let stop_reason = loop {
        let frame = match guard.source.read() {
            Ok(ReadOutcome::Frame(frame)) => frame,
            Ok(ReadOutcome::EndOfStream) => break StopReason::EndOfStream,
            Err(err) => {
                let message = err.to_string();
                display.notify(&Notice::warning(message.clone()));
                break StopReason::ReadFailed(message);
            }
        };

        let started = Instant::now();
        let result = match guard.detector.infer(&frame, &thresholds) {
            Ok(result) => result,
            Err(err) => {
                let error = RunError::Inference {
                    detector: guard.detector.name().to_string(),
                    frame: stats.frames + 1,
                    message: format!("{:#}", err),
                };
                display.notify(&Notice::error(error.to_string()));
                guard.finish();
                return Err(error);
            }
        };
        stats.record(started.elapsed());

        let annotated = result.annotate(&frame);
        display.show(Panel::Raw, &frame);
        display.show(Panel::Annotated, &annotated);

        if !result.is_empty() {
            log::debug!("frame {}: {}", stats.frames, result.summary());
        }
        stats.maybe_log();

        if options.max_frames.is_some_and(|max| stats.frames >= max) {
            break StopReason::FrameLimit;
        }
        if control.stop_requested() {
            break StopReason::StopRequested;
        }
    };

    guard.finish();
    let report = stats.report(stop_reason);
    log::info!(
        "run stopped ({:?}) after {} frames, mean inference {:.1} ms, {:.1} fps",
        report.stop_reason,
        report.frames_processed,
        report.mean_infer_ms,
        report.fps_estimate
    );
    Ok(report)
}

/// Owns the cleanup of one run.
struct RunGuard<'a> {
    source: &'a mut dyn FrameSource,
    detector: &'a mut dyn Detector,
    control: &'a RunControl,
    finished: bool,
}

impl RunGuard<'_> {
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.control.set_state(RunState::Stopping);
        self.source.release();
        self.detector.release_resources();
        self.control.set_state(RunState::Stopped);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("run unwinding; releasing {}", self.source.source_id());
        }
        self.finish();
    }
}

struct RunStats {
    frames: u64,
    infer_total: Duration,
    started: Instant,
}

impl RunStats {
    fn new() -> Self {
        Self {
            frames: 0,
            infer_total: Duration::ZERO,
            started: Instant::now(),
        }
    }

    fn record(&mut self, infer: Duration) {
        self.frames += 1;
        self.infer_total += infer;
    }

    fn mean_infer_ms(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.infer_total.as_secs_f64() * 1000.0 / self.frames as f64
        }
    }

    fn fps(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            self.frames as f64 / elapsed
        }
    }

    fn maybe_log(&self) {
        if self.frames % STATS_EVERY == 0 {
            log::debug!(
                "{} frames, mean inference {:.1} ms, {:.1} fps",
                self.frames,
                self.mean_infer_ms(),
                self.fps()
            );
        }
    }

    fn report(&self, stop_reason: StopReason) -> RunReport {
        RunReport {
            frames_processed: self.frames,
            stop_reason,
            mean_infer_ms: self.mean_infer_ms(),
            fps_estimate: self.fps(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::display::NullSink;
    use crate::ingest::camera::{CameraConfig, CameraSource};

    fn stub_camera(id: &str) -> CameraSource {
        CameraSource::new(CameraConfig {
            device: Some(id.to_string()),
            ..CameraConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let control = RunControl::new();
        let signal = control.stop_signal();
        assert!(!control.stop_requested());
        signal.request();
        assert!(control.stop_requested());
    }

    #[test]
    fn derived_control_follows_its_parent_but_not_the_reverse() {
        let parent = RunControl::new();
        let child = parent.next_run();
        let grandchild = child.next_run();

        child.request_stop();
        assert!(!parent.stop_requested());
        assert!(grandchild.stop_requested());

        let sibling = parent.next_run();
        assert!(!sibling.stop_requested());
        assert_eq!(sibling.state(), RunState::Idle);
        parent.request_stop();
        assert!(sibling.stop_requested());
    }

    #[test]
    fn stopped_control_is_not_run_again() {
        let mut source = stub_camera("stub://cam?frames=2&width=16&height=16");
        let mut detector = StubBackend::new();
        let control = RunControl::new();
        run(&mut source, &mut detector, Thresholds::default(), &mut NullSink, &control).unwrap();

        let err = run(&mut source, &mut detector, Thresholds::default(), &mut NullSink, &control)
            .unwrap_err();
        assert_eq!(err, RunError::ControlReused { state: RunState::Stopped });
        assert!(!source.is_open());
        assert_eq!(control.transitions().last(), Some(&RunState::Stopped));
        assert_eq!(control.transitions().len(), 4);
    }

    #[test]
    fn state_log_ignores_repeated_states() {
        let control = RunControl::new();
        control.set_state(RunState::Running);
        control.set_state(RunState::Running);
        assert_eq!(control.transitions(), vec![RunState::Idle, RunState::Running]);
    }

    #[test]
    fn frame_limit_ends_run() {
        let mut source = stub_camera("stub://cam?frames=10&width=32&height=32");
        let mut detector = StubBackend::new();
        let control = RunControl::new();
        let report = run_with_options(
            &mut source,
            &mut detector,
            Thresholds::default(),
            &mut NullSink,
            &control,
            RunOptions { max_frames: Some(4) },
        )
        .unwrap();
        assert_eq!(report.frames_processed, 4);
        assert_eq!(report.stop_reason, StopReason::FrameLimit);
        assert_eq!(control.state(), RunState::Stopped);
        assert!(!source.is_open());
    }

    #[test]
    fn read_error_becomes_read_failed_report() {
        let mut source = stub_camera("stub://cam?frames=5&fail_at=2&width=32&height=32");
        let control = RunControl::new();
        let report = run(
            &mut source,
            &mut StubBackend::new(),
            Thresholds::default(),
            &mut NullSink,
            &control,
        )
        .unwrap();
        assert_eq!(report.frames_processed, 1);
        assert!(matches!(report.stop_reason, StopReason::ReadFailed(_)));
        assert!(!source.is_open());
    }
}
