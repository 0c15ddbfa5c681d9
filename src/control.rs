//! Start/stop control for a run on a worker thread.

use std::thread::JoinHandle;

use anyhow::{Context, Result};

use crate::detect::{Detector, Thresholds};
use crate::display::DisplaySink;
use crate::ingest::FrameSource;
use crate::run::{run_with_options, RunControl, RunError, RunOptions, RunReport, RunState};

/// Spawns inference loops.
#[derive(Clone, Debug, Default)]
pub struct LoopRunner {
    thresholds: Thresholds,
    options: RunOptions,
    control: Option<RunControl>,
}

impl LoopRunner {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            options: RunOptions::default(),
            control: None,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Tie every started run to `control`'s stop signal, e.g. one wired to
    /// Ctrl-C. Each `start` still gets its own control (see
    /// `RunControl::next_run`), so stopping one run leaves later runs alone.
    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = Some(control);
        self
    }

    /// Move the collaborators onto a new thread and start the loop.
    pub fn start<S, D, K>(&self, mut source: S, mut detector: D, mut display: K) -> Result<LoopHandle>
    where
        S: FrameSource + 'static,
        D: Detector + 'static,
        K: DisplaySink + 'static,
    {
        let control = self
            .control
            .as_ref()
            .map_or_else(RunControl::new, RunControl::next_run);
        let thread_control = control.clone();
        let thresholds = self.thresholds;
        let options = self.options;

        let join = std::thread::Builder::new()
            .name("live-detect-loop".to_string())
            .spawn(move || {
                run_with_options(
                    &mut source,
                    &mut detector,
                    thresholds,
                    &mut display,
                    &thread_control,
                    options,
                )
            })
            .context("spawn inference loop thread")?;

        Ok(LoopHandle {
            control,
            join: Some(join),
        })
    }
}

/// Handle to a running loop. Dropping it stops the loop and waits for cleanup.
#[derive(Debug)]
pub struct LoopHandle {
    control: RunControl,
    join: Option<JoinHandle<Result<RunReport, RunError>>>,
}

impl LoopHandle {
    /// Ask the loop to stop after the current frame.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Wait for the loop to end and return its outcome.
    pub fn join(mut self) -> Result<RunReport, RunError> {
        self.wait()
    }

    fn wait(&mut self) -> Result<RunReport, RunError> {
        match self.join.take() {
            Some(join) => join.join().unwrap_or(Err(RunError::Panicked)),
            None => Err(RunError::Panicked),
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stop();
            if let Err(err) = self.wait() {
                log::warn!("inference loop ended with error: {}", err);
            }
        }
    }
}
