//! Display sinks: where the raw and annotated panels go.
//!
//! The loop treats `show` as infallible. Sinks that can fail (disk, window) log
//! and carry on.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageFormat;

use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Panel {
    Raw,
    Annotated,
}

impl Panel {
    pub fn as_str(self) -> &'static str {
        match self {
            Panel::Raw => "raw",
            Panel::Annotated => "annotated",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Error,
    Warning,
}

/// One-line user-visible message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            NoticeLevel::Error => "error",
            NoticeLevel::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

/// Receives the two panels for every processed frame, raw first.
pub trait DisplaySink: Send {
    fn show(&mut self, panel: Panel, frame: &Frame);

    /// Surface a notice to the user. Defaults to the log.
    fn notify(&mut self, notice: &Notice) {
        log_notice(notice);
    }
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn show(&mut self, panel: Panel, frame: &Frame) {
        (**self).show(panel, frame)
    }

    fn notify(&mut self, notice: &Notice) {
        (**self).notify(notice)
    }
}

fn log_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Error => log::error!("{}", notice.message),
        NoticeLevel::Warning => log::warn!("{}", notice.message),
    }
}

/// Discards frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn show(&mut self, _panel: Panel, _frame: &Frame) {}
}

/// Keeps the latest frame of each panel as `<dir>/raw.jpg` and
/// `<dir>/annotated.jpg`.
///
/// Each write goes to a temporary file that is renamed into place, so a viewer
/// polling the directory never reads a half-written image.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    frames_written: u64,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create output directory {}", dir.display()))?;
        Ok(Self {
            dir,
            frames_written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn panel_path(&self, panel: Panel) -> PathBuf {
        self.dir.join(format!("{}.jpg", panel.as_str()))
    }

    /// Images written successfully so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn write(&self, panel: Panel, frame: &Frame) -> Result<()> {
        let rgb = frame.to_rgb_image()?;
        let path = self.panel_path(panel);
        let tmp = self.dir.join(format!(".{}.jpg.tmp", panel.as_str()));
        rgb.save_with_format(&tmp, ImageFormat::Jpeg)
            .with_context(|| format!("encode {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }
}

impl DisplaySink for DirectorySink {
    fn show(&mut self, panel: Panel, frame: &Frame) {
        match self.write(panel, frame) {
            Ok(()) => self.frames_written += 1,
            Err(err) => log::warn!("DirectorySink: dropping {} frame: {:#}", panel.as_str(), err),
        }
    }
}
