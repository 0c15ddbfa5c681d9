//! Local video file source.
//!
//! `FileSource` decodes frames from a local video file (feature
//! `ingest-file-ffmpeg`) or synthesizes them for `stub://` paths. Decoded frames
//! are BGR, matching what OpenCV-style capture hands to detectors; the order is
//! declared on each frame.
//!
//! Remote URLs are rejected: the file must already be on local disk.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{StubParams, SyntheticFrames, SyntheticRead};
use super::{FrameSource, ReadOutcome, SourceError};
use crate::frame::ChannelOrder;

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path (e.g., "clips/street.mp4") or `stub://` identifier.
    pub path: String,
}

/// Local file frame source.
pub struct FileSource {
    config: FileConfig,
    backend: Option<FileBackend>,
    frames_read: u64,
}

enum FileBackend {
    Synthetic(SyntheticFrames),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Validate the path. Nothing is opened until `open`.
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file source only supports local paths (no URL schemes): '{}'",
                config.path
            ));
        }
        if config.path.starts_with("stub://") {
            StubParams::parse(&config.path)?;
        }
        Ok(Self {
            config,
            backend: None,
            frames_read: 0,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn open_backend(&self) -> Result<FileBackend> {
        if self.config.path.starts_with("stub://") {
            let params = StubParams::parse(&self.config.path)?;
            return Ok(FileBackend::Synthetic(SyntheticFrames::new(
                params,
                ChannelOrder::Bgr,
            )));
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(FileBackend::Ffmpeg(FfmpegFileSource::open(&self.config.path)?))
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            if !std::path::Path::new(&self.config.path).is_file() {
                return Err(anyhow!("no such file: {}", self.config.path));
            }
            Err(anyhow!(
                "file decoding requires the ingest-file-ffmpeg feature"
            ))
        }
    }
}

impl FrameSource for FileSource {
    fn source_id(&self) -> &str {
        &self.config.path
    }

    fn open(&mut self) -> Result<(), SourceError> {
        if self.backend.is_some() {
            return Ok(());
        }
        let backend = self
            .open_backend()
            .map_err(|err| SourceError::unavailable(&self.config.path, format!("{:#}", err)))?;
        self.backend = Some(backend);
        log::info!("FileSource: opened {}", self.config.path);
        Ok(())
    }

    fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        let path = &self.config.path;
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| SourceError::read(path, "file is not open"))?;
        let outcome = match backend {
            FileBackend::Synthetic(frames) => match frames.next() {
                Ok(SyntheticRead::Frame(frame)) => ReadOutcome::Frame(frame),
                Ok(SyntheticRead::EndOfStream) => ReadOutcome::EndOfStream,
                Ok(SyntheticRead::Failed(reason)) => return Err(SourceError::read(path, reason)),
                Err(err) => return Err(SourceError::read(path, format!("{:#}", err))),
            },
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(decoder) => match decoder.next_frame() {
                Ok(Some(frame)) => ReadOutcome::Frame(frame),
                Ok(None) => ReadOutcome::EndOfStream,
                Err(err) => return Err(SourceError::read(path, format!("{:#}", err))),
            },
        };
        if matches!(outcome, ReadOutcome::Frame(_)) {
            self.frames_read += 1;
        }
        Ok(outcome)
    }

    fn release(&mut self) {
        if self.backend.take().is_none() {
            return;
        }
        log::info!(
            "FileSource: released {} after {} frames",
            self.config.path,
            self.frames_read
        );
    }

    fn is_open(&self) -> bool {
        self.backend.is_some()
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
