//! Capture recorder: a `StatusSource` decorator that keeps every response.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use runwatch_domain::{RunId, StatusSnapshot};
use tokio::time::Instant;

use crate::capture::{capture_path, CaptureFile, CaptureRecord};
use crate::error::Result;
use crate::obs;
use crate::transport::StatusSource;

/// Wraps a live source and records each successful snapshot.
///
/// The capture is written exactly once: by [`CaptureRecorder::close`], or on
/// drop when the session ends any other way (error, interrupt, early return).
pub struct CaptureRecorder<S> {
    inner: S,
    dir: PathBuf,
    capture: CaptureFile,
    started: Instant,
    finalized: bool,
}

impl<S> CaptureRecorder<S> {
    pub fn new(inner: S, run_id: RunId, dir: impl Into<PathBuf>) -> Self {
        CaptureRecorder {
            inner,
            dir: dir.into(),
            capture: CaptureFile::new(run_id, Utc::now()),
            started: Instant::now(),
            finalized: false,
        }
    }

    pub fn records(&self) -> &[CaptureRecord] {
        &self.capture.snapshots
    }

    /// Where the capture will be written.
    pub fn path(&self) -> PathBuf {
        capture_path(&self.dir, &self.capture.run_id)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the capture and return its path.
    pub fn close(mut self) -> Result<PathBuf> {
        self.finalize()
    }

    fn finalize(&mut self) -> Result<PathBuf> {
        if self.finalized {
            return Ok(self.path());
        }
        self.finalized = true;

        let path = self.capture.save(&self.dir)?;
        obs::emit_capture_saved(&self.capture.run_id, &path, self.capture.len());
        Ok(path)
    }
}

#[async_trait]
impl<S: StatusSource> StatusSource for CaptureRecorder<S> {
    async fn fetch(&mut self, run_id: &RunId) -> Result<StatusSnapshot> {
        let snapshot = self.inner.fetch(run_id).await?;
        let snapshot = snapshot.with_elapsed(self.started.elapsed().as_secs_f64())?;
        self.capture.push(CaptureRecord::from_snapshot(&snapshot));
        Ok(snapshot)
    }
}

impl<S> Drop for CaptureRecorder<S> {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            obs::emit_capture_save_error(&self.capture.run_id, &e);
        }
    }
}
