//! Capture files: recorded provider responses used as replay fixtures.
//!
//! A capture is written once per recording session and read-only afterwards.
//! Files are named `gh_run_{run_id}_capture.json` so the run can be recovered
//! from the filename alone.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use runwatch_domain::{ProviderPayload, RunId, StatusSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Result, WatchError};

pub const FORMAT_VERSION: u32 = 1;

/// Files written by older tooling: a bare array of records, no header.
pub const LEGACY_FORMAT_VERSION: u32 = 0;

/// One recorded provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Seconds since the recording session began.
    #[serde(alias = "epoch_offset")]
    pub elapsed_secs: f64,
    /// Raw "get run" body
    pub run: Value,
    /// Raw "list jobs for run" body
    pub jobs: Value,
}

impl CaptureRecord {
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Self {
        let payload = snapshot.payload();
        CaptureRecord {
            elapsed_secs: snapshot.elapsed_secs(),
            run: payload.run.clone(),
            jobs: payload.jobs.clone(),
        }
    }

    /// Parse the record through the same code path as a live response.
    pub fn to_snapshot(&self) -> Result<StatusSnapshot> {
        let payload = ProviderPayload {
            run: self.run.clone(),
            jobs: self.jobs.clone(),
        };
        Ok(StatusSnapshot::from_payload(payload, self.elapsed_secs)?)
    }
}

/// A complete capture: header metadata plus records in append order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureFile {
    pub format_version: u32,
    pub run_id: RunId,
    /// Wall-clock time the recording started
    pub recorded_at: DateTime<Utc>,
    pub snapshots: Vec<CaptureRecord>,
}

impl CaptureFile {
    pub fn new(run_id: RunId, recorded_at: DateTime<Utc>) -> Self {
        CaptureFile {
            format_version: FORMAT_VERSION,
            run_id,
            recorded_at,
            snapshots: Vec::new(),
        }
    }

    pub fn push(&mut self, record: CaptureRecord) {
        self.snapshots.push(record);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn is_legacy(&self) -> bool {
        self.format_version == LEGACY_FORMAT_VERSION
    }

    /// Read a capture file, accepting both the current and the legacy layout.
    ///
    /// When the filename encodes a run id it must agree with the header.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&text)
            .map_err(|e| WatchError::InvalidCapture(format!("{}: {e}", path.display())))?;
        let filename_id = run_id_from_filename(path);

        if document.is_array() {
            let mut snapshots: Vec<CaptureRecord> = serde_json::from_value(document)
                .map_err(|e| WatchError::InvalidCapture(format!("{}: {e}", path.display())))?;
            // Legacy files were not written in offset order.
            snapshots.sort_by(|a, b| a.elapsed_secs.total_cmp(&b.elapsed_secs));
            let run_id = filename_id.ok_or_else(|| {
                WatchError::InvalidCapture(format!(
                    "{}: legacy capture has no run id in its filename",
                    path.display()
                ))
            })?;
            return Ok(CaptureFile {
                format_version: LEGACY_FORMAT_VERSION,
                run_id,
                recorded_at: DateTime::<Utc>::default(),
                snapshots,
            });
        }

        let capture: CaptureFile = serde_json::from_value(document)
            .map_err(|e| WatchError::InvalidCapture(format!("{}: {e}", path.display())))?;

        if capture.format_version > FORMAT_VERSION {
            return Err(WatchError::InvalidCapture(format!(
                "{}: format version {} is newer than supported version {FORMAT_VERSION}",
                path.display(),
                capture.format_version
            )));
        }
        if let Some(expected) = filename_id {
            if expected != capture.run_id {
                return Err(WatchError::CaptureMismatch {
                    expected,
                    found: capture.run_id,
                });
            }
        }
        Ok(capture)
    }

    /// Write the capture into `dir` under its conventional name.
    ///
    /// The file is written beside its final path, synced, then renamed into
    /// place so readers never see a partial capture. A failed save leaves
    /// neither file behind.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = capture_path(dir, &self.run_id);
        let partial = path.with_extension("json.partial");

        let written = self
            .write_synced(&partial)
            .and_then(|()| fs::rename(&partial, &path).map_err(WatchError::from));
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        Ok(path)
    }

    fn write_synced(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }

    /// Whether replaying this capture can produce an outcome: the last record
    /// must be a completed run.
    pub fn ends_completed(&self) -> bool {
        self.snapshots
            .last()
            .and_then(|r| r.run.get("status"))
            .and_then(Value::as_str)
            == Some("completed")
    }

    /// SHA-256 over the canonical JSON of the records, for golden comparisons.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.snapshots)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// `dir/gh_run_{run_id}_capture.json`
pub fn capture_path(dir: &Path, run_id: &RunId) -> PathBuf {
    dir.join(format!("gh_run_{run_id}_capture.json"))
}

/// Recover the run id from a capture filename.
///
/// Accepts the conventional `gh_run_{id}_capture` stem, and otherwise any
/// provider-sized numeric id embedded in the name.
pub fn run_id_from_filename(path: &Path) -> Option<RunId> {
    let name = path.file_name()?.to_str()?;

    let conventional = Regex::new(r"^gh_run_(.+)_capture").ok()?;
    if let Some(caps) = conventional.captures(name) {
        return Some(RunId::new(&caps[1]));
    }

    let numeric = Regex::new(r"\d{10,}").ok()?;
    numeric.find(name).map(|m| RunId::new(m.as_str()))
}
