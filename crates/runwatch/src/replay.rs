//! Replay driver: serves a capture file through the `StatusSource` seam.
//!
//! The poll loop cannot tell a replay from a live session. Records are parsed
//! lazily with the same code as live responses, in their original order, with
//! optional pacing that reproduces the recorded gaps between them.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use runwatch_domain::{RunId, StatusSnapshot};
use tracing::debug;

use crate::capture::{CaptureFile, CaptureRecord};
use crate::error::{Result, WatchError};
use crate::transport::StatusSource;

/// How the recorded gaps between snapshots are reproduced.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ReplayPacing {
    /// Return every snapshot immediately.
    #[default]
    Instant,
    /// Sleep the recorded gap.
    RealTime,
    /// Sleep the recorded gap divided by the speedup.
    Scaled(f64),
}

impl ReplayPacing {
    /// Delay before serving a record `delta_secs` after the previous one.
    pub fn delay(&self, delta_secs: f64) -> Option<Duration> {
        if !delta_secs.is_finite() || delta_secs <= 0.0 {
            return None;
        }
        let secs = match *self {
            ReplayPacing::Instant => return None,
            ReplayPacing::RealTime => delta_secs,
            ReplayPacing::Scaled(speedup) => delta_secs / speedup,
        };
        Duration::try_from_secs_f64(secs).ok()
    }
}

impl FromStr for ReplayPacing {
    type Err = WatchError;

    /// `instant`, `realtime`, or a speedup such as `10x` / `10`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(ReplayPacing::Instant),
            "realtime" | "real-time" => Ok(ReplayPacing::RealTime),
            other => {
                let factor = other.strip_suffix('x').unwrap_or(other);
                match factor.parse::<f64>() {
                    Ok(f) if f.is_finite() && f > 0.0 => Ok(ReplayPacing::Scaled(f)),
                    _ => Err(WatchError::Config(format!(
                        "invalid replay pacing {s:?} (expected instant, realtime or a speedup like 10x)"
                    ))),
                }
            }
        }
    }
}

impl fmt::Display for ReplayPacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayPacing::Instant => f.write_str("instant"),
            ReplayPacing::RealTime => f.write_str("realtime"),
            ReplayPacing::Scaled(speedup) => write!(f, "{speedup}x"),
        }
    }
}

/// Feeds recorded snapshots back, one per fetch.
#[derive(Debug, Clone)]
pub struct ReplayDriver {
    capture: CaptureFile,
    pacing: ReplayPacing,
    cursor: usize,
    validated: bool,
}

impl ReplayDriver {
    pub fn load(path: &Path, pacing: ReplayPacing) -> Result<Self> {
        let capture = CaptureFile::load(path)?;
        debug!(
            path = %path.display(),
            run_id = %capture.run_id,
            snapshots = capture.len(),
            %pacing,
            "loaded capture"
        );
        Ok(Self::from_capture(capture, pacing))
    }

    pub fn from_capture(capture: CaptureFile, pacing: ReplayPacing) -> Self {
        ReplayDriver {
            capture,
            pacing,
            cursor: 0,
            validated: false,
        }
    }

    /// Run recorded in the capture.
    pub fn run_id(&self) -> &RunId {
        &self.capture.run_id
    }

    pub fn capture(&self) -> &CaptureFile {
        &self.capture
    }

    pub fn pacing(&self) -> ReplayPacing {
        self.pacing
    }

    /// Records served so far.
    pub fn consumed(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.capture.len() - self.cursor
    }

    /// Start again from the first record.
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.validated = false;
    }

    /// Every recorded snapshot in order, parsed on demand, independent of
    /// the fetch cursor. Call again to start over.
    pub fn snapshots(&self) -> Snapshots<'_> {
        Snapshots {
            records: self.capture.snapshots.iter(),
        }
    }
}

#[async_trait]
impl StatusSource for ReplayDriver {
    async fn fetch(&mut self, run_id: &RunId) -> Result<StatusSnapshot> {
        if !self.validated {
            if run_id != &self.capture.run_id {
                return Err(WatchError::CaptureMismatch {
                    expected: run_id.clone(),
                    found: self.capture.run_id.clone(),
                });
            }
            self.validated = true;
        }

        let Some(record) = self.capture.snapshots.get(self.cursor) else {
            return Err(WatchError::ReplayExhausted {
                consumed: self.cursor,
            });
        };

        if let Some(previous) = self.cursor.checked_sub(1).map(|i| &self.capture.snapshots[i]) {
            if let Some(delay) = self.pacing.delay(record.elapsed_secs - previous.elapsed_secs) {
                tokio::time::sleep(delay).await;
            }
        }

        // Advance only once the pacing delay is over, so a fetch abandoned
        // mid-sleep leaves the cursor where it was.
        self.cursor += 1;
        record.to_snapshot()
    }
}

/// Lazy iterator over a capture's snapshots.
#[derive(Debug, Clone)]
pub struct Snapshots<'a> {
    records: std::slice::Iter<'a, CaptureRecord>,
}

impl Iterator for Snapshots<'_> {
    type Item = Result<StatusSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(CaptureRecord::to_snapshot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for Snapshots<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::snapshot_at;
    use chrono::Utc;
    use tokio::time::Instant;

    fn capture(steps: &[(&str, Option<&str>, f64)]) -> CaptureFile {
        let mut capture = CaptureFile::new(RunId::from(19217851608u64), Utc::now());
        for (status, conclusion, at) in steps {
            capture.push(CaptureRecord::from_snapshot(&snapshot_at(status, *conclusion, *at)));
        }
        capture
    }

    #[test]
    fn test_pacing_parse_and_delay() {
        assert_eq!("instant".parse::<ReplayPacing>().unwrap(), ReplayPacing::Instant);
        assert_eq!("RealTime".parse::<ReplayPacing>().unwrap(), ReplayPacing::RealTime);
        assert_eq!("10x".parse::<ReplayPacing>().unwrap(), ReplayPacing::Scaled(10.0));
        assert_eq!("2.5".parse::<ReplayPacing>().unwrap(), ReplayPacing::Scaled(2.5));
        for bad in ["0x", "-3", "fast", "x"] {
            assert!(bad.parse::<ReplayPacing>().is_err(), "{bad} should be rejected");
        }

        assert_eq!(ReplayPacing::Instant.delay(5.0), None);
        assert_eq!(ReplayPacing::RealTime.delay(5.0), Some(Duration::from_secs(5)));
        assert_eq!(ReplayPacing::Scaled(10.0).delay(5.0), Some(Duration::from_millis(500)));
        assert_eq!(ReplayPacing::RealTime.delay(-1.0), None);
        assert_eq!(ReplayPacing::Scaled(4.0).to_string(), "4x");
    }

    #[tokio::test]
    async fn test_fetch_serves_records_then_exhausts() {
        let mut driver = ReplayDriver::from_capture(
            capture(&[("queued", None, 0.0), ("in_progress", None, 5.0)]),
            ReplayPacing::Instant,
        );
        let run_id = RunId::from(19217851608u64);

        assert_eq!(driver.fetch(&run_id).await.unwrap().elapsed_secs(), 0.0);
        assert_eq!(driver.fetch(&run_id).await.unwrap().elapsed_secs(), 5.0);
        assert!(matches!(
            driver.fetch(&run_id).await,
            Err(WatchError::ReplayExhausted { consumed: 2 })
        ));

        driver.rewind();
        assert_eq!(driver.remaining(), 2);
        assert!(driver.fetch(&run_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_id_checked_on_first_fetch() {
        let mut driver = ReplayDriver::from_capture(
            capture(&[("queued", None, 0.0)]),
            ReplayPacing::Instant,
        );
        let err = driver.fetch(&RunId::from(1u64)).await.unwrap_err();
        assert!(matches!(err, WatchError::CaptureMismatch { .. }));
        assert_eq!(driver.consumed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scaled_pacing_sleeps_recorded_gap() {
        let mut driver = ReplayDriver::from_capture(
            capture(&[
                ("queued", None, 0.0),
                ("in_progress", None, 20.0),
                ("completed", Some("success"), 40.0),
            ]),
            ReplayPacing::Scaled(10.0),
        );
        let run_id = RunId::from(19217851608u64);
        let started = Instant::now();

        driver.fetch(&run_id).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        driver.fetch(&run_id).await.unwrap();
        driver.fetch(&run_id).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[test]
    fn test_snapshots_iterator_is_restartable() {
        let driver = ReplayDriver::from_capture(
            capture(&[("queued", None, 0.0), ("completed", Some("failure"), 10.0)]),
            ReplayPacing::Instant,
        );
        let first: Vec<f64> = driver
            .snapshots()
            .map(|s| s.unwrap().elapsed_secs())
            .collect();
        let second: Vec<f64> = driver
            .snapshots()
            .map(|s| s.unwrap().elapsed_secs())
            .collect();
        assert_eq!(first, vec![0.0, 10.0]);
        assert_eq!(first, second);
        assert_eq!(driver.snapshots().len(), 2);
    }
}
