//! Step-weighted progress estimates.

use crate::status::RunStatus;

/// Progress of a job (or a whole run) measured in steps.
///
/// A running step counts as half done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressStats {
    pub complete: u32,
    pub in_progress: u32,
    pub total: u32,
}

impl ProgressStats {
    pub fn from_statuses(statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        let mut stats = ProgressStats::default();
        for status in statuses {
            match status {
                RunStatus::Completed => stats.complete += 1,
                RunStatus::InProgress => stats.in_progress += 1,
                RunStatus::Queued
                | RunStatus::Pending
                | RunStatus::Waiting
                | RunStatus::Requested => {}
            }
            stats.total += 1;
        }
        stats
    }

    /// Weighted number of finished steps.
    pub fn completed(&self) -> f64 {
        f64::from(self.complete) + f64::from(self.in_progress) * 0.5
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed() / f64::from(self.total) * 100.0
    }

    /// Everything counted as done; used once the run itself has completed.
    pub fn finished(&self) -> Self {
        ProgressStats {
            complete: self.total,
            in_progress: 0,
            total: self.total,
        }
    }
}

impl std::ops::Add for ProgressStats {
    type Output = ProgressStats;

    fn add(self, rhs: ProgressStats) -> ProgressStats {
        ProgressStats {
            complete: self.complete + rhs.complete,
            in_progress: self.in_progress + rhs.in_progress,
            total: self.total + rhs.total,
        }
    }
}

impl std::iter::Sum for ProgressStats {
    fn sum<I: Iterator<Item = ProgressStats>>(iter: I) -> Self {
        iter.fold(ProgressStats::default(), |acc, p| acc + p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_progress_counts_half() {
        let stats = ProgressStats::from_statuses([
            RunStatus::Completed,
            RunStatus::InProgress,
            RunStatus::Queued,
            RunStatus::Pending,
        ]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed(), 1.5);
        assert_eq!(stats.percent_complete(), 37.5);
    }

    #[test]
    fn test_empty_is_zero_percent() {
        assert_eq!(ProgressStats::default().percent_complete(), 0.0);
    }

    #[test]
    fn test_sum_and_finished() {
        let a = ProgressStats {
            complete: 1,
            in_progress: 1,
            total: 3,
        };
        let b = ProgressStats {
            complete: 2,
            in_progress: 0,
            total: 2,
        };
        let sum: ProgressStats = [a, b].into_iter().sum();
        assert_eq!(sum.total, 5);
        assert_eq!(sum.finished().percent_complete(), 100.0);
    }
}
