//! Training history statistics.
//!
//! Everything is derived from persisted session results:
//! - **Totals**: sessions, completed, cancelled, emergency-stopped
//! - **Personal best**: the longest recorded hold across all sessions
//! - **Consistency**: mean consistency score over completed sessions
//! - **Streak**: consecutive UTC days with a completed session

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{CompletionReason, SafetyCompliance, TrainingSessionResult};

/// Count of sessions per compliance classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceBreakdown {
    pub compliant: u32,
    pub minor_issues: u32,
    pub major_issues: u32,
    pub emergency_stop: u32,
}

impl ComplianceBreakdown {
    fn add(&mut self, compliance: SafetyCompliance) {
        match compliance {
            SafetyCompliance::Compliant => self.compliant += 1,
            SafetyCompliance::MinorIssues => self.minor_issues += 1,
            SafetyCompliance::MajorIssues => self.major_issues += 1,
            SafetyCompliance::EmergencyStop => self.emergency_stop += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_sessions: u32,
    pub completed_sessions: u32,
    /// Stopped by the user before completion.
    pub cancelled_sessions: u32,
    /// Ended by a safety limit, timer fault, discomfort or emergency stop.
    pub emergency_stopped_sessions: u32,
    #[serde(with = "crate::serde_ms")]
    pub personal_best_hold: Duration,
    #[serde(with = "crate::serde_ms")]
    pub total_hold_time: Duration,
    /// `None` until a session completes.
    pub mean_consistency: Option<f64>,
    pub current_streak_days: u32,
    pub compliance: ComplianceBreakdown,
}

impl HistoryStats {
    /// Computes statistics with `today` as the streak anchor.
    pub fn compute(results: &[TrainingSessionResult], today: NaiveDate) -> Self {
        let mut stats = HistoryStats::default();
        let mut consistency_sum = 0.0;
        let mut completed_days = BTreeSet::new();

        for result in results {
            stats.total_sessions += 1;
            stats.compliance.add(result.safety_compliance);
            stats.personal_best_hold = stats.personal_best_hold.max(result.best_hold);
            stats.total_hold_time = result
                .hold_times
                .iter()
                .fold(stats.total_hold_time, |acc, h| acc.saturating_add(*h));

            match result.completion_reason {
                CompletionReason::Completed => {
                    stats.completed_sessions += 1;
                    consistency_sum += result.consistency_score;
                    completed_days.insert(result.ended_at.date_naive());
                }
                CompletionReason::UserCancelled => stats.cancelled_sessions += 1,
                CompletionReason::EmergencyStop
                | CompletionReason::SafetyLimitExceeded
                | CompletionReason::TimerFault
                | CompletionReason::Discomfort => stats.emergency_stopped_sessions += 1,
            }
        }

        if stats.completed_sessions > 0 {
            stats.mean_consistency = Some(consistency_sum / f64::from(stats.completed_sessions));
        }
        stats.current_streak_days = streak_ending_near(&completed_days, today);
        stats
    }

    pub fn compute_now(results: &[TrainingSessionResult]) -> Self {
        Self::compute(results, Utc::now().date_naive())
    }

    pub fn completion_rate(&self) -> f64 {
        if self.total_sessions == 0 {
            return 0.0;
        }
        f64::from(self.completed_sessions) / f64::from(self.total_sessions)
    }
}

/// Consecutive days ending today, or yesterday if today has no session yet.
fn streak_ending_near(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut day = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };

    let mut streak = 0;
    while days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{ExperienceLevel, SafetyEventLog};
    use chrono::{DateTime, TimeZone};
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn ended(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, 9, 30, 0).unwrap()
    }

    fn result(d: u32, holds: &[u64], reason: CompletionReason) -> TrainingSessionResult {
        TrainingSessionResult::new(
            Uuid::new_v4(),
            "intro-static",
            ExperienceLevel::Beginner,
            Some(ended(d) - chrono::Duration::minutes(5)),
            ended(d),
            Duration::from_secs(300),
            holds.iter().map(|s| Duration::from_secs(*s)).collect(),
            Vec::new(),
            SafetyEventLog::new(),
            reason,
        )
    }

    #[test]
    fn empty_history_has_no_streak_or_consistency() {
        let stats = HistoryStats::compute(&[], day(14));
        assert_eq!(stats, HistoryStats::default());
        assert_eq!(stats.completion_rate(), 0.0);
    }

    #[test]
    fn counts_outcomes_and_personal_best() {
        let results = vec![
            result(12, &[10, 20], CompletionReason::Completed),
            result(13, &[25], CompletionReason::SafetyLimitExceeded),
            result(13, &[], CompletionReason::UserCancelled),
            result(14, &[15], CompletionReason::Completed),
        ];
        let stats = HistoryStats::compute(&results, day(14));
        assert_eq!(stats.total_sessions, 4);
        assert_eq!(stats.completed_sessions, 2);
        assert_eq!(stats.cancelled_sessions, 1);
        assert_eq!(stats.emergency_stopped_sessions, 1);
        assert_eq!(stats.personal_best_hold, Duration::from_secs(25));
        assert_eq!(stats.total_hold_time, Duration::from_secs(70));
        assert_eq!(stats.completion_rate(), 0.5);
    }

    #[test]
    fn mean_consistency_covers_completed_sessions_only() {
        let results = vec![
            result(14, &[10, 30], CompletionReason::Completed), // 0.5
            result(14, &[20], CompletionReason::Completed),     // 1.0
            result(14, &[5, 50], CompletionReason::EmergencyStop),
        ];
        let stats = HistoryStats::compute(&results, day(14));
        let mean = stats.mean_consistency.unwrap();
        assert!((mean - 0.75).abs() < 1e-9);
    }

    #[test]
    fn streak_counts_back_from_today_or_yesterday() {
        let results = vec![
            result(10, &[10], CompletionReason::Completed),
            result(12, &[10], CompletionReason::Completed),
            result(13, &[10], CompletionReason::Completed),
        ];
        assert_eq!(HistoryStats::compute(&results, day(13)).current_streak_days, 2);
        assert_eq!(HistoryStats::compute(&results, day(14)).current_streak_days, 2);
        assert_eq!(HistoryStats::compute(&results, day(15)).current_streak_days, 0);
    }

    #[test]
    fn aborted_sessions_do_not_extend_the_streak() {
        let results = vec![
            result(13, &[10], CompletionReason::Completed),
            result(14, &[10], CompletionReason::Discomfort),
        ];
        assert_eq!(HistoryStats::compute(&results, day(14)).current_streak_days, 1);
    }
}
