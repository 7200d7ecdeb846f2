use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::HistoryRecord;

/// Derived counters for display. Always recomputed, never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RollCallStats {
    pub total_students: usize,
    /// Distinct students called; repeats collapse.
    pub called_students: usize,
    pub remaining_students: usize,
    pub available_candidates: usize,
    /// Records including repeats.
    pub called_count: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub progress_percent: u32,
}

pub fn project(
    total_students: usize,
    available_candidates: usize,
    history: &[HistoryRecord],
    allow_repeat: bool,
    now: DateTime<Utc>,
) -> RollCallStats {
    let called_students = history
        .iter()
        .map(|record| record.student.id)
        .collect::<HashSet<_>>()
        .len();

    let remaining_students = if allow_repeat {
        total_students
    } else {
        total_students.saturating_sub(called_students)
    };

    let start_time = history.first().map(|record| record.timestamp);
    let elapsed_ms = start_time
        .map(|start| (now - start).num_milliseconds().max(0) as u64)
        .unwrap_or(0);

    let progress_percent = if total_students > 0 {
        ((called_students as f64 / total_students as f64) * 100.0).round() as u32
    } else {
        0
    };

    RollCallStats {
        total_students,
        called_students,
        remaining_students,
        available_candidates,
        called_count: history.len(),
        start_time,
        elapsed_ms,
        progress_percent,
    }
}

/// `MM:SS`, with `00:00` for zero.
pub fn format_elapsed(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candidate;
    use chrono::Duration;

    fn record(student_id: i64, timestamp: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            id: timestamp.timestamp_millis() + student_id,
            student: Candidate {
                id: student_id,
                student_id: format!("S{student_id}"),
                name: format!("student-{student_id}"),
                weight: 1,
                group_id: 1,
                group_name: "G1".into(),
            },
            timestamp,
            class_name: "1-A".into(),
        }
    }

    #[test]
    fn empty_history() {
        let stats = project(4, 4, &[], false, Utc::now());
        assert_eq!(stats.called_students, 0);
        assert_eq!(stats.remaining_students, 4);
        assert_eq!(stats.elapsed_ms, 0);
        assert_eq!(stats.start_time, None);
        assert_eq!(stats.progress_percent, 0);
    }

    #[test]
    fn repeats_collapse_and_remaining_depends_on_mode() {
        let start = Utc::now() - Duration::seconds(90);
        let history = vec![
            record(1, start),
            record(2, start + Duration::seconds(10)),
            record(1, start + Duration::seconds(20)),
        ];
        let now = start + Duration::seconds(90);

        let stats = project(3, 1, &history, false, now);
        assert_eq!(stats.called_students, 2);
        assert_eq!(stats.called_count, 3);
        assert_eq!(stats.remaining_students, 1);
        assert_eq!(stats.elapsed_ms, 90_000);
        assert_eq!(stats.progress_percent, 67);
        assert_eq!(format_elapsed(stats.elapsed_ms), "01:30");

        let stats = project(3, 3, &history, true, now);
        assert_eq!(stats.remaining_students, 3);
    }

    #[test]
    fn remaining_never_underflows() {
        let now = Utc::now();
        let history = vec![record(1, now), record(2, now)];
        // Scope narrowed after calling students outside it.
        let stats = project(1, 0, &history, false, now);
        assert_eq!(stats.remaining_students, 0);
    }

    #[test]
    fn formats_zero() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(61_999), "01:01");
    }
}
