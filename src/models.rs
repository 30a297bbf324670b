use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One day of attendance for a subject, as stored under `daily[date]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DayStat {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub percentage: f64,
}

/// Sparse per-subject time series. One document per subject.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub subject_id: Uuid,
    pub class_id: Uuid,
    pub teacher_id: Option<Uuid>,
    /// Unordered; use [`DailySummary::sorted_days`] when order matters.
    pub daily: HashMap<String, DayStat>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailySummary {
    pub fn sorted_days(&self) -> Vec<(&str, &DayStat)> {
        let mut days: Vec<(&str, &DayStat)> = self
            .daily
            .iter()
            .map(|(date, stat)| (date.as_str(), stat))
            .collect();
        days.sort_by(|a, b| a.0.cmp(b.0));
        days
    }
}

/// Input of a daily write.
#[derive(Debug, Clone)]
pub struct DailyWrite {
    pub subject_id: Uuid,
    pub class_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub date: String,
    pub stat: DayStat,
}

/// A single `daily` map entry unwound from its document.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyEntry {
    pub subject_id: Uuid,
    pub date: String,
    pub stat: DayStat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterAttendance {
    pub present: i64,
    pub absent: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: Uuid,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub attendance: RosterAttendance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub professor_ids: Vec<Uuid>,
    pub students: Vec<RosterEntry>,
}

impl Subject {
    pub fn is_owned_by(&self, teacher_id: Uuid) -> bool {
        self.professor_ids.contains(&teacher_id)
    }
}

/// Identity already resolved by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub role: String,
}

/// Directory view of a student used by the CSV export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentIdentity {
    pub name: Option<String>,
    pub usn: Option<String>,
    pub roll: Option<String>,
    pub roll_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentStat {
    pub id: String,
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLeaderboard {
    pub attendance: f64,
    pub risk_count: usize,
    pub best_performing: Vec<StudentStat>,
    pub needs_support: Vec<StudentStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: String,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub percentage: f64,
}

/// Present/absent/late share of the last day in a trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub date: String,
    pub present: f64,
    pub absent: f64,
    pub late: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTrend {
    pub scope: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub data: Vec<TrendPoint>,
    pub distribution: Option<Distribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRow {
    pub subject_id: Uuid,
    pub month: String,
    pub total_present: i64,
    pub total_absent: i64,
    pub total_late: i64,
    pub total_students: i64,
    pub days_recorded: usize,
    pub average_percentage: f64,
}

/// Whole-history totals for one subject, shared by the risk list,
/// top performers and the teacher dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRollup {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub subject_code: String,
    pub attendance_percentage: f64,
    pub total_present: i64,
    pub total_absent: i64,
    pub total_late: i64,
    pub total_students: i64,
    pub last_recorded: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStats {
    pub overall_attendance: f64,
    pub risk_count: usize,
    pub top_subjects: Vec<SubjectRollup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: u64,
    pub unread_count: u64,
    pub has_more: bool,
}
