//! Rollups over the daily summaries and the subject rosters.
//!
//! The async entry points resolve the caller's scope and fetch documents;
//! everything after that is plain functions over the fetched rows.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{self, SubjectScope};
use crate::error::{AnalyticsError, Result};
use crate::models::{
    AttendanceTrend, CurrentUser, DailyEntry, Distribution, GlobalStats, MonthlyRow,
    RosterEntry, StudentStat, Subject, SubjectLeaderboard, SubjectRollup, TrendPoint,
};
use crate::risk;
use crate::store::AttendanceStore;

pub const DEFAULT_MAX_AGGREGATION_ROWS: usize = 10_000;
pub const LEADERBOARD_SIZE: usize = 5;
pub const TOP_PERFORMERS_SIZE: usize = 5;

const UNKNOWN_NAME: &str = "Unknown";
const UNKNOWN_CODE: &str = "N/A";

/// Parses a `YYYY-MM-DD` day, rejecting anything that is not zero-padded.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    // chrono tolerates signs, padding and one-digit fields; only the
    // canonical spelling is a valid key.
    (day.format("%Y-%m-%d").to_string() == raw).then_some(day)
}

fn parse_range(date_from: &str, date_to: &str) -> Result<(NaiveDate, NaiveDate)> {
    let from = parse_day(date_from).ok_or_else(|| {
        AnalyticsError::InvalidArgument(format!("invalid dateFrom {date_from}, use YYYY-MM-DD"))
    })?;
    let to = parse_day(date_to).ok_or_else(|| {
        AnalyticsError::InvalidArgument(format!("invalid dateTo {date_to}, use YYYY-MM-DD"))
    })?;
    if from > to {
        return Err(AnalyticsError::InvalidArgument(
            "dateFrom must not be after dateTo".to_string(),
        ));
    }
    Ok((from, to))
}

/// Drops entries whose key is not a calendar day.
fn valid_entries<'a>(
    entries: &'a [DailyEntry],
) -> impl Iterator<Item = (&'a DailyEntry, NaiveDate)> + 'a {
    entries.iter().filter_map(|entry| match parse_day(&entry.date) {
        Some(day) => Some((entry, day)),
        None => {
            warn!(subject_id = %entry.subject_id, key = %entry.date, "skipping malformed date key");
            None
        }
    })
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    present: i64,
    absent: i64,
    late: i64,
    total: i64,
    days: usize,
}

impl Totals {
    fn add(&mut self, entry: &DailyEntry) {
        self.present += entry.stat.present;
        self.absent += entry.stat.absent;
        self.late += entry.stat.late;
        self.total += entry.stat.total;
        self.days += 1;
    }

    fn percentage(&self) -> f64 {
        risk::percentage_2dp(self.present, self.total)
    }
}

pub fn student_leaderboard(
    students: &[RosterEntry],
    names: &HashMap<Uuid, String>,
) -> SubjectLeaderboard {
    let mut stats = Vec::with_capacity(students.len());
    let mut percentage_sum = 0.0;
    let mut counted = 0usize;
    let mut risk_count = 0usize;

    for entry in students {
        let present = entry.attendance.present;
        let total = present + entry.attendance.absent;
        let percentage = risk::percentage(present, total);

        stats.push(StudentStat {
            id: entry.student_id.to_string(),
            name: names
                .get(&entry.student_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            score: risk::round_to(percentage, 1),
        });

        // Students with no classes yet stay out of the average but still
        // count toward risk at 0%.
        if total > 0 {
            percentage_sum += percentage;
            counted += 1;
        }
        if risk::is_at_risk(percentage) {
            risk_count += 1;
        }
    }

    let attendance = if counted > 0 {
        risk::round_to(percentage_sum / counted as f64, 1)
    } else {
        0.0
    };

    let mut best = stats.clone();
    best.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    best.truncate(LEADERBOARD_SIZE);

    let mut needs_support = stats;
    needs_support
        .sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
    needs_support.truncate(LEADERBOARD_SIZE);

    SubjectLeaderboard {
        attendance,
        risk_count,
        best_performing: best,
        needs_support,
    }
}

/// Sums entries sharing a day across subjects and recomputes the percentage
/// from the summed counts.
pub fn trend_points(entries: &[DailyEntry], from: NaiveDate, to: NaiveDate) -> Vec<TrendPoint> {
    let mut by_day: BTreeMap<NaiveDate, Totals> = BTreeMap::new();
    for (entry, day) in valid_entries(entries) {
        if day < from || day > to {
            continue;
        }
        by_day.entry(day).or_default().add(entry);
    }

    by_day
        .into_iter()
        .map(|(day, totals)| TrendPoint {
            date: day.format("%Y-%m-%d").to_string(),
            present: totals.present,
            absent: totals.absent,
            late: totals.late,
            total: totals.total,
            percentage: totals.percentage(),
        })
        .collect()
}

/// Breakdown of the last point only.
pub fn last_day_distribution(points: &[TrendPoint]) -> Option<Distribution> {
    let last = points.last()?;
    Some(Distribution {
        date: last.date.clone(),
        present: risk::percentage_2dp(last.present, last.total),
        absent: risk::percentage_2dp(last.absent, last.total),
        late: risk::percentage_2dp(last.late, last.total),
    })
}

/// Groups entries by subject and `YYYY-MM`, most recent month first.
pub fn monthly_rows(entries: &[DailyEntry]) -> Vec<MonthlyRow> {
    let mut groups: BTreeMap<(Uuid, String), Totals> = BTreeMap::new();
    for (entry, _) in valid_entries(entries) {
        let month = entry.date[..7].to_string();
        groups.entry((entry.subject_id, month)).or_default().add(entry);
    }

    let mut rows: Vec<MonthlyRow> = groups
        .into_iter()
        .map(|((subject_id, month), totals)| MonthlyRow {
            subject_id,
            month,
            total_present: totals.present,
            total_absent: totals.absent,
            total_late: totals.late,
            total_students: totals.total,
            days_recorded: totals.days,
            average_percentage: totals.percentage(),
        })
        .collect();
    rows.sort_by(|a, b| b.month.cmp(&a.month));
    rows
}

/// Whole-history totals per subject, in subject id order. Subjects without
/// any valid entry produce no row.
pub fn subject_rollups(
    entries: &[DailyEntry],
    subjects: &HashMap<Uuid, &Subject>,
) -> Vec<SubjectRollup> {
    let mut groups: BTreeMap<Uuid, (Totals, String)> = BTreeMap::new();
    for (entry, _) in valid_entries(entries) {
        let (totals, last) = groups.entry(entry.subject_id).or_default();
        totals.add(entry);
        if entry.date > *last {
            *last = entry.date.clone();
        }
    }

    groups
        .into_iter()
        .map(|(subject_id, (totals, last_recorded))| {
            let subject = subjects.get(&subject_id);
            SubjectRollup {
                subject_id,
                subject_name: subject
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                subject_code: subject
                    .map(|s| s.code.clone())
                    .unwrap_or_else(|| UNKNOWN_CODE.to_string()),
                attendance_percentage: totals.percentage(),
                total_present: totals.present,
                total_absent: totals.absent,
                total_late: totals.late,
                total_students: totals.total,
                last_recorded,
            }
        })
        .collect()
}

fn sort_descending(rollups: &mut [SubjectRollup]) {
    rollups.sort_by(|a, b| {
        b.attendance_percentage
            .partial_cmp(&a.attendance_percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// At-risk subjects, worst first.
pub fn risk_list(rollups: Vec<SubjectRollup>) -> Vec<SubjectRollup> {
    let mut at_risk: Vec<SubjectRollup> = rollups
        .into_iter()
        .filter(|rollup| risk::is_at_risk(rollup.attendance_percentage))
        .collect();
    at_risk.sort_by(|a, b| {
        a.attendance_percentage
            .partial_cmp(&b.attendance_percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    at_risk
}

pub fn top_performers(mut rollups: Vec<SubjectRollup>) -> Vec<SubjectRollup> {
    sort_descending(&mut rollups);
    rollups.truncate(TOP_PERFORMERS_SIZE);
    rollups
}

/// Every subject weighs the same in `overall_attendance`.
pub fn dashboard(mut rollups: Vec<SubjectRollup>) -> GlobalStats {
    sort_descending(&mut rollups);
    let overall_attendance = if rollups.is_empty() {
        0.0
    } else {
        let sum: f64 = rollups.iter().map(|r| r.attendance_percentage).sum();
        risk::round_to(sum / rollups.len() as f64, 2)
    };
    let risk_count = rollups
        .iter()
        .filter(|r| risk::is_at_risk(r.attendance_percentage))
        .count();

    GlobalStats {
        overall_attendance,
        risk_count,
        top_subjects: rollups,
    }
}

/// Unwinds the daily maps of `subject_ids`, failing rather than truncating
/// when more than `max_rows` entries exist.
pub async fn fetch_entries<S: AttendanceStore + ?Sized>(
    store: &S,
    subject_ids: &[Uuid],
    max_rows: usize,
) -> Result<Vec<DailyEntry>> {
    if subject_ids.is_empty() {
        return Ok(Vec::new());
    }
    let entries = store
        .daily_entries(subject_ids, max_rows.saturating_add(1))
        .await?;
    if entries.len() > max_rows {
        warn!(subjects = subject_ids.len(), limit = max_rows, "aggregation fan-out exceeded limit");
        return Err(AnalyticsError::ResourceLimit { limit: max_rows });
    }
    debug!(subjects = subject_ids.len(), rows = entries.len(), "daily entries unwound");
    Ok(entries)
}

pub async fn subject_leaderboard<S: AttendanceStore + ?Sized>(
    store: &S,
    user: &CurrentUser,
    subject_id: &str,
) -> Result<SubjectLeaderboard> {
    let teacher_id = auth::require_teacher(user)?;
    let subject_id = auth::parse_id(subject_id, "subject id")?;
    let subject = auth::owned_subject(store, teacher_id, subject_id).await?;

    if subject.students.is_empty() {
        return Ok(student_leaderboard(&[], &HashMap::new()));
    }

    let student_ids: Vec<Uuid> = subject.students.iter().map(|s| s.student_id).collect();
    let names = store.user_names(&student_ids).await?;
    Ok(student_leaderboard(&subject.students, &names))
}

pub async fn attendance_trend<S: AttendanceStore + ?Sized>(
    store: &S,
    user: &CurrentUser,
    scope: &str,
    date_from: &str,
    date_to: &str,
    max_rows: usize,
) -> Result<AttendanceTrend> {
    let (from, to) = parse_range(date_from, date_to)?;
    let teacher_id = auth::require_teacher(user)?;
    let parsed_scope = SubjectScope::parse(scope)?;

    let entries = match parsed_scope {
        SubjectScope::All => {
            let subjects = store.subjects_for_teacher(teacher_id).await?;
            let ids: Vec<Uuid> = subjects.iter().map(|s| s.id).collect();
            fetch_entries(store, &ids, max_rows).await?
        }
        SubjectScope::Single(subject_id) => {
            auth::owned_subject(store, teacher_id, subject_id).await?;
            store
                .find_daily(subject_id)
                .await?
                .map(|doc| {
                    doc.daily
                        .into_iter()
                        .map(|(date, stat)| DailyEntry {
                            subject_id,
                            date,
                            stat,
                        })
                        .collect()
                })
                .unwrap_or_default()
        }
    };

    let data = trend_points(&entries, from, to);
    let distribution = last_day_distribution(&data);
    Ok(AttendanceTrend {
        scope: scope.to_string(),
        date_from: from,
        date_to: to,
        data,
        distribution,
    })
}

pub async fn monthly_summary<S: AttendanceStore + ?Sized>(
    store: &S,
    user: &CurrentUser,
    subject_id: Option<&str>,
    max_rows: usize,
) -> Result<Vec<MonthlyRow>> {
    let teacher_id = auth::require_teacher(user)?;
    let scope = match subject_id {
        Some(raw) => SubjectScope::Single(auth::parse_id(raw, "subject id")?),
        None => SubjectScope::All,
    };
    let subjects = auth::scoped_subjects(store, teacher_id, scope).await?;
    let ids: Vec<Uuid> = subjects.iter().map(|s| s.id).collect();
    let entries = fetch_entries(store, &ids, max_rows).await?;
    Ok(monthly_rows(&entries))
}

async fn owned_rollups<S: AttendanceStore + ?Sized>(
    store: &S,
    user: &CurrentUser,
    max_rows: usize,
) -> Result<Vec<SubjectRollup>> {
    let teacher_id = auth::require_teacher(user)?;
    let subjects = store.subjects_for_teacher(teacher_id).await?;
    let ids: Vec<Uuid> = subjects.iter().map(|s| s.id).collect();
    let entries = fetch_entries(store, &ids, max_rows).await?;
    let by_id: HashMap<Uuid, &Subject> = subjects.iter().map(|s| (s.id, s)).collect();
    Ok(subject_rollups(&entries, &by_id))
}

pub async fn class_risk<S: AttendanceStore + ?Sized>(
    store: &S,
    user: &CurrentUser,
    max_rows: usize,
) -> Result<Vec<SubjectRollup>> {
    Ok(risk_list(owned_rollups(store, user, max_rows).await?))
}

pub async fn top_performing<S: AttendanceStore + ?Sized>(
    store: &S,
    user: &CurrentUser,
    max_rows: usize,
) -> Result<Vec<SubjectRollup>> {
    Ok(top_performers(owned_rollups(store, user, max_rows).await?))
}

pub async fn global_stats<S: AttendanceStore + ?Sized>(
    store: &S,
    user: &CurrentUser,
    max_rows: usize,
) -> Result<GlobalStats> {
    Ok(dashboard(owned_rollups(store, user, max_rows).await?))
}
