use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::auth;
use crate::error::{AnalyticsError, Result};
use crate::models::{CurrentUser, GlobalStats, MonthlyRow, StudentIdentity, Subject, SubjectRollup};
use crate::risk::{self, AttendanceStatus};
use crate::store::AttendanceStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Student Name")]
    pub name: String,
    #[serde(rename = "Roll No")]
    pub roll: String,
    #[serde(rename = "Total Classes")]
    pub total: i64,
    #[serde(rename = "Attended")]
    pub present: i64,
    #[serde(rename = "Percentage")]
    pub percentage: String,
    #[serde(rename = "Status")]
    pub status: String,
}

/// Renders `80.0` as `80.0%` and `66.67` as `66.67%`.
pub fn format_percentage(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}%")
    } else {
        format!("{value}%")
    }
}

fn resolve_roll(identity: Option<&StudentIdentity>) -> String {
    identity
        .and_then(|identity| {
            [&identity.roll_number, &identity.roll, &identity.usn]
                .into_iter()
                .flatten()
                .find(|value| !value.is_empty())
                .cloned()
        })
        .unwrap_or_else(|| "N/A".to_string())
}

/// One row per verified roster entry, in roster order.
pub fn export_rows(subject: &Subject, identities: &HashMap<Uuid, StudentIdentity>) -> Vec<ExportRow> {
    subject
        .students
        .iter()
        .filter(|entry| entry.verified)
        .map(|entry| {
            let identity = identities.get(&entry.student_id);
            let present = entry.attendance.present;
            let total = present + entry.attendance.absent;
            let percentage = risk::percentage_2dp(present, total);
            ExportRow {
                name: identity
                    .and_then(|identity| identity.name.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                roll: resolve_roll(identity),
                total,
                present,
                percentage: format_percentage(percentage),
                status: AttendanceStatus::classify(percentage).to_string(),
            }
        })
        .collect()
}

pub fn write_csv(rows: &[ExportRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record([
            "Student Name",
            "Roll No",
            "Total Classes",
            "Attended",
            "Percentage",
            "Status",
        ])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| AnalyticsError::Export(err.into_error().into()))
}

pub fn export_filename(code: &str, date: NaiveDate) -> String {
    let code = if code.is_empty() { "subject" } else { code };
    format!("attendance_report_{code}_{}.csv", date.format("%Y-%m-%d"))
}

pub struct SubjectExport {
    pub filename: String,
    pub contents: Vec<u8>,
}

pub async fn export_subject_csv<S: AttendanceStore + ?Sized>(
    store: &S,
    user: &CurrentUser,
    subject_id: &str,
    date: NaiveDate,
) -> Result<SubjectExport> {
    let teacher_id = auth::require_teacher(user)?;
    let subject_id = auth::parse_id(subject_id, "subject id")?;
    let subject = auth::owned_subject(store, teacher_id, subject_id).await?;

    let verified: Vec<Uuid> = subject
        .students
        .iter()
        .filter(|entry| entry.verified)
        .map(|entry| entry.student_id)
        .collect();
    let identities = store.student_identities(&verified).await?;
    let rows = export_rows(&subject, &identities);

    Ok(SubjectExport {
        filename: export_filename(&subject.code, date),
        contents: write_csv(&rows)?,
    })
}

pub fn build_report(
    teacher_label: &str,
    generated_on: NaiveDate,
    stats: &GlobalStats,
    at_risk: &[SubjectRollup],
    monthly: &[MonthlyRow],
) -> String {
    let names: HashMap<Uuid, &str> = stats
        .top_subjects
        .iter()
        .map(|subject| (subject.subject_id, subject.subject_name.as_str()))
        .collect();

    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(output, "Generated for {} on {}", teacher_label, generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Overall attendance: {:.2}%", stats.overall_attendance);
    let _ = writeln!(output, "- Subjects at risk: {}", stats.risk_count);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    if stats.top_subjects.is_empty() {
        let _ = writeln!(output, "No attendance recorded yet.");
    } else {
        for subject in stats.top_subjects.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): {:.2}% across {} marks, last recorded {}",
                subject.subject_name,
                subject.subject_code,
                subject.attendance_percentage,
                subject.total_students,
                subject.last_recorded
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects Needing Attention");

    if at_risk.is_empty() {
        let _ = writeln!(output, "No subjects below the {:.0}% threshold.", risk::RISK_THRESHOLD);
    } else {
        for subject in at_risk {
            let _ = writeln!(
                output,
                "- {} ({}) at {:.2}% ({} present, {} absent, {} late)",
                subject.subject_name,
                subject.subject_code,
                subject.attendance_percentage,
                subject.total_present,
                subject.total_absent,
                subject.total_late
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Summary");

    if monthly.is_empty() {
        let _ = writeln!(output, "No monthly data.");
    } else {
        for row in monthly {
            let _ = writeln!(
                output,
                "- {} {}: {:.2}% over {} days",
                row.month,
                names.get(&row.subject_id).copied().unwrap_or("Unknown"),
                row.average_percentage,
                row.days_recorded
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RosterAttendance, RosterEntry};
    use crate::store::memory::MemoryStore;

    fn entry(student_id: Uuid, verified: bool, present: i64, absent: i64) -> RosterEntry {
        RosterEntry {
            student_id,
            verified,
            attendance: RosterAttendance { present, absent },
        }
    }

    #[test]
    fn percentages_render_like_stored_values() {
        assert_eq!(format_percentage(80.0), "80.0%");
        assert_eq!(format_percentage(66.67), "66.67%");
        assert_eq!(format_percentage(0.0), "0.0%");
    }

    #[test]
    fn roll_prefers_profile_fields_then_usn() {
        let full = StudentIdentity {
            name: None,
            usn: Some("USN123".to_string()),
            roll: Some("R-9".to_string()),
            roll_number: Some("Roll-001".to_string()),
        };
        assert_eq!(resolve_roll(Some(&full)), "Roll-001");

        let usn_only = StudentIdentity {
            usn: Some("USN123".to_string()),
            roll_number: Some(String::new()),
            ..StudentIdentity::default()
        };
        assert_eq!(resolve_roll(Some(&usn_only)), "USN123");
        assert_eq!(resolve_roll(None), "N/A");
    }

    #[test]
    fn export_skips_unverified_and_labels_status() {
        let good = Uuid::new_v4();
        let warning = Uuid::new_v4();
        let risky = Uuid::new_v4();
        let subject = Subject {
            id: Uuid::new_v4(),
            name: "Math 101".to_string(),
            code: "MATH101".to_string(),
            professor_ids: Vec::new(),
            students: vec![
                entry(good, true, 8, 2),
                entry(Uuid::new_v4(), false, 10, 0),
                entry(warning, true, 2, 1),
                entry(risky, true, 1, 1),
            ],
        };
        let mut identities = HashMap::new();
        identities.insert(
            good,
            StudentIdentity {
                name: Some("Student A".to_string()),
                usn: Some("USN123".to_string()),
                roll: None,
                roll_number: Some("Roll-001".to_string()),
            },
        );

        let rows = export_rows(&subject, &identities);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "Student A");
        assert_eq!(rows[0].roll, "Roll-001");
        assert_eq!(rows[0].total, 10);
        assert_eq!(rows[0].percentage, "80.0%");
        assert_eq!(rows[0].status, "Good");
        assert_eq!(rows[1].name, "Unknown");
        assert_eq!(rows[1].percentage, "66.67%");
        assert_eq!(rows[1].status, "Warning");
        assert_eq!(rows[2].status, "At Risk");

        let csv = String::from_utf8(write_csv(&rows).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Student Name,Roll No,Total Classes,Attended,Percentage,Status")
        );
        assert_eq!(lines.next(), Some("Student A,Roll-001,10,8,80.0%,Good"));
    }

    #[test]
    fn empty_export_still_has_headers() {
        let csv = String::from_utf8(write_csv(&[]).unwrap()).unwrap();
        assert_eq!(
            csv.trim_end(),
            "Student Name,Roll No,Total Classes,Attended,Percentage,Status"
        );
    }

    #[tokio::test]
    async fn export_requires_ownership() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let subject_id = Uuid::new_v4();
        store.add_subject(Subject {
            id: subject_id,
            name: "Math 101".to_string(),
            code: "MATH101".to_string(),
            professor_ids: vec![owner],
            students: vec![entry(Uuid::new_v4(), true, 8, 2)],
        });
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let outsider = CurrentUser {
            id: Uuid::new_v4().to_string(),
            role: "teacher".to_string(),
        };
        assert!(matches!(
            export_subject_csv(&store, &outsider, &subject_id.to_string(), date).await,
            Err(AnalyticsError::Forbidden(_))
        ));

        let teacher = CurrentUser {
            id: owner.to_string(),
            role: "teacher".to_string(),
        };
        let export = export_subject_csv(&store, &teacher, &subject_id.to_string(), date)
            .await
            .unwrap();
        assert_eq!(export.filename, "attendance_report_MATH101_2024-03-01.csv");
        assert!(String::from_utf8(export.contents).unwrap().contains("Unknown,N/A,10,8,80.0%,Good"));
    }

    #[test]
    fn report_lists_sections() {
        let subject_id = Uuid::new_v4();
        let rollup = SubjectRollup {
            subject_id,
            subject_name: "Chemistry".to_string(),
            subject_code: "CHEM1".to_string(),
            attendance_percentage: 60.0,
            total_present: 6,
            total_absent: 4,
            total_late: 0,
            total_students: 10,
            last_recorded: "2024-03-01".to_string(),
        };
        let stats = GlobalStats {
            overall_attendance: 60.0,
            risk_count: 1,
            top_subjects: vec![rollup.clone()],
        };
        let monthly = vec![MonthlyRow {
            subject_id,
            month: "2024-03".to_string(),
            total_present: 6,
            total_absent: 4,
            total_late: 0,
            total_students: 10,
            days_recorded: 1,
            average_percentage: 60.0,
        }];

        let report = build_report(
            "Dr. Hale",
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            &stats,
            &[rollup],
            &monthly,
        );
        assert!(report.contains("- Overall attendance: 60.00%"));
        assert!(report.contains("- Chemistry (CHEM1) at 60.00% (6 present, 4 absent, 0 late)"));
        assert!(report.contains("- 2024-03 Chemistry: 60.00% over 1 days"));
    }

    #[test]
    fn empty_report_has_placeholders() {
        let stats = GlobalStats {
            overall_attendance: 0.0,
            risk_count: 0,
            top_subjects: Vec::new(),
        };
        let report = build_report(
            "Dr. Hale",
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            &stats,
            &[],
            &[],
        );
        assert!(report.contains("No attendance recorded yet."));
        assert!(report.contains("No subjects below the 75% threshold."));
        assert!(report.contains("No monthly data."));
    }
}
