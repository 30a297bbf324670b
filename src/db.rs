use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::daily;
use crate::error::Result;
use crate::models::{
    DailyEntry, DailySummary, DailyWrite, DayStat, Notification, RosterAttendance, RosterEntry,
    StudentIdentity, Subject,
};
use crate::store::{AttendanceStore, NotificationStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub const SEED_TEACHER_ID: &str = "6f1c2a8e-3b1d-4c55-9a0e-1f0d2b7c9e41";

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let teacher_id = Uuid::parse_str(SEED_TEACHER_ID)?;

    sqlx::query(
        r#"
        INSERT INTO attendance_analytics.users (id, name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind(teacher_id)
    .bind("Dr. Morgan Hale")
    .bind("morgan.hale@example.edu")
    .execute(pool)
    .await?;

    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Avery Lee",
            "avery.lee@example.edu",
            "1RV22CS001",
            Some("CS-001"),
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Jules Moreno",
            "jules.moreno@example.edu",
            "1RV22CS002",
            None,
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kiara Patel",
            "kiara.patel@example.edu",
            "1RV22CS003",
            Some("CS-003"),
        ),
    ];

    for (id, name, email, usn, roll_number) in &students {
        sqlx::query(
            r#"
            INSERT INTO attendance_analytics.users (id, name, email, usn)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, usn = EXCLUDED.usn
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(usn)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO attendance_analytics.student_profiles (user_id, roll_number)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET roll_number = EXCLUDED.roll_number
            "#,
        )
        .bind(id)
        .bind(roll_number)
        .execute(pool)
        .await?;
    }

    let subjects = vec![
        (
            Uuid::parse_str("a4f3c1d2-6e5b-4a79-8c10-2b3d4e5f6a71")?,
            "Data Structures",
            "CS201",
            [(42, 3), (35, 10), (28, 17)],
            [(41, 4), (36, 9)],
        ),
        (
            Uuid::parse_str("b7e6d5c4-3a2b-4190-8f7e-6d5c4b3a2910")?,
            "Operating Systems",
            "CS301",
            [(30, 12), (25, 17), (20, 22)],
            [(28, 16), (31, 13)],
        ),
    ];

    let today = Utc::now().date_naive();
    for (subject_id, name, code, roster_counts, daily_counts) in subjects {
        let roster: Vec<RosterEntry> = students
            .iter()
            .zip(roster_counts)
            .map(|((student_id, ..), (present, absent))| RosterEntry {
                student_id: *student_id,
                verified: true,
                attendance: RosterAttendance { present, absent },
            })
            .collect();

        sqlx::query(
            r#"
            INSERT INTO attendance_analytics.subjects (id, name, code, professor_ids, students)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, code = EXCLUDED.code,
                professor_ids = EXCLUDED.professor_ids, students = EXCLUDED.students
            "#,
        )
        .bind(subject_id)
        .bind(name)
        .bind(code)
        .bind(vec![teacher_id])
        .bind(Json(&roster))
        .execute(pool)
        .await?;

        let store = PgStore::new(pool.clone());
        for (offset, (present, absent)) in daily_counts.into_iter().enumerate() {
            let day: NaiveDate = today - Duration::days(offset as i64 * 35);
            daily::save_daily_summary(
                &store,
                subject_id,
                subject_id,
                Some(teacher_id),
                &day.format("%Y-%m-%d").to_string(),
                present,
                absent,
                1,
            )
            .await
            .context("failed to seed daily summary")?;
        }
    }

    info!(teacher = SEED_TEACHER_ID, "seed data inserted");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn day_stat_from(value: serde_json::Value) -> Result<DayStat> {
    Ok(serde_json::from_value(value)?)
}

fn subject_from_row(row: &PgRow) -> Result<Subject> {
    let students: serde_json::Value = row.try_get("students")?;
    Ok(Subject {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        professor_ids: row.try_get("professor_ids")?,
        students: serde_json::from_value(students)?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        message: row.try_get("message")?,
        kind: row.try_get("kind")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
        metadata: row.try_get("metadata")?,
    })
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn upsert_daily(&self, write: &DailyWrite) -> Result<()> {
        let now = Utc::now();
        // The conflict arm merges a single key into the row under its lock,
        // so writes to other dates of the same subject survive.
        sqlx::query(
            r#"
            INSERT INTO attendance_analytics.attendance_daily
            (subject_id, class_id, teacher_id, daily, created_at, updated_at)
            VALUES ($1, $2, $3, jsonb_build_object($4::text, $5::jsonb), $6, $6)
            ON CONFLICT (subject_id) DO UPDATE
            SET teacher_id = EXCLUDED.teacher_id,
                updated_at = EXCLUDED.updated_at,
                daily = attendance_daily.daily || jsonb_build_object($4::text, $5::jsonb)
            "#,
        )
        .bind(write.subject_id)
        .bind(write.class_id)
        .bind(write.teacher_id)
        .bind(&write.date)
        .bind(Json(&write.stat))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_daily(&self, subject_id: Uuid) -> Result<Option<DailySummary>> {
        let row = sqlx::query(
            r#"
            SELECT subject_id, class_id, teacher_id, daily, created_at, updated_at
            FROM attendance_analytics.attendance_daily
            WHERE subject_id = $1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: HashMap<String, serde_json::Value> =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("daily")?)?;
        let mut daily = HashMap::with_capacity(raw.len());
        for (date, value) in raw {
            daily.insert(date, day_stat_from(value)?);
        }

        Ok(Some(DailySummary {
            subject_id: row.try_get("subject_id")?,
            class_id: row.try_get("class_id")?,
            teacher_id: row.try_get("teacher_id")?,
            daily,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn daily_entries(&self, subject_ids: &[Uuid], limit: usize) -> Result<Vec<DailyEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT d.subject_id, e.key AS record_date, e.value AS stat
            FROM attendance_analytics.attendance_daily d
            CROSS JOIN LATERAL jsonb_each(d.daily) AS e
            WHERE d.subject_id = ANY($1)
            ORDER BY d.subject_id, e.key
            LIMIT $2
            "#,
        )
        .bind(subject_ids)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(DailyEntry {
                subject_id: row.try_get("subject_id")?,
                date: row.try_get("record_date")?,
                stat: day_stat_from(row.try_get("stat")?)?,
            });
        }
        Ok(entries)
    }

    async fn find_subject(&self, subject_id: Uuid) -> Result<Option<Subject>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, code, professor_ids, students
            FROM attendance_analytics.subjects
            WHERE id = $1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subject_from_row).transpose()
    }

    async fn subjects_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<Subject>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, code, professor_ids, students
            FROM attendance_analytics.subjects
            WHERE $1 = ANY(professor_ids)
            ORDER BY id
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subject_from_row).collect()
    }

    async fn user_names(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>> {
        let rows = sqlx::query("SELECT id, name FROM attendance_analytics.users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        let mut names = HashMap::with_capacity(rows.len());
        for row in rows {
            names.insert(row.try_get("id")?, row.try_get("name")?);
        }
        Ok(names)
    }

    async fn student_identities(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, StudentIdentity>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.usn, p.roll, p.roll_number
            FROM attendance_analytics.users u
            LEFT JOIN attendance_analytics.student_profiles p ON p.user_id = u.id
            WHERE u.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut identities = HashMap::with_capacity(rows.len());
        for row in rows {
            identities.insert(
                row.try_get("id")?,
                StudentIdentity {
                    name: row.try_get("name")?,
                    usn: row.try_get("usn")?,
                    roll: row.try_get("roll")?,
                    roll_number: row.try_get("roll_number")?,
                },
            );
        }
        Ok(identities)
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_analytics.notifications
            (id, user_id, message, kind, is_read, created_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.message)
        .bind(&notification.kind)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .bind(&notification.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        skip: u64,
        limit: u64,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, message, kind, is_read, created_at, metadata
            FROM attendance_analytics.notifications
            WHERE user_id = $1 AND (NOT $2 OR is_read = FALSE)
            ORDER BY created_at DESC
            OFFSET $3 LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(i64::try_from(skip).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn count_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM attendance_analytics.notifications
            WHERE user_id = $1 AND (NOT $2 OR is_read = FALSE)
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE attendance_analytics.notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE attendance_analytics.notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM attendance_analytics.notifications WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
