//! Persistence seams consumed by the analytics engine.
//!
//! The Postgres implementation lives in `db.rs`; tests run against the
//! in-memory store below.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    DailyEntry, DailySummary, DailyWrite, Notification, StudentIdentity, Subject,
};

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Upsert keyed by subject: sets `teacher_id`, `updated_at` and the single
    /// `daily[date]` entry. `class_id` and `created_at` are only written when
    /// the document is created.
    async fn upsert_daily(&self, write: &DailyWrite) -> Result<()>;

    async fn find_daily(&self, subject_id: Uuid) -> Result<Option<DailySummary>>;

    /// Unwinds the `daily` maps of the given subjects into one row per date
    /// entry, ordered by `(subject_id, date)` and capped at `limit` rows.
    async fn daily_entries(&self, subject_ids: &[Uuid], limit: usize) -> Result<Vec<DailyEntry>>;

    async fn find_subject(&self, subject_id: Uuid) -> Result<Option<Subject>>;

    /// Every subject whose `professor_ids` contains `teacher_id`.
    async fn subjects_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<Subject>>;

    async fn user_names(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>>;

    async fn student_identities(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, StudentIdentity>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    /// Newest first.
    async fn list_notifications(
        &self,
        user_id: Uuid,
        skip: u64,
        limit: u64,
        unread_only: bool,
    ) -> Result<Vec<Notification>>;

    async fn count_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<u64>;

    /// Returns false when no notification with that id belongs to the user.
    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64>;

    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<bool>;
}
