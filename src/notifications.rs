//! In-app notifications and at-risk alerts.

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::analytics;
use crate::auth;
use crate::error::{AnalyticsError, Result};
use crate::models::{CurrentUser, Notification, NotificationPage};
use crate::store::{AttendanceStore, NotificationStore};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }
}

pub async fn create_notification<N: NotificationStore + ?Sized>(
    store: &N,
    user_id: Uuid,
    message: &str,
    kind: NotificationKind,
    metadata: serde_json::Value,
) -> Result<Notification> {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id,
        message: message.to_string(),
        kind: kind.as_str().to_string(),
        is_read: false,
        created_at: Utc::now(),
        metadata,
    };
    store.insert_notification(&notification).await?;
    info!(id = %notification.id, %user_id, "notification created");
    Ok(notification)
}

pub async fn list_notifications<N: NotificationStore + ?Sized>(
    store: &N,
    user: &CurrentUser,
    skip: u64,
    limit: u64,
    unread_only: bool,
) -> Result<NotificationPage> {
    let user_id = auth::parse_id(&user.id, "user id")?;
    let limit = limit.clamp(1, MAX_PAGE_SIZE);

    let notifications = store
        .list_notifications(user_id, skip, limit, unread_only)
        .await?;
    let total = store.count_notifications(user_id, unread_only).await?;
    let unread_count = store.count_notifications(user_id, true).await?;
    let has_more = skip.saturating_add(notifications.len() as u64) < total;

    Ok(NotificationPage {
        notifications,
        total,
        unread_count,
        has_more,
    })
}

pub async fn unread_count<N: NotificationStore + ?Sized>(
    store: &N,
    user: &CurrentUser,
) -> Result<u64> {
    let user_id = auth::parse_id(&user.id, "user id")?;
    store.count_notifications(user_id, true).await
}

pub async fn mark_as_read<N: NotificationStore + ?Sized>(
    store: &N,
    user: &CurrentUser,
    notification_id: &str,
) -> Result<()> {
    let user_id = auth::parse_id(&user.id, "user id")?;
    let id = auth::parse_id(notification_id, "notification id")?;
    if !store.mark_notification_read(id, user_id).await? {
        return Err(AnalyticsError::NotFound(format!("notification {id}")));
    }
    Ok(())
}

pub async fn mark_all_as_read<N: NotificationStore + ?Sized>(
    store: &N,
    user: &CurrentUser,
) -> Result<u64> {
    let user_id = auth::parse_id(&user.id, "user id")?;
    let updated = store.mark_all_notifications_read(user_id).await?;
    info!(%user_id, updated, "notifications marked as read");
    Ok(updated)
}

pub async fn delete_notification<N: NotificationStore + ?Sized>(
    store: &N,
    user: &CurrentUser,
    notification_id: &str,
) -> Result<()> {
    let user_id = auth::parse_id(&user.id, "user id")?;
    let id = auth::parse_id(notification_id, "notification id")?;
    if !store.delete_notification(id, user_id).await? {
        return Err(AnalyticsError::NotFound(format!("notification {id}")));
    }
    Ok(())
}

/// Notifies the teacher once per at-risk subject they own.
pub async fn alert_at_risk_subjects<S, N>(
    store: &S,
    notes: &N,
    user: &CurrentUser,
    max_rows: usize,
) -> Result<Vec<Notification>>
where
    S: AttendanceStore + ?Sized,
    N: NotificationStore + ?Sized,
{
    let teacher_id = auth::require_teacher(user)?;
    let at_risk = analytics::class_risk(store, user, max_rows).await?;

    let mut created = Vec::with_capacity(at_risk.len());
    for rollup in at_risk {
        let message = format!(
            "{} ({}) attendance is at {:.2}%, below the 75% threshold",
            rollup.subject_name, rollup.subject_code, rollup.attendance_percentage
        );
        let metadata = json!({
            "subjectId": rollup.subject_id,
            "attendancePercentage": rollup.attendance_percentage,
            "lastRecorded": rollup.last_recorded,
        });
        created.push(
            create_notification(notes, teacher_id, &message, NotificationKind::Warning, metadata)
                .await?,
        );
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daily::save_daily_summary;
    use crate::models::Subject;
    use crate::store::memory::MemoryStore;

    fn user(id: Uuid, role: &str) -> CurrentUser {
        CurrentUser {
            id: id.to_string(),
            role: role.to_string(),
        }
    }

    #[tokio::test]
    async fn pagination_reports_totals_and_has_more() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        for i in 0..3 {
            create_notification(&store, owner, &format!("note {i}"), NotificationKind::Info, json!({}))
                .await
                .unwrap();
        }
        create_notification(&store, Uuid::new_v4(), "other", NotificationKind::Info, json!({}))
            .await
            .unwrap();

        let page = list_notifications(&store, &user(owner, "student"), 0, 2, false)
            .await
            .unwrap();
        assert_eq!(page.notifications.len(), 2);
        assert_eq!(page.total, 3);
        assert_eq!(page.unread_count, 3);
        assert!(page.has_more);

        let rest = list_notifications(&store, &user(owner, "student"), 2, 2, false)
            .await
            .unwrap();
        assert_eq!(rest.notifications.len(), 1);
        assert!(!rest.has_more);
    }

    #[tokio::test]
    async fn skip_past_the_end_reports_no_more() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        create_notification(&store, owner, "only", NotificationKind::Info, json!({}))
            .await
            .unwrap();

        let page = list_notifications(&store, &user(owner, "student"), u64::MAX, 20, false)
            .await
            .unwrap();
        assert!(page.notifications.is_empty());
        assert_eq!(page.total, 1);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn mark_read_and_delete_are_scoped_to_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let note = create_notification(&store, owner, "hello", NotificationKind::Success, json!({}))
            .await
            .unwrap();
        let id = note.id.to_string();

        assert!(matches!(
            mark_as_read(&store, &user(Uuid::new_v4(), "student"), &id).await,
            Err(AnalyticsError::NotFound(_))
        ));
        mark_as_read(&store, &user(owner, "student"), &id).await.unwrap();
        assert_eq!(unread_count(&store, &user(owner, "student")).await.unwrap(), 0);

        let unread = list_notifications(&store, &user(owner, "student"), 0, 20, true)
            .await
            .unwrap();
        assert!(unread.notifications.is_empty());

        delete_notification(&store, &user(owner, "student"), &id).await.unwrap();
        assert!(matches!(
            delete_notification(&store, &user(owner, "student"), &id).await,
            Err(AnalyticsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mark_all_counts_only_unread() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let first = create_notification(&store, owner, "a", NotificationKind::Info, json!({}))
            .await
            .unwrap();
        create_notification(&store, owner, "b", NotificationKind::Info, json!({}))
            .await
            .unwrap();
        mark_as_read(&store, &user(owner, "teacher"), &first.id.to_string())
            .await
            .unwrap();

        assert_eq!(mark_all_as_read(&store, &user(owner, "teacher")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn alerts_are_raised_for_at_risk_subjects_only() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let healthy = Uuid::new_v4();
        let struggling = Uuid::new_v4();
        for (id, name) in [(healthy, "Algebra"), (struggling, "Chemistry")] {
            store.add_subject(Subject {
                id,
                name: name.to_string(),
                code: name[..3].to_uppercase(),
                professor_ids: vec![owner],
                students: Vec::new(),
            });
        }
        save_daily_summary(&store, healthy, healthy, None, "2024-03-01", 9, 1, 0)
            .await
            .unwrap();
        save_daily_summary(&store, struggling, struggling, None, "2024-03-01", 6, 4, 0)
            .await
            .unwrap();

        let created = alert_at_risk_subjects(&store, &store, &user(owner, "teacher"), 100)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, "warning");
        assert!(created[0].message.starts_with("Chemistry (CHE)"));
        assert_eq!(created[0].metadata["attendancePercentage"], 60.0);
    }
}
