//! Which subjects a caller may see.
//!
//! A subject that does not exist and a subject the caller does not own both
//! yield `Forbidden`, so existence never leaks through the analytics surface.

use tracing::warn;
use uuid::Uuid;

use crate::error::{AnalyticsError, Result};
use crate::models::{CurrentUser, Subject};
use crate::store::AttendanceStore;

pub const TEACHER_ROLE: &str = "teacher";

/// Sentinel accepted wherever a subject scope is expected.
pub const ALL_SUBJECTS: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectScope {
    All,
    Single(Uuid),
}

impl SubjectScope {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.eq_ignore_ascii_case(ALL_SUBJECTS) {
            return Ok(SubjectScope::All);
        }
        parse_id(raw, "subject id").map(SubjectScope::Single)
    }
}

pub fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AnalyticsError::InvalidArgument(format!("invalid {what}: {raw}")))
}

/// Checks the role and returns the caller's teacher id.
pub fn require_teacher(user: &CurrentUser) -> Result<Uuid> {
    if user.role != TEACHER_ROLE {
        warn!(user = %user.id, role = %user.role, "non-teacher denied analytics access");
        return Err(AnalyticsError::Forbidden(
            "only teachers can access analytics".to_string(),
        ));
    }
    parse_id(&user.id, "user id")
}

/// Loads a subject the teacher belongs to.
pub async fn owned_subject<S: AttendanceStore + ?Sized>(
    store: &S,
    teacher_id: Uuid,
    subject_id: Uuid,
) -> Result<Subject> {
    match store.find_subject(subject_id).await? {
        Some(subject) if subject.is_owned_by(teacher_id) => Ok(subject),
        _ => {
            warn!(%teacher_id, %subject_id, "subject access denied");
            Err(AnalyticsError::Forbidden(
                "not authorized to view this subject".to_string(),
            ))
        }
    }
}

/// Resolves a scope to the list of subjects it covers for this teacher.
pub async fn scoped_subjects<S: AttendanceStore + ?Sized>(
    store: &S,
    teacher_id: Uuid,
    scope: SubjectScope,
) -> Result<Vec<Subject>> {
    match scope {
        SubjectScope::All => store.subjects_for_teacher(teacher_id).await,
        SubjectScope::Single(subject_id) => {
            Ok(vec![owned_subject(store, teacher_id, subject_id).await?])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn teacher(id: Uuid) -> CurrentUser {
        CurrentUser {
            id: id.to_string(),
            role: TEACHER_ROLE.to_string(),
        }
    }

    fn subject(id: Uuid, professors: Vec<Uuid>) -> Subject {
        Subject {
            id,
            name: "Physics".to_string(),
            code: "PHY101".to_string(),
            professor_ids: professors,
            students: Vec::new(),
        }
    }

    #[test]
    fn students_are_forbidden() {
        let user = CurrentUser {
            id: Uuid::new_v4().to_string(),
            role: "student".to_string(),
        };
        assert!(matches!(require_teacher(&user), Err(AnalyticsError::Forbidden(_))));
    }

    #[test]
    fn malformed_teacher_id_is_invalid_argument() {
        let user = CurrentUser {
            id: "not-a-uuid".to_string(),
            role: TEACHER_ROLE.to_string(),
        };
        assert!(matches!(
            require_teacher(&user),
            Err(AnalyticsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn scope_parses_sentinel_and_ids() {
        let id = Uuid::new_v4();
        assert_eq!(SubjectScope::parse("all").unwrap(), SubjectScope::All);
        assert_eq!(SubjectScope::parse(&id.to_string()).unwrap(), SubjectScope::Single(id));
        assert!(matches!(
            SubjectScope::parse("physics"),
            Err(AnalyticsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn ownership_is_required_regardless_of_existence() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let subject_id = Uuid::new_v4();
        store.add_subject(subject(subject_id, vec![owner]));

        assert!(owned_subject(&store, owner, subject_id).await.is_ok());
        assert!(matches!(
            owned_subject(&store, outsider, subject_id).await,
            Err(AnalyticsError::Forbidden(_))
        ));
        assert!(matches!(
            owned_subject(&store, owner, Uuid::new_v4()).await,
            Err(AnalyticsError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn all_scope_lists_only_owned_subjects() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.add_subject(subject(Uuid::new_v4(), vec![owner]));
        store.add_subject(subject(Uuid::new_v4(), vec![owner, Uuid::new_v4()]));
        store.add_subject(subject(Uuid::new_v4(), vec![Uuid::new_v4()]));

        let user = teacher(owner);
        let teacher_id = require_teacher(&user).unwrap();
        let subjects = scoped_subjects(&store, teacher_id, SubjectScope::All)
            .await
            .unwrap();
        assert_eq!(subjects.len(), 2);
    }
}
