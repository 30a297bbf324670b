//! Write and read paths of the per-subject daily summary.

use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{DailySummary, DailyWrite, DayStat};
use crate::risk;
use crate::store::AttendanceStore;

pub fn day_stat(present: i64, absent: i64, late: i64) -> DayStat {
    let total = present + absent + late;
    DayStat {
        present,
        absent,
        late,
        total,
        percentage: risk::percentage_2dp(present, total),
    }
}

/// Records one day for a subject. Re-issuing the same write leaves the
/// stored entry unchanged; other dates are never touched. The date key is
/// stored as given.
#[allow(clippy::too_many_arguments)]
pub async fn save_daily_summary<S: AttendanceStore + ?Sized>(
    store: &S,
    subject_id: Uuid,
    class_id: Uuid,
    teacher_id: Option<Uuid>,
    date: &str,
    present: i64,
    absent: i64,
    late: i64,
) -> Result<DayStat> {
    let stat = day_stat(present, absent, late);
    let write = DailyWrite {
        subject_id,
        class_id,
        teacher_id,
        date: date.to_string(),
        stat,
    };
    store.upsert_daily(&write).await?;
    info!(%subject_id, date, total = stat.total, percentage = stat.percentage, "daily summary saved");
    Ok(stat)
}

pub async fn read_daily_summary<S: AttendanceStore + ?Sized>(
    store: &S,
    subject_id: Uuid,
) -> Result<Option<DailySummary>> {
    store.find_daily(subject_id).await
}
