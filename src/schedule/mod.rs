pub mod parser;

use chrono::NaiveDate;

use crate::{
    database::{Database, Filter, Store, StoreError},
    libs::time::{format_naive, TimeFormat},
    patch,
};

pub use self::parser::{extract_scheduled_time, RemarkTime};

/// 备注同步后改期的数量
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rescheduled {
    pub meetings: usize,
    pub visits: usize,
}

fn reschedule(
    store: &dyn Store,
    table: &'static str,
    lead_id: &str,
    remark: &str,
    at: &str,
) -> Result<usize, StoreError> {
    let pending = store.select(
        table,
        &[Filter::eq("lead_id", lead_id), Filter::ne("status", "completed")],
        None,
    )?;
    for row in &pending {
        let Some(id) = row.get("id").and_then(|v| v.as_str()) else {
            continue;
        };
        store.update(
            table,
            &[Filter::eq("id", id)],
            patch! {"remark" => remark, "scheduled_at" => at, "status" => "scheduled"},
        )?;
    }
    Ok(pending.len())
}

/// 备注提到 meeting 或 visit 且包含可解析的时间时，改期该客户所有未完成的预约
pub fn sync_remark(
    store: &dyn Store,
    lead_id: &str,
    remark: &str,
    today: NaiveDate,
) -> Result<Rescheduled, StoreError> {
    let mut done = Rescheduled::default();
    let lower = remark.to_lowercase();
    let (meeting, visit) = (lower.contains("meeting"), lower.contains("visit"));
    if !meeting && !visit {
        return Ok(done);
    }
    let Some(time) = extract_scheduled_time(remark, today) else {
        return Ok(done);
    };
    let at = format_naive(&time.datetime(), TimeFormat::YYYYMMDD_HHMMSS);
    if meeting {
        done.meetings = reschedule(store, Database::MEETINGS, lead_id, remark, &at)?;
    }
    if visit {
        done.visits = reschedule(store, Database::VISITS, lead_id, remark, &at)?;
    }
    tracing::debug!("remark on lead {lead_id} rescheduled {done:?} to {at}");
    Ok(done)
}

/// 失败只记录日志，不影响客户本身的更新
pub fn sync_remark_soft(store: &dyn Store, lead_id: &str, remark: &str, today: NaiveDate) {
    if let Err(e) = sync_remark(store, lead_id, remark, today) {
        tracing::warn!("failed to sync remark of lead {lead_id}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::database::MemoryStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        for (table, id, status) in [
            (Database::MEETINGS, "m1", "scheduled"),
            (Database::MEETINGS, "m2", "missed"),
            (Database::MEETINGS, "m3", "completed"),
            (Database::VISITS, "v1", "scheduled"),
        ] {
            store
                .insert(
                    table,
                    patch! {"id" => id, "lead_id" => "lead", "user_id" => "u", "status" => status,
                        "scheduled_at" => "2024-01-01 10:00:00", "remark" => Value::Null},
                )
                .unwrap();
        }
        store
    }

    fn row(store: &MemoryStore, table: &str, id: &str) -> crate::database::Row {
        store.select(table, &[Filter::eq("id", id)], None).unwrap().remove(0)
    }

    #[test]
    fn meeting_remark_reschedules_open_meetings_only() {
        let store = store();
        let remark = "Meeting on 5th Feb at 2 PM";
        let done = sync_remark(&store, "lead", remark, today()).unwrap();
        assert_eq!(done, Rescheduled { meetings: 2, visits: 0 });
        for id in ["m1", "m2"] {
            let m = row(&store, Database::MEETINGS, id);
            assert_eq!(m["status"], json!("scheduled"));
            assert_eq!(m["scheduled_at"], json!("2024-02-05 14:00:00"));
            assert_eq!(m["remark"], json!(remark));
        }
        assert_eq!(row(&store, Database::MEETINGS, "m3")["status"], json!("completed"));
        let v = row(&store, Database::VISITS, "v1");
        assert_eq!(v["scheduled_at"], json!("2024-01-01 10:00:00"));
        assert!(v["remark"].is_null());
    }

    #[test]
    fn visit_remark_touches_visits() {
        let store = store();
        let done = sync_remark(&store, "lead", "Site VISIT tomorrow at 11 am", today()).unwrap();
        assert_eq!(done, Rescheduled { meetings: 0, visits: 1 });
        assert_eq!(
            row(&store, Database::VISITS, "v1")["scheduled_at"],
            json!("2024-01-21 11:00:00")
        );
    }

    #[test]
    fn store_failure_is_reported_but_soft_sync_swallows_it() {
        let store = crate::database::UnavailableTable {
            inner: store(),
            table: Database::MEETINGS,
        };
        let remark = "Meeting on 5th Feb at 2 PM";
        assert!(matches!(
            sync_remark(&store, "lead", remark, today()),
            Err(StoreError::Unavailable(_))
        ));
        sync_remark_soft(&store, "lead", remark, today());
        assert!(row(&store.inner, Database::VISITS, "v1")["remark"].is_null());
    }

    #[test]
    fn remark_without_time_changes_nothing() {
        let store = store();
        let done = sync_remark(&store, "lead", "talked to customer, no update", today()).unwrap();
        assert_eq!(done, Rescheduled::default());
        let done = sync_remark(&store, "lead", "meeting postponed, will call", today()).unwrap();
        assert_eq!(done, Rescheduled::default());
        assert_eq!(row(&store, Database::MEETINGS, "m2")["status"], json!("missed"));
    }
}
