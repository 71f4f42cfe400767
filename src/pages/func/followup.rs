use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Days;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{Database, Filter, Order, Store, StoreError},
    libs::{
        check::Checker,
        dser::deserialize_empty_to_none,
        gen_id,
        time::{format_naive, parse_datetime, TimeFormat, TIME},
    },
    parse_jwt_macro, patch, AppState, Response, ResponseResult,
};

use super::lead::{attach_leads, find_lead};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowupStatus {
    #[default]
    Pending,
    Missed,
    Done,
}

impl FollowupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FollowupStatus::Pending => "pending",
            FollowupStatus::Missed => "missed",
            FollowupStatus::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Followup {
    pub id: String,
    pub lead_id: String,
    pub user_id: String,
    pub reminder_at: String,
    pub status: FollowupStatus,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    pub created_at: String,
}

/// 提醒时间已过仍为 pending 的跟进标记为 missed，返回标记的数量
pub fn sweep_missed(store: &dyn Store, now: &str) -> Result<usize, StoreError> {
    let rows = store.update(
        Database::FOLLOWUPS,
        &[
            Filter::eq("status", FollowupStatus::Pending.as_str()),
            Filter::lt("reminder_at", now),
        ],
        patch! {"status" => FollowupStatus::Missed.as_str()},
    )?;
    if !rows.is_empty() {
        tracing::debug!("{} followups marked missed", rows.len());
    }
    Ok(rows.len())
}

pub fn followup_router() -> Router<AppState> {
    Router::new()
        .route("/followups", post(create_followup))
        .route("/followups/today", get(get_today))
        .route("/followups/backlog", get(get_backlog))
        .route("/followups/:id", patch(update_followup))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewFollowup {
    lead_id: String,
    reminder_at: String,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    notes: Option<String>,
}

async fn create_followup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let data: NewFollowup = serde_json::from_value(value)?;
    let reminder = parse_datetime(&data.reminder_at);
    Checker::new()
        .check(reminder.is_some(), "reminderAt", "Invalid datetime")
        .finish()?;
    let store = &*state.store;
    find_lead(store, &data.lead_id)?;
    let time = TIME::now()?;
    let followup = Followup {
        id: gen_id(&time, &data.lead_id),
        lead_id: data.lead_id,
        user_id: actor.id.clone(),
        reminder_at: reminder
            .map(|t| format_naive(&t, TimeFormat::YYYYMMDD_HHMMSS))
            .unwrap_or_default(),
        status: FollowupStatus::Pending,
        outcome: None,
        notes: data.notes,
        completed_at: None,
        created_at: time.format(TimeFormat::YYYYMMDD_HHMMSS),
    };
    let followup = store.insert_as(Database::FOLLOWUPS, &followup)?;
    let mut values = attach_leads(store, &[followup])?;
    Ok(Response::created(values.remove(0)))
}

/// 今天 00:00 到明天 00:00 之间的提醒
async fn get_today(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let today = TIME::now()?.date();
    let tomorrow = op::some!(today.checked_add_days(Days::new(1)); ret Err(Response::internal_server_error("date overflow")));
    let start = format!("{} 00:00:00", today.format(TimeFormat::YYYYMMDD.pattern()));
    let end = format!("{} 00:00:00", tomorrow.format(TimeFormat::YYYYMMDD.pattern()));
    let store = &*state.store;
    let rows: Vec<Followup> = store.select_as(
        Database::FOLLOWUPS,
        &[
            Filter::eq("user_id", actor.id.as_str()),
            Filter::gte("reminder_at", start),
            Filter::lt("reminder_at", end),
        ],
        Order::asc("reminder_at"),
    )?;
    Ok(Response::ok(json!(attach_leads(store, &rows)?)))
}

async fn get_backlog(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let store = &*state.store;
    sweep_missed(store, &TIME::now()?.format(TimeFormat::YYYYMMDD_HHMMSS))?;
    let rows: Vec<Followup> = store.select_as(
        Database::FOLLOWUPS,
        &[
            Filter::eq("user_id", actor.id.as_str()),
            Filter::eq("status", FollowupStatus::Missed.as_str()),
        ],
        Order::desc("reminder_at"),
    )?;
    Ok(Response::ok(json!(attach_leads(store, &rows)?)))
}

#[derive(Deserialize)]
struct FollowupPatch {
    status: FollowupStatus,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

async fn update_followup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    update(&*state.store, &actor.id, &id, value)
}

/// 只能更新自己的跟进，done 时记录完成时间，其它状态清空
fn update(store: &dyn Store, user_id: &str, id: &str, value: Value) -> ResponseResult {
    let data: FollowupPatch = serde_json::from_value(value)?;
    let now = TIME::now()?.format(TimeFormat::YYYYMMDD_HHMMSS);
    let mut row = patch! {
        "status" => data.status.as_str(),
        "completed_at" => op::ternary!(data.status == FollowupStatus::Done => Some(now); None),
    };
    if let Some(outcome) = data.outcome {
        row.insert("outcome".into(), json!(outcome));
    }
    if let Some(notes) = data.notes {
        row.insert("notes".into(), json!(notes));
    }
    let updated = store.update(
        Database::FOLLOWUPS,
        &[Filter::eq("id", id), Filter::eq("user_id", user_id)],
        row,
    )?;
    let row = op::some!(updated.into_iter().next(); ret Err(Response::not_exist("Followup not found")));
    Ok(Response::ok(Value::Object(row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    #[test]
    fn done_stamps_and_pending_clears_completed_at() {
        let store = MemoryStore::new();
        store
            .insert(
                Database::FOLLOWUPS,
                patch! {"id" => "f", "lead_id" => "l", "user_id" => "u", "reminder_at" => "2024-01-01 09:00:00",
                    "status" => "pending", "created_at" => "2024-01-01 00:00:00"},
            )
            .unwrap();
        let row = |store: &MemoryStore| store.select(Database::FOLLOWUPS, &[], None).unwrap().remove(0);

        update(&store, "u", "f", json!({"status": "done", "outcome": "interested"})).unwrap();
        let done = row(&store);
        assert_eq!(done["status"], "done");
        assert!(done["completed_at"].is_string());

        update(&store, "u", "f", json!({"status": "pending"})).unwrap();
        let pending = row(&store);
        assert_eq!(pending["status"], "pending");
        assert!(pending["completed_at"].is_null());
        assert_eq!(pending["outcome"], "interested");

        let err = update(&store, "other", "f", json!({"status": "done"})).unwrap_err();
        assert_eq!(err.code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn sweep_marks_only_overdue_pending() {
        let store = MemoryStore::new();
        for (id, at, status) in [
            ("f1", "2024-01-01 09:00:00", "pending"),
            ("f2", "2024-01-01 11:00:00", "pending"),
            ("f3", "2024-01-01 08:00:00", "done"),
        ] {
            store
                .insert(
                    Database::FOLLOWUPS,
                    patch! {"id" => id, "lead_id" => "l", "user_id" => "u", "reminder_at" => at,
                        "status" => status, "created_at" => "2024-01-01 00:00:00"},
                )
                .unwrap();
        }
        assert_eq!(sweep_missed(&store, "2024-01-01 10:00:00").unwrap(), 1);
        assert_eq!(sweep_missed(&store, "2024-01-01 10:00:00").unwrap(), 0);
        let missed = store
            .select(Database::FOLLOWUPS, &[Filter::eq("status", "missed")], None)
            .unwrap();
        assert_eq!(missed.len(), 1);
        assert_eq!(missed[0]["id"], "f1");
        let done = store.select(Database::FOLLOWUPS, &[Filter::eq("id", "f3")], None).unwrap();
        assert_eq!(done[0]["status"], "done");
    }
}
