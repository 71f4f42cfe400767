use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{Database, Filter, Order},
    libs::{
        check::Checker,
        dser::deserialize_empty_to_none,
        gen_id, parse_query,
        time::{format_naive, parse_datetime, TimeFormat, TIME},
    },
    pages::User,
    parse_jwt_macro, patch,
    perm::Role,
    AppState, Response, ResponseResult,
};

use super::lead::{attach_leads, find_lead};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    Missed,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Missed => "missed",
        }
    }
}

/// 会面与实地看房共用一套流程，只有地点字段和可见范围不同
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Meeting,
    Visit,
}

impl Kind {
    fn table(self) -> &'static str {
        match self {
            Kind::Meeting => Database::MEETINGS,
            Kind::Visit => Database::VISITS,
        }
    }
    fn name(self) -> &'static str {
        match self {
            Kind::Meeting => "Meeting",
            Kind::Visit => "Visit",
        }
    }
    /// owner 可以看到所有会面，看房始终只看自己的
    fn scope(self, actor: &User) -> Option<Filter> {
        match (self, actor.role) {
            (Kind::Meeting, Role::Owner) => None,
            _ => Some(Filter::eq("user_id", actor.id.as_str())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub lead_id: String,
    pub user_id: String,
    pub scheduled_at: String,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_location: Option<String>,
    pub created_at: String,
}

pub fn appointment_router() -> Router<AppState> {
    Router::new()
        .route("/meetings", post(create_meeting).get(get_meetings))
        .route("/meetings/:id", patch(update_meeting))
        .route("/visits", post(create_visit).get(get_visits))
        .route("/visits/:id", patch(update_visit))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewAppointment {
    lead_id: String,
    scheduled_at: String,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    site_location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    notes: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    remark: Option<String>,
}

fn create(kind: Kind, state: &AppState, actor: &User, value: Value) -> ResponseResult {
    let data: NewAppointment = serde_json::from_value(value)?;
    let scheduled = parse_datetime(&data.scheduled_at);
    let mut checker = Checker::new();
    checker.check(scheduled.is_some(), "scheduledAt", "Invalid datetime");
    if kind == Kind::Visit {
        checker.check(data.site_location.is_some(), "siteLocation", "Site location is required");
    }
    checker.finish()?;
    let store = &*state.store;
    find_lead(store, &data.lead_id)?;
    let time = TIME::now()?;
    let appointment = Appointment {
        id: gen_id(&time, &data.lead_id),
        lead_id: data.lead_id,
        user_id: actor.id.clone(),
        scheduled_at: scheduled
            .map(|t| format_naive(&t, TimeFormat::YYYYMMDD_HHMMSS))
            .unwrap_or_default(),
        status: AppointmentStatus::Scheduled,
        completed_at: None,
        remark: data.remark,
        notes: data.notes,
        outcome: None,
        location: op::ternary!(kind == Kind::Meeting => data.location; None),
        site_location: op::ternary!(kind == Kind::Visit => data.site_location; None),
        created_at: time.format(TimeFormat::YYYYMMDD_HHMMSS),
    };
    let appointment = store.insert_as(kind.table(), &appointment)?;
    tracing::info!("{} scheduled {} {}", actor.id, kind.name(), appointment.id);
    let mut values = attach_leads(store, &[appointment])?;
    Ok(Response::created(values.remove(0)))
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(default)]
    status: Option<AppointmentStatus>,
}

fn list(kind: Kind, state: &AppState, actor: &User, params: HashMap<String, String>) -> ResponseResult {
    let query: StatusQuery = parse_query(params)?;
    let mut filters: Vec<Filter> = kind.scope(actor).into_iter().collect();
    if let Some(status) = query.status {
        filters.push(Filter::eq("status", status.as_str()));
    }
    let store = &*state.store;
    let rows: Vec<Appointment> = store.select_as(kind.table(), &filters, Order::asc("scheduled_at"))?;
    Ok(Response::ok(json!(attach_leads(store, &rows)?)))
}

#[derive(Deserialize)]
struct AppointmentPatch {
    status: AppointmentStatus,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// 只能更新自己的预约，完成时记录完成时间，其它状态清空
fn update(kind: Kind, state: &AppState, actor: &User, id: &str, value: Value) -> ResponseResult {
    let data: AppointmentPatch = serde_json::from_value(value)?;
    let now = TIME::now()?.format(TimeFormat::YYYYMMDD_HHMMSS);
    let mut row = patch! {
        "status" => data.status.as_str(),
        "completed_at" => op::ternary!(data.status == AppointmentStatus::Completed => Some(now); None),
    };
    if let Some(outcome) = data.outcome {
        row.insert("outcome".into(), json!(outcome));
    }
    if let Some(notes) = data.notes {
        row.insert("notes".into(), json!(notes));
    }
    let updated = state.store.update(
        kind.table(),
        &[Filter::eq("id", id), Filter::eq("user_id", actor.id.as_str())],
        row,
    )?;
    let row = op::some!(updated.into_iter().next(); ret Err(Response::not_exist(format!("{} not found", kind.name()))));
    Ok(Response::ok(Value::Object(row)))
}

async fn create_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    create(Kind::Meeting, &state, &actor, value)
}

async fn get_meetings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    list(Kind::Meeting, &state, &actor, params)
}

async fn update_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    update(Kind::Meeting, &state, &actor, &id, value)
}

async fn create_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    create(Kind::Visit, &state, &actor, value)
}

async fn get_visits(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    list(Kind::Visit, &state, &actor, params)
}

async fn update_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    update(Kind::Visit, &state, &actor, &id, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Store;

    fn user(role: Role) -> User {
        User {
            id: "u".into(),
            role,
            ..Default::default()
        }
    }

    fn state_with_meeting() -> AppState {
        let store = crate::database::MemoryStore::new();
        store
            .insert(
                Database::MEETINGS,
                patch! {"id" => "m", "lead_id" => "l", "user_id" => "u", "status" => "scheduled",
                    "scheduled_at" => "2024-02-05 14:00:00", "created_at" => "2024-02-01 09:00:00"},
            )
            .unwrap();
        AppState::new(std::sync::Arc::new(store), crate::Config::with_secret("s"))
    }

    fn meeting(state: &AppState) -> Appointment {
        state
            .store
            .first_as(Database::MEETINGS, &[Filter::eq("id", "m")])
            .unwrap()
            .unwrap()
    }

    #[test]
    fn completed_at_follows_the_status() {
        let state = state_with_meeting();
        let actor = user(Role::Employee);
        update(Kind::Meeting, &state, &actor, "m", json!({"status": "completed", "outcome": "booked"})).unwrap();
        let done = meeting(&state);
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.outcome.as_deref(), Some("booked"));

        update(Kind::Meeting, &state, &actor, "m", json!({"status": "scheduled"})).unwrap();
        let reopened = meeting(&state);
        assert_eq!(reopened.status, AppointmentStatus::Scheduled);
        assert!(reopened.completed_at.is_none());
        assert_eq!(reopened.outcome.as_deref(), Some("booked"));
    }

    #[test]
    fn others_cannot_update_the_meeting() {
        let state = state_with_meeting();
        let other = User {
            id: "someone".into(),
            ..user(Role::Owner)
        };
        let err = update(Kind::Meeting, &state, &other, "m", json!({"status": "completed"})).unwrap_err();
        assert_eq!(err.code(), axum::http::StatusCode::NOT_FOUND);
        assert!(meeting(&state).completed_at.is_none());
    }

    #[test]
    fn only_owner_sees_every_meeting() {
        assert!(Kind::Meeting.scope(&user(Role::Owner)).is_none());
        assert!(Kind::Meeting.scope(&user(Role::Admin)).is_some());
        assert!(Kind::Visit.scope(&user(Role::Owner)).is_some());
    }

    #[test]
    fn visit_rows_do_not_carry_meeting_location() {
        let visit: Appointment = serde_json::from_value(json!({
            "id": "v", "lead_id": "l", "user_id": "u", "scheduled_at": "2024-01-01 10:00:00",
            "status": "missed", "site_location": "Tower B", "created_at": "2024-01-01 09:00:00"
        }))
        .unwrap();
        assert_eq!(visit.status, AppointmentStatus::Missed);
        let row = json!(visit);
        assert!(row.get("location").is_none());
        assert_eq!(row["site_location"], "Tower B");
    }
}
