use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::post,
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
        time::{TimeFormat, TIME},
    },
    parse_jwt_macro, AppState, Response, ResponseResult,
};

use super::lead::{attach_leads, find_lead};

/// 与客户的一次互动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Call,
    Whatsapp,
    Template,
    Meeting,
    Visit,
    Note,
    StatusChange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: String,
    pub lead_id: String,
    pub user_id: String,
    pub action: LogAction,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub timestamp: String,
}

pub fn log_router() -> Router<AppState> {
    Router::new().route("/logs", post(create_log).get(get_logs))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewLog {
    lead_id: String,
    action: LogAction,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    template_id: Option<String>,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

async fn create_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let data: NewLog = serde_json::from_value(value)?;
    Checker::new()
        .check(data.duration.map_or(true, |d| d >= 0), "duration", "duration must not be negative")
        .finish()?;
    let store = &*state.store;
    find_lead(store, &data.lead_id)?;
    let time = TIME::now()?;
    let log = ActivityLog {
        id: gen_id(&time, &data.lead_id),
        lead_id: data.lead_id,
        user_id: actor.id.clone(),
        action: data.action,
        duration: data.duration,
        template_id: data.template_id,
        outcome: data.outcome,
        notes: data.notes,
        timestamp: time.format(TimeFormat::YYYYMMDD_HHMMSS),
    };
    let log = store.insert_as(Database::LOGS, &log)?;
    let mut values = attach_leads(store, &[log])?;
    Ok(Response::created(values.remove(0)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogQuery {
    #[serde(default)]
    lead_id: Option<String>,
}

async fn get_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let query: LogQuery = parse_query(params)?;
    let mut filters = vec![Filter::eq("user_id", actor.id.as_str())];
    if let Some(lead) = query.lead_id {
        filters.push(Filter::eq("lead_id", lead));
    }
    let store = &*state.store;
    let logs: Vec<ActivityLog> = store.select_as(Database::LOGS, &filters, Order::desc("timestamp"))?;
    Ok(Response::ok(json!(attach_leads(store, &logs)?)))
}
