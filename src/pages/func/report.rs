use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::Days;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{Database, Filter, Store, StoreError},
    libs::{
        check::Checker,
        dser::deserialize_empty_to_none,
        gen_id, parse_query,
        time::{month_start, next_month_start, parse_date, TimeFormat, TIME},
    },
    parse_jwt_macro, patch, AppState, Response, ResponseResult,
};

use super::{
    lead::{Lead, LeadStatus},
    target::{completed_between, Target},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub report_date: String,
    pub total_calls: usize,
    pub total_whatsapp: usize,
    pub total_templates: usize,
    pub today_meetings: usize,
    pub today_visits: usize,
    pub meetings_till_now: usize,
    pub visits_till_now: usize,
    pub prospects_till_now: usize,
    pub prospects: Vec<Value>,
}

fn logs_between(
    store: &dyn Store,
    user_id: &str,
    action: &str,
    from: &str,
    to: &str,
) -> Result<usize, StoreError> {
    store.count(
        Database::LOGS,
        &[
            Filter::eq("user_id", user_id),
            Filter::eq("action", action),
            Filter::gte("timestamp", from),
            Filter::lt("timestamp", to),
        ],
    )
}

fn completed_total(store: &dyn Store, table: &str, user_id: &str) -> Result<usize, StoreError> {
    store.count(
        table,
        &[Filter::eq("user_id", user_id), Filter::eq("status", "completed")],
    )
}

/// `date` 为 YYYY-MM-DD
pub fn daily_report(store: &dyn Store, user_id: &str, date: &str) -> Result<DailyReport, Response> {
    let day = op::some!(parse_date(date); ret Err(Response::invalid_value("Date must be in YYYY-MM-DD format")));
    let next = op::some!(day.checked_add_days(Days::new(1)); ret Err(Response::invalid_value("Invalid date")));
    let from = day.format(TimeFormat::YYYYMMDD.pattern()).to_string();
    let to = next.format(TimeFormat::YYYYMMDD.pattern()).to_string();
    let prospects: Vec<Lead> = store.select_as(
        Database::LEADS,
        &[
            Filter::eq("assigned_to", user_id),
            Filter::eq("status", LeadStatus::Prospect.as_str()),
        ],
        None,
    )?;
    Ok(DailyReport {
        total_calls: logs_between(store, user_id, "call", &from, &to)?,
        total_whatsapp: logs_between(store, user_id, "whatsapp", &from, &to)?,
        total_templates: logs_between(store, user_id, "template", &from, &to)?,
        today_meetings: completed_between(store, Database::MEETINGS, user_id, &from, &to)?,
        today_visits: completed_between(store, Database::VISITS, user_id, &from, &to)?,
        meetings_till_now: completed_total(store, Database::MEETINGS, user_id)?,
        visits_till_now: completed_total(store, Database::VISITS, user_id)?,
        prospects_till_now: prospects.len(),
        prospects: prospects
            .iter()
            .map(|p| json!({"name": p.name, "phone": p.phone}))
            .collect(),
        report_date: from,
    })
}

fn progress(achieved: usize, target: i64) -> String {
    if target > 0 {
        format!("{:.2}%", achieved as f64 / target as f64 * 100.0)
    } else {
        "0%".into()
    }
}

/// `month` 为 YYYY-MM-01
pub fn monthly_report(store: &dyn Store, user_id: &str, month: &str) -> Result<Value, Response> {
    let target: Option<Target> = store.first_as(
        Database::TARGETS,
        &[Filter::eq("user_id", user_id), Filter::eq("month", month)],
    )?;
    let Some(target) = target else {
        return Ok(json!({
            "month": month,
            "message": "No target set for this month",
            "target": null,
            "achievement": null,
        }));
    };
    let next = op::some!(next_month_start(month); ret Err(Response::invalid_value("Invalid month")));
    let meetings = completed_between(store, Database::MEETINGS, user_id, month, &next)?;
    let visits = completed_between(store, Database::VISITS, user_id, month, &next)?;
    let met = meetings as i64 >= target.meeting_target && visits as i64 >= target.visit_target;
    Ok(json!({
        "month": month,
        "target": {
            "meetings": target.meeting_target,
            "visits": target.visit_target,
            "revenue": target.revenue_target,
            "bonus": target.bonus,
        },
        "achievement": {
            "meetings": meetings,
            "visits": visits,
            "meetingProgress": progress(meetings, target.meeting_target),
            "visitProgress": progress(visits, target.visit_target),
        },
        "targetMet": met,
        "bonusApproved": target.bonus_approved,
        "bonusApprovedAt": target.bonus_approved_at,
    }))
}

pub fn report_router() -> Router<AppState> {
    Router::new()
        .route("/reports/daily", get(get_daily).post(save_daily))
        .route("/reports/monthly", get(get_monthly))
}

#[derive(Deserialize)]
struct ReportQuery {
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_empty_to_none")]
    month: Option<String>,
}

async fn get_daily(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let query: ReportQuery = parse_query(params)?;
    let date = match query.date {
        Some(d) => d,
        None => TIME::now()?.format(TimeFormat::YYYYMMDD),
    };
    let report = daily_report(&*state.store, &actor.id, &date)?;
    Ok(Response::ok(json!(report)))
}

async fn get_monthly(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let query: ReportQuery = parse_query(params)?;
    let month = match query.month {
        Some(m) => op::some!(month_start(&m); ret Err(Response::invalid_value("Invalid month"))),
        None => TIME::now()?.format(TimeFormat::YYYYMM01),
    };
    Ok(Response::ok(monthly_report(&*state.store, &actor.id, &month)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyParams {
    report_date: String,
    #[serde(default)]
    next_day_plan: Option<String>,
}

/// 按 (user_id, report_date) 写入当天的统计
async fn save_daily(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let data: DailyParams = serde_json::from_value(value)?;
    Checker::new()
        .check(parse_date(&data.report_date).is_some(), "reportDate", "Date must be in YYYY-MM-DD format")
        .finish()?;
    let store = &*state.store;
    let report = daily_report(store, &actor.id, &data.report_date)?;
    let values = patch! {
        "total_calls" => report.total_calls,
        "total_whatsapp" => report.total_whatsapp,
        "total_templates" => report.total_templates,
        "total_meetings" => report.today_meetings,
        "total_visits" => report.today_visits,
        "next_day_plan" => data.next_day_plan,
    };
    let key = [
        Filter::eq("user_id", actor.id.as_str()),
        Filter::eq("report_date", report.report_date.as_str()),
    ];
    let saved = match store.update(Database::DAILY_REPORTS, &key, values.clone())?.into_iter().next() {
        Some(row) => row,
        None => {
            let time = TIME::now()?;
            let mut row = values;
            row.insert("id".into(), json!(gen_id(&time, &actor.id)));
            row.insert("user_id".into(), json!(actor.id));
            row.insert("report_date".into(), json!(report.report_date));
            row.insert("created_at".into(), json!(time.format(TimeFormat::YYYYMMDD_HHMMSS)));
            store.insert(Database::DAILY_REPORTS, row)?
        }
    };
    Ok(Response::created(Value::Object(saved)).with_message("Daily report saved and shared successfully"))
}
