use axum::{extract::State, http::HeaderMap, routing::get, Router};
use chrono::Days;
use serde_json::{json, Map, Value};

use crate::{
    bearer,
    database::{Database, Filter, Store},
    libs::time::{format_naive, TimeFormat, TIME},
    pages::User,
    parse_jwt_macro,
    perm::{self, lead_scope, Role},
    AppState, Response, ResponseResult,
};

use super::lead::{Lead, LeadStatus, LeadType};

pub fn dashboard_router() -> Router<AppState> {
    Router::new().route("/dashboard/stats", get(get_stats))
}

/// 统计范围：owner 与 admin 为整个团队，其余只统计自己
///
/// `month` 为本月第一天，`recent` 为 30 天前的时间。
pub fn dashboard_stats(
    store: &dyn Store,
    actor: &User,
    month: &str,
    recent: &str,
) -> Result<Value, Response> {
    let team = perm::resolve_team(store, &actor.id)?;
    let user_ids = op::ternary!(actor.role.is_admin() => team.ids(); vec![actor.id.clone()]);
    let role_count = |role: Role| team.members().iter().filter(|m| m.role == role).count();

    let mut scope: Vec<Filter> = lead_scope(actor).into_iter().collect();
    let mut live = scope.clone();
    live.push(Filter::IsNull("deleted_at"));
    let leads: Vec<Lead> = store.select_as(Database::LEADS, &live, None)?;
    let mut by_status = Map::new();
    for status in LeadStatus::ALL {
        let n = leads.iter().filter(|l| l.status == status).count();
        by_status.insert(status.as_str().into(), json!(n));
    }
    let of_type = |t: LeadType| leads.iter().filter(|l| l.lead_type == t).count();
    let dropped = leads
        .iter()
        .filter(|l| matches!(l.status, LeadStatus::NotInterested | LeadStatus::Spam))
        .count();
    scope.push(Filter::NotNull("deleted_at"));
    let deleted = store.count(Database::LEADS, &scope)?;

    let completed = |table: &str, ids: Vec<String>| {
        store.count(
            table,
            &[
                Filter::is_in("user_id", ids),
                Filter::eq("status", "completed"),
                Filter::gte("completed_at", month),
            ],
        )
    };
    let calls = store.count(
        Database::LOGS,
        &[
            Filter::is_in("user_id", user_ids.clone()),
            Filter::eq("action", "call"),
            Filter::gte("timestamp", month),
        ],
    )?;
    let bookings = store.count(
        Database::LEADS,
        &[
            Filter::is_in("assigned_to", user_ids.clone()),
            Filter::eq("status", LeadStatus::Converted.as_str()),
            Filter::gte("updated_at", month),
        ],
    )?;

    // 本月完成会面与看房最多的成员
    let mut top: Option<(usize, usize, &User)> = None;
    for member in team.members().iter().filter(|m| user_ids.contains(&m.id)) {
        let meetings = completed(Database::MEETINGS, vec![member.id.clone()])?;
        let visits = completed(Database::VISITS, vec![member.id.clone()])?;
        if top.map_or(true, |(m, v, _)| meetings + visits > m + v) {
            top = Some((meetings, visits, member));
        }
    }
    let top_performer = top.map(|(meetings, visits, u)| {
        json!({"name": u.name, "role": u.role, "meetings": meetings, "visits": visits})
    });

    Ok(json!({
        "overview": {
            "totalLeads": leads.len(),
            "totalAdmins": role_count(Role::Admin),
            "totalManagers": role_count(Role::Manager),
            "totalEmployees": role_count(Role::Employee),
            "activeUsers": team.members().iter().filter(|m| m.is_active).count(),
        },
        "leadsByStatus": by_status,
        "leadsByType": {
            "websiteLeads": of_type(LeadType::Lead),
            "marketData": of_type(LeadType::Data),
        },
        "deletedLeads": deleted,
        "thisMonth": {
            "totalMeetings": completed(Database::MEETINGS, user_ids.clone())?,
            "totalVisits": completed(Database::VISITS, user_ids.clone())?,
            "totalCalls": calls,
            "totalBookings": bookings,
            "conversions": bookings,
        },
        "performance": {
            "topPerformer": top_performer,
        },
        "metrics": {
            "clientsDropped": dropped,
            "serviceManagers": role_count(Role::Manager),
            "salesEmployees": role_count(Role::Employee),
            "recentLeadsCount": leads.iter().filter(|l| l.created_at.as_str() >= recent).count(),
        },
    }))
}

async fn get_stats(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let time = TIME::now()?;
    let month = time.format(TimeFormat::YYYYMM01);
    let recent = op::some!(
        time.naive().checked_sub_days(Days::new(30));
        ret Err(Response::internal_server_error("date overflow"))
    );
    let recent = format_naive(&recent, TimeFormat::YYYYMMDD_HHMMSS);
    Ok(Response::ok(dashboard_stats(&*state.store, &actor, &month, &recent)?))
}
