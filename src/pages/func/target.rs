use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{Database, Filter, Order, Store, StoreError},
    libs::{
        check::Checker,
        dser::deserialize_flexible_bool,
        gen_id, parse_query,
        time::{month_start, next_month_start, TimeFormat, TIME},
    },
    pages::User,
    parse_jwt_macro, patch,
    perm::{self, authorize, Action},
    AppState, Response, ResponseResult,
};

/// 每人每月一条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub user_id: String,
    /// YYYY-MM-01
    pub month: String,
    pub meeting_target: i64,
    pub visit_target: i64,
    pub revenue_target: f64,
    pub bonus: f64,
    #[serde(default, deserialize_with = "deserialize_flexible_bool")]
    pub bonus_approved: bool,
    #[serde(default)]
    pub bonus_approved_by: Option<String>,
    #[serde(default)]
    pub bonus_approved_at: Option<String>,
    #[serde(default)]
    pub meetings_achieved: i64,
    #[serde(default)]
    pub visits_achieved: i64,
    pub created_at: String,
}

/// `user_id` 在 `[from, to)` 之间完成的会面或看房数量
pub(crate) fn completed_between(
    store: &dyn Store,
    table: &str,
    user_id: &str,
    from: &str,
    to: &str,
) -> Result<usize, StoreError> {
    store.count(
        table,
        &[
            Filter::eq("user_id", user_id),
            Filter::eq("status", "completed"),
            Filter::gte("completed_at", from),
            Filter::lt("completed_at", to),
        ],
    )
}

/// 按 (user_id, month) 写入目标，已存在时覆盖数值，奖金审批状态保持不变
pub fn upsert_target(store: &dyn Store, target: &Target) -> Result<Target, StoreError> {
    let key = [
        Filter::eq("user_id", target.user_id.as_str()),
        Filter::eq("month", target.month.as_str()),
    ];
    let values = patch! {
        "meeting_target" => target.meeting_target,
        "visit_target" => target.visit_target,
        "revenue_target" => target.revenue_target,
        "bonus" => target.bonus,
    };
    if store.count(Database::TARGETS, &key)? == 0 {
        match store.insert_as(Database::TARGETS, target) {
            Ok(target) => return Ok(target),
            // 并发插入了同一个月
            Err(StoreError::UniqueViolation(_)) => (),
            Err(e) => return Err(e),
        }
    }
    let row = store
        .update(Database::TARGETS, &key, values)?
        .into_iter()
        .next()
        .ok_or(StoreError::NotFound)?;
    crate::database::from_row(row)
}

/// 根据已完成的会面与看房重新计算每条目标的完成数，返回更新的条数
pub fn recompute_achievements(store: &dyn Store) -> Result<usize, StoreError> {
    let targets: Vec<Target> = store.select_as(Database::TARGETS, &[], None)?;
    let mut updated = 0;
    for target in &targets {
        let Some(next) = next_month_start(&target.month) else {
            tracing::warn!("target {} has invalid month {}", target.id, target.month);
            continue;
        };
        let meetings = completed_between(store, Database::MEETINGS, &target.user_id, &target.month, &next)?;
        let visits = completed_between(store, Database::VISITS, &target.user_id, &target.month, &next)?;
        store.update(
            Database::TARGETS,
            &[Filter::eq("id", target.id.as_str())],
            patch! {"meetings_achieved" => meetings, "visits_achieved" => visits},
        )?;
        updated += 1;
    }
    Ok(updated)
}

/// 附上目标所属用户
fn with_users(store: &dyn Store, targets: &[Target]) -> Result<Vec<Value>, Response> {
    let ids: Vec<&str> = targets.iter().map(|t| t.user_id.as_str()).collect();
    let users: Vec<User> = op::ternary!(ids.is_empty() => Vec::new();
        store.select_as(Database::USERS, &[Filter::is_in("id", ids)], None)?);
    Ok(targets
        .iter()
        .map(|t| {
            let mut value = json!(t);
            value["user"] = users
                .iter()
                .find(|u| u.id == t.user_id)
                .map(|u| json!({"id": u.id, "name": u.name, "role": u.role, "phone": u.phone}))
                .unwrap_or(Value::Null);
            value
        })
        .collect())
}

pub fn target_router() -> Router<AppState> {
    Router::new()
        .route("/targets", post(set_target).get(get_targets))
        .route("/targets/team", get(get_team_targets))
        .route("/targets/approve-bonus", post(approve_bonus))
        .route("/targets/update-achievements", post(update_achievements))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetParams {
    user_id: String,
    month: String,
    meeting_target: i64,
    visit_target: i64,
    revenue_target: f64,
    bonus: f64,
}

async fn set_target(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let data: TargetParams = serde_json::from_value(value)?;
    Checker::new()
        .check(
            month_start(&data.month).as_deref() == Some(data.month.as_str()),
            "month",
            "Month must be first day of month (YYYY-MM-01)",
        )
        .check(data.meeting_target >= 0, "meetingTarget", "meetingTarget must not be negative")
        .check(data.visit_target >= 0, "visitTarget", "visitTarget must not be negative")
        .non_negative("revenueTarget", data.revenue_target)
        .non_negative("bonus", data.bonus)
        .finish()?;
    let store = &*state.store;
    let team = perm::resolve_team(store, &actor.id)?;
    authorize(
        &actor,
        Action::SetTarget {
            target: &data.user_id,
            team: &team,
        },
    )?;
    let time = TIME::now()?;
    let target = Target {
        id: gen_id(&time, &data.user_id),
        user_id: data.user_id,
        month: data.month,
        meeting_target: data.meeting_target,
        visit_target: data.visit_target,
        revenue_target: data.revenue_target,
        bonus: data.bonus,
        bonus_approved: false,
        bonus_approved_by: None,
        bonus_approved_at: None,
        meetings_achieved: 0,
        visits_achieved: 0,
        created_at: time.format(TimeFormat::YYYYMMDD_HHMMSS),
    };
    let target = upsert_target(store, &target)?;
    tracing::info!("{} set target {} for {}", actor.id, target.month, target.user_id);
    let mut values = with_users(store, &[target])?;
    Ok(Response::ok(values.remove(0)))
}

#[derive(Deserialize)]
struct MonthQuery {
    #[serde(default)]
    month: Option<String>,
}

impl MonthQuery {
    fn filter(&self) -> Result<Option<Filter>, Response> {
        match self.month.as_deref().filter(|m| !m.is_empty()) {
            None => Ok(None),
            Some(m) => {
                let month = op::some!(month_start(m); ret Err(Response::invalid_value("Invalid month")));
                Ok(Some(Filter::eq("month", month)))
            }
        }
    }
}

async fn get_targets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let query: MonthQuery = parse_query(params)?;
    let mut filters = vec![Filter::eq("user_id", actor.id.as_str())];
    filters.extend(query.filter()?);
    let store = &*state.store;
    let targets: Vec<Target> = store.select_as(Database::TARGETS, &filters, Order::desc("month"))?;
    Ok(Response::ok(json!(with_users(store, &targets)?)))
}

async fn get_team_targets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::ViewTeamTargets)?;
    let query: MonthQuery = parse_query(params)?;
    let store = &*state.store;
    let team = perm::resolve_team(store, &actor.id)?;
    let mut filters = vec![Filter::is_in("user_id", team.ids())];
    filters.extend(query.filter()?);
    let targets: Vec<Target> = store.select_as(Database::TARGETS, &filters, Order::desc("month"))?;
    Ok(Response::ok(json!(with_users(store, &targets)?)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveParams {
    target_id: String,
}

async fn approve_bonus(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::ApproveBonus)?;
    let data: ApproveParams = serde_json::from_value(value)?;
    let now = TIME::now()?.format(TimeFormat::YYYYMMDD_HHMMSS);
    let target: Target = state.store.update_by_id(
        Database::TARGETS,
        &data.target_id,
        patch! {"bonus_approved" => true, "bonus_approved_by" => actor.id.as_str(), "bonus_approved_at" => now},
    )?;
    tracing::info!("{} approved bonus of target {}", actor.id, target.id);
    Ok(Response::ok(json!(target)).with_message("Bonus approved successfully"))
}

async fn update_achievements(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let bearer = bearer!(&headers);
    parse_jwt_macro!(&bearer, &state);
    let updated = recompute_achievements(&*state.store)?;
    Ok(Response::ok(json!({"updated": updated})).with_message("Achievements updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn target(id: &str, meetings: i64) -> Target {
        Target {
            id: id.into(),
            user_id: "u".into(),
            month: "2024-02-01".into(),
            meeting_target: meetings,
            visit_target: 2,
            revenue_target: 1000.0,
            bonus: 50.0,
            bonus_approved: false,
            bonus_approved_by: None,
            bonus_approved_at: None,
            meetings_achieved: 0,
            visits_achieved: 0,
            created_at: "2024-02-01 09:00:00".into(),
        }
    }

    #[test]
    fn second_upsert_overwrites_the_same_row() {
        let store = MemoryStore::new();
        upsert_target(&store, &target("t1", 5)).unwrap();
        store
            .update(Database::TARGETS, &[Filter::eq("id", "t1")], patch! {"bonus_approved" => true})
            .unwrap();
        let saved = upsert_target(&store, &target("t2", 9)).unwrap();
        assert_eq!(saved.id, "t1");
        assert_eq!(saved.meeting_target, 9);
        assert!(saved.bonus_approved);
        assert_eq!(store.count(Database::TARGETS, &[]).unwrap(), 1);
    }

    #[test]
    fn achievements_count_completed_in_month() {
        let store = MemoryStore::new();
        upsert_target(&store, &target("t1", 5)).unwrap();
        for (id, status, at) in [
            ("m1", "completed", Some("2024-02-03 10:00:00")),
            ("m2", "completed", Some("2024-03-01 00:00:00")),
            ("m3", "scheduled", None),
            ("m4", "completed", Some("2024-02-29 18:00:00")),
        ] {
            store
                .insert(
                    Database::MEETINGS,
                    patch! {"id" => id, "lead_id" => "l", "user_id" => "u", "status" => status,
                        "scheduled_at" => "2024-02-01 10:00:00", "completed_at" => at},
                )
                .unwrap();
        }
        assert_eq!(recompute_achievements(&store).unwrap(), 1);
        let t: Target = (&store as &dyn Store)
            .first_as(Database::TARGETS, &[Filter::eq("id", "t1")])
            .unwrap()
            .unwrap();
        assert_eq!((t.meetings_achieved, t.visits_achieved), (2, 0));
    }
}
