use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{Database, Filter, Order},
    libs::time::{TimeFormat, TIME},
    parse_jwt_macro, patch,
    perm::{authorize, lead_scope, Action},
    AppState, Response, ResponseResult,
};

use super::{find_lead, Lead};

fn find_trashed(store: &dyn crate::database::Store, id: &str) -> Result<Lead, Response> {
    let lead: Lead = op::some!(
        store.first_as(Database::LEADS, &[Filter::eq("id", id), Filter::NotNull("deleted_at")])?;
        ret Err(Response::not_exist("Lead not found in trash"))
    );
    Ok(lead)
}

pub async fn soft_delete_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let store = &*state.store;
    let lead = find_lead(store, &id)?;
    authorize(
        &actor,
        Action::SoftDeleteLead {
            created_by: &lead.created_by,
        },
    )?;
    let now = TIME::now()?.format(TimeFormat::YYYYMMDD_HHMMSS);
    let lead: Lead = store.update_by_id(Database::LEADS, &id, patch! {"deleted_at" => now.as_str()})?;
    tracing::info!("{} moved lead {} to trash", actor.id, id);
    Ok(Response::ok(json!(lead)).with_message("Lead moved to trash"))
}

/// 回收站，范围与客户列表一致
pub async fn get_trash(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::RestoreLead)?;
    let mut filters = vec![Filter::NotNull("deleted_at")];
    filters.extend(lead_scope(&actor));
    let leads: Vec<Lead> = state
        .store
        .select_as(Database::LEADS, &filters, Order::desc("deleted_at"))?;
    Ok(Response::ok(json!(leads)))
}

pub async fn restore_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::RestoreLead)?;
    let store = &*state.store;
    find_trashed(store, &id)?;
    let now = TIME::now()?.format(TimeFormat::YYYYMMDD_HHMMSS);
    let lead: Lead = store.update_by_id(
        Database::LEADS,
        &id,
        patch! {"deleted_at" => Value::Null, "updated_at" => now.as_str()},
    )?;
    tracing::info!("{} restored lead {}", actor.id, id);
    Ok(Response::ok(json!(lead)).with_message("Lead restored successfully"))
}

/// 只能永久删除回收站中的客户，关联的预约、跟进、记录一并删除
pub async fn purge_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::PurgeLead)?;
    let store = &*state.store;
    find_trashed(store, &id)?;
    for table in [
        Database::MEETINGS,
        Database::VISITS,
        Database::FOLLOWUPS,
        Database::NOTES,
        Database::LOGS,
    ] {
        store.delete(table, &[Filter::eq("lead_id", id.as_str())])?;
    }
    store.delete(Database::LEADS, &[Filter::eq("id", id.as_str())])?;
    tracing::info!("{} permanently deleted lead {}", actor.id, id);
    Ok(Response::ok(json!({"id": id})).with_message("Lead permanently deleted"))
}
