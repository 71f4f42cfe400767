use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{Database, Filter, Order, Row},
    libs::{
        check::Checker,
        dser::deserialize_flexible_bool,
        gen_id,
        time::{TimeFormat, TIME},
    },
    parse_jwt_macro, patch,
    perm::{authorize, Action},
    AppState, Response, ResponseResult,
};

/// 消息模板
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub is_active: bool,
    pub created_by: String,
    pub created_at: String,
}

pub fn template_router() -> Router<AppState> {
    Router::new()
        .route("/templates", post(create_template).get(get_templates))
        .route(
            "/templates/:id",
            get(get_template).patch(update_template).delete(delete_template),
        )
}

#[derive(Deserialize)]
struct NewTemplate {
    title: String,
    message: String,
}

async fn create_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::ManageTemplates)?;
    let data: NewTemplate = serde_json::from_value(value)?;
    Checker::new()
        .len("title", &data.title, 2, 200)
        .non_empty("message", &data.message)
        .finish()?;
    let time = TIME::now()?;
    let template = Template {
        id: gen_id(&time, &data.title),
        title: data.title,
        message: data.message,
        is_active: true,
        created_by: actor.id.clone(),
        created_at: time.format(TimeFormat::YYYYMMDD_HHMMSS),
    };
    let template = state.store.insert_as(Database::TEMPLATES, &template)?;
    tracing::info!("{} created template {}", actor.id, template.id);
    Ok(Response::created(json!(template)))
}

async fn get_templates(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let bearer = bearer!(&headers);
    parse_jwt_macro!(&bearer, &state);
    let templates: Vec<Template> = state.store.select_as(
        Database::TEMPLATES,
        &[Filter::eq("is_active", true)],
        Order::desc("created_at"),
    )?;
    Ok(Response::ok(json!(templates)))
}

async fn get_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    parse_jwt_macro!(&bearer, &state);
    let template: Template = op::some!(
        state.store.first_as(Database::TEMPLATES, &[Filter::eq("id", id)])?;
        ret Err(Response::not_exist("Template not found"))
    );
    Ok(Response::ok(json!(template)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplatePatch {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
}

async fn update_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::ManageTemplates)?;
    let data: TemplatePatch = serde_json::from_value(value)?;
    let mut checker = Checker::new();
    if let Some(title) = &data.title {
        checker.len("title", title, 2, 200);
    }
    if let Some(message) = &data.message {
        checker.non_empty("message", message);
    }
    checker.finish()?;
    let mut row = Row::new();
    if let Some(title) = data.title {
        row.insert("title".into(), json!(title));
    }
    if let Some(message) = data.message {
        row.insert("message".into(), json!(message));
    }
    if let Some(active) = data.is_active {
        row.insert("is_active".into(), json!(active));
    }
    if row.is_empty() {
        return Err(Response::invalid_value("Nothing to update"));
    }
    let template: Template = state.store.update_by_id(Database::TEMPLATES, &id, row)?;
    Ok(Response::ok(json!(template)))
}

/// 软删除，只停用模板
async fn delete_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    authorize(&actor, Action::ManageTemplates)?;
    let template: Template =
        state
            .store
            .update_by_id(Database::TEMPLATES, &id, patch! {"is_active" => false})?;
    tracing::info!("{} deactivated template {}", actor.id, id);
    Ok(Response::ok(json!(template)).with_message("Template deleted successfully"))
}
