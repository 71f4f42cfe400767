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
        gen_id, parse_query,
        time::{TimeFormat, TIME},
    },
    pages::User,
    parse_jwt_macro, AppState, Response, ResponseResult,
};

use super::lead::find_lead;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub lead_id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: String,
}

pub fn note_router() -> Router<AppState> {
    Router::new().route("/notes", post(create_note).get(get_notes))
}

/// 附上作者的 id 与姓名
fn with_authors(store: &dyn crate::database::Store, notes: &[Note]) -> Result<Vec<Value>, Response> {
    let ids: Vec<&str> = notes.iter().map(|n| n.user_id.as_str()).collect();
    let users: Vec<User> = op::ternary!(ids.is_empty() => Vec::new();
        store.select_as(Database::USERS, &[Filter::is_in("id", ids)], None)?);
    Ok(notes
        .iter()
        .map(|n| {
            let user = users
                .iter()
                .find(|u| u.id == n.user_id)
                .map(|u| json!({"id": u.id, "name": u.name}));
            let mut value = json!(n);
            value["user"] = user.unwrap_or(Value::Null);
            value
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewNote {
    lead_id: String,
    text: String,
}

async fn create_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let data: NewNote = serde_json::from_value(value)?;
    Checker::new().non_empty("text", &data.text).finish()?;
    let store = &*state.store;
    find_lead(store, &data.lead_id)?;
    let time = TIME::now()?;
    let note = Note {
        id: gen_id(&time, &data.lead_id),
        lead_id: data.lead_id,
        user_id: actor.id.clone(),
        text: data.text,
        created_at: time.format(TimeFormat::YYYYMMDD_HHMMSS),
    };
    let note = store.insert_as(Database::NOTES, &note)?;
    let mut values = with_authors(store, &[note])?;
    Ok(Response::created(values.remove(0)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteQuery {
    #[serde(default)]
    lead_id: Option<String>,
}

async fn get_notes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    parse_jwt_macro!(&bearer, &state);
    let query: NoteQuery = parse_query(params)?;
    let lead_id = op::some!(
        query.lead_id.filter(|l| !l.is_empty());
        ret Err(Response::invalid_value("leadId is required"))
    );
    let store = &*state.store;
    let notes: Vec<Note> = store.select_as(
        Database::NOTES,
        &[Filter::eq("lead_id", lead_id)],
        Order::desc("created_at"),
    )?;
    Ok(Response::ok(json!(with_authors(store, &notes)?)))
}
