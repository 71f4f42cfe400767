use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    bearer,
    database::{to_row, Database, Filter, Store},
    libs::{
        check::Checker,
        dser::deserialize_flexible_bool,
        gen_id,
        time::{TimeFormat, TIME},
    },
    parse_jwt_macro,
    perm::{self, authorize, Action, Role},
    token::hash_password,
    AppState, Response, ResponseResult,
};

/// 员工数据
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub is_active: bool,
    #[serde(default)]
    pub monthly_meeting_target: i64,
    #[serde(default)]
    pub monthly_visit_target: i64,
    #[serde(default)]
    pub monthly_revenue_target: f64,
    #[serde(default)]
    pub monthly_bonus: f64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl User {
    /// 连同密码一起写入存储
    pub fn insert(&self, store: &dyn Store) -> Result<User, Response> {
        let mut row = to_row(self)?;
        row.insert("password_hash".into(), json!(self.password_hash));
        let row = store.insert(Database::USERS, row)?;
        Ok(crate::database::from_row(row)?)
    }
}

/// token 校验通过后加载当前用户
pub fn load_actor(store: &dyn Store, id: &str) -> Result<User, Response> {
    let user: User = op::some!(
        store.first_as(Database::USERS, &[Filter::eq("id", id)])?;
        ret Err(Response::token_error("Invalid token"))
    );
    if !user.is_active {
        return Err(Response::permission_denied("Account deactivated")
            .with_details(json!("Your account has been deactivated. Please contact your administrator.")));
    }
    Ok(user)
}

pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/team", get(get_team))
        .route("/users/deactivate/:id", patch(deactivate_user))
        .route("/users/activate/:id", patch(activate_user))
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewUser {
    name: String,
    phone: String,
    password: String,
    role: Role,
    #[serde(default)]
    monthly_meeting_target: i64,
    #[serde(default)]
    monthly_visit_target: i64,
    #[serde(default)]
    monthly_revenue_target: f64,
    #[serde(default)]
    monthly_bonus: f64,
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let data: NewUser = serde_json::from_value(value)?;
    authorize(&actor, Action::CreateUser(data.role))?;
    Checker::new()
        .len("name", &data.name, 2, 100)
        .len("phone", &data.phone, 10, 15)
        .len("password", &data.password, 6, usize::MAX)
        .check(data.monthly_meeting_target >= 0, "monthlyMeetingTarget", "must not be negative")
        .check(data.monthly_visit_target >= 0, "monthlyVisitTarget", "must not be negative")
        .non_negative("monthlyRevenueTarget", data.monthly_revenue_target)
        .non_negative("monthlyBonus", data.monthly_bonus)
        .finish()?;
    let time = TIME::now()?;
    let user = User {
        id: gen_id(&time, &data.phone),
        name: data.name,
        phone: data.phone,
        password_hash: hash_password(&data.password)?,
        role: data.role,
        parent_id: Some(actor.id.clone()),
        is_active: true,
        monthly_meeting_target: data.monthly_meeting_target,
        monthly_visit_target: data.monthly_visit_target,
        monthly_revenue_target: data.monthly_revenue_target,
        monthly_bonus: data.monthly_bonus,
        created_at: time.format(TimeFormat::YYYYMMDD_HHMMSS),
        updated_at: None,
    };
    let user = user.insert(&*state.store).map_err(|e| {
        op::ternary!(e.code() == axum::http::StatusCode::CONFLICT => Response::already_exist("Phone number already exists"); e)
    })?;
    tracing::info!("{} created {} {}", actor.id, user.role, user.id);
    Ok(Response::created(json!(user)))
}

async fn get_team(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let team = perm::resolve_team(&*state.store, &actor.id)?;
    Ok(Response::ok(json!(team.into_members())))
}

async fn deactivate_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let team = perm::resolve_team(&*state.store, &actor.id)?;
    authorize(
        &actor,
        Action::DeactivateUser {
            target: &id,
            team: &team,
        },
    )?;
    let now = TIME::now()?.format(TimeFormat::YYYYMMDD_HHMMSS);
    let count = perm::deactivate_cascade(&*state.store, &id, &now)?;
    Ok(Response::ok(json!({"deactivated": count}))
        .with_message("User and their team deactivated successfully"))
}

async fn activate_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let bearer = bearer!(&headers);
    let actor = parse_jwt_macro!(&bearer, &state);
    let team = perm::resolve_team(&*state.store, &actor.id)?;
    authorize(
        &actor,
        Action::ActivateUser {
            target: &id,
            team: &team,
        },
    )?;
    let now = TIME::now()?.format(TimeFormat::YYYYMMDD_HHMMSS);
    let user = perm::activate(&*state.store, &id, &now)?;
    Ok(Response::ok(json!(user)).with_message("User activated successfully"))
}
