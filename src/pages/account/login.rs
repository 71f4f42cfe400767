use axum::{extract::State, Json};
use serde_json::Value;

use crate::{
    database::{Database, Filter},
    libs::check::Checker,
    pages::User,
    token::{generate_jwt, verify_password},
    AppState, Response, ResponseResult,
};

#[derive(serde::Deserialize)]
struct LoginID {
    phone: String,
    password: String,
}

pub async fn user_login(State(state): State<AppState>, Json(value): Json<Value>) -> ResponseResult {
    let data: LoginID = serde_json::from_value(value)?;
    let mut checker = Checker::new();
    super::check_phone_password(&mut checker, &data.phone, &data.password);
    checker.finish()?;
    let user: User = op::some!(
        state.store.first_as(Database::USERS, &[Filter::eq("phone", data.phone.as_str())])?;
        ret Err(Response::token_error("Invalid phone or password"))
    );
    if !user.is_active {
        return Err(Response::permission_denied("Account is deactivated"));
    }
    if !verify_password(&data.password, &user.password_hash) {
        return Err(Response::token_error("Invalid phone or password"));
    }
    let token = generate_jwt(
        state.config.jwt_secret(),
        &user.id,
        user.role,
        state.config.jwt_ttl_hours(),
    )?;
    tracing::info!("{} logged in", user.id);
    Ok(Response::ok(super::session(&user, token)))
}
