use axum::{extract::State, Json};
use serde_json::Value;

use crate::{
    database::{Database, Filter},
    libs::{
        check::Checker,
        gen_id,
        time::{TimeFormat, TIME},
    },
    pages::User,
    perm::Role,
    token::{generate_jwt, hash_password},
    AppState, Response, ResponseResult,
};

#[derive(serde::Deserialize)]
struct OwnerInfo {
    name: String,
    phone: String,
    password: String,
}

/// 只能执行一次，创建唯一的 owner
pub async fn initialize_owner(
    State(state): State<AppState>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let data: OwnerInfo = serde_json::from_value(value)?;
    let mut checker = Checker::new();
    checker.len("name", &data.name, 2, 100);
    super::check_phone_password(&mut checker, &data.phone, &data.password);
    checker.finish()?;
    let store = &*state.store;
    if store.count(Database::USERS, &[Filter::eq("role", Role::Owner.as_str())])? > 0 {
        return Err(Response::already_exist("Owner account already exists"));
    }
    if store.count(Database::USERS, &[Filter::eq("phone", data.phone.as_str())])? > 0 {
        return Err(Response::already_exist("Phone number already registered"));
    }
    let time = TIME::now()?;
    let owner = User {
        id: gen_id(&time, &data.phone),
        name: data.name,
        phone: data.phone,
        password_hash: hash_password(&data.password)?,
        role: Role::Owner,
        parent_id: None,
        is_active: true,
        created_at: time.format(TimeFormat::YYYYMMDD_HHMMSS),
        ..Default::default()
    }
    .insert(store)?;
    let token = generate_jwt(
        state.config.jwt_secret(),
        &owner.id,
        owner.role,
        state.config.jwt_ttl_hours(),
    )?;
    tracing::info!("owner account {} initialized", owner.id);
    Ok(Response::created(super::session(&owner, token)).with_message("Owner account created successfully"))
}
