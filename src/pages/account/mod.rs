use axum::{routing::post, Router};

mod login;
mod register;

use crate::{libs::check::Checker, AppState};

pub fn account_router() -> Router<AppState> {
    Router::new()
        .route("/auth/initialize-owner", post(register::initialize_owner))
        .route("/auth/login", post(login::user_login))
}

fn check_phone_password(checker: &mut Checker, phone: &str, password: &str) {
    checker
        .len("phone", phone, 10, 15)
        .len("password", password, 6, usize::MAX);
}

/// 登录与初始化都返回用户与 token
fn session(user: &crate::pages::User, token: String) -> serde_json::Value {
    serde_json::json!({"user": user, "token": token})
}
