pub mod user;
use axum::Router;

mod account;
pub mod func;

pub use user::User;

use crate::AppState;

pub fn pages_router() -> Router<AppState> {
    account::account_router()
        .merge(user::user_router())
        .merge(func::func_router())
}
