pub mod config;
pub mod response;
pub mod token;

pub mod database;
pub mod libs;
pub mod pages;
pub mod perm;
pub mod schedule;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::Config;
pub use libs::{base64_decode, base64_encode};
pub use response::Response;

use database::Store;
use pages::func::property::PropertyClient;

pub type ResponseResult = Result<Response, Response>;

/// 每个请求共享的状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub properties: Arc<PropertyClient>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let properties = Arc::new(PropertyClient::new(&config));
        Self {
            store,
            config: Arc::new(config),
            properties,
        }
    }
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "status": "online",
        "message": "CRM Backend API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}

async fn not_found() -> Response {
    Response::new(StatusCode::NOT_FOUND, json!("Route not found"))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .nest("/api", pages::pages_router())
        .fallback(not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_headers(Any),
        )
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
