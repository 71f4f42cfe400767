use std::sync::Arc;

use reqwest::{header, multipart, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use crate::{
    libs::{
        cache::{MemoryTokenCache, TokenCache, SESSION_TTL},
        FilePart,
    },
    Config, Response,
};

const SESSION_KEY: &str = "properties-session";

/// 外部房源接口
///
/// 查询走公开接口，写操作需要先登录并携带会话 cookie。
pub struct PropertyClient {
    http: reqwest::Client,
    base: String,
    email: String,
    password: String,
    sessions: Arc<dyn TokenCache>,
}

impl PropertyClient {
    pub fn new(config: &Config) -> Self {
        Self::with_cache(config, Arc::new(MemoryTokenCache::new()))
    }
    pub fn with_cache(config: &Config, sessions: Arc<dyn TokenCache>) -> Self {
        let (email, password) = config.properties_credentials();
        Self {
            http: reqwest::Client::new(),
            base: config.properties_api_url().to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
            sessions,
        }
    }
    pub fn base_url(&self) -> &str {
        &self.base
    }
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn login(&self) -> Result<String, Response> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&json!({"email": self.email, "password": self.password}))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("properties login failed: {e}");
                Response::dependency("External API authentication failed")
            })?;
        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty());
        match cookie {
            Some(cookie) if resp.status().is_success() => {
                self.sessions.put(SESSION_KEY, cookie.clone(), SESSION_TTL);
                tracing::info!("logged into external properties api");
                Ok(cookie)
            }
            _ => {
                tracing::warn!("properties login returned {} without a session", resp.status());
                Err(Response::dependency("External API authentication failed"))
            }
        }
    }

    async fn session(&self) -> Result<String, Response> {
        match self.sessions.get(SESSION_KEY) {
            Some(cookie) => Ok(cookie),
            None => self.login().await,
        }
    }

    /// 发送请求并取出响应体，`action` 用于错误提示
    async fn send(&self, req: RequestBuilder, action: &str) -> Result<Value, Response> {
        let resp = req.send().await.map_err(|e| {
            tracing::warn!("properties api: failed to {action}: {e}");
            Response::dependency(format!("Failed to {action}"))
        })?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        match status {
            s if s.is_success() => Ok(body),
            StatusCode::NOT_FOUND => Err(Response::not_exist("Property not found")),
            StatusCode::BAD_REQUEST => Err(Response::invalid_value(
                body["error"].as_str().unwrap_or("Invalid property data"),
            )),
            StatusCode::UNAUTHORIZED => {
                self.sessions.invalidate(SESSION_KEY);
                Err(Response::dependency("External API authentication failed"))
            }
            s => {
                tracing::warn!("properties api: {action} returned {s}");
                Err(Response::dependency(format!("Failed to {action}")))
            }
        }
    }

    async fn authed(&self, req: RequestBuilder, action: &str) -> Result<Value, Response> {
        let cookie = self.session().await?;
        self.send(req.header(header::COOKIE, cookie), action).await
    }

    pub async fn list(&self) -> Result<Value, Response> {
        self.send(self.http.get(self.url("/public/properties")), "fetch properties")
            .await
    }
    pub async fn summary(&self) -> Result<Value, Response> {
        self.send(
            self.http.get(self.url("/public/properties/summary")),
            "fetch properties summary",
        )
        .await
    }
    pub async fn get(&self, id: &str) -> Result<Value, Response> {
        let url = self.url(&format!("/public/properties/{}", urlencoding::encode(id)));
        self.send(self.http.get(url), "fetch property details").await
    }
    pub async fn create(&self, body: &Value) -> Result<Value, Response> {
        let req = self.http.post(self.url("/admin/properties")).json(body);
        self.authed(req, "create property").await
    }
    pub async fn update(&self, id: &str, body: &Value) -> Result<Value, Response> {
        let url = self.url(&format!("/admin/properties/{}", urlencoding::encode(id)));
        self.authed(self.http.put(url).json(body), "update property")
            .await
    }
    pub async fn delete(&self, id: &str) -> Result<Value, Response> {
        let url = self.url(&format!("/admin/properties/{}", urlencoding::encode(id)));
        self.authed(self.http.delete(url), "delete property").await
    }
    /// 原样转发上传的表格文件
    pub async fn bulk(&self, file: FilePart) -> Result<Value, Response> {
        let name = file.filename.unwrap_or_else(|| "properties.xlsx".to_owned());
        let mut part = multipart::Part::bytes(file.bytes).file_name(name);
        if let Some(mime) = file.content_type {
            part = part.mime_str(&mime)?;
        }
        let form = multipart::Form::new().part("file", part);
        let req = self.http.post(self.url("/admin/bulk-properties")).multipart(form);
        self.authed(req, "bulk upload properties").await
    }
}
