use axum::http::{header::AUTHORIZATION, HeaderMap};

/// `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct Bearer(String);

impl Bearer {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_owned()))
        }
    }
    pub fn token(&self) -> &str {
        &self.0
    }
}

/// 提取 bearer token，缺失时直接返回 401
#[macro_export]
macro_rules! bearer {
    ($headers:expr) => {
        match $crate::libs::headers::Bearer::from_headers($headers) {
            Some(bearer) => bearer,
            None => return Err($crate::Response::token_error("No token provided")),
        }
    };
}
