use std::fmt::Display;

use axum::{http::StatusCode, Json};
use serde::{ser::SerializeStruct, Serialize};
use serde_json::{json, Value};

use crate::database::StoreError;
/// 响应数据
#[derive(Debug)]
pub struct Response {
    /// 响应状态码
    code: StatusCode,
    data: Value,
    message: Option<String>,
    details: Option<Value>,
}

impl axum::response::IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        (self.code, Json(self)).into_response()
    }
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let success = self.is_success();
        let len = 2 + self.message.is_some() as usize + self.details.is_some() as usize;
        let mut s = serializer.serialize_struct("Response", len)?;
        s.serialize_field("success", &success)?;
        if success {
            s.serialize_field("data", &self.data)?;
            if let Some(message) = &self.message {
                s.serialize_field("message", message)?;
            }
        } else {
            s.serialize_field("error", &self.data)?;
            if let Some(details) = &self.details {
                s.serialize_field("details", details)?;
            }
        }
        s.end()
    }
}
impl Response {
    pub fn new(code: StatusCode, data: Value) -> Response {
        Self {
            code,
            data,
            message: None,
            details: None,
        }
    }
    pub fn ok(data: Value) -> Self {
        Self::new(StatusCode::OK, data)
    }
    pub fn created(data: Value) -> Self {
        Self::new(StatusCode::CREATED, data)
    }
    pub fn empty() -> Self {
        Self::ok(json!("OK"))
    }
    pub fn with_message(mut self, message: impl Display) -> Self {
        self.message = Some(message.to_string());
        self
    }
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
    /// token 缺失、无效或过期
    pub fn token_error(e: impl Display) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, json!(e.to_string()))
    }
    /// 内部错误
    pub fn internal_server_error(e: impl Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, json!(e.to_string()))
    }
    /// 外部依赖（数据库、房源接口）不可用
    pub fn dependency(e: impl Display) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, json!(e.to_string()))
    }
    /// 参数格式错误
    pub fn invalid_format(e: impl Display) -> Self {
        Self::new(StatusCode::BAD_REQUEST, json!(e.to_string()))
    }
    /// 数值不对
    pub fn invalid_value(e: impl Display) -> Self {
        Self::new(StatusCode::BAD_REQUEST, json!(e.to_string()))
    }
    /// 请求的数据不存在
    pub fn not_exist(e: impl Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, json!(e.to_string()))
    }
    /// 要添加的数据已存在
    pub fn already_exist(e: impl Display) -> Self {
        Self::new(StatusCode::CONFLICT, json!(e.to_string()))
    }
    /// 权限不足
    pub fn permission_denied(reason: impl Display) -> Self {
        Self::new(StatusCode::FORBIDDEN, json!(reason.to_string()))
    }
    pub fn code(&self) -> StatusCode {
        self.code
    }
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl From<StoreError> for Response {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::UniqueViolation(_) => Response::already_exist("Record already exists"),
            StoreError::ForeignKeyViolation(_) => {
                Response::invalid_value("Referenced record does not exist")
            }
            StoreError::NotFound => Response::not_exist("Record not found"),
            StoreError::Unavailable(e) => Response::dependency(e),
            StoreError::Other(e) => Response::internal_server_error(e),
        }
    }
}

impl From<serde_json::Error> for Response {
    fn from(value: serde_json::Error) -> Self {
        Response::invalid_format("Validation failed").with_details(json!(value.to_string()))
    }
}
impl From<reqwest::Error> for Response {
    fn from(value: reqwest::Error) -> Self {
        Response::dependency(value)
    }
}
impl From<axum::extract::multipart::MultipartError> for Response {
    fn from(value: axum::extract::multipart::MultipartError) -> Self {
        Response::invalid_format(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_carries_data() {
        let value = json!(Response::created(json!({"id": "1"})).with_message("done"));
        assert_eq!(value, json!({"success": true, "data": {"id": "1"}, "message": "done"}));
    }

    #[test]
    fn failure_envelope_carries_error_and_details() {
        let resp = Response::invalid_value("bad phone").with_details(json!([{"field": "phone"}]));
        assert_eq!(resp.code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json!(resp),
            json!({"success": false, "error": "bad phone", "details": [{"field": "phone"}]})
        );
    }

    #[test]
    fn store_errors_map_to_status_codes() {
        let conflict: Response = StoreError::UniqueViolation("users.phone".into()).into();
        assert_eq!(conflict.code(), StatusCode::CONFLICT);
        let missing_ref: Response = StoreError::ForeignKeyViolation("lead_id".into()).into();
        assert_eq!(missing_ref.code(), StatusCode::BAD_REQUEST);
        let gone: Response = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(gone.code(), StatusCode::BAD_GATEWAY);
    }
}
