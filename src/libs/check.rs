use serde_json::{json, Value};

use crate::Response;

/// 收集字段校验错误，全部检查完再统一返回 400
#[derive(Debug, Default)]
pub struct Checker {
    errors: Vec<Value>,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn fail(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors
            .push(json!({"field": field, "message": message.into()}));
        self
    }
    /// 字符数在 `[min, max]` 之间
    pub fn len(&mut self, field: &str, value: &str, min: usize, max: usize) -> &mut Self {
        let n = value.chars().count();
        if n < min {
            self.fail(field, format!("{field} must be at least {min} characters"))
        } else if n > max {
            self.fail(field, format!("{field} must not exceed {max} characters"))
        } else {
            self
        }
    }
    pub fn non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.fail(field, format!("{field} is required"))
        } else {
            self
        }
    }
    pub fn non_negative(&mut self, field: &str, value: f64) -> &mut Self {
        if value < 0.0 {
            self.fail(field, format!("{field} must not be negative"))
        } else {
            self
        }
    }
    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if ok {
            self
        } else {
            self.fail(field, message)
        }
    }
    pub fn finish(&mut self) -> Result<(), Response> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            let details = std::mem::take(&mut self.errors);
            Err(Response::invalid_format("Validation failed").with_details(json!(details)))
        }
    }
}
