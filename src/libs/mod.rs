pub mod cache;
pub mod check;
pub mod dser;
pub mod headers;
pub mod time;

use std::collections::HashMap;

use axum::extract::Multipart;
use base64::prelude::Engine;
use serde::de::DeserializeOwned;

use crate::Response;

use self::time::TIME;
/// base64 url safe encode
pub fn base64_encode(input: impl AsRef<[u8]>) -> String {
    base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(input)
}

/// base64 url safe decode
pub fn base64_decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>, base64::DecodeError> {
    base64::prelude::BASE64_URL_SAFE_NO_PAD.decode(input)
}
/// 三目运算符，用宏简单实现
#[macro_export]
macro_rules! do_if {
    ($pat:expr => $suc:expr, $e:expr) => {
        if $pat {
            $suc
        } else {
            $e
        }
    };
}

/// 生成 22 位的 id
pub fn gen_id(time: &TIME, name: &str) -> String {
    let salt: u64 = rand::random();
    let digest = md5::compute(format!("{}-{name}-{salt}", time.naos()));
    base64_encode(digest.0)
}

/// 查询参数按请求体的方式解析，格式错误同样返回 400
pub fn parse_query<T: DeserializeOwned>(params: HashMap<String, String>) -> Result<T, Response> {
    Ok(serde_json::from_value(serde_json::json!(params))?)
}

pub struct FilePart {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

pub struct MessagePart {
    pub files: Vec<FilePart>,
    pub json: String,
}

pub async fn parse_multipart(mut part: Multipart) -> Result<MessagePart, Response> {
    let mut files = Vec::new();
    let mut data = String::new();
    while let Some(field) = part.next_field().await? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().map(|s| s.to_owned());
                let content_type = field.content_type().map(|s| s.to_owned());
                let bytes = field.bytes().await?.to_vec();
                files.push(FilePart {
                    bytes,
                    filename,
                    content_type,
                });
            }
            Some("data") => {
                data = field.text().await?;
            }
            _ => (),
        }
    }
    Ok(MessagePart { files, json: data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_url_safe() {
        let time = TIME::now().unwrap();
        let a = gen_id(&time, "lead");
        let b = gen_id(&time, "lead");
        assert_ne!(a, b);
        assert_eq!(a.len(), 22);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(base64_decode(&a).unwrap().len(), 16);
    }
}
