use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{libs::time::TIME, perm::Role, Response};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 id
    pub id: String,
    pub role: Role,
    /// 签发时间（秒）
    pub iat: i64,
    /// 过期时间（秒）
    pub exp: i64,
}

#[derive(Debug)]
pub enum TokenVerification {
    Ok(Claims),
    Expired,
    Error,
}

fn key(secret: &str) -> Result<Hmac<Sha256>, Response> {
    Hmac::new_from_slice(secret.as_bytes()).map_err(Response::internal_server_error)
}

pub fn generate_jwt(secret: &str, id: &str, role: Role, ttl_hours: i64) -> Result<String, Response> {
    let iat = TIME::now()?.naos() / 1_000_000_000;
    let claims = Claims {
        id: id.to_owned(),
        role,
        iat,
        exp: iat + ttl_hours * 3600,
    };
    claims
        .sign_with_key(&key(secret)?)
        .map_err(Response::internal_server_error)
}

pub fn parse_jwt(secret: &str, token: &str) -> TokenVerification {
    let Ok(key) = key(secret) else {
        return TokenVerification::Error;
    };
    let claims: Claims = match token.verify_with_key(&key) {
        Ok(claims) => claims,
        Err(_) => return TokenVerification::Error,
    };
    match TIME::now() {
        Ok(now) if now.naos() / 1_000_000_000 < claims.exp => TokenVerification::Ok(claims),
        Ok(_) => TokenVerification::Expired,
        Err(_) => TokenVerification::Error,
    }
}

/// 校验 bearer token 并加载当前用户
///
/// 用户不存在为 401，已停用为 403。
#[macro_export]
macro_rules! parse_jwt_macro {
    ($bearer:expr, $state:expr) => {{
        match $crate::token::parse_jwt($state.config.jwt_secret(), $bearer.token()) {
            $crate::token::TokenVerification::Ok(claims) => {
                $crate::pages::user::load_actor(&*$state.store, &claims.id)?
            }
            $crate::token::TokenVerification::Expired => {
                return Err($crate::Response::token_error("Token expired"))
            }
            $crate::token::TokenVerification::Error => {
                return Err($crate::Response::token_error("Invalid token"))
            }
        }
    }};
}

pub fn hash_password(password: &str) -> Result<String, Response> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(Response::internal_server_error)?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(Response::internal_server_error)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, credential: &str) -> bool {
    PasswordHash::new(credential)
        .map(|hash| {
            Argon2::default()
                .verify_password(password.as_bytes(), &hash)
                .is_ok()
        })
        .unwrap_or(false)
}
