use std::{env, str::FromStr};

use serde::Deserialize;

/// 服务配置
///
/// 先读取 `config/config.json`，再用环境变量覆盖。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    port: u16,
    database_url: String,
    jwt_secret: String,
    jwt_ttl_hours: i64,
    properties_api_url: String,
    properties_api_email: String,
    properties_api_password: String,
    followup_sweep_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "memory://".to_owned(),
            jwt_secret: "change-me".to_owned(),
            jwt_ttl_hours: 7 * 24,
            properties_api_url: "http://localhost:4000/api".to_owned(),
            properties_api_email: String::new(),
            properties_api_password: String::new(),
            followup_sweep_secs: 300,
        }
    }
}

fn env_override<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(value) = env::var(key) {
        match value.parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!("ignoring invalid {key}={value:?}"),
        }
    }
}

impl Config {
    pub const PATH: &'static str = "config/config.json";

    pub fn read() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = match std::fs::read(Self::PATH) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("{} is malformed, using defaults: {e}", Self::PATH);
                Config::default()
            }),
            Err(_) => Config::default(),
        };
        config.apply_env();
        config
    }
    fn apply_env(&mut self) {
        env_override("PORT", &mut self.port);
        env_override("DATABASE_URL", &mut self.database_url);
        env_override("JWT_SECRET", &mut self.jwt_secret);
        env_override("JWT_TTL_HOURS", &mut self.jwt_ttl_hours);
        env_override("PROPERTIES_API_URL", &mut self.properties_api_url);
        env_override("PROPERTIES_API_EMAIL", &mut self.properties_api_email);
        env_override("PROPERTIES_API_PASSWORD", &mut self.properties_api_password);
        env_override("FOLLOWUP_SWEEP_SECS", &mut self.followup_sweep_secs);
    }
    /// 测试与内存部署使用
    pub fn with_secret(secret: &str) -> Self {
        Self {
            jwt_secret: secret.to_owned(),
            ..Default::default()
        }
    }
    pub fn with_properties_api(mut self, url: &str) -> Self {
        self.properties_api_url = url.to_owned();
        self
    }
    pub fn port(&self) -> u16 {
        self.port
    }
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }
    pub fn jwt_ttl_hours(&self) -> i64 {
        self.jwt_ttl_hours
    }
    pub fn properties_api_url(&self) -> &str {
        self.properties_api_url.trim_end_matches('/')
    }
    pub fn properties_credentials(&self) -> (&str, &str) {
        (&self.properties_api_email, &self.properties_api_password)
    }
    pub fn followup_sweep_secs(&self) -> u64 {
        self.followup_sweep_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"port": 8080, "jwt_secret": "s"}"#).unwrap();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.jwt_secret(), "s");
        assert_eq!(config.jwt_ttl_hours(), 168);
        assert_eq!(config.database_url(), "memory://");
    }

    #[test]
    fn properties_url_has_no_trailing_slash() {
        let config = Config::with_secret("s").with_properties_api("http://upstream/api/");
        assert_eq!(config.properties_api_url(), "http://upstream/api");
    }
}
