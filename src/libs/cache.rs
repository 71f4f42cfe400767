use std::time::{Duration, Instant};

use dashmap::DashMap;

/// 外部会话的过期时间
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 保存外部接口的会话凭证，可以替换为进程外的实现
pub trait TokenCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String, ttl: Duration);
    fn invalidate(&self, key: &str);
}

/// 进程内缓存，过期的条目在读取时清除
#[derive(Default)]
pub struct MemoryTokenCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(key) {
            if entry.1 > Instant::now() {
                return Some(entry.0.clone());
            }
        }
        self.entries.remove(key);
        None
    }
    fn put(&self, key: &str, value: String, ttl: Duration) {
        self.entries.insert(key.to_owned(), (value, Instant::now() + ttl));
    }
    fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }
}
