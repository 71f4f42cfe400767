mod memory;
mod mysql;

pub use self::memory::MemoryStore;
#[cfg(test)]
pub(crate) use self::memory::UnavailableTable;
pub use self::mysql::MysqlStore;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// 一行数据，列名 -> 值
pub type Row = Map<String, Value>;

pub struct Database;
impl Database {
    pub const USERS: &'static str = "users";
    pub const LEADS: &'static str = "leads";
    pub const LEAD_UPLOADS: &'static str = "lead_uploads";
    pub const MEETINGS: &'static str = "meetings";
    pub const VISITS: &'static str = "visits";
    pub const FOLLOWUPS: &'static str = "followups";
    pub const TARGETS: &'static str = "targets";
    pub const TEMPLATES: &'static str = "templates";
    pub const NOTES: &'static str = "notes";
    pub const LOGS: &'static str = "logs";
    pub const DAILY_REPORTS: &'static str = "daily_reports";
    /// 主键已存在
    pub const DUPLICATE_KEY_ERROR_CODE: u16 = 1062;
    /// 外键无法匹配
    pub const FOREIGN_KEY_ERROR_CODE: u16 = 1452;
    /// 唯一约束，内存存储与 table.sql 保持一致
    pub const UNIQUE_KEYS: &'static [(&'static str, &'static [&'static str])] = &[
        (Self::USERS, &["phone"]),
        (Self::TARGETS, &["user_id", "month"]),
        (Self::DAILY_REPORTS, &["user_id", "report_date"]),
    ];
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("foreign key violated: {0}")]
    ForeignKeyViolation(String),
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store error: {0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub enum Filter {
    Eq(&'static str, Value),
    Ne(&'static str, Value),
    In(&'static str, Vec<Value>),
    IsNull(&'static str),
    NotNull(&'static str),
    Gte(&'static str, Value),
    Lt(&'static str, Value),
    Lte(&'static str, Value),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Eq(column, value.into())
    }
    pub fn ne(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Ne(column, value.into())
    }
    pub fn is_in<V: Into<Value>>(column: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(column, values.into_iter().map(Into::into).collect())
    }
    pub fn gte(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Gte(column, value.into())
    }
    pub fn lt(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Lt(column, value.into())
    }
    pub fn lte(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Lte(column, value.into())
    }
    pub fn column(&self) -> &'static str {
        match self {
            Filter::Eq(c, _)
            | Filter::Ne(c, _)
            | Filter::In(c, _)
            | Filter::IsNull(c)
            | Filter::NotNull(c)
            | Filter::Gte(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _) => c,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Order {
    pub column: &'static str,
    pub descending: bool,
}

impl Order {
    pub fn asc(column: &'static str) -> Option<Self> {
        Some(Self {
            column,
            descending: false,
        })
    }
    pub fn desc(column: &'static str) -> Option<Self> {
        Some(Self {
            column,
            descending: true,
        })
    }
}

/// 外部关系型存储的访问边界
///
/// 所有业务状态都在存储中，进程内不持有可变业务数据。
/// 每个表都有字符串主键 `id`，由调用方生成。
pub trait Store: Send + Sync {
    fn select(&self, table: &str, filters: &[Filter], order: Option<Order>)
        -> Result<Vec<Row>, StoreError>;
    fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;
    /// 返回更新后的行
    fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError>;
    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError>;
    fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError>;
}

impl<'s> dyn Store + 's {
    pub fn select_as<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Result<Vec<T>, StoreError> {
        self.select(table, filters, order)?
            .into_iter()
            .map(from_row)
            .collect()
    }
    pub fn first_as<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
    ) -> Result<Option<T>, StoreError> {
        Ok(self.select_as(table, filters, None)?.into_iter().next())
    }
    pub fn insert_as<T: Serialize + DeserializeOwned>(
        &self,
        table: &str,
        value: &T,
    ) -> Result<T, StoreError> {
        from_row(self.insert(table, to_row(value)?)?)
    }
    /// 按 id 更新单行，行不存在时返回 NotFound
    pub fn update_by_id<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
        patch: Row,
    ) -> Result<T, StoreError> {
        let row = self
            .update(table, &[Filter::eq("id", id)], patch)?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)?;
        from_row(row)
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::Other(e.to_string()))
}

pub fn to_row<T: Serialize>(value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(StoreError::Other(format!("not a row: {other}"))),
        Err(e) => Err(StoreError::Other(e.to_string())),
    }
}

/// 构造更新用的 patch
#[macro_export]
macro_rules! patch {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut row = $crate::database::Row::new();
        $(
            row.insert($key.to_string(), serde_json::json!($value));
        )*
        row
    }};
}

/// 按配置打开存储，`memory://` 使用内存存储
pub fn open(url: &str) -> Result<std::sync::Arc<dyn Store>, StoreError> {
    if url.starts_with("memory://") {
        tracing::warn!("using in-memory store, data is lost on restart");
        Ok(std::sync::Arc::new(MemoryStore::new()))
    } else {
        let store = MysqlStore::connect(url)?;
        store.create_tables()?;
        Ok(std::sync::Arc::new(store))
    }
}
