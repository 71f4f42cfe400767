use mysql::{
    consts::ColumnType, prelude::Queryable, Params, Pool, PooledConn, Value as SqlValue,
};
use serde_json::{json, Value};

use super::{Database, Filter, Order, Row, Store, StoreError};

/// MySQL 存储，所有语句都使用参数绑定
pub struct MysqlStore {
    pool: Pool,
}

impl From<mysql::Error> for StoreError {
    fn from(value: mysql::Error) -> Self {
        match value {
            mysql::Error::MySqlError(e) if e.code == Database::DUPLICATE_KEY_ERROR_CODE => {
                StoreError::UniqueViolation(e.message)
            }
            mysql::Error::MySqlError(e) if e.code == Database::FOREIGN_KEY_ERROR_CODE => {
                StoreError::ForeignKeyViolation(e.message)
            }
            e @ (mysql::Error::IoError(_) | mysql::Error::DriverError(_)) => {
                StoreError::Unavailable(e.to_string())
            }
            e => StoreError::Other(e.to_string()),
        }
    }
}

impl MysqlStore {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = Pool::new(url)?;
        Ok(Self { pool })
    }
    /// 连接数据库
    fn get_conn(&self) -> Result<PooledConn, StoreError> {
        Ok(self.pool.get_conn()?)
    }
    pub fn create_tables(&self) -> Result<(), StoreError> {
        let mut conn = self.get_conn()?;
        let sql = include_str!("./table.sql");
        conn.query_drop(sql)?;
        Ok(())
    }
}

fn ident(name: &str) -> Result<String, StoreError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::Other(format!("invalid identifier {name:?}")));
    }
    Ok(format!("`{name}`"))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::NULL,
        Value::Bool(b) => SqlValue::Int(*b as i64),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Int)
            .or_else(|| n.as_f64().map(SqlValue::Double))
            .unwrap_or(SqlValue::NULL),
        Value::String(s) => SqlValue::Bytes(s.clone().into_bytes()),
        other => SqlValue::Bytes(other.to_string().into_bytes()),
    }
}

fn to_json(value: SqlValue, ty: ColumnType) -> Value {
    match value {
        SqlValue::NULL => Value::Null,
        SqlValue::Int(i) if ty == ColumnType::MYSQL_TYPE_TINY => json!(i != 0),
        SqlValue::Int(i) => json!(i),
        SqlValue::UInt(u) => json!(u),
        SqlValue::Float(f) => json!(f),
        SqlValue::Double(d) => json!(d),
        SqlValue::Bytes(b) => json!(String::from_utf8_lossy(&b)),
        SqlValue::Date(y, m, d, h, i, s, _) => {
            json!(format!("{y:04}-{m:02}-{d:02} {h:02}:{i:02}:{s:02}"))
        }
        SqlValue::Time(neg, d, h, i, s, _) => {
            let sign = if neg { "-" } else { "" };
            json!(format!("{sign}{:02}:{i:02}:{s:02}", d * 24 + h as u32))
        }
    }
}

/// 生成 WHERE 子句与对应的参数
fn where_clause(filters: &[Filter]) -> Result<(String, Vec<SqlValue>), StoreError> {
    if filters.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut parts = Vec::with_capacity(filters.len());
    let mut params = Vec::new();
    for filter in filters {
        let col = ident(filter.column())?;
        let part = match filter {
            Filter::Eq(_, v) => {
                params.push(to_sql(v));
                format!("{col} = ?")
            }
            Filter::Ne(_, v) => {
                params.push(to_sql(v));
                format!("{col} != ?")
            }
            Filter::In(_, vs) if vs.is_empty() => "1 = 0".to_owned(),
            Filter::In(_, vs) => {
                params.extend(vs.iter().map(to_sql));
                format!("{col} IN ({})", vec!["?"; vs.len()].join(", "))
            }
            Filter::IsNull(_) => format!("{col} IS NULL"),
            Filter::NotNull(_) => format!("{col} IS NOT NULL"),
            Filter::Gte(_, v) => {
                params.push(to_sql(v));
                format!("{col} >= ?")
            }
            Filter::Lt(_, v) => {
                params.push(to_sql(v));
                format!("{col} < ?")
            }
            Filter::Lte(_, v) => {
                params.push(to_sql(v));
                format!("{col} <= ?")
            }
        };
        parts.push(part);
    }
    Ok((format!(" WHERE {}", parts.join(" AND ")), params))
}

fn positional(params: Vec<SqlValue>) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params)
    }
}

fn query_rows(conn: &mut PooledConn, stmt: String, params: Vec<SqlValue>) -> Result<Vec<Row>, StoreError> {
    tracing::debug!("{stmt}");
    let rows: Vec<mysql::Row> = conn.exec(stmt, positional(params))?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let columns = row.columns();
            row.unwrap()
                .into_iter()
                .zip(columns.iter())
                .map(|(value, col)| (col.name_str().into_owned(), to_json(value, col.column_type())))
                .collect()
        })
        .collect())
}

impl Store for MysqlStore {
    fn select(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut conn = self.get_conn()?;
        let (clause, params) = where_clause(filters)?;
        let order = match order {
            Some(o) => format!(
                " ORDER BY {} {}",
                ident(o.column)?,
                op::ternary!(o.descending => "DESC", "ASC")
            ),
            None => String::new(),
        };
        query_rows(&mut conn, format!("SELECT * FROM {}{clause}{order}", ident(table)?), params)
    }

    fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let mut conn = self.get_conn()?;
        let id = row
            .get("id")
            .cloned()
            .ok_or_else(|| StoreError::Other(format!("insert into {table} without id")))?;
        let columns = row.keys().map(|k| ident(k)).collect::<Result<Vec<_>, _>>()?;
        let stmt = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            ident(table)?,
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        tracing::debug!("{stmt}");
        conn.exec_drop(stmt, positional(row.values().map(to_sql).collect()))?;
        let (clause, params) = where_clause(&[Filter::Eq("id", id)])?;
        query_rows(&mut conn, format!("SELECT * FROM {}{clause}", ident(table)?), params)?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }

    fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        let mut conn = self.get_conn()?;
        let table = ident(table)?;
        let (clause, params) = where_clause(filters)?;
        let ids: Vec<String> = conn.exec(format!("SELECT id FROM {table}{clause}"), positional(params))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let by_id = [Filter::is_in("id", ids)];
        let (clause, id_params) = where_clause(&by_id)?;
        if !patch.is_empty() {
            let mut sets = Vec::with_capacity(patch.len());
            let mut params = Vec::with_capacity(patch.len() + id_params.len());
            for (k, v) in &patch {
                sets.push(format!("{} = ?", ident(k)?));
                params.push(to_sql(v));
            }
            params.extend(id_params.iter().cloned());
            let stmt = format!("UPDATE {table} SET {}{clause}", sets.join(", "));
            tracing::debug!("{stmt}");
            conn.exec_drop(stmt, positional(params))?;
        }
        query_rows(&mut conn, format!("SELECT * FROM {table}{clause}"), id_params)
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let mut conn = self.get_conn()?;
        let (clause, params) = where_clause(filters)?;
        conn.exec_drop(format!("DELETE FROM {}{clause}", ident(table)?), positional(params))?;
        Ok(conn.affected_rows() as usize)
    }

    fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let mut conn = self.get_conn()?;
        let (clause, params) = where_clause(filters)?;
        let count: Option<u64> = conn.exec_first(
            format!("SELECT COUNT(*) FROM {}{clause}", ident(table)?),
            positional(params),
        )?;
        Ok(count.unwrap_or(0) as usize)
    }
}
