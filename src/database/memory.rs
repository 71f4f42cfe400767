use std::cmp::Ordering;

use dashmap::DashMap;
use serde_json::Value;

use super::{Database, Filter, Order, Row, Store, StoreError};

/// 进程内存储，用于测试与本地演示
///
/// 过滤语义与 SQL 一致：NULL 不参与 `!=`、`>=`、`<` 比较。
#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, Vec<Row>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn column<'r>(row: &'r Row, name: &str) -> &'r Value {
    row.get(name).unwrap_or(&Value::Null)
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn same(left: &Value, right: &Value) -> bool {
    compare(left, right) == Some(Ordering::Equal)
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let value = column(row, filter.column());
    match filter {
        Filter::Eq(_, v) => same(value, v),
        Filter::Ne(_, v) => !value.is_null() && !same(value, v),
        Filter::In(_, vs) => vs.iter().any(|v| same(value, v)),
        Filter::IsNull(_) => value.is_null(),
        Filter::NotNull(_) => !value.is_null(),
        Filter::Gte(_, v) => matches!(compare(value, v), Some(Ordering::Greater | Ordering::Equal)),
        Filter::Lt(_, v) => compare(value, v) == Some(Ordering::Less),
        Filter::Lte(_, v) => matches!(compare(value, v), Some(Ordering::Less | Ordering::Equal)),
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(row, f))
}

/// 检查 `candidate` 是否与表中其它行冲突，`skip` 为正在更新的行下标
fn check_unique(
    table: &str,
    rows: &[Row],
    candidate: &Row,
    skip: Option<usize>,
) -> Result<(), StoreError> {
    let id = column(candidate, "id");
    if rows
        .iter()
        .enumerate()
        .any(|(i, r)| Some(i) != skip && same(column(r, "id"), id))
    {
        return Err(StoreError::UniqueViolation(format!("{table}.id")));
    }
    for (t, keys) in Database::UNIQUE_KEYS {
        if *t != table {
            continue;
        }
        let conflict = rows.iter().enumerate().any(|(i, r)| {
            Some(i) != skip
                && keys.iter().all(|k| {
                    let v = column(candidate, k);
                    !v.is_null() && same(column(r, k), v)
                })
        });
        if conflict {
            return Err(StoreError::UniqueViolation(format!("{table}.{}", keys.join("_"))));
        }
    }
    Ok(())
}

impl Store for MemoryStore {
    fn select(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<Order>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut rows: Vec<Row> = self
            .tables
            .get(table)
            .map(|t| t.iter().filter(|r| matches_all(r, filters)).cloned().collect())
            .unwrap_or_default();
        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let (a, b) = (column(a, order.column), column(b, order.column));
                let ord = match (a.is_null(), b.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => compare(a, b).unwrap_or(Ordering::Equal),
                };
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        Ok(rows)
    }

    fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        if column(&row, "id").is_null() {
            return Err(StoreError::Other(format!("insert into {table} without id")));
        }
        let mut rows = self.tables.entry(table.to_owned()).or_default();
        check_unique(table, &rows, &row, None)?;
        rows.push(row.clone());
        Ok(row)
    }

    fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        let Some(mut rows) = self.tables.get_mut(table) else {
            return Ok(Vec::new());
        };
        let targets: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| matches_all(r, filters))
            .map(|(i, _)| i)
            .collect();
        let mut updated = Vec::with_capacity(targets.len());
        for i in targets {
            let mut next = rows[i].clone();
            for (k, v) in &patch {
                next.insert(k.clone(), v.clone());
            }
            check_unique(table, &rows, &next, Some(i))?;
            rows[i] = next.clone();
            updated.push(next);
        }
        Ok(updated)
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let Some(mut rows) = self.tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !matches_all(r, filters));
        Ok(before - rows.len())
    }

    fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.iter().filter(|r| matches_all(r, filters)).count())
            .unwrap_or(0))
    }
}

/// 指定的表不可用，其余操作交给内存存储
#[cfg(test)]
pub(crate) struct UnavailableTable {
    pub inner: MemoryStore,
    pub table: &'static str,
}

#[cfg(test)]
impl UnavailableTable {
    fn check(&self, table: &str) -> Result<(), StoreError> {
        if table == self.table {
            Err(StoreError::Unavailable(format!("{table} is offline")))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
impl Store for UnavailableTable {
    fn select(&self, table: &str, filters: &[Filter], order: Option<Order>) -> Result<Vec<Row>, StoreError> {
        self.check(table)?;
        self.inner.select(table, filters, order)
    }
    fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        self.check(table)?;
        self.inner.insert(table, row)
    }
    fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        self.check(table)?;
        self.inner.update(table, filters, patch)
    }
    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        self.check(table)?;
        self.inner.delete(table, filters)
    }
    fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        self.check(table)?;
        self.inner.count(table, filters)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::patch;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, phone, status) in [("1", "9000000001", "scheduled"), ("2", "9000000002", "completed")] {
            store
                .insert("users", patch! {"id" => id, "phone" => phone, "status" => status, "parent_id" => Value::Null})
                .unwrap();
        }
        store
    }

    #[test]
    fn ne_skips_nulls_like_sql() {
        let store = store();
        store
            .insert("users", patch! {"id" => "3", "phone" => "9000000003", "status" => Value::Null})
            .unwrap();
        let rows = store.select("users", &[Filter::ne("status", "completed")], None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("1"));
    }

    #[test]
    fn unique_phone_is_enforced_on_insert_and_update() {
        let store = store();
        let dup = store.insert("users", patch! {"id" => "9", "phone" => "9000000001"});
        assert!(matches!(dup, Err(StoreError::UniqueViolation(_))));
        let clash = store.update("users", &[Filter::eq("id", "2")], patch! {"phone" => "9000000001"});
        assert!(matches!(clash, Err(StoreError::UniqueViolation(_))));
    }

    #[test]
    fn ordered_select_and_count() {
        let store = store();
        let rows = store.select("users", &[], Order::desc("phone")).unwrap();
        assert_eq!(rows[0]["id"], json!("2"));
        assert_eq!(store.count("users", &[Filter::IsNull("parent_id")]).unwrap(), 2);
        assert_eq!(store.delete("users", &[Filter::eq("id", "1")]).unwrap(), 1);
        assert_eq!(store.count("users", &[]).unwrap(), 1);
    }
}
