use std::collections::{HashSet, VecDeque};

use crate::{
    database::{Database, Filter, Order, Store, StoreError},
    pages::User,
    patch,
};

/// 用户本人及其所有下属
#[derive(Debug, Default, Clone)]
pub struct Team {
    members: Vec<User>,
}

impl Team {
    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m.id == id)
    }
    pub fn ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }
    pub fn members(&self) -> &[User] {
        &self.members
    }
    pub fn into_members(self) -> Vec<User> {
        self.members
    }
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
    /// 按 id 或手机号查找成员
    pub fn find(&self, id_or_phone: &str) -> Option<&User> {
        self.members
            .iter()
            .find(|m| m.id == id_or_phone || m.phone == id_or_phone)
    }
}

/// 从 `user_id` 开始沿 parent_id 向下逐层展开
///
/// 本人在首位，其余按广度优先顺序排列。已访问的 id 不会再次展开，
/// 用户不存在时返回空团队。
pub fn resolve_team(store: &dyn Store, user_id: &str) -> Result<Team, StoreError> {
    let Some(root) = store.first_as::<User>(Database::USERS, &[Filter::eq("id", user_id)])? else {
        return Ok(Team::default());
    };
    let mut visited = HashSet::from([root.id.clone()]);
    let mut queue = VecDeque::from([root.id.clone()]);
    let mut members = vec![root];
    while let Some(parent) = queue.pop_front() {
        let children: Vec<User> = store.select_as(
            Database::USERS,
            &[Filter::eq("parent_id", parent)],
            Order::asc("created_at"),
        )?;
        for child in children {
            if visited.insert(child.id.clone()) {
                queue.push_back(child.id.clone());
                members.push(child);
            }
        }
    }
    Ok(Team { members })
}

/// 停用用户及其整个团队，逐行更新
///
/// 已停用的行跳过，中途失败后可以重新执行。返回本次实际停用的人数。
pub fn deactivate_cascade(store: &dyn Store, user_id: &str, now: &str) -> Result<usize, StoreError> {
    let team = resolve_team(store, user_id)?;
    if team.is_empty() {
        return Err(StoreError::NotFound);
    }
    let mut changed = 0;
    for member in team.members().iter().filter(|m| m.is_active) {
        store.update(
            Database::USERS,
            &[Filter::eq("id", member.id.as_str())],
            patch! {"is_active" => false, "updated_at" => now},
        )?;
        changed += 1;
    }
    tracing::info!("deactivated {changed} user(s) under {user_id}");
    Ok(changed)
}

/// 只启用该用户本人，下属保持原状
pub fn activate(store: &dyn Store, user_id: &str, now: &str) -> Result<User, StoreError> {
    let user = store.update_by_id(
        Database::USERS,
        user_id,
        patch! {"is_active" => true, "updated_at" => now},
    )?;
    tracing::info!("activated user {user_id}");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::database::MemoryStore;

    const NOW: &str = "2024-02-01 10:00:00";

    fn add(store: &dyn Store, id: &str, role: &str, parent: Option<&str>) {
        store
            .insert(
                Database::USERS,
                patch! {
                    "id" => id,
                    "name" => format!("user {id}"),
                    "phone" => format!("90000000{:02}", store.count(Database::USERS, &[]).unwrap()),
                    "password_hash" => "",
                    "role" => role,
                    "parent_id" => parent,
                    "is_active" => true,
                    "created_at" => NOW,
                },
            )
            .unwrap();
    }

    /// owner -> admin -> {manager -> {e1, e2}, e3}
    fn tree() -> MemoryStore {
        let store = MemoryStore::new();
        add(&store, "owner", "owner", None);
        add(&store, "admin", "admin", Some("owner"));
        add(&store, "manager", "manager", Some("admin"));
        add(&store, "e1", "employee", Some("manager"));
        add(&store, "e2", "employee", Some("manager"));
        add(&store, "e3", "employee", Some("admin"));
        store
    }

    fn active(store: &dyn Store, id: &str) -> bool {
        let rows = store.select(Database::USERS, &[Filter::eq("id", id)], None).unwrap();
        rows[0]["is_active"] == Value::Bool(true)
    }

    #[test]
    fn team_starts_with_user_and_is_closed_under_parent() {
        let store = tree();
        let team = resolve_team(&store, "admin").unwrap();
        assert_eq!(team.members()[0].id, "admin");
        assert_eq!(team.ids().len(), 5);
        let all: Vec<User> = (&store as &dyn Store).select_as(Database::USERS, &[], None).unwrap();
        for user in &all {
            if user.parent_id.as_deref().is_some_and(|p| team.contains(p)) {
                assert!(team.contains(&user.id), "{} missing", user.id);
            }
        }
        assert!(!team.contains("owner"));
    }

    #[test]
    fn breadth_first_order() {
        let store = tree();
        let ids = resolve_team(&store, "admin").unwrap().ids();
        let pos = |id: &str| ids.iter().position(|i| i == id).unwrap();
        assert!(pos("manager") < pos("e1"));
        assert!(pos("e3") < pos("e1"));
    }

    #[test]
    fn unknown_user_has_empty_team() {
        let store = tree();
        assert!(resolve_team(&store, "ghost").unwrap().is_empty());
    }

    #[test]
    fn corrupted_cycle_terminates() {
        let store = MemoryStore::new();
        add(&store, "a", "manager", Some("b"));
        add(&store, "b", "manager", Some("a"));
        let team = resolve_team(&store, "a").unwrap();
        assert_eq!(team.ids(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn deactivation_cascades_and_is_idempotent() {
        let store = tree();
        assert_eq!(deactivate_cascade(&store, "manager", NOW).unwrap(), 3);
        for id in ["manager", "e1", "e2"] {
            assert!(!active(&store, id));
        }
        assert!(active(&store, "e3"));
        assert_eq!(deactivate_cascade(&store, "manager", NOW).unwrap(), 0);
    }

    #[test]
    fn activation_does_not_cascade() {
        let store = tree();
        deactivate_cascade(&store, "manager", NOW).unwrap();
        let user = activate(&store, "manager", NOW).unwrap();
        assert!(user.is_active);
        assert!(!active(&store, "e1"));
        assert!(!active(&store, "e2"));
    }
}
