use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// 角色，按资历从低到高排列
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Employee,
    Manager,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
    pub fn is_owner(self) -> bool {
        self == Role::Owner
    }
    /// owner 或 admin
    pub fn is_admin(self) -> bool {
        self >= Role::Admin
    }
    /// owner、admin 或 manager
    pub fn is_manager(self) -> bool {
        self >= Role::Manager
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seniority_order() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Manager);
        assert!(Role::Manager > Role::Employee);
        assert!(Role::Admin.is_admin() && !Role::Manager.is_admin());
        assert!(Role::Manager.is_manager() && !Role::Employee.is_manager());
    }

    #[test]
    fn roles_are_lowercase_on_the_wire() {
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "admin");
        let role: Role = serde_json::from_value("employee".into()).unwrap();
        assert_eq!(role, Role::Employee);
        assert!(serde_json::from_value::<Role>("root".into()).is_err());
    }
}
