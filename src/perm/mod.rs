pub mod action;
pub mod roles;
pub mod team;

use crate::{database::Filter, pages::User};

pub use self::action::{Action, Denial};
pub use self::roles::Role;
pub use self::team::{activate, deactivate_cascade, resolve_team, Team};

/// 判断 `actor` 能否执行 `action`
///
/// 纯函数，不访问存储。团队相关的判断由调用方先解析好团队再传入。
pub fn authorize(actor: &User, action: Action) -> Result<(), Denial> {
    let role = actor.role;
    match action {
        Action::CreateUser(Role::Owner) => Err(Denial::OwnerNotCreatable),
        Action::CreateUser(Role::Admin) => {
            crate::do_if!(role.is_owner() => Ok(()), Err(Denial::OnlyOwnerCreatesAdmins))
        }
        Action::CreateUser(_) => {
            crate::do_if!(role.is_admin() => Ok(()), Err(Denial::OnlyAdminsCreateStaff))
        }
        Action::CreateLeads => {
            crate::do_if!(role.is_admin() => Ok(()), Err(Denial::OnlyAdminsCreateLeads))
        }
        Action::UploadLeads => {
            crate::do_if!(role.is_admin() => Ok(()), Err(Denial::OnlyAdminsUploadLeads))
        }
        Action::AssignLead { assignee, team } => {
            if !role.is_manager() {
                Err(Denial::InsufficientRole)
            } else if !team.contains(assignee) {
                Err(Denial::AssigneeOutsideTeam)
            } else {
                Ok(())
            }
        }
        Action::UpdateLead {
            assigned_to,
            created_by,
        } => {
            if assigned_to == Some(actor.id.as_str()) || created_by == actor.id {
                Ok(())
            } else {
                Err(Denial::NotLeadParticipant)
            }
        }
        Action::SoftDeleteLead { created_by } => {
            if role.is_owner() || (role == Role::Admin && created_by == actor.id) {
                Ok(())
            } else {
                Err(Denial::NotLeadDeleter)
            }
        }
        Action::RestoreLead
        | Action::PurgeLead
        | Action::ViewTeamTargets
        | Action::ApproveBonus
        | Action::ManageTemplates => {
            crate::do_if!(role.is_admin() => Ok(()), Err(Denial::InsufficientRole))
        }
        Action::ActivateUser { target, team } => {
            if !role.is_manager() {
                Err(Denial::InsufficientRole)
            } else if !team.contains(target) {
                Err(Denial::ActivateOutsideTeam)
            } else {
                Ok(())
            }
        }
        Action::DeactivateUser { target, team } => {
            if !role.is_manager() {
                Err(Denial::InsufficientRole)
            } else if !team.contains(target) {
                Err(Denial::DeactivateOutsideTeam)
            } else {
                Ok(())
            }
        }
        Action::SetTarget { target, team } => {
            if !role.is_admin() {
                Err(Denial::InsufficientRole)
            } else if !team.contains(target) {
                Err(Denial::TargetOutsideTeam)
            } else {
                Ok(())
            }
        }
        Action::MutateProperties => {
            crate::do_if!(role.is_owner() => Ok(()), Err(Denial::NotOwner))
        }
    }
}

/// 客户的可见范围：owner 全部，admin 自己创建的，其余为分配给自己的
pub fn lead_scope(actor: &User) -> Option<Filter> {
    match actor.role {
        Role::Owner => None,
        Role::Admin => Some(Filter::eq("created_by", actor.id.as_str())),
        Role::Manager | Role::Employee => Some(Filter::eq("assigned_to", actor.id.as_str())),
    }
}
