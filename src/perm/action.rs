use super::{roles::Role, team::Team};

/// 需要鉴权的操作，附带判断所需的资源信息
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    /// 创建指定角色的用户
    CreateUser(Role),
    /// 单条或 CSV 批量创建客户
    CreateLeads,
    /// JSON 批量上传客户
    UploadLeads,
    AssignLead {
        assignee: &'a str,
        team: &'a Team,
    },
    UpdateLead {
        assigned_to: Option<&'a str>,
        created_by: &'a str,
    },
    SoftDeleteLead {
        created_by: &'a str,
    },
    RestoreLead,
    PurgeLead,
    ActivateUser {
        target: &'a str,
        team: &'a Team,
    },
    DeactivateUser {
        target: &'a str,
        team: &'a Team,
    },
    SetTarget {
        target: &'a str,
        team: &'a Team,
    },
    ViewTeamTargets,
    ApproveBonus,
    ManageTemplates,
    MutateProperties,
}

/// 拒绝原因，每种原因的提示都不同
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("Only owner can create admins")]
    OnlyOwnerCreatesAdmins,
    #[error("Only admins can create managers and employees")]
    OnlyAdminsCreateStaff,
    #[error("Owner account can only be created through initialization")]
    OwnerNotCreatable,
    #[error("Only admins can create leads")]
    OnlyAdminsCreateLeads,
    #[error("Only admins can upload leads")]
    OnlyAdminsUploadLeads,
    #[error("Insufficient permissions")]
    InsufficientRole,
    #[error("Only owner can manage properties")]
    NotOwner,
    #[error("Cannot assign to user outside your team")]
    AssigneeOutsideTeam,
    #[error("You do not have permission to update this lead")]
    NotLeadParticipant,
    #[error("Only owner or the admin who created the lead can delete it")]
    NotLeadDeleter,
    #[error("You do not have permission to activate this user")]
    ActivateOutsideTeam,
    #[error("You do not have permission to deactivate this user")]
    DeactivateOutsideTeam,
    #[error("Cannot set target for user outside your team")]
    TargetOutsideTeam,
}

impl From<Denial> for crate::Response {
    fn from(value: Denial) -> Self {
        crate::Response::permission_denied(value)
    }
}
