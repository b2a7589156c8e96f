use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MarketError;

id_newtype!(
    /// Identity of an authenticated user, issued by the auth collaborator.
    UserId
);
id_newtype!(
    /// Identity of a tenant (a business that posts orders).
    TenantId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Worker,
    TenantStaff,
    TenantAdmin,
    PlatformAdmin,
}

impl FromStr for Role {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "worker" => Ok(Role::Worker),
            "tenant_staff" => Ok(Role::TenantStaff),
            "tenant_admin" => Ok(Role::TenantAdmin),
            "platform_admin" => Ok(Role::PlatformAdmin),
            other => Err(MarketError::Validation(format!("unknown role `{other}`"))),
        }
    }
}

/// The already-authenticated caller of a core operation.
///
/// The core trusts this context; credential checks happen upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub tenant_id: Option<TenantId>,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, tenant_id: Option<TenantId>, role: Role) -> Self {
        Self {
            user_id,
            tenant_id,
            role,
        }
    }

    pub fn worker(user_id: u64, tenant_id: Option<u64>) -> Self {
        Self::new(UserId(user_id), tenant_id.map(TenantId), Role::Worker)
    }

    pub fn tenant_staff(user_id: u64, tenant_id: u64) -> Self {
        Self::new(UserId(user_id), Some(TenantId(tenant_id)), Role::TenantStaff)
    }

    pub fn tenant_admin(user_id: u64, tenant_id: u64) -> Self {
        Self::new(UserId(user_id), Some(TenantId(tenant_id)), Role::TenantAdmin)
    }

    pub fn platform_admin(user_id: u64) -> Self {
        Self::new(UserId(user_id), None, Role::PlatformAdmin)
    }

    pub fn is_platform_admin(&self) -> bool {
        self.role == Role::PlatformAdmin
    }

    /// Staff or admin of the given tenant.
    pub fn is_member_of(&self, tenant: TenantId) -> bool {
        matches!(self.role, Role::TenantStaff | Role::TenantAdmin) && self.tenant_id == Some(tenant)
    }
}
