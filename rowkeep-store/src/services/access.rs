//! Role lookup collaborator
//!
//! Identity and role storage live outside this crate; the store only needs
//! to know whether a reader is an admin.

use crate::error::StoreResult;
use async_trait::async_trait;
use std::collections::HashSet;

/// Role that sees every dataset regardless of visibility or grants
pub const ADMIN_ROLE: &str = "admin";

/// Role reported for everyone else by [`StaticRoleLookup`]
pub const MEMBER_ROLE: &str = "member";

#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn role(&self, user_id: &str) -> StoreResult<String>;
}

/// Fixed admin list, e.g. from the command line
#[derive(Debug, Clone, Default)]
pub struct StaticRoleLookup {
    admins: HashSet<String>,
}

impl StaticRoleLookup {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admins: admins.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl RoleLookup for StaticRoleLookup {
    async fn role(&self, user_id: &str) -> StoreResult<String> {
        let role = if self.admins.contains(user_id) { ADMIN_ROLE } else { MEMBER_ROLE };
        Ok(role.to_string())
    }
}

/// True when the collaborator reports the admin role
pub async fn is_admin(roles: &dyn RoleLookup, user_id: &str) -> StoreResult<bool> {
    Ok(roles.role(user_id).await? == ADMIN_ROLE)
}
