/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// User roles. Only `Admin` is privileged for authorization checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Moderator,
    #[default]
    User,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Moderator => "MODERATOR",
            Role::User => "USER",
            Role::Guest => "GUEST",
        }
    }

    /// Roles that may not be self-assigned at public registration
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MODERATOR" => Ok(Role::Moderator),
            "USER" => Ok(Role::User),
            "GUEST" => Ok(Role::Guest),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// The authenticated caller on whose behalf an operation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owner-only unless the caller is an admin
    pub fn can_access(&self, owner_id: i64) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}
