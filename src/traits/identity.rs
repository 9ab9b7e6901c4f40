//! Acting-user identity

use serde::{Deserialize, Serialize};

/// The signed-in user as reported by the auth collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl CurrentUser {
    pub fn new(id: i64, handle: impl Into<String>) -> Self {
        Self {
            id,
            handle: handle.into(),
            name: None,
            avatar: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Scalar fields written to the user's entity
    pub fn to_scalars(&self) -> Vec<(String, serde_json::Value)> {
        let mut values = vec![
            ("id".to_string(), self.id.into()),
            ("handle".to_string(), self.handle.clone().into()),
        ];
        if let Some(ref name) = self.name {
            values.push(("name".to_string(), name.clone().into()));
        }
        if let Some(ref avatar) = self.avatar {
            values.push(("profileImage".to_string(), avatar.clone().into()));
        }
        values
    }
}

/// How an author is shown next to a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDisplay {
    pub id: i64,
    pub handle: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

impl UserDisplay {
    /// `Name (@handle)`, or `@handle` when no name is set
    pub fn label(&self) -> String {
        match self.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => format!("{} (@{})", name, self.handle),
            None => format!("@{}", self.handle),
        }
    }
}

/// Source of the acting user
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;
}

/// Fixed identity, for hosts that resolve the user once per session
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<CurrentUser>,
}

impl StaticIdentity {
    pub fn signed_in(user: CurrentUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<CurrentUser> {
        self.user.clone()
    }
}
