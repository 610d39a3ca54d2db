//! Identity domain entity
//!
//! An [`Identity`] is the authenticated principal whose data the local
//! cache currently holds. It is immutable; switching users replaces it
//! wholesale.

use serde::{Deserialize, Serialize};

use super::newtypes::{Email, IdentityId};

/// Role granted to an identity by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Organisation administrator
    Admin,
    /// Regular account owner; also the fallback for roles this client does not know
    #[default]
    #[serde(other)]
    Member,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// The authenticated principal owning the local cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    id: IdentityId,
    email: Email,
    display_name: String,
    #[serde(default)]
    is_super_admin: bool,
    #[serde(default)]
    role: Role,
}

impl Identity {
    /// Creates a member identity
    pub fn new(id: IdentityId, email: Email, display_name: impl Into<String>) -> Self {
        Self {
            id,
            email,
            display_name: display_name.into(),
            is_super_admin: false,
            role: Role::Member,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_super_admin(mut self, is_super_admin: bool) -> Self {
        self.is_super_admin = is_super_admin;
        self
    }

    pub fn id(&self) -> &IdentityId {
        &self.id
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_super_admin(&self) -> bool {
        self.is_super_admin
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Two identities are the same principal when their ids match
    pub fn is_same_principal(&self, other: &Identity) -> bool {
        self.id == other.id
    }
}

/// Outcome of comparing a signing-in identity against the cached one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SwitchDetection {
    /// No identity owns the cache yet
    FirstLogin,
    /// The cache already belongs to this identity
    SameUser,
    /// The cache belongs to a different identity that must be swapped out
    Switch {
        /// Identity currently owning the cache
        from: IdentityId,
        /// Identity signing in
        to: IdentityId,
    },
}

impl SwitchDetection {
    /// Classifies a sign-in against the identity currently owning the cache
    pub fn detect(current: Option<&Identity>, incoming: &Identity) -> Self {
        match current {
            None => SwitchDetection::FirstLogin,
            Some(current) if current.is_same_principal(incoming) => SwitchDetection::SameUser,
            Some(current) => SwitchDetection::Switch {
                from: *current.id(),
                to: *incoming.id(),
            },
        }
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, SwitchDetection::Switch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str) -> Identity {
        Identity::new(
            IdentityId::new(),
            Email::new(email.to_string()).unwrap(),
            email.split('@').next().unwrap(),
        )
    }

    #[test]
    fn detects_first_login() {
        let incoming = identity("ana@example.com");
        assert_eq!(
            SwitchDetection::detect(None, &incoming),
            SwitchDetection::FirstLogin
        );
    }

    #[test]
    fn detects_same_user() {
        let current = identity("ana@example.com");
        let again = current.clone();
        assert_eq!(
            SwitchDetection::detect(Some(&current), &again),
            SwitchDetection::SameUser
        );
    }

    #[test]
    fn detects_switch() {
        let current = identity("ana@example.com");
        let incoming = identity("luis@example.com");
        let detection = SwitchDetection::detect(Some(&current), &incoming);
        assert!(detection.is_switch());
        assert_eq!(
            detection,
            SwitchDetection::Switch {
                from: *current.id(),
                to: *incoming.id()
            }
        );
    }

    #[test]
    fn unknown_role_deserializes_as_member() {
        let role: Role = serde_json::from_str("\"auditor\"").unwrap();
        assert_eq!(role, Role::Member);
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn identity_with_unknown_role_loads_as_member() {
        let mut json = serde_json::to_value(identity("ana@example.com").with_role(Role::Admin))
            .unwrap();
        json["role"] = serde_json::json!("owner");
        let loaded: Identity = serde_json::from_value(json).unwrap();
        assert_eq!(loaded.role(), Role::Member);
    }

    #[test]
    fn builder_sets_flags() {
        let id = identity("root@example.com")
            .with_role(Role::Admin)
            .with_super_admin(true);
        assert!(id.is_super_admin());
        assert_eq!(id.role(), Role::Admin);
        assert_eq!(id.display_name(), "root");
    }
}
