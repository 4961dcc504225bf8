//! Access control entries and lists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Internal sentinels stored in place of the configured display aliases.
pub mod principals {
    pub const ANONYMOUS_IN_DB: &str = "__anonymous__";
    pub const ANYONE_IN_DB: &str = "__anyone__";
}

/// Basic permissions, each implying the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    All,
}

impl Permission {
    pub const READ: &'static str = "cmis:read";
    pub const WRITE: &'static str = "cmis:write";
    pub const ALL: &'static str = "cmis:all";

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => Self::READ,
            Permission::Write => Self::WRITE,
            Permission::All => Self::ALL,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            Self::READ => Some(Permission::Read),
            Self::WRITE => Some(Permission::Write),
            Self::ALL => Some(Permission::All),
            _ => None,
        }
    }

    /// Whether holding `granted` satisfies `self`.
    pub fn is_satisfied_by(&self, granted: &str) -> bool {
        Permission::parse(granted).is_some_and(|g| g >= *self)
    }
}

/// A single access control entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ace {
    pub principal_id: String,
    pub permissions: BTreeSet<String>,
    /// False for entries computed from an ancestor.
    pub direct: bool,
    /// Entry applies to this object only and is not inherited by children.
    pub object_only: bool,
}

impl Ace {
    pub fn new<I, S>(principal_id: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            principal_id: principal_id.to_string(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            direct: true,
            object_only: false,
        }
    }

    pub fn grants(&self, required: Permission) -> bool {
        self.permissions.iter().any(|p| required.is_satisfied_by(p))
    }
}

/// Ordered access control list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub aces: Vec<Ace>,
}

impl Acl {
    pub fn new(aces: Vec<Ace>) -> Self {
        Self { aces }
    }

    pub fn is_empty(&self) -> bool {
        self.aces.is_empty()
    }

    pub fn get(&self, principal_id: &str) -> Option<&Ace> {
        self.aces.iter().find(|a| a.principal_id == principal_id)
    }

    pub fn direct_aces(&self) -> impl Iterator<Item = &Ace> {
        self.aces.iter().filter(|a| a.direct)
    }

    pub fn principals(&self) -> impl Iterator<Item = &str> {
        self.aces.iter().map(|a| a.principal_id.as_str())
    }
}

/// How an applied ACL spreads to descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AclPropagation {
    ObjectOnly,
    Propagate,
    #[default]
    RepositoryDetermined,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_implication() {
        assert!(Permission::Read.is_satisfied_by(Permission::ALL));
        assert!(Permission::Read.is_satisfied_by(Permission::WRITE));
        assert!(Permission::Write.is_satisfied_by(Permission::ALL));
        assert!(!Permission::Write.is_satisfied_by(Permission::READ));
        assert!(!Permission::All.is_satisfied_by(Permission::WRITE));
        assert!(!Permission::Read.is_satisfied_by("acme:approve"));
    }

    #[test]
    fn test_ace_grants() {
        let ace = Ace::new("u1", [Permission::WRITE]);
        assert!(ace.grants(Permission::Read));
        assert!(ace.grants(Permission::Write));
        assert!(!ace.grants(Permission::All));
    }
}
