//! ACL engine
//!
//! This module holds everything the service layer needs to answer "may this
//! caller do that":
//! - effective ACL computation along the inheritance chain
//! - principal alias normalization between display and stored form
//! - the permission evaluator and the allowable-action table

use log::debug;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::{RepositoryError, RepositoryResult};
use crate::model::acl::principals::{ANONYMOUS_IN_DB, ANYONE_IN_DB};
use crate::model::{Ace, Acl, AclPropagation, BaseType, Content, ContentStreamAllowed, Permission};
use crate::model::{TypeDefinition, VersionSeries};

/// Identity of the caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub user: String,
    pub groups: Vec<String>,
}

impl CallContext {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// Translation between the configured "anonymous"/"anyone" aliases and the
/// sentinels the store holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalAliases {
    pub anonymous: String,
    pub anyone: String,
}

impl PrincipalAliases {
    pub fn new(anonymous: &str, anyone: &str) -> Self {
        Self {
            anonymous: anonymous.to_string(),
            anyone: anyone.to_string(),
        }
    }

    pub fn to_stored(&self, principal: &str) -> String {
        if principal == self.anonymous {
            ANONYMOUS_IN_DB.to_string()
        } else if principal == self.anyone {
            ANYONE_IN_DB.to_string()
        } else {
            principal.to_string()
        }
    }

    pub fn to_display(&self, principal: &str) -> String {
        match principal {
            ANONYMOUS_IN_DB => self.anonymous.clone(),
            ANYONE_IN_DB => self.anyone.clone(),
            other => other.to_string(),
        }
    }

    pub fn stored_acl(&self, acl: &Acl) -> Acl {
        self.map_acl(acl, |p| self.to_stored(p))
    }

    pub fn display_acl(&self, acl: &Acl) -> Acl {
        self.map_acl(acl, |p| self.to_display(p))
    }

    fn map_acl(&self, acl: &Acl, f: impl Fn(&str) -> String) -> Acl {
        Acl::new(
            acl.aces
                .iter()
                .map(|ace| Ace {
                    principal_id: f(&ace.principal_id),
                    ..ace.clone()
                })
                .collect(),
        )
    }
}

impl Default for PrincipalAliases {
    fn default() -> Self {
        Self::new("anonymous", "anyone")
    }
}

/// Compute the effective ACL of `content`.
///
/// `lookup` resolves parent ids. The root (`root_id`), unfiled objects and
/// objects with `acl_inherited == false` contribute their local ACL only.
/// For each principal the nearest level carrying an entry wins: a direct
/// entry hides every inherited one, and a closer ancestor hides a farther.
pub fn effective_acl(
    content: &Content,
    root_id: &str,
    lookup: &mut dyn FnMut(&str) -> RepositoryResult<Content>,
) -> RepositoryResult<Acl> {
    let mut aces: Vec<Ace> = content
        .acl
        .aces
        .iter()
        .map(|ace| Ace {
            direct: true,
            ..ace.clone()
        })
        .collect();
    let mut covered: HashSet<String> = aces.iter().map(|a| a.principal_id.clone()).collect();

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(content.id.clone());
    let mut next = inheritance_parent(content, root_id);

    while let Some(parent_id) = next {
        if !visited.insert(parent_id.clone()) {
            return Err(RepositoryError::Internal(format!(
                "Cycle in folder hierarchy at {}",
                parent_id
            )));
        }
        let parent = lookup(&parent_id)?;
        let level: Vec<&Ace> = parent
            .acl
            .aces
            .iter()
            .filter(|a| !a.object_only && !covered.contains(&a.principal_id))
            .collect();
        for ace in &level {
            match aces
                .iter_mut()
                .find(|a| !a.direct && a.principal_id == ace.principal_id)
            {
                Some(existing) => existing.permissions.extend(ace.permissions.iter().cloned()),
                None => aces.push(Ace {
                    direct: false,
                    object_only: false,
                    ..(*ace).clone()
                }),
            }
        }
        covered.extend(level.iter().map(|a| a.principal_id.clone()));
        next = inheritance_parent(&parent, root_id);
    }

    Ok(Acl::new(aces))
}

fn inheritance_parent(content: &Content, root_id: &str) -> Option<String> {
    if !content.acl_inherited || content.id == root_id {
        return None;
    }
    content.parent_id.clone()
}

/// Turn the ACEs of an apply request into the local ACL to store.
///
/// Non-direct entries are dropped, principals are translated to stored form
/// and `object_only` follows `propagation`.
pub fn local_acl_from_request(
    aces: &[Ace],
    propagation: AclPropagation,
    aliases: &PrincipalAliases,
) -> Acl {
    let object_only = matches!(propagation, AclPropagation::ObjectOnly);
    Acl::new(
        aces.iter()
            .filter(|a| a.direct)
            .map(|a| Ace {
                principal_id: aliases.to_stored(&a.principal_id),
                permissions: a.permissions.clone(),
                direct: true,
                object_only,
            })
            .collect(),
    )
}

/// Evaluates permissions of a caller against an effective ACL.
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    aliases: PrincipalAliases,
    admins: Vec<String>,
}

impl PermissionEvaluator {
    pub fn new(aliases: PrincipalAliases, admins: Vec<String>) -> Self {
        Self { aliases, admins }
    }

    pub fn aliases(&self) -> &PrincipalAliases {
        &self.aliases
    }

    pub fn is_admin(&self, ctx: &CallContext) -> bool {
        self.admins.iter().any(|a| *a == ctx.user)
    }

    fn matches(&self, ctx: &CallContext, principal: &str) -> bool {
        principal == ANYONE_IN_DB
            || principal == self.aliases.to_stored(&ctx.user)
            || ctx.groups.iter().any(|g| g == principal)
    }

    /// Whether `acl` (stored form) grants `required` to the caller.
    pub fn has_permission(&self, ctx: &CallContext, acl: &Acl, required: Permission) -> bool {
        if self.is_admin(ctx) {
            return true;
        }
        acl.aces
            .iter()
            .any(|ace| self.matches(ctx, &ace.principal_id) && ace.grants(required))
    }

    pub fn check(
        &self,
        ctx: &CallContext,
        acl: &Acl,
        action: Action,
        object_id: &str,
    ) -> RepositoryResult<()> {
        if self.has_permission(ctx, acl, action.required_permission()) {
            Ok(())
        } else {
            debug!(
                "PermissionEvaluator::check: {} denied {} on {}",
                ctx.user, action, object_id
            );
            Err(RepositoryError::PermissionDenied(format!(
                "{} requires {} on {}",
                action,
                action.required_permission().as_str(),
                object_id
            )))
        }
    }

    /// Allowable actions of an object for the caller.
    pub fn allowable_actions(
        &self,
        ctx: &CallContext,
        state: &ObjectState<'_>,
        acl: &Acl,
    ) -> BTreeSet<Action> {
        let admin = self.is_admin(ctx);
        Action::ALL
            .iter()
            .copied()
            .filter(|action| action.applies(state, ctx, admin))
            .filter(|action| admin || self.has_permission(ctx, acl, action.required_permission()))
            .collect()
    }
}

/// Facts about an object that decide which actions apply to it.
pub struct ObjectState<'a> {
    pub content: &'a Content,
    pub type_def: &'a TypeDefinition,
    pub series: Option<&'a VersionSeries>,
    pub is_root: bool,
}

impl ObjectState<'_> {
    fn is_checked_out(&self) -> bool {
        self.series.is_some_and(|s| s.checked_out)
    }

    fn has_stream(&self) -> bool {
        self.content
            .as_document()
            .is_some_and(|d| d.attachment_ref.is_some())
    }

    fn is_latest(&self) -> bool {
        self.content.as_document().is_some_and(|d| d.is_latest_version)
    }

    /// Versioned documents are writable on the PWC while checked out and on
    /// the latest version otherwise.
    fn version_writable(&self, ctx: &CallContext, admin: bool) -> bool {
        let Some(doc) = self.content.as_document() else {
            return true;
        };
        if !self.type_def.versionable {
            return true;
        }
        if doc.is_private_working_copy {
            return admin || doc.checked_out_by.as_deref() == Some(ctx.user.as_str());
        }
        !self.is_checked_out() && doc.is_latest_version
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    GetProperties,
    GetContentStream,
    GetChildren,
    GetObjectParents,
    GetAllVersions,
    GetObjectRelationships,
    GetAcl,
    UpdateProperties,
    SetContentStream,
    AppendContentStream,
    DeleteContentStream,
    CheckOut,
    CancelCheckOut,
    CheckIn,
    MoveObject,
    DeleteObject,
    DeleteTree,
    CreateDocument,
    CreateFolder,
    CreateItem,
    CreatePolicy,
    CreateRelationship,
    ApplyAcl,
    ApplyPolicy,
    RemovePolicy,
    GetAppliedPolicies,
    GetRenditions,
}

impl Action {
    pub const ALL: &'static [Action] = &[
        Action::GetProperties,
        Action::GetContentStream,
        Action::GetChildren,
        Action::GetObjectParents,
        Action::GetAllVersions,
        Action::GetObjectRelationships,
        Action::GetAcl,
        Action::UpdateProperties,
        Action::SetContentStream,
        Action::AppendContentStream,
        Action::DeleteContentStream,
        Action::CheckOut,
        Action::CancelCheckOut,
        Action::CheckIn,
        Action::MoveObject,
        Action::DeleteObject,
        Action::DeleteTree,
        Action::CreateDocument,
        Action::CreateFolder,
        Action::CreateItem,
        Action::CreatePolicy,
        Action::CreateRelationship,
        Action::ApplyAcl,
        Action::ApplyPolicy,
        Action::RemovePolicy,
        Action::GetAppliedPolicies,
        Action::GetRenditions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetProperties => "canGetProperties",
            Action::GetContentStream => "canGetContentStream",
            Action::GetChildren => "canGetChildren",
            Action::GetObjectParents => "canGetObjectParents",
            Action::GetAllVersions => "canGetAllVersions",
            Action::GetObjectRelationships => "canGetObjectRelationships",
            Action::GetAcl => "canGetACL",
            Action::UpdateProperties => "canUpdateProperties",
            Action::SetContentStream => "canSetContentStream",
            Action::AppendContentStream => "canAppendContentStream",
            Action::DeleteContentStream => "canDeleteContentStream",
            Action::CheckOut => "canCheckOut",
            Action::CancelCheckOut => "canCancelCheckOut",
            Action::CheckIn => "canCheckIn",
            Action::MoveObject => "canMoveObject",
            Action::DeleteObject => "canDeleteObject",
            Action::DeleteTree => "canDeleteTree",
            Action::CreateDocument => "canCreateDocument",
            Action::CreateFolder => "canCreateFolder",
            Action::CreateItem => "canCreateItem",
            Action::CreatePolicy => "canCreatePolicy",
            Action::CreateRelationship => "canCreateRelationship",
            Action::ApplyAcl => "canApplyACL",
            Action::ApplyPolicy => "canApplyPolicy",
            Action::RemovePolicy => "canRemovePolicy",
            Action::GetAppliedPolicies => "canGetAppliedPolicies",
            Action::GetRenditions => "canGetRenditions",
        }
    }

    pub fn required_permission(&self) -> Permission {
        match self {
            Action::GetProperties
            | Action::GetContentStream
            | Action::GetChildren
            | Action::GetObjectParents
            | Action::GetAllVersions
            | Action::GetObjectRelationships
            | Action::GetAcl
            | Action::GetAppliedPolicies
            | Action::GetRenditions
            | Action::CreateRelationship => Permission::Read,
            Action::UpdateProperties
            | Action::SetContentStream
            | Action::AppendContentStream
            | Action::DeleteContentStream
            | Action::CheckOut
            | Action::CancelCheckOut
            | Action::CheckIn
            | Action::MoveObject
            | Action::CreateDocument
            | Action::CreateFolder
            | Action::CreateItem
            | Action::CreatePolicy
            | Action::ApplyPolicy
            | Action::RemovePolicy => Permission::Write,
            Action::DeleteObject | Action::DeleteTree | Action::ApplyAcl => Permission::All,
        }
    }

    fn applies(&self, s: &ObjectState<'_>, ctx: &CallContext, admin: bool) -> bool {
        let base = s.content.base_type();
        let is_folder = base == BaseType::Folder;
        let is_document = base == BaseType::Document;
        let stream = s.type_def.content_stream_allowed;
        let pwc = s.content.is_private_working_copy();
        let pwc_owner = admin
            || s.content
                .as_document()
                .and_then(|d| d.checked_out_by.as_deref())
                == Some(ctx.user.as_str());

        match self {
            Action::GetProperties | Action::GetObjectRelationships => true,
            Action::GetContentStream => is_document && s.has_stream(),
            Action::GetChildren
            | Action::CreateDocument
            | Action::CreateFolder
            | Action::CreateItem
            | Action::CreatePolicy => is_folder,
            Action::GetObjectParents => base.is_fileable() && !s.is_root,
            Action::GetAllVersions => is_document,
            Action::GetAcl => true,
            Action::UpdateProperties => !s.content.immutable && s.version_writable(ctx, admin),
            Action::SetContentStream | Action::AppendContentStream => {
                is_document
                    && stream != ContentStreamAllowed::NotAllowed
                    && !s.content.immutable
                    && s.version_writable(ctx, admin)
            }
            Action::DeleteContentStream => {
                is_document
                    && s.has_stream()
                    && stream != ContentStreamAllowed::Required
                    && !s.content.immutable
                    && s.version_writable(ctx, admin)
            }
            Action::CheckOut => {
                is_document && s.type_def.versionable && !s.is_checked_out() && s.is_latest()
            }
            Action::CancelCheckOut | Action::CheckIn => pwc && pwc_owner,
            Action::MoveObject => base.is_fileable() && !s.is_root,
            Action::DeleteObject => !s.is_root,
            Action::DeleteTree => is_folder && !s.is_root,
            Action::CreateRelationship => base != BaseType::Relationship,
            Action::ApplyAcl => s.type_def.controllable_acl,
            Action::ApplyPolicy | Action::RemovePolicy => base != BaseType::Policy,
            Action::GetAppliedPolicies => true,
            Action::GetRenditions => !s.content.rendition_ids.is_empty(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
