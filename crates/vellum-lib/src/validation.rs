//! Validation checkpoints.
//!
//! Stateless checks run before any mutation. Each returns `Ok(())` (or the
//! validated value) or the error the operation fails with.

use crate::acl::{Action, CallContext, PermissionEvaluator};
use crate::error::{RepositoryError, RepositoryResult};
use crate::model::{
    Acl, BaseType, Content, ContentStreamAllowed, Properties, TypeDefinition, VersionSeries,
    VersioningState,
};

pub fn invalid_argument_required<'a>(name: &str, value: Option<&'a str>) -> RepositoryResult<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RepositoryError::InvalidArgument(format!(
            "{} must be set",
            name
        ))),
    }
}

pub fn invalid_argument_not_empty<T>(name: &str, values: &[T]) -> RepositoryResult<()> {
    if values.is_empty() {
        return Err(RepositoryError::InvalidArgument(format!(
            "{} must not be empty",
            name
        )));
    }
    Ok(())
}

/// Reject names that cannot address a child of a folder.
pub fn invalid_argument_name(name: &str) -> RepositoryResult<()> {
    invalid_argument_required("cmis:name", Some(name))?;
    if name.contains('/') {
        return Err(RepositoryError::InvalidArgument(format!(
            "Name must not contain '/': {}",
            name
        )));
    }
    Ok(())
}

pub fn invalid_argument_read_only(properties: &Properties) -> RepositoryResult<()> {
    match properties.first_read_only() {
        Some(id) => Err(RepositoryError::InvalidArgument(format!(
            "Property {} is read-only",
            id
        ))),
        None => Ok(()),
    }
}

pub fn object_not_found(content: Option<Content>, id: &str) -> RepositoryResult<Content> {
    content.ok_or_else(|| RepositoryError::NotFound(format!("Object {}", id)))
}

pub fn type_not_found(
    type_def: Option<TypeDefinition>,
    type_id: &str,
) -> RepositoryResult<TypeDefinition> {
    type_def.ok_or_else(|| RepositoryError::NotFound(format!("Type {}", type_id)))
}

pub fn permission_denied(
    evaluator: &PermissionEvaluator,
    ctx: &CallContext,
    acl: &Acl,
    action: Action,
    object_id: &str,
) -> RepositoryResult<()> {
    evaluator.check(ctx, acl, action, object_id)
}

pub fn constraint_base_type(type_def: &TypeDefinition, expected: BaseType) -> RepositoryResult<()> {
    if type_def.base_type != expected {
        return Err(RepositoryError::constraint(
            &type_def.id,
            format!("Type is not a {}", expected),
        ));
    }
    Ok(())
}

pub fn constraint_is_folder(content: &Content) -> RepositoryResult<()> {
    if !content.is_folder() {
        return Err(RepositoryError::constraint(&content.id, "Object is not a folder"));
    }
    Ok(())
}

/// `type_chain` is the created type followed by its ancestors.
pub fn constraint_allowed_child_type(parent: &Content, type_chain: &[String]) -> RepositoryResult<()> {
    let Some(folder) = parent.as_folder() else {
        return Err(RepositoryError::constraint(&parent.id, "Parent is not a folder"));
    };
    if folder.allowed_child_type_ids.is_empty()
        || type_chain
            .iter()
            .any(|t| folder.allowed_child_type_ids.contains(t))
    {
        return Ok(());
    }
    Err(RepositoryError::constraint(
        &parent.id,
        format!(
            "Type {} is not allowed in this folder",
            type_chain.first().map(String::as_str).unwrap_or("")
        ),
    ))
}

pub fn constraint_content_stream(type_def: &TypeDefinition, has_stream: bool) -> RepositoryResult<()> {
    match (type_def.content_stream_allowed, has_stream) {
        (ContentStreamAllowed::NotAllowed, true) => Err(RepositoryError::constraint(
            &type_def.id,
            "Content stream is not allowed",
        )),
        (ContentStreamAllowed::Required, false) => Err(RepositoryError::constraint(
            &type_def.id,
            "Content stream is required",
        )),
        _ => Ok(()),
    }
}

pub fn constraint_versioning_state(
    type_def: &TypeDefinition,
    state: Option<VersioningState>,
) -> RepositoryResult<VersioningState> {
    match (type_def.versionable, state) {
        (false, None) | (false, Some(VersioningState::None)) => Ok(VersioningState::None),
        (false, Some(_)) => Err(RepositoryError::constraint(
            &type_def.id,
            "Type is not versionable",
        )),
        (true, Some(VersioningState::None)) => Err(RepositoryError::constraint(
            &type_def.id,
            "Versionable type needs a versioning state",
        )),
        (true, None) => Ok(VersioningState::Major),
        (true, Some(s)) => Ok(s),
    }
}

pub fn constraint_versionable(type_def: &TypeDefinition) -> RepositoryResult<()> {
    if !type_def.versionable {
        return Err(RepositoryError::constraint(&type_def.id, "Type is not versionable"));
    }
    Ok(())
}

pub fn constraint_controllable_acl(type_def: &TypeDefinition) -> RepositoryResult<()> {
    if !type_def.controllable_acl {
        return Err(RepositoryError::constraint(
            &type_def.id,
            "ACL of this type is not controllable",
        ));
    }
    Ok(())
}

pub fn constraint_immutable(content: &Content) -> RepositoryResult<()> {
    if content.immutable {
        return Err(RepositoryError::constraint(&content.id, "Object is immutable"));
    }
    Ok(())
}

pub fn constraint_not_root(content: &Content, root_id: &str) -> RepositoryResult<()> {
    if content.id == root_id {
        return Err(RepositoryError::constraint(
            &content.id,
            "Operation is not allowed on the root folder",
        ));
    }
    Ok(())
}

pub fn constraint_folder_empty(folder: &Content, children: &[Content]) -> RepositoryResult<()> {
    if !children.is_empty() {
        return Err(RepositoryError::constraint(&folder.id, "Folder is not empty"));
    }
    Ok(())
}

pub fn constraint_is_policy(content: &Content) -> RepositoryResult<()> {
    if content.as_policy().is_none() {
        return Err(RepositoryError::constraint(&content.id, "Object is not a policy"));
    }
    Ok(())
}

/// A policy still applied to objects cannot be deleted.
pub fn constraint_policy_unapplied(content: &Content) -> RepositoryResult<()> {
    match content.as_policy() {
        Some(policy) if !policy.applied_ids.is_empty() => Err(RepositoryError::constraint(
            &content.id,
            format!("Policy is applied to {} objects", policy.applied_ids.len()),
        )),
        _ => Ok(()),
    }
}

/// Names are unique case-insensitively among `siblings`.
///
/// `exclude_id` is the object being renamed or moved; documents of
/// `exclude_series` never collide with each other.
pub fn constraint_unique_name(
    siblings: &[Content],
    name: &str,
    exclude_id: Option<&str>,
    exclude_series: Option<&str>,
) -> RepositoryResult<()> {
    let lower = name.to_lowercase();
    let clash = siblings.iter().find(|s| {
        Some(s.id.as_str()) != exclude_id
            && (exclude_series.is_none() || s.version_series_id() != exclude_series)
            && s.name.to_lowercase() == lower
    });
    match clash {
        Some(existing) => Err(RepositoryError::constraint(
            &existing.id,
            format!("Name already exists: {}", name),
        )),
        None => Ok(()),
    }
}

/// Enforce the write rules of checked-out version series.
///
/// Only the user who checked out may touch the PWC; other versions of a
/// checked-out series are read-only; older versions are always read-only.
pub fn constraint_update_when_checked_out(
    content: &Content,
    type_def: &TypeDefinition,
    series: Option<&VersionSeries>,
    ctx: &CallContext,
    is_admin: bool,
) -> RepositoryResult<()> {
    let Some(doc) = content.as_document() else {
        return Ok(());
    };
    if !type_def.versionable {
        return Ok(());
    }
    if doc.is_private_working_copy {
        if !is_admin && doc.checked_out_by.as_deref() != Some(ctx.user.as_str()) {
            return Err(RepositoryError::constraint(
                &content.id,
                "Only the user who checked out may modify the working copy",
            ));
        }
        return Ok(());
    }
    if series.is_some_and(|s| s.checked_out) {
        return Err(RepositoryError::constraint(
            &content.id,
            "Version series is checked out",
        ));
    }
    if !doc.is_latest_version {
        return Err(RepositoryError::constraint(
            &content.id,
            "Only the latest version can be modified",
        ));
    }
    Ok(())
}

pub fn constraint_already_checked_out(series: &VersionSeries) -> RepositoryResult<()> {
    if series.checked_out {
        return Err(RepositoryError::constraint(
            &series.id,
            "Version series is already checked out",
        ));
    }
    Ok(())
}

pub fn constraint_is_pwc(content: &Content) -> RepositoryResult<()> {
    if !content.is_private_working_copy() {
        return Err(RepositoryError::constraint(
            &content.id,
            "Object is not a private working copy",
        ));
    }
    Ok(())
}

/// Compare the supplied token with the stored one. A missing token fails.
pub fn update_conflict(content: &Content, token: Option<&str>) -> RepositoryResult<()> {
    match token {
        Some(t) if t == content.revision_token => Ok(()),
        Some(t) => Err(RepositoryError::update_conflict(
            &content.id,
            format!(
                "Revision token {} is stale (current {})",
                t, content.revision_token
            ),
        )),
        None => Err(RepositoryError::update_conflict(
            &content.id,
            "Revision token is required",
        )),
    }
}
