//! Structural type definitions consulted before create, update and
//! versioning operations.

use serde::{Deserialize, Serialize};

use super::content::BaseType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentStreamAllowed {
    NotAllowed,
    Allowed,
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub id: String,
    pub base_type: BaseType,
    /// `None` for the five base types.
    pub parent_type_id: Option<String>,
    pub versionable: bool,
    pub controllable_acl: bool,
    pub content_stream_allowed: ContentStreamAllowed,
    /// Default allowed child types for folders of this type; empty allows all.
    pub allowed_child_type_ids: Vec<String>,
}

impl TypeDefinition {
    /// The base type definition for `base`.
    pub fn base(base: BaseType) -> Self {
        let (versionable, content_stream_allowed) = match base {
            BaseType::Document => (true, ContentStreamAllowed::Allowed),
            _ => (false, ContentStreamAllowed::NotAllowed),
        };
        Self {
            id: base.type_id().to_string(),
            base_type: base,
            parent_type_id: None,
            versionable,
            controllable_acl: true,
            content_stream_allowed,
            allowed_child_type_ids: Vec::new(),
        }
    }

    /// A subtype inheriting the structural flags of `parent`.
    pub fn derived(id: &str, parent: &TypeDefinition) -> Self {
        Self {
            id: id.to_string(),
            parent_type_id: Some(parent.id.clone()),
            ..parent.clone()
        }
    }

    pub fn with_versionable(mut self, versionable: bool) -> Self {
        self.versionable = versionable;
        self
    }

    pub fn with_controllable_acl(mut self, controllable: bool) -> Self {
        self.controllable_acl = controllable;
        self
    }

    pub fn with_content_stream(mut self, allowed: ContentStreamAllowed) -> Self {
        self.content_stream_allowed = allowed;
        self
    }

    pub fn with_allowed_child_types<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_child_type_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}
