//! Data model for the repository core
//!
//! This module contains the entities the service layer manipulates:
//! - [`Content`] and its kind payloads ([`ContentKind`])
//! - [`VersionSeries`] and version labels
//! - [`Acl`] / [`Ace`] and basic permissions
//! - [`Properties`] and well-known property ids
//! - [`TypeDefinition`] as served by the type registry

pub mod acl;
pub mod content;
pub mod properties;
pub mod types;

// Re-export key types for convenience
pub use acl::{Ace, Acl, AclPropagation, Permission};
pub use content::{
    next_version_label, Attachment, BaseType, Content, ContentKind, ContentStream, DocumentData,
    FolderData, PolicyData, RelationshipData, Rendition, VersionSeries, VersioningState,
};
pub use properties::{ids, Properties, PropertyValue};
pub use types::{ContentStreamAllowed, TypeDefinition};
