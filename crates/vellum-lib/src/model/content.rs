//! Content entities.
//!
//! A [`Content`] carries the fields every object shares; the kind-specific
//! payload lives in [`ContentKind`] and is dispatched by pattern matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::acl::Acl;
use super::properties::Properties;

/// Structural kind of a content entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Document,
    Folder,
    Item,
    Policy,
    Relationship,
}

impl BaseType {
    pub const ALL: [BaseType; 5] = [
        BaseType::Document,
        BaseType::Folder,
        BaseType::Item,
        BaseType::Policy,
        BaseType::Relationship,
    ];

    /// Id of the base type definition, e.g. `cmis:document`.
    pub fn type_id(&self) -> &'static str {
        match self {
            BaseType::Document => "cmis:document",
            BaseType::Folder => "cmis:folder",
            BaseType::Item => "cmis:item",
            BaseType::Policy => "cmis:policy",
            BaseType::Relationship => "cmis:relationship",
        }
    }

    /// Whether objects of this kind live in a folder.
    pub fn is_fileable(&self) -> bool {
        matches!(self, BaseType::Document | BaseType::Folder | BaseType::Item)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_id())
    }
}

impl FromStr for BaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BaseType::ALL
            .into_iter()
            .find(|b| b.type_id() == s)
            .ok_or_else(|| format!("Unknown base type: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    pub attachment_ref: Option<String>,
    pub version_series_id: String,
    pub version_label: Option<String>,
    pub is_major_version: bool,
    pub is_latest_version: bool,
    pub is_latest_major_version: bool,
    pub is_private_working_copy: bool,
    pub checked_out_by: Option<String>,
    pub checkin_comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderData {
    pub allowed_child_type_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyData {
    pub policy_text: Option<String>,
    /// Objects this policy is applied to.
    #[serde(default)]
    pub applied_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipData {
    pub source_id: String,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentKind {
    Document(DocumentData),
    Folder(FolderData),
    Item,
    Policy(PolicyData),
    Relationship(RelationshipData),
}

impl ContentKind {
    pub fn base_type(&self) -> BaseType {
        match self {
            ContentKind::Document(_) => BaseType::Document,
            ContentKind::Folder(_) => BaseType::Folder,
            ContentKind::Item => BaseType::Item,
            ContentKind::Policy(_) => BaseType::Policy,
            ContentKind::Relationship(_) => BaseType::Relationship,
        }
    }
}

/// A stored content entity.
///
/// `id`, `revision_token` and the timestamps are assigned by the store on
/// create; a draft handed to the store leaves `id` empty unless the caller
/// needs a fixed id (the root folder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub name: String,
    pub object_type_id: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: DateTime<Utc>,
    pub modified_by: String,
    pub revision_token: String,
    pub acl_inherited: bool,
    /// Local (direct) ACEs only; see the ACL engine for the effective list.
    pub acl: Acl,
    pub immutable: bool,
    pub properties: Properties,
    /// Renditions held by the store for this object.
    #[serde(default)]
    pub rendition_ids: Vec<String>,
    pub kind: ContentKind,
}

impl Content {
    /// A draft with no id, inheriting its ACL from the parent.
    pub fn draft(name: &str, object_type_id: &str, created_by: &str, kind: ContentKind) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.to_string(),
            object_type_id: object_type_id.to_string(),
            description: None,
            parent_id: None,
            created_at: now,
            created_by: created_by.to_string(),
            modified_at: now,
            modified_by: created_by.to_string(),
            revision_token: String::new(),
            acl_inherited: true,
            acl: Acl::default(),
            immutable: false,
            properties: Properties::new(),
            rendition_ids: Vec::new(),
            kind,
        }
    }

    pub fn base_type(&self) -> BaseType {
        self.kind.base_type()
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ContentKind::Folder(_))
    }

    pub fn is_document(&self) -> bool {
        matches!(self.kind, ContentKind::Document(_))
    }

    pub fn as_document(&self) -> Option<&DocumentData> {
        match &self.kind {
            ContentKind::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut DocumentData> {
        match &mut self.kind {
            ContentKind::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_folder(&self) -> Option<&FolderData> {
        match &self.kind {
            ContentKind::Folder(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_policy(&self) -> Option<&PolicyData> {
        match &self.kind {
            ContentKind::Policy(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&RelationshipData> {
        match &self.kind {
            ContentKind::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_private_working_copy(&self) -> bool {
        self.as_document().is_some_and(|d| d.is_private_working_copy)
    }

    /// Version series id for documents.
    pub fn version_series_id(&self) -> Option<&str> {
        self.as_document().map(|d| d.version_series_id.as_str())
    }

    /// Stamp the modifier and time ahead of an update.
    pub fn touch(&mut self, user: &str) {
        self.modified_by = user.to_string();
        self.modified_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSeries {
    pub id: String,
    pub checked_out: bool,
    pub checked_out_document_id: Option<String>,
    pub checked_out_by: Option<String>,
}

impl VersionSeries {
    /// Return the series to the Current state.
    pub fn clear_checkout(&mut self) {
        self.checked_out = false;
        self.checked_out_document_id = None;
        self.checked_out_by = None;
    }
}

/// How a document enters its version series on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningState {
    None,
    Major,
    Minor,
    CheckedOut,
}

/// Bytes handed in by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStream {
    pub file_name: Option<String>,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ContentStream {
    pub fn new(mime_type: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: None,
            mime_type: mime_type.to_string(),
            data: data.into(),
        }
    }

    pub fn with_file_name(mut self, name: &str) -> Self {
        self.file_name = Some(name.to_string());
        self
    }

    pub fn length(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A stored binary attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub attachment_ref: String,
    pub file_name: Option<String>,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn length(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn into_stream(self) -> ContentStream {
        ContentStream {
            file_name: self.file_name,
            mime_type: self.mime_type,
            data: self.data,
        }
    }
}

/// An alternate representation of an object's content, such as a thumbnail.
///
/// Only the metadata travels with views; the bytes are read on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    pub id: String,
    /// Rendition kind, e.g. `cmis:thumbnail`.
    pub kind: String,
    pub mime_type: String,
    pub length: u64,
    pub title: Option<String>,
}

/// Next label in a `major.minor` numbering.
///
/// The first version (no previous label) is `1.0` for a major and `0.1`
/// for a minor check-in.
pub fn next_version_label(previous: Option<&str>, major: bool) -> String {
    let (maj, min) = previous
        .and_then(|label| {
            let (maj, min) = label.split_once('.').unwrap_or((label, "0"));
            Some((maj.parse::<u32>().ok()?, min.parse::<u32>().ok()?))
        })
        .unwrap_or((0, 0));

    if major {
        format!("{}.0", maj + 1)
    } else {
        format!("{}.{}", maj, min + 1)
    }
}
