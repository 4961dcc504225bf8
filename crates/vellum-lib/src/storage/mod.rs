//! Persistence collaborator.
//!
//! The service layer talks to the backing store only through
//! [`ContentStore`]. One store instance backs one repository.

use thiserror::Error;

use crate::model::{Attachment, Content, ContentStream, Rendition, VersionSeries};

mod memory;

pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stale revision token on update, or an id that already exists on create.
    #[error("Conflict on {0}")]
    Conflict(String),

    #[error("Storage I/O error: {0}")]
    Io(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A document-oriented backing store.
pub trait ContentStore: Send + Sync {
    fn get_content(&self, id: &str) -> StoreResult<Content>;

    /// Every content filed in `parent_id`, older document versions included.
    fn get_children(&self, parent_id: &str) -> StoreResult<Vec<Content>>;

    /// Relationships whose source or target is `object_id`.
    fn get_relationships(&self, object_id: &str) -> StoreResult<Vec<Content>>;

    /// Policies whose applied ids contain `object_id`.
    fn get_applied_policies(&self, object_id: &str) -> StoreResult<Vec<Content>>;

    /// Private working copies, limited to those filed in `folder_id` when
    /// one is given.
    fn get_checked_out_documents(&self, folder_id: Option<&str>) -> StoreResult<Vec<Content>>;

    /// Persist a new content.
    ///
    /// Assigns an id when `content.id` is empty, a fresh revision token and
    /// the creation/modification timestamps.
    fn create(&self, content: Content) -> StoreResult<Content>;

    /// Replace a content.
    ///
    /// `content.revision_token` must equal the stored token; a new one is
    /// assigned on success.
    fn update(&self, content: Content) -> StoreResult<Content>;

    fn delete(&self, id: &str) -> StoreResult<()>;

    fn get_version_series(&self, id: &str) -> StoreResult<VersionSeries>;

    fn create_version_series(&self, series: VersionSeries) -> StoreResult<VersionSeries>;

    fn update_version_series(&self, series: VersionSeries) -> StoreResult<VersionSeries>;

    fn delete_version_series(&self, id: &str) -> StoreResult<()>;

    /// Documents of a series, oldest first.
    fn get_versions(&self, series_id: &str) -> StoreResult<Vec<Content>>;

    /// Store `stream` and return its attachment ref.
    fn create_attachment(&self, stream: &ContentStream) -> StoreResult<String>;

    fn get_attachment(&self, attachment_ref: &str) -> StoreResult<Attachment>;

    fn append_attachment(&self, attachment_ref: &str, data: &[u8]) -> StoreResult<()>;

    /// Duplicate an attachment and return the ref of the copy.
    fn copy_attachment(&self, attachment_ref: &str) -> StoreResult<String>;

    fn delete_attachment(&self, attachment_ref: &str) -> StoreResult<()>;

    /// Store a rendition of kind `kind` carrying `stream`.
    fn create_rendition(
        &self,
        kind: &str,
        title: Option<&str>,
        stream: &ContentStream,
    ) -> StoreResult<Rendition>;

    fn get_rendition(&self, id: &str) -> StoreResult<Rendition>;

    fn get_rendition_stream(&self, id: &str) -> StoreResult<ContentStream>;

    /// Duplicate a rendition and return the copy.
    fn copy_rendition(&self, id: &str) -> StoreResult<Rendition>;

    fn delete_rendition(&self, id: &str) -> StoreResult<()>;
}
