//! In-memory reference store.

use chrono::Utc;
use log::debug;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ContentStore, StoreError, StoreResult};
use crate::model::{Attachment, Content, ContentKind, ContentStream, Rendition, VersionSeries};

struct Entry {
    /// Creation order, used to sort version lists.
    seq: u64,
    content: Content,
}

#[derive(Default)]
struct StoreState {
    contents: HashMap<String, Entry>,
    series: HashMap<String, VersionSeries>,
    attachments: HashMap<String, Attachment>,
    renditions: HashMap<String, (Rendition, Vec<u8>)>,
}

/// A [`ContentStore`] keeping everything in process memory.
///
/// Besides backing tests and the demo command, it exposes two hooks for
/// exercising failure paths: a counter of attachment reads and a set of
/// attachment refs whose reads fail with an I/O error.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    next_token: AtomicU64,
    next_seq: AtomicU64,
    attachment_reads: AtomicU64,
    poisoned_attachments: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_token(&self) -> String {
        (self.next_token.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn fresh_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Number of `get_attachment` calls served so far.
    pub fn attachment_reads(&self) -> u64 {
        self.attachment_reads.load(Ordering::SeqCst)
    }

    /// Make every later read of `attachment_ref` fail with [`StoreError::Io`].
    pub fn poison_attachment(&self, attachment_ref: &str) {
        self.poisoned_attachments
            .write()
            .insert(attachment_ref.to_string());
    }

    /// Number of stored contents.
    pub fn len(&self) -> usize {
        self.state.read().contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for MemoryStore {
    fn get_content(&self, id: &str) -> StoreResult<Content> {
        self.state
            .read()
            .contents
            .get(id)
            .map(|e| e.content.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_children(&self, parent_id: &str) -> StoreResult<Vec<Content>> {
        let state = self.state.read();
        let mut children: Vec<&Entry> = state
            .contents
            .values()
            .filter(|e| e.content.parent_id.as_deref() == Some(parent_id))
            .collect();
        children.sort_by_key(|e| e.seq);
        Ok(children.into_iter().map(|e| e.content.clone()).collect())
    }

    fn get_relationships(&self, object_id: &str) -> StoreResult<Vec<Content>> {
        let state = self.state.read();
        let mut rels: Vec<&Entry> = state
            .contents
            .values()
            .filter(|e| match &e.content.kind {
                ContentKind::Relationship(r) => r.source_id == object_id || r.target_id == object_id,
                _ => false,
            })
            .collect();
        rels.sort_by_key(|e| e.seq);
        Ok(rels.into_iter().map(|e| e.content.clone()).collect())
    }

    fn get_applied_policies(&self, object_id: &str) -> StoreResult<Vec<Content>> {
        let state = self.state.read();
        let mut policies: Vec<&Entry> = state
            .contents
            .values()
            .filter(|e| match &e.content.kind {
                ContentKind::Policy(p) => p.applied_ids.iter().any(|id| id == object_id),
                _ => false,
            })
            .collect();
        policies.sort_by_key(|e| e.seq);
        Ok(policies.into_iter().map(|e| e.content.clone()).collect())
    }

    fn get_checked_out_documents(&self, folder_id: Option<&str>) -> StoreResult<Vec<Content>> {
        let state = self.state.read();
        let mut pwcs: Vec<&Entry> = state
            .contents
            .values()
            .filter(|e| e.content.is_private_working_copy())
            .filter(|e| folder_id.is_none() || e.content.parent_id.as_deref() == folder_id)
            .collect();
        pwcs.sort_by_key(|e| e.seq);
        Ok(pwcs.into_iter().map(|e| e.content.clone()).collect())
    }

    fn create(&self, mut content: Content) -> StoreResult<Content> {
        if content.id.is_empty() {
            content.id = Self::fresh_id();
        }
        let now = Utc::now();
        content.created_at = now;
        content.modified_at = now;
        content.revision_token = self.fresh_token();

        let mut state = self.state.write();
        if state.contents.contains_key(&content.id) {
            return Err(StoreError::Conflict(content.id));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        debug!("MemoryStore::create: id={}, seq={}", content.id, seq);
        state.contents.insert(
            content.id.clone(),
            Entry {
                seq,
                content: content.clone(),
            },
        );
        Ok(content)
    }

    fn update(&self, mut content: Content) -> StoreResult<Content> {
        let mut state = self.state.write();
        let entry = state
            .contents
            .get_mut(&content.id)
            .ok_or_else(|| StoreError::NotFound(content.id.clone()))?;
        if entry.content.revision_token != content.revision_token {
            return Err(StoreError::Conflict(content.id));
        }
        content.revision_token = self.fresh_token();
        debug!(
            "MemoryStore::update: id={}, token={}",
            content.id, content.revision_token
        );
        entry.content = content.clone();
        Ok(content)
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        self.state
            .write()
            .contents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_version_series(&self, id: &str) -> StoreResult<VersionSeries> {
        self.state
            .read()
            .series
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn create_version_series(&self, mut series: VersionSeries) -> StoreResult<VersionSeries> {
        if series.id.is_empty() {
            series.id = Self::fresh_id();
        }
        let mut state = self.state.write();
        if state.series.contains_key(&series.id) {
            return Err(StoreError::Conflict(series.id));
        }
        state.series.insert(series.id.clone(), series.clone());
        Ok(series)
    }

    fn update_version_series(&self, series: VersionSeries) -> StoreResult<VersionSeries> {
        let mut state = self.state.write();
        let slot = state
            .series
            .get_mut(&series.id)
            .ok_or_else(|| StoreError::NotFound(series.id.clone()))?;
        *slot = series.clone();
        Ok(series)
    }

    fn delete_version_series(&self, id: &str) -> StoreResult<()> {
        self.state
            .write()
            .series
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_versions(&self, series_id: &str) -> StoreResult<Vec<Content>> {
        let state = self.state.read();
        let mut versions: Vec<&Entry> = state
            .contents
            .values()
            .filter(|e| e.content.version_series_id() == Some(series_id))
            .collect();
        versions.sort_by_key(|e| e.seq);
        Ok(versions.into_iter().map(|e| e.content.clone()).collect())
    }

    fn create_attachment(&self, stream: &ContentStream) -> StoreResult<String> {
        let attachment_ref = Self::fresh_id();
        self.state.write().attachments.insert(
            attachment_ref.clone(),
            Attachment {
                attachment_ref: attachment_ref.clone(),
                file_name: stream.file_name.clone(),
                mime_type: stream.mime_type.clone(),
                data: stream.data.clone(),
            },
        );
        Ok(attachment_ref)
    }

    fn get_attachment(&self, attachment_ref: &str) -> StoreResult<Attachment> {
        self.attachment_reads.fetch_add(1, Ordering::SeqCst);
        if self.poisoned_attachments.read().contains(attachment_ref) {
            return Err(StoreError::Io(format!(
                "read of attachment {} failed",
                attachment_ref
            )));
        }
        self.state
            .read()
            .attachments
            .get(attachment_ref)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(attachment_ref.to_string()))
    }

    fn append_attachment(&self, attachment_ref: &str, data: &[u8]) -> StoreResult<()> {
        let mut state = self.state.write();
        let attachment = state
            .attachments
            .get_mut(attachment_ref)
            .ok_or_else(|| StoreError::NotFound(attachment_ref.to_string()))?;
        attachment.data.extend_from_slice(data);
        Ok(())
    }

    fn copy_attachment(&self, attachment_ref: &str) -> StoreResult<String> {
        let mut state = self.state.write();
        let mut copy = state
            .attachments
            .get(attachment_ref)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(attachment_ref.to_string()))?;
        copy.attachment_ref = Self::fresh_id();
        let new_ref = copy.attachment_ref.clone();
        state.attachments.insert(new_ref.clone(), copy);
        Ok(new_ref)
    }

    fn delete_attachment(&self, attachment_ref: &str) -> StoreResult<()> {
        self.state
            .write()
            .attachments
            .remove(attachment_ref)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(attachment_ref.to_string()))
    }

    fn create_rendition(
        &self,
        kind: &str,
        title: Option<&str>,
        stream: &ContentStream,
    ) -> StoreResult<Rendition> {
        let rendition = Rendition {
            id: Self::fresh_id(),
            kind: kind.to_string(),
            mime_type: stream.mime_type.clone(),
            length: stream.length(),
            title: title.map(String::from),
        };
        self.state.write().renditions.insert(
            rendition.id.clone(),
            (rendition.clone(), stream.data.clone()),
        );
        Ok(rendition)
    }

    fn get_rendition(&self, id: &str) -> StoreResult<Rendition> {
        self.state
            .read()
            .renditions
            .get(id)
            .map(|(r, _)| r.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_rendition_stream(&self, id: &str) -> StoreResult<ContentStream> {
        let state = self.state.read();
        let (rendition, data) = state
            .renditions
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(ContentStream {
            file_name: rendition.title.clone(),
            mime_type: rendition.mime_type.clone(),
            data: data.clone(),
        })
    }

    fn copy_rendition(&self, id: &str) -> StoreResult<Rendition> {
        let mut state = self.state.write();
        let (mut copy, data) = state
            .renditions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        copy.id = Self::fresh_id();
        state.renditions.insert(copy.id.clone(), (copy.clone(), data));
        Ok(copy)
    }

    fn delete_rendition(&self, id: &str) -> StoreResult<()> {
        self.state
            .write()
            .renditions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FolderData, PolicyData};

    fn folder(name: &str, parent: Option<&str>) -> Content {
        let mut c = Content::draft(
            name,
            "cmis:folder",
            "admin",
            ContentKind::Folder(FolderData::default()),
        );
        c.parent_id = parent.map(String::from);
        c
    }

    #[test]
    fn test_create_assigns_id_and_token() {
        let store = MemoryStore::new();
        let created = store.create(folder("a", None)).unwrap();
        assert!(!created.id.is_empty());
        assert!(!created.revision_token.is_empty());
        assert_eq!(store.get_content(&created.id).unwrap(), created);
    }

    #[test]
    fn test_create_with_taken_id_conflicts() {
        let store = MemoryStore::new();
        let mut root = folder("root", None);
        root.id = "root".into();
        store.create(root.clone()).unwrap();
        assert_eq!(store.create(root), Err(StoreError::Conflict("root".into())));
    }

    #[test]
    fn test_update_rejects_stale_token() {
        let store = MemoryStore::new();
        let created = store.create(folder("a", None)).unwrap();

        let mut first = created.clone();
        first.name = "b".into();
        let updated = store.update(first).unwrap();
        assert_ne!(updated.revision_token, created.revision_token);

        let mut stale = created.clone();
        stale.name = "c".into();
        assert_eq!(store.update(stale), Err(StoreError::Conflict(created.id.clone())));
        assert_eq!(store.get_content(&created.id).unwrap().name, "b");
    }

    #[test]
    fn test_children_in_creation_order() {
        let store = MemoryStore::new();
        let parent = store.create(folder("p", None)).unwrap();
        let a = store.create(folder("a", Some(&parent.id))).unwrap();
        let b = store.create(folder("b", Some(&parent.id))).unwrap();
        store.create(folder("elsewhere", None)).unwrap();

        let ids: Vec<String> = store
            .get_children(&parent.id)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn test_attachment_copy_and_append() {
        let store = MemoryStore::new();
        let original = store
            .create_attachment(&ContentStream::new("text/plain", "hello"))
            .unwrap();
        let copy = store.copy_attachment(&original).unwrap();
        store.append_attachment(&copy, b" world").unwrap();

        assert_eq!(store.get_attachment(&original).unwrap().data, b"hello");
        assert_eq!(store.get_attachment(&copy).unwrap().data, b"hello world");
        assert_eq!(store.attachment_reads(), 2);
    }

    #[test]
    fn test_poisoned_attachment_reports_io() {
        let store = MemoryStore::new();
        let r = store
            .create_attachment(&ContentStream::new("text/plain", "x"))
            .unwrap();
        store.poison_attachment(&r);
        assert!(matches!(store.get_attachment(&r), Err(StoreError::Io(_))));
        assert!(matches!(
            store.get_attachment("missing"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_rendition_copy_is_independent() {
        let store = MemoryStore::new();
        let thumb = store
            .create_rendition(
                "cmis:thumbnail",
                Some("small"),
                &ContentStream::new("image/png", vec![1u8, 2, 3]),
            )
            .unwrap();
        assert_eq!(thumb.length, 3);
        assert_eq!(store.get_rendition(&thumb.id).unwrap(), thumb);

        let copy = store.copy_rendition(&thumb.id).unwrap();
        assert_ne!(copy.id, thumb.id);
        store.delete_rendition(&thumb.id).unwrap();
        assert!(matches!(store.get_rendition(&thumb.id), Err(StoreError::NotFound(_))));
        assert_eq!(store.get_rendition_stream(&copy.id).unwrap().data, vec![1u8, 2, 3]);
        assert_eq!(store.attachment_reads(), 0);
    }

    #[test]
    fn test_applied_policies_match_by_object_id() {
        let store = MemoryStore::new();
        let applied = Content::draft(
            "hold",
            "cmis:policy",
            "admin",
            ContentKind::Policy(PolicyData {
                policy_text: None,
                applied_ids: vec!["doc-1".into()],
            }),
        );
        let idle = Content::draft(
            "idle",
            "cmis:policy",
            "admin",
            ContentKind::Policy(PolicyData::default()),
        );
        let applied = store.create(applied).unwrap();
        store.create(idle).unwrap();

        let found = store.get_applied_policies("doc-1").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, applied.id);
        assert!(store.get_applied_policies("doc-2").unwrap().is_empty());
    }
}
