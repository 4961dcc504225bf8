//! Repository service layer
//!
//! [`RepositoryService`] is the entry point of every repository operation.
//! An operation locks the objects it touches, runs its checkpoints, persists
//! through the [`ContentStore`], invalidates the [`CachePool`] for every
//! affected object and releases its locks when the guards drop.
//!
//! The operations are split by concern:
//! - [`object`]: create, read, update, move and delete, content streams
//! - [`versioning`]: check-out, cancel check-out, check-in, version lists
//! - [`acl`]: reading and applying ACLs
//! - [`policy`]: applying and removing policies
//! - [`bulk`]: concurrent bulk property update and tree delete
//!
//! Locks are not re-entrant. Code running under a lock only calls the
//! unlocked helpers of this module.

pub mod acl;
pub mod bulk;
pub mod object;
pub mod policy;
pub mod versioning;

pub use bulk::{BulkUpdateResult, DeleteTreeResult};
pub use object::{CreateRequest, RelationshipDirection};
pub use versioning::CheckInRequest;

use log::{debug, info};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use crate::acl::{
    effective_acl, Action, CallContext, ObjectState, PermissionEvaluator, PrincipalAliases,
};
use crate::cache::CachePool;
use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, RepositoryResult};
use crate::lock::{LockCoordinator, LockRequest, LockSet};
use crate::model::{
    Acl, BaseType, Content, ContentKind, FolderData, Rendition, TypeDefinition, VersionSeries,
};
use crate::storage::{ContentStore, StoreError};
use crate::types::TypeRegistry;
use crate::validation;
use crate::view::{
    Attached, CompiledView, DefaultViewCompiler, ObjectView, ViewCompiler, ViewOptions,
};

/// Id and fresh revision token of a mutated object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub id: String,
    pub revision_token: String,
}

impl From<&Content> for Mutation {
    fn from(content: &Content) -> Self {
        Self {
            id: content.id.clone(),
            revision_token: content.revision_token.clone(),
        }
    }
}

/// One repository: its store, caches and policies.
pub struct RepositoryService {
    config: RepositoryConfig,
    store: Arc<dyn ContentStore>,
    types: Arc<dyn TypeRegistry>,
    compiler: Arc<dyn ViewCompiler>,
    locks: Arc<LockCoordinator>,
    caches: CachePool,
    evaluator: PermissionEvaluator,
}

impl RepositoryService {
    /// Open a repository, creating its root folder when the store has none.
    pub fn open(
        config: RepositoryConfig,
        store: Arc<dyn ContentStore>,
        types: Arc<dyn TypeRegistry>,
        locks: Arc<LockCoordinator>,
    ) -> RepositoryResult<Self> {
        let aliases = PrincipalAliases::new(&config.principal_anonymous, &config.principal_anyone);
        let evaluator = PermissionEvaluator::new(aliases, config.admins.clone());
        let caches = CachePool::from_config(&config.id, &config.cache);
        let service = Self {
            config,
            store,
            types,
            compiler: Arc::new(DefaultViewCompiler),
            locks,
            caches,
            evaluator,
        };
        service.bootstrap_root()?;
        Ok(service)
    }

    /// Replace the view compiler.
    pub fn with_compiler(mut self, compiler: Arc<dyn ViewCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    fn bootstrap_root(&self) -> RepositoryResult<()> {
        let root_id = &self.config.root_folder_id;
        match self.store.get_content(root_id) {
            Ok(_) => return Ok(()),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        let mut root = Content::draft(
            "",
            BaseType::Folder.type_id(),
            "system",
            ContentKind::Folder(FolderData::default()),
        );
        root.id = root_id.clone();
        root.acl_inherited = false;
        root.acl = self.aliases().stored_acl(&self.config.root_acl());
        self.store.create(root)?;
        info!("Repository {}: created root folder {}", self.config.id, root_id);
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn root_folder_id(&self) -> &str {
        &self.config.root_folder_id
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn caches(&self) -> &CachePool {
        &self.caches
    }

    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    pub fn aliases(&self) -> &PrincipalAliases {
        self.evaluator.aliases()
    }

    pub fn is_admin(&self, ctx: &CallContext) -> bool {
        self.evaluator.is_admin(ctx)
    }

    fn is_root(&self, id: &str) -> bool {
        id == self.config.root_folder_id
    }

    // --- locking -----------------------------------------------------------

    fn lock_ids(&self, ids: &[&str]) -> LockSet {
        self.locks.bulk_lock(
            ids.iter()
                .map(|id| LockRequest::write(&self.config.id, id))
                .collect(),
        )
    }

    /// Write-lock `content` with its version series (documents) or its
    /// endpoints (relationships).
    fn lock_content(&self, content: &Content) -> LockSet {
        match &content.kind {
            ContentKind::Document(doc) => {
                self.lock_ids(&[content.id.as_str(), doc.version_series_id.as_str()])
            }
            ContentKind::Relationship(rel) => self.lock_ids(&[
                content.id.as_str(),
                rel.source_id.as_str(),
                rel.target_id.as_str(),
            ]),
            _ => self.lock_ids(&[content.id.as_str()]),
        }
    }

    // --- unlocked helpers --------------------------------------------------

    /// Content through the content cache.
    fn load(&self, id: &str) -> RepositoryResult<Content> {
        let store = &self.store;
        self.caches
            .content()
            .get_or_compute(id, &mut || store.get_content(id).map_err(RepositoryError::from))
    }

    /// Content straight from the store, for reloads under a lock.
    fn fetch(&self, id: &str) -> RepositoryResult<Content> {
        Ok(self.store.get_content(id)?)
    }

    fn type_def(&self, type_id: &str) -> RepositoryResult<TypeDefinition> {
        validation::type_not_found(
            self.types.get_type_definition(&self.config.id, type_id),
            type_id,
        )
    }

    fn type_chain(&self, type_id: &str) -> Vec<String> {
        self.types.type_chain(&self.config.id, type_id)
    }

    fn series_of(&self, content: &Content) -> RepositoryResult<Option<VersionSeries>> {
        match content.version_series_id() {
            Some(id) => Ok(Some(self.store.get_version_series(id)?)),
            None => Ok(None),
        }
    }

    /// Effective ACL in stored form.
    fn effective_acl_of(&self, content: &Content) -> RepositoryResult<Acl> {
        effective_acl(content, &self.config.root_folder_id, &mut |id: &str| self.load(id))
    }

    /// Fail unless the caller holds the permission `action` needs on `content`.
    fn check_permission(
        &self,
        ctx: &CallContext,
        content: &Content,
        action: Action,
    ) -> RepositoryResult<Acl> {
        let acl = self.effective_acl_of(content)?;
        validation::permission_denied(&self.evaluator, ctx, &acl, action, &content.id)?;
        Ok(acl)
    }

    fn allowed(&self, ctx: &CallContext, content: &Content, action: Action) -> bool {
        match self.effective_acl_of(content) {
            Ok(acl) => self
                .evaluator
                .has_permission(ctx, &acl, action.required_permission()),
            Err(_) => false,
        }
    }

    /// Compiled view through the view cache.
    fn compiled_view(&self, id: &str) -> RepositoryResult<CompiledView> {
        self.caches.view().get_or_compute(id, &mut || {
            let content = self.load(id)?;
            let series = self.series_of(&content)?;
            let acl = self.effective_acl_of(&content)?;
            let relationships = self.store.get_relationships(id)?;
            let policies = self.store.get_applied_policies(id)?;
            let renditions = self.renditions_of(&content)?;
            Ok(self.compiler.compile(
                &content,
                series.as_ref(),
                &acl,
                Attached {
                    relationships: &relationships,
                    policies: &policies,
                    renditions: &renditions,
                },
                self.aliases(),
            ))
        })
    }

    fn renditions_of(&self, content: &Content) -> RepositoryResult<Vec<Rendition>> {
        content
            .rendition_ids
            .iter()
            .map(|id| self.store.get_rendition(id).map_err(RepositoryError::from))
            .collect()
    }

    fn state_actions(
        &self,
        ctx: &CallContext,
        content: &Content,
        acl: &Acl,
    ) -> RepositoryResult<BTreeSet<Action>> {
        let type_def = self.type_def(&content.object_type_id)?;
        let series = self.series_of(content)?;
        let state = ObjectState {
            content,
            type_def: &type_def,
            series: series.as_ref(),
            is_root: self.is_root(&content.id),
        };
        Ok(self.evaluator.allowable_actions(ctx, &state, acl))
    }

    /// Render `id` for the caller, checking read permission.
    fn render(
        &self,
        ctx: &CallContext,
        id: &str,
        options: &ViewOptions,
    ) -> RepositoryResult<ObjectView> {
        let view = self.compiled_view(id)?;
        let acl = self.aliases().stored_acl(&view.acl);
        validation::permission_denied(&self.evaluator, ctx, &acl, Action::GetProperties, id)?;
        let actions = if options.include_allowable_actions {
            let content = self.load(id)?;
            Some(self.state_actions(ctx, &content, &acl)?)
        } else {
            None
        };
        Ok(view.project(options, actions))
    }

    /// Children as listed to callers: everything filed in the folder except
    /// older document versions.
    fn listing(&self, folder_id: &str) -> RepositoryResult<Vec<Content>> {
        Ok(self
            .store
            .get_children(folder_id)?
            .into_iter()
            .filter(|c| match c.as_document() {
                Some(d) => d.is_latest_version || d.is_private_working_copy,
                None => true,
            })
            .collect())
    }

    fn check_unique_name(
        &self,
        folder_id: &str,
        name: &str,
        exclude_id: Option<&str>,
        exclude_series: Option<&str>,
    ) -> RepositoryResult<()> {
        if !self.config.capabilities.unique_name_check {
            return Ok(());
        }
        let siblings = self.listing(folder_id)?;
        validation::constraint_unique_name(&siblings, name, exclude_id, exclude_series)
    }

    /// Ids below `folder_id` whose effective ACL depends on it.
    fn inheriting_descendants(&self, folder_id: &str) -> RepositoryResult<Vec<String>> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([folder_id.to_string()]);
        while let Some(id) = queue.pop_front() {
            for child in self.store.get_children(&id)? {
                if !child.acl_inherited || !seen.insert(child.id.clone()) {
                    continue;
                }
                if child.is_folder() {
                    queue.push_back(child.id.clone());
                }
                found.push(child.id);
            }
        }
        Ok(found)
    }

    /// Invalidate `content` and the objects whose views expose it: every
    /// version of a document's series, both endpoints of a relationship.
    fn invalidate_with_series(&self, content: &Content) -> RepositoryResult<()> {
        self.caches.invalidate(&content.id);
        match &content.kind {
            ContentKind::Document(doc) => self.invalidate_series(&doc.version_series_id)?,
            ContentKind::Relationship(rel) => self
                .caches
                .invalidate_all([rel.source_id.as_str(), rel.target_id.as_str()]),
            _ => {}
        }
        Ok(())
    }

    fn invalidate_series(&self, series_id: &str) -> RepositoryResult<()> {
        for version in self.store.get_versions(series_id)? {
            self.caches.invalidate(&version.id);
        }
        Ok(())
    }

    /// Take `id` off every policy applied to it, returning the policy ids.
    fn detach_policies(&self, id: &str) -> RepositoryResult<Vec<String>> {
        let mut detached = Vec::new();
        for mut policy in self.store.get_applied_policies(id)? {
            if let ContentKind::Policy(data) = &mut policy.kind {
                data.applied_ids.retain(|applied| applied != id);
            }
            let updated = self.store.update(policy)?;
            self.caches.invalidate(&updated.id);
            debug!("Detached policy {} from {}", updated.id, id);
            detached.push(updated.id);
        }
        Ok(detached)
    }

    /// Duplicates of the renditions `ids`, for a new version or a copy.
    fn copy_renditions(&self, ids: &[String]) -> RepositoryResult<Vec<String>> {
        ids.iter()
            .map(|id| {
                self.store
                    .copy_rendition(id)
                    .map(|r| r.id)
                    .map_err(RepositoryError::from)
            })
            .collect()
    }

    fn discard_renditions(&self, ids: &[String]) -> RepositoryResult<()> {
        for id in ids {
            match self.store.delete_rendition(id) {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Delete the relationships of `id`, returning their other endpoints.
    fn remove_relationships(&self, id: &str) -> RepositoryResult<Vec<String>> {
        let mut endpoints = Vec::new();
        for rel in self.store.get_relationships(id)? {
            if let Some(data) = rel.as_relationship() {
                let other = if data.source_id == id {
                    &data.target_id
                } else {
                    &data.source_id
                };
                endpoints.push(other.clone());
            }
            match self.store.delete(&rel.id) {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            self.caches.invalidate(&rel.id);
            debug!("Removed relationship {} of {}", rel.id, id);
        }
        Ok(endpoints)
    }
}
