//! Object operations: create, read, update, move, delete and content streams.

use log::{debug, info};
use std::collections::{BTreeSet, HashSet};

use super::{Mutation, RepositoryService};
use crate::acl::{local_acl_from_request, Action, CallContext};
use crate::error::{RepositoryError, RepositoryResult};
use crate::lock::{LockRequest, LockSet};
use crate::model::{
    ids, next_version_label, Ace, AclPropagation, BaseType, Content, ContentKind,
    ContentStream, ContentStreamAllowed, DocumentData, FolderData, Permission, PolicyData,
    Properties, PropertyValue, RelationshipData, Rendition, TypeDefinition, VersionSeries,
    VersioningState,
};
use crate::storage::StoreError;
use crate::validation;
use crate::view::{ObjectView, ViewOptions};

/// Input of [`RepositoryService::create`].
///
/// `properties` must carry `cmis:name` and `cmis:objectTypeId`;
/// relationships also need `cmis:sourceId` and `cmis:targetId`.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub properties: Properties,
    pub parent_id: Option<String>,
    pub content_stream: Option<ContentStream>,
    pub versioning_state: Option<VersioningState>,
    /// Direct ACEs to set on the new object, in display form.
    pub aces: Vec<Ace>,
}

impl CreateRequest {
    pub fn new(type_id: &str, name: &str) -> Self {
        Self {
            properties: Properties::new()
                .with(ids::OBJECT_TYPE_ID, PropertyValue::Id(type_id.to_string()))
                .with(ids::NAME, name),
            ..Self::default()
        }
    }

    pub fn relationship(type_id: &str, name: &str, source_id: &str, target_id: &str) -> Self {
        Self::new(type_id, name)
            .with_property(ids::SOURCE_ID, PropertyValue::Id(source_id.to_string()))
            .with_property(ids::TARGET_ID, PropertyValue::Id(target_id.to_string()))
    }

    pub fn in_folder(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn with_property(mut self, id: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.set(id, value);
        self
    }

    pub fn with_stream(mut self, stream: ContentStream) -> Self {
        self.content_stream = Some(stream);
        self
    }

    pub fn with_versioning_state(mut self, state: VersioningState) -> Self {
        self.versioning_state = Some(state);
        self
    }

    pub fn with_aces(mut self, aces: Vec<Ace>) -> Self {
        self.aces = aces;
        self
    }
}

/// Which end of a relationship an object must be on to list it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipDirection {
    #[default]
    Source,
    Target,
    Either,
}

impl RelationshipDirection {
    fn matches(&self, object_id: &str, rel: &RelationshipData) -> bool {
        match self {
            RelationshipDirection::Source => rel.source_id == object_id,
            RelationshipDirection::Target => rel.target_id == object_id,
            RelationshipDirection::Either => {
                rel.source_id == object_id || rel.target_id == object_id
            }
        }
    }
}

struct PreparedCreate {
    type_def: TypeDefinition,
    name: String,
    parent_id: Option<String>,
}

fn create_action(base: BaseType) -> Action {
    match base {
        BaseType::Document => Action::CreateDocument,
        BaseType::Folder => Action::CreateFolder,
        BaseType::Item => Action::CreateItem,
        BaseType::Policy => Action::CreatePolicy,
        BaseType::Relationship => Action::CreateRelationship,
    }
}

impl RepositoryService {
    // --- reads -------------------------------------------------------------

    /// Fetch an object. A version series id resolves to its latest version.
    pub fn get_object(
        &self,
        ctx: &CallContext,
        id: &str,
        options: &ViewOptions,
    ) -> RepositoryResult<ObjectView> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let id = self.resolve_object_id(id)?;
        let _guard = self.locks.read_lock(&self.config.id, &id);
        self.render(ctx, &id, options)
    }

    fn resolve_object_id(&self, id: &str) -> RepositoryResult<String> {
        match self.load(id) {
            Ok(content) => Ok(content.id),
            Err(e) if e.is_not_found() => match self.store.get_version_series(id) {
                Ok(_) => Ok(validation::object_not_found(self.latest_version(id)?, id)?.id),
                Err(StoreError::NotFound(_)) => {
                    Err(RepositoryError::NotFound(format!("Object {}", id)))
                }
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        }
    }

    /// Resolve a `/`-separated path from the root folder.
    pub fn get_object_by_path(
        &self,
        ctx: &CallContext,
        path: &str,
        options: &ViewOptions,
    ) -> RepositoryResult<ObjectView> {
        let path = validation::invalid_argument_required("path", Some(path))?;
        if !path.starts_with('/') {
            return Err(RepositoryError::InvalidArgument(format!(
                "Path must be absolute: {}",
                path
            )));
        }
        let mut current = self.config.root_folder_id.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let child = self
                .listing(&current)?
                .into_iter()
                .find(|c| c.name == segment && !c.is_private_working_copy())
                .ok_or_else(|| RepositoryError::NotFound(format!("Path {}", path)))?;
            current = child.id;
        }
        self.get_object(ctx, &current, options)
    }

    /// Children of a folder the caller may read.
    pub fn get_children(
        &self,
        ctx: &CallContext,
        folder_id: &str,
        options: &ViewOptions,
    ) -> RepositoryResult<Vec<ObjectView>> {
        let folder_id = validation::invalid_argument_required("folderId", Some(folder_id))?;
        let _guard = self.locks.read_lock(&self.config.id, folder_id);
        let folder = self.load(folder_id)?;
        validation::constraint_is_folder(&folder)?;
        self.check_permission(ctx, &folder, Action::GetChildren)?;

        let mut views = Vec::new();
        for child in self.listing(folder_id)? {
            match self.render(ctx, &child.id, options) {
                Ok(view) => views.push(view),
                Err(RepositoryError::PermissionDenied(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(views)
    }

    pub fn get_allowable_actions(
        &self,
        ctx: &CallContext,
        id: &str,
    ) -> RepositoryResult<BTreeSet<Action>> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let _guard = self.locks.read_lock(&self.config.id, id);
        let content = self.load(id)?;
        let acl = self.check_permission(ctx, &content, Action::GetProperties)?;
        self.state_actions(ctx, &content, &acl)
    }

    /// The content stream of a document; `Ok(None)` when the type allows a
    /// stream and the document has none.
    pub fn get_content_stream(
        &self,
        ctx: &CallContext,
        id: &str,
    ) -> RepositoryResult<Option<ContentStream>> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let _guard = self.locks.read_lock(&self.config.id, id);
        let content = self.load(id)?;
        self.check_permission(ctx, &content, Action::GetContentStream)?;
        let type_def = self.type_def(&content.object_type_id)?;
        let attachment_ref = content.as_document().and_then(|d| d.attachment_ref.clone());

        match (type_def.content_stream_allowed, attachment_ref) {
            (ContentStreamAllowed::NotAllowed, _) => Err(RepositoryError::constraint(
                id,
                "Type does not allow a content stream",
            )),
            (ContentStreamAllowed::Required, None) => Err(RepositoryError::constraint(
                id,
                "Required content stream is missing",
            )),
            (ContentStreamAllowed::Allowed, None) => Ok(None),
            (_, Some(attachment_ref)) => {
                Ok(Some(self.store.get_attachment(&attachment_ref)?.into_stream()))
            }
        }
    }

    /// The folder `id` is filed in. Empty for the root, for unfiled objects
    /// and when the caller may not read the parent.
    pub fn get_object_parents(
        &self,
        ctx: &CallContext,
        id: &str,
        options: &ViewOptions,
    ) -> RepositoryResult<Vec<ObjectView>> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let _guard = self.locks.read_lock(&self.config.id, id);
        let content = self.load(id)?;
        self.check_permission(ctx, &content, Action::GetObjectParents)?;
        let Some(parent_id) = content.parent_id.as_deref() else {
            return Ok(Vec::new());
        };
        match self.render(ctx, parent_id, options) {
            Ok(view) => Ok(vec![view]),
            Err(RepositoryError::PermissionDenied(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Relationships of `id` on the given end that the caller may read.
    pub fn get_object_relationships(
        &self,
        ctx: &CallContext,
        id: &str,
        direction: RelationshipDirection,
        options: &ViewOptions,
    ) -> RepositoryResult<Vec<ObjectView>> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let _guard = self.locks.read_lock(&self.config.id, id);
        let content = self.load(id)?;
        self.check_permission(ctx, &content, Action::GetObjectRelationships)?;

        let mut views = Vec::new();
        for rel in self.store.get_relationships(id)? {
            if !rel.as_relationship().is_some_and(|r| direction.matches(id, r)) {
                continue;
            }
            match self.render(ctx, &rel.id, options) {
                Ok(view) => views.push(view),
                Err(RepositoryError::PermissionDenied(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(views)
    }

    /// Working copies the caller may read, filed in `folder_id` or anywhere
    /// in the repository.
    pub fn get_checked_out_docs(
        &self,
        ctx: &CallContext,
        folder_id: Option<&str>,
        options: &ViewOptions,
    ) -> RepositoryResult<Vec<ObjectView>> {
        let _guard = folder_id.map(|f| self.locks.read_lock(&self.config.id, f));
        if let Some(folder_id) = folder_id {
            let folder = self.load(folder_id)?;
            validation::constraint_is_folder(&folder)?;
            self.check_permission(ctx, &folder, Action::GetChildren)?;
        }

        let mut views = Vec::new();
        for pwc in self.store.get_checked_out_documents(folder_id)? {
            match self.render(ctx, &pwc.id, options) {
                Ok(view) => views.push(view),
                Err(RepositoryError::PermissionDenied(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(views)
    }

    // --- renditions --------------------------------------------------------

    /// Renditions of `id`; empty when it has none.
    pub fn get_renditions(&self, ctx: &CallContext, id: &str) -> RepositoryResult<Vec<Rendition>> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let _guard = self.locks.read_lock(&self.config.id, id);
        let content = self.load(id)?;
        self.check_permission(ctx, &content, Action::GetRenditions)?;
        self.renditions_of(&content)
    }

    pub fn get_rendition_stream(
        &self,
        ctx: &CallContext,
        id: &str,
        rendition_id: &str,
    ) -> RepositoryResult<ContentStream> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let rendition_id = validation::invalid_argument_required("streamId", Some(rendition_id))?;
        let _guard = self.locks.read_lock(&self.config.id, id);
        let content = self.load(id)?;
        self.check_permission(ctx, &content, Action::GetRenditions)?;
        if !content.rendition_ids.iter().any(|r| r == rendition_id) {
            return Err(RepositoryError::NotFound(format!(
                "Rendition {} of {}",
                rendition_id, id
            )));
        }
        Ok(self.store.get_rendition_stream(rendition_id)?)
    }

    /// Attach a rendition of kind `kind` to a document or folder.
    pub fn add_rendition(
        &self,
        ctx: &CallContext,
        id: &str,
        kind: &str,
        title: Option<&str>,
        stream: ContentStream,
    ) -> RepositoryResult<Rendition> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let kind = validation::invalid_argument_required("kind", Some(kind))?;
        let current = self.fetch(id)?;
        let _locks = self.lock_content(&current);
        let mut content = self.fetch(id)?;
        if !content.is_document() && !content.is_folder() {
            return Err(RepositoryError::constraint(
                id,
                "Only documents and folders carry renditions",
            ));
        }
        self.check_permission(ctx, &content, Action::UpdateProperties)?;
        validation::constraint_immutable(&content)?;

        let rendition = self.store.create_rendition(kind, title, &stream)?;
        content.rendition_ids.push(rendition.id.clone());
        content.touch(&ctx.user);
        let updated = self.store.update(content)?;
        self.caches.invalidate(&updated.id);
        info!("Added {} rendition {} to {}", rendition.kind, rendition.id, updated.id);
        Ok(rendition)
    }

    // --- create ------------------------------------------------------------

    /// Create an object of the base type named by `cmis:objectTypeId`.
    pub fn create(&self, ctx: &CallContext, request: CreateRequest) -> RepositoryResult<Mutation> {
        let type_id = validation::invalid_argument_required(
            ids::OBJECT_TYPE_ID,
            request.properties.get_str(ids::OBJECT_TYPE_ID),
        )?;
        match self.type_def(type_id)?.base_type {
            BaseType::Document => self.create_document(ctx, request),
            BaseType::Folder => self.create_folder(ctx, request),
            BaseType::Item => self.create_item(ctx, request),
            BaseType::Policy => self.create_policy(ctx, request),
            BaseType::Relationship => self.create_relationship(ctx, request),
        }
    }

    /// Checkpoints shared by every create. The caller holds the parent lock.
    fn prepare_create(
        &self,
        ctx: &CallContext,
        request: &CreateRequest,
        expected: BaseType,
    ) -> RepositoryResult<PreparedCreate> {
        let props = &request.properties;
        let type_id =
            validation::invalid_argument_required(ids::OBJECT_TYPE_ID, props.get_str(ids::OBJECT_TYPE_ID))?;
        let name = validation::invalid_argument_required(ids::NAME, props.get_str(ids::NAME))?;
        validation::invalid_argument_name(name)?;
        validation::invalid_argument_read_only(props)?;
        let type_def = self.type_def(type_id)?;
        validation::constraint_base_type(&type_def, expected)?;
        if !request.aces.is_empty() {
            validation::constraint_controllable_acl(&type_def)?;
        }

        let parent_id = match request.parent_id.as_deref() {
            Some(_) if expected == BaseType::Relationship => {
                return Err(RepositoryError::InvalidArgument(
                    "Relationships are not fileable".into(),
                ))
            }
            Some(parent_id) => {
                let parent = self.fetch(parent_id)?;
                validation::constraint_is_folder(&parent)?;
                self.check_permission(ctx, &parent, create_action(expected))?;
                validation::constraint_allowed_child_type(&parent, &self.type_chain(&type_def.id))?;
                self.check_unique_name(parent_id, name, None, None)?;
                Some(parent.id)
            }
            None if expected.is_fileable() => {
                return Err(RepositoryError::InvalidArgument(
                    "Parent folder id must be set".into(),
                ))
            }
            None => None,
        };

        Ok(PreparedCreate {
            name: name.to_string(),
            type_def,
            parent_id,
        })
    }

    fn draft_from(
        &self,
        ctx: &CallContext,
        request: &CreateRequest,
        prepared: &PreparedCreate,
        kind: ContentKind,
    ) -> Content {
        let props = &request.properties;
        let mut content = Content::draft(&prepared.name, &prepared.type_def.id, &ctx.user, kind);
        content.parent_id = prepared.parent_id.clone();
        content.description = props.get_str(ids::DESCRIPTION).map(String::from);
        content.immutable = props.get_bool(ids::IS_IMMUTABLE).unwrap_or(false);
        content.properties = props.custom();
        content.acl = local_acl_from_request(&request.aces, AclPropagation::Propagate, self.aliases());

        let top_level = prepared.parent_id.as_deref() == Some(self.config.root_folder_id.as_str());
        if top_level && !self.config.capabilities.inherit_at_top_level {
            content.acl_inherited = false;
            let creator = self.aliases().to_stored(&ctx.user);
            if content.acl.get(&creator).is_none() {
                content.acl.aces.push(Ace::new(&creator, [Permission::ALL]));
            }
        }
        content
    }

    fn lock_parent(&self, request: &CreateRequest) -> Option<LockSet> {
        request
            .parent_id
            .as_deref()
            .map(|parent_id| self.lock_ids(&[parent_id]))
    }

    pub fn create_document(
        &self,
        ctx: &CallContext,
        request: CreateRequest,
    ) -> RepositoryResult<Mutation> {
        let _locks = self.lock_parent(&request);
        let prepared = self.prepare_create(ctx, &request, BaseType::Document)?;
        validation::constraint_content_stream(&prepared.type_def, request.content_stream.is_some())?;
        let state = validation::constraint_versioning_state(&prepared.type_def, request.versioning_state)?;

        let attachment_ref = match &request.content_stream {
            Some(stream) => Some(self.store.create_attachment(stream)?),
            None => None,
        };
        self.insert_document(ctx, &request, &prepared, state, attachment_ref, Vec::new())
    }

    /// Create a document from the content of `source_id`.
    ///
    /// The source's name, description and custom properties are copied and
    /// then overlaid with `request.properties`. The copy gets its own
    /// attachment, renditions and version series; `request.parent_id` names
    /// the target folder.
    pub fn create_document_from_source(
        &self,
        ctx: &CallContext,
        source_id: &str,
        request: CreateRequest,
    ) -> RepositoryResult<Mutation> {
        let source_id = validation::invalid_argument_required("sourceId", Some(source_id))?;
        if request.content_stream.is_some() {
            return Err(RepositoryError::InvalidArgument(
                "A copy takes its content stream from the source".into(),
            ));
        }
        let mut lock_requests = vec![LockRequest::read(&self.config.id, source_id)];
        if let Some(parent_id) = request.parent_id.as_deref() {
            lock_requests.push(LockRequest::write(&self.config.id, parent_id));
        }
        let _locks = self.locks.bulk_lock(lock_requests);

        let source = self.fetch(source_id)?;
        if !source.is_document() {
            return Err(RepositoryError::constraint(source_id, "Source is not a document"));
        }
        self.check_permission(ctx, &source, Action::GetContentStream)?;

        let mut properties = source.properties.custom();
        properties.set(
            ids::OBJECT_TYPE_ID,
            PropertyValue::Id(source.object_type_id.clone()),
        );
        properties.set(ids::NAME, source.name.as_str());
        if let Some(description) = &source.description {
            properties.set(ids::DESCRIPTION, description.as_str());
        }
        properties.merge(&request.properties);
        let request = CreateRequest {
            properties,
            ..request
        };

        let prepared = self.prepare_create(ctx, &request, BaseType::Document)?;
        let source_ref = source.as_document().and_then(|d| d.attachment_ref.as_deref());
        validation::constraint_content_stream(&prepared.type_def, source_ref.is_some())?;
        let state = validation::constraint_versioning_state(&prepared.type_def, request.versioning_state)?;

        let attachment_ref = match source_ref {
            Some(source_ref) => Some(self.store.copy_attachment(source_ref)?),
            None => None,
        };
        let rendition_ids = self.copy_renditions(&source.rendition_ids)?;
        let created =
            self.insert_document(ctx, &request, &prepared, state, attachment_ref, rendition_ids)?;
        debug!("{} is a copy of {}", created.id, source.id);
        Ok(created)
    }

    /// Persist a new document and its version series. The caller holds the
    /// parent lock and has run the create checkpoints.
    fn insert_document(
        &self,
        ctx: &CallContext,
        request: &CreateRequest,
        prepared: &PreparedCreate,
        state: VersioningState,
        attachment_ref: Option<String>,
        rendition_ids: Vec<String>,
    ) -> RepositoryResult<Mutation> {
        let series = self.store.create_version_series(VersionSeries::default())?;
        let (label, major, latest, pwc) = match state {
            VersioningState::None => (None, true, true, false),
            VersioningState::Major => (Some(next_version_label(None, true)), true, true, false),
            VersioningState::Minor => (Some(next_version_label(None, false)), false, true, false),
            VersioningState::CheckedOut => (None, false, false, true),
        };
        let data = DocumentData {
            attachment_ref,
            version_series_id: series.id.clone(),
            version_label: label,
            is_major_version: major,
            is_latest_version: latest,
            is_latest_major_version: major && latest,
            is_private_working_copy: pwc,
            checked_out_by: pwc.then(|| ctx.user.clone()),
            checkin_comment: None,
        };

        let mut draft = self.draft_from(ctx, request, prepared, ContentKind::Document(data));
        draft.rendition_ids = rendition_ids;
        let created = self.store.create(draft)?;
        if pwc {
            self.store.update_version_series(VersionSeries {
                checked_out: true,
                checked_out_document_id: Some(created.id.clone()),
                checked_out_by: Some(ctx.user.clone()),
                ..series
            })?;
        }
        self.caches.invalidate(&created.id);
        info!(
            "Created document {} ({}) in {:?}",
            created.id, created.name, created.parent_id
        );
        Ok(Mutation::from(&created))
    }

    pub fn create_folder(
        &self,
        ctx: &CallContext,
        request: CreateRequest,
    ) -> RepositoryResult<Mutation> {
        let _locks = self.lock_parent(&request);
        let prepared = self.prepare_create(ctx, &request, BaseType::Folder)?;
        let mut allowed = request
            .properties
            .get_str_list(ids::ALLOWED_CHILD_OBJECT_TYPE_IDS);
        if allowed.is_empty() {
            allowed = prepared.type_def.allowed_child_type_ids.clone();
        }
        let kind = ContentKind::Folder(FolderData {
            allowed_child_type_ids: allowed,
        });
        let created = self
            .store
            .create(self.draft_from(ctx, &request, &prepared, kind))?;
        self.caches.invalidate(&created.id);
        info!("Created folder {} ({})", created.id, created.name);
        Ok(Mutation::from(&created))
    }

    pub fn create_item(&self, ctx: &CallContext, request: CreateRequest) -> RepositoryResult<Mutation> {
        let _locks = self.lock_parent(&request);
        let prepared = self.prepare_create(ctx, &request, BaseType::Item)?;
        let created = self
            .store
            .create(self.draft_from(ctx, &request, &prepared, ContentKind::Item))?;
        self.caches.invalidate(&created.id);
        info!("Created item {} ({})", created.id, created.name);
        Ok(Mutation::from(&created))
    }

    /// Policies may be created unfiled.
    pub fn create_policy(
        &self,
        ctx: &CallContext,
        request: CreateRequest,
    ) -> RepositoryResult<Mutation> {
        let _locks = self.lock_parent(&request);
        let prepared = self.prepare_create(ctx, &request, BaseType::Policy)?;
        let kind = ContentKind::Policy(PolicyData {
            policy_text: request
                .properties
                .get_str(ids::POLICY_TEXT)
                .map(String::from),
            applied_ids: Vec::new(),
        });
        let created = self
            .store
            .create(self.draft_from(ctx, &request, &prepared, kind))?;
        self.caches.invalidate(&created.id);
        info!("Created policy {} ({})", created.id, created.name);
        Ok(Mutation::from(&created))
    }

    pub fn create_relationship(
        &self,
        ctx: &CallContext,
        request: CreateRequest,
    ) -> RepositoryResult<Mutation> {
        let props = &request.properties;
        let source_id =
            validation::invalid_argument_required(ids::SOURCE_ID, props.get_str(ids::SOURCE_ID))?
                .to_string();
        let target_id =
            validation::invalid_argument_required(ids::TARGET_ID, props.get_str(ids::TARGET_ID))?
                .to_string();

        let _locks = self.lock_ids(&[source_id.as_str(), target_id.as_str()]);
        let prepared = self.prepare_create(ctx, &request, BaseType::Relationship)?;
        let source = self.fetch(&source_id)?;
        let target = self.fetch(&target_id)?;
        self.check_permission(ctx, &source, Action::CreateRelationship)?;
        self.check_permission(ctx, &target, Action::CreateRelationship)?;

        let kind = ContentKind::Relationship(RelationshipData {
            source_id: source.id.clone(),
            target_id: target.id.clone(),
        });
        let created = self
            .store
            .create(self.draft_from(ctx, &request, &prepared, kind))?;
        self.caches
            .invalidate_all([created.id.as_str(), source.id.as_str(), target.id.as_str()]);
        info!(
            "Created relationship {} ({} -> {})",
            created.id, source.id, target.id
        );
        Ok(Mutation::from(&created))
    }

    // --- update ------------------------------------------------------------

    pub fn update_properties(
        &self,
        ctx: &CallContext,
        id: &str,
        properties: Properties,
        token: Option<&str>,
    ) -> RepositoryResult<Mutation> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let current = self.fetch(id)?;
        let _locks = self.lock_content(&current);
        let mut content = self.fetch(id)?;

        let type_def = self.type_def(&content.object_type_id)?;
        self.check_permission(ctx, &content, Action::UpdateProperties)?;
        validation::invalid_argument_read_only(&properties)?;
        validation::constraint_immutable(&content)?;
        let series = self.series_of(&content)?;
        validation::constraint_update_when_checked_out(
            &content,
            &type_def,
            series.as_ref(),
            ctx,
            self.is_admin(ctx),
        )?;
        validation::update_conflict(&content, token)?;

        if let Some(new_name) = properties.get_str(ids::NAME) {
            if new_name != content.name {
                validation::invalid_argument_name(new_name)?;
                if let Some(parent_id) = content.parent_id.as_deref() {
                    self.check_unique_name(
                        parent_id,
                        new_name,
                        Some(&content.id),
                        content.version_series_id(),
                    )?;
                }
                content.name = new_name.to_string();
            }
        }
        if properties.contains(ids::DESCRIPTION) {
            content.description = properties.get_str(ids::DESCRIPTION).map(String::from);
        }
        if let Some(immutable) = properties.get_bool(ids::IS_IMMUTABLE) {
            content.immutable = immutable;
        }
        match &mut content.kind {
            ContentKind::Folder(folder) if properties.contains(ids::ALLOWED_CHILD_OBJECT_TYPE_IDS) => {
                folder.allowed_child_type_ids =
                    properties.get_str_list(ids::ALLOWED_CHILD_OBJECT_TYPE_IDS);
            }
            ContentKind::Policy(policy) if properties.contains(ids::POLICY_TEXT) => {
                policy.policy_text = properties.get_str(ids::POLICY_TEXT).map(String::from);
            }
            _ => {}
        }
        content.properties.merge(&properties.custom());
        content.touch(&ctx.user);

        let updated = self.store.update(content)?;
        self.invalidate_with_series(&updated)?;
        info!("Updated properties of {}", updated.id);
        Ok(Mutation::from(&updated))
    }

    // --- content streams ---------------------------------------------------

    /// Checkpoints shared by the stream mutations. Returns the document's
    /// type definition.
    fn check_stream_mutation(
        &self,
        ctx: &CallContext,
        content: &Content,
        action: Action,
    ) -> RepositoryResult<TypeDefinition> {
        if !content.is_document() {
            return Err(RepositoryError::constraint(
                &content.id,
                "Only documents carry a content stream",
            ));
        }
        let type_def = self.type_def(&content.object_type_id)?;
        self.check_permission(ctx, content, action)?;
        validation::constraint_immutable(content)?;
        if type_def.content_stream_allowed == ContentStreamAllowed::NotAllowed {
            return Err(RepositoryError::constraint(
                &content.id,
                "Type does not allow a content stream",
            ));
        }
        let series = self.series_of(content)?;
        validation::constraint_update_when_checked_out(
            content,
            &type_def,
            series.as_ref(),
            ctx,
            self.is_admin(ctx),
        )?;
        Ok(type_def)
    }

    /// Set the content stream. On the latest version of a versionable
    /// document this creates a new minor version, whose id is returned.
    pub fn set_content_stream(
        &self,
        ctx: &CallContext,
        id: &str,
        stream: ContentStream,
        overwrite: bool,
        token: Option<&str>,
    ) -> RepositoryResult<Mutation> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let current = self.fetch(id)?;
        let _locks = self.lock_content(&current);
        let mut content = self.fetch(id)?;

        let type_def = self.check_stream_mutation(ctx, &content, Action::SetContentStream)?;
        validation::update_conflict(&content, token)?;
        let (old_ref, is_pwc) = match content.as_document() {
            Some(d) => (d.attachment_ref.clone(), d.is_private_working_copy),
            None => (None, false),
        };
        if old_ref.is_some() && !overwrite {
            return Err(RepositoryError::constraint(
                id,
                "Content stream already exists",
            ));
        }

        if type_def.versionable && !is_pwc {
            let created = self.create_stream_version(ctx, content, &stream)?;
            return Ok(Mutation::from(&created));
        }

        let new_ref = self.store.create_attachment(&stream)?;
        if let Some(doc) = content.as_document_mut() {
            doc.attachment_ref = Some(new_ref);
        }
        content.touch(&ctx.user);
        let updated = self.store.update(content)?;
        if let Some(old_ref) = old_ref {
            self.discard_attachment(&old_ref)?;
        }
        self.caches.invalidate(&updated.id);
        info!("Replaced content stream of {}", updated.id);
        Ok(Mutation::from(&updated))
    }

    /// New minor version of `latest` carrying `stream`.
    fn create_stream_version(
        &self,
        ctx: &CallContext,
        latest: Content,
        stream: &ContentStream,
    ) -> RepositoryResult<Content> {
        let attachment_ref = self.store.create_attachment(stream)?;
        let mut next = latest.clone();
        next.id = String::new();
        next.created_by = ctx.user.clone();
        next.modified_by = ctx.user.clone();
        // Renditions describe the previous stream.
        next.rendition_ids = Vec::new();
        if let Some(doc) = next.as_document_mut() {
            doc.attachment_ref = Some(attachment_ref);
            doc.version_label = Some(next_version_label(doc.version_label.as_deref(), false));
            doc.is_major_version = false;
            doc.is_latest_version = true;
            doc.is_latest_major_version = false;
            doc.checkin_comment = None;
        }
        let created = self.store.create(next)?;

        let mut previous = latest;
        if let Some(doc) = previous.as_document_mut() {
            doc.is_latest_version = false;
        }
        self.store.update(previous)?;
        self.invalidate_with_series(&created)?;
        info!("Content stream of {} stored as new version {}", created.name, created.id);
        Ok(created)
    }

    /// Append to the content stream. A missing token is filled in with the
    /// stored one.
    pub fn append_content_stream(
        &self,
        ctx: &CallContext,
        id: &str,
        stream: ContentStream,
        is_last_chunk: bool,
        token: Option<&str>,
    ) -> RepositoryResult<Mutation> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let current = self.fetch(id)?;
        let _locks = self.lock_content(&current);
        let mut content = self.fetch(id)?;

        self.check_stream_mutation(ctx, &content, Action::AppendContentStream)?;
        let token = token.unwrap_or(content.revision_token.as_str()).to_string();
        validation::update_conflict(&content, Some(&token))?;

        let existing = content.as_document().and_then(|d| d.attachment_ref.clone());
        match existing {
            Some(attachment_ref) => self.store.append_attachment(&attachment_ref, &stream.data)?,
            None => {
                let attachment_ref = self.store.create_attachment(&stream)?;
                if let Some(doc) = content.as_document_mut() {
                    doc.attachment_ref = Some(attachment_ref);
                }
            }
        }
        content.touch(&ctx.user);
        let updated = self.store.update(content)?;
        self.caches.invalidate(&updated.id);
        debug!(
            "Appended {} bytes to {} (last chunk: {})",
            stream.length(),
            updated.id,
            is_last_chunk
        );
        Ok(Mutation::from(&updated))
    }

    pub fn delete_content_stream(
        &self,
        ctx: &CallContext,
        id: &str,
        token: Option<&str>,
    ) -> RepositoryResult<Mutation> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let current = self.fetch(id)?;
        let _locks = self.lock_content(&current);
        let mut content = self.fetch(id)?;

        let type_def = self.check_stream_mutation(ctx, &content, Action::DeleteContentStream)?;
        if type_def.content_stream_allowed == ContentStreamAllowed::Required {
            return Err(RepositoryError::constraint(
                id,
                "Type requires a content stream",
            ));
        }
        validation::update_conflict(&content, token)?;

        let old_ref = content
            .as_document_mut()
            .and_then(|d| d.attachment_ref.take());
        content.touch(&ctx.user);
        let updated = self.store.update(content)?;
        if let Some(old_ref) = old_ref {
            self.discard_attachment(&old_ref)?;
        }
        self.caches.invalidate(&updated.id);
        info!("Deleted content stream of {}", updated.id);
        Ok(Mutation::from(&updated))
    }

    pub(super) fn discard_attachment(&self, attachment_ref: &str) -> RepositoryResult<()> {
        match self.store.delete_attachment(attachment_ref) {
            Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // --- move --------------------------------------------------------------

    /// Move an object from `source_folder_id` into `target_folder_id`.
    /// Documents move with every version of their series.
    pub fn move_object(
        &self,
        ctx: &CallContext,
        id: &str,
        target_folder_id: &str,
        source_folder_id: &str,
        token: Option<&str>,
    ) -> RepositoryResult<Mutation> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let target_id = validation::invalid_argument_required("targetFolderId", Some(target_folder_id))?;
        let source_id = validation::invalid_argument_required("sourceFolderId", Some(source_folder_id))?;

        let current = self.fetch(id)?;
        validation::constraint_not_root(&current, &self.config.root_folder_id)?;
        let mut lock_ids = vec![id, source_id, target_id];
        if let Some(series) = current.version_series_id() {
            lock_ids.push(series);
        }
        let _locks = self.lock_ids(&lock_ids);

        let content = self.fetch(id)?;
        if content.parent_id.as_deref() != Some(source_id) {
            return Err(RepositoryError::InvalidArgument(format!(
                "{} is not the parent of {}",
                source_id, id
            )));
        }
        let target = self.fetch(target_id)?;
        validation::constraint_is_folder(&target)?;
        self.check_permission(ctx, &content, Action::MoveObject)?;
        self.check_permission(ctx, &target, create_action(content.base_type()))?;
        validation::constraint_allowed_child_type(&target, &self.type_chain(&content.object_type_id))?;
        if content.is_folder() {
            self.constraint_not_below(&content.id, &target)?;
        }
        validation::update_conflict(&content, token)?;
        if source_id != target_id {
            self.check_unique_name(
                target_id,
                &content.name,
                Some(&content.id),
                content.version_series_id(),
            )?;
        }

        let mut moved = content.clone();
        moved.parent_id = Some(target_id.to_string());
        moved.touch(&ctx.user);
        let updated = self.store.update(moved)?;

        if let Some(series_id) = content.version_series_id() {
            for mut version in self.store.get_versions(series_id)? {
                if version.id != updated.id && version.parent_id.as_deref() == Some(source_id) {
                    version.parent_id = Some(target_id.to_string());
                    self.store.update(version)?;
                }
            }
            self.invalidate_series(series_id)?;
        }
        self.caches.invalidate_all([updated.id.as_str(), source_id, target_id]);
        if updated.is_folder() {
            for descendant in self.inheriting_descendants(&updated.id)? {
                self.caches.invalidate(&descendant);
            }
        }
        info!("Moved {} from {} to {}", updated.id, source_id, target_id);
        Ok(Mutation::from(&updated))
    }

    /// Fail if `target` is `folder_id` or lies below it.
    fn constraint_not_below(&self, folder_id: &str, target: &Content) -> RepositoryResult<()> {
        let mut seen = HashSet::new();
        let mut cursor = Some(target.clone());
        while let Some(node) = cursor {
            if node.id == folder_id {
                return Err(RepositoryError::constraint(
                    folder_id,
                    "Cannot move a folder below itself",
                ));
            }
            if !seen.insert(node.id.clone()) {
                break;
            }
            cursor = match node.parent_id.as_deref() {
                Some(parent_id) => Some(self.fetch(parent_id)?),
                None => None,
            };
        }
        Ok(())
    }

    // --- delete ------------------------------------------------------------

    /// Delete one object. Documents delete one version unless `all_versions`.
    pub fn delete_object(
        &self,
        ctx: &CallContext,
        id: &str,
        all_versions: bool,
    ) -> RepositoryResult<()> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let current = self.fetch(id)?;
        validation::constraint_not_root(&current, &self.config.root_folder_id)?;

        match &current.kind {
            ContentKind::Document(_) => self.delete_document(ctx, &current, all_versions),
            ContentKind::Relationship(rel) => {
                let _locks = self.lock_ids(&[id, rel.source_id.as_str(), rel.target_id.as_str()]);
                let content = self.fetch(id)?;
                self.check_permission(ctx, &content, Action::DeleteObject)?;
                validation::constraint_immutable(&content)?;
                self.detach_policies(id)?;
                self.store.delete(id)?;
                self.caches
                    .invalidate_all([id, rel.source_id.as_str(), rel.target_id.as_str()]);
                info!("Deleted relationship {}", id);
                Ok(())
            }
            ContentKind::Folder(_) | ContentKind::Item | ContentKind::Policy(_) => {
                let _locks = self.lock_ids(&[id]);
                let content = self.fetch(id)?;
                self.check_permission(ctx, &content, Action::DeleteObject)?;
                validation::constraint_immutable(&content)?;
                if content.is_folder() {
                    let children = self.store.get_children(id)?;
                    validation::constraint_folder_empty(&content, &children)?;
                }
                validation::constraint_policy_unapplied(&content)?;
                let endpoints = self.remove_relationships(id)?;
                self.detach_policies(id)?;
                self.discard_renditions(&content.rendition_ids)?;
                self.store.delete(id)?;
                self.caches.invalidate(id);
                self.caches.invalidate_all(endpoints.iter().map(String::as_str));
                info!("Deleted {} {}", content.base_type(), id);
                Ok(())
            }
        }
    }

    fn delete_document(
        &self,
        ctx: &CallContext,
        current: &Content,
        all_versions: bool,
    ) -> RepositoryResult<()> {
        let _locks = self.lock_content(current);
        let content = self.fetch(&current.id)?;
        let series_id = content
            .version_series_id()
            .ok_or_else(|| RepositoryError::Internal(format!("{} has no series", content.id)))?
            .to_string();
        self.check_permission(ctx, &content, Action::DeleteObject)?;
        validation::constraint_immutable(&content)?;
        let mut series = self.store.get_version_series(&series_id)?;

        if content.is_private_working_copy() && !all_versions {
            let type_def = self.type_def(&content.object_type_id)?;
            validation::constraint_update_when_checked_out(
                &content,
                &type_def,
                Some(&series),
                ctx,
                self.is_admin(ctx),
            )?;
            // Deleting the working copy cancels the checkout.
            return self.discard_pwc(&content, &mut series);
        }
        if series.checked_out && !all_versions {
            return Err(RepositoryError::constraint(
                &content.id,
                "Version series is checked out",
            ));
        }

        let doomed = if all_versions {
            self.store.get_versions(&series_id)?
        } else {
            vec![content]
        };
        let mut endpoints = Vec::new();
        for version in &doomed {
            endpoints.extend(self.remove_relationships(&version.id)?);
            self.detach_policies(&version.id)?;
            self.discard_renditions(&version.rendition_ids)?;
            if let Some(attachment_ref) = version.as_document().and_then(|d| d.attachment_ref.as_deref()) {
                self.discard_attachment(attachment_ref)?;
            }
            self.store.delete(&version.id)?;
            self.caches.invalidate(&version.id);
        }
        self.caches.invalidate_all(endpoints.iter().map(String::as_str));
        self.refresh_latest_flags(&series_id)?;
        info!(
            "Deleted {} version(s) of series {}",
            doomed.len(),
            series_id
        );
        Ok(())
    }
}
