//! Common test utilities for the repository core
//!
//! Every integration test file declares `mod common;` and builds its
//! repository through [`TestHarness`].

#![allow(dead_code)]

use std::sync::Arc;

use vellum_lib::model::{
    Ace, AclPropagation, ContentStream, PropertyValue, TypeDefinition, VersioningState,
};
use vellum_lib::view::{ObjectView, ViewOptions};
use vellum_lib::{
    CallContext, CreateRequest, InMemoryTypeRegistry, LockCoordinator, MemoryStore, Mutation,
    RepositoryConfig, RepositoryService,
};

pub const REPOSITORY_ID: &str = "test";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn admin() -> CallContext {
    CallContext::new("admin")
}

pub fn user(name: &str) -> CallContext {
    CallContext::new(name)
}

pub struct TestHarnessBuilder {
    config: RepositoryConfig,
    locks: Option<Arc<LockCoordinator>>,
    types: Vec<TypeDefinition>,
}

impl TestHarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: RepositoryConfig::new(REPOSITORY_ID),
            locks: None,
            types: Vec::new(),
        }
    }

    pub fn configure(mut self, f: impl FnOnce(&mut RepositoryConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_locks(mut self, locks: Arc<LockCoordinator>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Register a subtype before the repository opens.
    pub fn with_type(mut self, definition: TypeDefinition) -> Self {
        self.types.push(definition);
        self
    }

    pub fn build(self) -> TestHarness {
        init_logging();
        let types = InMemoryTypeRegistry::new();
        for definition in self.types {
            types.register(definition).expect("type registered");
        }
        let store = Arc::new(MemoryStore::new());
        let locks = self
            .locks
            .unwrap_or_else(|| Arc::new(LockCoordinator::new()));
        let service = RepositoryService::open(
            self.config,
            store.clone(),
            Arc::new(types),
            locks,
        )
        .expect("repository opens");
        TestHarness { service, store }
    }
}

/// A repository on a fresh [`MemoryStore`], with shortcuts for building
/// trees as the admin.
pub struct TestHarness {
    pub service: RepositoryService,
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        TestHarnessBuilder::new().build()
    }

    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn root(&self) -> String {
        self.service.root_folder_id().to_string()
    }

    pub fn folder(&self, parent_id: &str, name: &str) -> String {
        self.service
            .create(&admin(), CreateRequest::new("cmis:folder", name).in_folder(parent_id))
            .expect("folder created")
            .id
    }

    /// A major-versioned document with a text stream.
    pub fn document(&self, parent_id: &str, name: &str, text: &str) -> Mutation {
        self.service
            .create(
                &admin(),
                CreateRequest::new("cmis:document", name)
                    .in_folder(parent_id)
                    .with_stream(ContentStream::new("text/plain", text))
                    .with_versioning_state(VersioningState::Major),
            )
            .expect("document created")
    }

    /// Replace the local ACL of `id`, keeping inheritance on.
    pub fn grant(&self, id: &str, aces: &[Ace]) {
        self.service
            .apply_acl(&admin(), id, aces, AclPropagation::Propagate, None)
            .expect("acl applied");
    }

    /// Replace the local ACL of `id` and stop inheriting.
    pub fn restrict(&self, id: &str, aces: &[Ace]) {
        self.service
            .apply_acl(&admin(), id, aces, AclPropagation::Propagate, Some(false))
            .expect("acl applied");
    }

    pub fn view(&self, ctx: &CallContext, id: &str) -> ObjectView {
        self.service
            .get_object(ctx, id, &ViewOptions::full())
            .expect("object readable")
    }

    pub fn token(&self, id: &str) -> String {
        self.view(&admin(), id)
            .change_token()
            .expect("change token present")
            .to_string()
    }

    pub fn child_names(&self, folder_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .service
            .get_children(&admin(), folder_id, &ViewOptions::default())
            .expect("children listed")
            .iter()
            .filter_map(|v| v.name().map(String::from))
            .collect();
        names.sort();
        names
    }
}

pub fn text(value: &str) -> PropertyValue {
    PropertyValue::String(value.to_string())
}
