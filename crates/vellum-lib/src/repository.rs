//! Repositories of one process.
//!
//! Every repository has its own store and caches. The lock coordinator and
//! the type registry are shared.

use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{RepositoryConfig, VellumConfig};
use crate::error::{RepositoryError, RepositoryResult};
use crate::lock::LockCoordinator;
use crate::service::RepositoryService;
use crate::storage::{ContentStore, MemoryStore};
use crate::types::{InMemoryTypeRegistry, TypeRegistry};

pub struct RepositoryRegistry {
    services: BTreeMap<String, Arc<RepositoryService>>,
    locks: Arc<LockCoordinator>,
    types: Arc<dyn TypeRegistry>,
}

impl RepositoryRegistry {
    pub fn new(locks: Arc<LockCoordinator>, types: Arc<dyn TypeRegistry>) -> Self {
        Self {
            services: BTreeMap::new(),
            locks,
            types,
        }
    }

    /// Open every configured repository on a fresh [`MemoryStore`].
    pub fn from_config(config: &VellumConfig) -> RepositoryResult<Self> {
        let locks = Arc::new(LockCoordinator::with_prune_threshold(
            config.locks.prune_threshold,
        ));
        let mut registry = Self::new(locks, Arc::new(InMemoryTypeRegistry::new()));
        for repo in &config.repositories {
            registry.register(repo.clone(), Arc::new(MemoryStore::new()))?;
        }
        Ok(registry)
    }

    /// Open a repository on `store` and add it.
    pub fn register(
        &mut self,
        config: RepositoryConfig,
        store: Arc<dyn ContentStore>,
    ) -> RepositoryResult<Arc<RepositoryService>> {
        if self.services.contains_key(&config.id) {
            return Err(RepositoryError::InvalidArgument(format!(
                "Repository {} is already registered",
                config.id
            )));
        }
        let id = config.id.clone();
        let service = Arc::new(RepositoryService::open(
            config,
            store,
            Arc::clone(&self.types),
            Arc::clone(&self.locks),
        )?);
        self.services.insert(id.clone(), Arc::clone(&service));
        info!("Registered repository {}", id);
        Ok(service)
    }

    pub fn get(&self, id: &str) -> RepositoryResult<Arc<RepositoryService>> {
        self.services
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Repository {}", id)))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    pub fn types(&self) -> &dyn TypeRegistry {
        self.types.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_opens_every_repository() {
        let mut config = VellumConfig::default();
        config.repositories.push(RepositoryConfig::new("archive"));
        let registry = RepositoryRegistry::from_config(&config).unwrap();

        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["archive", "default"]);
        let archive = registry.get("archive").unwrap();
        assert_eq!(archive.id(), "archive");
        assert!(archive.store().get_content("root").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_register_rejects_duplicate_id() {
        let mut registry = RepositoryRegistry::from_config(&VellumConfig::default()).unwrap();
        let result = registry.register(RepositoryConfig::new("default"), Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(RepositoryError::InvalidArgument(_))));
    }
}
