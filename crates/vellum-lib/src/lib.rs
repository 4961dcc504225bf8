pub mod acl;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod repository;
pub mod service;
pub mod storage;
pub mod types;
pub mod validation;
pub mod view;

pub use acl::{CallContext, PrincipalAliases};
pub use config::{ConfigError, RepositoryConfig, VellumConfig};
pub use error::{RepositoryError, RepositoryResult};
pub use lock::LockCoordinator;
pub use repository::RepositoryRegistry;
pub use service::{
    CheckInRequest, CreateRequest, Mutation, RelationshipDirection, RepositoryService,
};
pub use storage::{ContentStore, MemoryStore, StoreError};
pub use types::{InMemoryTypeRegistry, TypeRegistry};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
