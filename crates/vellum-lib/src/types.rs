//! Type registry collaborator.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{RepositoryError, RepositoryResult};
use crate::model::{BaseType, TypeDefinition};

pub trait TypeRegistry: Send + Sync {
    fn get_type_definition(&self, repository_id: &str, type_id: &str)
        -> Option<TypeDefinition>;

    /// `type_id` followed by its ancestors up to the base type.
    fn type_chain(&self, repository_id: &str, type_id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut next = Some(type_id.to_string());
        while let Some(id) = next {
            if chain.contains(&id) {
                break;
            }
            next = self
                .get_type_definition(repository_id, &id)
                .and_then(|t| t.parent_type_id);
            chain.push(id);
        }
        chain
    }
}

/// Registry holding the five base types plus whatever is registered on top.
///
/// Definitions are shared across repositories.
pub struct InMemoryTypeRegistry {
    types: RwLock<HashMap<String, TypeDefinition>>,
}

impl InMemoryTypeRegistry {
    pub fn new() -> Self {
        let types = BaseType::ALL
            .into_iter()
            .map(|b| (b.type_id().to_string(), TypeDefinition::base(b)))
            .collect();
        Self {
            types: RwLock::new(types),
        }
    }

    /// Register a subtype. Its parent must already be known.
    pub fn register(&self, definition: TypeDefinition) -> RepositoryResult<()> {
        let mut types = self.types.write();
        match &definition.parent_type_id {
            Some(parent) => {
                let parent_def = types.get(parent).ok_or_else(|| {
                    RepositoryError::InvalidArgument(format!("Unknown parent type: {}", parent))
                })?;
                if parent_def.base_type != definition.base_type {
                    return Err(RepositoryError::InvalidArgument(format!(
                        "Type {} does not share the base type of {}",
                        definition.id, parent
                    )));
                }
            }
            None => {
                return Err(RepositoryError::InvalidArgument(format!(
                    "Type {} needs a parent type",
                    definition.id
                )))
            }
        }
        if types.contains_key(&definition.id) {
            return Err(RepositoryError::InvalidArgument(format!(
                "Type already registered: {}",
                definition.id
            )));
        }
        types.insert(definition.id.clone(), definition);
        Ok(())
    }
}

impl Default for InMemoryTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry for InMemoryTypeRegistry {
    fn get_type_definition(&self, _repository_id: &str, type_id: &str) -> Option<TypeDefinition> {
        self.types.read().get(type_id).cloned()
    }
}
