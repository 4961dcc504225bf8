//! Bulk property update and recursive tree delete.
//!
//! Both run their tasks on a bounded rayon pool of `executor.thread_max`
//! workers. Tasks take their own locks; nothing is held across the pool.
//! Partial failure is reported in the result, never raised.

use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use super::RepositoryService;
use crate::acl::{Action, CallContext};
use crate::error::{RepositoryError, RepositoryResult};
use crate::model::{Content, Properties};
use crate::validation;

/// One successful update of [`RepositoryService::bulk_update_properties`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkUpdateResult {
    pub original_id: String,
    pub id: String,
    pub revision_token: String,
}

/// Outcome of [`RepositoryService::delete_tree`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteTreeResult {
    /// Objects that could not be deleted, including folders left in place
    /// because something below them failed.
    pub failed_ids: BTreeSet<String>,
}

impl DeleteTreeResult {
    pub fn is_complete(&self) -> bool {
        self.failed_ids.is_empty()
    }
}

impl RepositoryService {
    fn worker_pool(&self) -> RepositoryResult<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.executor.thread_max)
            .thread_name(|i| format!("vellum-worker-{}", i))
            .build()
            .map_err(|e| RepositoryError::Internal(format!("Failed to build worker pool: {}", e)))
    }

    /// Apply `properties` to every `(id, token)` pair concurrently.
    ///
    /// Returns the successful updates in input order; failed pairs are
    /// logged and left out.
    pub fn bulk_update_properties(
        &self,
        ctx: &CallContext,
        pairs: &[(String, Option<String>)],
        properties: &Properties,
    ) -> RepositoryResult<Vec<BulkUpdateResult>> {
        validation::invalid_argument_not_empty("objectIdAndChangeToken", pairs)?;
        let pool = self.worker_pool()?;

        let results: Vec<BulkUpdateResult> = pool.install(|| {
            pairs
                .par_iter()
                .filter_map(|(id, token)| {
                    match self.update_properties(ctx, id, properties.clone(), token.as_deref()) {
                        Ok(mutation) => Some(BulkUpdateResult {
                            original_id: id.clone(),
                            id: mutation.id,
                            revision_token: mutation.revision_token,
                        }),
                        Err(e) => {
                            warn!("Bulk update of {} failed: {}", id, e);
                            None
                        }
                    }
                })
                .collect()
        });

        info!(
            "Bulk update by {}: {} of {} objects updated",
            ctx.user,
            results.len(),
            pairs.len()
        );
        Ok(results)
    }

    /// Delete `folder_id` and everything below it.
    pub fn delete_tree(
        &self,
        ctx: &CallContext,
        folder_id: &str,
        all_versions: bool,
    ) -> RepositoryResult<DeleteTreeResult> {
        let folder_id = validation::invalid_argument_required("folderId", Some(folder_id))?;
        let folder = self.fetch(folder_id)?;
        validation::constraint_is_folder(&folder)?;
        validation::constraint_not_root(&folder, &self.config.root_folder_id)?;
        self.check_permission(ctx, &folder, Action::DeleteTree)?;

        let failed = Mutex::new(BTreeSet::new());
        self.delete_subtree(ctx, folder_id, all_versions, &failed)?;
        let result = DeleteTreeResult {
            failed_ids: failed.into_inner(),
        };
        if result.is_complete() {
            info!("{} deleted tree {}", ctx.user, folder_id);
        } else {
            warn!(
                "Tree delete of {} left {} objects in place",
                folder_id,
                result.failed_ids.len()
            );
        }
        Ok(result)
    }

    /// Delete the children of `folder_id` on a pool scoped to this folder,
    /// then the folder itself. Returns whether the folder is gone.
    fn delete_subtree(
        &self,
        ctx: &CallContext,
        folder_id: &str,
        all_versions: bool,
        failed: &Mutex<BTreeSet<String>>,
    ) -> RepositoryResult<bool> {
        let children = match self.listing(folder_id) {
            Ok(children) => one_per_series(children),
            Err(e) => {
                warn!("Listing {} for tree delete failed: {}", folder_id, e);
                failed.lock().insert(folder_id.to_string());
                return Ok(false);
            }
        };
        debug!("Deleting {} children of {}", children.len(), folder_id);

        let pool = self.worker_pool()?;
        let outcomes: Vec<RepositoryResult<bool>> = pool.install(|| {
            children
                .par_iter()
                .map(|child| {
                    if child.is_folder() {
                        return self.delete_subtree(ctx, &child.id, all_versions, failed);
                    }
                    match self.delete_object(ctx, &child.id, all_versions) {
                        Ok(()) => Ok(true),
                        Err(e) => {
                            warn!("Tree delete of {} failed: {}", child.id, e);
                            failed.lock().insert(child.id.clone());
                            Ok(false)
                        }
                    }
                })
                .collect()
        });

        let mut all_deleted = true;
        for outcome in outcomes {
            all_deleted &= outcome?;
        }
        if !all_deleted {
            failed.lock().insert(folder_id.to_string());
            return Ok(false);
        }

        match self.delete_object(ctx, folder_id, false) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("Tree delete of folder {} failed: {}", folder_id, e);
                failed.lock().insert(folder_id.to_string());
                Ok(false)
            }
        }
    }
}

/// Keep one listed document per version series, preferring a permanent
/// version over the working copy.
fn one_per_series(children: Vec<Content>) -> Vec<Content> {
    let mut others = Vec::new();
    let mut by_series: BTreeMap<String, Content> = BTreeMap::new();
    for child in children {
        let Some(series_id) = child.version_series_id().map(String::from) else {
            others.push(child);
            continue;
        };
        match by_series.entry(series_id) {
            Entry::Vacant(slot) => {
                slot.insert(child);
            }
            Entry::Occupied(mut slot) => {
                if slot.get().is_private_working_copy() && !child.is_private_working_copy() {
                    slot.insert(child);
                }
            }
        }
    }
    others.extend(by_series.into_values());
    others
}
