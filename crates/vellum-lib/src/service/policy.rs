//! Applying policies to objects.
//!
//! A policy keeps the ids of the objects it is applied to. Both the policy
//! and the object are locked while that list changes.

use log::info;

use super::RepositoryService;
use crate::acl::{Action, CallContext};
use crate::error::{RepositoryError, RepositoryResult};
use crate::model::{Content, ContentKind};
use crate::validation;
use crate::view::{ObjectView, ViewOptions};

/// Applied ids of a content already checked to be a policy.
fn applied_ids(policy: &mut Content) -> RepositoryResult<&mut Vec<String>> {
    match &mut policy.kind {
        ContentKind::Policy(data) => Ok(&mut data.applied_ids),
        _ => Err(RepositoryError::constraint(&policy.id, "Object is not a policy")),
    }
}

impl RepositoryService {
    /// Load and check both sides of a policy change. The caller holds the
    /// locks of both.
    fn policy_and_target(
        &self,
        ctx: &CallContext,
        policy_id: &str,
        object_id: &str,
        action: Action,
    ) -> RepositoryResult<(Content, Content)> {
        let policy = self.fetch(policy_id)?;
        validation::constraint_is_policy(&policy)?;
        let object = self.fetch(object_id)?;
        if object.as_policy().is_some() {
            return Err(RepositoryError::constraint(
                object_id,
                "Policies cannot be applied to policies",
            ));
        }
        self.check_permission(ctx, &object, action)?;
        self.check_permission(ctx, &policy, Action::GetProperties)?;
        Ok((policy, object))
    }

    /// Apply `policy_id` to `object_id`. Applying it again changes nothing.
    pub fn apply_policy(
        &self,
        ctx: &CallContext,
        policy_id: &str,
        object_id: &str,
    ) -> RepositoryResult<()> {
        let policy_id = validation::invalid_argument_required("policyId", Some(policy_id))?;
        let object_id = validation::invalid_argument_required("objectId", Some(object_id))?;
        let _locks = self.lock_ids(&[policy_id, object_id]);
        let (mut policy, object) =
            self.policy_and_target(ctx, policy_id, object_id, Action::ApplyPolicy)?;

        let applied = applied_ids(&mut policy)?;
        if applied.iter().any(|id| *id == object.id) {
            return Ok(());
        }
        applied.push(object.id.clone());
        policy.touch(&ctx.user);
        let updated = self.store.update(policy)?;
        self.caches.invalidate_all([updated.id.as_str(), object.id.as_str()]);
        info!("{} applied policy {} to {}", ctx.user, updated.id, object.id);
        Ok(())
    }

    pub fn remove_policy(
        &self,
        ctx: &CallContext,
        policy_id: &str,
        object_id: &str,
    ) -> RepositoryResult<()> {
        let policy_id = validation::invalid_argument_required("policyId", Some(policy_id))?;
        let object_id = validation::invalid_argument_required("objectId", Some(object_id))?;
        let _locks = self.lock_ids(&[policy_id, object_id]);
        let (mut policy, object) =
            self.policy_and_target(ctx, policy_id, object_id, Action::RemovePolicy)?;

        let applied = applied_ids(&mut policy)?;
        let before = applied.len();
        applied.retain(|id| *id != object.id);
        if applied.len() == before {
            return Err(RepositoryError::constraint(
                policy_id,
                format!("Policy is not applied to {}", object.id),
            ));
        }
        policy.touch(&ctx.user);
        let updated = self.store.update(policy)?;
        self.caches.invalidate_all([updated.id.as_str(), object.id.as_str()]);
        info!("{} removed policy {} from {}", ctx.user, updated.id, object.id);
        Ok(())
    }

    /// Policies applied to `object_id` that the caller may read.
    pub fn get_applied_policies(
        &self,
        ctx: &CallContext,
        object_id: &str,
        options: &ViewOptions,
    ) -> RepositoryResult<Vec<ObjectView>> {
        let object_id = validation::invalid_argument_required("objectId", Some(object_id))?;
        let _guard = self.locks.read_lock(&self.config.id, object_id);
        let object = self.load(object_id)?;
        self.check_permission(ctx, &object, Action::GetAppliedPolicies)?;

        let mut views = Vec::new();
        for policy in self.store.get_applied_policies(object_id)? {
            match self.render(ctx, &policy.id, options) {
                Ok(view) => views.push(view),
                Err(RepositoryError::PermissionDenied(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(views)
    }
}
