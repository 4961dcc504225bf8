//! Version series state machine.
//!
//! A series is either Current (no working copy) or CheckedOut (exactly one
//! private working copy, the PWC). Every transition locks the series id,
//! which every document mutation locks too.

use log::info;

use super::{Mutation, RepositoryService};
use crate::acl::{Action, CallContext};
use crate::error::{RepositoryError, RepositoryResult};
use crate::model::{
    ids, next_version_label, Content, ContentStream, Properties, PropertyValue, VersionSeries,
};
use crate::storage::StoreError;
use crate::validation;
use crate::view::{ObjectView, ViewOptions};

/// Input of [`RepositoryService::check_in`].
#[derive(Debug, Clone, Default)]
pub struct CheckInRequest {
    pub major: bool,
    /// Replacement properties for the new version.
    pub properties: Properties,
    /// Replacement content; the working copy's content is kept when `None`.
    pub content_stream: Option<ContentStream>,
    pub comment: Option<String>,
}

impl CheckInRequest {
    pub fn major() -> Self {
        Self {
            major: true,
            ..Self::default()
        }
    }

    pub fn minor() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, id: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.set(id, value);
        self
    }

    pub fn with_stream(mut self, stream: ContentStream) -> Self {
        self.content_stream = Some(stream);
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

impl RepositoryService {
    /// Latest permanent version of a series.
    pub(super) fn latest_version(&self, series_id: &str) -> RepositoryResult<Option<Content>> {
        Ok(self
            .store
            .get_versions(series_id)?
            .into_iter()
            .rev()
            .find(|c| {
                c.as_document()
                    .is_some_and(|d| d.is_latest_version && !d.is_private_working_copy)
            }))
    }

    fn series_id_of(content: &Content) -> RepositoryResult<String> {
        content
            .version_series_id()
            .map(String::from)
            .ok_or_else(|| RepositoryError::constraint(&content.id, "Object is not a document"))
    }

    /// Check out the series of `id`, returning the new working copy.
    pub fn check_out(&self, ctx: &CallContext, id: &str) -> RepositoryResult<Mutation> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let current = self.fetch(id)?;
        let series_id = Self::series_id_of(&current)?;
        validation::constraint_versionable(&self.type_def(&current.object_type_id)?)?;

        let _locks = self.lock_ids(&[id, series_id.as_str()]);
        let mut series = self.store.get_version_series(&series_id)?;
        validation::constraint_already_checked_out(&series)?;
        let latest = self.latest_version(&series_id)?.ok_or_else(|| {
            RepositoryError::constraint(&series_id, "Version series has no latest version")
        })?;
        self.check_permission(ctx, &latest, Action::CheckOut)?;

        let attachment_ref = match latest.as_document().and_then(|d| d.attachment_ref.as_deref()) {
            Some(attachment_ref) => Some(self.store.copy_attachment(attachment_ref)?),
            None => None,
        };
        let mut draft = latest.clone();
        draft.id = String::new();
        draft.created_by = ctx.user.clone();
        draft.modified_by = ctx.user.clone();
        draft.rendition_ids = self.copy_renditions(&latest.rendition_ids)?;
        if let Some(doc) = draft.as_document_mut() {
            doc.attachment_ref = attachment_ref;
            doc.version_label = None;
            doc.is_major_version = false;
            doc.is_latest_version = false;
            doc.is_latest_major_version = false;
            doc.is_private_working_copy = true;
            doc.checked_out_by = Some(ctx.user.clone());
            doc.checkin_comment = None;
        }
        let pwc = self.store.create(draft)?;

        series.checked_out = true;
        series.checked_out_document_id = Some(pwc.id.clone());
        series.checked_out_by = Some(ctx.user.clone());
        self.store.update_version_series(series)?;
        self.invalidate_series(&series_id)?;
        info!("{} checked out series {} as {}", ctx.user, series_id, pwc.id);
        Ok(Mutation::from(&pwc))
    }

    /// Discard the working copy of the series of `id`. Any document of the
    /// series may be passed.
    pub fn cancel_check_out(&self, ctx: &CallContext, id: &str) -> RepositoryResult<()> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let current = self.fetch(id)?;
        let series_id = Self::series_id_of(&current)?;
        let before = self.store.get_version_series(&series_id)?;
        let mut lock_ids = vec![id, series_id.as_str()];
        if let Some(pwc_id) = before.checked_out_document_id.as_deref() {
            lock_ids.push(pwc_id);
        }
        let _locks = self.lock_ids(&lock_ids);

        let mut series = self.store.get_version_series(&series_id)?;
        let pwc_id = series
            .checked_out_document_id
            .clone()
            .filter(|_| series.checked_out)
            .ok_or_else(|| RepositoryError::constraint(id, "Version series is not checked out"))?;
        let pwc = self.fetch(&pwc_id)?;
        self.check_permission(ctx, &pwc, Action::CancelCheckOut)?;
        let type_def = self.type_def(&pwc.object_type_id)?;
        validation::constraint_update_when_checked_out(
            &pwc,
            &type_def,
            Some(&series),
            ctx,
            self.is_admin(ctx),
        )?;
        self.discard_pwc(&pwc, &mut series)
    }

    /// Delete a working copy and return its series to Current. The caller
    /// holds the series lock.
    pub(super) fn discard_pwc(
        &self,
        pwc: &Content,
        series: &mut VersionSeries,
    ) -> RepositoryResult<()> {
        let endpoints = self.remove_relationships(&pwc.id)?;
        self.detach_policies(&pwc.id)?;
        self.discard_renditions(&pwc.rendition_ids)?;
        if let Some(attachment_ref) = pwc.as_document().and_then(|d| d.attachment_ref.as_deref()) {
            self.discard_attachment(attachment_ref)?;
        }
        self.store.delete(&pwc.id)?;
        series.clear_checkout();
        self.store.update_version_series(series.clone())?;

        self.caches.invalidate(&pwc.id);
        self.invalidate_series(&series.id)?;
        self.caches.invalidate_all(endpoints.iter().map(String::as_str));
        // A series created checked out has nothing left.
        if self.store.get_versions(&series.id)?.is_empty() {
            self.store.delete_version_series(&series.id)?;
        }
        info!("Discarded working copy {} of series {}", pwc.id, series.id);
        Ok(())
    }

    /// Promote the working copy `pwc_id` into a new permanent version.
    pub fn check_in(
        &self,
        ctx: &CallContext,
        pwc_id: &str,
        request: CheckInRequest,
        token: Option<&str>,
    ) -> RepositoryResult<Mutation> {
        let pwc_id = validation::invalid_argument_required("objectId", Some(pwc_id))?;
        let current = self.fetch(pwc_id)?;
        validation::constraint_is_pwc(&current)?;
        let series_id = Self::series_id_of(&current)?;
        let latest_before = self.latest_version(&series_id)?.map(|c| c.id);
        let mut lock_ids = vec![pwc_id, series_id.as_str()];
        if let Some(latest_id) = latest_before.as_deref() {
            lock_ids.push(latest_id);
        }
        let _locks = self.lock_ids(&lock_ids);

        let pwc = self.fetch(pwc_id)?;
        validation::constraint_is_pwc(&pwc)?;
        let mut series = self.store.get_version_series(&series_id)?;
        if !series.checked_out || series.checked_out_document_id.as_deref() != Some(pwc_id) {
            return Err(RepositoryError::constraint(
                pwc_id,
                "Object is not the working copy of its series",
            ));
        }
        let latest = self.latest_version(&series_id)?;
        if latest.as_ref().map(|c| c.id.as_str()) != latest_before.as_deref() {
            return Err(RepositoryError::update_conflict(
                &series_id,
                "Latest version changed during check-in",
            ));
        }

        let type_def = self.type_def(&pwc.object_type_id)?;
        self.check_permission(ctx, &pwc, Action::CheckIn)?;
        validation::constraint_update_when_checked_out(
            &pwc,
            &type_def,
            Some(&series),
            ctx,
            self.is_admin(ctx),
        )?;
        validation::update_conflict(&pwc, token)?;
        validation::invalid_argument_read_only(&request.properties)?;
        let pwc_attachment = pwc.as_document().and_then(|d| d.attachment_ref.clone());
        validation::constraint_content_stream(
            &type_def,
            request.content_stream.is_some() || pwc_attachment.is_some(),
        )?;

        let mut next = pwc.clone();
        next.id = String::new();
        if let Some(new_name) = request.properties.get_str(ids::NAME) {
            if new_name != next.name {
                validation::invalid_argument_name(new_name)?;
                if let Some(parent_id) = next.parent_id.as_deref() {
                    self.check_unique_name(parent_id, new_name, None, Some(&series_id))?;
                }
                next.name = new_name.to_string();
            }
        }
        if request.properties.contains(ids::DESCRIPTION) {
            next.description = request
                .properties
                .get_str(ids::DESCRIPTION)
                .map(String::from);
        }
        next.properties.merge(&request.properties.custom());
        next.touch(&ctx.user);

        // The working copy's renditions follow its stream.
        next.rendition_ids = match &request.content_stream {
            Some(_) => Vec::new(),
            None => self.copy_renditions(&pwc.rendition_ids)?,
        };
        let attachment_ref = match (&request.content_stream, pwc_attachment.as_deref()) {
            (Some(stream), _) => Some(self.store.create_attachment(stream)?),
            (None, Some(existing)) => Some(self.store.copy_attachment(existing)?),
            (None, None) => None,
        };
        let previous_label = latest
            .as_ref()
            .and_then(|l| l.as_document())
            .and_then(|d| d.version_label.clone());
        if let Some(doc) = next.as_document_mut() {
            doc.attachment_ref = attachment_ref;
            doc.version_label = Some(next_version_label(previous_label.as_deref(), request.major));
            doc.is_major_version = request.major;
            doc.is_latest_version = true;
            doc.is_latest_major_version = request.major;
            doc.is_private_working_copy = false;
            doc.checked_out_by = None;
            doc.checkin_comment = request.comment.clone();
        }
        let created = self.store.create(next)?;

        for mut version in self.store.get_versions(&series_id)? {
            if version.id == created.id || version.id == pwc.id {
                continue;
            }
            let Some(doc) = version.as_document_mut() else {
                continue;
            };
            let mut changed = false;
            if doc.is_latest_version {
                doc.is_latest_version = false;
                changed = true;
            }
            if request.major && doc.is_latest_major_version {
                doc.is_latest_major_version = false;
                changed = true;
            }
            if changed {
                self.store.update(version)?;
            }
        }

        if let Some(attachment_ref) = pwc_attachment.as_deref() {
            self.discard_attachment(attachment_ref)?;
        }
        let endpoints = self.remove_relationships(&pwc.id)?;
        self.detach_policies(&pwc.id)?;
        self.discard_renditions(&pwc.rendition_ids)?;
        self.store.delete(&pwc.id)?;
        series.clear_checkout();
        self.store.update_version_series(series)?;

        self.caches.invalidate(&pwc.id);
        self.invalidate_with_series(&created)?;
        self.caches.invalidate_all(endpoints.iter().map(String::as_str));
        info!(
            "{} checked in {} as version {:?} of series {}",
            ctx.user,
            pwc.id,
            created.as_document().and_then(|d| d.version_label.as_deref()),
            series_id
        );
        Ok(Mutation::from(&created))
    }

    /// Versions of the series of `id` (a document or series id), newest
    /// first with the working copy ahead of them.
    pub fn get_all_versions(
        &self,
        ctx: &CallContext,
        id: &str,
        options: &ViewOptions,
    ) -> RepositoryResult<Vec<ObjectView>> {
        let id = validation::invalid_argument_required("objectId", Some(id))?;
        let series_id = match self.load(id) {
            Ok(content) => Self::series_id_of(&content)?,
            Err(e) if e.is_not_found() => {
                self.store.get_version_series(id)?;
                id.to_string()
            }
            Err(e) => return Err(e),
        };
        let _guard = self.locks.read_lock(&self.config.id, &series_id);

        let mut versions = self.store.get_versions(&series_id)?;
        versions.reverse();
        versions.sort_by_key(|v| !v.is_private_working_copy());

        let mut views = Vec::new();
        for version in versions {
            match self.render(ctx, &version.id, options) {
                Ok(view) => views.push(view),
                Err(RepositoryError::PermissionDenied(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(views)
    }

    /// Recompute the latest flags after versions were removed; drop the
    /// series once it is empty. The caller holds the series lock.
    pub(super) fn refresh_latest_flags(&self, series_id: &str) -> RepositoryResult<()> {
        let versions = self.store.get_versions(series_id)?;
        if versions.is_empty() {
            return match self.store.delete_version_series(series_id) {
                Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        let permanent: Vec<&Content> = versions
            .iter()
            .filter(|v| !v.is_private_working_copy())
            .collect();
        let latest_id = permanent.last().map(|v| v.id.clone());
        let latest_major_id = permanent
            .iter()
            .rev()
            .find(|v| v.as_document().is_some_and(|d| d.is_major_version))
            .map(|v| v.id.clone());

        for mut version in versions.into_iter().filter(|v| !v.is_private_working_copy()) {
            let latest = latest_id.as_deref() == Some(version.id.as_str());
            let latest_major = latest_major_id.as_deref() == Some(version.id.as_str());
            let Some(doc) = version.as_document_mut() else {
                continue;
            };
            if doc.is_latest_version == latest && doc.is_latest_major_version == latest_major {
                continue;
            }
            doc.is_latest_version = latest;
            doc.is_latest_major_version = latest_major;
            let updated = self.store.update(version)?;
            self.caches.invalidate(&updated.id);
        }
        Ok(())
    }
}
