//! View compiler collaborator.
//!
//! A [`CompiledView`] is the caller-independent rendering of a content
//! entity and is what the view cache holds. [`CompiledView::project`] turns
//! it into the per-call [`ObjectView`].

use std::collections::BTreeSet;

use crate::acl::{Action, PrincipalAliases};
use crate::model::{ids, Acl, BaseType, Content, ContentKind, Properties, PropertyValue};
use crate::model::{Rendition, VersionSeries};

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledView {
    pub id: String,
    pub base_type: BaseType,
    pub object_type_id: String,
    /// System and custom properties.
    pub properties: Properties,
    /// Effective ACL in display form.
    pub acl: Acl,
    pub acl_inherited: bool,
    /// Ids of relationships whose source or target is this object.
    pub relationship_ids: Vec<String>,
    /// Ids of the policies applied to this object.
    pub policy_ids: Vec<String>,
    pub renditions: Vec<Rendition>,
}

impl CompiledView {
    pub fn change_token(&self) -> Option<&str> {
        self.properties.get_str(ids::CHANGE_TOKEN)
    }

    pub fn name(&self) -> Option<&str> {
        self.properties.get_str(ids::NAME)
    }

    /// Render for one call. `actions` are the caller's allowable actions.
    pub fn project(&self, options: &ViewOptions, actions: Option<BTreeSet<Action>>) -> ObjectView {
        let properties = match &options.filter {
            Some(filter) if !filter.iter().any(|f| f == "*") => self
                .properties
                .iter()
                .filter(|(k, _)| {
                    filter.iter().any(|f| f == *k)
                        || [ids::OBJECT_ID, ids::BASE_TYPE_ID, ids::OBJECT_TYPE_ID]
                            .contains(&k.as_str())
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => self.properties.clone(),
        };

        ObjectView {
            id: self.id.clone(),
            base_type: self.base_type,
            object_type_id: self.object_type_id.clone(),
            properties,
            acl: options.include_acl.then(|| self.acl.clone()),
            allowable_actions: if options.include_allowable_actions {
                actions
            } else {
                None
            },
            relationship_ids: if options.include_relationships {
                self.relationship_ids.clone()
            } else {
                Vec::new()
            },
            policy_ids: if options.include_policy_ids {
                self.policy_ids.clone()
            } else {
                Vec::new()
            },
            renditions: if options.include_renditions {
                self.renditions.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// Per-call rendering options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewOptions {
    /// Property ids to return; `None` or `*` returns all.
    pub filter: Option<Vec<String>>,
    pub include_acl: bool,
    pub include_allowable_actions: bool,
    pub include_relationships: bool,
    pub include_policy_ids: bool,
    pub include_renditions: bool,
}

impl ViewOptions {
    /// Everything included.
    pub fn full() -> Self {
        Self {
            filter: None,
            include_acl: true,
            include_allowable_actions: true,
            include_relationships: true,
            include_policy_ids: true,
            include_renditions: true,
        }
    }

    pub fn with_filter<I, S>(mut self, filter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = Some(filter.into_iter().map(Into::into).collect());
        self
    }
}

/// Protocol-neutral object view handed back to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectView {
    pub id: String,
    pub base_type: BaseType,
    pub object_type_id: String,
    pub properties: Properties,
    pub acl: Option<Acl>,
    pub allowable_actions: Option<BTreeSet<Action>>,
    pub relationship_ids: Vec<String>,
    pub policy_ids: Vec<String>,
    /// Empty unless requested, or when the object has none.
    pub renditions: Vec<Rendition>,
}

impl ObjectView {
    pub fn change_token(&self) -> Option<&str> {
        self.properties.get_str(ids::CHANGE_TOKEN)
    }

    pub fn name(&self) -> Option<&str> {
        self.properties.get_str(ids::NAME)
    }

    pub fn can(&self, action: Action) -> bool {
        self.allowable_actions
            .as_ref()
            .is_some_and(|a| a.contains(&action))
    }
}

/// Objects tied to the one being compiled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attached<'a> {
    pub relationships: &'a [Content],
    pub policies: &'a [Content],
    pub renditions: &'a [Rendition],
}

pub trait ViewCompiler: Send + Sync {
    fn compile(
        &self,
        content: &Content,
        series: Option<&VersionSeries>,
        effective_acl: &Acl,
        attached: Attached<'_>,
        aliases: &PrincipalAliases,
    ) -> CompiledView;
}

#[derive(Debug, Default, Clone)]
pub struct DefaultViewCompiler;

impl ViewCompiler for DefaultViewCompiler {
    fn compile(
        &self,
        content: &Content,
        series: Option<&VersionSeries>,
        effective_acl: &Acl,
        attached: Attached<'_>,
        aliases: &PrincipalAliases,
    ) -> CompiledView {
        let mut props = content.properties.custom();
        props.set(ids::OBJECT_ID, PropertyValue::Id(content.id.clone()));
        props.set(ids::NAME, content.name.as_str());
        if let Some(description) = &content.description {
            props.set(ids::DESCRIPTION, description.as_str());
        }
        props.set(
            ids::OBJECT_TYPE_ID,
            PropertyValue::Id(content.object_type_id.clone()),
        );
        props.set(
            ids::BASE_TYPE_ID,
            PropertyValue::Id(content.base_type().type_id().to_string()),
        );
        props.set(ids::CREATED_BY, content.created_by.as_str());
        props.set(ids::CREATION_DATE, content.created_at);
        props.set(ids::LAST_MODIFIED_BY, content.modified_by.as_str());
        props.set(ids::LAST_MODIFICATION_DATE, content.modified_at);
        props.set(ids::CHANGE_TOKEN, content.revision_token.as_str());
        props.set(ids::IS_IMMUTABLE, content.immutable);
        if let Some(parent) = &content.parent_id {
            props.set(ids::PARENT_ID, PropertyValue::Id(parent.clone()));
        }

        match &content.kind {
            ContentKind::Document(doc) => {
                props.set(
                    ids::VERSION_SERIES_ID,
                    PropertyValue::Id(doc.version_series_id.clone()),
                );
                if let Some(label) = &doc.version_label {
                    props.set(ids::VERSION_LABEL, label.as_str());
                }
                props.set(ids::IS_LATEST_VERSION, doc.is_latest_version);
                props.set(ids::IS_MAJOR_VERSION, doc.is_major_version);
                props.set(ids::IS_LATEST_MAJOR_VERSION, doc.is_latest_major_version);
                props.set(ids::IS_PRIVATE_WORKING_COPY, doc.is_private_working_copy);
                if let Some(comment) = &doc.checkin_comment {
                    props.set(ids::CHECKIN_COMMENT, comment.as_str());
                }
                let checked_out = series.is_some_and(|s| s.checked_out);
                props.set(ids::IS_VERSION_SERIES_CHECKED_OUT, checked_out);
                if let Some(s) = series.filter(|s| s.checked_out) {
                    if let Some(by) = &s.checked_out_by {
                        props.set(ids::VERSION_SERIES_CHECKED_OUT_BY, by.as_str());
                    }
                    if let Some(pwc) = &s.checked_out_document_id {
                        props.set(
                            ids::VERSION_SERIES_CHECKED_OUT_ID,
                            PropertyValue::Id(pwc.clone()),
                        );
                    }
                }
            }
            ContentKind::Folder(folder) => {
                props.set(
                    ids::ALLOWED_CHILD_OBJECT_TYPE_IDS,
                    PropertyValue::Multi(
                        folder
                            .allowed_child_type_ids
                            .iter()
                            .map(|t| PropertyValue::Id(t.clone()))
                            .collect(),
                    ),
                );
            }
            ContentKind::Policy(policy) => {
                if let Some(text) = &policy.policy_text {
                    props.set(ids::POLICY_TEXT, text.as_str());
                }
            }
            ContentKind::Relationship(rel) => {
                props.set(ids::SOURCE_ID, PropertyValue::Id(rel.source_id.clone()));
                props.set(ids::TARGET_ID, PropertyValue::Id(rel.target_id.clone()));
            }
            ContentKind::Item => {}
        }

        CompiledView {
            id: content.id.clone(),
            base_type: content.base_type(),
            object_type_id: content.object_type_id.clone(),
            properties: props,
            acl: aliases.display_acl(effective_acl),
            acl_inherited: content.acl_inherited,
            relationship_ids: attached.relationships.iter().map(|r| r.id.clone()).collect(),
            policy_ids: attached.policies.iter().map(|p| p.id.clone()).collect(),
            renditions: attached.renditions.to_vec(),
        }
    }
}
