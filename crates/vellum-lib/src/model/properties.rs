//! Typed property bags.
//!
//! Callers hand properties to the repository as a [`Properties`] map keyed by
//! property id. Well-known ids live in [`ids`]; everything else is stored
//! verbatim on the content and handed back on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known property ids.
pub mod ids {
    pub const NAME: &str = "cmis:name";
    pub const DESCRIPTION: &str = "cmis:description";
    pub const OBJECT_ID: &str = "cmis:objectId";
    pub const OBJECT_TYPE_ID: &str = "cmis:objectTypeId";
    pub const BASE_TYPE_ID: &str = "cmis:baseTypeId";
    pub const CREATED_BY: &str = "cmis:createdBy";
    pub const CREATION_DATE: &str = "cmis:creationDate";
    pub const LAST_MODIFIED_BY: &str = "cmis:lastModifiedBy";
    pub const LAST_MODIFICATION_DATE: &str = "cmis:lastModificationDate";
    pub const CHANGE_TOKEN: &str = "cmis:changeToken";
    pub const PARENT_ID: &str = "cmis:parentId";
    pub const IS_IMMUTABLE: &str = "cmis:isImmutable";
    pub const ALLOWED_CHILD_OBJECT_TYPE_IDS: &str = "cmis:allowedChildObjectTypeIds";
    pub const SOURCE_ID: &str = "cmis:sourceId";
    pub const TARGET_ID: &str = "cmis:targetId";
    pub const POLICY_TEXT: &str = "cmis:policyText";
    pub const VERSION_SERIES_ID: &str = "cmis:versionSeriesId";
    pub const VERSION_LABEL: &str = "cmis:versionLabel";
    pub const IS_LATEST_VERSION: &str = "cmis:isLatestVersion";
    pub const IS_MAJOR_VERSION: &str = "cmis:isMajorVersion";
    pub const IS_LATEST_MAJOR_VERSION: &str = "cmis:isLatestMajorVersion";
    pub const IS_PRIVATE_WORKING_COPY: &str = "cmis:isPrivateWorkingCopy";
    pub const IS_VERSION_SERIES_CHECKED_OUT: &str = "cmis:isVersionSeriesCheckedOut";
    pub const VERSION_SERIES_CHECKED_OUT_BY: &str = "cmis:versionSeriesCheckedOutBy";
    pub const VERSION_SERIES_CHECKED_OUT_ID: &str = "cmis:versionSeriesCheckedOutId";
    pub const CHECKIN_COMMENT: &str = "cmis:checkinComment";

    /// Properties the server assigns; callers may never set them.
    pub const READ_ONLY: &[&str] = &[
        OBJECT_ID,
        BASE_TYPE_ID,
        CREATED_BY,
        CREATION_DATE,
        LAST_MODIFIED_BY,
        LAST_MODIFICATION_DATE,
        CHANGE_TOKEN,
        PARENT_ID,
        VERSION_SERIES_ID,
        VERSION_LABEL,
        IS_LATEST_VERSION,
        IS_MAJOR_VERSION,
        IS_LATEST_MAJOR_VERSION,
        IS_PRIVATE_WORKING_COPY,
        IS_VERSION_SERIES_CHECKED_OUT,
        VERSION_SERIES_CHECKED_OUT_BY,
        VERSION_SERIES_CHECKED_OUT_ID,
    ];

    /// Properties that map onto dedicated content fields instead of the bag.
    pub const FIELD_BACKED: &[&str] = &[
        NAME,
        DESCRIPTION,
        OBJECT_TYPE_ID,
        IS_IMMUTABLE,
        ALLOWED_CHILD_OBJECT_TYPE_IDS,
        SOURCE_ID,
        TARGET_ID,
        POLICY_TEXT,
        CHECKIN_COMMENT,
    ];

    pub fn is_read_only(id: &str) -> bool {
        READ_ONLY.contains(&id)
    }

    pub fn is_field_backed(id: &str) -> bool {
        FIELD_BACKED.contains(&id)
    }
}

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Id(String),
    Boolean(bool),
    Integer(i64),
    DateTime(DateTime<Utc>),
    Multi(Vec<PropertyValue>),
}

impl PropertyValue {
    /// String-like payload of `String` and `Id` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) | PropertyValue::Id(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(d: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(d)
    }
}

/// Ordered map of property id to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, id: &str, value: impl Into<PropertyValue>) -> Self {
        self.set(id, value);
        self
    }

    pub fn set(&mut self, id: &str, value: impl Into<PropertyValue>) {
        self.0.insert(id.to_string(), value.into());
    }

    pub fn get(&self, id: &str) -> Option<&PropertyValue> {
        self.0.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<PropertyValue> {
        self.0.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn get_str(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(PropertyValue::as_str)
    }

    pub fn get_bool(&self, id: &str) -> Option<bool> {
        self.get(id).and_then(PropertyValue::as_bool)
    }

    /// Multi-valued string/id property; a single value is a one-element list.
    pub fn get_str_list(&self, id: &str) -> Vec<String> {
        match self.get(id) {
            Some(PropertyValue::Multi(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(v) => v.as_str().map(|s| vec![s.to_string()]).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// First read-only id present in the bag, if any.
    pub fn first_read_only(&self) -> Option<&str> {
        self.0
            .keys()
            .map(String::as_str)
            .find(|id| ids::is_read_only(id))
    }

    /// The entries that are neither read-only nor backed by a content field.
    pub fn custom(&self) -> Properties {
        Properties(
            self.0
                .iter()
                .filter(|(k, _)| !ids::is_read_only(k) && !ids::is_field_backed(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Overlay `other` on top of `self`.
    pub fn merge(&mut self, other: &Properties) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl FromIterator<(String, PropertyValue)> for Properties {
    fn from_iter<T: IntoIterator<Item = (String, PropertyValue)>>(iter: T) -> Self {
        Properties(iter.into_iter().collect())
    }
}
