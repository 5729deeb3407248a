use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CmisError, Result};

/// Well-known CMIS property ids.
pub mod property {
    pub const NAME: &str = "cmis:name";
    pub const OBJECT_ID: &str = "cmis:objectId";
    pub const OBJECT_TYPE_ID: &str = "cmis:objectTypeId";
    pub const BASE_TYPE_ID: &str = "cmis:baseTypeId";
    pub const PATH: &str = "cmis:path";
    pub const PARENT_ID: &str = "cmis:parentId";
    pub const CHANGE_TOKEN: &str = "cmis:changeToken";
    pub const CREATED_BY: &str = "cmis:createdBy";
    pub const CREATION_DATE: &str = "cmis:creationDate";
    pub const LAST_MODIFICATION_DATE: &str = "cmis:lastModificationDate";
    pub const VERSION_SERIES_ID: &str = "cmis:versionSeriesId";
    pub const VERSION_LABEL: &str = "cmis:versionLabel";
    pub const IS_LATEST_VERSION: &str = "cmis:isLatestVersion";
    pub const IS_PRIVATE_WORKING_COPY: &str = "cmis:isPrivateWorkingCopy";
    pub const IS_VERSION_SERIES_CHECKED_OUT: &str = "cmis:isVersionSeriesCheckedOut";
    pub const VERSION_SERIES_CHECKED_OUT_ID: &str = "cmis:versionSeriesCheckedOutId";
    pub const CONTENT_STREAM_LENGTH: &str = "cmis:contentStreamLength";
    pub const CONTENT_STREAM_MIME_TYPE: &str = "cmis:contentStreamMimeType";
    pub const CONTENT_STREAM_FILE_NAME: &str = "cmis:contentStreamFileName";
    pub const SOURCE_ID: &str = "cmis:sourceId";
    pub const TARGET_ID: &str = "cmis:targetId";
    pub const SECONDARY_OBJECT_TYPE_IDS: &str = "cmis:secondaryObjectTypeIds";
}

/// Opaque repository object handle. Never interpreted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// CMIS base object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    Document,
    Folder,
    Relationship,
    Policy,
    Item,
    Secondary,
}

impl BaseType {
    /// The `cmis:*` type id of this base type.
    pub fn id(&self) -> &'static str {
        match self {
            BaseType::Document => "cmis:document",
            BaseType::Folder => "cmis:folder",
            BaseType::Relationship => "cmis:relationship",
            BaseType::Policy => "cmis:policy",
            BaseType::Item => "cmis:item",
            BaseType::Secondary => "cmis:secondary",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "cmis:document" => Some(BaseType::Document),
            "cmis:folder" => Some(BaseType::Folder),
            "cmis:relationship" => Some(BaseType::Relationship),
            "cmis:policy" => Some(BaseType::Policy),
            "cmis:item" => Some(BaseType::Item),
            "cmis:secondary" => Some(BaseType::Secondary),
            _ => None,
        }
    }
}

/// A typed property value. CMIS properties are always carried as lists;
/// single-valued properties hold at most one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum PropertyValue {
    String(Vec<String>),
    Id(Vec<String>),
    Boolean(Vec<bool>),
    Integer(Vec<i64>),
    Decimal(Vec<f64>),
    DateTime(Vec<DateTime<Utc>>),
    Uri(Vec<String>),
    Html(Vec<String>),
}

impl PropertyValue {
    pub fn string(value: impl Into<String>) -> Self {
        PropertyValue::String(vec![value.into()])
    }

    pub fn id(value: impl Into<String>) -> Self {
        PropertyValue::Id(vec![value.into()])
    }

    pub fn boolean(value: bool) -> Self {
        PropertyValue::Boolean(vec![value])
    }

    pub fn integer(value: i64) -> Self {
        PropertyValue::Integer(vec![value])
    }

    /// First value of a textual property (String, Id, Uri, Html).
    pub fn first_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v)
            | PropertyValue::Id(v)
            | PropertyValue::Uri(v)
            | PropertyValue::Html(v) => v.first().map(String::as_str),
            _ => None,
        }
    }

    pub fn first_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn first_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn first_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::DateTime(v) => v.first().copied(),
            _ => None,
        }
    }

    /// All values of a textual property, empty for other kinds.
    pub fn strings(&self) -> &[String] {
        match self {
            PropertyValue::String(v)
            | PropertyValue::Id(v)
            | PropertyValue::Uri(v)
            | PropertyValue::Html(v) => v,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PropertyValue::String(v)
            | PropertyValue::Id(v)
            | PropertyValue::Uri(v)
            | PropertyValue::Html(v) => v.len(),
            PropertyValue::Boolean(v) => v.len(),
            PropertyValue::Integer(v) => v.len(),
            PropertyValue::Decimal(v) => v.len(),
            PropertyValue::DateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Property bag keyed by property id. Ordered so that wire output is stable.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Immutable snapshot of a repository object.
///
/// A snapshot is never edited after construction. Operations that change
/// an object on the server return a (possibly different) `ObjectId`; fetch
/// it again to observe the new state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CmisObject {
    id: ObjectId,
    base_type: BaseType,
    type_id: String,
    properties: Properties,
    allowed_actions: BTreeSet<String>,
}

impl CmisObject {
    /// Build a snapshot from a decoded property bag.
    ///
    /// `cmis:objectId` and `cmis:baseTypeId` are required; `cmis:objectTypeId`
    /// falls back to the base type id when a filter left it out.
    pub fn from_properties(properties: Properties, allowed_actions: BTreeSet<String>) -> Result<Self> {
        let id = properties
            .get(property::OBJECT_ID)
            .and_then(PropertyValue::first_str)
            .map(ObjectId::new)
            .ok_or_else(|| CmisError::Protocol("object without cmis:objectId".to_string()))?;

        let base_type = properties
            .get(property::BASE_TYPE_ID)
            .and_then(PropertyValue::first_str)
            .and_then(BaseType::from_id)
            .ok_or_else(|| {
                CmisError::Protocol(format!("object {} without a known cmis:baseTypeId", id))
            })?;

        let type_id = properties
            .get(property::OBJECT_TYPE_ID)
            .and_then(PropertyValue::first_str)
            .unwrap_or(base_type.id())
            .to_string();

        Ok(Self {
            id,
            base_type,
            type_id,
            properties,
            allowed_actions,
        })
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn base_type(&self) -> BaseType {
        self.base_type
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, id: &str) -> Option<&PropertyValue> {
        self.properties.get(id)
    }

    fn str_property(&self, id: &str) -> Option<&str> {
        self.property(id).and_then(PropertyValue::first_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.str_property(property::NAME)
    }

    pub fn path(&self) -> Option<&str> {
        self.str_property(property::PATH)
    }

    pub fn parent_id(&self) -> Option<ObjectId> {
        self.str_property(property::PARENT_ID).map(ObjectId::new)
    }

    pub fn change_token(&self) -> Option<&str> {
        self.str_property(property::CHANGE_TOKEN)
    }

    pub fn version_series_id(&self) -> Option<&str> {
        self.str_property(property::VERSION_SERIES_ID)
    }

    pub fn is_private_working_copy(&self) -> bool {
        self.property(property::IS_PRIVATE_WORKING_COPY)
            .and_then(PropertyValue::first_bool)
            .unwrap_or(false)
    }

    pub fn version_series_checked_out_id(&self) -> Option<ObjectId> {
        self.str_property(property::VERSION_SERIES_CHECKED_OUT_ID)
            .map(ObjectId::new)
    }

    pub fn content_stream_mime_type(&self) -> Option<&str> {
        self.str_property(property::CONTENT_STREAM_MIME_TYPE)
    }

    pub fn content_stream_length(&self) -> Option<u64> {
        self.property(property::CONTENT_STREAM_LENGTH)
            .and_then(PropertyValue::first_i64)
            .and_then(|len| u64::try_from(len).ok())
    }

    pub fn content_stream_file_name(&self) -> Option<&str> {
        self.str_property(property::CONTENT_STREAM_FILE_NAME)
    }

    pub fn source_id(&self) -> Option<ObjectId> {
        self.str_property(property::SOURCE_ID).map(ObjectId::new)
    }

    pub fn target_id(&self) -> Option<ObjectId> {
        self.str_property(property::TARGET_ID).map(ObjectId::new)
    }

    pub fn secondary_type_ids(&self) -> &[String] {
        self.property(property::SECONDARY_OBJECT_TYPE_IDS)
            .map(PropertyValue::strings)
            .unwrap_or(&[])
    }

    pub fn allowed_actions(&self) -> &BTreeSet<String> {
        &self.allowed_actions
    }

    /// Whether the repository reported `action` (e.g. `canDeleteObject`) as allowed.
    pub fn can(&self, action: &str) -> bool {
        self.allowed_actions.contains(action)
    }

    pub fn is_folder(&self) -> bool {
        self.base_type == BaseType::Folder
    }

    pub fn is_document(&self) -> bool {
        self.base_type == BaseType::Document
    }
}

/// Either an object id or an already-fetched snapshot.
///
/// Operations accept this instead of "object or id" argument pairs and
/// resolve it once on entry.
#[derive(Debug, Clone)]
pub enum ObjectRef {
    ById(ObjectId),
    ByValue(Arc<CmisObject>),
}

impl ObjectRef {
    pub fn id(&self) -> &ObjectId {
        match self {
            ObjectRef::ById(id) => id,
            ObjectRef::ByValue(object) => object.id(),
        }
    }

    /// The snapshot if one was supplied.
    pub fn snapshot(&self) -> Option<&Arc<CmisObject>> {
        match self {
            ObjectRef::ById(_) => None,
            ObjectRef::ByValue(object) => Some(object),
        }
    }
}

impl From<ObjectId> for ObjectRef {
    fn from(id: ObjectId) -> Self {
        ObjectRef::ById(id)
    }
}

impl From<&str> for ObjectRef {
    fn from(id: &str) -> Self {
        ObjectRef::ById(ObjectId::from(id))
    }
}

impl From<Arc<CmisObject>> for ObjectRef {
    fn from(object: Arc<CmisObject>) -> Self {
        ObjectRef::ByValue(object)
    }
}

impl From<CmisObject> for ObjectRef {
    fn from(object: CmisObject) -> Self {
        ObjectRef::ByValue(Arc::new(object))
    }
}

/// One row of a query result. Properties are keyed by query name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub properties: Properties,
}

impl QueryResult {
    pub fn property(&self, query_name: &str) -> Option<&PropertyValue> {
        self.properties.get(query_name)
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.property(property::OBJECT_ID)
            .and_then(PropertyValue::first_str)
            .map(ObjectId::new)
    }
}
