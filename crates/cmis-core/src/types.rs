use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CmisError, Result};
use crate::object::{BaseType, PropertyValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Boolean,
    Id,
    Integer,
    DateTime,
    Decimal,
    Html,
    String,
    Uri,
}

impl PropertyType {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "boolean" => Some(Self::Boolean),
            "id" => Some(Self::Id),
            "integer" => Some(Self::Integer),
            "datetime" => Some(Self::DateTime),
            "decimal" => Some(Self::Decimal),
            "html" => Some(Self::Html),
            "string" => Some(Self::String),
            "uri" => Some(Self::Uri),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Updatability {
    ReadOnly,
    ReadWrite,
    WhenCheckedOut,
    OnCreate,
}

impl Updatability {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "readwrite" => Self::ReadWrite,
            "whencheckedout" => Self::WhenCheckedOut,
            "oncreate" => Self::OnCreate,
            _ => Self::ReadOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDefinition {
    pub id: String,
    pub local_name: Option<String>,
    pub display_name: Option<String>,
    pub query_name: Option<String>,
    pub property_type: PropertyType,
    pub cardinality: Cardinality,
    pub updatability: Updatability,
    pub required: bool,
}

impl PropertyDefinition {
    /// Convert textual input (configuration, CLI flags) into a typed value.
    ///
    /// Multi-valued properties take a comma separated list.
    pub fn coerce(&self, raw: &str) -> Result<PropertyValue> {
        let parts: Vec<&str> = match self.cardinality {
            Cardinality::Single => vec![raw],
            Cardinality::Multi => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let invalid = |value: &str| {
            CmisError::InvalidArgument(format!(
                "'{}' is not a valid {:?} value for property {}",
                value, self.property_type, self.id
            ))
        };

        let value = match self.property_type {
            PropertyType::String => PropertyValue::String(owned(&parts)),
            PropertyType::Id => PropertyValue::Id(owned(&parts)),
            PropertyType::Uri => PropertyValue::Uri(owned(&parts)),
            PropertyType::Html => PropertyValue::Html(owned(&parts)),
            PropertyType::Boolean => PropertyValue::Boolean(
                parts
                    .iter()
                    .map(|p| p.parse::<bool>().map_err(|_| invalid(p)))
                    .collect::<Result<_>>()?,
            ),
            PropertyType::Integer => PropertyValue::Integer(
                parts
                    .iter()
                    .map(|p| p.parse::<i64>().map_err(|_| invalid(p)))
                    .collect::<Result<_>>()?,
            ),
            PropertyType::Decimal => PropertyValue::Decimal(
                parts
                    .iter()
                    .map(|p| p.parse::<f64>().map_err(|_| invalid(p)))
                    .collect::<Result<_>>()?,
            ),
            PropertyType::DateTime => PropertyValue::DateTime(
                parts
                    .iter()
                    .map(|p| {
                        DateTime::parse_from_rfc3339(p)
                            .map(|dt| dt.with_timezone(&Utc))
                            .map_err(|_| invalid(p))
                    })
                    .collect::<Result<_>>()?,
            ),
        };

        Ok(value)
    }
}

fn owned(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Object type definition as returned by `getTypeDefinition`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDefinition {
    pub id: String,
    pub local_name: Option<String>,
    pub query_name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub base_type: BaseType,
    pub parent_type_id: Option<String>,
    pub creatable: bool,
    pub fileable: bool,
    pub queryable: bool,
    pub versionable: Option<bool>,
    pub content_stream_allowed: Option<String>,
    pub property_definitions: BTreeMap<String, PropertyDefinition>,
}

impl TypeDefinition {
    pub fn property_definition(&self, id: &str) -> Option<&PropertyDefinition> {
        self.property_definitions.get(id)
    }
}
