use serde::Serialize;

use crate::object::ObjectId;

/// Repository entry as listed by `getRepositories`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositorySummary {
    pub id: String,
    pub name: String,
}

/// `capabilityChanges`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityChanges {
    #[default]
    None,
    ObjectIdsOnly,
    Properties,
    All,
}

impl CapabilityChanges {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "objectidsonly" => Self::ObjectIdsOnly,
            "properties" => Self::Properties,
            "all" => Self::All,
            _ => Self::None,
        }
    }
}

/// `capabilityACL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityAcl {
    #[default]
    None,
    Discover,
    Manage,
}

impl CapabilityAcl {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "discover" => Self::Discover,
            "manage" => Self::Manage,
            _ => Self::None,
        }
    }
}

/// `capabilityQuery`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityQuery {
    #[default]
    None,
    MetadataOnly,
    FullTextOnly,
    BothSeparate,
    BothCombined,
}

impl CapabilityQuery {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "metadataonly" => Self::MetadataOnly,
            "fulltextonly" => Self::FullTextOnly,
            "bothseparate" => Self::BothSeparate,
            "bothcombined" => Self::BothCombined,
            _ => Self::None,
        }
    }
}

/// `capabilityContentStreamUpdatability`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStreamUpdates {
    #[default]
    None,
    Anytime,
    PwcOnly,
}

impl ContentStreamUpdates {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "anytime" => Self::Anytime,
            "pwconly" => Self::PwcOnly,
            _ => Self::None,
        }
    }
}

/// Optional features a repository advertises.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Capabilities {
    pub changes: CapabilityChanges,
    pub acl: CapabilityAcl,
    pub query: CapabilityQuery,
    pub content_stream_updatability: ContentStreamUpdates,
    pub get_descendants: bool,
    pub get_folder_tree: bool,
    pub multifiling: bool,
    pub pwc_updatable: bool,
    pub all_versions_searchable: bool,
}

/// Repository description, fetched once per session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub vendor_name: Option<String>,
    pub product_name: Option<String>,
    pub product_version: Option<String>,
    pub cmis_version_supported: Option<String>,
    pub root_folder_id: ObjectId,
    pub latest_change_log_token: Option<String>,
    pub capabilities: Capabilities,
}

impl RepositoryInfo {
    pub fn summary(&self) -> RepositorySummary {
        RepositorySummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    pub fn supports_changes(&self) -> bool {
        self.capabilities.changes != CapabilityChanges::None
    }

    pub fn supports_acl(&self) -> bool {
        self.capabilities.acl != CapabilityAcl::None
    }
}
