use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::acl::{Ace, Acl, AclPropagation};
use crate::changes::ChangeEventsPage;
use crate::content::ContentStream;
use crate::error::{CmisError, Result};
use crate::object::{CmisObject, ObjectId, Properties, QueryResult};
use crate::paging::{ListOptions, ObjectTree, Page};
use crate::repository::{RepositoryInfo, RepositorySummary};
use crate::types::TypeDefinition;

/// Wire protocol used to talk to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    /// AtomPub (REST/XML over HTTP)
    #[default]
    Atom,
    /// Web Services (document/literal SOAP)
    Soap,
}

impl BindingKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "atom" | "atompub" => Ok(Self::Atom),
            "soap" | "webservices" => Ok(Self::Soap),
            other => Err(CmisError::InvalidConfig(format!(
                "unknown binding '{}', expected ATOM or SOAP",
                other
            ))),
        }
    }
}

/// Version state a newly created document starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningState {
    None,
    #[default]
    Major,
    Minor,
    CheckedOut,
}

impl VersioningState {
    pub fn wire(&self) -> &'static str {
        match self {
            VersioningState::None => "none",
            VersioningState::Major => "major",
            VersioningState::Minor => "minor",
            VersioningState::CheckedOut => "checkedout",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "none" => Ok(Self::None),
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "checkedout" => Ok(Self::CheckedOut),
            other => Err(CmisError::InvalidArgument(format!(
                "unknown versioning state '{}'",
                other
            ))),
        }
    }
}

/// What happens to non-folder objects filed only in a deleted tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnfileObject {
    Unfile,
    DeleteSingleFiled,
    #[default]
    Delete,
}

impl UnfileObject {
    pub fn wire(&self) -> &'static str {
        match self {
            UnfileObject::Unfile => "unfile",
            UnfileObject::DeleteSingleFiled => "deletesinglefiled",
            UnfileObject::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "unfile" => Ok(Self::Unfile),
            "deletesinglefiled" => Ok(Self::DeleteSingleFiled),
            "delete" => Ok(Self::Delete),
            other => Err(CmisError::InvalidArgument(format!(
                "unknown unfile option '{}'",
                other
            ))),
        }
    }
}

/// One logical CMIS operation per method.
///
/// Implementations own all network I/O and (de)serialization; callers above
/// this trait never see which wire protocol was used. Every method is a
/// single independent request/response exchange from the caller's side and
/// never retries.
#[async_trait]
pub trait Binding: Send + Sync {
    fn kind(&self) -> BindingKind;

    // =========================================================================
    // Repository service
    // =========================================================================

    async fn get_repositories(&self) -> Result<Vec<RepositorySummary>>;

    /// Fetch repository info. `None` selects the first repository the endpoint offers.
    async fn get_repository_info(&self, repository_id: Option<&str>) -> Result<RepositoryInfo>;

    async fn get_type_definition(&self, repository_id: &str, type_id: &str)
        -> Result<TypeDefinition>;

    // =========================================================================
    // Object service
    // =========================================================================

    async fn get_object(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        filter: Option<&str>,
    ) -> Result<CmisObject>;

    async fn get_object_by_path(
        &self,
        repository_id: &str,
        path: &str,
        filter: Option<&str>,
    ) -> Result<CmisObject>;

    async fn get_content_stream(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
    ) -> Result<ContentStream>;

    async fn create_document(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        properties: &Properties,
        content: Option<ContentStream>,
        versioning_state: VersioningState,
    ) -> Result<ObjectId>;

    async fn create_folder(
        &self,
        repository_id: &str,
        parent_id: &ObjectId,
        properties: &Properties,
    ) -> Result<ObjectId>;

    async fn create_relationship(
        &self,
        repository_id: &str,
        properties: &Properties,
    ) -> Result<ObjectId>;

    /// Send only the given properties; the returned id may differ from `object_id`.
    async fn update_properties(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        change_token: Option<&str>,
        properties: &Properties,
    ) -> Result<ObjectId>;

    async fn move_object(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        source_folder_id: &ObjectId,
        target_folder_id: &ObjectId,
    ) -> Result<ObjectId>;

    async fn delete_object(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        all_versions: bool,
    ) -> Result<()>;

    /// Returns the ids that could not be deleted.
    async fn delete_tree(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        all_versions: bool,
        unfile: UnfileObject,
        continue_on_failure: bool,
    ) -> Result<Vec<ObjectId>>;

    // =========================================================================
    // Navigation service
    // =========================================================================

    async fn get_children(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        options: &ListOptions,
    ) -> Result<Page<CmisObject>>;

    async fn get_descendants(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        depth: u32,
        filter: Option<&str>,
    ) -> Result<Vec<ObjectTree>>;

    /// Like `get_descendants` but folders only.
    async fn get_folder_tree(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        depth: u32,
        filter: Option<&str>,
    ) -> Result<Vec<ObjectTree>>;

    /// Fails with `NoParent` for the root folder.
    async fn get_folder_parent(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
    ) -> Result<CmisObject>;

    async fn get_object_parents(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        filter: Option<&str>,
    ) -> Result<Vec<CmisObject>>;

    async fn get_checked_out_docs(
        &self,
        repository_id: &str,
        options: &ListOptions,
    ) -> Result<Page<CmisObject>>;

    // =========================================================================
    // Discovery service
    // =========================================================================

    async fn query(
        &self,
        repository_id: &str,
        statement: &str,
        search_all_versions: bool,
        options: &ListOptions,
    ) -> Result<Page<QueryResult>>;

    async fn get_content_changes(
        &self,
        repository_id: &str,
        change_token: Option<&str>,
        include_properties: bool,
        max_items: u32,
    ) -> Result<ChangeEventsPage>;

    // =========================================================================
    // Versioning service
    // =========================================================================

    /// Returns the id of the private working copy.
    async fn check_out(&self, repository_id: &str, object_id: &ObjectId) -> Result<ObjectId>;

    async fn cancel_check_out(&self, repository_id: &str, object_id: &ObjectId) -> Result<()>;

    async fn check_in(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        major: bool,
        properties: &Properties,
        content: Option<ContentStream>,
        comment: Option<&str>,
    ) -> Result<ObjectId>;

    /// All versions, latest first. AtomPub addresses the series through
    /// `object_id`, SOAP through `version_series_id`.
    async fn get_all_versions(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        version_series_id: &str,
        filter: Option<&str>,
    ) -> Result<Vec<CmisObject>>;

    // =========================================================================
    // Relationship, ACL and policy services
    // =========================================================================

    async fn get_object_relationships(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
    ) -> Result<Vec<CmisObject>>;

    async fn get_acl(&self, repository_id: &str, object_id: &ObjectId) -> Result<Acl>;

    async fn apply_acl(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        add: &[Ace],
        remove: &[Ace],
        propagation: AclPropagation,
    ) -> Result<Acl>;

    async fn get_applied_policies(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
    ) -> Result<Vec<CmisObject>>;

    async fn apply_policy(
        &self,
        repository_id: &str,
        policy_id: &ObjectId,
        object_id: &ObjectId,
    ) -> Result<()>;
}
