//! Object lookup and mutation.
//!
//! Snapshots fetched without a filter are cached per session. Every
//! operation that changes an object evicts what it touched; callers fetch
//! again to observe the new state.

use std::collections::BTreeMap;
use std::sync::Arc;

use cmis_core::{
    property, Ace, Acl, AclPropagation, CapabilityAcl, CmisError, CmisObject, ContentStream,
    ObjectId, ObjectRef, Properties, PropertyValue, RepositoryInfo, RepositorySummary, Result,
    TypeDefinition, UnfileObject, VersioningState,
};
use tracing::{debug, info, instrument, warn};

use crate::client::CmisClient;
use crate::session::Session;

const DOCUMENT_TYPE: &str = "cmis:document";
const FOLDER_TYPE: &str = "cmis:folder";

/// A document to create: its name plus optional content, type and properties.
///
/// Extra properties are given as strings and converted through the type
/// definition of `object_type`.
#[derive(Debug)]
pub struct NewDocument {
    pub name: String,
    pub content: Option<ContentStream>,
    pub object_type: String,
    pub properties: BTreeMap<String, String>,
    pub versioning_state: VersioningState,
}

impl NewDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: None,
            object_type: DOCUMENT_TYPE.to_string(),
            properties: BTreeMap::new(),
            versioning_state: VersioningState::default(),
        }
    }

    pub fn with_content(mut self, content: ContentStream) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = object_type.into();
        self
    }

    pub fn with_property(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(id.into(), value.into());
        self
    }

    pub fn with_versioning_state(mut self, state: VersioningState) -> Self {
        self.versioning_state = state;
        self
    }
}

/// Split an absolute repository path into its segments.
fn path_segments(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(CmisError::InvalidArgument(format!(
            "repository path must be absolute, got '{}'",
            path
        )));
    }
    Ok(path.split('/').filter(|s| !s.is_empty()).collect())
}

fn ensure_folder(object: Arc<CmisObject>, path: &str) -> Result<Arc<CmisObject>> {
    if object.is_folder() {
        Ok(object)
    } else {
        Err(CmisError::Constraint(format!("'{}' exists but is not a folder", path)))
    }
}

fn require_acl(session: &Session, manage: bool) -> Result<()> {
    let acl = &session.repository_info().capabilities.acl;
    let supported = if manage {
        *acl == CapabilityAcl::Manage
    } else {
        session.repository_info().supports_acl()
    };
    if supported {
        Ok(())
    } else {
        Err(CmisError::UnsupportedCapability(format!(
            "repository {} ACL capability is {:?}",
            session.repository_id(),
            acl
        )))
    }
}

impl CmisClient {
    // =========================================================================
    // Repository
    // =========================================================================

    pub async fn repositories(&self) -> Result<Vec<RepositorySummary>> {
        self.session().await?.binding().get_repositories().await
    }

    /// Repository info fetched at connect time.
    pub async fn repository_info(&self) -> Result<RepositoryInfo> {
        Ok(self.session().await?.repository_info().clone())
    }

    pub async fn get_type_definition(&self, type_id: &str) -> Result<Arc<TypeDefinition>> {
        self.session().await?.type_definition(type_id).await
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    #[instrument(skip(self), level = "debug")]
    pub async fn get_object_by_id(&self, id: &ObjectId, filter: Option<&str>) -> Result<Arc<CmisObject>> {
        let session = self.session().await?;
        if filter.is_none() {
            if let Some(object) = session.cache().get(id) {
                return Ok(object);
            }
        }

        let object = session
            .binding()
            .get_object(session.repository_id(), id, filter)
            .await?;
        debug!("Fetched {} ({})", object.id(), object.type_id());
        Ok(match filter {
            None => session.cache().insert(object),
            Some(_) => Arc::new(object),
        })
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn get_object_by_path(&self, path: &str, filter: Option<&str>) -> Result<Arc<CmisObject>> {
        path_segments(path)?;
        let session = self.session().await?;
        if filter.is_none() {
            if let Some(object) = session.cache().get_by_path(path) {
                return Ok(object);
            }
        }

        let object = session
            .binding()
            .get_object_by_path(session.repository_id(), path, filter)
            .await?;
        debug!("Resolved {} to {}", path, object.id());
        Ok(match filter {
            None => session.cache().insert_at(path, object),
            Some(_) => Arc::new(object),
        })
    }

    /// Resolve `path` to a folder, creating every missing segment.
    ///
    /// Calling it again for a path that now exists returns the same folder
    /// without creating anything. Fails with `Constraint` when a segment
    /// exists but is not a folder.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_or_create_folder_by_path(&self, path: &str) -> Result<Arc<CmisObject>> {
        let segments = path_segments(path)?;
        match self.get_object_by_path(path, None).await {
            Ok(existing) => return ensure_folder(existing, path),
            Err(CmisError::ObjectNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let session = self.session().await?;
        let root_id = session.repository_info().root_folder_id.clone();
        let mut current = self.get_object_by_id(&root_id, None).await?;
        let mut walked = String::new();
        for segment in segments {
            walked.push('/');
            walked.push_str(segment);
            current = match self.get_object_by_path(&walked, None).await {
                Ok(existing) => ensure_folder(existing, &walked)?,
                Err(CmisError::ObjectNotFound(_)) => {
                    info!("Creating missing folder {}", walked);
                    self.create_folder(&ObjectRef::ByValue(current), segment, None, &BTreeMap::new())
                        .await?
                }
                Err(e) => return Err(e),
            };
        }
        Ok(current)
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Create a document in the folder at `folder_path`.
    ///
    /// Without `force` a missing folder fails with `ObjectNotFound`; with it
    /// the missing folders are created first.
    pub async fn create_document_by_path(
        &self,
        folder_path: &str,
        document: NewDocument,
        force: bool,
    ) -> Result<Arc<CmisObject>> {
        let folder = if force {
            self.get_or_create_folder_by_path(folder_path).await?
        } else {
            ensure_folder(self.get_object_by_path(folder_path, None).await?, folder_path)?
        };
        self.create_document_by_id(folder.id(), document).await
    }

    #[instrument(skip(self, document), level = "debug", fields(name = %document.name))]
    pub async fn create_document_by_id(&self, folder_id: &ObjectId, document: NewDocument) -> Result<Arc<CmisObject>> {
        let session = self.session().await?;
        let NewDocument {
            name,
            content,
            object_type,
            properties,
            versioning_state,
        } = document;

        let mut props = session.coerce(&[object_type.as_str()], &properties).await?;
        props.insert(property::NAME.to_string(), PropertyValue::string(name.clone()));
        props.insert(property::OBJECT_TYPE_ID.to_string(), PropertyValue::id(object_type));
        let content = content.map(|c| match c.filename() {
            Some(_) => c,
            None => c.with_filename(name.clone()),
        });

        let id = session
            .binding()
            .create_document(session.repository_id(), folder_id, &props, content, versioning_state)
            .await?;
        info!("Created document {} as {} in {}", name, id, folder_id);
        self.get_object_by_id(&id, None).await
    }

    pub async fn create_folder(
        &self,
        parent: &ObjectRef,
        name: &str,
        folder_type: Option<&str>,
        properties: &BTreeMap<String, String>,
    ) -> Result<Arc<CmisObject>> {
        let session = self.session().await?;
        let folder_type = folder_type.unwrap_or(FOLDER_TYPE);
        let mut props = session.coerce(&[folder_type], properties).await?;
        props.insert(property::NAME.to_string(), PropertyValue::string(name));
        props.insert(property::OBJECT_TYPE_ID.to_string(), PropertyValue::id(folder_type));

        let id = session
            .binding()
            .create_folder(session.repository_id(), parent.id(), &props)
            .await?;
        info!("Created folder {} as {} in {}", name, id, parent.id());
        self.get_object_by_id(&id, None).await
    }

    pub async fn create_relationship(
        &self,
        source: &ObjectRef,
        target: &ObjectRef,
        relationship_type: &str,
    ) -> Result<Arc<CmisObject>> {
        let session = self.session().await?;
        let mut props = Properties::new();
        props.insert(property::OBJECT_TYPE_ID.to_string(), PropertyValue::id(relationship_type));
        props.insert(property::SOURCE_ID.to_string(), PropertyValue::id(source.id().as_str()));
        props.insert(property::TARGET_ID.to_string(), PropertyValue::id(target.id().as_str()));

        let id = session
            .binding()
            .create_relationship(session.repository_id(), &props)
            .await?;
        info!(
            "Created {} relationship {} from {} to {}",
            relationship_type,
            id,
            source.id(),
            target.id()
        );
        self.get_object_by_id(&id, None).await
    }

    // =========================================================================
    // Update and delete
    // =========================================================================

    /// Send only the named properties; everything else is left untouched.
    ///
    /// Values are converted through the object's type and its secondary
    /// types. Returns the id of the updated object, which may be new.
    #[instrument(skip(self, properties), level = "debug", fields(object = %object.id()))]
    pub async fn update_object_properties(
        &self,
        object: &ObjectRef,
        properties: &BTreeMap<String, String>,
    ) -> Result<ObjectId> {
        if properties.is_empty() {
            return Err(CmisError::InvalidArgument("no properties to update".to_string()));
        }
        let session = self.session().await?;
        let current = self.resolve(object).await?;

        let mut type_ids = vec![current.type_id()];
        type_ids.extend(current.secondary_type_ids().iter().map(String::as_str));
        let props = session.coerce(&type_ids, properties).await?;

        self.send_update(&session, &current, &props).await
    }

    /// Attach a secondary type (aspect) and set its properties.
    #[instrument(skip(self, properties), level = "debug", fields(object = %object.id()))]
    pub async fn apply_aspect(
        &self,
        object: &ObjectRef,
        aspect_id: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<ObjectId> {
        let session = self.session().await?;
        let current = self.resolve(object).await?;

        let mut props = session.coerce(&[aspect_id], properties).await?;
        let mut secondary: Vec<String> = current.secondary_type_ids().to_vec();
        if !secondary.iter().any(|t| t == aspect_id) {
            secondary.push(aspect_id.to_string());
        }
        props.insert(
            property::SECONDARY_OBJECT_TYPE_IDS.to_string(),
            PropertyValue::Id(secondary),
        );

        self.send_update(&session, &current, &props).await
    }

    async fn send_update(&self, session: &Session, current: &CmisObject, props: &Properties) -> Result<ObjectId> {
        let id = session
            .binding()
            .update_properties(session.repository_id(), current.id(), current.change_token(), props)
            .await?;
        session.cache().evict(current.id());
        session.cache().evict(&id);
        debug!("Updated {} properties on {}", props.len(), id);
        Ok(id)
    }

    pub async fn move_object(
        &self,
        object: &ObjectRef,
        source_folder: &ObjectId,
        target_folder: &ObjectId,
    ) -> Result<ObjectId> {
        let session = self.session().await?;
        let current = self.resolve(object).await?;
        let id = session
            .binding()
            .move_object(session.repository_id(), current.id(), source_folder, target_folder)
            .await?;
        if let Some(path) = current.path() {
            session.cache().evict_subtree(path);
        }
        session.cache().evict(current.id());
        session.cache().evict(&id);
        info!("Moved {} from {} to {}", current.id(), source_folder, target_folder);
        Ok(id)
    }

    pub async fn delete(&self, object: &ObjectRef, all_versions: bool) -> Result<()> {
        let session = self.session().await?;
        session
            .binding()
            .delete_object(session.repository_id(), object.id(), all_versions)
            .await?;
        session.cache().evict(object.id());
        info!("Deleted {}", object.id());
        Ok(())
    }

    /// Delete a folder and everything below it. Returns the ids that could
    /// not be deleted; an empty list means the whole tree is gone.
    #[instrument(skip(self), level = "debug", fields(folder = %folder.id()))]
    pub async fn delete_tree(
        &self,
        folder: &ObjectRef,
        all_versions: bool,
        unfile: UnfileObject,
        continue_on_failure: bool,
    ) -> Result<Vec<ObjectId>> {
        let session = self.session().await?;
        let current = self.resolve(folder).await?;
        let failed = session
            .binding()
            .delete_tree(
                session.repository_id(),
                current.id(),
                all_versions,
                unfile,
                continue_on_failure,
            )
            .await?;

        // Documents carry no path and often no parent id, so nothing short of
        // a full clear guarantees every member of the tree is gone.
        session.cache().clear();
        if failed.is_empty() {
            info!("Deleted tree {}", current.id());
        } else {
            warn!("Deleting tree {} left {} objects behind", current.id(), failed.len());
        }
        Ok(failed)
    }

    // =========================================================================
    // Versioning and content
    // =========================================================================

    /// Check a document out. Returns the private working copy id.
    pub async fn check_out(&self, document: &ObjectRef) -> Result<ObjectId> {
        let session = self.session().await?;
        let pwc = session
            .binding()
            .check_out(session.repository_id(), document.id())
            .await?;
        session.cache().evict(document.id());
        info!("Checked out {} as {}", document.id(), pwc);
        Ok(pwc)
    }

    pub async fn cancel_check_out(&self, pwc: &ObjectRef) -> Result<()> {
        let session = self.session().await?;
        session
            .binding()
            .cancel_check_out(session.repository_id(), pwc.id())
            .await?;
        session.cache().evict(pwc.id());
        Ok(())
    }

    /// Check a private working copy back in. Returns the new version id.
    pub async fn check_in(
        &self,
        pwc: &ObjectRef,
        major: bool,
        properties: &BTreeMap<String, String>,
        content: Option<ContentStream>,
        comment: Option<&str>,
    ) -> Result<ObjectId> {
        let session = self.session().await?;
        let props = if properties.is_empty() {
            Properties::new()
        } else {
            let current = self.resolve(pwc).await?;
            session.coerce(&[current.type_id()], properties).await?
        };

        let id = session
            .binding()
            .check_in(session.repository_id(), pwc.id(), major, &props, content, comment)
            .await?;
        session.cache().evict(pwc.id());
        session.cache().evict(&id);
        info!("Checked in {} as {}", pwc.id(), id);
        Ok(id)
    }

    pub async fn get_all_versions(&self, document: &ObjectRef, filter: Option<&str>) -> Result<Vec<CmisObject>> {
        let session = self.session().await?;
        let current = self.resolve(document).await?;
        let series = current.version_series_id().ok_or_else(|| {
            CmisError::InvalidArgument(format!("{} is not versionable", current.id()))
        })?;
        session
            .binding()
            .get_all_versions(session.repository_id(), current.id(), series, filter)
            .await
    }

    /// Document content. The file name falls back to the document's
    /// content file name, then to its name.
    #[instrument(skip(self), level = "debug", fields(document = %document.id()))]
    pub async fn get_content_stream(&self, document: &ObjectRef) -> Result<ContentStream> {
        let session = self.session().await?;
        let content = session
            .binding()
            .get_content_stream(session.repository_id(), document.id())
            .await?;
        if content.filename().is_some() {
            return Ok(content);
        }

        let current = self.resolve(document).await?;
        Ok(match current.content_stream_file_name().or(current.name()) {
            Some(name) => content.with_filename(name),
            None => content,
        })
    }

    // =========================================================================
    // Relationships, ACL and policies
    // =========================================================================

    pub async fn get_object_relationships(&self, object: &ObjectRef) -> Result<Vec<CmisObject>> {
        let session = self.session().await?;
        session
            .binding()
            .get_object_relationships(session.repository_id(), object.id())
            .await
    }

    pub async fn get_acl(&self, object: &ObjectRef) -> Result<Acl> {
        let session = self.session().await?;
        require_acl(&session, false)?;
        session.binding().get_acl(session.repository_id(), object.id()).await
    }

    /// Remove then add entries; returns the resulting ACL.
    #[instrument(skip(self, add, remove), level = "debug", fields(object = %object.id()))]
    pub async fn apply_acl(
        &self,
        object: &ObjectRef,
        add: &[Ace],
        remove: &[Ace],
        propagation: AclPropagation,
    ) -> Result<Acl> {
        let session = self.session().await?;
        require_acl(&session, true)?;
        let acl = session
            .binding()
            .apply_acl(session.repository_id(), object.id(), add, remove, propagation)
            .await?;
        session.cache().evict(object.id());
        debug!("ACL of {} now has {} entries", object.id(), acl.aces.len());
        Ok(acl)
    }

    pub async fn get_applied_policies(&self, object: &ObjectRef) -> Result<Vec<CmisObject>> {
        let session = self.session().await?;
        session
            .binding()
            .get_applied_policies(session.repository_id(), object.id())
            .await
    }

    pub async fn apply_policy(&self, policy: &ObjectId, object: &ObjectRef) -> Result<()> {
        let session = self.session().await?;
        session
            .binding()
            .apply_policy(session.repository_id(), policy, object.id())
            .await?;
        session.cache().evict(object.id());
        Ok(())
    }
}
