//! AtomPub binding.
//!
//! Navigation is link driven: every entry the server returns carries the
//! URLs of its related resources (children, parents, versions, ACL ...).
//! Those links are cached per object so that follow-up operations on an
//! object already seen cost a single request.

mod feed;

use std::sync::Arc;

use async_trait::async_trait;
use cmis_core::{
    property, Ace, Acl, AclPropagation, Binding, BindingKind, ChangeEventsPage, CmisError,
    CmisObject, ContentStream, ListOptions, LookupKey, ObjectId, ObjectTree, Page, Properties,
    PropertyValue, QueryResult, RepositoryInfo, RepositorySummary, Result, TypeDefinition,
    UnfileObject, VersioningState,
};
use dashmap::DashMap;
use reqwest::{header, Method, StatusCode};
use tracing::{debug, info, instrument, warn};

use crate::codec;
use crate::config::ConnectionConfig;
use crate::http::{check_status, content_from_response, error_from_status, read_text, HttpTransport};

use feed::{
    expand_template, object_of, query_param, read_entries, read_entry, read_feed, read_service,
    with_params, write_acl, write_entry, write_id_entry, write_query, Entry, InlineContent, Links,
    Workspace,
};

/// CMIS AtomPub client for one service document URL.
pub struct AtomPubBinding {
    transport: HttpTransport,
    endpoint: String,
    /// Workspace per repository id, filled from the service document.
    workspaces: DashMap<String, Arc<Workspace>>,
    /// Links per (repository id, object id).
    links: DashMap<(String, ObjectId), Links>,
}

impl AtomPubBinding {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
            endpoint: config.endpoint.clone(),
            workspaces: DashMap::new(),
            links: DashMap::new(),
        })
    }

    // =========================================================================
    // HTTP helpers
    // =========================================================================

    async fn get_xml(&self, url: &str, key: Option<LookupKey>) -> Result<String> {
        debug!("GET {}", url);
        let response = self.transport.send(self.transport.request(Method::GET, url)).await?;
        read_text(check_status(response, key).await?).await
    }

    async fn send_xml(
        &self,
        method: Method,
        url: &str,
        content_type: &str,
        body: String,
        key: Option<LookupKey>,
    ) -> Result<String> {
        debug!("{} {} ({} bytes)", method, url, body.len());
        let request = self
            .transport
            .request(method, url)
            .header(header::CONTENT_TYPE, content_type)
            .body(body);
        let response = self.transport.send(request).await?;
        read_text(check_status(response, key).await?).await
    }

    async fn delete(&self, url: &str, key: Option<LookupKey>) -> Result<()> {
        debug!("DELETE {}", url);
        let response = self.transport.send(self.transport.request(Method::DELETE, url)).await?;
        check_status(response, key).await?;
        Ok(())
    }

    // =========================================================================
    // Service document
    // =========================================================================

    async fn load_workspaces(&self) -> Result<Vec<Arc<Workspace>>> {
        let xml = self.get_xml(&self.endpoint, None).await?;
        let workspaces: Vec<Arc<Workspace>> = read_service(&xml)?.into_iter().map(Arc::new).collect();
        if workspaces.is_empty() {
            return Err(CmisError::Repository(format!(
                "{} does not offer any repository",
                self.endpoint
            )));
        }

        for ws in &workspaces {
            self.workspaces.insert(ws.info.id.clone(), Arc::clone(ws));
        }
        debug!("Service document lists {} repositories", workspaces.len());
        Ok(workspaces)
    }

    async fn workspace(&self, repository_id: &str) -> Result<Arc<Workspace>> {
        if let Some(ws) = self.workspaces.get(repository_id).map(|w| Arc::clone(w.value())) {
            return Ok(ws);
        }
        self.load_workspaces()
            .await?
            .into_iter()
            .find(|w| w.info.id == repository_id)
            .ok_or_else(|| unknown_repository(&self.endpoint, repository_id))
    }

    // =========================================================================
    // Link cache
    // =========================================================================

    fn remember(&self, repository_id: &str, entry: Entry<CmisObject>) -> CmisObject {
        self.links
            .insert((repository_id.to_string(), entry.value.id().clone()), entry.links);
        entry.value
    }

    fn remember_all(&self, repository_id: &str, entries: Vec<Entry<CmisObject>>) -> Vec<CmisObject> {
        entries
            .into_iter()
            .map(|e| self.remember(repository_id, e))
            .collect()
    }

    fn remember_tree(&self, repository_id: &str, entries: Vec<Entry<CmisObject>>) -> Vec<ObjectTree> {
        entries
            .into_iter()
            .map(|mut e| {
                let children = std::mem::take(&mut e.children);
                ObjectTree {
                    object: self.remember(repository_id, e),
                    children: self.remember_tree(repository_id, children),
                }
            })
            .collect()
    }

    fn forget(&self, repository_id: &str, object_id: &ObjectId) {
        self.links
            .remove(&(repository_id.to_string(), object_id.clone()));
    }

    async fn links(&self, repository_id: &str, object_id: &ObjectId) -> Result<Links> {
        let key = (repository_id.to_string(), object_id.clone());
        if let Some(links) = self.links.get(&key).map(|l| l.value().clone()) {
            return Ok(links);
        }
        self.get_object(repository_id, object_id, None).await?;
        self.links
            .get(&key)
            .map(|l| l.value().clone())
            .ok_or_else(|| CmisError::Protocol(format!("no links recorded for {}", object_id)))
    }

    async fn link(&self, repository_id: &str, object_id: &ObjectId, rel: &str) -> Result<String> {
        self.links(repository_id, object_id)
            .await?
            .get(rel)
            .map(str::to_string)
            .ok_or_else(|| missing_link(object_id, rel))
    }

    async fn edit_link(&self, repository_id: &str, object_id: &ObjectId) -> Result<String> {
        self.links(repository_id, object_id)
            .await?
            .edit()
            .map(str::to_string)
            .ok_or_else(|| missing_link(object_id, feed::REL_EDIT))
    }

    async fn children_link(&self, repository_id: &str, folder_id: &ObjectId) -> Result<String> {
        self.links(repository_id, folder_id)
            .await?
            .get_typed(feed::REL_DOWN, feed::TYPE_FEED)
            .map(str::to_string)
            .ok_or_else(|| missing_link(folder_id, feed::REL_DOWN))
    }

    // =========================================================================
    // Shared request shapes
    // =========================================================================

    async fn object_feed(&self, repository_id: &str, url: &str, key: LookupKey) -> Result<Vec<CmisObject>> {
        let xml = self.get_xml(url, Some(key)).await?;
        Ok(self.remember_all(repository_id, read_feed(&xml, object_of)?.entries))
    }

    async fn object_page(&self, repository_id: &str, url: &str, key: Option<LookupKey>) -> Result<Page<CmisObject>> {
        let xml = self.get_xml(url, key).await?;
        let listing = read_feed(&xml, object_of)?;
        Ok(Page {
            has_more: listing.has_more_items,
            total: listing.num_items,
            items: self.remember_all(repository_id, listing.entries),
        })
    }

    async fn post_entry(
        &self,
        repository_id: &str,
        url: &str,
        body: String,
        key: LookupKey,
    ) -> Result<ObjectId> {
        let xml = self
            .send_xml(Method::POST, url, feed::TYPE_ENTRY, body, Some(key))
            .await?;
        let object = self.remember(repository_id, read_entry(&xml, object_of)?);
        Ok(object.id().clone())
    }

    async fn tree(
        &self,
        repository_id: &str,
        url: &str,
        folder_id: &ObjectId,
        depth: u32,
        filter: Option<&str>,
    ) -> Result<Vec<ObjectTree>> {
        let mut params = vec![("depth", depth.to_string()), ("includeAllowableActions", "true".to_string())];
        if let Some(filter) = filter {
            params.push(("filter", filter.to_string()));
        }
        let xml = self
            .get_xml(&with_params(url, &params), Some(id_key(folder_id)))
            .await?;
        Ok(self.remember_tree(repository_id, read_feed(&xml, object_of)?.entries))
    }
}

fn id_key(object_id: &ObjectId) -> LookupKey {
    LookupKey::Id(object_id.to_string())
}

fn missing_link(object_id: &ObjectId, rel: &str) -> CmisError {
    CmisError::UnsupportedCapability(format!("object {} has no '{}' link", object_id, rel))
}

fn unknown_repository(endpoint: &str, repository_id: &str) -> CmisError {
    CmisError::InvalidConfig(format!(
        "repository '{}' is not offered by {}",
        repository_id, endpoint
    ))
}

fn list_params(options: &ListOptions) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("maxItems", options.max_items.to_string()),
        ("skipCount", options.skip_count.to_string()),
        ("includeAllowableActions", "true".to_string()),
    ];
    if let Some(filter) = &options.filter {
        params.push(("filter", filter.clone()));
    }
    if let Some(order_by) = &options.order_by {
        params.push(("orderBy", order_by.clone()));
    }
    params
}

fn object_template_values<'a>(filter: Option<&'a str>) -> Vec<(&'static str, &'a str)> {
    vec![
        ("filter", filter.unwrap_or_default()),
        ("includeAllowableActions", "true"),
        ("includePolicyIds", "false"),
        ("includeRelationships", "none"),
        ("includeACL", "false"),
        ("renditionFilter", "cmis:none"),
    ]
}

/// Read failed ids from a delete-tree failure feed.
fn failed_ids(body: &str) -> Option<Vec<ObjectId>> {
    let listing = read_feed(body, |entry| {
        let properties = codec::child(entry, "object")
            .and_then(|o| codec::child(o, "properties"))
            .map(codec::parse_properties)
            .transpose()?
            .unwrap_or_default();
        Ok(properties
            .get(property::OBJECT_ID)
            .and_then(PropertyValue::first_str)
            .map(ObjectId::new))
    })
    .ok()?;
    Some(listing.entries.into_iter().filter_map(|e| e.value).collect())
}

#[async_trait]
impl Binding for AtomPubBinding {
    fn kind(&self) -> BindingKind {
        BindingKind::Atom
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_repositories(&self) -> Result<Vec<RepositorySummary>> {
        Ok(self
            .load_workspaces()
            .await?
            .iter()
            .map(|w| w.info.summary())
            .collect())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_repository_info(&self, repository_id: Option<&str>) -> Result<RepositoryInfo> {
        let workspaces = self.load_workspaces().await?;
        let workspace = match repository_id {
            Some(id) => workspaces
                .into_iter()
                .find(|w| w.info.id == id)
                .ok_or_else(|| unknown_repository(&self.endpoint, id))?,
            None => workspaces
                .into_iter()
                .next()
                .ok_or_else(|| CmisError::Repository("empty service document".to_string()))?,
        };
        info!("Repository {} ({})", workspace.info.id, workspace.info.name);
        Ok(workspace.info.clone())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_type_definition(&self, repository_id: &str, type_id: &str) -> Result<TypeDefinition> {
        let ws = self.workspace(repository_id).await?;
        let url = expand_template(ws.template("typebyid")?, &[("id", type_id)]);
        let xml = self
            .get_xml(&url, Some(LookupKey::Id(type_id.to_string())))
            .await?;
        let entry = read_entry(&xml, |e| {
            codec::child(e, "type")
                .ok_or_else(|| CmisError::Protocol("entry without cmisra:type".to_string()))
                .and_then(codec::parse_type_definition)
        })?;
        Ok(entry.value)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_object(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        filter: Option<&str>,
    ) -> Result<CmisObject> {
        let ws = self.workspace(repository_id).await?;
        let mut values = object_template_values(filter);
        values.push(("id", object_id.as_str()));
        let url = expand_template(ws.template("objectbyid")?, &values);

        let xml = self.get_xml(&url, Some(id_key(object_id))).await?;
        Ok(self.remember(repository_id, read_entry(&xml, object_of)?))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_object_by_path(
        &self,
        repository_id: &str,
        path: &str,
        filter: Option<&str>,
    ) -> Result<CmisObject> {
        let ws = self.workspace(repository_id).await?;
        let mut values = object_template_values(filter);
        values.push(("path", path));
        let url = expand_template(ws.template("objectbypath")?, &values);

        let xml = self
            .get_xml(&url, Some(LookupKey::Path(path.to_string())))
            .await?;
        Ok(self.remember(repository_id, read_entry(&xml, object_of)?))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_content_stream(&self, repository_id: &str, object_id: &ObjectId) -> Result<ContentStream> {
        let links = self.links(repository_id, object_id).await?;
        let href = links.get(feed::REL_EDIT_MEDIA).ok_or_else(|| {
            CmisError::Constraint(format!("object {} has no content stream", object_id))
        })?;

        debug!("Downloading content of {}", object_id);
        let response = self.transport.send(self.transport.download(href)).await?;
        let response = check_status(response, Some(id_key(object_id))).await?;
        Ok(content_from_response(response, None))
    }

    #[instrument(skip(self, properties, content), level = "debug")]
    async fn create_document(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        properties: &Properties,
        content: Option<ContentStream>,
        versioning_state: VersioningState,
    ) -> Result<ObjectId> {
        let href = self.children_link(repository_id, folder_id).await?;
        let url = with_params(&href, &[("versioningState", versioning_state.wire().to_string())]);

        let body = match content {
            Some(content) => {
                let mime_type = content.mime_type().to_string();
                let data = content.into_bytes().await?;
                write_entry(
                    properties,
                    Some(InlineContent {
                        mime_type: &mime_type,
                        data: &data,
                    }),
                )
            }
            None => write_entry(properties, None),
        };

        self.post_entry(repository_id, &url, body, id_key(folder_id)).await
    }

    #[instrument(skip(self, properties), level = "debug")]
    async fn create_folder(
        &self,
        repository_id: &str,
        parent_id: &ObjectId,
        properties: &Properties,
    ) -> Result<ObjectId> {
        let href = self.children_link(repository_id, parent_id).await?;
        self.post_entry(repository_id, &href, write_entry(properties, None), id_key(parent_id))
            .await
    }

    #[instrument(skip(self, properties), level = "debug")]
    async fn create_relationship(&self, repository_id: &str, properties: &Properties) -> Result<ObjectId> {
        let source_id = properties
            .get(property::SOURCE_ID)
            .and_then(PropertyValue::first_str)
            .map(ObjectId::new)
            .ok_or_else(|| {
                CmisError::InvalidArgument("a relationship needs cmis:sourceId".to_string())
            })?;
        let href = self
            .link(repository_id, &source_id, feed::REL_RELATIONSHIPS)
            .await?;
        self.post_entry(repository_id, &href, write_entry(properties, None), id_key(&source_id))
            .await
    }

    #[instrument(skip(self, properties), level = "debug")]
    async fn update_properties(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        change_token: Option<&str>,
        properties: &Properties,
    ) -> Result<ObjectId> {
        let href = self.edit_link(repository_id, object_id).await?;
        let mut properties = properties.clone();
        if let Some(token) = change_token {
            properties.insert(property::CHANGE_TOKEN.to_string(), PropertyValue::string(token));
        }

        let xml = self
            .send_xml(
                Method::PUT,
                &href,
                feed::TYPE_ENTRY,
                write_entry(&properties, None),
                Some(id_key(object_id)),
            )
            .await?;
        self.forget(repository_id, object_id);
        Ok(self.remember(repository_id, read_entry(&xml, object_of)?).id().clone())
    }

    #[instrument(skip(self), level = "debug")]
    async fn move_object(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        source_folder_id: &ObjectId,
        target_folder_id: &ObjectId,
    ) -> Result<ObjectId> {
        let href = self.children_link(repository_id, target_folder_id).await?;
        let url = with_params(&href, &[("sourceFolderId", source_folder_id.to_string())]);
        self.forget(repository_id, object_id);
        self.post_entry(
            repository_id,
            &url,
            write_id_entry(object_id.as_str()),
            id_key(object_id),
        )
        .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_object(&self, repository_id: &str, object_id: &ObjectId, all_versions: bool) -> Result<()> {
        let href = self.edit_link(repository_id, object_id).await?;
        let url = with_params(&href, &[("allVersions", all_versions.to_string())]);
        self.delete(&url, Some(id_key(object_id))).await?;
        self.forget(repository_id, object_id);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_tree(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        all_versions: bool,
        unfile: UnfileObject,
        continue_on_failure: bool,
    ) -> Result<Vec<ObjectId>> {
        let links = self.links(repository_id, folder_id).await?;
        let href = links
            .get(feed::REL_FOLDER_TREE)
            .or_else(|| links.get_typed(feed::REL_DOWN, feed::TYPE_TREE))
            .ok_or_else(|| missing_link(folder_id, feed::REL_FOLDER_TREE))?;
        let url = with_params(
            href,
            &[
                ("allVersions", all_versions.to_string()),
                ("unfileObjects", unfile.wire().to_string()),
                ("continueOnFailure", continue_on_failure.to_string()),
            ],
        );

        debug!("DELETE {}", url);
        let response = self.transport.send(self.transport.request(Method::DELETE, &url)).await?;
        let status = response.status();
        if status.is_success() {
            self.forget(repository_id, folder_id);
            return Ok(Vec::new());
        }

        let body = read_text(response).await.unwrap_or_default();
        if continue_on_failure && status == StatusCode::INTERNAL_SERVER_ERROR {
            let failed = failed_ids(&body).unwrap_or_else(|| vec![folder_id.clone()]);
            warn!("Deleting tree {} left {} objects behind", folder_id, failed.len());
            return Ok(failed);
        }
        Err(error_from_status(status, &body, Some(id_key(folder_id))))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_children(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        options: &ListOptions,
    ) -> Result<Page<CmisObject>> {
        let href = self.children_link(repository_id, folder_id).await?;
        let url = with_params(&href, &list_params(options));
        self.object_page(repository_id, &url, Some(id_key(folder_id))).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_descendants(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        depth: u32,
        filter: Option<&str>,
    ) -> Result<Vec<ObjectTree>> {
        let href = self
            .links(repository_id, folder_id)
            .await?
            .get_typed(feed::REL_DOWN, feed::TYPE_TREE)
            .map(str::to_string)
            .ok_or_else(|| missing_link(folder_id, "down (tree)"))?;
        self.tree(repository_id, &href, folder_id, depth, filter).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_folder_tree(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        depth: u32,
        filter: Option<&str>,
    ) -> Result<Vec<ObjectTree>> {
        let href = self
            .link(repository_id, folder_id, feed::REL_FOLDER_TREE)
            .await?;
        self.tree(repository_id, &href, folder_id, depth, filter).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_folder_parent(&self, repository_id: &str, folder_id: &ObjectId) -> Result<CmisObject> {
        let links = self.links(repository_id, folder_id).await?;
        let Some(href) = links.get(feed::REL_UP) else {
            return Err(CmisError::NoParent(folder_id.clone()));
        };

        let xml = self.get_xml(href, Some(id_key(folder_id))).await?;
        read_entries(&xml, object_of)?
            .into_iter()
            .next()
            .map(|e| self.remember(repository_id, e))
            .ok_or_else(|| CmisError::NoParent(folder_id.clone()))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_object_parents(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        filter: Option<&str>,
    ) -> Result<Vec<CmisObject>> {
        let links = self.links(repository_id, object_id).await?;
        let Some(href) = links.get(feed::REL_UP) else {
            return Ok(Vec::new());
        };

        let url = match filter {
            Some(filter) => with_params(href, &[("filter", filter.to_string())]),
            None => href.to_string(),
        };
        let xml = self.get_xml(&url, Some(id_key(object_id))).await?;
        Ok(self.remember_all(repository_id, read_entries(&xml, object_of)?))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_checked_out_docs(&self, repository_id: &str, options: &ListOptions) -> Result<Page<CmisObject>> {
        let ws = self.workspace(repository_id).await?;
        let url = with_params(ws.collection("checkedout")?, &list_params(options));
        self.object_page(repository_id, &url, None).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn query(
        &self,
        repository_id: &str,
        statement: &str,
        search_all_versions: bool,
        options: &ListOptions,
    ) -> Result<Page<QueryResult>> {
        let ws = self.workspace(repository_id).await?;
        let body = write_query(statement, search_all_versions, options.max_items, options.skip_count);
        let xml = self
            .send_xml(Method::POST, ws.collection("query")?, feed::TYPE_QUERY, body, None)
            .await?;

        let listing = read_feed(&xml, |e| {
            codec::child(e, "object")
                .ok_or_else(|| CmisError::Protocol("query entry without cmisra:object".to_string()))
                .and_then(codec::parse_query_result)
        })?;
        Ok(Page {
            items: listing.entries.into_iter().map(|e| e.value).collect(),
            has_more: listing.has_more_items,
            total: listing.num_items,
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_content_changes(
        &self,
        repository_id: &str,
        change_token: Option<&str>,
        include_properties: bool,
        max_items: u32,
    ) -> Result<ChangeEventsPage> {
        let ws = self.workspace(repository_id).await?;
        let href = ws.links.get(feed::REL_CHANGES).ok_or_else(|| {
            CmisError::UnsupportedCapability(format!(
                "repository {} does not expose a change log",
                repository_id
            ))
        })?;

        let mut params = vec![
            ("includeProperties", include_properties.to_string()),
            ("maxItems", max_items.to_string()),
        ];
        if let Some(token) = change_token {
            params.push(("changeLogToken", token.to_string()));
        }

        let xml = self.get_xml(&with_params(href, &params), None).await?;
        let listing = read_feed(&xml, |e| {
            codec::child(e, "object")
                .ok_or_else(|| CmisError::Protocol("change entry without cmisra:object".to_string()))
                .and_then(|o| codec::parse_change_event(o, include_properties))
        })?;

        // The last page carries no next link; resume from the repository's
        // current token so the following read does not restart the log.
        let next_token = listing
            .links
            .get(feed::REL_NEXT)
            .and_then(|next| query_param(next, "changeLogToken"));
        let latest_change_token = match next_token {
            Some(token) => Some(token),
            None => self
                .load_workspaces()
                .await?
                .into_iter()
                .find(|w| w.info.id == repository_id)
                .and_then(|w| w.info.latest_change_log_token.clone())
                .or_else(|| change_token.map(str::to_string)),
        };

        Ok(ChangeEventsPage {
            latest_change_token,
            has_more: listing.has_more_items,
            events: listing.entries.into_iter().map(|e| e.value).collect(),
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn check_out(&self, repository_id: &str, object_id: &ObjectId) -> Result<ObjectId> {
        let ws = self.workspace(repository_id).await?;
        let href = ws.collection("checkedout")?.to_string();
        self.forget(repository_id, object_id);
        self.post_entry(repository_id, &href, write_id_entry(object_id.as_str()), id_key(object_id))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn cancel_check_out(&self, repository_id: &str, object_id: &ObjectId) -> Result<()> {
        let href = self.edit_link(repository_id, object_id).await?;
        self.delete(&href, Some(id_key(object_id))).await?;
        self.forget(repository_id, object_id);
        Ok(())
    }

    #[instrument(skip(self, properties, content), level = "debug")]
    async fn check_in(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        major: bool,
        properties: &Properties,
        content: Option<ContentStream>,
        comment: Option<&str>,
    ) -> Result<ObjectId> {
        let href = self.edit_link(repository_id, object_id).await?;
        let mut params = vec![("checkin", "true".to_string()), ("major", major.to_string())];
        if let Some(comment) = comment {
            params.push(("checkinComment", comment.to_string()));
        }
        let url = with_params(&href, &params);

        let body = match content {
            Some(content) => {
                let mime_type = content.mime_type().to_string();
                let data = content.into_bytes().await?;
                write_entry(
                    properties,
                    Some(InlineContent {
                        mime_type: &mime_type,
                        data: &data,
                    }),
                )
            }
            None => write_entry(properties, None),
        };

        let xml = self
            .send_xml(Method::PUT, &url, feed::TYPE_ENTRY, body, Some(id_key(object_id)))
            .await?;
        self.forget(repository_id, object_id);
        Ok(self.remember(repository_id, read_entry(&xml, object_of)?).id().clone())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_all_versions(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        _version_series_id: &str,
        filter: Option<&str>,
    ) -> Result<Vec<CmisObject>> {
        let href = self
            .link(repository_id, object_id, feed::REL_VERSION_HISTORY)
            .await?;
        let url = match filter {
            Some(filter) => with_params(&href, &[("filter", filter.to_string())]),
            None => href,
        };
        self.object_feed(repository_id, &url, id_key(object_id)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_object_relationships(&self, repository_id: &str, object_id: &ObjectId) -> Result<Vec<CmisObject>> {
        let href = self
            .link(repository_id, object_id, feed::REL_RELATIONSHIPS)
            .await?;
        let url = with_params(
            &href,
            &[
                ("relationshipDirection", "either".to_string()),
                ("includeSubRelationshipTypes", "true".to_string()),
            ],
        );
        self.object_feed(repository_id, &url, id_key(object_id)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_acl(&self, repository_id: &str, object_id: &ObjectId) -> Result<Acl> {
        let href = self.link(repository_id, object_id, feed::REL_ACL).await?;
        let xml = self.get_xml(&href, Some(id_key(object_id))).await?;
        let doc = codec::parse_document(&xml)?;
        Ok(codec::parse_acl(doc.root_element()))
    }

    #[instrument(skip(self), level = "debug")]
    async fn apply_acl(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        add: &[Ace],
        remove: &[Ace],
        propagation: AclPropagation,
    ) -> Result<Acl> {
        // AtomPub replaces the whole ACL, so the delta is applied locally first.
        let current = self.get_acl(repository_id, object_id).await?;
        let merged = current.merged(add, remove);

        let href = self.link(repository_id, object_id, feed::REL_ACL).await?;
        let url = with_params(&href, &[("ACLPropagation", propagation.wire().to_string())]);
        let xml = self
            .send_xml(
                Method::PUT,
                &url,
                feed::TYPE_ACL,
                write_acl(&merged.aces),
                Some(id_key(object_id)),
            )
            .await?;
        let doc = codec::parse_document(&xml)?;
        Ok(codec::parse_acl(doc.root_element()))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_applied_policies(&self, repository_id: &str, object_id: &ObjectId) -> Result<Vec<CmisObject>> {
        let href = self.link(repository_id, object_id, feed::REL_POLICIES).await?;
        self.object_feed(repository_id, &href, id_key(object_id)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn apply_policy(&self, repository_id: &str, policy_id: &ObjectId, object_id: &ObjectId) -> Result<()> {
        let href = self.link(repository_id, object_id, feed::REL_POLICIES).await?;
        self.send_xml(
            Method::POST,
            &href,
            feed::TYPE_ENTRY,
            write_id_entry(policy_id.as_str()),
            Some(id_key(object_id)),
        )
        .await?;
        Ok(())
    }
}
