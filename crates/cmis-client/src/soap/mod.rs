//! Web Services (SOAP) binding.
//!
//! Document/literal SOAP 1.1 against the CMIS services published under the
//! endpoint URL. Content is exchanged inline as base64.

mod envelope;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use cmis_core::{
    Ace, Acl, AclPropagation, Binding, BindingKind, ChangeEventsPage, CmisError, CmisObject,
    ContentStream, ListOptions, LookupKey, ObjectId, ObjectTree, Page, Properties, QueryResult,
    RepositoryInfo, RepositorySummary, Result, TypeDefinition, UnfileObject, VersioningState,
};
use reqwest::{header, Method, StatusCode};
use roxmltree::Node;
use tracing::{debug, info, instrument, warn};

use crate::codec::{self, child, child_bool, child_text, children, parse_document};
use crate::config::ConnectionConfig;
use crate::http::{error_from_status, read_text, HttpTransport};

use envelope::{Request, Service};

/// CMIS Web Services client.
pub struct SoapBinding {
    transport: HttpTransport,
    /// Base URL the `*Service` endpoints hang off, without trailing slash.
    endpoint: String,
}

impl SoapBinding {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Post one request and return the raw response document.
    ///
    /// SOAP faults arrive with HTTP 500; they are decoded before the status
    /// is looked at so that the CMIS fault type is not lost.
    async fn call(&self, service: Service, request: Request, key: Option<LookupKey>) -> Result<String> {
        let url = format!("{}/{}", self.endpoint, service.name());
        debug!("SOAP {} -> {}", request.operation(), url);

        let http_request = self
            .transport
            .request(Method::POST, &url)
            .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", "\"\"")
            .body(request.envelope(self.transport.credentials()));
        let response = self.transport.send(http_request).await?;
        let status = response.status();
        let text = read_text(response).await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(error_from_status(status, &text, key));
        }
        if let Ok(doc) = parse_document(&text) {
            if let Some(error) = envelope::fault(&doc, key.clone()) {
                debug!("{} failed: {}", request.operation(), error);
                return Err(error);
            }
        }
        if !status.is_success() {
            return Err(error_from_status(status, &text, key));
        }
        Ok(text)
    }

    async fn new_object_id(
        &self,
        service: Service,
        request: Request,
        key: Option<LookupKey>,
    ) -> Result<ObjectId> {
        let operation = request.operation();
        let xml = self.call(service, request, key).await?;
        decode(&xml, operation, |r| {
            child_text(r, "objectId")
                .map(ObjectId::new)
                .ok_or_else(|| protocol(format!("{}Response without objectId", operation)))
        })
    }

    async fn repository_ids(&self) -> Result<Vec<RepositorySummary>> {
        let xml = self
            .call(Service::Repository, Request::bare("getRepositories"), None)
            .await?;
        decode(&xml, "getRepositories", |r| {
            Ok(children(r, "repositories")
                .filter_map(|entry| {
                    let id = child_text(entry, "repositoryId")?;
                    let name = child_text(entry, "repositoryName").unwrap_or_else(|| id.clone());
                    Some(RepositorySummary { id, name })
                })
                .collect())
        })
    }
}

fn protocol(message: impl Into<String>) -> CmisError {
    CmisError::Protocol(message.into())
}

fn id_key(object_id: &ObjectId) -> LookupKey {
    LookupKey::Id(object_id.to_string())
}

/// Parse a response document and hand its `<operation>Response` element to `read`.
fn decode<T>(xml: &str, operation: &str, read: impl FnOnce(Node<'_, '_>) -> Result<T>) -> Result<T> {
    let doc = parse_document(xml)?;
    read(envelope::response(&doc, operation)?)
}

fn required<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Result<Node<'a, 'i>> {
    child(node, name).ok_or_else(|| {
        protocol(format!(
            "<{}> without <{}>",
            node.tag_name().name(),
            name
        ))
    })
}

/// Object list (`cmisObjectListType` or `cmisObjectInFolderListType`).
fn object_page(list: Node<'_, '_>) -> Result<Page<CmisObject>> {
    let items = children(list, "objects")
        .map(|o| codec::parse_object(child(o, "object").unwrap_or(o)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Page {
        items,
        has_more: child_bool(list, "hasMoreItems").unwrap_or(false),
        total: child_text(list, "numItems").and_then(|n| n.parse().ok()),
    })
}

/// Bare repeated objects (`getAllVersions`, `getAppliedPolicies`).
fn objects(response: Node<'_, '_>) -> Result<Vec<CmisObject>> {
    children(response, "objects").map(codec::parse_object).collect()
}

/// Nested `cmisObjectInFolderContainerType` elements.
fn containers(node: Node<'_, '_>, name: &'static str) -> Result<Vec<ObjectTree>> {
    children(node, name)
        .map(|container| {
            let object = child(container, "objectInFolder")
                .and_then(|o| child(o, "object"))
                .ok_or_else(|| protocol("container without objectInFolder"))?;
            Ok(ObjectTree {
                object: codec::parse_object(object)?,
                children: containers(container, "children")?,
            })
        })
        .collect()
}

fn content_stream(node: Node<'_, '_>) -> Result<ContentStream> {
    let encoded: String = child_text(node, "stream")
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let data = Bytes::from(
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| protocol(format!("invalid base64 content: {}", e)))?,
    );
    let length = data.len() as u64;
    Ok(ContentStream::new(
        child_text(node, "filename"),
        child_text(node, "mimeType").unwrap_or_else(|| "application/octet-stream".to_string()),
        Some(length),
        Box::pin(futures::stream::once(async move { Ok::<_, CmisError>(data) })),
    ))
}

async fn inline(content: Option<ContentStream>) -> Result<Option<(Option<String>, String, Bytes)>> {
    match content {
        Some(content) => {
            let filename = content.filename().map(str::to_string);
            let mime_type = content.mime_type().to_string();
            Ok(Some((filename, mime_type, content.into_bytes().await?)))
        }
        None => Ok(None),
    }
}

fn with_content(request: Request, content: &Option<(Option<String>, String, Bytes)>) -> Request {
    match content {
        Some((filename, mime_type, data)) => request.content(filename.as_deref(), mime_type, data),
        None => request,
    }
}

#[async_trait]
impl Binding for SoapBinding {
    fn kind(&self) -> BindingKind {
        BindingKind::Soap
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_repositories(&self) -> Result<Vec<RepositorySummary>> {
        self.repository_ids().await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_repository_info(&self, repository_id: Option<&str>) -> Result<RepositoryInfo> {
        let repository_id = match repository_id {
            Some(id) => id.to_string(),
            None => self
                .repository_ids()
                .await?
                .into_iter()
                .next()
                .map(|r| r.id)
                .ok_or_else(|| {
                    CmisError::Repository(format!("{} does not offer any repository", self.endpoint))
                })?,
        };

        let request = Request::new("getRepositoryInfo", &repository_id);
        let xml = self.call(Service::Repository, request, None).await?;
        let info = decode(&xml, "getRepositoryInfo", |r| {
            codec::parse_repository_info(required(r, "repositoryInfo")?)
        })?;
        info!("Repository {} ({})", info.id, info.name);
        Ok(info)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_type_definition(&self, repository_id: &str, type_id: &str) -> Result<TypeDefinition> {
        let request = Request::new("getTypeDefinition", repository_id).text("typeId", type_id);
        let xml = self
            .call(Service::Repository, request, Some(LookupKey::Id(type_id.to_string())))
            .await?;
        decode(&xml, "getTypeDefinition", |r| {
            codec::parse_type_definition(required(r, "type")?)
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_object(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        filter: Option<&str>,
    ) -> Result<CmisObject> {
        let request = Request::new("getObject", repository_id)
            .text("objectId", object_id.as_str())
            .opt("filter", filter)
            .flag("includeAllowableActions", true);
        let xml = self
            .call(Service::Object, request, Some(id_key(object_id)))
            .await?;
        decode(&xml, "getObject", |r| codec::parse_object(required(r, "object")?))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_object_by_path(
        &self,
        repository_id: &str,
        path: &str,
        filter: Option<&str>,
    ) -> Result<CmisObject> {
        let request = Request::new("getObjectByPath", repository_id)
            .text("path", path)
            .opt("filter", filter)
            .flag("includeAllowableActions", true);
        let xml = self
            .call(Service::Object, request, Some(LookupKey::Path(path.to_string())))
            .await?;
        decode(&xml, "getObjectByPath", |r| codec::parse_object(required(r, "object")?))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_content_stream(&self, repository_id: &str, object_id: &ObjectId) -> Result<ContentStream> {
        let request = Request::new("getContentStream", repository_id).text("objectId", object_id.as_str());
        let xml = self
            .call(Service::Object, request, Some(id_key(object_id)))
            .await?;
        decode(&xml, "getContentStream", |r| content_stream(required(r, "contentStream")?))
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
        let content = inline(content).await?;
        let request = Request::new("createDocument", repository_id)
            .properties(properties)
            .text("folderId", folder_id.as_str());
        let request = with_content(request, &content).text("versioningState", versioning_state.wire());
        self.new_object_id(Service::Object, request, Some(id_key(folder_id)))
            .await
    }

    #[instrument(skip(self, properties), level = "debug")]
    async fn create_folder(
        &self,
        repository_id: &str,
        parent_id: &ObjectId,
        properties: &Properties,
    ) -> Result<ObjectId> {
        let request = Request::new("createFolder", repository_id)
            .properties(properties)
            .text("folderId", parent_id.as_str());
        self.new_object_id(Service::Object, request, Some(id_key(parent_id)))
            .await
    }

    #[instrument(skip(self, properties), level = "debug")]
    async fn create_relationship(&self, repository_id: &str, properties: &Properties) -> Result<ObjectId> {
        let request = Request::new("createRelationship", repository_id).properties(properties);
        self.new_object_id(Service::Object, request, None).await
    }

    #[instrument(skip(self, properties), level = "debug")]
    async fn update_properties(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        change_token: Option<&str>,
        properties: &Properties,
    ) -> Result<ObjectId> {
        let request = Request::new("updateProperties", repository_id)
            .text("objectId", object_id.as_str())
            .opt("changeToken", change_token)
            .properties(properties);
        self.new_object_id(Service::Object, request, Some(id_key(object_id)))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn move_object(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        source_folder_id: &ObjectId,
        target_folder_id: &ObjectId,
    ) -> Result<ObjectId> {
        let request = Request::new("moveObject", repository_id)
            .text("objectId", object_id.as_str())
            .text("targetFolderId", target_folder_id.as_str())
            .text("sourceFolderId", source_folder_id.as_str());
        self.new_object_id(Service::Object, request, Some(id_key(object_id)))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_object(&self, repository_id: &str, object_id: &ObjectId, all_versions: bool) -> Result<()> {
        let request = Request::new("deleteObject", repository_id)
            .text("objectId", object_id.as_str())
            .flag("allVersions", all_versions);
        self.call(Service::Object, request, Some(id_key(object_id)))
            .await?;
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
        let request = Request::new("deleteTree", repository_id)
            .text("folderId", folder_id.as_str())
            .flag("allVersions", all_versions)
            .text("unfileObjects", unfile.wire())
            .flag("continueOnFailure", continue_on_failure);
        let xml = self
            .call(Service::Object, request, Some(id_key(folder_id)))
            .await?;
        let failed = decode(&xml, "deleteTree", |r| {
            Ok(child(r, "failedToDelete")
                .map(|f| {
                    children(f, "objectIds")
                        .map(|n| ObjectId::new(codec::text_of(n).trim()))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default())
        })?;
        if !failed.is_empty() {
            warn!("Deleting tree {} left {} objects behind", folder_id, failed.len());
        }
        Ok(failed)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_children(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        options: &ListOptions,
    ) -> Result<Page<CmisObject>> {
        let request = Request::new("getChildren", repository_id)
            .text("folderId", folder_id.as_str())
            .opt("filter", options.filter.as_deref())
            .opt("orderBy", options.order_by.as_deref())
            .flag("includeAllowableActions", true)
            .number("maxItems", options.max_items)
            .number("skipCount", options.skip_count);
        let xml = self
            .call(Service::Navigation, request, Some(id_key(folder_id)))
            .await?;
        decode(&xml, "getChildren", |r| object_page(required(r, "objects")?))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_descendants(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        depth: u32,
        filter: Option<&str>,
    ) -> Result<Vec<ObjectTree>> {
        let request = Request::new("getDescendants", repository_id)
            .text("folderId", folder_id.as_str())
            .number("depth", depth)
            .opt("filter", filter)
            .flag("includeAllowableActions", true);
        let xml = self
            .call(Service::Navigation, request, Some(id_key(folder_id)))
            .await?;
        decode(&xml, "getDescendants", |r| containers(r, "objects"))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_folder_tree(
        &self,
        repository_id: &str,
        folder_id: &ObjectId,
        depth: u32,
        filter: Option<&str>,
    ) -> Result<Vec<ObjectTree>> {
        let request = Request::new("getFolderTree", repository_id)
            .text("folderId", folder_id.as_str())
            .number("depth", depth)
            .opt("filter", filter)
            .flag("includeAllowableActions", true);
        let xml = self
            .call(Service::Navigation, request, Some(id_key(folder_id)))
            .await?;
        decode(&xml, "getFolderTree", |r| containers(r, "objects"))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_folder_parent(&self, repository_id: &str, folder_id: &ObjectId) -> Result<CmisObject> {
        let request = Request::new("getFolderParent", repository_id).text("folderId", folder_id.as_str());
        let xml = match self
            .call(Service::Navigation, request, Some(id_key(folder_id)))
            .await
        {
            // The root folder is the only folder a repository refuses a parent for.
            Err(CmisError::InvalidArgument(_)) => return Err(CmisError::NoParent(folder_id.clone())),
            other => other?,
        };
        decode(&xml, "getFolderParent", |r| codec::parse_object(required(r, "object")?))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_object_parents(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        filter: Option<&str>,
    ) -> Result<Vec<CmisObject>> {
        let request = Request::new("getObjectParents", repository_id)
            .text("objectId", object_id.as_str())
            .opt("filter", filter)
            .flag("includeAllowableActions", true);
        let xml = self
            .call(Service::Navigation, request, Some(id_key(object_id)))
            .await?;
        decode(&xml, "getObjectParents", |r| {
            children(r, "parents")
                .map(|p| codec::parse_object(required(p, "object")?))
                .collect()
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_checked_out_docs(&self, repository_id: &str, options: &ListOptions) -> Result<Page<CmisObject>> {
        let request = Request::new("getCheckedOutDocs", repository_id)
            .opt("filter", options.filter.as_deref())
            .opt("orderBy", options.order_by.as_deref())
            .flag("includeAllowableActions", true)
            .number("maxItems", options.max_items)
            .number("skipCount", options.skip_count);
        let xml = self.call(Service::Navigation, request, None).await?;
        decode(&xml, "getCheckedOutDocs", |r| object_page(required(r, "objects")?))
    }

    #[instrument(skip(self), level = "debug")]
    async fn query(
        &self,
        repository_id: &str,
        statement: &str,
        search_all_versions: bool,
        options: &ListOptions,
    ) -> Result<Page<QueryResult>> {
        let request = Request::new("query", repository_id)
            .text("statement", statement)
            .flag("searchAllVersions", search_all_versions)
            .flag("includeAllowableActions", false)
            .number("maxItems", options.max_items)
            .number("skipCount", options.skip_count);
        let xml = self.call(Service::Discovery, request, None).await?;
        decode(&xml, "query", |r| {
            let list = required(r, "objects")?;
            Ok(Page {
                items: children(list, "objects")
                    .map(codec::parse_query_result)
                    .collect::<Result<Vec<_>>>()?,
                has_more: child_bool(list, "hasMoreItems").unwrap_or(false),
                total: child_text(list, "numItems").and_then(|n| n.parse().ok()),
            })
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
        let request = Request::new("getContentChanges", repository_id)
            .opt("changeLogToken", change_token)
            .flag("includeProperties", include_properties)
            .number("maxItems", max_items);
        let xml = self.call(Service::Discovery, request, None).await?;
        decode(&xml, "getContentChanges", |r| {
            let list = required(r, "objects")?;
            Ok(ChangeEventsPage {
                events: children(list, "objects")
                    .map(|o| codec::parse_change_event(o, include_properties))
                    .collect::<Result<Vec<_>>>()?,
                latest_change_token: child_text(r, "changeLogToken"),
                has_more: child_bool(list, "hasMoreItems").unwrap_or(false),
            })
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn check_out(&self, repository_id: &str, object_id: &ObjectId) -> Result<ObjectId> {
        let request = Request::new("checkOut", repository_id).text("objectId", object_id.as_str());
        self.new_object_id(Service::Versioning, request, Some(id_key(object_id)))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn cancel_check_out(&self, repository_id: &str, object_id: &ObjectId) -> Result<()> {
        let request = Request::new("cancelCheckOut", repository_id).text("objectId", object_id.as_str());
        self.call(Service::Versioning, request, Some(id_key(object_id)))
            .await?;
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
        let content = inline(content).await?;
        let request = Request::new("checkIn", repository_id)
            .text("objectId", object_id.as_str())
            .flag("major", major)
            .properties(properties);
        let request = with_content(request, &content).opt("checkinComment", comment);
        self.new_object_id(Service::Versioning, request, Some(id_key(object_id)))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_all_versions(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        version_series_id: &str,
        filter: Option<&str>,
    ) -> Result<Vec<CmisObject>> {
        let request = Request::new("getAllVersions", repository_id)
            .text("objectId", version_series_id)
            .opt("filter", filter)
            .flag("includeAllowableActions", true);
        let xml = self
            .call(Service::Versioning, request, Some(id_key(object_id)))
            .await?;
        decode(&xml, "getAllVersions", objects)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_object_relationships(&self, repository_id: &str, object_id: &ObjectId) -> Result<Vec<CmisObject>> {
        let request = Request::new("getObjectRelationships", repository_id)
            .text("objectId", object_id.as_str())
            .flag("includeSubRelationshipTypes", true)
            .text("relationshipDirection", "either")
            .flag("includeAllowableActions", true);
        let xml = self
            .call(Service::Relationship, request, Some(id_key(object_id)))
            .await?;
        decode(&xml, "getObjectRelationships", |r| {
            Ok(object_page(required(r, "objects")?)?.items)
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_acl(&self, repository_id: &str, object_id: &ObjectId) -> Result<Acl> {
        let request = Request::new("getACL", repository_id)
            .text("objectId", object_id.as_str())
            .flag("onlyBasicPermissions", false);
        let xml = self
            .call(Service::Acl, request, Some(id_key(object_id)))
            .await?;
        decode(&xml, "getACL", |r| Ok(codec::parse_acl(required(r, "ACL")?)))
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
        let request = Request::new("applyACL", repository_id)
            .text("objectId", object_id.as_str())
            .aces("addACEs", add)
            .aces("removeACEs", remove)
            .text("ACLPropagation", propagation.wire());
        let xml = self
            .call(Service::Acl, request, Some(id_key(object_id)))
            .await?;
        decode(&xml, "applyACL", |r| Ok(codec::parse_acl(required(r, "ACL")?)))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_applied_policies(&self, repository_id: &str, object_id: &ObjectId) -> Result<Vec<CmisObject>> {
        let request = Request::new("getAppliedPolicies", repository_id).text("objectId", object_id.as_str());
        let xml = self
            .call(Service::Policy, request, Some(id_key(object_id)))
            .await?;
        decode(&xml, "getAppliedPolicies", objects)
    }

    #[instrument(skip(self), level = "debug")]
    async fn apply_policy(&self, repository_id: &str, policy_id: &ObjectId, object_id: &ObjectId) -> Result<()> {
        let request = Request::new("applyPolicy", repository_id)
            .text("policyId", policy_id.as_str())
            .text("objectId", object_id.as_str());
        self.call(Service::Policy, request, Some(id_key(object_id)))
            .await?;
        Ok(())
    }
}
