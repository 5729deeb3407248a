//! In-memory repository behind the `Binding` trait, with per-operation call
//! counters. Used by the session, object, navigation and change log tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use cmis_core::{
    property, Ace, Acl, AclPropagation, BaseType, Binding, BindingKind, Capabilities,
    CapabilityAcl, CapabilityChanges, Cardinality, ChangeEvent, ChangeEventsPage, ChangeType,
    CmisError, CmisObject, ContentStream, ListOptions, LookupKey, ObjectId, ObjectTree, Page,
    Properties, PropertyDefinition, PropertyType, PropertyValue, QueryResult, RepositoryInfo,
    RepositorySummary, Result, TypeDefinition, UnfileObject, Updatability, VersioningState,
};

use crate::client::CmisClient;
use crate::config::{ConnectionConfig, Credentials};
use crate::session::BindingFactory;

pub(crate) const REPOSITORY_ID: &str = "memory";
pub(crate) const ROOT_ID: &str = "root";

struct Node {
    properties: Properties,
    parent: Option<ObjectId>,
    content: Option<(String, Bytes)>,
    acl: Acl,
    policies: Vec<ObjectId>,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<ObjectId, Node>,
    next_id: u64,
    changes: Vec<ChangeEvent>,
    last_update: Option<Properties>,
}

pub(crate) struct MemoryBinding {
    state: Mutex<State>,
    calls: Mutex<HashMap<&'static str, usize>>,
    reject_credentials: bool,
    changelog: bool,
}

impl MemoryBinding {
    pub fn new() -> Self {
        let mut state = State::default();
        let mut root = Properties::new();
        root.insert(property::OBJECT_ID.to_string(), PropertyValue::id(ROOT_ID));
        root.insert(property::BASE_TYPE_ID.to_string(), PropertyValue::id("cmis:folder"));
        root.insert(property::OBJECT_TYPE_ID.to_string(), PropertyValue::id("cmis:folder"));
        root.insert(property::NAME.to_string(), PropertyValue::string(""));
        state.nodes.insert(
            ObjectId::from(ROOT_ID),
            Node {
                properties: root,
                parent: None,
                content: None,
                acl: Acl::default(),
                policies: Vec::new(),
            },
        );

        Self {
            state: Mutex::new(state),
            calls: Mutex::new(HashMap::new()),
            reject_credentials: false,
            changelog: true,
        }
    }

    pub fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    pub fn without_changelog(mut self) -> Self {
        self.changelog = false;
        self
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Properties sent by the most recent `update_properties`.
    pub fn last_update(&self) -> Option<Properties> {
        self.state.lock().unwrap().last_update.clone()
    }

    /// Append a change event for an arbitrary id.
    pub fn record_change(&self, id: &str, change_type: ChangeType) {
        let mut state = self.state.lock().unwrap();
        push_change(&mut state, &ObjectId::from(id), change_type);
    }

    fn record(&self, operation: &'static str) {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
    }

    fn info(&self) -> RepositoryInfo {
        RepositoryInfo {
            id: REPOSITORY_ID.to_string(),
            name: "Memory".to_string(),
            description: None,
            vendor_name: None,
            product_name: None,
            product_version: None,
            cmis_version_supported: Some("1.1".to_string()),
            root_folder_id: ObjectId::from(ROOT_ID),
            latest_change_log_token: None,
            capabilities: Capabilities {
                changes: if self.changelog {
                    CapabilityChanges::All
                } else {
                    CapabilityChanges::None
                },
                acl: CapabilityAcl::Manage,
                get_descendants: true,
                get_folder_tree: true,
                ..Capabilities::default()
            },
        }
    }
}

fn push_change(state: &mut State, id: &ObjectId, change_type: ChangeType) {
    let seq = state.changes.len() as i64;
    state.changes.push(ChangeEvent {
        object_id: id.clone(),
        change_type,
        change_time: Utc.timestamp_opt(1_700_000_000 + seq, 0).single(),
        properties: Properties::new(),
    });
}

fn not_found(id: &ObjectId) -> CmisError {
    CmisError::ObjectNotFound(LookupKey::Id(id.to_string()))
}

fn name_of(node: &Node) -> &str {
    node.properties
        .get(property::NAME)
        .and_then(PropertyValue::first_str)
        .unwrap_or_default()
}

fn is_folder(node: &Node) -> bool {
    node.properties
        .get(property::BASE_TYPE_ID)
        .and_then(PropertyValue::first_str)
        == Some("cmis:folder")
}

fn path_of(state: &State, id: &ObjectId) -> String {
    let mut names = Vec::new();
    let mut current = state.nodes.get(id);
    while let Some(node) = current {
        let Some(parent) = &node.parent else { break };
        names.push(name_of(node).to_string());
        current = state.nodes.get(parent);
    }
    names.reverse();
    format!("/{}", names.join("/"))
}

fn children_of(state: &State, id: &ObjectId) -> Vec<ObjectId> {
    state
        .nodes
        .iter()
        .filter(|(_, n)| n.parent.as_ref() == Some(id))
        .map(|(child, _)| child.clone())
        .collect()
}

fn snapshot(state: &State, id: &ObjectId) -> Result<CmisObject> {
    let node = state.nodes.get(id).ok_or_else(|| not_found(id))?;
    let mut properties = node.properties.clone();
    let mut actions = BTreeSet::new();
    actions.insert("canGetProperties".to_string());
    if is_folder(node) {
        properties.insert(property::PATH.to_string(), PropertyValue::string(path_of(state, id)));
        actions.insert("canGetChildren".to_string());
    }
    if let Some(parent) = &node.parent {
        properties.insert(property::PARENT_ID.to_string(), PropertyValue::id(parent.as_str()));
    }
    if let Some((mime_type, data)) = &node.content {
        properties.insert(
            property::CONTENT_STREAM_MIME_TYPE.to_string(),
            PropertyValue::string(mime_type.clone()),
        );
        properties.insert(
            property::CONTENT_STREAM_LENGTH.to_string(),
            PropertyValue::integer(data.len() as i64),
        );
    }
    CmisObject::from_properties(properties, actions)
}

fn tree(state: &State, id: &ObjectId, depth: u32, folders_only: bool) -> Result<Vec<ObjectTree>> {
    if depth == 0 {
        return Ok(Vec::new());
    }
    children_of(state, id)
        .iter()
        .filter(|c| !folders_only || state.nodes.get(*c).is_some_and(is_folder))
        .map(|c| {
            Ok(ObjectTree {
                object: snapshot(state, c)?,
                children: tree(state, c, depth - 1, folders_only)?,
            })
        })
        .collect()
}

fn definition(id: &str, property_type: PropertyType, cardinality: Cardinality) -> PropertyDefinition {
    PropertyDefinition {
        id: id.to_string(),
        local_name: None,
        display_name: None,
        query_name: Some(id.to_string()),
        property_type,
        cardinality,
        updatability: Updatability::ReadWrite,
        required: false,
    }
}

fn type_definition(type_id: &str) -> Option<TypeDefinition> {
    let base_type = match type_id {
        "cmis:document" | "my:report" => BaseType::Document,
        "cmis:folder" => BaseType::Folder,
        "P:cm:titled" => BaseType::Secondary,
        _ => return None,
    };

    let mut properties = vec![
        definition(property::NAME, PropertyType::String, Cardinality::Single),
        definition(property::OBJECT_TYPE_ID, PropertyType::Id, Cardinality::Single),
        definition("cmis:description", PropertyType::String, Cardinality::Single),
    ];
    match type_id {
        "my:report" => {
            properties.push(definition("my:pages", PropertyType::Integer, Cardinality::Single));
            properties.push(definition("my:tags", PropertyType::String, Cardinality::Multi));
        }
        "P:cm:titled" => {
            properties = vec![
                definition("cm:title", PropertyType::String, Cardinality::Single),
                definition("cm:description", PropertyType::String, Cardinality::Single),
            ];
        }
        _ => {}
    }

    Some(TypeDefinition {
        id: type_id.to_string(),
        local_name: None,
        query_name: Some(type_id.to_string()),
        display_name: None,
        description: None,
        base_type,
        parent_type_id: None,
        creatable: true,
        fileable: base_type != BaseType::Secondary,
        queryable: true,
        versionable: Some(base_type == BaseType::Document),
        content_stream_allowed: None,
        property_definitions: properties.into_iter().map(|d| (d.id.clone(), d)).collect(),
    })
}

impl MemoryBinding {
    fn create(
        &self,
        parent: &ObjectId,
        base_type: &str,
        properties: &Properties,
        content: Option<(String, Bytes)>,
    ) -> Result<ObjectId> {
        let mut state = self.state.lock().unwrap();
        let parent_node = state.nodes.get(parent).ok_or_else(|| not_found(parent))?;
        if !is_folder(parent_node) {
            return Err(CmisError::Constraint(format!("{} is not a folder", parent)));
        }
        let name = properties
            .get(property::NAME)
            .and_then(PropertyValue::first_str)
            .ok_or_else(|| CmisError::Constraint("cmis:name is required".to_string()))?;
        let taken = children_of(&state, parent)
            .iter()
            .any(|c| state.nodes.get(c).is_some_and(|n| name_of(n) == name));
        if taken {
            return Err(CmisError::Constraint(format!("'{}' already exists", name)));
        }

        state.next_id += 1;
        let id = ObjectId::new(format!("obj-{:04}", state.next_id));
        let mut stored = properties.clone();
        stored.insert(property::OBJECT_ID.to_string(), PropertyValue::id(id.as_str()));
        stored.insert(property::BASE_TYPE_ID.to_string(), PropertyValue::id(base_type));
        stored
            .entry(property::OBJECT_TYPE_ID.to_string())
            .or_insert_with(|| PropertyValue::id(base_type));
        if base_type == "cmis:document" {
            stored.insert(property::VERSION_SERIES_ID.to_string(), PropertyValue::id(format!("vs-{}", id)));
        }

        state.nodes.insert(
            id.clone(),
            Node {
                properties: stored,
                parent: Some(parent.clone()),
                content,
                acl: Acl::default(),
                policies: Vec::new(),
            },
        );
        push_change(&mut state, &id, ChangeType::Created);
        Ok(id)
    }

    fn remove_subtree(state: &mut State, id: &ObjectId) {
        for child in children_of(state, id) {
            Self::remove_subtree(state, &child);
        }
        state.nodes.remove(id);
        push_change(state, id, ChangeType::Deleted);
    }
}

/// Factory handing out one shared `MemoryBinding`.
pub(crate) struct MemoryFactory {
    binding: Arc<MemoryBinding>,
    created: AtomicUsize,
}

impl MemoryFactory {
    pub fn shared(binding: &Arc<MemoryBinding>) -> Arc<Self> {
        Arc::new(Self {
            binding: Arc::clone(binding),
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl BindingFactory for MemoryFactory {
    fn create(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Binding>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let binding: Arc<dyn Binding> = Arc::clone(&self.binding) as Arc<dyn Binding>;
        Ok(binding)
    }
}

#[async_trait]
impl Binding for MemoryBinding {
    fn kind(&self) -> BindingKind {
        BindingKind::Atom
    }

    async fn get_repositories(&self) -> Result<Vec<RepositorySummary>> {
        self.record("get_repositories");
        Ok(vec![self.info().summary()])
    }

    async fn get_repository_info(&self, repository_id: Option<&str>) -> Result<RepositoryInfo> {
        self.record("get_repository_info");
        if self.reject_credentials {
            return Err(CmisError::Authentication("bad credentials".to_string()));
        }
        match repository_id {
            None | Some(REPOSITORY_ID) => Ok(self.info()),
            Some(other) => Err(CmisError::InvalidConfig(format!("no repository '{}'", other))),
        }
    }

    async fn get_type_definition(&self, _repository_id: &str, type_id: &str) -> Result<TypeDefinition> {
        self.record("get_type_definition");
        type_definition(type_id).ok_or_else(|| CmisError::ObjectNotFound(LookupKey::Id(type_id.to_string())))
    }

    async fn get_object(&self, _repository_id: &str, object_id: &ObjectId, _filter: Option<&str>) -> Result<CmisObject> {
        self.record("get_object");
        snapshot(&self.state.lock().unwrap(), object_id)
    }

    async fn get_object_by_path(&self, _repository_id: &str, path: &str, _filter: Option<&str>) -> Result<CmisObject> {
        self.record("get_object_by_path");
        let state = self.state.lock().unwrap();
        let mut current = ObjectId::from(ROOT_ID);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = children_of(&state, &current)
                .into_iter()
                .find(|c| state.nodes.get(c).is_some_and(|n| name_of(n) == segment))
                .ok_or_else(|| CmisError::ObjectNotFound(LookupKey::Path(path.to_string())))?;
        }
        snapshot(&state, &current)
    }

    async fn get_content_stream(&self, _repository_id: &str, object_id: &ObjectId) -> Result<ContentStream> {
        self.record("get_content_stream");
        let state = self.state.lock().unwrap();
        let node = state.nodes.get(object_id).ok_or_else(|| not_found(object_id))?;
        let (mime_type, data) = node
            .content
            .clone()
            .ok_or_else(|| CmisError::Constraint("no content".to_string()))?;
        Ok(ContentStream::from_bytes(name_of(node), mime_type, data))
    }

    async fn create_document(
        &self,
        _repository_id: &str,
        folder_id: &ObjectId,
        properties: &Properties,
        content: Option<ContentStream>,
        _versioning_state: VersioningState,
    ) -> Result<ObjectId> {
        self.record("create_document");
        let content = match content {
            Some(c) => {
                let mime_type = c.mime_type().to_string();
                Some((mime_type, c.into_bytes().await?))
            }
            None => None,
        };
        self.create(folder_id, "cmis:document", properties, content)
    }

    async fn create_folder(&self, _repository_id: &str, parent_id: &ObjectId, properties: &Properties) -> Result<ObjectId> {
        self.record("create_folder");
        self.create(parent_id, "cmis:folder", properties, None)
    }

    async fn create_relationship(&self, _repository_id: &str, properties: &Properties) -> Result<ObjectId> {
        self.record("create_relationship");
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = ObjectId::new(format!("rel-{:04}", state.next_id));
        let mut stored = properties.clone();
        stored.insert(property::OBJECT_ID.to_string(), PropertyValue::id(id.as_str()));
        stored.insert(property::BASE_TYPE_ID.to_string(), PropertyValue::id("cmis:relationship"));
        state.nodes.insert(
            id.clone(),
            Node {
                properties: stored,
                parent: None,
                content: None,
                acl: Acl::default(),
                policies: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn update_properties(
        &self,
        _repository_id: &str,
        object_id: &ObjectId,
        _change_token: Option<&str>,
        properties: &Properties,
    ) -> Result<ObjectId> {
        self.record("update_properties");
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.get_mut(object_id).ok_or_else(|| not_found(object_id))?;
        for (id, value) in properties {
            node.properties.insert(id.clone(), value.clone());
        }
        state.last_update = Some(properties.clone());
        push_change(&mut state, object_id, ChangeType::Updated);
        Ok(object_id.clone())
    }

    async fn move_object(
        &self,
        _repository_id: &str,
        object_id: &ObjectId,
        source_folder_id: &ObjectId,
        target_folder_id: &ObjectId,
    ) -> Result<ObjectId> {
        self.record("move_object");
        let mut state = self.state.lock().unwrap();
        if !state.nodes.contains_key(target_folder_id) {
            return Err(not_found(target_folder_id));
        }
        let node = state.nodes.get_mut(object_id).ok_or_else(|| not_found(object_id))?;
        if node.parent.as_ref() != Some(source_folder_id) {
            return Err(CmisError::InvalidArgument(format!("{} is not in {}", object_id, source_folder_id)));
        }
        node.parent = Some(target_folder_id.clone());
        Ok(object_id.clone())
    }

    async fn delete_object(&self, _repository_id: &str, object_id: &ObjectId, _all_versions: bool) -> Result<()> {
        self.record("delete_object");
        let mut state = self.state.lock().unwrap();
        if !children_of(&state, object_id).is_empty() {
            return Err(CmisError::Constraint(format!("folder {} is not empty", object_id)));
        }
        state.nodes.remove(object_id).ok_or_else(|| not_found(object_id))?;
        push_change(&mut state, object_id, ChangeType::Deleted);
        Ok(())
    }

    async fn delete_tree(
        &self,
        _repository_id: &str,
        folder_id: &ObjectId,
        _all_versions: bool,
        _unfile: UnfileObject,
        _continue_on_failure: bool,
    ) -> Result<Vec<ObjectId>> {
        self.record("delete_tree");
        let mut state = self.state.lock().unwrap();
        if !state.nodes.contains_key(folder_id) {
            return Err(not_found(folder_id));
        }
        Self::remove_subtree(&mut state, folder_id);
        Ok(Vec::new())
    }

    async fn get_children(&self, _repository_id: &str, folder_id: &ObjectId, options: &ListOptions) -> Result<Page<CmisObject>> {
        self.record("get_children");
        let state = self.state.lock().unwrap();
        if !state.nodes.contains_key(folder_id) {
            return Err(not_found(folder_id));
        }
        let mut all = children_of(&state, folder_id)
            .iter()
            .map(|c| snapshot(&state, c))
            .collect::<Result<Vec<_>>>()?;
        if options
            .order_by
            .as_deref()
            .is_some_and(|o| o.to_ascii_uppercase().contains("DESC"))
        {
            all.reverse();
        }

        let total = all.len() as u64;
        let start = options.skip_count as usize;
        let items: Vec<CmisObject> = all
            .into_iter()
            .skip(start)
            .take(options.max_items as usize)
            .collect();
        Ok(Page {
            has_more: (start + items.len()) < total as usize,
            total: Some(total),
            items,
        })
    }

    async fn get_descendants(&self, _repository_id: &str, folder_id: &ObjectId, depth: u32, _filter: Option<&str>) -> Result<Vec<ObjectTree>> {
        self.record("get_descendants");
        tree(&self.state.lock().unwrap(), folder_id, depth, false)
    }

    async fn get_folder_tree(&self, _repository_id: &str, folder_id: &ObjectId, depth: u32, _filter: Option<&str>) -> Result<Vec<ObjectTree>> {
        self.record("get_folder_tree");
        tree(&self.state.lock().unwrap(), folder_id, depth, true)
    }

    async fn get_folder_parent(&self, _repository_id: &str, folder_id: &ObjectId) -> Result<CmisObject> {
        self.record("get_folder_parent");
        let state = self.state.lock().unwrap();
        let node = state.nodes.get(folder_id).ok_or_else(|| not_found(folder_id))?;
        match &node.parent {
            Some(parent) => snapshot(&state, parent),
            None => Err(CmisError::NoParent(folder_id.clone())),
        }
    }

    async fn get_object_parents(&self, _repository_id: &str, object_id: &ObjectId, _filter: Option<&str>) -> Result<Vec<CmisObject>> {
        self.record("get_object_parents");
        let state = self.state.lock().unwrap();
        let node = state.nodes.get(object_id).ok_or_else(|| not_found(object_id))?;
        node.parent
            .iter()
            .map(|p| snapshot(&state, p))
            .collect()
    }

    async fn get_checked_out_docs(&self, _repository_id: &str, _options: &ListOptions) -> Result<Page<CmisObject>> {
        self.record("get_checked_out_docs");
        let state = self.state.lock().unwrap();
        let items = state
            .nodes
            .iter()
            .filter(|(_, n)| {
                n.properties
                    .get(property::IS_PRIVATE_WORKING_COPY)
                    .and_then(PropertyValue::first_bool)
                    .unwrap_or(false)
            })
            .map(|(id, _)| snapshot(&state, id))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::last(items))
    }

    async fn query(
        &self,
        _repository_id: &str,
        statement: &str,
        _search_all_versions: bool,
        options: &ListOptions,
    ) -> Result<Page<QueryResult>> {
        self.record("query");
        if !statement.to_ascii_uppercase().starts_with("SELECT") {
            return Err(CmisError::InvalidArgument(format!("syntax error in '{}'", statement)));
        }
        let state = self.state.lock().unwrap();
        let rows: Vec<QueryResult> = state
            .nodes
            .values()
            .filter(|n| !is_folder(n))
            .map(|n| QueryResult {
                properties: n.properties.clone(),
            })
            .collect();
        let total = rows.len();
        let start = options.skip_count as usize;
        let items: Vec<QueryResult> = rows.into_iter().skip(start).take(options.max_items as usize).collect();
        Ok(Page {
            has_more: start + items.len() < total,
            total: Some(total as u64),
            items,
        })
    }

    /// Tokens are inclusive: reading from token `n` returns event `n` again.
    async fn get_content_changes(
        &self,
        _repository_id: &str,
        change_token: Option<&str>,
        _include_properties: bool,
        max_items: u32,
    ) -> Result<ChangeEventsPage> {
        self.record("get_content_changes");
        let state = self.state.lock().unwrap();
        let start = change_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + max_items as usize).min(state.changes.len());
        let events: Vec<ChangeEvent> = state.changes.get(start..end).unwrap_or_default().to_vec();
        Ok(ChangeEventsPage {
            latest_change_token: if events.is_empty() {
                change_token.map(str::to_string)
            } else {
                Some((end - 1).to_string())
            },
            has_more: end < state.changes.len(),
            events,
        })
    }

    async fn check_out(&self, _repository_id: &str, object_id: &ObjectId) -> Result<ObjectId> {
        self.record("check_out");
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.get_mut(object_id).ok_or_else(|| not_found(object_id))?;
        node.properties
            .insert(property::IS_PRIVATE_WORKING_COPY.to_string(), PropertyValue::boolean(true));
        Ok(object_id.clone())
    }

    async fn cancel_check_out(&self, _repository_id: &str, object_id: &ObjectId) -> Result<()> {
        self.record("cancel_check_out");
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.get_mut(object_id).ok_or_else(|| not_found(object_id))?;
        node.properties.remove(property::IS_PRIVATE_WORKING_COPY);
        Ok(())
    }

    async fn check_in(
        &self,
        _repository_id: &str,
        object_id: &ObjectId,
        _major: bool,
        properties: &Properties,
        content: Option<ContentStream>,
        _comment: Option<&str>,
    ) -> Result<ObjectId> {
        self.record("check_in");
        let content = match content {
            Some(c) => {
                let mime_type = c.mime_type().to_string();
                Some((mime_type, c.into_bytes().await?))
            }
            None => None,
        };
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.get_mut(object_id).ok_or_else(|| not_found(object_id))?;
        node.properties.remove(property::IS_PRIVATE_WORKING_COPY);
        node.properties.extend(properties.clone());
        if content.is_some() {
            node.content = content;
        }
        Ok(object_id.clone())
    }

    async fn get_all_versions(
        &self,
        _repository_id: &str,
        object_id: &ObjectId,
        _version_series_id: &str,
        _filter: Option<&str>,
    ) -> Result<Vec<CmisObject>> {
        self.record("get_all_versions");
        Ok(vec![snapshot(&self.state.lock().unwrap(), object_id)?])
    }

    async fn get_object_relationships(&self, _repository_id: &str, object_id: &ObjectId) -> Result<Vec<CmisObject>> {
        self.record("get_object_relationships");
        let state = self.state.lock().unwrap();
        state
            .nodes
            .iter()
            .filter(|(_, n)| {
                [property::SOURCE_ID, property::TARGET_ID].iter().any(|p| {
                    n.properties.get(*p).and_then(PropertyValue::first_str) == Some(object_id.as_str())
                })
            })
            .map(|(_, n)| CmisObject::from_properties(n.properties.clone(), BTreeSet::new()))
            .collect()
    }

    async fn get_acl(&self, _repository_id: &str, object_id: &ObjectId) -> Result<Acl> {
        self.record("get_acl");
        let state = self.state.lock().unwrap();
        Ok(state.nodes.get(object_id).ok_or_else(|| not_found(object_id))?.acl.clone())
    }

    async fn apply_acl(
        &self,
        _repository_id: &str,
        object_id: &ObjectId,
        add: &[Ace],
        remove: &[Ace],
        _propagation: AclPropagation,
    ) -> Result<Acl> {
        self.record("apply_acl");
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.get_mut(object_id).ok_or_else(|| not_found(object_id))?;
        node.acl = node.acl.merged(add, remove);
        Ok(node.acl.clone())
    }

    async fn get_applied_policies(&self, _repository_id: &str, object_id: &ObjectId) -> Result<Vec<CmisObject>> {
        self.record("get_applied_policies");
        let state = self.state.lock().unwrap();
        let node = state.nodes.get(object_id).ok_or_else(|| not_found(object_id))?;
        node.policies.iter().map(|p| snapshot(&state, p)).collect()
    }

    async fn apply_policy(&self, _repository_id: &str, policy_id: &ObjectId, object_id: &ObjectId) -> Result<()> {
        self.record("apply_policy");
        let mut state = self.state.lock().unwrap();
        if !state.nodes.contains_key(policy_id) {
            return Err(not_found(policy_id));
        }
        let node = state.nodes.get_mut(object_id).ok_or_else(|| not_found(object_id))?;
        node.policies.push(policy_id.clone());
        Ok(())
    }
}

/// A client already connected to a fresh `MemoryBinding`, paging two items at a time.
pub(crate) async fn connected(binding: MemoryBinding) -> (CmisClient, Arc<MemoryBinding>) {
    let binding = Arc::new(binding);
    let config = ConnectionConfig::new(
        "http://repo.test/cmis/atom",
        Credentials::basic("admin", "admin"),
    )
    .with_page_size(2);
    let client = CmisClient::with_factory(config, MemoryFactory::shared(&binding));
    client.connect().await.unwrap();
    (client, binding)
}
