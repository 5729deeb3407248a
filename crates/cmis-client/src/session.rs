//! Connection lifecycle: one authenticated session per manager.
//!
//! `connect` is idempotent and safe to call concurrently: callers that race
//! on a fresh manager serialize on `connect_lock`, and only the first one
//! performs the handshake. Everyone else gets the session it stored.

use std::collections::BTreeMap;
use std::sync::Arc;

use cmis_core::{
    Binding, BindingKind, ChangeEvent, CmisError, ListOptions, Properties, RepositoryInfo,
    Result, TypeDefinition,
};
use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, info, instrument};

use crate::atom::AtomPubBinding;
use crate::cache::ObjectCache;
use crate::config::ConnectionConfig;
use crate::soap::SoapBinding;

/// Change tokens whose boundary event a session keeps at once.
const CHANGE_BOUNDARY_LIMIT: usize = 16;

/// Builds the binding for a configuration.
///
/// Creating a binding must not touch the network; the first request is
/// the repository-info fetch that `connect` issues.
pub trait BindingFactory: Send + Sync {
    fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn Binding>>;
}

/// Picks AtomPub or SOAP from `ConnectionConfig::binding`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBindingFactory;

impl BindingFactory for DefaultBindingFactory {
    fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn Binding>> {
        let binding: Arc<dyn Binding> = match config.binding {
            BindingKind::Atom => Arc::new(AtomPubBinding::new(config)?),
            BindingKind::Soap => Arc::new(SoapBinding::new(config)?),
        };
        Ok(binding)
    }
}

/// A live connection to one repository. Immutable once created apart from
/// its internal caches.
pub struct Session {
    config: ConnectionConfig,
    binding: Arc<dyn Binding>,
    repository: RepositoryInfo,
    cache: ObjectCache,
    types: DashMap<String, Arc<TypeDefinition>>,
    /// Last event handed out for each change token this session issued.
    change_boundaries: DashMap<String, ChangeEvent>,
}

impl Session {
    pub fn new(config: ConnectionConfig, binding: Arc<dyn Binding>, repository: RepositoryInfo) -> Self {
        Self {
            config,
            binding,
            repository,
            cache: ObjectCache::new(),
            types: DashMap::new(),
            change_boundaries: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn binding(&self) -> &Arc<dyn Binding> {
        &self.binding
    }

    pub fn repository_info(&self) -> &RepositoryInfo {
        &self.repository
    }

    pub fn repository_id(&self) -> &str {
        &self.repository.id
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub(crate) fn change_boundary(&self, token: &str) -> Option<ChangeEvent> {
        self.change_boundaries.get(token).map(|e| e.value().clone())
    }

    pub(crate) fn remember_change_boundary(&self, token: &str, event: ChangeEvent) {
        if !self.change_boundaries.contains_key(token)
            && self.change_boundaries.len() >= CHANGE_BOUNDARY_LIMIT
        {
            debug!("Forgetting {} change boundaries", self.change_boundaries.len());
            self.change_boundaries.clear();
        }
        self.change_boundaries.insert(token.to_string(), event);
    }

    /// Listing options for the first page at the configured page size.
    pub fn list_options(&self, filter: Option<&str>, order_by: Option<&str>) -> ListOptions {
        ListOptions::new(self.config.page_size)
            .with_filter(filter.map(str::to_string))
            .with_order_by(order_by.map(str::to_string))
    }

    /// Type definition, fetched once per session.
    #[instrument(skip(self), level = "debug")]
    pub async fn type_definition(&self, type_id: &str) -> Result<Arc<TypeDefinition>> {
        if let Some(definition) = self.types.get(type_id).map(|t| Arc::clone(t.value())) {
            return Ok(definition);
        }

        let definition = Arc::new(
            self.binding
                .get_type_definition(self.repository_id(), type_id)
                .await?,
        );
        debug!(
            "Loaded type {} with {} property definitions",
            type_id,
            definition.property_definitions.len()
        );
        self.types.insert(type_id.to_string(), Arc::clone(&definition));
        Ok(definition)
    }

    /// Convert caller supplied string values into typed properties.
    ///
    /// Each property must be defined by one of `type_ids`; its definition
    /// decides how the string is parsed. No type is fetched for an empty map.
    pub async fn coerce(&self, type_ids: &[&str], raw: &BTreeMap<String, String>) -> Result<Properties> {
        let mut properties = Properties::new();
        if raw.is_empty() {
            return Ok(properties);
        }

        let mut definitions = Vec::with_capacity(type_ids.len());
        for type_id in type_ids {
            definitions.push(self.type_definition(type_id).await?);
        }

        for (id, value) in raw {
            let definition = definitions
                .iter()
                .find_map(|t| t.property_definition(id))
                .ok_or_else(|| {
                    CmisError::InvalidArgument(format!(
                        "property '{}' is not defined by {}",
                        id,
                        type_ids.join(", ")
                    ))
                })?;
            properties.insert(id.clone(), definition.coerce(value)?);
        }
        Ok(properties)
    }
}

/// Owns at most one `Session` and serializes its creation and teardown.
pub struct SessionManager {
    config: ConnectionConfig,
    factory: Arc<dyn BindingFactory>,
    /// Current session (read-heavy, write-rare).
    session: RwLock<Option<Arc<Session>>>,
    /// Serializes connect/disconnect so only one handshake runs at a time.
    connect_lock: AsyncMutex<()>,
}

impl SessionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_factory(config, Arc::new(DefaultBindingFactory))
    }

    pub fn with_factory(config: ConnectionConfig, factory: Arc<dyn BindingFactory>) -> Self {
        Self {
            config,
            factory,
            session: RwLock::new(None),
            connect_lock: AsyncMutex::new(()),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// `username@endpoint`
    pub fn connection_identifier(&self) -> String {
        self.config.connection_identifier()
    }

    /// Open the session, or return the one already open.
    ///
    /// Configuration is validated before any request. A fresh connect makes
    /// exactly one repository-info round-trip so that rejected credentials
    /// fail here rather than on the first real operation.
    pub async fn connect(&self) -> Result<Arc<Session>> {
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(session) = self.session.read().await.clone() {
            debug!("Connect raced with another caller; reusing its session");
            return Ok(session);
        }

        self.config.validate()?;
        info!(
            "Connecting to {} using {:?} binding",
            self.connection_identifier(),
            self.config.binding
        );

        let binding = self.factory.create(&self.config)?;
        let repository = binding
            .get_repository_info(self.config.repository_id.as_deref())
            .await?;
        info!(
            "Connected to repository {} ({}), root folder {}",
            repository.id, repository.name, repository.root_folder_id
        );

        let session = Arc::new(Session::new(self.config.clone(), binding, repository));
        *self.session.write().await = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Drop the session. Safe to call when not connected.
    pub async fn disconnect(&self) {
        let _guard = self.connect_lock.lock().await;
        if self.session.write().await.take().is_some() {
            info!("Disconnected from {}", self.connection_identifier());
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// The open session, or `NotConnected`.
    pub async fn session(&self) -> Result<Arc<Session>> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(CmisError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::testing::{MemoryBinding, MemoryFactory};

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("http://repo.test/cmis/atom", Credentials::basic("admin", "admin"))
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let binding = Arc::new(MemoryBinding::new());
        let manager = SessionManager::with_factory(config(), MemoryFactory::shared(&binding));

        let first = manager.connect().await.unwrap();
        let second = manager.connect().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(binding.calls("get_repository_info"), 1);
        assert_eq!(binding.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_connects_collapse_into_one_handshake() {
        let binding = Arc::new(MemoryBinding::new());
        let manager = Arc::new(SessionManager::with_factory(
            config(),
            MemoryFactory::shared(&binding),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.connect().await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(binding.calls("get_repository_info"), 1);
    }

    #[tokio::test]
    async fn test_change_boundaries_stay_bounded() {
        let binding = Arc::new(MemoryBinding::new());
        let manager = SessionManager::with_factory(config(), MemoryFactory::shared(&binding));
        let session = manager.connect().await.unwrap();
        let event = |id: &str| ChangeEvent {
            object_id: id.into(),
            change_type: cmis_core::ChangeType::Updated,
            change_time: None,
            properties: Properties::new(),
        };

        for n in 0..CHANGE_BOUNDARY_LIMIT * 3 {
            session.remember_change_boundary(&n.to_string(), event(&format!("doc-{}", n)));
            assert!(session.change_boundaries.len() <= CHANGE_BOUNDARY_LIMIT);
        }
        let last = CHANGE_BOUNDARY_LIMIT * 3 - 1;
        let kept = session.change_boundary(&last.to_string()).unwrap();
        assert_eq!(kept.object_id.as_str(), format!("doc-{}", last));

        // Re-recording a known token never evicts its neighbours
        let len = session.change_boundaries.len();
        session.remember_change_boundary(&last.to_string(), event("doc-again"));
        assert_eq!(session.change_boundaries.len(), len);
    }

    #[tokio::test]
    async fn test_blank_password_makes_no_calls() {
        let binding = Arc::new(MemoryBinding::new());
        let factory = MemoryFactory::shared(&binding);
        let mut config = config();
        config.credentials = Credentials::basic("admin", "  ");
        let manager = SessionManager::with_factory(config, factory.clone());

        let result = manager.connect().await;
        assert!(matches!(result, Err(CmisError::InvalidConfig(_))));
        assert_eq!(binding.total_calls(), 0);
        assert_eq!(factory.created(), 0);
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_connect() {
        let binding = Arc::new(MemoryBinding::new().rejecting_credentials());
        let manager = SessionManager::with_factory(config(), MemoryFactory::shared(&binding));

        assert!(matches!(manager.connect().await, Err(CmisError::Authentication(_))));
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_disconnect_is_safe_and_resets() {
        let binding = Arc::new(MemoryBinding::new());
        let manager = SessionManager::with_factory(config(), MemoryFactory::shared(&binding));

        manager.disconnect().await;
        assert!(matches!(manager.session().await, Err(CmisError::NotConnected)));

        manager.connect().await.unwrap();
        assert!(manager.is_connected().await);
        manager.disconnect().await;
        assert!(!manager.is_connected().await);

        manager.connect().await.unwrap();
        assert_eq!(binding.calls("get_repository_info"), 2);
    }

    #[tokio::test]
    async fn test_unknown_repository_id_is_rejected() {
        let binding = Arc::new(MemoryBinding::new());
        let manager = SessionManager::with_factory(
            config().with_repository_id("elsewhere"),
            MemoryFactory::shared(&binding),
        );
        assert!(matches!(manager.connect().await, Err(CmisError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_type_definitions_are_cached() {
        let binding = Arc::new(MemoryBinding::new());
        let manager = SessionManager::with_factory(config(), MemoryFactory::shared(&binding));
        let session = manager.connect().await.unwrap();

        session.type_definition("cmis:document").await.unwrap();
        session.type_definition("cmis:document").await.unwrap();
        assert_eq!(binding.calls("get_type_definition"), 1);
    }

    #[tokio::test]
    async fn test_coerce_rejects_undefined_property() {
        let binding = Arc::new(MemoryBinding::new());
        let manager = SessionManager::with_factory(config(), MemoryFactory::shared(&binding));
        let session = manager.connect().await.unwrap();

        let mut raw = BTreeMap::new();
        raw.insert("cm:nope".to_string(), "x".to_string());
        assert!(matches!(
            session.coerce(&["cmis:document"], &raw).await,
            Err(CmisError::InvalidArgument(_))
        ));

        assert!(session.coerce(&["cmis:document"], &BTreeMap::new()).await.unwrap().is_empty());
    }
}
