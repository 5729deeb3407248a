//! `CmisClient`: the operation surface over one managed session.
//!
//! Operations are split by concern:
//! - `objects.rs`: lookup, create, update, delete, versioning, ACL, policies
//! - `navigation.rs`: folder navigation, checked-out listing, query
//! - `changelog.rs`: change log reads

use std::sync::Arc;

use cmis_core::{CmisObject, ObjectRef, Result};

use crate::config::ConnectionConfig;
use crate::session::{BindingFactory, Session, SessionManager};

/// Client for one repository connection.
///
/// Cheap to share behind an `Arc`; every operation takes `&self` and runs
/// against the current session without a client-wide lock.
pub struct CmisClient {
    sessions: SessionManager,
}

impl CmisClient {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            sessions: SessionManager::new(config),
        }
    }

    /// Build a client whose bindings come from `factory`.
    pub fn with_factory(config: ConnectionConfig, factory: Arc<dyn BindingFactory>) -> Self {
        Self {
            sessions: SessionManager::with_factory(config, factory),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        self.sessions.config()
    }

    pub async fn connect(&self) -> Result<Arc<Session>> {
        self.sessions.connect().await
    }

    pub async fn disconnect(&self) {
        self.sessions.disconnect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.sessions.is_connected().await
    }

    pub fn connection_identifier(&self) -> String {
        self.sessions.connection_identifier()
    }

    /// The open session, or `NotConnected`.
    pub(crate) async fn session(&self) -> Result<Arc<Session>> {
        self.sessions.session().await
    }

    /// Turn a reference into a snapshot, fetching it only when given by id.
    pub(crate) async fn resolve(&self, object: &ObjectRef) -> Result<Arc<CmisObject>> {
        match object {
            ObjectRef::ByValue(snapshot) => Ok(Arc::clone(snapshot)),
            ObjectRef::ById(id) => self.get_object_by_id(id, None).await,
        }
    }
}
