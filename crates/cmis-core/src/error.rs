use std::fmt;

use serde::Serialize;

use crate::object::ObjectId;

/// Which key an object lookup was performed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum LookupKey {
    Id(String),
    Path(String),
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Id(id) => write!(f, "id '{}'", id),
            LookupKey::Path(path) => write!(f, "path '{}'", path),
        }
    }
}

/// Errors reported by every CMIS operation.
///
/// Local validation failures (`InvalidConfig`, `InvalidArgument`) are raised
/// before any request is sent. `Connectivity` is the only transport-level
/// variant; everything else is a logical failure reported by the repository.
#[derive(Debug, thiserror::Error)]
pub enum CmisError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Object not found by {0}")]
    ObjectNotFound(LookupKey),

    #[error("Object {0} has no parent folder")]
    NoParent(ObjectId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Repository does not support {0}")]
    UnsupportedCapability(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Not connected to a repository")]
    NotConnected,

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Malformed response: {0}")]
    Protocol(String),
}

impl CmisError {
    /// Whether the failure happened in the transport rather than in the repository.
    ///
    /// Only transport failures are candidates for a caller-side retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, CmisError::Connectivity(_))
    }

    /// Map a CMIS exception name (SOAP `cmisFault/type`, or the exception marker
    /// servers embed in AtomPub error bodies) onto the taxonomy.
    ///
    /// `key` is used for `objectNotFound`; without it the repository message is kept.
    pub fn from_fault(fault_type: &str, message: impl Into<String>, key: Option<LookupKey>) -> Self {
        let message = message.into();
        match fault_type {
            "objectNotFound" => match key {
                Some(key) => CmisError::ObjectNotFound(key),
                None => CmisError::Repository(message),
            },
            "permissionDenied" => CmisError::PermissionDenied(message),
            "updateConflict" | "versioning" => CmisError::ConcurrentModification(message),
            "notSupported" => CmisError::UnsupportedCapability(message),
            "invalidArgument" | "filterNotValid" => CmisError::InvalidArgument(message),
            "constraint" | "contentAlreadyExists" | "nameConstraintViolation"
            | "streamNotSupported" => CmisError::Constraint(message),
            "unauthorized" => CmisError::Authentication(message),
            _ => CmisError::Repository(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, CmisError>;
