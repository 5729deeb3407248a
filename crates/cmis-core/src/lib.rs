//! Core traits and types for the CMIS client.
//!
//! This crate defines the abstractions shared by both wire bindings and the
//! session/navigation layers built on top of them:
//! - `Binding`: one method per logical CMIS operation (AtomPub and SOAP implement it)
//! - `CmisObject` / `ObjectId` / `ObjectRef`: immutable object snapshots and handles
//! - `RepositoryInfo`, `TypeDefinition`, `Acl`, `ChangeEvent`, `ContentStream`
//! - `CmisError`: the error taxonomy every operation reports through

mod acl;
mod binding;
mod changes;
mod content;
mod error;
mod object;
mod paging;
mod repository;
mod types;

pub use acl::{Ace, Acl, AclPropagation};
pub use binding::{Binding, BindingKind, UnfileObject, VersioningState};
pub use changes::{ChangeEvent, ChangeEventsPage, ChangeType};
pub use content::{ByteStream, ContentStream};
pub use error::{CmisError, LookupKey, Result};
pub use object::{
    property, BaseType, CmisObject, ObjectId, ObjectRef, Properties, PropertyValue, QueryResult,
};
pub use paging::{validate_order_by, ListOptions, NavigationOption, ObjectTree, Page};
pub use repository::{
    Capabilities, CapabilityAcl, CapabilityChanges, CapabilityQuery, ContentStreamUpdates,
    RepositoryInfo, RepositorySummary,
};
pub use types::{Cardinality, PropertyDefinition, PropertyType, TypeDefinition, Updatability};
