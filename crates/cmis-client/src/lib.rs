//! CMIS client: sessions, AtomPub and SOAP bindings, object cache, paging
//! and change log reading on top of the `cmis-core` abstractions.
//!
//! ```no_run
//! use cmis_client::{CmisClient, ConnectionConfig, Credentials};
//!
//! # async fn demo() -> cmis_client::Result<()> {
//! let client = CmisClient::new(ConnectionConfig::new(
//!     "http://localhost:8080/alfresco/api/-default-/public/cmis/versions/1.1/atom",
//!     Credentials::basic("admin", "admin"),
//! ));
//! client.connect().await?;
//! let folder = client.get_or_create_folder_by_path("/Sites/reports").await?;
//! println!("{}", folder.id());
//! # Ok(())
//! # }
//! ```

pub mod atom;
pub mod cache;
pub mod changelog;
pub mod client;
mod codec;
pub mod config;
mod http;
pub mod navigation;
pub mod objects;
pub mod paging;
pub mod session;
pub mod soap;

#[cfg(test)]
mod testing;

pub use atom::AtomPubBinding;
pub use cache::ObjectCache;
pub use changelog::{ChangeLogReader, ReaderState};
pub use client::CmisClient;
pub use config::{ConnectionConfig, ConnectionSummary, Credentials};
pub use navigation::Navigation;
pub use objects::NewDocument;
pub use paging::Pager;
pub use session::{BindingFactory, DefaultBindingFactory, Session, SessionManager};
pub use soap::SoapBinding;

pub use cmis_core;
pub use cmis_core::{CmisError, Result};
