//! Folder navigation, checked-out listing and query.

use std::sync::Arc;

use cmis_core::{
    validate_order_by, Binding, CmisError, CmisObject, ListOptions, NavigationOption, ObjectRef,
    ObjectTree, Page, QueryResult, Result,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, instrument};

use crate::client::CmisClient;
use crate::paging::Pager;
use crate::session::Session;

/// Result of `navigate`, shaped by the requested option.
#[derive(Debug)]
pub enum Navigation {
    /// The folder's parent.
    Parent(Arc<CmisObject>),
    /// Immediate children, fetched lazily.
    Children(Pager<CmisObject>),
    /// Every descendant down to the requested depth, parents before children.
    Descendants(Vec<CmisObject>),
    /// Folder hierarchy down to the requested depth.
    Tree(Vec<ObjectTree>),
}

fn check_depth(depth: Option<i32>) -> Result<u32> {
    match depth {
        Some(d) if d >= 1 => Ok(d as u32),
        Some(d) => Err(CmisError::InvalidArgument(format!("depth must be at least 1, got {}", d))),
        None => Err(CmisError::InvalidArgument("depth is required".to_string())),
    }
}

fn check_order_by(order_by: Option<&str>) -> Result<()> {
    match order_by {
        Some(clause) => validate_order_by(clause),
        None => Ok(()),
    }
}

/// Build a pager whose pages come from `fetch(binding, repository_id, options)`.
fn pager<T, F>(session: &Session, options: ListOptions, fetch: F) -> Pager<T>
where
    T: Send + 'static,
    F: Fn(Arc<dyn Binding>, String, ListOptions) -> BoxFuture<'static, Result<Page<T>>>
        + Send
        + Sync
        + 'static,
{
    let binding = Arc::clone(session.binding());
    let repository_id = session.repository_id().to_string();
    Pager::new(options, move |options| {
        fetch(Arc::clone(&binding), repository_id.clone(), options)
    })
}

/// Whether a query already orders its results. Words inside string
/// literals do not count and any whitespace may separate `ORDER` and `BY`.
fn has_order_by(statement: &str) -> bool {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quoted = false;
    let mut chars = statement.chars();
    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '\\' => {
                    chars.next();
                }
                '\'' => quoted = false,
                _ => {}
            }
            continue;
        }
        if c.is_alphanumeric() || matches!(c, '_' | ':' | '.') {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            words.push(std::mem::take(&mut word));
        }
        if c == '\'' {
            quoted = true;
            words.push(String::from("'"));
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
        .windows(2)
        .any(|pair| pair[0].eq_ignore_ascii_case("ORDER") && pair[1].eq_ignore_ascii_case("BY"))
}

/// Append `ORDER BY` to a statement that has none.
fn ordered_statement(statement: &str, order_by: Option<&str>) -> String {
    match order_by {
        Some(clause) if !has_order_by(statement) => {
            format!("{} ORDER BY {}", statement.trim_end(), clause)
        }
        _ => statement.to_string(),
    }
}

impl CmisClient {
    /// Navigate from a folder.
    ///
    /// Depth and ordering are checked before any request. `Descendants` and
    /// `Tree` need a depth of at least 1; the root folder has no parent.
    #[instrument(skip(self), level = "debug", fields(folder = %folder.id()))]
    pub async fn navigate(
        &self,
        folder: &ObjectRef,
        option: NavigationOption,
        depth: Option<i32>,
        filter: Option<&str>,
        order_by: Option<&str>,
    ) -> Result<Navigation> {
        let depth = match option {
            NavigationOption::Descendants | NavigationOption::Tree => Some(check_depth(depth)?),
            NavigationOption::Parent | NavigationOption::Children => None,
        };
        check_order_by(order_by)?;
        if let Some(snapshot) = folder.snapshot() {
            if !snapshot.is_folder() {
                return Err(CmisError::InvalidArgument(format!("{} is not a folder", snapshot.id())));
            }
        }

        let session = self.session().await?;
        let folder_id = folder.id().clone();
        let binding = session.binding();
        let repository_id = session.repository_id();

        match (option, depth) {
            (NavigationOption::Parent, _) => {
                if folder_id == session.repository_info().root_folder_id {
                    return Err(CmisError::NoParent(folder_id));
                }
                let parent = binding.get_folder_parent(repository_id, &folder_id).await?;
                Ok(Navigation::Parent(session.cache().insert(parent)))
            }
            (NavigationOption::Children, _) => {
                let options = session.list_options(filter, order_by);
                Ok(Navigation::Children(pager(&session, options, move |binding, repository_id, options| {
                    let folder_id = folder_id.clone();
                    async move { binding.get_children(&repository_id, &folder_id, &options).await }.boxed()
                })))
            }
            (NavigationOption::Descendants, Some(depth)) => {
                let trees = binding
                    .get_descendants(repository_id, &folder_id, depth, filter)
                    .await?;
                let flat = ObjectTree::flatten(trees);
                debug!("{} descendants of {} to depth {}", flat.len(), folder_id, depth);
                Ok(Navigation::Descendants(flat))
            }
            (NavigationOption::Tree, Some(depth)) => Ok(Navigation::Tree(
                binding
                    .get_folder_tree(repository_id, &folder_id, depth, filter)
                    .await?,
            )),
            (_, None) => Err(CmisError::InvalidArgument("depth is required".to_string())),
        }
    }

    /// Folders the object is filed in. Empty for the root folder.
    pub async fn get_parent_folders(&self, object: &ObjectRef, filter: Option<&str>) -> Result<Vec<CmisObject>> {
        let session = self.session().await?;
        if *object.id() == session.repository_info().root_folder_id {
            return Ok(Vec::new());
        }
        session
            .binding()
            .get_object_parents(session.repository_id(), object.id(), filter)
            .await
    }

    /// Private working copies visible to the current user.
    pub async fn get_checkout_docs(&self, filter: Option<&str>, order_by: Option<&str>) -> Result<Pager<CmisObject>> {
        check_order_by(order_by)?;
        let session = self.session().await?;
        let options = session.list_options(filter, order_by);
        Ok(pager(&session, options, |binding, repository_id, options| {
            async move { binding.get_checked_out_docs(&repository_id, &options).await }.boxed()
        }))
    }

    /// Run a query. The statement is passed through unparsed; repository
    /// syntax errors come back unchanged when the first page is fetched.
    #[instrument(skip(self), level = "debug")]
    pub async fn query(
        &self,
        statement: &str,
        search_all_versions: bool,
        filter: Option<&str>,
        order_by: Option<&str>,
    ) -> Result<Pager<QueryResult>> {
        if statement.trim().is_empty() {
            return Err(CmisError::InvalidArgument("query statement is empty".to_string()));
        }
        check_order_by(order_by)?;
        let session = self.session().await?;
        let statement = ordered_statement(statement, order_by);
        let options = session.list_options(filter, None);
        Ok(pager(&session, options, move |binding, repository_id, options| {
            let statement = statement.clone();
            async move {
                binding
                    .query(&repository_id, &statement, search_all_versions, &options)
                    .await
            }
            .boxed()
        }))
    }
}
