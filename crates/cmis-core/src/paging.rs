use serde::{Deserialize, Serialize};

use crate::error::{CmisError, Result};
use crate::object::CmisObject;

/// Per-request listing options. `skip_count` carries the paging position,
/// so every page request is independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub max_items: u32,
    pub skip_count: u64,
}

impl ListOptions {
    pub fn new(max_items: u32) -> Self {
        Self {
            filter: None,
            order_by: None,
            max_items,
            skip_count: 0,
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_order_by(mut self, order_by: Option<String>) -> Self {
        self.order_by = order_by;
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: false,
            total: None,
        }
    }
}

/// A node of a folder tree or descendants listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectTree {
    pub object: CmisObject,
    pub children: Vec<ObjectTree>,
}

impl ObjectTree {
    pub fn leaf(object: CmisObject) -> Self {
        Self {
            object,
            children: Vec::new(),
        }
    }

    /// Depth-first, parent before children.
    pub fn flatten(trees: Vec<ObjectTree>) -> Vec<CmisObject> {
        let mut out = Vec::new();
        let mut stack: Vec<ObjectTree> = trees.into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children.into_iter().rev());
            out.push(node.object);
        }
        out
    }
}

/// What `navigate` returns for a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationOption {
    Parent,
    Children,
    Descendants,
    Tree,
}

impl NavigationOption {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "parent" => Ok(Self::Parent),
            "children" => Ok(Self::Children),
            "descendants" => Ok(Self::Descendants),
            "tree" => Ok(Self::Tree),
            other => Err(CmisError::InvalidArgument(format!(
                "unknown navigation option '{}'",
                other
            ))),
        }
    }
}

/// Check an `orderBy` clause: comma separated `<property> [ASC|DESC]` terms.
///
/// Ordering itself is done by the repository; this only rejects malformed
/// clauses before a request is made.
pub fn validate_order_by(order_by: &str) -> Result<()> {
    for term in order_by.split(',') {
        let mut words = term.split_whitespace();
        let property = words.next().ok_or_else(|| {
            CmisError::InvalidArgument(format!("empty term in orderBy '{}'", order_by))
        })?;
        if property.eq_ignore_ascii_case("ASC") || property.eq_ignore_ascii_case("DESC") {
            return Err(CmisError::InvalidArgument(format!(
                "orderBy term '{}' has no property",
                term.trim()
            )));
        }
        if let Some(direction) = words.next() {
            if !direction.eq_ignore_ascii_case("ASC") && !direction.eq_ignore_ascii_case("DESC") {
                return Err(CmisError::InvalidArgument(format!(
                    "orderBy direction must be ASC or DESC, got '{}'",
                    direction
                )));
            }
        }
        if words.next().is_some() {
            return Err(CmisError::InvalidArgument(format!(
                "unexpected tokens in orderBy term '{}'",
                term.trim()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{property, Properties, PropertyValue};
    use std::collections::BTreeSet;

    fn folder(id: &str) -> CmisObject {
        let mut props = Properties::new();
        props.insert(property::OBJECT_ID.to_string(), PropertyValue::id(id));
        props.insert(property::BASE_TYPE_ID.to_string(), PropertyValue::id("cmis:folder"));
        CmisObject::from_properties(props, BTreeSet::new()).unwrap()
    }

    #[test]
    fn test_flatten_is_depth_first() {
        let trees = vec![
            ObjectTree {
                object: folder("a"),
                children: vec![
                    ObjectTree::leaf(folder("a1")),
                    ObjectTree {
                        object: folder("a2"),
                        children: vec![ObjectTree::leaf(folder("a2x"))],
                    },
                ],
            },
            ObjectTree::leaf(folder("b")),
        ];

        let ids: Vec<String> = ObjectTree::flatten(trees)
            .iter()
            .map(|o| o.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "a1", "a2", "a2x", "b"]);
    }

    #[test]
    fn test_validate_order_by() {
        assert!(validate_order_by("cmis:name").is_ok());
        assert!(validate_order_by("cmis:name ASC,cmis:creationDate desc").is_ok());
        assert!(validate_order_by("cmis:name UP").is_err());
        assert!(validate_order_by("cmis:name,").is_err());
        assert!(validate_order_by("DESC").is_err());
        assert!(validate_order_by("cmis:name ASC extra").is_err());
    }

    #[test]
    fn test_navigation_option_parse() {
        assert_eq!(NavigationOption::parse("TREE").unwrap(), NavigationOption::Tree);
        assert!(matches!(
            NavigationOption::parse("siblings"),
            Err(CmisError::InvalidArgument(_))
        ));
    }
}
