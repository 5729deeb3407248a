//! AtomPub documents: service document, feeds, entries and their links.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{SecondsFormat, Utc};
use cmis_core::{property, Ace, CmisError, CmisObject, Properties, PropertyValue, RepositoryInfo, Result};
use roxmltree::Node;

use crate::codec::{
    self, child, child_text, children, escape, parse_document, NS_APP, NS_ATOM, NS_CMIS, NS_CMISRA,
};

pub(crate) const REL_SELF: &str = "self";
pub(crate) const REL_EDIT: &str = "edit";
pub(crate) const REL_EDIT_MEDIA: &str = "edit-media";
pub(crate) const REL_UP: &str = "up";
pub(crate) const REL_DOWN: &str = "down";
pub(crate) const REL_NEXT: &str = "next";
pub(crate) const REL_VERSION_HISTORY: &str = "version-history";
pub(crate) const REL_RELATIONSHIPS: &str = "http://docs.oasis-open.org/ns/cmis/link/200908/relationships";
pub(crate) const REL_POLICIES: &str = "http://docs.oasis-open.org/ns/cmis/link/200908/policies";
pub(crate) const REL_ACL: &str = "http://docs.oasis-open.org/ns/cmis/link/200908/acl";
pub(crate) const REL_FOLDER_TREE: &str = "http://docs.oasis-open.org/ns/cmis/link/200908/foldertree";
pub(crate) const REL_CHANGES: &str = "http://docs.oasis-open.org/ns/cmis/link/200908/changes";

pub(crate) const TYPE_ENTRY: &str = "application/atom+xml;type=entry";
pub(crate) const TYPE_FEED: &str = "application/atom+xml;type=feed";
pub(crate) const TYPE_TREE: &str = "application/cmistree+xml";
pub(crate) const TYPE_QUERY: &str = "application/cmisquery+xml";
pub(crate) const TYPE_ACL: &str = "application/cmisacl+xml";

#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub rel: String,
    pub href: String,
    pub media_type: Option<String>,
}

/// Links of one entry, feed or workspace.
#[derive(Debug, Clone, Default)]
pub(crate) struct Links(Vec<Link>);

impl Links {
    pub fn get(&self, rel: &str) -> Option<&str> {
        self.0.iter().find(|l| l.rel == rel).map(|l| l.href.as_str())
    }

    /// Link with the given relation whose media type starts with `media_type`.
    pub fn get_typed(&self, rel: &str, media_type: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| {
                l.rel == rel
                    && l.media_type
                        .as_deref()
                        .is_some_and(|t| t.replace(' ', "").starts_with(media_type))
            })
            .map(|l| l.href.as_str())
    }

    /// Edit link, falling back to self.
    pub fn edit(&self) -> Option<&str> {
        self.get(REL_EDIT).or_else(|| self.get(REL_SELF))
    }

    fn push(&mut self, link: Link) {
        self.0.push(link);
    }
}

fn parse_links(node: Node<'_, '_>) -> Links {
    Links(
        children(node, "link")
            .filter(|n| n.tag_name().namespace() == Some(NS_ATOM))
            .filter_map(|n| {
                Some(Link {
                    rel: n.attribute("rel")?.to_string(),
                    href: n.attribute("href")?.to_string(),
                    media_type: n.attribute("type").map(str::to_string),
                })
            })
            .collect(),
    )
}

/// One repository as advertised by the service document.
#[derive(Debug, Clone)]
pub(crate) struct Workspace {
    pub info: RepositoryInfo,
    /// Collection href by `cmisra:collectionType` (root, query, checkedout, types ...).
    pub collections: HashMap<String, String>,
    /// URI template by `cmisra:type` (objectbyid, objectbypath, typebyid, query).
    pub templates: HashMap<String, String>,
    pub links: Links,
}

impl Workspace {
    pub fn collection(&self, kind: &str) -> Result<&str> {
        self.collections.get(kind).map(String::as_str).ok_or_else(|| {
            CmisError::UnsupportedCapability(format!(
                "repository {} has no '{}' collection",
                self.info.id, kind
            ))
        })
    }

    pub fn template(&self, kind: &str) -> Result<&str> {
        self.templates.get(kind).map(String::as_str).ok_or_else(|| {
            CmisError::UnsupportedCapability(format!(
                "repository {} has no '{}' URI template",
                self.info.id, kind
            ))
        })
    }
}

/// Decode an `app:service` document into its workspaces, in document order.
pub(crate) fn read_service(xml: &str) -> Result<Vec<Workspace>> {
    let doc = parse_document(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "service" {
        return Err(CmisError::Protocol(format!(
            "expected an AtomPub service document, got <{}>",
            root.tag_name().name()
        )));
    }

    children(root, "workspace")
        .filter(|n| n.tag_name().namespace() == Some(NS_APP))
        .map(|ws| {
            let info = child(ws, "repositoryInfo")
                .ok_or_else(|| CmisError::Protocol("workspace without repositoryInfo".to_string()))
                .and_then(codec::parse_repository_info)?;

            let collections = children(ws, "collection")
                .filter_map(|c| {
                    let href = c.attribute("href")?;
                    let kind = child_text(c, "collectionType")?;
                    Some((kind, href.to_string()))
                })
                .collect();

            let templates = children(ws, "uritemplate")
                .filter_map(|t| Some((child_text(t, "type")?, child_text(t, "template")?)))
                .collect();

            Ok(Workspace {
                info,
                collections,
                templates,
                links: parse_links(ws),
            })
        })
        .collect()
}

/// A decoded entry together with its links and, for tree feeds, its children.
#[derive(Debug)]
pub(crate) struct Entry<T> {
    pub value: T,
    pub links: Links,
    pub children: Vec<Entry<T>>,
}

#[derive(Debug)]
pub(crate) struct Feed<T> {
    pub entries: Vec<Entry<T>>,
    pub links: Links,
    pub num_items: Option<u64>,
    pub has_more_items: bool,
}

fn parse_entry<T, F>(node: Node<'_, '_>, decode: &F) -> Result<Entry<T>>
where
    F: Fn(Node<'_, '_>) -> Result<T>,
{
    let mut links = parse_links(node);
    if links.get(REL_EDIT_MEDIA).is_none() {
        if let Some(src) = child(node, "content").and_then(|c| c.attribute("src")) {
            links.push(Link {
                rel: REL_EDIT_MEDIA.to_string(),
                href: src.to_string(),
                media_type: None,
            });
        }
    }

    let nested = child(node, "children")
        .filter(|n| n.tag_name().namespace() == Some(NS_CMISRA))
        .and_then(|c| child(c, "feed"));
    let children = match nested {
        Some(feed) => parse_feed(feed, decode)?.entries,
        None => Vec::new(),
    };

    Ok(Entry {
        value: decode(node)?,
        links,
        children,
    })
}

fn parse_feed<T, F>(node: Node<'_, '_>, decode: &F) -> Result<Feed<T>>
where
    F: Fn(Node<'_, '_>) -> Result<T>,
{
    let entries = children(node, "entry")
        .map(|e| parse_entry(e, decode))
        .collect::<Result<Vec<_>>>()?;
    let links = parse_links(node);
    let has_more_items = links.get(REL_NEXT).is_some()
        || codec::child_bool(node, "hasMoreItems").unwrap_or(false);

    Ok(Feed {
        num_items: child_text(node, "numItems").and_then(|n| n.parse().ok()),
        has_more_items,
        entries,
        links,
    })
}

fn expect_root<'a, 'i>(doc: &'a roxmltree::Document<'i>, name: &str) -> Result<Node<'a, 'i>> {
    let root = doc.root_element();
    if root.tag_name().name() == name {
        Ok(root)
    } else {
        Err(CmisError::Protocol(format!(
            "expected an Atom {}, got <{}>",
            name,
            root.tag_name().name()
        )))
    }
}

pub(crate) fn read_entry<T, F>(xml: &str, decode: F) -> Result<Entry<T>>
where
    F: Fn(Node<'_, '_>) -> Result<T>,
{
    let doc = parse_document(xml)?;
    parse_entry(expect_root(&doc, "entry")?, &decode)
}

pub(crate) fn read_feed<T, F>(xml: &str, decode: F) -> Result<Feed<T>>
where
    F: Fn(Node<'_, '_>) -> Result<T>,
{
    let doc = parse_document(xml)?;
    parse_feed(expect_root(&doc, "feed")?, &decode)
}

/// Some links (`up` of a folder) answer with a single entry, others with a feed.
pub(crate) fn read_entries<T, F>(xml: &str, decode: F) -> Result<Vec<Entry<T>>>
where
    F: Fn(Node<'_, '_>) -> Result<T>,
{
    let doc = parse_document(xml)?;
    let root = doc.root_element();
    match root.tag_name().name() {
        "entry" => Ok(vec![parse_entry(root, &decode)?]),
        "feed" => Ok(parse_feed(root, &decode)?.entries),
        other => Err(CmisError::Protocol(format!(
            "expected an Atom entry or feed, got <{}>",
            other
        ))),
    }
}

/// The `cmisra:object` of an entry.
pub(crate) fn object_of(entry: Node<'_, '_>) -> Result<CmisObject> {
    child(entry, "object")
        .ok_or_else(|| CmisError::Protocol("entry without cmisra:object".to_string()))
        .and_then(codec::parse_object)
}

// =============================================================================
// URLs
// =============================================================================

/// Expand a CMIS URI template. Placeholders without a value become empty.
pub(crate) fn expand_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &rest[open + 1..open + close];
        if let Some((_, value)) = values.iter().find(|(k, _)| *k == name) {
            out.push_str(&urlencoding::encode(value));
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

/// Append query parameters to a link href.
pub(crate) fn with_params(href: &str, params: &[(&str, String)]) -> String {
    let mut url = href.to_string();
    for (key, value) in params {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(key);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}

/// Value of a query parameter in a link href.
pub(crate) fn query_param(href: &str, name: &str) -> Option<String> {
    let (_, query) = href.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name)
            .then(|| urlencoding::decode(value).ok().map(|v| v.into_owned()))
            .flatten()
    })
}

// =============================================================================
// Request bodies
// =============================================================================

/// Inline content carried by an entry.
pub(crate) struct InlineContent<'a> {
    pub mime_type: &'a str,
    pub data: &'a [u8],
}

/// Build an Atom entry wrapping a `cmisra:object` with the given properties.
pub(crate) fn write_entry(properties: &Properties, content: Option<InlineContent<'_>>) -> String {
    let title = properties
        .get(property::NAME)
        .and_then(PropertyValue::first_str)
        .unwrap_or_default();

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    xml.push_str(&format!(
        "<atom:entry xmlns:atom=\"{}\" xmlns:cmis=\"{}\" xmlns:cmisra=\"{}\">",
        NS_ATOM, NS_CMIS, NS_CMISRA
    ));
    xml.push_str(&format!("<atom:title>{}</atom:title>", escape(title)));
    xml.push_str(&format!(
        "<atom:updated>{}</atom:updated>",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    if let Some(content) = content {
        xml.push_str(&format!(
            "<cmisra:content><cmisra:mediatype>{}</cmisra:mediatype><cmisra:base64>{}</cmisra:base64></cmisra:content>",
            escape(content.mime_type),
            STANDARD.encode(content.data)
        ));
    }
    xml.push_str("<cmisra:object>");
    codec::write_properties(&mut xml, "cmis:properties", properties);
    xml.push_str("</cmisra:object></atom:entry>");
    xml
}

/// Entry referencing an existing object by id (move, check out, apply policy).
pub(crate) fn write_id_entry(object_id: &str) -> String {
    let mut properties = Properties::new();
    properties.insert(property::OBJECT_ID.to_string(), PropertyValue::id(object_id));
    write_entry(&properties, None)
}

pub(crate) fn write_query(statement: &str, search_all_versions: bool, max_items: u32, skip_count: u64) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <cmis:query xmlns:cmis=\"{}\">\
         <cmis:statement>{}</cmis:statement>\
         <cmis:searchAllVersions>{}</cmis:searchAllVersions>\
         <cmis:includeAllowableActions>false</cmis:includeAllowableActions>\
         <cmis:maxItems>{}</cmis:maxItems>\
         <cmis:skipCount>{}</cmis:skipCount>\
         </cmis:query>",
        NS_CMIS,
        escape(statement),
        search_all_versions,
        max_items,
        skip_count
    )
}

pub(crate) fn write_acl(aces: &[Ace]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><cmis:acl xmlns:cmis=\"{}\">",
        NS_CMIS
    );
    for ace in aces.iter().filter(|a| a.direct) {
        codec::write_ace(&mut xml, ace);
    }
    xml.push_str("</cmis:acl>");
    xml
}
