//! CMIS XML schema codec shared by the AtomPub and SOAP bindings.
//!
//! Both bindings carry objects, properties, ACLs, repository infos and type
//! definitions in the same `cmis:` core schema; only the envelope differs.
//! Reading is done with `roxmltree` and matches elements by local name, so
//! namespace prefixes chosen by the server do not matter.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use cmis_core::{
    property, Ace, Acl, BaseType, Capabilities, CapabilityAcl, CapabilityChanges,
    CapabilityQuery, Cardinality, ChangeEvent, ChangeType, CmisError, CmisObject,
    ContentStreamUpdates, ObjectId, Properties, PropertyDefinition, PropertyType, PropertyValue,
    QueryResult, RepositoryInfo, Result, TypeDefinition, Updatability,
};
use roxmltree::{Document, Node};

pub(crate) const NS_CMIS: &str = "http://docs.oasis-open.org/ns/cmis/core/200908/";
pub(crate) const NS_CMISRA: &str = "http://docs.oasis-open.org/ns/cmis/restatom/200908/";
pub(crate) const NS_CMISM: &str = "http://docs.oasis-open.org/ns/cmis/messaging/200908/";
pub(crate) const NS_ATOM: &str = "http://www.w3.org/2005/Atom";
pub(crate) const NS_APP: &str = "http://www.w3.org/2007/app";

// =============================================================================
// Reading
// =============================================================================

pub(crate) fn parse_document(xml: &str) -> Result<Document<'_>> {
    Document::parse(xml).map_err(|e| CmisError::Protocol(format!("invalid XML: {}", e)))
}

/// First element child with the given local name.
pub(crate) fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// All element children with the given local name.
pub(crate) fn children<'a, 'i: 'a>(
    node: Node<'a, 'i>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// First element (at any depth, including `node`) with the given local name.
pub(crate) fn descendant<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Concatenated text of an element.
pub(crate) fn text_of(node: Node<'_, '_>) -> String {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

pub(crate) fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name)
        .map(|n| text_of(n).trim().to_string())
        .filter(|t| !t.is_empty())
}

pub(crate) fn child_bool(node: Node<'_, '_>, name: &str) -> Option<bool> {
    child_text(node, name).map(|t| t.eq_ignore_ascii_case("true"))
}

fn protocol(message: impl Into<String>) -> CmisError {
    CmisError::Protocol(message.into())
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| protocol(format!("invalid dateTime '{}': {}", value, e)))
}

fn values(node: Node<'_, '_>) -> Vec<String> {
    children(node, "value").map(text_of).collect()
}

fn parse_each<T>(
    node: Node<'_, '_>,
    parse: impl Fn(&str) -> Option<T>,
    kind: &str,
) -> Result<Vec<T>> {
    values(node)
        .iter()
        .map(|v| {
            parse(v.trim()).ok_or_else(|| protocol(format!("invalid {} value '{}'", kind, v)))
        })
        .collect()
}

/// Decode one `cmis:property*` element. Unknown property kinds are skipped.
fn parse_property(node: Node<'_, '_>) -> Result<Option<PropertyValue>> {
    let value = match node.tag_name().name() {
        "propertyString" => PropertyValue::String(values(node)),
        "propertyId" => PropertyValue::Id(values(node)),
        "propertyUri" => PropertyValue::Uri(values(node)),
        "propertyHtml" => PropertyValue::Html(values(node)),
        "propertyBoolean" => PropertyValue::Boolean(parse_each(
            node,
            |v| match v {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            "boolean",
        )?),
        "propertyInteger" => {
            PropertyValue::Integer(parse_each(node, |v| v.parse().ok(), "integer")?)
        }
        "propertyDecimal" => {
            PropertyValue::Decimal(parse_each(node, |v| v.parse().ok(), "decimal")?)
        }
        "propertyDateTime" => PropertyValue::DateTime(
            values(node)
                .iter()
                .map(|v| parse_datetime(v))
                .collect::<Result<_>>()?,
        ),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Decode a `properties` element keyed by property definition id.
pub(crate) fn parse_properties(node: Node<'_, '_>) -> Result<Properties> {
    let mut properties = Properties::new();
    for el in node.children().filter(|n| n.is_element()) {
        let Some(id) = el.attribute("propertyDefinitionId") else {
            continue;
        };
        if let Some(value) = parse_property(el)? {
            properties.insert(id.to_string(), value);
        }
    }
    Ok(properties)
}

/// Decode a query result row. Rows are keyed by query name, which is what
/// the statement's select list refers to.
pub(crate) fn parse_query_result(object: Node<'_, '_>) -> Result<QueryResult> {
    let node = child(object, "properties")
        .ok_or_else(|| protocol("query result without properties"))?;
    let mut properties = Properties::new();
    for el in node.children().filter(|n| n.is_element()) {
        let Some(key) = el
            .attribute("queryName")
            .or_else(|| el.attribute("propertyDefinitionId"))
        else {
            continue;
        };
        if let Some(value) = parse_property(el)? {
            properties.insert(key.to_string(), value);
        }
    }
    Ok(QueryResult { properties })
}

fn parse_allowable_actions(node: Node<'_, '_>) -> BTreeSet<String> {
    node.children()
        .filter(|n| n.is_element() && text_of(*n).trim() == "true")
        .map(|n| n.tag_name().name().to_string())
        .collect()
}

/// Decode a CMIS object element (`cmisra:object`, SOAP `object`).
pub(crate) fn parse_object(node: Node<'_, '_>) -> Result<CmisObject> {
    let properties = child(node, "properties")
        .map(parse_properties)
        .transpose()?
        .ok_or_else(|| protocol("object without properties"))?;
    let actions = child(node, "allowableActions")
        .map(parse_allowable_actions)
        .unwrap_or_default();
    CmisObject::from_properties(properties, actions)
}

/// Decode an ACL. Entries are the `permission` elements that carry a principal.
pub(crate) fn parse_acl(node: Node<'_, '_>) -> Acl {
    let aces = node
        .descendants()
        .filter(|n| {
            n.is_element() && n.tag_name().name() == "permission" && child(*n, "principal").is_some()
        })
        .filter_map(|n| {
            let principal_id = child(n, "principal").and_then(|p| child_text(p, "principalId"))?;
            let permissions = children(n, "permission")
                .map(|p| text_of(p).trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            Some(Ace {
                principal_id,
                permissions,
                direct: child_bool(n, "direct").unwrap_or(true),
            })
        })
        .collect();

    let exact = descendant(node, "exact").map(|n| text_of(n).trim() == "true");
    Acl { aces, exact }
}

fn capabilities(node: Option<Node<'_, '_>>) -> Capabilities {
    let Some(node) = node else {
        return Capabilities::default();
    };
    let text = |name: &str| child_text(node, name).unwrap_or_default();
    let flag = |name: &str| child_bool(node, name).unwrap_or(false);

    Capabilities {
        changes: CapabilityChanges::from_wire(&text("capabilityChanges")),
        acl: CapabilityAcl::from_wire(&text("capabilityACL")),
        query: CapabilityQuery::from_wire(&text("capabilityQuery")),
        content_stream_updatability: ContentStreamUpdates::from_wire(&text(
            "capabilityContentStreamUpdatability",
        )),
        get_descendants: flag("capabilityGetDescendants"),
        get_folder_tree: flag("capabilityGetFolderTree"),
        multifiling: flag("capabilityMultifiling"),
        pwc_updatable: flag("capabilityPWCUpdatable"),
        all_versions_searchable: flag("capabilityAllVersionsSearchable"),
    }
}

/// Decode a `repositoryInfo` element.
pub(crate) fn parse_repository_info(node: Node<'_, '_>) -> Result<RepositoryInfo> {
    let id = child_text(node, "repositoryId").ok_or_else(|| protocol("repositoryInfo without repositoryId"))?;
    let root_folder_id = child_text(node, "rootFolderId")
        .ok_or_else(|| protocol(format!("repository {} without rootFolderId", id)))?;

    Ok(RepositoryInfo {
        name: child_text(node, "repositoryName").unwrap_or_else(|| id.clone()),
        description: child_text(node, "repositoryDescription"),
        vendor_name: child_text(node, "vendorName"),
        product_name: child_text(node, "productName"),
        product_version: child_text(node, "productVersion"),
        cmis_version_supported: child_text(node, "cmisVersionSupported"),
        root_folder_id: ObjectId::new(root_folder_id),
        latest_change_log_token: child_text(node, "latestChangeLogToken"),
        capabilities: capabilities(child(node, "capabilities")),
        id,
    })
}

fn parse_property_definition(node: Node<'_, '_>) -> Option<PropertyDefinition> {
    let id = child_text(node, "id")?;
    let property_type = child_text(node, "propertyType").and_then(|t| PropertyType::from_wire(&t))?;
    Some(PropertyDefinition {
        local_name: child_text(node, "localName"),
        display_name: child_text(node, "displayName"),
        query_name: child_text(node, "queryName"),
        property_type,
        cardinality: match child_text(node, "cardinality").as_deref() {
            Some("multi") => Cardinality::Multi,
            _ => Cardinality::Single,
        },
        updatability: Updatability::from_wire(&child_text(node, "updatability").unwrap_or_default()),
        required: child_bool(node, "required").unwrap_or(false),
        id,
    })
}

/// Decode a type definition element (`cmisra:type`, SOAP `type`).
pub(crate) fn parse_type_definition(node: Node<'_, '_>) -> Result<TypeDefinition> {
    let id = child_text(node, "id").ok_or_else(|| protocol("type definition without id"))?;
    let base_type = child_text(node, "baseId")
        .and_then(|b| BaseType::from_id(&b))
        .ok_or_else(|| protocol(format!("type {} without a known baseId", id)))?;

    let property_definitions: BTreeMap<String, PropertyDefinition> = node
        .children()
        .filter(|n| {
            let name = n.tag_name().name();
            n.is_element() && name.starts_with("property") && name.ends_with("Definition")
        })
        .filter_map(parse_property_definition)
        .map(|d| (d.id.clone(), d))
        .collect();

    Ok(TypeDefinition {
        local_name: child_text(node, "localName"),
        query_name: child_text(node, "queryName"),
        display_name: child_text(node, "displayName"),
        description: child_text(node, "description"),
        base_type,
        parent_type_id: child_text(node, "parentId"),
        creatable: child_bool(node, "creatable").unwrap_or(false),
        fileable: child_bool(node, "fileable").unwrap_or(false),
        queryable: child_bool(node, "queryable").unwrap_or(false),
        versionable: child_bool(node, "versionable"),
        content_stream_allowed: child_text(node, "contentStreamAllowed"),
        property_definitions,
        id,
    })
}

/// Decode a change-log object: its `cmis:objectId` plus `changeEventInfo`.
pub(crate) fn parse_change_event(node: Node<'_, '_>, include_properties: bool) -> Result<ChangeEvent> {
    let mut properties = child(node, "properties")
        .map(parse_properties)
        .transpose()?
        .unwrap_or_default();
    let object_id = properties
        .get(property::OBJECT_ID)
        .and_then(PropertyValue::first_str)
        .map(ObjectId::new)
        .ok_or_else(|| protocol("change event without cmis:objectId"))?;

    let info = child(node, "changeEventInfo").ok_or_else(|| protocol("change event without changeEventInfo"))?;
    let change_type = child_text(info, "changeType")
        .and_then(|t| ChangeType::from_wire(&t))
        .ok_or_else(|| protocol(format!("change event for {} without a known changeType", object_id)))?;
    let change_time = child_text(info, "changeTime")
        .map(|t| parse_datetime(&t))
        .transpose()?;

    if !include_properties {
        properties.clear();
    }

    Ok(ChangeEvent {
        object_id,
        change_type,
        change_time,
        properties,
    })
}

// =============================================================================
// Writing
// =============================================================================

pub(crate) fn escape(value: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(value)
}

fn property_tag(value: &PropertyValue) -> &'static str {
    match value {
        PropertyValue::String(_) => "propertyString",
        PropertyValue::Id(_) => "propertyId",
        PropertyValue::Boolean(_) => "propertyBoolean",
        PropertyValue::Integer(_) => "propertyInteger",
        PropertyValue::Decimal(_) => "propertyDecimal",
        PropertyValue::DateTime(_) => "propertyDateTime",
        PropertyValue::Uri(_) => "propertyUri",
        PropertyValue::Html(_) => "propertyHtml",
    }
}

fn wire_values(value: &PropertyValue) -> Vec<String> {
    match value {
        PropertyValue::String(v)
        | PropertyValue::Id(v)
        | PropertyValue::Uri(v)
        | PropertyValue::Html(v) => v.clone(),
        PropertyValue::Boolean(v) => v.iter().map(bool::to_string).collect(),
        PropertyValue::Integer(v) => v.iter().map(i64::to_string).collect(),
        PropertyValue::Decimal(v) => v.iter().map(f64::to_string).collect(),
        PropertyValue::DateTime(v) => v
            .iter()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .collect(),
    }
}

/// Write a properties element. The `cmis` prefix must be bound by the
/// enclosing document; `element` is the qualified wrapper name.
pub(crate) fn write_properties(out: &mut String, element: &str, properties: &Properties) {
    out.push_str(&format!("<{}>", element));
    for (id, value) in properties {
        let tag = property_tag(value);
        out.push_str(&format!("<cmis:{} propertyDefinitionId=\"{}\">", tag, escape(id)));
        for v in wire_values(value) {
            out.push_str(&format!("<cmis:value>{}</cmis:value>", escape(&v)));
        }
        out.push_str(&format!("</cmis:{}>", tag));
    }
    out.push_str(&format!("</{}>", element));
}

/// Write one access control entry as `cmis:permission`.
pub(crate) fn write_ace(out: &mut String, ace: &Ace) {
    out.push_str("<cmis:permission><cmis:principal><cmis:principalId>");
    out.push_str(&escape(&ace.principal_id));
    out.push_str("</cmis:principalId></cmis:principal>");
    for permission in &ace.permissions {
        out.push_str(&format!("<cmis:permission>{}</cmis:permission>", escape(permission)));
    }
    out.push_str(&format!("<cmis:direct>{}</cmis:direct></cmis:permission>", ace.direct));
}
