//! SOAP 1.1 envelopes for the CMIS Web Services binding.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, SecondsFormat, Utc};
use cmis_core::{Ace, CmisError, LookupKey, Properties, Result};
use roxmltree::{Document, Node};

use crate::codec::{self, child, child_text, escape, NS_CMIS, NS_CMISM};
use crate::config::Credentials;

const NS_SOAP: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";

/// CMIS web services, each published at `{endpoint}/{name}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Service {
    Repository,
    Navigation,
    Object,
    Versioning,
    Discovery,
    Relationship,
    Acl,
    Policy,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Repository => "RepositoryService",
            Service::Navigation => "NavigationService",
            Service::Object => "ObjectService",
            Service::Versioning => "VersioningService",
            Service::Discovery => "DiscoveryService",
            Service::Relationship => "RelationshipService",
            Service::Acl => "ACLService",
            Service::Policy => "PolicyService",
        }
    }
}

/// Body of one `cmism:` request element. Parameters must be added in
/// schema order.
pub(crate) struct Request {
    operation: &'static str,
    body: String,
}

impl Request {
    pub fn new(operation: &'static str, repository_id: &str) -> Self {
        Self {
            operation,
            body: String::new(),
        }
        .text("repositoryId", repository_id)
    }

    /// A request without the leading `repositoryId` (`getRepositories`).
    pub fn bare(operation: &'static str) -> Self {
        Self {
            operation,
            body: String::new(),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body
            .push_str(&format!("<cmism:{0}>{1}</cmism:{0}>", name, escape(value)));
        self
    }

    pub fn opt(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.text(name, value),
            None => self,
        }
    }

    pub fn flag(self, name: &str, value: bool) -> Self {
        self.text(name, if value { "true" } else { "false" })
    }

    pub fn number(self, name: &str, value: impl ToString) -> Self {
        self.text(name, &value.to_string())
    }

    pub fn properties(mut self, properties: &Properties) -> Self {
        codec::write_properties(&mut self.body, "cmism:properties", properties);
        self
    }

    pub fn content(mut self, filename: Option<&str>, mime_type: &str, data: &[u8]) -> Self {
        self.body.push_str("<cmism:contentStream>");
        self.body
            .push_str(&format!("<cmism:length>{}</cmism:length>", data.len()));
        self.body
            .push_str(&format!("<cmism:mimeType>{}</cmism:mimeType>", escape(mime_type)));
        if let Some(filename) = filename {
            self.body
                .push_str(&format!("<cmism:filename>{}</cmism:filename>", escape(filename)));
        }
        self.body
            .push_str(&format!("<cmism:stream>{}</cmism:stream>", STANDARD.encode(data)));
        self.body.push_str("</cmism:contentStream>");
        self
    }

    pub fn aces(mut self, name: &str, aces: &[Ace]) -> Self {
        if aces.is_empty() {
            return self;
        }
        self.body.push_str(&format!("<cmism:{}>", name));
        for ace in aces {
            codec::write_ace(&mut self.body, ace);
        }
        self.body.push_str(&format!("</cmism:{}>", name));
        self
    }

    /// Full envelope. Basic credentials are also sent as a WS-Security
    /// UsernameToken, which most CMIS web service endpoints require.
    pub fn envelope(&self, credentials: &Credentials) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <soapenv:Envelope xmlns:soapenv=\"{}\" xmlns:cmism=\"{}\" xmlns:cmis=\"{}\">",
            NS_SOAP, NS_CMISM, NS_CMIS
        );

        if let Credentials::Basic { username, password } = credentials {
            let now = Utc::now();
            xml.push_str(&format!(
                "<soapenv:Header><wsse:Security xmlns:wsse=\"{}\" xmlns:wsu=\"{}\">\
                 <wsu:Timestamp><wsu:Created>{}</wsu:Created><wsu:Expires>{}</wsu:Expires></wsu:Timestamp>\
                 <wsse:UsernameToken><wsse:Username>{}</wsse:Username>\
                 <wsse:Password Type=\"{}\">{}</wsse:Password></wsse:UsernameToken>\
                 </wsse:Security></soapenv:Header>",
                NS_WSSE,
                NS_WSU,
                now.to_rfc3339_opts(SecondsFormat::Millis, true),
                (now + Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Millis, true),
                escape(username),
                PASSWORD_TEXT,
                escape(password)
            ));
        }

        xml.push_str(&format!(
            "<soapenv:Body><cmism:{0}>{1}</cmism:{0}></soapenv:Body></soapenv:Envelope>",
            self.operation, self.body
        ));
        xml
    }
}

/// The `SOAP-ENV:Body` of a response.
fn body<'a, 'i>(doc: &'a Document<'i>) -> Result<Node<'a, 'i>> {
    let envelope = doc.root_element();
    if envelope.tag_name().name() != "Envelope" || envelope.tag_name().namespace() != Some(NS_SOAP) {
        return Err(CmisError::Protocol(format!(
            "expected a SOAP envelope, got <{}>",
            envelope.tag_name().name()
        )));
    }
    child(envelope, "Body").ok_or_else(|| CmisError::Protocol("SOAP envelope without Body".to_string()))
}

/// Decode a SOAP fault into the error taxonomy, if the document carries one.
pub(crate) fn fault(doc: &Document<'_>, key: Option<LookupKey>) -> Option<CmisError> {
    let fault = child(body(doc).ok()?, "Fault")?;
    let reason = child_text(fault, "faultstring").unwrap_or_else(|| "SOAP fault".to_string());

    let cmis_fault = child(fault, "detail").and_then(|d| child(d, "cmisFault"));
    let Some(cmis_fault) = cmis_fault else {
        return Some(CmisError::Repository(reason));
    };
    let message = child_text(cmis_fault, "message").unwrap_or(reason);
    let fault_type = child_text(cmis_fault, "type").unwrap_or_default();
    Some(CmisError::from_fault(&fault_type, message, key))
}

/// The `cmism:<operation>Response` element of a successful response.
pub(crate) fn response<'a, 'i>(doc: &'a Document<'i>, operation: &str) -> Result<Node<'a, 'i>> {
    let expected = format!("{}Response", operation);
    child(body(doc)?, &expected)
        .ok_or_else(|| CmisError::Protocol(format!("SOAP body without <{}>", expected)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse_document;
    use cmis_core::{property, PropertyValue};

    #[test]
    fn test_envelope_carries_username_token() {
        let mut properties = Properties::new();
        properties.insert(property::NAME.to_string(), PropertyValue::string("x&y"));
        let request = Request::new("createFolder", "repo")
            .properties(&properties)
            .text("folderId", "root");
        let xml = request.envelope(&Credentials::basic("admin", "p<w"));

        let doc = parse_document(&xml).unwrap();
        let root = doc.root_element();
        let token = root
            .descendants()
            .find(|n| n.tag_name().name() == "UsernameToken")
            .unwrap();
        assert_eq!(child_text(token, "Username").as_deref(), Some("admin"));
        assert_eq!(child_text(token, "Password").as_deref(), Some("p<w"));

        let op = child(body(&doc).unwrap(), "createFolder").unwrap();
        let names: Vec<&str> = op
            .children()
            .filter(|n| n.is_element())
            .map(|n| n.tag_name().name())
            .collect();
        assert_eq!(names, vec!["repositoryId", "properties", "folderId"]);
    }

    #[test]
    fn test_bearer_envelope_has_no_security_header() {
        let xml = Request::bare("getRepositories").envelope(&Credentials::bearer("t"));
        assert!(!xml.contains("Security"));
        assert!(xml.contains("<cmism:getRepositories></cmism:getRepositories>"));
    }

    #[test]
    fn test_fault_maps_cmis_type() {
        let xml = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
            <S:Body><S:Fault>
                <faultcode>S:Server</faultcode>
                <faultstring>Object not found</faultstring>
                <detail><cmisFault xmlns="http://docs.oasis-open.org/ns/cmis/messaging/200908/">
                    <type>objectNotFound</type><code>0</code><message>No such object</message>
                </cmisFault></detail>
            </S:Fault></S:Body>
        </S:Envelope>"#;
        let doc = parse_document(xml).unwrap();
        let error = fault(&doc, Some(LookupKey::Id("x".to_string()))).unwrap();
        assert!(matches!(error, CmisError::ObjectNotFound(LookupKey::Id(id)) if id == "x"));
    }

    #[test]
    fn test_fault_without_detail_is_repository_error() {
        let xml = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
            <S:Body><S:Fault><faultcode>S:Server</faultcode><faultstring>boom</faultstring></S:Fault></S:Body>
        </S:Envelope>"#;
        let doc = parse_document(xml).unwrap();
        assert!(matches!(fault(&doc, None), Some(CmisError::Repository(m)) if m == "boom"));
    }
}
