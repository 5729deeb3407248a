//! Web Services binding against a mock repository.

use cmis_client::cmis_core::{Binding, BindingKind, ChangeType, CmisError, LookupKey, ObjectId, ObjectRef};
use cmis_client::{CmisClient, ConnectionConfig, Credentials, SoapBinding};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
    <S:Body>{body}</S:Body>
</S:Envelope>"#
    )
}

fn fault(fault_type: &str, message: &str) -> String {
    envelope(&format!(
        r#"<S:Fault>
            <faultcode>S:Server</faultcode>
            <faultstring>{message}</faultstring>
            <detail>
                <cmisFault xmlns="http://docs.oasis-open.org/ns/cmis/messaging/200908/">
                    <type>{fault_type}</type>
                    <code>0</code>
                    <message>{message}</message>
                </cmisFault>
            </detail>
        </S:Fault>"#
    ))
}

const REPOSITORY_INFO: &str = r#"
<cmism:getRepositoryInfoResponse
        xmlns:cmism="http://docs.oasis-open.org/ns/cmis/messaging/200908/"
        xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/">
    <cmism:repositoryInfo>
        <cmis:repositoryId>ws-repo</cmis:repositoryId>
        <cmis:repositoryName>WS Repository</cmis:repositoryName>
        <cmis:rootFolderId>ws-root</cmis:rootFolderId>
        <cmis:capabilities>
            <cmis:capabilityChanges>none</cmis:capabilityChanges>
            <cmis:capabilityACL>discover</cmis:capabilityACL>
        </cmis:capabilities>
    </cmism:repositoryInfo>
</cmism:getRepositoryInfoResponse>"#;

const OBJECT: &str = r#"
<cmism:getObjectResponse
        xmlns:cmism="http://docs.oasis-open.org/ns/cmis/messaging/200908/"
        xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/">
    <cmism:object>
        <cmis:properties>
            <cmis:propertyId propertyDefinitionId="cmis:objectId"><cmis:value>doc-7</cmis:value></cmis:propertyId>
            <cmis:propertyId propertyDefinitionId="cmis:baseTypeId"><cmis:value>cmis:document</cmis:value></cmis:propertyId>
            <cmis:propertyId propertyDefinitionId="cmis:objectTypeId"><cmis:value>cmis:document</cmis:value></cmis:propertyId>
            <cmis:propertyString propertyDefinitionId="cmis:name"><cmis:value>budget.xlsx</cmis:value></cmis:propertyString>
            <cmis:propertyInteger propertyDefinitionId="cmis:contentStreamLength"><cmis:value>5</cmis:value></cmis:propertyInteger>
            <cmis:propertyDateTime propertyDefinitionId="cmis:creationDate"><cmis:value>2024-03-01T10:15:00.000Z</cmis:value></cmis:propertyDateTime>
        </cmis:properties>
    </cmism:object>
</cmism:getObjectResponse>"#;

const CONTENT: &str = r#"
<cmism:getContentStreamResponse xmlns:cmism="http://docs.oasis-open.org/ns/cmis/messaging/200908/">
    <cmism:contentStream>
        <cmism:length>5</cmism:length>
        <cmism:mimeType>text/plain</cmism:mimeType>
        <cmism:stream>aGVsbG8=</cmism:stream>
    </cmism:contentStream>
</cmism:getContentStreamResponse>"#;

async fn repository() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/RepositoryService"))
        .and(body_string_contains("<cmism:getRepositoryInfo>"))
        .and(body_string_contains("<wsse:Username>admin</wsse:Username>"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(envelope(REPOSITORY_INFO), "text/xml"))
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer) -> ConnectionConfig {
    ConnectionConfig::new(format!("{}/services/", server.uri()), Credentials::basic("admin", "admin"))
        .with_binding(BindingKind::Soap)
        .with_repository_id("ws-repo")
}

async fn object_service(server: &MockServer, operation: &str, status: u16, body: String) {
    service(server, "ObjectService", operation, status, body).await;
}

async fn service(server: &MockServer, name: &str, operation: &str, status: u16, body: String) {
    Mock::given(method("POST"))
        .and(path(format!("/services/{}", name)))
        .and(header("SOAPAction", "\"\""))
        .and(body_string_contains(format!("<cmism:{}>", operation)))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body, "text/xml"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_connect_fetches_repository_info() {
    let server = repository().await;
    let client = CmisClient::new(config(&server));

    let info = client.connect().await.unwrap().repository_info().clone();
    assert_eq!(info.id, "ws-repo");
    assert_eq!(info.root_folder_id, ObjectId::from("ws-root"));
    assert!(info.supports_acl());
    assert!(!info.supports_changes());

    assert!(matches!(
        client.changelog(None, false).await,
        Err(CmisError::UnsupportedCapability(_))
    ));
}

#[tokio::test]
async fn test_get_object_and_content() {
    let server = repository().await;
    object_service(&server, "getObject", 200, envelope(OBJECT)).await;
    object_service(&server, "getContentStream", 200, envelope(CONTENT)).await;

    let client = CmisClient::new(config(&server));
    client.connect().await.unwrap();

    let doc = client.get_object_by_id(&ObjectId::from("doc-7"), None).await.unwrap();
    assert_eq!(doc.name(), Some("budget.xlsx"));
    assert_eq!(doc.content_stream_length(), Some(5));

    let content = client.get_content_stream(&ObjectRef::ByValue(doc)).await.unwrap();
    assert_eq!(content.mime_type(), "text/plain");
    assert_eq!(content.filename(), Some("budget.xlsx"));
    assert_eq!(&content.into_bytes().await.unwrap()[..], b"hello");
}

#[tokio::test]
async fn test_faults_map_onto_errors() {
    let server = repository().await;
    object_service(&server, "getObject", 500, fault("objectNotFound", "no such object")).await;
    object_service(&server, "deleteObject", 500, fault("permissionDenied", "denied")).await;
    object_service(&server, "updateProperties", 500, fault("updateConflict", "stale token")).await;
    object_service(&server, "getObjectByPath", 500, fault("notSupported", "nope")).await;

    let binding = SoapBinding::new(&config(&server)).unwrap();
    let id = ObjectId::from("doc-9");

    match binding.get_object("ws-repo", &id, None).await {
        Err(CmisError::ObjectNotFound(LookupKey::Id(key))) => assert_eq!(key, "doc-9"),
        other => panic!("unexpected {:?}", other.map(|o| o.id().clone())),
    }
    assert!(matches!(
        binding.delete_object("ws-repo", &id, true).await,
        Err(CmisError::PermissionDenied(m)) if m == "denied"
    ));
    assert!(matches!(
        binding
            .update_properties("ws-repo", &id, Some("3"), &Default::default())
            .await,
        Err(CmisError::ConcurrentModification(_))
    ));
    assert!(matches!(
        binding.get_object_by_path("ws-repo", "/x", None).await,
        Err(CmisError::UnsupportedCapability(_))
    ));
}

#[tokio::test]
async fn test_http_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/RepositoryService"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = CmisClient::new(config(&server));
    assert!(matches!(client.connect().await, Err(CmisError::Authentication(_))));
}

#[tokio::test]
async fn test_blank_password_never_reaches_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.credentials = Credentials::basic("admin", "");
    let client = CmisClient::new(config);
    assert!(matches!(client.connect().await, Err(CmisError::InvalidConfig(_))));
}

const CHANGES: &str = r#"
<cmism:getContentChangesResponse
        xmlns:cmism="http://docs.oasis-open.org/ns/cmis/messaging/200908/"
        xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/">
    <cmism:objects>
        <cmism:objects>
            <cmis:properties>
                <cmis:propertyId propertyDefinitionId="cmis:objectId"><cmis:value>doc-7</cmis:value></cmis:propertyId>
            </cmis:properties>
            <cmis:changeEventInfo>
                <cmis:changeType>deleted</cmis:changeType>
                <cmis:changeTime>2024-06-02T07:45:00.000Z</cmis:changeTime>
            </cmis:changeEventInfo>
        </cmism:objects>
        <cmism:hasMoreItems>true</cmism:hasMoreItems>
    </cmism:objects>
    <cmism:changeLogToken>58</cmism:changeLogToken>
</cmism:getContentChangesResponse>"#;

#[tokio::test]
async fn test_content_changes_carry_the_next_token() {
    let server = repository().await;
    Mock::given(method("POST"))
        .and(path("/services/DiscoveryService"))
        .and(body_string_contains("<cmism:getContentChanges>"))
        .and(body_string_contains("<cmism:changeLogToken>57</cmism:changeLogToken>"))
        .and(body_string_contains("<cmism:maxItems>1</cmism:maxItems>"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(envelope(CHANGES), "text/xml"))
        .expect(1)
        .mount(&server)
        .await;

    let binding = SoapBinding::new(&config(&server)).unwrap();
    let page = binding
        .get_content_changes("ws-repo", Some("57"), false, 1)
        .await
        .unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].object_id, ObjectId::from("doc-7"));
    assert_eq!(page.events[0].change_type, ChangeType::Deleted);
    assert!(page.events[0].properties.is_empty());
    assert_eq!(page.latest_change_token.as_deref(), Some("58"));
    assert!(page.has_more);
}

#[tokio::test]
async fn test_root_folder_has_no_parent() {
    let server = repository().await;
    service(
        &server,
        "NavigationService",
        "getFolderParent",
        500,
        fault("invalidArgument", "The root folder has no parent"),
    )
    .await;

    let binding = SoapBinding::new(&config(&server)).unwrap();
    let root = ObjectId::from("ws-root");
    match binding.get_folder_parent("ws-repo", &root).await {
        Err(CmisError::NoParent(id)) => assert_eq!(id, root),
        other => panic!("unexpected {:?}", other.map(|o| o.id().clone())),
    }
}
