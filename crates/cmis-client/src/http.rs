//! Shared HTTP transport for both bindings.
//!
//! Owns the `reqwest` client (timeouts, cookie jar, credentials) and the
//! mapping of transport failures and HTTP statuses onto `CmisError`.

use std::time::Duration;

use cmis_core::{CmisError, ContentStream, LookupKey, Result};
use futures::StreamExt;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::{ConnectionConfig, Credentials};

/// Authenticated HTTP client bound to one session.
pub struct HttpTransport {
    http: Client,
    credentials: Credentials,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connection_timeout)
            .cookie_store(config.use_cookies)
            .user_agent(concat!("cmis-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CmisError::InvalidConfig(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            credentials: config.credentials.clone(),
            request_timeout: config.connection_timeout,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Credentials::Bearer { token } => builder.bearer_auth(token),
        }
    }

    /// Request with credentials and the per-request timeout applied.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.authorize(self.http.request(method, url))
            .timeout(self.request_timeout)
    }

    /// Request for a content body: only the connect timeout applies, so a
    /// large download is not cut off while it is still streaming.
    pub fn download(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.get(url))
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(transport_error)
    }
}

/// Classify a `reqwest` failure. Everything that is not a body decoding
/// problem happened in the transport.
pub(crate) fn transport_error(err: reqwest::Error) -> CmisError {
    if err.is_decode() {
        return CmisError::Protocol(err.to_string());
    }
    if err.is_timeout() {
        return CmisError::Connectivity(format!("request timed out: {}", err));
    }
    CmisError::Connectivity(err.to_string())
}

/// Read a response body as text.
pub(crate) async fn read_text(response: Response) -> Result<String> {
    response.text().await.map_err(transport_error)
}

/// Pass successful responses through; turn failures into `CmisError`.
pub(crate) async fn check_status(response: Response, key: Option<LookupKey>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(error_from_status(status, &body, key))
}

/// Map an HTTP error status onto the taxonomy.
///
/// CMIS servers commonly embed the exception name in the error body as
/// `<!--exception-->name<!--/exception-->`; when present it wins over the
/// status code.
pub(crate) fn error_from_status(status: StatusCode, body: &str, key: Option<LookupKey>) -> CmisError {
    let message = marker(body, "message")
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}: {}", status, truncate(body, 512)));

    if status == StatusCode::UNAUTHORIZED {
        return CmisError::Authentication(message);
    }

    if let Some(exception) = marker(body, "exception") {
        debug!("Repository reported {} ({})", exception, status);
        return CmisError::from_fault(exception, message, key);
    }

    match status {
        StatusCode::FORBIDDEN => CmisError::PermissionDenied(message),
        StatusCode::NOT_FOUND => match key {
            Some(key) => CmisError::ObjectNotFound(key),
            None => CmisError::Repository(message),
        },
        StatusCode::METHOD_NOT_ALLOWED => CmisError::UnsupportedCapability(message),
        StatusCode::CONFLICT => CmisError::ConcurrentModification(message),
        StatusCode::BAD_REQUEST => CmisError::InvalidArgument(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => CmisError::Connectivity(message),
        _ => {
            warn!("Unexpected repository response {}", status);
            CmisError::Repository(message)
        }
    }
}

fn marker<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<!--{}-->", name);
    let close = format!("<!--/{}-->", name);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Wrap a successful download response as a streaming `ContentStream`.
pub(crate) fn content_from_response(response: Response, fallback_filename: Option<String>) -> ContentStream {
    let headers = response.headers();
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let filename = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename)
        .or(fallback_filename);
    let length = response.content_length();

    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(transport_error));

    ContentStream::new(filename, mime_type, length, Box::pin(body))
}

fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
    })
}
