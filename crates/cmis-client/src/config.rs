use std::fmt;
use std::time::Duration;

use cmis_core::{BindingKind, CmisError, Result};
use serde::Serialize;

/// Default connection timeout (ms).
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;

/// Default number of items requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Credentials sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP basic auth (plus a WS-Security UsernameToken on SOAP).
    Basic { username: String, password: String },
    /// `Authorization: Bearer` token.
    Bearer { token: String },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer {
            token: token.into(),
        }
    }

    /// Name used in the connection identifier.
    pub fn principal(&self) -> &str {
        match self {
            Credentials::Basic { username, .. } => username,
            Credentials::Bearer { .. } => "token",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
        }
    }
}

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub credentials: Credentials,
    /// `None` selects the first repository the endpoint offers.
    pub repository_id: Option<String>,
    pub binding: BindingKind,
    pub connection_timeout: Duration,
    /// Keep a cookie jar for endpoints that need sticky HTTP sessions.
    pub use_cookies: bool,
    pub page_size: u32,
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
            repository_id: None,
            binding: BindingKind::default(),
            connection_timeout: Duration::from_millis(DEFAULT_CONNECTION_TIMEOUT_MS),
            use_cookies: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_repository_id(mut self, repository_id: impl Into<String>) -> Self {
        self.repository_id = Some(repository_id.into());
        self
    }

    pub fn with_binding(mut self, binding: BindingKind) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_cookies(mut self, use_cookies: bool) -> Self {
        self.use_cookies = use_cookies;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Reject blank required parameters. Runs before any network activity.
    pub fn validate(&self) -> Result<()> {
        match &self.credentials {
            Credentials::Basic { username, password } => {
                if username.trim().is_empty() {
                    return Err(missing("username"));
                }
                if password.trim().is_empty() {
                    return Err(missing("password"));
                }
            }
            Credentials::Bearer { token } => {
                if token.trim().is_empty() {
                    return Err(missing("token"));
                }
            }
        }

        if self.endpoint.trim().is_empty() {
            return Err(missing("endpoint"));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(CmisError::InvalidConfig(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self
            .repository_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(missing("repository id"));
        }
        if self.page_size == 0 {
            return Err(CmisError::InvalidConfig("page size must be at least 1".to_string()));
        }

        Ok(())
    }

    /// `username@endpoint`
    pub fn connection_identifier(&self) -> String {
        format!("{}@{}", self.credentials.principal(), self.endpoint)
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            endpoint: self.endpoint.clone(),
            principal: self.credentials.principal().to_string(),
            binding: self.binding,
            repository_id: self.repository_id.clone(),
            connection_timeout_ms: self.connection_timeout.as_millis() as u64,
            use_cookies: self.use_cookies,
        }
    }
}

/// Secret-free view of a configuration, safe to log or print.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub endpoint: String,
    pub principal: String,
    pub binding: BindingKind,
    pub repository_id: Option<String>,
    pub connection_timeout_ms: u64,
    pub use_cookies: bool,
}

fn missing(field: &str) -> CmisError {
    CmisError::InvalidConfig(format!(
        "the {} connection parameter is empty or missing; it is required to connect to the repository",
        field
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(
            "http://localhost:8080/alfresco/cmisatom",
            Credentials::basic("admin", "secret"),
        )
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
        assert_eq!(
            config().connection_identifier(),
            "admin@http://localhost:8080/alfresco/cmisatom"
        );
    }

    #[test]
    fn test_blank_fields_rejected() {
        let mut c = config();
        c.credentials = Credentials::basic("  ", "secret");
        assert!(matches!(c.validate(), Err(CmisError::InvalidConfig(m)) if m.contains("username")));

        let mut c = config();
        c.credentials = Credentials::basic("admin", "");
        assert!(matches!(c.validate(), Err(CmisError::InvalidConfig(m)) if m.contains("password")));

        let mut c = config();
        c.endpoint = String::new();
        assert!(matches!(c.validate(), Err(CmisError::InvalidConfig(m)) if m.contains("endpoint")));

        let c = config().with_repository_id(" ");
        assert!(c.validate().is_err());

        let mut c = config();
        c.credentials = Credentials::bearer("");
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_endpoint_must_be_http() {
        let mut c = config();
        c.endpoint = "ftp://repo".to_string();
        assert!(matches!(c.validate(), Err(CmisError::InvalidConfig(_))));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let printed = format!("{:?}", Credentials::basic("admin", "hunter2"));
        assert!(!printed.contains("hunter2"));
        let printed = format!("{:?}", Credentials::bearer("tok-123"));
        assert!(!printed.contains("tok-123"));
    }
}
