use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use cmis_client::cmis_core::BindingKind;
use cmis_client::{ConnectionConfig, Credentials};

/// Command-line client for CMIS repositories.
#[derive(Parser, Debug, Clone)]
#[command(name = "cmis")]
#[command(about = "Run single CMIS operations against a repository and print the result as JSON")]
pub struct Config {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection parameters shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Service endpoint (AtomPub service document or Web Services base URL)
    #[arg(long, env = "CMIS_URL")]
    pub url: String,

    /// User name for basic authentication
    #[arg(long, env = "CMIS_USERNAME", default_value = "")]
    pub username: String,

    /// Password for basic authentication
    #[arg(long, env = "CMIS_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Bearer token, used instead of username and password when set
    #[arg(long, env = "CMIS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Repository to open (defaults to the first one offered)
    #[arg(long, env = "CMIS_REPOSITORY_ID")]
    pub repository_id: Option<String>,

    /// Wire binding: atom or soap
    #[arg(long, env = "CMIS_BINDING", default_value = "atom", value_parser = parse_binding)]
    pub binding: BindingKind,

    /// Connection timeout (milliseconds)
    #[arg(long, env = "CMIS_TIMEOUT_MS", default_value = "10000")]
    pub timeout_ms: u64,

    /// Keep cookies between requests
    #[arg(long, env = "CMIS_USE_COOKIES", default_value = "false")]
    pub use_cookies: bool,

    /// Items requested per page
    #[arg(long, env = "CMIS_PAGE_SIZE", default_value = "100")]
    pub page_size: u32,
}

impl ConnectionArgs {
    pub fn connection_config(&self) -> ConnectionConfig {
        let credentials = match &self.token {
            Some(token) => Credentials::bearer(token),
            None => Credentials::basic(&self.username, &self.password),
        };
        let mut config = ConnectionConfig::new(&self.url, credentials)
            .with_binding(self.binding)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_cookies(self.use_cookies)
            .with_page_size(self.page_size);
        if let Some(id) = &self.repository_id {
            config = config.with_repository_id(id);
        }
        config
    }
}

fn parse_binding(value: &str) -> Result<BindingKind, String> {
    BindingKind::parse(value).map_err(|e| e.to_string())
}

fn parse_assignment(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => Ok((key.trim().to_string(), val.to_string())),
        _ => Err(format!("expected <property>=<value>, got '{}'", value)),
    }
}

/// An object given either by id or, when it starts with `/`, by path.
pub type Target = String;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the repositories offered by the endpoint
    Repositories,

    /// Show repository information and capabilities
    Info,

    /// Show a type definition
    Type { type_id: String },

    /// Fetch an object by id or path
    Get {
        target: Target,
        #[arg(long)]
        filter: Option<String>,
    },

    /// Create every missing folder along an absolute path
    Mkdir { path: String },

    /// Upload a local file as a new document
    Put {
        /// Destination folder path
        folder: String,
        /// Local file to upload
        file: PathBuf,
        /// Document name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "application/octet-stream")]
        mime_type: String,
        #[arg(long = "type", default_value = "cmis:document")]
        object_type: String,
        /// Create the destination folder if it is missing
        #[arg(long)]
        force: bool,
        #[arg(long, default_value = "major")]
        versioning_state: String,
        /// Extra properties as <property>=<value>
        #[arg(long = "set", value_parser = parse_assignment)]
        properties: Vec<(String, String)>,
    },

    /// Write a document's content to stdout or a file
    Cat {
        target: Target,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Update properties of an object
    Update {
        target: Target,
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        properties: Vec<(String, String)>,
    },

    /// Add a secondary type (aspect) to an object
    Aspect {
        target: Target,
        aspect_id: String,
        #[arg(long = "set", value_parser = parse_assignment)]
        properties: Vec<(String, String)>,
    },

    /// Move an object between folders
    Mv {
        target: Target,
        source_folder: String,
        target_folder: String,
    },

    /// Delete an object or, with --tree, a folder and its contents
    Rm {
        target: Target,
        #[arg(long)]
        tree: bool,
        #[arg(long)]
        all_versions: bool,
        #[arg(long, default_value = "delete")]
        unfile: String,
        #[arg(long)]
        continue_on_failure: bool,
    },

    /// Navigate from a folder: parent, children, descendants or tree
    Nav {
        folder: Target,
        #[arg(long, default_value = "children")]
        option: String,
        #[arg(long)]
        depth: Option<i32>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        order_by: Option<String>,
    },

    /// List the folders an object is filed in
    Parents {
        target: Target,
        #[arg(long)]
        filter: Option<String>,
    },

    /// List checked-out documents
    CheckedOut {
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        order_by: Option<String>,
    },

    /// Run a query
    Query {
        statement: String,
        #[arg(long)]
        all_versions: bool,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        order_by: Option<String>,
        /// Stop after this many results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Read one page of the change log
    Changes {
        /// Token returned by a previous read
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        include_properties: bool,
    },

    /// Check out a document
    Checkout { target: Target },

    /// Discard a private working copy
    CancelCheckout { target: Target },

    /// Check in a private working copy
    Checkin {
        target: Target,
        #[arg(long)]
        minor: bool,
        #[arg(long)]
        comment: Option<String>,
        /// Replacement content
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value = "application/octet-stream")]
        mime_type: String,
        #[arg(long = "set", value_parser = parse_assignment)]
        properties: Vec<(String, String)>,
    },

    /// List every version of a document
    Versions {
        target: Target,
        #[arg(long)]
        filter: Option<String>,
    },

    /// List relationships an object takes part in
    Relationships { target: Target },

    /// Create a relationship between two objects
    Relate {
        source: Target,
        target: Target,
        #[arg(long = "type", default_value = "cmis:relationship")]
        relationship_type: String,
    },

    /// Show an object's ACL
    Acl { target: Target },

    /// Add and remove permissions, as <principal>=<permission>
    Permit {
        target: Target,
        #[arg(long, value_parser = parse_assignment)]
        add: Vec<(String, String)>,
        #[arg(long, value_parser = parse_assignment)]
        remove: Vec<(String, String)>,
        #[arg(long, default_value = "repositorydetermined")]
        propagation: String,
    },

    /// List policies applied to an object
    Policies { target: Target },

    /// Apply a policy to an object
    ApplyPolicy { policy_id: String, target: Target },
}
