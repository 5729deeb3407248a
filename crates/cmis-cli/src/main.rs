mod commands;
mod config;

use clap::Parser;
use cmis_client::CmisClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let connection = config.connection.connection_config();

    let client = CmisClient::new(connection);
    info!("Connecting to {}", client.connection_identifier());
    let session = client.connect().await?;
    info!(
        "  Repository: {} ({:?} binding)",
        session.repository_id(),
        client.config().binding
    );

    let result = commands::run(&client, config.command).await;
    client.disconnect().await;
    result
}
