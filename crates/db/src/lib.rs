pub mod indexes;
pub mod models;

use callroom_config::DatabaseSettings;
use mongodb::{Client, Database};
use tracing::info;

/// Connects to MongoDB and returns the configured database handle.
///
/// Returns `Ok(None)` when no URL is configured.
pub async fn connect(settings: &DatabaseSettings) -> Result<Option<Database>, mongodb::error::Error> {
    let Some(url) = settings.url.as_deref() else {
        return Ok(None);
    };
    let client = Client::with_uri_str(url).await?;
    info!(database = %settings.name, "Connected to MongoDB");
    Ok(Some(client.database(&settings.name)))
}
