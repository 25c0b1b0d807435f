use crate::Result;

use strata_core::StorageAdapter;
use url::Url;

/// Connects the storage adapter the URL's scheme selects.
///
/// `postgresql`/`postgres` and `mongodb`/`mongodb+srv` URLs are accepted when
/// the matching cargo feature is enabled.
pub async fn connect(url: &str) -> Result<Box<dyn StorageAdapter>> {
    let url = Url::parse(url)?;

    let adapter = match url.scheme() {
        "postgresql" | "postgres" => connect_postgresql(&url).await?,
        "mongodb" | "mongodb+srv" => connect_mongodb(&url).await?,
        scheme => {
            return Err(anyhow::anyhow!(
                "unsupported database; scheme={scheme}; url={url}"
            )
            .into())
        }
    };

    tracing::info!(scheme = url.scheme(), "connected storage adapter");
    Ok(adapter)
}

#[cfg(feature = "postgresql")]
async fn connect_postgresql(url: &Url) -> Result<Box<dyn StorageAdapter>> {
    let driver = strata_driver_postgresql::PostgreSQL::connect(url.as_str()).await?;
    Ok(Box::new(driver))
}

#[cfg(not(feature = "postgresql"))]
async fn connect_postgresql(_url: &Url) -> Result<Box<dyn StorageAdapter>> {
    Err(anyhow::anyhow!("`postgresql` feature not enabled").into())
}

#[cfg(feature = "mongodb")]
async fn connect_mongodb(url: &Url) -> Result<Box<dyn StorageAdapter>> {
    let driver = strata_driver_mongodb::MongoDb::connect(url.as_str()).await?;
    Ok(Box::new(driver))
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongodb(_url: &Url) -> Result<Box<dyn StorageAdapter>> {
    Err(anyhow::anyhow!("`mongodb` feature not enabled").into())
}
