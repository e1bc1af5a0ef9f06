use std::path::Path;

use super::{TileError, TileKey};

/// Retrieves a remote raw source into a local file.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), TileError>;
}

/// Fetcher for runs without network access; every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl Fetcher for OfflineFetcher {
    fn fetch(&self, url: &str, _dest: &Path) -> Result<(), TileError> {
        Err(TileError::Download(format!("offline, cannot fetch {url}")))
    }
}

/// Blocking HTTP(S) GET into `dest`.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Result<Self, TileError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| TileError::Download(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), TileError> {
        use std::fs;

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TileError::Download(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(TileError::Download(format!("{url}: HTTP {}", response.status())));
        }
        let bytes = response
            .bytes()
            .map_err(|e| TileError::Download(format!("{url}: {e}")))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        // Written next to the target and renamed, so an interrupted run
        // never leaves a truncated raw file behind.
        let partial = dest.with_extension("part");
        fs::write(&partial, &bytes)?;
        fs::rename(&partial, dest)?;
        tracing::debug!(url, bytes = bytes.len(), "Downloaded raw tile");
        Ok(())
    }
}

/// Substitute `{e}` and `{n}` in a URL template with the key's kilometre
/// coordinates.
pub fn expand_url(template: &str, key: TileKey) -> String {
    template
        .replace("{e}", &key.easting_km.to_string())
        .replace("{n}", &key.northing_km.to_string())
}
