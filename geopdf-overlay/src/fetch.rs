//! Loading of documents and world files from URLs or local paths.

use std::path::PathBuf;

use reqwest::Client;
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Where a resource lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    Http(String),
    File(PathBuf),
}

impl ResourceLocation {
    /// Classify a location string. `http://` and `https://` are fetched over
    /// the network; `file://` URLs and bare paths are read from disk.
    pub fn parse(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ResourceLocation::Http(location.to_string())
        } else if let Some(path) = location.strip_prefix("file://") {
            ResourceLocation::File(PathBuf::from(path))
        } else {
            ResourceLocation::File(PathBuf::from(location))
        }
    }
}

/// Resource loader shared by document and world-file loading
#[derive(Clone)]
pub struct ResourceFetcher {
    client: Client,
}

impl ResourceFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                source: e,
            })?;

        Ok(Self { client })
    }

    /// Fetch raw bytes
    pub async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        match ResourceLocation::parse(location) {
            ResourceLocation::Http(url) => {
                let response =
                    self.client
                        .get(&url)
                        .send()
                        .await
                        .map_err(|e| FetchError::Request {
                            url: url.clone(),
                            source: e,
                        })?;

                if !response.status().is_success() {
                    return Err(FetchError::Status {
                        url,
                        status: response.status().as_u16(),
                    });
                }

                let bytes = response.bytes().await.map_err(|e| FetchError::Request {
                    url: url.clone(),
                    source: e,
                })?;
                debug!(url = %url, bytes = bytes.len(), "Fetched remote resource");
                Ok(bytes.to_vec())
            }
            ResourceLocation::File(path) => {
                let bytes = tokio::fs::read(&path).await.map_err(|e| FetchError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                debug!(path = %path.display(), bytes = bytes.len(), "Read local resource");
                Ok(bytes)
            }
        }
    }

    /// Fetch a UTF-8 text resource
    pub async fn fetch_text(&self, location: &str) -> Result<String, FetchError> {
        let bytes = self.fetch_bytes(location).await?;
        String::from_utf8(bytes).map_err(|_| FetchError::Encoding {
            location: location.to_string(),
        })
    }
}
