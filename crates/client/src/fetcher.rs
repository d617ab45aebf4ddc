//! HTTP download of a finished job's video asset.

use async_trait::async_trait;

use crate::service::{AssetFetcher, FetchError};

/// Query parameter the credential is appended under.
const KEY_QUERY_PARAM: &str = "key";

/// Downloads result locators with a plain HTTP GET.
#[derive(Debug, Clone, Default)]
pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    /// Create a fetcher reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Append the credential to the locator's query string, preserving any
/// parameters already present.
pub fn authorized_url(locator: &str, credential: &str) -> Result<reqwest::Url, FetchError> {
    let mut url = reqwest::Url::parse(locator)
        .map_err(|_| FetchError::InvalidLocator(locator.to_string()))?;
    url.query_pairs_mut().append_pair(KEY_QUERY_PARAM, credential);
    Ok(url)
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, locator: &str, credential: &str) -> Result<Vec<u8>, FetchError> {
        let url = authorized_url(locator, credential)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        tracing::debug!(size = bytes.len(), "Video asset downloaded");
        Ok(bytes.to_vec())
    }
}
