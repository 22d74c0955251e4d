//! Thin JSON-over-HTTP GET client shared by the exchange adapters.

use crate::error::DataError;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default timeout applied to every upstream request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// GET + JSON decode, mapping non-2xx responses to [`DataError::HttpStatus`].
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for RestClient {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_TIMEOUT)
    }
}

impl RestClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// GET `url` and deserialise the body as `T`.
    pub async fn get_json<T>(&self, url: &str) -> Result<T, DataError>
    where
        T: DeserializeOwned,
    {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(DataError::from)
    }

    /// GET `base` with `params` appended as query parameters.
    pub async fn get_json_with<T>(
        &self,
        base: &str,
        params: &[(&str, &str)],
    ) -> Result<T, DataError>
    where
        T: DeserializeOwned,
    {
        let url = Url::parse_with_params(base, params)?;
        self.get_json(url.as_str()).await
    }
}
