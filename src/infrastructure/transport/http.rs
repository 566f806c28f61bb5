use crate::domain::errors::FetchError;
use crate::domain::features::{ArtifactBundle, BundleMeta, RunId};
use crate::domain::ports::ArtifactTransport;
use crate::infrastructure::core::http_client_factory::{
    HttpClientFactory, HttpClientSettings, build_url_with_query, normalize_base_url,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Artifact store reachable over HTTP:
/// `GET {base}/bundles?since=<rfc3339>` lists metadata,
/// `GET {base}/bundles/{run_id}` returns one bundle.
pub struct HttpArtifactTransport {
    client: ClientWithMiddleware,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpArtifactTransport {
    pub fn new(base_url: &str, api_token: Option<String>, settings: &HttpClientSettings) -> anyhow::Result<Self> {
        let base_url = normalize_base_url(base_url).with_context(|| format!("Invalid artifact base URL '{}'", base_url))?;
        Ok(Self {
            client: HttpClientFactory::create_client(settings),
            base_url,
            api_token,
        })
    }

    pub fn list_url(&self, since: DateTime<Utc>) -> Result<Url, url::ParseError> {
        build_url_with_query(
            &self.base_url,
            "bundles",
            &[("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))],
        )
    }

    pub fn bundle_url(&self, run_id: RunId) -> Result<Url, url::ParseError> {
        build_url_with_query(&self.base_url, &format!("bundles/{}", run_id), &[])
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        debug!("GET {}", url);
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::transport(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if let Some(err) = classify_status(status, url.as_str()) {
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(format!("Failed to read body of {}: {}", url, e)))?;
        serde_json::from_str(&body)
            .map_err(|e| FetchError::transport(format!("Failed to decode {}: {}", url, e)))
    }
}

/// Map a non-success status to a fetch error; `None` for success
pub fn classify_status(status: StatusCode, url: &str) -> Option<FetchError> {
    if status.is_success() {
        None
    } else if status == StatusCode::NOT_FOUND {
        Some(FetchError::not_found(format!("{} returned 404", url)))
    } else {
        Some(FetchError::transport(format!("{} returned {}", url, status)))
    }
}

#[async_trait]
impl ArtifactTransport for HttpArtifactTransport {
    async fn list_bundles_since(&self, since: DateTime<Utc>) -> Result<Vec<BundleMeta>, FetchError> {
        let url = self
            .list_url(since)
            .map_err(|e| FetchError::transport(format!("Invalid listing URL: {}", e)))?;
        self.get_json(url).await
    }

    async fn fetch_bundle(&self, run_id: RunId) -> Result<ArtifactBundle, FetchError> {
        let url = self
            .bundle_url(run_id)
            .map_err(|e| FetchError::transport(format!("Invalid bundle URL: {}", e)))?;
        self.get_json(url).await
    }
}
