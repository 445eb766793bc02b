//! Media analysis client
//!
//! The analysis service is an opaque batch transform: an ordered list of item
//! descriptors in, an ordered list of [`MediaAnalysis`] out. Response length
//! is validated by the ingestion pipeline, not here.

use crate::error::{CatalogError, CatalogResult};
use crate::models::MediaAnalysis;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("mcat/", env!("CARGO_PKG_VERSION"));

/// Default request timeout; large videos can take minutes to analyze
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// One item descriptor sent to the analysis service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub durable_path: PathBuf,
    pub name: String,
    pub mime_type: String,
    /// Byte length, used by local analysis only
    #[serde(skip)]
    pub size_bytes: Option<u64>,
}

/// Batch analysis collaborator
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Analyze `requests`; results are positional
    async fn analyze(&self, requests: &[AnalysisRequest]) -> CatalogResult<Vec<MediaAnalysis>>;
}

/// HTTP analysis client
///
/// POSTs the batch as a JSON array and expects a JSON array back.
pub struct HttpAnalysisClient {
    http_client: reqwest::Client,
    endpoint: Url,
}

impl HttpAnalysisClient {
    pub fn new(endpoint: &str, timeout: Duration) -> CatalogResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| CatalogError::Analysis(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Analysis(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn analyze(&self, requests: &[AnalysisRequest]) -> CatalogResult<Vec<MediaAnalysis>> {
        tracing::debug!(endpoint = %self.endpoint, count = requests.len(), "Requesting media analysis");

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(requests)
            .send()
            .await
            .map_err(|e| CatalogError::Analysis(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CatalogError::Analysis(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        response
            .json::<Vec<MediaAnalysis>>()
            .await
            .map_err(|e| CatalogError::Analysis(format!("Parse error: {}", e)))
    }
}

/// Offline analysis from the file name and MIME type only
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAnalysisClient;

#[async_trait]
impl AnalysisClient for LocalAnalysisClient {
    async fn analyze(&self, requests: &[AnalysisRequest]) -> CatalogResult<Vec<MediaAnalysis>> {
        Ok(requests
            .iter()
            .map(|r| MediaAnalysis::basic(&r.name, &r.mime_type, r.size_bytes))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> AnalysisRequest {
        AnalysisRequest {
            durable_path: PathBuf::from(format!("/cache/{}", name)),
            name: name.to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: Some(10),
        }
    }

    #[tokio::test]
    async fn test_local_client_is_positional() {
        let requests = vec![request("cat_nap.png"), request("dog_walk.png")];
        let results = LocalAnalysisClient.analyze(&requests).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].tagging.raw_keywords.contains(&"cat".to_string()));
        assert!(results[1].tagging.raw_keywords.contains(&"dog".to_string()));
    }

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_value(request("a.png")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "durable_path": "/cache/a.png",
                "name": "a.png",
                "mime_type": "image/png"
            })
        );
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let err = HttpAnalysisClient::new("not a url", Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, CatalogError::Analysis(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_analysis_error() {
        // Port 9 (discard) on loopback refuses connections
        let client = HttpAnalysisClient::new("http://127.0.0.1:9/analyze", Duration::from_secs(2)).unwrap();
        let err = client.analyze(&[request("a.png")]).await.unwrap_err();
        assert!(matches!(err, CatalogError::Analysis(_)));
    }
}
