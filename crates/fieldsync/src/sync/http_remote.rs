//! HTTP implementation of the remote authority
//!
//! Endpoints, relative to the configured base URL:
//! - `HEAD /assets` liveness probe, any 2xx is reachable
//! - `GET /assets` full snapshot (FeatureCollection or bare feature array)
//! - `POST /sync` pending batch, any 2xx acknowledges the whole batch

use async_trait::async_trait;
use fieldsync_api::Asset;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::remote::{RemoteAuthority, TransportError, TransportResult};

const BATCH_ID_HEADER: &str = "X-Batch-Id";
const MAX_ERROR_BODY: usize = 500;

pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: &str, request_timeout: Duration) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Map a reqwest error onto the transport taxonomy
    fn classify_error(e: reqwest::Error, url: &str, operation: &str) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::Protocol(format!("Failed to {} for {}: {}", operation, url, e))
        } else if e.is_connect() {
            TransportError::Network(format!(
                "Failed to {} for {}: connection error: {}",
                operation, url, e
            ))
        } else {
            TransportError::Network(format!("Failed to {} for {}: {}", operation, url, e))
        }
    }

    /// Turn a non-2xx response into a status error, otherwise return the body
    async fn handle_response(response: reqwest::Response, url: &str) -> TransportResult<String> {
        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| Self::classify_error(e, url, "read response body"))?;

        if !status.is_success() {
            let body = if response_text.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| response_text.is_char_boundary(*i))
                    .unwrap_or(0);
                format!("{}... (truncated)", &response_text[..cut])
            } else {
                response_text
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response_text)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotPayload {
    Collection {
        #[serde(rename = "type")]
        kind: String,
        features: Vec<Asset>,
    },
    Bare(Vec<Asset>),
}

/// Decode a `GET /assets` body
pub fn parse_snapshot(body: &str) -> TransportResult<Vec<Asset>> {
    let payload: SnapshotPayload = serde_json::from_str(body)
        .map_err(|e| TransportError::Protocol(format!("Failed to parse asset snapshot: {}", e)))?;

    match payload {
        SnapshotPayload::Collection { kind, features } if kind == "FeatureCollection" => {
            Ok(features)
        }
        SnapshotPayload::Collection { kind, .. } => Err(TransportError::Protocol(format!(
            "Expected a FeatureCollection, got type '{}'",
            kind
        ))),
        SnapshotPayload::Bare(features) => Ok(features),
    }
}

#[async_trait]
impl RemoteAuthority for HttpRemote {
    async fn probe(&self) -> TransportResult<()> {
        let url = self.url("assets");
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| Self::classify_error(e, &url, "probe"))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            debug!("[HttpRemote] Probe of {} returned {}", url, status);
            Err(TransportError::Status {
                status: status.as_u16(),
                body: String::new(),
            })
        }
    }

    async fn fetch_snapshot(&self) -> TransportResult<Vec<Asset>> {
        let url = self.url("assets");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::classify_error(e, &url, "fetch assets"))?;

        let body = Self::handle_response(response, &url).await?;
        let assets = parse_snapshot(&body)?;
        info!("[HttpRemote] Fetched {} assets from {}", assets.len(), url);
        Ok(assets)
    }

    async fn push_batch(&self, assets: &[Asset]) -> TransportResult<()> {
        let url = self.url("sync");
        let batch_id = Uuid::new_v4();

        info!(
            "[HttpRemote] Pushing batch {} with {} assets to {}",
            batch_id,
            assets.len(),
            url
        );

        let response = self
            .client
            .post(&url)
            .header(BATCH_ID_HEADER, batch_id.to_string())
            .json(assets)
            .send()
            .await
            .map_err(|e| Self::classify_error(e, &url, "push batch"))?;

        match Self::handle_response(response, &url).await {
            Ok(_) => {
                debug!("[HttpRemote] Batch {} acknowledged", batch_id);
                Ok(())
            }
            Err(e) => {
                error!("[HttpRemote] Batch {} rejected: {}", batch_id, e);
                Err(e)
            }
        }
    }

    fn remote_id(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_api::AssetId;

    #[test]
    fn test_parse_feature_collection() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 1,
                 "geometry": {"type": "Point", "coordinates": [-1.5491, 53.8008]},
                 "properties": {"name": "Pole 1", "status": "Proposed"}}
            ]
        }"#;

        let assets = parse_snapshot(body).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].id, AssetId::Int(1));
        assert_eq!(assets[0].status(), Some("Proposed"));
        assert!(!assets[0].pending_sync);
    }

    #[test]
    fn test_parse_bare_array() {
        let body = r#"[{"type": "Feature", "id": "c1",
            "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
            "properties": {}}]"#;
        let assets = parse_snapshot(body).unwrap();
        assert_eq!(assets[0].id, AssetId::Text("c1".into()));
    }

    #[test]
    fn test_parse_rejects_unexpected_shapes() {
        assert!(matches!(
            parse_snapshot(r#"{"type": "Feature", "features": []}"#),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            parse_snapshot(r#"{"assets": []}"#),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            parse_snapshot("<html>oops</html>"),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let remote = HttpRemote::new("http://127.0.0.1:5000/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(remote.url("assets"), "http://127.0.0.1:5000/api/assets");
        assert_eq!(remote.remote_id(), "http://127.0.0.1:5000/api");
    }
}
