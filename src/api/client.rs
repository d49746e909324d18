use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::storage::buffer::Sample;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("metrics request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("metrics endpoint returned HTTP {0}")]
    Status(u16),
    #[error("metrics response is not JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One poll result from the metrics API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsBatch {
    pub samples: Vec<Sample>,
    /// Server wall clock at response time, if the payload carried one.
    pub server_time: Option<i64>,
    /// Entries dropped because they did not decode as samples.
    pub skipped: usize,
}

/// Anything the poller can pull a batch of samples from.
pub trait MetricsSource {
    fn fetch(&self) -> impl Future<Output = Result<MetricsBatch, FetchError>> + Send;
}

// `data` is kept as raw JSON so one bad entry cannot reject the whole response.
#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
}

/// Decode a `/api/metrics` body. Only a body that is not JSON at all is an
/// error; a missing or non-array `data` field is an empty batch.
pub fn parse_payload(body: &[u8]) -> Result<MetricsBatch, FetchError> {
    let raw: serde_json::Value = serde_json::from_slice(body)?;
    let raw: RawPayload = match serde_json::from_value(raw) {
        Ok(p) => p,
        Err(_) => return Ok(MetricsBatch::default()),
    };

    let server_time = raw.timestamp.and_then(|v| v.as_i64());
    let (samples, skipped) = match raw.data {
        Some(serde_json::Value::Array(values)) => Sample::decode_lenient(values),
        _ => (Vec::new(), 0),
    };
    Ok(MetricsBatch {
        samples,
        server_time,
        skipped,
    })
}

/// `GET <url>` against the sensor backend.
pub struct HttpMetricsSource {
    client: reqwest::Client,
    url: String,
}

impl HttpMetricsSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl MetricsSource for HttpMetricsSource {
    async fn fetch(&self) -> Result<MetricsBatch, FetchError> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.bytes().await?;
        let batch = parse_payload(&body)?;
        if batch.skipped > 0 {
            tracing::debug!(skipped = batch.skipped, "ignored malformed metric entries");
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_payload() {
        let body = br#"{
            "timestamp": 1706745600,
            "data": [
                {"timestamp": 1706745599, "sensor_id": "THS No. 1", "temperature": 20.5, "humidity": 55.2},
                {"timestamp": 1706745599, "sensor_id": "THS No. 2", "temperature": 22.0, "humidity": 58.0}
            ]
        }"#;
        let batch = parse_payload(body).unwrap();
        assert_eq!(batch.server_time, Some(1706745600));
        assert_eq!(batch.samples.len(), 2);
        assert_eq!(batch.samples[1].sensor_id, "THS No. 2");
        assert_eq!(batch.skipped, 0);
    }

    #[test]
    fn missing_or_wrong_data_is_empty() {
        for body in [
            &br#"{"timestamp": 5}"#[..],
            br#"{"data": null}"#,
            br#"{"data": {"timestamp": 1}}"#,
            br#"{"data": "nope"}"#,
            br#"[1, 2, 3]"#,
        ] {
            let batch = parse_payload(body).unwrap();
            assert!(batch.samples.is_empty());
        }
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let body = br#"{"data": [
            {"timestamp": 1, "sensor_id": "A", "temperature": 20.0, "humidity": 40.0},
            {"timestamp": 2, "sensor_id": "A", "temperature": "hot", "humidity": 40.0},
            null
        ]}"#;
        let batch = parse_payload(body).unwrap();
        assert_eq!(batch.samples, vec![Sample::new(1, "A", 20.0, 40.0)]);
        assert_eq!(batch.skipped, 2);
        assert_eq!(batch.server_time, None);
    }

    #[test]
    fn non_json_body_is_decode_error() {
        assert!(matches!(parse_payload(b"<html>"), Err(FetchError::Decode(_))));
    }

    async fn metrics_backend() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        use axum::{http::StatusCode, routing::get, Json, Router};

        let app = Router::new()
            .route(
                "/api/metrics",
                get(|| async {
                    Json(serde_json::json!({
                        "timestamp": 1706745600,
                        "data": [
                            {"timestamp": 1706745599, "sensor_id": "THS No. 1", "temperature": 20.5, "humidity": 55.25},
                            {"timestamp": 1706745599, "sensor_id": "THS No. 2"}
                        ]
                    }))
                }),
            )
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/html", get(|| async { "<html></html>" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (addr, server)
    }

    fn source(addr: std::net::SocketAddr, path: &str) -> HttpMetricsSource {
        HttpMetricsSource::new(format!("http://{addr}{path}"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetch_decodes_live_response() {
        let (addr, server) = metrics_backend().await;
        let batch = source(addr, "/api/metrics").fetch().await.unwrap();
        assert_eq!(batch.server_time, Some(1706745600));
        assert_eq!(batch.samples, vec![Sample::new(1706745599, "THS No. 1", 20.5, 55.25)]);
        assert_eq!(batch.skipped, 1);
        server.abort();
    }

    #[tokio::test]
    async fn fetch_maps_non_success_status() {
        let (addr, server) = metrics_backend().await;
        let err = source(addr, "/broken").fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(500)));

        let err = source(addr, "/missing").fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
        server.abort();
    }

    #[tokio::test]
    async fn fetch_reports_non_json_body() {
        let (addr, server) = metrics_backend().await;
        let err = source(addr, "/html").fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        server.abort();
    }

    #[tokio::test]
    async fn fetch_reports_refused_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = source(addr, "/api/metrics").fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
