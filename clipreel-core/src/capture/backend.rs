//! Capture backend boundary
//!
//! The backend owns the rolling video buffer. The engine only ever asks it
//! three things: is the buffer running, start it, save it now. Completion of
//! a save arrives out of band (see [`super::CaptureEngine::on_buffer_saved`]).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BufferStatus {
    pub active: bool,
}

#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn buffer_status(&self) -> Result<BufferStatus>;

    /// Start the rolling buffer. Must tolerate an already running buffer.
    async fn start_buffer(&self) -> Result<()>;

    /// Persist the current buffer contents. Returns once the request is
    /// accepted; the resulting file path is reported asynchronously.
    async fn save_buffer(&self) -> Result<()>;
}

/// Talks to a capture-control bridge over HTTP:
///
/// - `GET  {base}/replay-buffer/status` -> `{"active": bool}`
/// - `POST {base}/replay-buffer/start`
/// - `POST {base}/replay-buffer/save`
#[derive(Debug, Clone)]
pub struct HttpCaptureBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCaptureBackend {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::BackendUnavailable(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/replay-buffer/{path}", self.base_url)
    }

    async fn post(&self, path: &str) -> Result<()> {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("POST {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::BackendUnavailable(format!(
                "POST {url}: backend answered {}",
                response.status()
            )));
        }
        debug!(url = %url, "Capture backend accepted request");
        Ok(())
    }
}

#[async_trait]
impl CaptureBackend for HttpCaptureBackend {
    async fn buffer_status(&self) -> Result<BufferStatus> {
        let url = self.endpoint("status");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("GET {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::BackendUnavailable(format!(
                "GET {url}: backend answered {}",
                response.status()
            )));
        }

        response
            .json::<BufferStatus>()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("GET {url}: invalid status body: {e}")))
    }

    async fn start_buffer(&self) -> Result<()> {
        self.post("start").await
    }

    async fn save_buffer(&self) -> Result<()> {
        self.post("save").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_status_and_save_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/replay-buffer/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"active": false})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/replay-buffer/save"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpCaptureBackend::new(&format!("{}/", server.uri()), Duration::from_secs(2)).unwrap();
        assert_eq!(backend.buffer_status().await.unwrap(), BufferStatus { active: false });
        backend.save_buffer().await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_backend_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/replay-buffer/start"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = HttpCaptureBackend::new(&server.uri(), Duration::from_secs(2)).unwrap();
        let err = backend.start_buffer().await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // Port 9 (discard) is not listening in test environments
        let backend = HttpCaptureBackend::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            backend.save_buffer().await,
            Err(Error::BackendUnavailable(_))
        ));
    }
}
