//! HTTP client for a remote text-to-speech server
//!
//! The server exposes `GET /health` for a connectivity probe and
//! `POST /synthesize` taking `{"text": ...}` and answering with the audio
//! body; the `Content-Type` names the format.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RemoteTtsError {
    /// The server answered with a non-success status
    #[error("{status_code}: {body}")]
    Api { status_code: u16, body: String },

    /// The configured URL is unusable
    #[error("{0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Client is closed")]
    Closed,
}

impl RemoteTtsError {
    /// Failures where the server (or the network to it) is at fault
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            RemoteTtsError::Api { .. } | RemoteTtsError::Http(_) | RemoteTtsError::Closed
        )
    }
}

/// Synthesized audio with its format tag
pub type Synthesized = (String, Vec<u8>);

#[async_trait]
pub trait RemoteTtsApi: Send + Sync {
    async fn verify_connection(&self) -> Result<(), RemoteTtsError>;

    async fn synthesize(&self, text: &str) -> Result<Synthesized, RemoteTtsError>;

    async fn close(&self);
}

/// Builds clients for flows and entry setup
pub trait RemoteTtsClientFactory: Send + Sync {
    fn create(&self, url: &str) -> Result<Arc<dyn RemoteTtsApi>, RemoteTtsError>;
}

#[derive(Debug, Default)]
pub struct HttpRemoteTtsClientFactory;

impl RemoteTtsClientFactory for HttpRemoteTtsClientFactory {
    fn create(&self, url: &str) -> Result<Arc<dyn RemoteTtsApi>, RemoteTtsError> {
        Ok(Arc::new(RemoteTtsClient::new(url)?))
    }
}

/// Parse a server base URL; relative or non-http URLs are rejected
pub fn parse_base_url(url: &str) -> Result<Url, RemoteTtsError> {
    let parsed = Url::parse(url.trim())
        .map_err(|_| RemoteTtsError::InvalidUrl(format!("URL must be absolute: {:?}", url)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
        return Err(RemoteTtsError::InvalidUrl(format!(
            "URL must be an absolute http(s) URL: {:?}",
            url
        )));
    }
    Ok(parsed)
}

/// Format tag for an audio `Content-Type`
pub fn audio_format(content_type: &str) -> String {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let subtype = mime.split_once('/').map(|(_, s)| s).unwrap_or(mime.as_str());
    match subtype {
        "wav" | "x-wav" | "wave" | "vnd.wave" => "wav".to_string(),
        "mpeg" | "mp3" => "mp3".to_string(),
        "ogg" | "opus" => "ogg".to_string(),
        other => other.to_string(),
    }
}

pub struct RemoteTtsClient {
    http: RwLock<Option<Client>>,
    base: Url,
}

impl RemoteTtsClient {
    pub fn new(url: &str) -> Result<Self, RemoteTtsError> {
        let base = parse_base_url(url)?;
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http: RwLock::new(Some(http)),
            base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), path)
    }

    async fn client(&self) -> Result<Client, RemoteTtsError> {
        self.http.read().await.clone().ok_or(RemoteTtsError::Closed)
    }
}

async fn api_error(response: reqwest::Response) -> RemoteTtsError {
    let status_code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    RemoteTtsError::Api { status_code, body }
}

#[async_trait]
impl RemoteTtsApi for RemoteTtsClient {
    async fn verify_connection(&self) -> Result<(), RemoteTtsError> {
        let response = self.client().await?.get(self.endpoint("health")).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        debug!("RemoteTTS server at {} is reachable", self.base);
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> Result<Synthesized, RemoteTtsError> {
        trace!("Synthesizing {} chars", text.len());
        let response = self
            .client()
            .await?
            .post(self.endpoint("synthesize"))
            .json(&json!({ "text": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let format = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(audio_format)
            .unwrap_or_else(|| "wav".to_string());
        let audio = response.bytes().await?.to_vec();
        Ok((format, audio))
    }

    async fn close(&self) {
        self.http.write().await.take();
    }
}

impl std::fmt::Debug for RemoteTtsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTtsClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_relative_url() {
        assert!(matches!(
            RemoteTtsClient::new("tts.local/api"),
            Err(RemoteTtsError::InvalidUrl(_))
        ));
        assert!(matches!(
            RemoteTtsClient::new("ftp://tts.local"),
            Err(RemoteTtsError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_path() {
        let client = RemoteTtsClient::new("http://tts.local:5000/").unwrap();
        assert_eq!(client.endpoint("health"), "http://tts.local:5000/health");

        let nested = RemoteTtsClient::new("https://example.com/tts").unwrap();
        assert_eq!(nested.endpoint("synthesize"), "https://example.com/tts/synthesize");
    }

    #[test]
    fn test_audio_format() {
        assert_eq!(audio_format("audio/wav"), "wav");
        assert_eq!(audio_format("audio/x-wav"), "wav");
        assert_eq!(audio_format("audio/mpeg"), "mp3");
        assert_eq!(audio_format("audio/ogg; codecs=opus"), "ogg");
        assert_eq!(audio_format("audio/flac"), "flac");
    }

    #[test]
    fn test_api_error_display() {
        let err = RemoteTtsError::Api {
            status_code: 503,
            body: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "503: busy");
        assert!(err.is_api_error());
        assert!(!RemoteTtsError::InvalidUrl("x".to_string()).is_api_error());
    }

    #[tokio::test]
    async fn test_closed_client() {
        let client = RemoteTtsClient::new("http://tts.local").unwrap();
        client.close().await;
        assert!(matches!(
            client.verify_connection().await,
            Err(RemoteTtsError::Closed)
        ));
    }
}
