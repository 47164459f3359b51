use std::future::Future;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::header::HeaderValue;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServerConfig;

/// Header carrying the byte offset of a chunk within the ciphertext.
pub const OFFSET_HEADER: &str = "X-Upload-Offset";

/// Long-lived user credential, attached to key fetch, init and listing calls.
#[derive(Clone, PartialEq, Eq)]
pub struct UserToken(String);

/// Short-lived credential scoped to one upload session, used for chunk and
/// complete calls only.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl UserToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token can be sent as a bearer credential at all.
    pub fn is_valid_header(&self) -> bool {
        HeaderValue::from_str(&self.0).is_ok()
    }
}

impl std::fmt::Debug for UserToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UserToken([REDACTED])")
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

// --- Request/Response types matching the recordings API ---

/// `GET crypto/public-key`
#[derive(Debug, Clone, Deserialize)]
pub struct PublicKeyResponse {
    pub pem: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    pub enc: Option<String>,
    pub kty: Option<String>,
}

/// Metadata sent with `POST recordings/init`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingMetadata {
    pub pseudonym: String,
    pub task_id: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub length_seconds: f64,
    pub client_snr: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoInfo {
    pub alg: Option<String>,
    pub enc: Option<String>,
    pub kid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitResponse {
    pub upload_id: String,
    pub upload_token: SessionToken,
    pub max_chunk_size: Option<u64>,
    pub crypto: Option<CryptoInfo>,
}

/// Body of `POST recordings/{id}/complete`: the digital envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompleteRequest {
    pub expected_sha256: String,
    pub wrapped_key: String,
    pub iv: String,
    pub tag: String,
    pub alg: String,
    pub enc: String,
    pub kid: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompleteResponse {
    pub status: String,
    pub snr: f64,
    pub recording_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingEntry {
    pub id: String,
    pub created_at: String,
    pub snr: Option<f64>,
    pub status: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub pages: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingsResponse {
    pub recordings: Vec<RecordingEntry>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// The calls the upload orchestrator makes. Implemented over HTTP by
/// [`ApiClient`]; tests substitute their own.
pub trait RecordingsApi: Send + Sync {
    fn public_key(&self) -> impl Future<Output = Result<PublicKeyResponse, ApiError>> + Send;

    fn init(
        &self,
        metadata: &RecordingMetadata,
    ) -> impl Future<Output = Result<InitResponse, ApiError>> + Send;

    fn chunk(
        &self,
        upload_id: &str,
        token: &SessionToken,
        offset: u64,
        part_index: usize,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn complete(
        &self,
        upload_id: &str,
        token: &SessionToken,
        body: &CompleteRequest,
    ) -> impl Future<Output = Result<CompleteResponse, ApiError>> + Send;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    user_token: Option<UserToken>,
}

impl ApiClient {
    pub fn from_config(
        config: &ServerConfig,
        user_token: Option<UserToken>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ApiError::Transport)?;

        Self::with_client(client, &config.endpoint, user_token)
    }

    pub fn with_client(
        client: Client,
        endpoint: &str,
        user_token: Option<UserToken>,
    ) -> Result<Self, ApiError> {
        let invalid = || ApiError::InvalidEndpoint(endpoint.to_string());
        let mut base_url = Url::parse(endpoint).map_err(|_| invalid())?;
        base_url
            .path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty();

        Ok(Self {
            client,
            base_url,
            user_token,
        })
    }

    /// Endpoint URL with each of `segments` appended as one escaped path segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Base URLs are checked in `with_client`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    /// Request authorized with the user credential, when one is configured.
    fn user_request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let req = self.client.request(method, self.url(segments));
        match &self.user_token {
            Some(token) => req.bearer_auth(token.expose()),
            None => req,
        }
    }

    /// Request authorized with a session token. Never carries the user credential.
    fn session_request(
        &self,
        method: Method,
        segments: &[&str],
        token: &SessionToken,
    ) -> RequestBuilder {
        self.client
            .request(method, self.url(segments))
            .bearer_auth(token.expose())
    }

    /// GET recordings: the user's uploaded recordings.
    pub async fn list_recordings(&self) -> Result<RecordingsResponse, ApiError> {
        let resp = self
            .user_request(Method::GET, &["recordings"])
            .send()
            .await
            .map_err(ApiError::Transport)?;

        let resp = Self::check_response(resp).await?;
        resp.json().await.map_err(ApiError::Decode)
    }

    /// Check HTTP response status; keep the body of failures for diagnostics.
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Status { status, body })
    }
}

impl RecordingsApi for ApiClient {
    /// GET crypto/public-key: the server's current wrapping key.
    async fn public_key(&self) -> Result<PublicKeyResponse, ApiError> {
        let resp = self
            .user_request(Method::GET, &["crypto", "public-key"])
            .send()
            .await
            .map_err(ApiError::Transport)?;

        let resp = Self::check_response(resp).await?;
        resp.json().await.map_err(ApiError::Decode)
    }

    /// POST recordings/init: opens an upload session.
    async fn init(&self, metadata: &RecordingMetadata) -> Result<InitResponse, ApiError> {
        let resp = self
            .user_request(Method::POST, &["recordings", "init"])
            .json(metadata)
            .send()
            .await
            .map_err(ApiError::Transport)?;

        let resp = Self::check_response(resp).await?;
        resp.json().await.map_err(ApiError::Decode)
    }

    /// POST recordings/{id}/chunk: one ciphertext segment as multipart part `chunk`.
    async fn chunk(
        &self,
        upload_id: &str,
        token: &SessionToken,
        offset: u64,
        part_index: usize,
        bytes: Vec<u8>,
    ) -> Result<(), ApiError> {
        let part = Part::bytes(bytes).file_name(format!("part_{part_index:06}.bin"));
        let form = Form::new().part("chunk", part);

        let resp = self
            .session_request(Method::POST, &["recordings", upload_id, "chunk"], token)
            .header(OFFSET_HEADER, offset)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::Transport)?;

        Self::check_response(resp).await?;
        Ok(())
    }

    /// POST recordings/{id}/complete: hands over the digital envelope.
    async fn complete(
        &self,
        upload_id: &str,
        token: &SessionToken,
        body: &CompleteRequest,
    ) -> Result<CompleteResponse, ApiError> {
        let resp = self
            .session_request(Method::POST, &["recordings", upload_id, "complete"], token)
            .json(body)
            .send()
            .await
            .map_err(ApiError::Transport)?;

        let resp = Self::check_response(resp).await?;
        resp.json().await.map_err(ApiError::Decode)
    }
}
