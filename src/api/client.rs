use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::ProgressBar;
use reqwest::header::{CONTENT_DISPOSITION, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::models::{RegenerateResponse, StatusResponse, TokenResponse};
use super::{
    ApiError, Artifact, AuthContext, Download, ExportFormat, GenerationRequest, JobHandle,
    JobService, PollResult, ScriptPage, ScriptQuery,
};
use crate::utils;

/// HTTP client for the transcription service REST API
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    auth: Arc<AuthContext>,
}

/// Error body used by the service: `{"detail": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Value,
}

impl ApiClient {
    /// Create a client for the API rooted at `base_url` (e.g. `http://host/api/v1`)
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        auth: Arc<AuthContext>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn auth(&self) -> &Arc<AuthContext> {
        &self.auth
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a request with the stored bearer token attached
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header(USER_AGENT, concat!("scriptgen/", env!("CARGO_PKG_VERSION")));

        match self.auth.get() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and map non-success responses to [`ApiError`]
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let detail = Self::error_detail(response).await;

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("Service rejected credentials; clearing stored token");
            self.auth.clear();
            return Err(ApiError::Unauthorized { detail });
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        })
    }

    /// `detail` of a `{"detail": ...}` error body, as text
    async fn error_detail(response: Response) -> Option<String> {
        let body = response.json::<ErrorBody>().await.ok()?;
        match body.detail {
            Value::String(text) => Some(text),
            other => Some(other.to_string()),
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Protocol(e.to_string()))
    }

    /// Exchange credentials for a token and remember it
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        tracing::info!("Logging in as {}", email);

        let response = self
            .send(
                self.request(Method::POST, "/users/login")
                    .form(&[("username", email), ("password", password)]),
            )
            .await?;

        let token: TokenResponse = Self::json(response).await?;
        self.auth
            .set(token.access_token)
            .map_err(|e| ApiError::Protocol(format!("{:#}", e)))?;

        Ok(())
    }

    /// One page of the user's scripts, newest first
    pub async fn list_scripts(&self, query: &ScriptQuery) -> Result<ScriptPage, ApiError> {
        tracing::debug!(page = query.page, "Listing scripts");

        let response = self
            .send(self.request(Method::GET, "/scripts/").query(&query.params()))
            .await?;

        Self::json(response).await
    }

    /// Re-queue a failed script; returns the new job handle
    pub async fn regenerate(&self, script_id: &str) -> Result<JobHandle, ApiError> {
        let path = format!("/scripts/{}/regenerate", urlencoding::encode(script_id));
        tracing::info!("Re-queueing script {}", script_id);

        let response = self.send(self.request(Method::POST, &path)).await?;
        let body: RegenerateResponse = Self::json(response).await?;

        Ok(JobHandle::new(body.task_id).with_script_id(script_id))
    }

    /// Download a script in the requested format, reporting byte progress
    pub async fn download(
        &self,
        script_id: &str,
        format: ExportFormat,
        progress: &ProgressBar,
    ) -> Result<Download, ApiError> {
        let path = format!("/scripts/{}/download", urlencoding::encode(script_id));
        tracing::info!("Downloading script {} as {}", script_id, format);

        let response = self
            .send(
                self.request(Method::GET, &path)
                    .query(&[("format", format.as_str())]),
            )
            .await?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(utils::filename_from_content_disposition)
            .unwrap_or_else(|| utils::default_download_filename(script_id, format));

        progress.set_length(response.content_length().unwrap_or(0));

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            bytes.extend_from_slice(&chunk);
            progress.set_position(bytes.len() as u64);
        }

        Ok(Download { filename, bytes })
    }
}

#[async_trait]
impl JobService for ApiClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle, ApiError> {
        tracing::debug!("Submitting {}", request.video_url);

        let response = self
            .send(self.request(Method::POST, "/transcribe/").json(request))
            .await?;

        Self::json(response).await
    }

    async fn poll_status(&self, task_id: &str) -> Result<PollResult, ApiError> {
        let path = format!("/transcribe/status/{}", urlencoding::encode(task_id));

        let response = self.send(self.request(Method::GET, &path)).await?;
        let raw: StatusResponse = Self::json(response).await?;

        PollResult::try_from(raw)
    }

    async fn fetch_artifact(&self, script_id: &str) -> Result<Artifact, ApiError> {
        let path = format!("/scripts/{}", urlencoding::encode(script_id));

        let response = self.send(self.request(Method::GET, &path)).await?;
        Self::json(response).await
    }
}
