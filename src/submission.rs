//! Score submission
//!
//! The engine hands the finished run's score to a [`ScoreReporter`] exactly
//! once and moves on. Delivery happens in the background; if the backend
//! cannot be reached the score lands in the offline store instead.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::api::{ConfigResponse, LeaderboardEntry, MeResponse, ScoreRequest, SubmitResponse};
use crate::highscores::OfflineScores;

/// Receives the final score of a run. Must return without blocking.
pub trait ScoreReporter {
    fn report(&mut self, player_name: &str, score: u64);
}

impl<R: ScoreReporter + ?Sized> ScoreReporter for Box<R> {
    fn report(&mut self, player_name: &str, score: u64) {
        (**self).report(player_name, score)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid API url {0:?}")]
    InvalidUrl(String),
    #[error("could not build request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("transport failure: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("failed reading response body: {0}")]
    Body(#[from] hyper::Error),
    #[error("server answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// True when the request never got an answer from the server
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

/// What the backend did with a submitted score
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// 201 for a first submission, 200 otherwise
    pub status: StatusCode,
    pub response: SubmitResponse,
}

/// Thin JSON client for the scoring backend
#[derive(Clone)]
pub struct ApiClient {
    base: String,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl ApiClient {
    /// `base` is the API root, e.g. `http://127.0.0.1:7071/api`
    pub fn new(base: &str) -> Result<Self, ClientError> {
        let base = base.trim_end_matches('/').to_string();
        base.parse::<Uri>()
            .map_err(|_| ClientError::InvalidUrl(base.clone()))?;
        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self { base, client })
    }

    async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes), ClientError> {
        let url = format!("{}{}", self.base, path_and_query);
        let uri: Uri = url.parse().map_err(|_| ClientError::InvalidUrl(url.clone()))?;

        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder.body(Full::new(Bytes::from(body.unwrap_or_default())))?;

        let response = self.client.request(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok((status, bytes))
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T, ClientError> {
        let (status, bytes) = self.send(Method::GET, path_and_query, None).await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn submit_score(&self, request: &ScoreRequest) -> Result<SubmitOutcome, ClientError> {
        let body = serde_json::to_vec(request)?;
        let (status, bytes) = self.send(Method::POST, "/scores", Some(body)).await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(SubmitOutcome {
            status,
            response: serde_json::from_slice(&bytes)?,
        })
    }

    pub async fn fetch_top_scores(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, ClientError> {
        self.get_json(&format!("/scores?limit={limit}")).await
    }

    pub async fn fetch_config(&self) -> Result<ConfigResponse, ClientError> {
        self.get_json("/config").await
    }

    pub async fn fetch_me(&self, device_id: &str) -> Result<MeResponse, ClientError> {
        self.get_json(&format!("/me?deviceId={}", encode_query_value(device_id)))
            .await
    }

    /// Top scores from the backend, or from the offline store if that fails
    pub async fn leaderboard(&self, limit: usize, offline_path: &Path) -> Vec<LeaderboardEntry> {
        match self.fetch_top_scores(limit).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Leaderboard unavailable ({e}), showing offline scores");
                OfflineScores::load(offline_path).top(limit)
            }
        }
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Submit `request`, falling back to the offline store on transport failure
pub async fn deliver(client: &ApiClient, request: ScoreRequest, offline_path: &Path) {
    let name = request.name.clone().unwrap_or_default();
    let score = request.score.unwrap_or(0).max(0) as u64;

    match client.submit_score(&request).await {
        Ok(outcome) => {
            log::info!(
                "Score {score} for {name} submitted ({}): {}",
                outcome.status,
                outcome.response.message
            );
        }
        Err(e) if e.is_transport() => {
            log::warn!("Offline, score saved locally: {e}");
            OfflineScores::append_to(offline_path, &name, score, Utc::now());
        }
        Err(e) => log::error!("Submit failed: {e}"),
    }
}

/// Posts scores to the backend on a tokio runtime, fire-and-forget
#[derive(Clone)]
pub struct HttpReporter {
    client: ApiClient,
    runtime: Handle,
    device_id: Option<String>,
    event_code: Option<String>,
    offline_path: PathBuf,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl HttpReporter {
    pub fn new(client: ApiClient, runtime: Handle, offline_path: impl Into<PathBuf>) -> Self {
        Self {
            client,
            runtime,
            device_id: None,
            event_code: None,
            offline_path: offline_path.into(),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_device_id(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_event_code(mut self, event_code: Option<String>) -> Self {
        self.event_code = event_code;
        self
    }

    /// Wait for every submission started so far
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                log::warn!("Score submission task failed: {e}");
            }
        }
    }
}

impl ScoreReporter for HttpReporter {
    fn report(&mut self, player_name: &str, score: u64) {
        let request = ScoreRequest {
            name: Some(player_name.to_string()),
            score: Some(score.min(i64::MAX as u64) as i64),
            device_id: self.device_id.clone(),
            wedding_code: self.event_code.clone(),
        };
        let client = self.client.clone();
        let offline_path = self.offline_path.clone();
        let handle = self.runtime.spawn(async move {
            deliver(&client, request, &offline_path).await;
        });
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }
}

/// Records scores locally only, for play without a backend
#[derive(Debug, Clone)]
pub struct OfflineReporter {
    path: PathBuf,
}

impl OfflineReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScoreReporter for OfflineReporter {
    fn report(&mut self, player_name: &str, score: u64) {
        log::info!("Recording score {score} for {player_name} locally");
        OfflineScores::append_to(&self.path, player_name, score, Utc::now());
    }
}
