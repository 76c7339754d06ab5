//! Scoring backend
//!
//! Small JSON API under `/api`: public score submission and leaderboard,
//! the event deadline, and key-guarded admin routes.

pub mod store;

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::api::{
    AdminConfigRequest, AdminConfigResponse, AdminScoresResponse, ConfigResponse, ErrorBody,
    LeaderboardEntry, MeResponse, ResetResponse, ScoreRequest, SubmitResponse, parse_limit,
};
use crate::persistence::PersistenceError;
use crate::settings::ServerSettings;

pub use store::{Invalid, ScoreRecord, ScoreStore, Submitted};

type Params = Query<HashMap<String, String>>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    InvalidJson,
    #[error("{}", .0.message())]
    Invalid(Invalid),
    #[error("deadlineUtc is required (ISO-8601 UTC string)")]
    MissingDeadline,
    #[error("deadlineUtc is not a valid ISO-8601 date")]
    BadDeadline,
    #[error("Unauthorized")]
    Unauthorized,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(_: JsonRejection) -> Self {
        ApiError::InvalidJson
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<ScoreStore>>,
    admin_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: ScoreStore, admin_key: Option<String>) -> Self {
        if admin_key.is_none() {
            log::warn!("No admin key configured, admin routes are disabled");
        }
        Self {
            store: Arc::new(Mutex::new(store)),
            admin_key: admin_key.map(Arc::from),
        }
    }

    /// Open the configured store (or an in-memory one)
    pub fn from_settings(settings: &ServerSettings) -> Result<Self, PersistenceError> {
        let store = match &settings.store_path {
            Some(path) => ScoreStore::open(path)?,
            None => ScoreStore::new(),
        };
        Ok(Self::new(store, settings.admin_key.clone()))
    }

    fn store(&self) -> MutexGuard<'_, ScoreStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn authorize(&self, params: &HashMap<String, String>) -> Result<(), ApiError> {
        match (&self.admin_key, params.get("key")) {
            (Some(expected), Some(given)) if given.as_str() == &**expected => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn submit_score(
    State(state): State<AppState>,
    body: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(request) = body?;
    let outcome = state
        .store()
        .submit(&request, Utc::now())
        .map_err(ApiError::Invalid)?;

    let (status, message, best_score) = match outcome {
        Submitted::Created => (StatusCode::CREATED, "Score submitted!", None),
        Submitted::Improved => (StatusCode::OK, "New personal best!", None),
        Submitted::Kept { best } => (
            StatusCode::OK,
            "Score submitted but your previous best was higher",
            Some(best),
        ),
    };
    Ok((
        status,
        Json(SubmitResponse {
            success: true,
            message: message.to_string(),
            best_score,
        }),
    ))
}

async fn top_scores(State(state): State<AppState>, Query(params): Params) -> Json<Vec<LeaderboardEntry>> {
    let limit = parse_limit(params.get("limit").map(String::as_str));
    Json(state.store().top(limit))
}

async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        server_time_utc: Utc::now(),
        deadline_utc: state.store().deadline(),
    })
}

async fn me(State(state): State<AppState>, Query(params): Params) -> Json<MeResponse> {
    Json(state.store().me(params.get("deviceId").map(String::as_str)))
}

async fn admin_scores(
    State(state): State<AppState>,
    Query(params): Params,
) -> Result<Json<AdminScoresResponse>, ApiError> {
    state.authorize(&params)?;
    Ok(Json(state.store().admin_listing()))
}

async fn admin_reset(
    State(state): State<AppState>,
    Query(params): Params,
) -> Result<Json<ResetResponse>, ApiError> {
    state.authorize(&params)?;
    let deleted_count = state.store().clear();
    Ok(Json(ResetResponse {
        success: true,
        deleted_count,
    }))
}

async fn admin_config(
    State(state): State<AppState>,
    Query(params): Params,
    body: Result<Json<AdminConfigRequest>, JsonRejection>,
) -> Result<Json<AdminConfigResponse>, ApiError> {
    state.authorize(&params)?;
    let Json(request) = body?;
    let deadline = parse_deadline(request.deadline_utc.as_deref())?;
    state.store().set_deadline(deadline);
    Ok(Json(AdminConfigResponse {
        success: true,
        deadline_utc: deadline,
    }))
}

/// RFC 3339 with any offset, normalized to UTC
fn parse_deadline(raw: Option<&str>) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(ApiError::MissingDeadline)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ApiError::BadDeadline)
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/scores", get(top_scores).post(submit_score))
        .route("/api/config", get(config))
        .route("/api/me", get(me))
        .route("/api/admin/scores", get(admin_scores).delete(admin_reset))
        .route("/api/admin/config", post(admin_config))
        .with_state(state)
        .layer(cors)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    log::info!("Scoring backend listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app() -> Router {
        router(AppState::new(ScoreStore::new(), Some("sesame".into())))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn post_score(app: &Router, body: Value) -> (StatusCode, Value) {
        let (status, bytes) = call(app, Method::POST, "/api/scores", Some(&body.to_string())).await;
        (status, parse(&bytes))
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, bytes) = call(&app(), Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"ok");
    }

    #[tokio::test]
    async fn submission_lifecycle() {
        let app = app();

        let (status, body) = post_score(&app, json!({"name": "Ada", "score": 100, "deviceId": "d1"})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Score submitted!");

        let (status, body) = post_score(&app, json!({"name": "Ada", "score": 60, "deviceId": "d1"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bestScore"], 100);

        let (status, body) = post_score(&app, json!({"name": "Ada", "score": 250, "deviceId": "d1"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "New personal best!");
        assert!(body.get("bestScore").is_none());

        let (_, bytes) = call(&app, Method::GET, "/api/me?deviceId=d1", None).await;
        let me: MeResponse = parse(&bytes);
        assert_eq!(me.score, Some(250));
    }

    #[tokio::test]
    async fn bad_submissions_are_client_errors() {
        let app = app();

        let (status, bytes) = call(&app, Method::POST, "/api/scores", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(parse::<ErrorBody>(&bytes).error, "Invalid JSON");

        let (status, body) = post_score(&app, json!({"name": "Ada", "score": 0})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Name and positive score required");

        let (status, body) = post_score(&app, json!({"score": 10})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Name and positive score required");

        let long = "n".repeat(31);
        let (status, body) = post_score(&app, json!({"name": long, "score": 10})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Name too long (max 30 chars)");

        let (_, bytes) = call(&app, Method::GET, "/api/scores", None).await;
        assert!(parse::<Vec<LeaderboardEntry>>(&bytes).is_empty());
    }

    #[tokio::test]
    async fn leaderboard_limit_is_clamped() {
        let app = app();
        for i in 1..=7 {
            post_score(&app, json!({"name": format!("p{i}"), "score": i * 10})).await;
        }

        let (_, bytes) = call(&app, Method::GET, "/api/scores", None).await;
        let top: Vec<LeaderboardEntry> = parse(&bytes);
        assert_eq!(top.len(), 5);
        assert_eq!(top[0].score, 70);

        let (_, bytes) = call(&app, Method::GET, "/api/scores?limit=0", None).await;
        assert_eq!(parse::<Vec<LeaderboardEntry>>(&bytes).len(), 1);

        let (_, bytes) = call(&app, Method::GET, "/api/scores?limit=bogus", None).await;
        assert_eq!(parse::<Vec<LeaderboardEntry>>(&bytes).len(), 5);
    }

    #[tokio::test]
    async fn admin_routes_need_the_key() {
        let app = app();
        post_score(&app, json!({"name": "Ada", "score": 5, "deviceId": "d1"})).await;

        for uri in ["/api/admin/scores", "/api/admin/scores?key=wrong"] {
            let (status, bytes) = call(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(parse::<ErrorBody>(&bytes).error, "Unauthorized");
        }

        let (status, bytes) = call(&app, Method::GET, "/api/admin/scores?key=sesame", None).await;
        assert_eq!(status, StatusCode::OK);
        let listing: AdminScoresResponse = parse(&bytes);
        assert_eq!(listing.total_submissions, 1);
        assert_eq!(listing.scores[0].device_id.as_deref(), Some("d1"));

        let (status, bytes) = call(&app, Method::DELETE, "/api/admin/scores?key=sesame", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse::<ResetResponse>(&bytes).deleted_count, 1);
    }

    #[tokio::test]
    async fn admin_is_refused_without_configured_key() {
        let app = router(AppState::new(ScoreStore::new(), None));
        let (status, _) = call(&app, Method::GET, "/api/admin/scores?key=", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn deadline_round_trip() {
        let app = app();

        let (_, bytes) = call(&app, Method::GET, "/api/config", None).await;
        assert_eq!(parse::<ConfigResponse>(&bytes).deadline_utc, None);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/admin/config?key=sesame",
            Some(r#"{"deadlineUtc":"2026-06-15T22:00:00+02:00"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let set: AdminConfigResponse = parse(&body);
        assert_eq!(set.deadline_utc.to_rfc3339(), "2026-06-15T20:00:00+00:00");

        let (_, bytes) = call(&app, Method::GET, "/api/config", None).await;
        assert_eq!(parse::<ConfigResponse>(&bytes).deadline_utc, Some(set.deadline_utc));

        let (status, bytes) = call(
            &app,
            Method::POST,
            "/api/admin/config?key=sesame",
            Some(r#"{"deadlineUtc":"next tuesday"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            parse::<ErrorBody>(&bytes).error,
            "deadlineUtc is not a valid ISO-8601 date"
        );

        let (status, _) = call(&app, Method::POST, "/api/admin/config?key=sesame", Some("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn client_talks_to_a_live_server() {
        use crate::submission::{ApiClient, HttpReporter, ScoreReporter};
        use tokio::runtime::Handle;
        use tokio::sync::oneshot;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let state = AppState::new(ScoreStore::new(), None);
        let server = tokio::spawn(serve(listener, state, async move {
            let _ = stop_rx.await;
        }));

        let client = ApiClient::new(&format!("http://{addr}/api")).unwrap();
        let offline = std::env::temp_dir()
            .join(format!("the-grind-live-{}", std::process::id()))
            .join("offline.json");
        let mut reporter = HttpReporter::new(client.clone(), Handle::current(), &offline)
            .with_device_id(Some("dev-live".into()));
        reporter.report("Ada", 321);
        reporter.flush().await;

        let top = client.fetch_top_scores(5).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].score, 321);
        let me = client.fetch_me("dev-live").await.unwrap();
        assert!(me.found);
        assert!(client.fetch_config().await.unwrap().deadline_utc.is_none());

        drop(reporter);
        drop(client);
        let _ = stop_tx.send(());
        server.await.unwrap().unwrap();
    }
}
