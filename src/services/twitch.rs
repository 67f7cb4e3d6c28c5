//! Twitch Helix API client
//!
//! Authenticates with an app access token (client-credentials grant) and
//! exposes the two lookups the ingestion worker needs: login handle to
//! user id, and the most recent archived broadcasts for a user id. The
//! token is cached until shortly before expiry; a 300 second safety
//! margin keeps a cycle from running into an edge-of-expiry rejection.

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::services::duration::parse_duration;

const AUTH_BASE_URL: &str = "https://id.twitch.tv";
const API_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Slack subtracted from the reported token lifetime before refreshing.
const TOKEN_SAFETY_MARGIN_SECS: i64 = 300;

/// Wire format of video creation timestamps.
const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// How many videos to request per poll. Twitch caps a page at 100; the
/// ingestion design only ever looks at the most recent handful.
const RECENT_PAGE_SIZE: &str = "20";

/// Errors surfaced by Twitch calls. None are fatal to the ingestion
/// loop; the worker decides at each call site whether to skip an item,
/// an account, or the rest of the cycle.
#[derive(Debug, Error)]
pub enum TwitchError {
    /// Credential exchange failed, or Twitch rejected our authorization
    #[error("Twitch authorization failed: {0}")]
    Auth(String),

    /// Transport-level failure (timeout, connect, unreadable body)
    #[error("Twitch request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Twitch answered with an unexpected status (rate limit, 5xx)
    #[error("Twitch returned status {0}")]
    Upstream(StatusCode),

    /// A video carried a creation timestamp outside the wire format
    #[error("Unrecognized timestamp {value:?} in video metadata")]
    MalformedTimestamp { value: String },

    /// A video carried a duration so large no end time can be placed
    #[error("Duration of {seconds}s in video metadata puts the end time out of range")]
    OversizedDuration { seconds: i64 },
}

/// User entry from the Helix users endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TwitchUser {
    pub id: String,
    pub login: String,
}

/// Video entry from the Helix videos endpoint, kept raw. Timing fields
/// are normalized separately via [`derive_timing`].
#[derive(Debug, Clone, Deserialize)]
pub struct TwitchVideo {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration: String,
    pub created_at: String,
}

/// Helix wraps every payload in a `data` array
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Normalized timing derived from a video's raw metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VodTiming {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

/// Twitch Helix client with a cached app access token
pub struct TwitchClient {
    client: Client,
    client_id: String,
    client_secret: String,
    auth_base_url: String,
    api_base_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl TwitchClient {
    pub fn new(client_id: String, client_secret: String) -> anyhow::Result<Self> {
        Self::with_base_urls(
            client_id,
            client_secret,
            AUTH_BASE_URL.to_string(),
            API_BASE_URL.to_string(),
        )
    }

    /// Build a client against alternate endpoints, letting tests point
    /// at a local stand-in server.
    pub fn with_base_urls(
        client_id: String,
        client_secret: String,
        auth_base_url: String,
        api_base_url: String,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("vodforge/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            auth_base_url,
            api_base_url,
            token: Mutex::new(None),
        })
    }

    /// Return a usable app access token, performing a client-credentials
    /// exchange when the cached one is missing or inside the safety
    /// margin before expiry.
    async fn ensure_token(&self) -> Result<String, TwitchError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref()
            && (token.expires_at - Utc::now()).num_seconds() > TOKEN_SAFETY_MARGIN_SECS
        {
            return Ok(token.access_token.clone());
        }

        debug!("Requesting new Twitch app access token");
        let response = self
            .client
            .post(format!("{}/oauth2/token", self.auth_base_url))
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TwitchError::Auth(format!(
                "token exchange returned status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = chrono::Duration::try_seconds(token.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                TwitchError::Auth(format!(
                    "token exchange returned implausible expires_in {}",
                    token.expires_in
                ))
            })?;
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });

        Ok(access_token)
    }

    async fn helix_get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, TwitchError> {
        let token = self.ensure_token().await?;

        let response = self
            .client
            .get(format!("{}{}", self.api_base_url, path))
            .header("Client-Id", &self.client_id)
            .bearer_auth(&token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TwitchError::Auth(format!(
                "{} returned status {}",
                path, status
            )));
        }
        Err(TwitchError::Upstream(status))
    }

    /// Look up the stable user id behind a login handle.
    ///
    /// A handle with no matching account yields `None`: typo'd or
    /// not-yet-created accounts are an expected condition, not an error.
    pub async fn resolve_user_id(&self, login: &str) -> Result<Option<String>, TwitchError> {
        let response = self.helix_get("/users", &[("login", login)]).await?;
        let body: DataEnvelope<TwitchUser> = response.json().await?;

        let user = body.data.into_iter().next();
        if let Some(user) = &user {
            debug!(login = %user.login, user_id = %user.id, "Resolved Twitch user");
        }
        Ok(user.map(|u| u.id))
    }

    /// List the most recent completed broadcasts for a user.
    ///
    /// The archive type filter is applied by Twitch itself, so
    /// highlights, uploads and clips never reach us.
    pub async fn recent_broadcasts(&self, user_id: &str) -> Result<Vec<TwitchVideo>, TwitchError> {
        let response = self
            .helix_get(
                "/videos",
                &[
                    ("user_id", user_id),
                    ("first", RECENT_PAGE_SIZE),
                    ("type", "archive"),
                ],
            )
            .await?;
        let body: DataEnvelope<TwitchVideo> = response.json().await?;

        debug!(user_id = %user_id, count = body.data.len(), "Twitch returned videos");
        Ok(body.data)
    }
}

/// Normalize a video's raw timestamp and duration token into
/// start/end/duration fields.
///
/// The creation timestamp must match the wire format exactly, and the
/// duration must place the end time inside the representable date range;
/// either failure fails that single video, never the batch it arrived in.
pub fn derive_timing(created_at: &str, duration: &str) -> Result<VodTiming, TwitchError> {
    let started_at = NaiveDateTime::parse_from_str(created_at, CREATED_AT_FORMAT)
        .map_err(|_| TwitchError::MalformedTimestamp {
            value: created_at.to_string(),
        })?
        .and_utc();

    let duration_seconds = parse_duration(duration);
    let ended_at = chrono::Duration::try_seconds(duration_seconds)
        .and_then(|length| started_at.checked_add_signed(length))
        .ok_or(TwitchError::OversizedDuration {
            seconds: duration_seconds,
        })?;

    Ok(VodTiming {
        started_at,
        ended_at,
        duration_seconds,
    })
}

#[cfg(test)]
pub(crate) mod helix_mock {
    //! In-process stand-in for the Twitch endpoints used by tests

    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};

    struct Inner {
        users: HashMap<String, String>,
        videos: HashMap<String, Value>,
        failing_user_ids: HashSet<String>,
        reject_token: bool,
        expires_in: i64,
        token_hits: AtomicUsize,
        video_hits: AtomicUsize,
    }

    /// Builder for a mock Helix server
    pub(crate) struct MockHelix {
        users: HashMap<String, String>,
        videos: HashMap<String, Value>,
        failing_user_ids: HashSet<String>,
        reject_token: bool,
        expires_in: i64,
    }

    /// A running mock server bound to an ephemeral local port
    pub(crate) struct MockServer {
        pub base_url: String,
        state: Arc<Inner>,
    }

    impl MockHelix {
        pub fn new() -> Self {
            Self {
                users: HashMap::new(),
                videos: HashMap::new(),
                failing_user_ids: HashSet::new(),
                reject_token: false,
                expires_in: 4000,
            }
        }

        /// Register a login -> user id mapping
        pub fn user(mut self, login: &str, id: &str) -> Self {
            self.users.insert(login.to_string(), id.to_string());
            self
        }

        /// Set the `data` array the videos endpoint returns for a user id
        pub fn videos(mut self, user_id: &str, data: Value) -> Self {
            self.videos.insert(user_id.to_string(), data);
            self
        }

        /// Make the videos endpoint return 500 for a user id
        pub fn failing_user(mut self, user_id: &str) -> Self {
            self.failing_user_ids.insert(user_id.to_string());
            self
        }

        /// Make the token endpoint reject every exchange
        pub fn reject_token(mut self) -> Self {
            self.reject_token = true;
            self
        }

        /// Token lifetime reported by the mock exchange
        pub fn expires_in(mut self, secs: i64) -> Self {
            self.expires_in = secs;
            self
        }

        pub async fn spawn(self) -> MockServer {
            let state = Arc::new(Inner {
                users: self.users,
                videos: self.videos,
                failing_user_ids: self.failing_user_ids,
                reject_token: self.reject_token,
                expires_in: self.expires_in,
                token_hits: AtomicUsize::new(0),
                video_hits: AtomicUsize::new(0),
            });

            let app = Router::new()
                .route("/oauth2/token", post(token_endpoint))
                .route("/users", get(users_endpoint))
                .route("/videos", get(videos_endpoint))
                .with_state(state.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            MockServer { base_url, state }
        }
    }

    impl MockServer {
        pub fn token_hits(&self) -> usize {
            self.state.token_hits.load(Ordering::SeqCst)
        }

        pub fn video_hits(&self) -> usize {
            self.state.video_hits.load(Ordering::SeqCst)
        }
    }

    async fn token_endpoint(State(state): State<Arc<Inner>>) -> Response {
        state.token_hits.fetch_add(1, Ordering::SeqCst);
        if state.reject_token {
            return StatusCode::FORBIDDEN.into_response();
        }
        Json(json!({ "access_token": "mock-token", "expires_in": state.expires_in }))
            .into_response()
    }

    async fn users_endpoint(
        State(state): State<Arc<Inner>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let found = params
            .get("login")
            .and_then(|login| state.users.get(login).map(|id| (login.clone(), id.clone())));

        match found {
            Some((login, id)) => Json(json!({ "data": [{ "id": id, "login": login }] })),
            None => Json(json!({ "data": [] })),
        }
    }

    async fn videos_endpoint(
        State(state): State<Arc<Inner>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        state.video_hits.fetch_add(1, Ordering::SeqCst);

        let user_id = params.get("user_id").cloned().unwrap_or_default();
        if state.failing_user_ids.contains(&user_id) {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }

        let data = state.videos.get(&user_id).cloned().unwrap_or_else(|| json!([]));
        Json(json!({ "data": data })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::helix_mock::{MockHelix, MockServer};
    use super::*;

    fn client_for(server: &MockServer) -> TwitchClient {
        TwitchClient::with_base_urls(
            "test-client-id".to_string(),
            "test-client-secret".to_string(),
            server.base_url.clone(),
            server.base_url.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_derive_timing_computes_end() {
        let timing = derive_timing("2024-01-01T10:00:00Z", "1h30m0s").unwrap();
        assert_eq!(timing.duration_seconds, 5400);
        assert_eq!(timing.started_at.to_rfc3339(), "2024-01-01T10:00:00+00:00");
        assert_eq!(timing.ended_at.to_rfc3339(), "2024-01-01T11:30:00+00:00");
    }

    #[test]
    fn test_derive_timing_zero_duration() {
        let timing = derive_timing("2024-01-01T10:00:00Z", "").unwrap();
        assert_eq!(timing.duration_seconds, 0);
        assert_eq!(timing.started_at, timing.ended_at);
    }

    #[test]
    fn test_derive_timing_rejects_off_format_timestamps() {
        // Only the exact wire format passes; close variants do not
        for bad in [
            "2024-01-01 10:00:00",
            "2024-01-01T10:00:00.123Z",
            "2024-01-01T10:00:00+00:00",
            "not-a-timestamp",
            "",
        ] {
            let err = derive_timing(bad, "1h").unwrap_err();
            assert_matches!(err, TwitchError::MalformedTimestamp { value } if value == bad);
        }
    }

    #[test]
    fn test_derive_timing_rejects_oversized_durations() {
        // Grammatical tokens whose length cannot be added to any start time
        for huge in ["9999999999h", "99999999999999999999h"] {
            let err = derive_timing("2024-01-01T10:00:00Z", huge).unwrap_err();
            assert_matches!(err, TwitchError::OversizedDuration { .. });
        }
    }

    #[test]
    fn test_derive_timing_accepts_long_but_sane_durations() {
        let timing = derive_timing("2024-01-01T10:00:00Z", "1000h").unwrap();
        assert_eq!(timing.duration_seconds, 3_600_000);
        assert_eq!(timing.ended_at.to_rfc3339(), "2024-02-12T02:00:00+00:00");
    }

    #[tokio::test]
    async fn test_token_cached_across_calls() {
        let server = MockHelix::new().user("pokimane", "44445592").spawn().await;
        let client = client_for(&server);

        client.resolve_user_id("pokimane").await.unwrap();
        client.resolve_user_id("pokimane").await.unwrap();

        assert_eq!(server.token_hits(), 1);
    }

    #[tokio::test]
    async fn test_token_refreshed_inside_safety_margin() {
        // A lifetime of 300s is entirely consumed by the safety margin,
        // so every call has to exchange again
        let server = MockHelix::new()
            .user("pokimane", "44445592")
            .expires_in(300)
            .spawn()
            .await;
        let client = client_for(&server);

        client.resolve_user_id("pokimane").await.unwrap();
        client.resolve_user_id("pokimane").await.unwrap();

        assert_eq!(server.token_hits(), 2);
    }

    #[tokio::test]
    async fn test_failed_token_exchange_is_auth_error() {
        let server = MockHelix::new().reject_token().spawn().await;
        let client = client_for(&server);

        let err = client.resolve_user_id("anyone").await.unwrap_err();
        assert_matches!(err, TwitchError::Auth(_));
    }

    #[tokio::test]
    async fn test_implausible_token_lifetime_is_auth_error() {
        let server = MockHelix::new()
            .user("pokimane", "44445592")
            .expires_in(i64::MAX)
            .spawn()
            .await;
        let client = client_for(&server);

        let err = client.resolve_user_id("pokimane").await.unwrap_err();
        assert_matches!(err, TwitchError::Auth(_));
    }

    #[tokio::test]
    async fn test_resolve_unknown_handle_is_none() {
        let server = MockHelix::new().spawn().await;
        let client = client_for(&server);

        let resolved = client.resolve_user_id("no-such-login").await.unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn test_recent_broadcasts_deserializes() {
        let server = MockHelix::new()
            .videos(
                "44445592",
                json!([{
                    "id": "v2222222222",
                    "title": "Morning stream",
                    "url": "https://www.twitch.tv/videos/2222222222",
                    "duration": "2h5m",
                    "created_at": "2024-01-01T10:00:00Z"
                }]),
            )
            .spawn()
            .await;
        let client = client_for(&server);

        let videos = client.recent_broadcasts("44445592").await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "v2222222222");
        assert_eq!(videos[0].duration, "2h5m");
        assert_eq!(server.video_hits(), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_surfaces() {
        let server = MockHelix::new().failing_user("666").spawn().await;
        let client = client_for(&server);

        let err = client.recent_broadcasts("666").await.unwrap_err();
        assert_matches!(err, TwitchError::Upstream(status) if status == StatusCode::INTERNAL_SERVER_ERROR);
    }
}
