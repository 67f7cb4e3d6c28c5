//! Streamer management REST endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::AppState;
use crate::db::StreamerRecord;

#[derive(Debug, Serialize)]
pub struct StreamerResponse {
    pub id: i64,
    pub handle: String,
    pub twitch_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl From<StreamerRecord> for StreamerResponse {
    fn from(streamer: StreamerRecord) -> Self {
        Self {
            id: streamer.id,
            handle: streamer.handle,
            twitch_user_id: streamer.twitch_user_id,
            created_at: streamer.created_at,
            last_checked: streamer.last_checked,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddStreamerRequest {
    pub handle: String,
}

#[derive(Debug, Serialize)]
pub struct AddStreamerResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streamer: Option<StreamerResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// List all tracked streamers
async fn list_streamers(
    State(state): State<AppState>,
) -> Result<Json<Vec<StreamerResponse>>, StatusCode> {
    match state.db.streamers().list_all().await {
        Ok(streamers) => Ok(Json(streamers.into_iter().map(|s| s.into()).collect())),
        Err(e) => {
            error!(error = %e, "Failed to list streamers");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Start tracking a handle. The worker picks the new streamer up on its
/// next cycle; nothing is fetched inline.
async fn add_streamer(
    State(state): State<AppState>,
    Json(body): Json<AddStreamerRequest>,
) -> (StatusCode, Json<AddStreamerResponse>) {
    let handle = body.handle.trim();
    if handle.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(AddStreamerResponse {
                success: false,
                streamer: None,
                error: Some("Handle must not be empty".to_string()),
            }),
        );
    }

    match state.db.streamers().create(handle).await {
        Ok(Some(streamer)) => (
            StatusCode::CREATED,
            Json(AddStreamerResponse {
                success: true,
                streamer: Some(streamer.into()),
                error: None,
            }),
        ),
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(AddStreamerResponse {
                success: false,
                streamer: None,
                error: Some(format!("'{handle}' is already tracked")),
            }),
        ),
        Err(e) => {
            error!(error = %e, "Failed to add streamer");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AddStreamerResponse {
                    success: false,
                    streamer: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Stop tracking a streamer, removing their recorded VODs as well
async fn remove_streamer(State(state): State<AppState>, Path(id): Path<i64>) -> StatusCode {
    match state.db.streamers().delete(id).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!(error = %e, "Failed to remove streamer");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/streamers", get(list_streamers).post(add_streamer))
        .route("/streamers/{id}", delete(remove_streamer))
}
