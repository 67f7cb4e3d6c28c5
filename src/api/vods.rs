//! VOD listing and triage REST endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::AppState;
use crate::db::{VodRecord, VodStatus, VodWithStreamer};
use crate::services::duration::format_duration;

#[derive(Debug, Serialize)]
pub struct VodResponse {
    pub id: i64,
    pub streamer_id: i64,
    pub streamer_handle: String,
    pub twitch_vod_id: String,
    pub title: String,
    pub url: String,
    pub duration_seconds: i64,
    pub duration: String,
    pub created_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub time_since: String,
    pub status: VodStatus,
    pub discovered_at: DateTime<Utc>,
}

impl VodResponse {
    fn from_joined(vod: VodWithStreamer, now: DateTime<Utc>) -> Self {
        Self {
            id: vod.id,
            streamer_id: vod.streamer_id,
            streamer_handle: vod.streamer_handle,
            twitch_vod_id: vod.twitch_vod_id,
            title: vod.title,
            url: vod.url,
            duration_seconds: vod.duration_seconds,
            duration: format_duration(vod.duration_seconds),
            created_at: vod.created_at,
            time_since: format_time_since(vod.ended_at, now),
            ended_at: vod.ended_at,
            status: vod.status,
            discovered_at: vod.discovered_at,
        }
    }

    fn from_record(vod: VodRecord, streamer_handle: String, now: DateTime<Utc>) -> Self {
        Self {
            id: vod.id,
            streamer_id: vod.streamer_id,
            streamer_handle,
            twitch_vod_id: vod.twitch_vod_id,
            title: vod.title,
            url: vod.url,
            duration_seconds: vod.duration_seconds,
            duration: format_duration(vod.duration_seconds),
            created_at: vod.created_at,
            time_since: format_time_since(vod.ended_at, now),
            ended_at: vod.ended_at,
            status: vod.status,
            discovered_at: vod.discovered_at,
        }
    }
}

/// Target status for a triage update. Unknown status values fail JSON
/// extraction and answer 422 before the handler runs.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: VodStatus,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VodStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// List every recorded VOD across all streamers, newest ending first
async fn list_vods(State(state): State<AppState>) -> Result<Json<Vec<VodResponse>>, StatusCode> {
    match state.db.vods().list_all().await {
        Ok(vods) => {
            let now = Utc::now();
            Ok(Json(
                vods.into_iter()
                    .map(|v| VodResponse::from_joined(v, now))
                    .collect(),
            ))
        }
        Err(e) => {
            error!(error = %e, "Failed to list VODs");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// List the recorded VODs of one streamer
async fn list_streamer_vods(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<VodResponse>>, StatusCode> {
    let streamer = match state.db.streamers().get_by_id(id).await {
        Ok(Some(streamer)) => streamer,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, "Failed to look up streamer");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    match state.db.vods().list_by_streamer(streamer.id).await {
        Ok(vods) => {
            let now = Utc::now();
            Ok(Json(
                vods.into_iter()
                    .map(|v| VodResponse::from_record(v, streamer.handle.clone(), now))
                    .collect(),
            ))
        }
        Err(e) => {
            error!(error = %e, "Failed to list streamer VODs");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Move a VOD to a new triage status
async fn update_vod_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> (StatusCode, Json<UpdateStatusResponse>) {
    match state.db.vods().update_status(id, body.status).await {
        Ok(true) => {
            info!(vod_id = id, status = %body.status, "VOD status updated");
            (
                StatusCode::OK,
                Json(UpdateStatusResponse {
                    success: true,
                    status: Some(body.status),
                    error: None,
                }),
            )
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(UpdateStatusResponse {
                success: false,
                status: None,
                error: Some(format!("No VOD with id {id}")),
            }),
        ),
        Err(e) => {
            error!(error = %e, "Failed to update VOD status");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UpdateStatusResponse {
                    success: false,
                    status: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Compact "how long ago" label, counted from when the broadcast ended
fn format_time_since(when: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - when).num_seconds().max(0);
    if secs >= 86_400 {
        format!("{}d ago", secs / 86_400)
    } else if secs >= 3_600 {
        format!("{}h ago", secs / 3_600)
    } else if secs >= 60 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{secs}s ago")
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vods", get(list_vods))
        .route("/vods/{id}/status", post(update_vod_status))
        .route("/streamers/{id}/vods", get(list_streamer_vods))
}
