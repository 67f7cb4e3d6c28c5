//! Broadcast archive discovery job

use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::{CreateVod, Database, StreamerRecord};
use crate::services::TwitchClient;
use crate::services::twitch::derive_timing;

/// Poll every tracked streamer for newly completed broadcasts.
///
/// One streamer failing never blocks the rest, and a pending stop
/// request cuts the cycle short between streamers.
pub async fn poll_streamers(
    db: &Database,
    twitch: &TwitchClient,
    cancel: &CancellationToken,
) -> Result<()> {
    let streamers = db.streamers().list_all().await?;
    if streamers.is_empty() {
        debug!(job = "vod_poller", "No streamers tracked, nothing to poll");
        return Ok(());
    }

    info!(
        job = "vod_poller",
        streamer_count = streamers.len(),
        "Polling streamers for new VODs"
    );

    for streamer in streamers {
        if cancel.is_cancelled() {
            debug!(job = "vod_poller", "Stop requested, cutting poll cycle short");
            break;
        }

        if let Err(e) = poll_single_streamer(db, twitch, &streamer).await {
            error!(
                job = "vod_poller",
                handle = %streamer.handle,
                error = %e,
                "Failed to poll streamer"
            );
        }
    }

    Ok(())
}

/// Poll one streamer end to end: resolve their platform id if we do not
/// have it yet, fetch recent archives, record the unseen ones, and stamp
/// `last_checked` once everything went through.
async fn poll_single_streamer(
    db: &Database,
    twitch: &TwitchClient,
    streamer: &StreamerRecord,
) -> Result<()> {
    let user_id = match &streamer.twitch_user_id {
        Some(id) => id.clone(),
        None => {
            let Some(id) = twitch.resolve_user_id(&streamer.handle).await? else {
                warn!(
                    job = "vod_poller",
                    handle = %streamer.handle,
                    "No Twitch account found for handle, skipping"
                );
                return Ok(());
            };
            db.streamers().set_twitch_user_id(streamer.id, &id).await?;
            info!(
                job = "vod_poller",
                handle = %streamer.handle,
                user_id = %id,
                "Resolved Twitch id for streamer"
            );
            id
        }
    };

    let videos = twitch.recent_broadcasts(&user_id).await?;
    let known = db.vods().existing_ids(streamer.id).await?;

    let mut inserted = 0;
    for video in videos {
        if known.contains(&video.id) {
            continue;
        }

        let timing = match derive_timing(&video.created_at, &video.duration) {
            Ok(timing) => timing,
            Err(e) => {
                warn!(
                    job = "vod_poller",
                    handle = %streamer.handle,
                    vod_id = %video.id,
                    error = %e,
                    "Skipping VOD with unusable metadata"
                );
                continue;
            }
        };

        let created = db
            .vods()
            .insert(&CreateVod {
                streamer_id: streamer.id,
                twitch_vod_id: video.id.clone(),
                title: video.title,
                url: video.url,
                duration_seconds: timing.duration_seconds,
                created_at: timing.started_at,
                ended_at: timing.ended_at,
            })
            .await?;

        match created {
            Some(_) => inserted += 1,
            None => debug!(job = "vod_poller", vod_id = %video.id, "VOD already recorded"),
        }
    }

    if inserted > 0 {
        info!(
            job = "vod_poller",
            handle = %streamer.handle,
            new_vods = inserted,
            "Recorded new VODs"
        );
    }

    db.streamers()
        .set_last_checked(streamer.id, Utc::now())
        .await?;

    Ok(())
}
