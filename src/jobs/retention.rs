//! Retention sweep job

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::db::Database;

/// Delete every recorded VOD whose broadcast ended before the retention
/// window, logging each one on its way out.
pub async fn purge_expired(db: &Database, retention_days: i64) -> Result<()> {
    let cutoff = chrono::Duration::try_days(retention_days)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| {
            anyhow::anyhow!("Retention window of {retention_days} days is out of range")
        })?;

    let (deleted, purged) = db.vods().delete_ended_before(cutoff).await?;
    if deleted == 0 {
        debug!(job = "retention", "No VODs past the retention window");
        return Ok(());
    }

    for vod in &purged {
        info!(
            job = "retention",
            vod_id = vod.id,
            handle = %vod.streamer_handle,
            title = %vod.title,
            "Purged expired VOD"
        );
    }
    info!(
        job = "retention",
        purged = purged.len(),
        retention_days,
        "Retention sweep complete"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::purge_expired;
    use crate::db::CreateVod;
    use crate::db::test_support::temp_db;

    #[tokio::test]
    async fn test_purges_only_expired_vods() {
        let (db, _dir) = temp_db().await;
        let streamer = db.streamers().create("lirik").await.unwrap().unwrap();

        let stale_end = Utc::now() - chrono::Duration::days(8);
        let fresh_end = Utc::now() - chrono::Duration::days(2);
        for (vod_id, ended_at) in [("stale", stale_end), ("fresh", fresh_end)] {
            db.vods()
                .insert(&CreateVod {
                    streamer_id: streamer.id,
                    twitch_vod_id: vod_id.to_string(),
                    title: format!("Broadcast {vod_id}"),
                    url: format!("https://www.twitch.tv/videos/{vod_id}"),
                    duration_seconds: 3600,
                    created_at: ended_at - chrono::Duration::seconds(3600),
                    ended_at,
                })
                .await
                .unwrap();
        }

        purge_expired(&db, 7).await.unwrap();

        let remaining = db.vods().list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].twitch_vod_id, "fresh");

        // Running again with nothing expired is a no-op
        purge_expired(&db, 7).await.unwrap();
        assert_eq!(db.vods().list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_window_is_an_error() {
        let (db, _dir) = temp_db().await;

        assert!(purge_expired(&db, i64::MAX).await.is_err());
    }
}
