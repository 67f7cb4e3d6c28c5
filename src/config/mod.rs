//! Application configuration management

use std::env;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Path to the SQLite database file
    pub database_path: String,

    /// Twitch application client id
    pub twitch_client_id: String,

    /// Twitch application client secret
    pub twitch_client_secret: String,

    /// Seconds between ingestion cycles
    pub poll_interval_secs: u64,

    /// Days a VOD is kept after its broadcast ended
    pub retention_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/vodforge.db".to_string()),

            twitch_client_id: env::var("TWITCH_CLIENT_ID")
                .context("TWITCH_CLIENT_ID is required")?,

            twitch_client_secret: env::var("TWITCH_CLIENT_SECRET")
                .context("TWITCH_CLIENT_SECRET is required")?,

            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .context("Invalid POLL_INTERVAL_SECS")?,

            retention_days: env::var("RETENTION_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("Invalid RETENTION_DAYS")?,
        })
    }
}
