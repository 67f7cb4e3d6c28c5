//! API route definitions
//!
//! REST endpoints are thin views over the record store. The ingestion
//! worker owns all Twitch traffic; nothing in here ever calls out.

pub mod health;
pub mod streamers;
pub mod vods;
