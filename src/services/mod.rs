//! External service integrations

pub mod duration;
pub mod twitch;

pub use twitch::TwitchClient;
