//! A Telegram bot that keeps a searchable archive of videos.
//!
//! Admins post media to the bot; each post is parsed, keyed and stored in
//! SQLite. Users search and browse the catalog and get the media delivered
//! back on request.

pub mod bot;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod grouping;
pub mod metadata;
pub mod rate_limit;
pub mod scheduler;
