//! Source code for an anonymous confession bot for Telegram.
//!
//! Users DM the bot their confessions, admins approve or reject them in
//! a review chat, and approved ones get posted to a channel where people
//! can react and comment without anyone knowing who wrote what.

/// Various types used throughout.
mod types;

/// Runtime configuration.
mod config;

/// The database.
mod database;

/// Functions that perform stuff via the bot.
mod actions;

/// Functions that handle events from Telegram.
mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;

/// How many submissions a single user may make per rolling hour before
/// the bot tells them to cool off.
const MAX_POSTS_PER_HOUR: u32 = 3;

/// How many comments are shown when someone asks for a post's thread.
const COMMENTS_SHOWN: u32 = 10;
