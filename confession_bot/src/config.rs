use std::fs;

use teloxide::types::{ChatId, UserId};

/// Everything the bot needs to know about its surroundings.
///
/// Read once at startup; missing or malformed values are a startup
/// failure, not something to limp along without.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot API token.
    pub key: String,
    /// Database URL. `sqlite:...` or `postgres://...`; the scheme picks
    /// the backend.
    pub db_url: String,
    /// The public channel approved posts get broadcast to.
    pub channel_id: ChatId,
    /// The private chat where admins review submissions.
    pub admin_chat_id: ChatId,
    /// The bot's owner. Gets to run `/export` and is always an admin.
    pub owner_id: UserId,
}

impl Config {
    /// # Panics
    /// Panics if the key file is missing or any required variable is
    /// absent or unparsable. The bot can't do anything useful without
    /// them, so this runs before anything else does.
    pub fn from_env() -> Config {
        let key = fs::read_to_string(match cfg!(debug_assertions) {
            true => "key_debug",
            false => "key",
        })
        .expect("Could not load bot key file!")
        .trim()
        .to_string();

        let db_url = std::env::var("CONFESSION_DB")
            .unwrap_or_else(|_| String::from("sqlite:confessions.sqlite"));

        let channel_id = ChatId(require_i64("CONFESSION_CHANNEL_ID"));
        let admin_chat_id = ChatId(require_i64("CONFESSION_ADMIN_CHAT_ID"));
        let owner_id = UserId(
            u64::try_from(require_i64("CONFESSION_OWNER_ID"))
                .expect("CONFESSION_OWNER_ID can't be negative!"),
        );

        Config {
            key,
            db_url,
            channel_id,
            admin_chat_id,
            owner_id,
        }
    }
}

fn require_i64(var: &str) -> i64 {
    std::env::var(var)
        .unwrap_or_else(|_| panic!("Environment variable {} is not set!", var))
        .trim()
        .parse()
        .unwrap_or_else(|_| panic!("Environment variable {} is not a number!", var))
}
