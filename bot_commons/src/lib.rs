//! Common plumbing shared by my bots: logging + runtime bootstrap and
//! a few Telegram helpers that every bot ends up wanting.

pub mod useful_methods;

use std::future::Future;

use teloxide::prelude::*;

/// Initialize logging and run `closure` on a fresh multithreaded runtime.
///
/// `default_filter` is used when the `RUST_LOG` environment variable is
/// not set, so binaries can ask for e.g. `"info,confession_bot=debug"`.
/// Uses [pretty_env_logger][] internally; timestamps are dropped when
/// running under systemd, since the journal adds its own.
///
/// [pretty_env_logger]: https://docs.rs/pretty_env_logger
pub fn start_everything(default_filter: &str, closure: impl Future<Output = ()>) {
    let log_level = std::env::var_os("RUST_LOG")
        .and_then(|x| x.into_string().ok())
        .unwrap_or_else(|| default_filter.to_string());

    let running_as_systemd_service = std::env::var_os("JOURNAL_STREAM").is_some();

    let mut builder = match running_as_systemd_service {
        true => pretty_env_logger::formatted_builder(),
        false => pretty_env_logger::formatted_timed_builder(),
    };

    builder.parse_filters(&log_level);

    if builder.try_init().is_err() {
        log::error!("Tried to init logger twice!");
    }

    log::info!("hi");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(closure);
}

/// Find out if a user of this ID is an admin of the specified chat of that ID.
/// If so, returns the `ChatMember` object describing their permissions,
/// otherwise `None`.
pub async fn get_admin_of(
    bot: &Bot,
    user: UserId,
    chat: ChatId,
) -> Result<Option<teloxide::types::ChatMember>, teloxide::RequestError> {
    Ok(bot
        .get_chat_administrators(chat)
        .await?
        .into_iter()
        .find(|x| x.user.id == user))
}
