//! Functions that handle events from Telegram.

use std::sync::Arc;

use bot_commons::useful_methods::{BotSendChunked, MessageStuff};
use chrono::Utc;
use teloxide::{prelude::*, types::Me, RequestError};

use crate::{
    actions,
    config::Config,
    database::Database,
    types::PostKind,
    COMMENTS_SHOWN, MAX_POSTS_PER_HOUR,
};

pub mod moderation;
pub use moderation::handle_callback_query;

const HELP_TEXT: &str = concat!(
    "Send me a message (text, photo, video, voice or document) and it'll ",
    "be submitted <b>anonymously</b> for review. If approved, it's posted ",
    "to the channel as a numbered confession.\n\n",
    "Commands:\n",
    "/comment &lt;number&gt; &lt;text&gt; — comment on a confession\n",
    "/comments &lt;number&gt; — read its comment thread\n",
    "/report &lt;number&gt; [reason] — report a confession\n",
    "/notify on|off — toggle DMs about your own posts\n",
    "/stats — public statistics\n",
    "/rules — the rules"
);

const RULES_TEXT: &str = concat!(
    "1. Confessions are anonymous, including to admins' readers.\n",
    "2. No doxxing, no harassment, no illegal content.\n",
    "3. Admins reject what breaks the rules. Repeat offenders get banned.\n",
    "4. Be kind in the comments. Nobody knows who you are; act like ",
    "somebody anyway."
);

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    database: Arc<Database>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    if message.chat.id == config.admin_chat_id {
        return moderation::handle_admin_message(bot, me, message, database, config).await;
    }

    if message.chat.is_private() {
        return handle_private_message(bot, me, message, database, config).await;
    }

    // Group chats and channels are none of our business.
    Ok(())
}

async fn handle_private_message(
    bot: Bot,
    me: Me,
    message: Message,
    database: Arc<Database>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    let Some(user) = message.from.clone() else {
        return Ok(());
    };

    database
        .ensure_user(user.id)
        .await
        .expect("Database died!");

    let text = message.text_full().map(str::to_string);
    if let Some(text) = text {
        if text.starts_with('/') {
            return handle_command(bot, me, message, text, database, config).await;
        }
    }

    handle_submission(bot, message, database, config).await
}

/// Strip the command out of `text`, checking that a `/command@SomeBot`
/// form is actually aimed at us. Returns the command name (without the
/// slash) and the rest of the text.
fn parse_command<'a>(text: &'a str, me: &Me) -> Option<(&'a str, &'a str)> {
    let command = text.split_whitespace().next()?;
    if !command.is_ascii() {
        // Telegram commands must be ASCII.
        return None;
    }
    let rest = text[command.len()..].trim_start();

    let callname = &command[1..];
    let callname = match callname.split_once('@') {
        Some((callname, username)) => {
            if !username.eq_ignore_ascii_case(me.username()) {
                return None;
            }
            callname
        }
        None => callname,
    };

    Some((callname, rest))
}

async fn handle_command(
    bot: Bot,
    me: Me,
    message: Message,
    text: String,
    database: Arc<Database>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    let Some(user) = message.from.clone() else {
        return Ok(());
    };
    let Some((command, rest)) = parse_command(&text, &me) else {
        return Ok(());
    };

    match command {
        "start" | "help" => {
            bot.send_chunked(message.chat.id, HELP_TEXT, message.id)
                .await?;
        }
        "rules" => {
            bot.send_chunked(message.chat.id, RULES_TEXT, message.id)
                .await?;
        }
        "notify" => {
            let response = match rest.trim() {
                "on" => {
                    database
                        .set_notify(user.id, true)
                        .await
                        .expect("Database died!");
                    "You'll get DMs about your posts."
                }
                "off" => {
                    database
                        .set_notify(user.id, false)
                        .await
                        .expect("Database died!");
                    "No more DMs about your posts."
                }
                _ => {
                    if database
                        .wants_notify(user.id)
                        .await
                        .expect("Database died!")
                    {
                        "Notifications are <b>on</b>. /notify off to stop them."
                    } else {
                        "Notifications are <b>off</b>. /notify on to get them back."
                    }
                }
            };
            bot.send_chunked(message.chat.id, response, message.id)
                .await?;
        }
        "stats" => {
            let stats = database.stats().await.expect("Database died!");
            bot.send_chunked(message.chat.id, &actions::format_stats(&stats), message.id)
                .await?;
        }
        "comment" => {
            handle_comment_command(&bot, &message, rest, &database).await?;
        }
        "comments" => {
            let response = match parse_postid(rest) {
                Some(postid) => {
                    let comments = database
                        .comments_for_post(postid, COMMENTS_SHOWN)
                        .await
                        .expect("Database died!");
                    actions::format_comments(postid, &comments)
                }
                None => "Usage: /comments &lt;number&gt;".to_string(),
            };
            bot.send_chunked(message.chat.id, &response, message.id)
                .await?;
        }
        "report" => {
            handle_report_command(&bot, &message, rest, &database, &config).await?;
        }
        "export" => {
            if user.id != config.owner_id {
                bot.send_chunked(message.chat.id, "No.", message.id).await?;
                return Ok(());
            }
            moderation::handle_export(&bot, &message, &database).await?;
        }
        _ => {
            bot.send_chunked(
                message.chat.id,
                "Unknown command. /help if you're lost.",
                message.id,
            )
            .await?;
        }
    }

    Ok(())
}

fn parse_postid(input: &str) -> Option<i64> {
    input
        .split_whitespace()
        .next()?
        .trim_start_matches('#')
        .parse()
        .ok()
}

async fn handle_comment_command(
    bot: &Bot,
    message: &Message,
    rest: &str,
    database: &Database,
) -> Result<(), RequestError> {
    let Some(user) = message.from.clone() else {
        return Ok(());
    };

    if database.is_banned(user.id).await.expect("Database died!") {
        bot.send_chunked(message.chat.id, "You are banned.", message.id)
            .await?;
        return Ok(());
    }

    let (postid, comment_text) = match parse_postid(rest) {
        Some(postid) => {
            let comment_text = rest
                .split_once(char::is_whitespace)
                .map(|(_, rest)| rest.trim())
                .unwrap_or("");
            (postid, comment_text)
        }
        None => {
            bot.send_chunked(
                message.chat.id,
                "Usage: /comment &lt;number&gt; &lt;text&gt;",
                message.id,
            )
            .await?;
            return Ok(());
        }
    };

    if comment_text.is_empty() {
        bot.send_chunked(
            message.chat.id,
            "A comment needs some text.",
            message.id,
        )
        .await?;
        return Ok(());
    }

    let post = database.get_post(postid).await.expect("Database died!");
    let Some(post) = post.filter(|x| x.status == crate::types::PostStatus::Approved) else {
        bot.send_chunked(message.chat.id, "No such confession.", message.id)
            .await?;
        return Ok(());
    };

    database
        .add_comment(post.postid, user.id, comment_text)
        .await
        .expect("Database died!");

    bot.send_chunked(message.chat.id, "Comment added, anonymously.", message.id)
        .await?;

    // Tell the author, but not if they're commenting on themselves.
    if post.userid != user.id {
        let notification = format!(
            "New comment on your confession #{}. /comments {} to read the thread.",
            post.postid, post.postid
        );
        actions::notify_author(bot, database, &post, &notification).await;
    }

    Ok(())
}

async fn handle_report_command(
    bot: &Bot,
    message: &Message,
    rest: &str,
    database: &Database,
    config: &Config,
) -> Result<(), RequestError> {
    let Some(user) = message.from.clone() else {
        return Ok(());
    };

    let Some(postid) = parse_postid(rest) else {
        bot.send_chunked(
            message.chat.id,
            "Usage: /report &lt;number&gt; [reason]",
            message.id,
        )
        .await?;
        return Ok(());
    };
    let reason = rest
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .filter(|x| !x.is_empty());

    if database
        .get_post(postid)
        .await
        .expect("Database died!")
        .is_none()
    {
        bot.send_chunked(message.chat.id, "No such confession.", message.id)
            .await?;
        return Ok(());
    }

    database
        .add_report(postid, user.id, reason)
        .await
        .expect("Database died!");

    bot.send_chunked(message.chat.id, "Reported. Thank you.", message.id)
        .await?;

    let _ = bot
        .send_chunked(
            config.admin_chat_id,
            &format!(
                "New report on confession #{}. /reports to see the pile.",
                postid
            ),
            None,
        )
        .await;

    Ok(())
}

/// A non-command private message is a submission.
async fn handle_submission(
    bot: Bot,
    message: Message,
    database: Arc<Database>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    let Some(user) = message.from.clone() else {
        return Ok(());
    };

    if database.is_banned(user.id).await.expect("Database died!") {
        bot.send_chunked(message.chat.id, "You are banned.", message.id)
            .await?;
        return Ok(());
    }

    let hour_ago = Utc::now() - chrono::Duration::hours(1);
    let recent = database
        .posts_by_user_since(user.id, hour_ago)
        .await
        .expect("Database died!");
    if recent >= MAX_POSTS_PER_HOUR {
        bot.send_chunked(
            message.chat.id,
            "That's plenty of confessing for one hour. Try again later.",
            message.id,
        )
        .await?;
        return Ok(());
    }

    let Some((kind, text, file_id)) = extract_submission(&message) else {
        bot.send_chunked(
            message.chat.id,
            "I can only take text, photos, videos, voice messages and documents.",
            message.id,
        )
        .await?;
        return Ok(());
    };

    let postid = database
        .add_post(user.id, kind, text.as_deref(), file_id.as_deref())
        .await
        .expect("Database died!");

    log::debug!("New submission #{} ({:?})", postid, kind);

    moderation::send_review_card(&bot, &config, &database, postid).await?;

    bot.send_chunked(
        message.chat.id,
        &format!(
            "Got it. Your confession is <b>#{}</b>, pending review. \
            Nobody will know it's yours.",
            postid
        ),
        message.id,
    )
    .await?;

    Ok(())
}

/// Figure out what kind of post this message makes, if any.
fn extract_submission(message: &Message) -> Option<(PostKind, Option<String>, Option<String>)> {
    let caption = message.caption().map(str::to_string);

    if let Some(photos) = message.photo() {
        // Telegram sends several sizes; keep the biggest.
        let best = photos.iter().max_by_key(|x| x.width * x.height)?;
        return Some((PostKind::Photo, caption, Some(best.file.id.to_string())));
    }
    if let Some(video) = message.video() {
        return Some((PostKind::Video, caption, Some(video.file.id.to_string())));
    }
    if let Some(voice) = message.voice() {
        return Some((PostKind::Voice, caption, Some(voice.file.id.to_string())));
    }
    if let Some(document) = message.document() {
        return Some((
            PostKind::Document,
            caption,
            Some(document.file.id.to_string()),
        ));
    }
    if let Some(text) = message.text() {
        if !text.trim().is_empty() {
            return Some((PostKind::Text, Some(text.to_string()), None));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::parse_postid;

    #[test]
    fn postids_parse_with_or_without_hash() {
        assert_eq!(parse_postid("42"), Some(42));
        assert_eq!(parse_postid("#42 some reason"), Some(42));
        assert_eq!(parse_postid("  "), None);
        assert_eq!(parse_postid("borgar"), None);
    }
}
