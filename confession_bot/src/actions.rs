//! Functions that perform stuff via the bot: broadcasting approved
//! posts, building keyboards, notifying authors, rendering text.

use html_escape::encode_text;
use teloxide::{
    payloads::{
        EditMessageReplyMarkupSetters, SendDocumentSetters, SendMessageSetters,
        SendPhotoSetters, SendVideoSetters, SendVoiceSetters,
    },
    prelude::Requester,
    sugar::request::RequestLinkPreviewExt,
    types::{
        ChatId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Message,
        ParseMode,
    },
    Bot, RequestError,
};

use crate::{
    database::{Comment, Database, Post, Stats},
    types::{PostKind, ReactionKind},
};

/// Callback payload prefix for reactions; full data is `react:<kind>`.
pub const CALLBACK_REACT: &str = "react";
/// Callback data of the report button under every channel post.
pub const CALLBACK_REPORT: &str = "report";

/// The text of a post as it appears in the channel. For media posts
/// this becomes the caption.
pub fn format_post(post: &Post) -> String {
    let mut out = format!("<b>Confession #{}</b>", post.postid);
    if let Some(text) = &post.text {
        out.push_str("\n\n");
        out.push_str(&encode_text(text));
    }
    out.push_str(&format!(
        "\n\n<i>DM me /comment {} &lt;text&gt; to reply anonymously.</i>",
        post.postid
    ));
    out
}

/// Reaction buttons with live counts, plus the report button.
pub fn reaction_keyboard(counts: &[(ReactionKind, u32)]) -> InlineKeyboardMarkup {
    let reactions = counts
        .iter()
        .map(|(kind, count)| {
            let label = match count {
                0 => kind.emoji().to_string(),
                _ => format!("{} {}", kind.emoji(), count),
            };
            InlineKeyboardButton::callback(
                label,
                format!("{}:{}", CALLBACK_REACT, u8::from(*kind)),
            )
        })
        .collect();

    InlineKeyboardMarkup::new(vec![
        reactions,
        vec![InlineKeyboardButton::callback(
            "⚠️ Report".to_string(),
            CALLBACK_REPORT.to_string(),
        )],
    ])
}

/// Send an approved post to the channel, reaction keyboard and all.
pub async fn broadcast_post(
    bot: &Bot,
    channel_id: ChatId,
    database: &Database,
    post: &Post,
) -> Result<Message, RequestError> {
    let text = format_post(post);
    let counts = match database.reaction_counts(post.postid).await {
        Ok(counts) => counts,
        Err(e) => {
            // A fresh post has no reactions anyway; zeros will do.
            log::error!("Database died fetching reactions: {}", e);
            crate::types::REACTIONS.iter().map(|k| (*k, 0)).collect()
        }
    };
    let keyboard = reaction_keyboard(&counts);

    let file = post
        .file_id
        .clone()
        .map(|id| InputFile::file_id(FileId(id)));

    let message = match (post.kind, file) {
        (PostKind::Photo, Some(file)) => {
            bot.send_photo(channel_id, file)
                .caption(text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await?
        }
        (PostKind::Video, Some(file)) => {
            bot.send_video(channel_id, file)
                .caption(text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await?
        }
        (PostKind::Voice, Some(file)) => {
            bot.send_voice(channel_id, file)
                .caption(text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await?
        }
        (PostKind::Document, Some(file)) => {
            bot.send_document(channel_id, file)
                .caption(text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await?
        }
        // Text, or a media post that somehow lost its file. Text wins.
        _ => {
            bot.send_message(channel_id, text)
                .parse_mode(ParseMode::Html)
                .disable_link_preview(true)
                .reply_markup(keyboard)
                .await?
        }
    };

    Ok(message)
}

/// Redraw the reaction keyboard under a channel post after counts change.
pub async fn refresh_reactions(
    bot: &Bot,
    channel_id: ChatId,
    database: &Database,
    post: &Post,
) -> Result<(), RequestError> {
    let Some(message_id) = post.channel_message_id else {
        return Ok(());
    };
    let counts = match database.reaction_counts(post.postid).await {
        Ok(counts) => counts,
        Err(e) => {
            log::error!("Database died fetching reactions: {}", e);
            return Ok(());
        }
    };

    let result = bot
        .edit_message_reply_markup(channel_id, message_id)
        .reply_markup(reaction_keyboard(&counts))
        .await;

    // Two people reacting at once can produce an identical keyboard;
    // Telegram calls that an error, we don't.
    if let Err(RequestError::Api(teloxide::ApiError::MessageNotModified)) = result {
        return Ok(());
    }
    result.map(|_| ())
}

/// DM the author about their post's fate, if they want DMs at all.
/// Failures are logged and swallowed; people block bots.
pub async fn notify_author(bot: &Bot, database: &Database, post: &Post, text: &str) {
    let wants = database.wants_notify(post.userid).await.unwrap_or(true);
    if !wants {
        return;
    }
    if let Err(e) = bot
        .send_message(post.userid, text)
        .parse_mode(ParseMode::Html)
        .await
    {
        log::debug!(
            "Couldn't notify author of post {}: {}",
            post.postid,
            e
        );
    }
}

pub fn format_stats(stats: &Stats) -> String {
    let mut out = format!(
        concat!(
            "<b>Stats</b>\n",
            "Posts: {} ({} pending, {} approved, {} rejected)\n",
            "Users: {}\n",
            "Comments: {}\n",
            "Reactions:"
        ),
        stats.total_posts,
        stats.pending_posts,
        stats.approved_posts,
        stats.rejected_posts,
        stats.users,
        stats.comments,
    );
    for (kind, count) in &stats.reactions {
        out.push_str(&format!(" {} {}", kind.emoji(), count));
    }
    out
}

/// Render a post's comment thread for DM delivery.
pub fn format_comments(postid: i64, comments: &[Comment]) -> String {
    if comments.is_empty() {
        return format!("No comments on confession #{} yet.", postid);
    }
    let mut out = format!("<b>Comments on confession #{}:</b>", postid);
    for comment in comments {
        out.push_str("\n• ");
        out.push_str(&encode_text(&comment.text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PostStatus, REACTIONS};
    use chrono::Utc;
    use teloxide::types::UserId;

    fn sample_post(text: Option<&str>) -> Post {
        Post {
            postid: 17,
            userid: UserId(1),
            kind: PostKind::Text,
            text: text.map(str::to_string),
            file_id: None,
            status: PostStatus::Approved,
            channel_message_id: None,
            review_chat_id: None,
            review_message_id: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    #[test]
    fn post_text_is_escaped() {
        let post = sample_post(Some("i <3 tags & ampersands"));
        let formatted = format_post(&post);
        assert!(formatted.contains("Confession #17"));
        assert!(formatted.contains("i &lt;3 tags &amp; ampersands"));
        assert!(!formatted.contains("i <3"));
    }

    #[test]
    fn keyboard_has_all_reactions_and_a_report_button() {
        let counts: Vec<_> = REACTIONS.iter().map(|k| (*k, 2u32)).collect();
        let keyboard = reaction_keyboard(&counts);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0].len(), REACTIONS.len());
        assert_eq!(keyboard.inline_keyboard[1].len(), 1);
    }

    #[test]
    fn zero_counts_are_not_shown() {
        let keyboard = reaction_keyboard(&[(ReactionKind::Heart, 0), (ReactionKind::Skull, 3)]);
        assert_eq!(keyboard.inline_keyboard[0][0].text, "❤️");
        assert_eq!(keyboard.inline_keyboard[0][1].text, "💀 3");
    }

    #[test]
    fn comment_threads_render() {
        assert_eq!(
            format_comments(3, &[]),
            "No comments on confession #3 yet."
        );

        let comments = vec![Comment {
            commentid: 1,
            postid: 3,
            userid: UserId(2),
            text: "<b>sneaky</b>".to_string(),
            created_at: Utc::now(),
        }];
        let rendered = format_comments(3, &comments);
        assert!(rendered.contains("&lt;b&gt;sneaky&lt;/b&gt;"));
    }
}
