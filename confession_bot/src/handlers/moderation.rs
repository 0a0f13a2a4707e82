//! The admin side: review cards, approve/reject buttons, reports,
//! bans, and the owner's export. Being in the admin chat is the
//! authorization; the bot never puts these buttons anywhere else.

use std::io::Write;
use std::sync::Arc;

use bot_commons::useful_methods::BotSendChunked;
use html_escape::encode_text;
use teloxide::{
    payloads::{
        AnswerCallbackQuerySetters, EditMessageTextSetters, SendDocumentSetters,
        SendMessageSetters,
    },
    prelude::*,
    sugar::request::RequestLinkPreviewExt,
    types::{
        CallbackQuery, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Me,
        ParseMode, UserId,
    },
    RequestError,
};

use crate::{
    actions,
    config::Config,
    database::{Database, Post},
    types::{PostKind, PostStatus, ReactionKind},
};

/// Send the admin chat a review card for a fresh submission: the
/// content itself, then a control message with the verdict buttons.
/// Two messages because captions can't always be edited the way text
/// can, and the control message gets edited a lot.
pub async fn send_review_card(
    bot: &Bot,
    config: &Config,
    database: &Database,
    postid: i64,
) -> Result<(), RequestError> {
    let Some(post) = database.get_post(postid).await.expect("Database died!") else {
        log::error!("Asked to review nonexistent post {}", postid);
        return Ok(());
    };

    // The content, as the channel would see it.
    if let Some(file_id) = &post.file_id {
        let file = InputFile::file_id(FileId(file_id.clone()));
        match post.kind {
            PostKind::Photo => bot.send_photo(config.admin_chat_id, file).await?,
            PostKind::Video => bot.send_video(config.admin_chat_id, file).await?,
            PostKind::Voice => bot.send_voice(config.admin_chat_id, file).await?,
            _ => bot.send_document(config.admin_chat_id, file).await?,
        };
    }

    let mut card = format!(
        "Submission <b>#{}</b> from user <code>{}</code>",
        post.postid, post.userid
    );
    if let Some(text) = &post.text {
        card.push_str("\n\n");
        card.push_str(&encode_text(text));
    }

    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Approve".to_string(), format!("approve:{}", post.postid)),
        InlineKeyboardButton::callback("❌ Reject".to_string(), format!("reject:{}", post.postid)),
    ]]);

    let control = bot
        .send_message(config.admin_chat_id, card)
        .parse_mode(ParseMode::Html)
        .disable_link_preview(true)
        .reply_markup(keyboard)
        .await?;

    database
        .set_review_message(post.postid, control.chat.id, control.id)
        .await
        .expect("Database died!");

    Ok(())
}

pub async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    database: Arc<Database>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    macro_rules! finish {
        ($text:expr) => {{
            bot.answer_callback_query(query.id).text($text).await?;
            return Ok(());
        }};
        () => {{
            bot.answer_callback_query(query.id).await?;
            return Ok(());
        }};
    }

    let Some(data) = query.data.clone() else {
        finish!();
    };

    if let Some(postid) = data.strip_prefix("approve:") {
        let Ok(postid) = postid.parse() else {
            finish!("Bad button data.");
        };
        match decide_post(&bot, &database, &config, &query, postid, PostStatus::Approved).await? {
            Some(answer) => finish!(answer),
            None => finish!(),
        }
    }
    if let Some(postid) = data.strip_prefix("reject:") {
        let Ok(postid) = postid.parse() else {
            finish!("Bad button data.");
        };
        match decide_post(&bot, &database, &config, &query, postid, PostStatus::Rejected).await? {
            Some(answer) => finish!(answer),
            None => finish!(),
        }
    }

    if let Some(payload) = data.strip_prefix(&format!("{}:", actions::CALLBACK_REACT)) {
        let Some(kind) = ReactionKind::from_callback_payload(payload) else {
            finish!("Bad button data.");
        };
        let Some(post) = post_under_callback(&database, &query).await else {
            finish!("This post isn't reactable anymore.");
        };

        // Pressing your current reaction takes it back.
        let current = database
            .get_reaction(post.postid, query.from.id)
            .await
            .expect("Database died!");
        let answer = if current == Some(kind) {
            database
                .clear_reaction(post.postid, query.from.id)
                .await
                .expect("Database died!");
            "Reaction removed.".to_string()
        } else {
            database
                .set_reaction(post.postid, query.from.id, kind)
                .await
                .expect("Database died!");
            format!("You reacted {}", kind.emoji())
        };

        actions::refresh_reactions(&bot, config.channel_id, &database, &post).await?;
        finish!(answer);
    }

    if data == actions::CALLBACK_REPORT {
        let Some(post) = post_under_callback(&database, &query).await else {
            finish!("This post isn't reportable anymore.");
        };
        database
            .add_report(post.postid, query.from.id, None)
            .await
            .expect("Database died!");
        let _ = bot
            .send_chunked(
                config.admin_chat_id,
                &format!(
                    "New report on confession #{}. /reports to see the pile.",
                    post.postid
                ),
                None,
            )
            .await;
        finish!("Reported. Thank you.");
    }

    finish!();
}

/// The approved post a channel-side callback button sits under.
async fn post_under_callback(database: &Database, query: &CallbackQuery) -> Option<Post> {
    let message = query.message.as_ref()?;
    database
        .approved_post_by_channel_message(message.id())
        .await
        .expect("Database died!")
}

/// Returns the callback answer to show the admin, if any.
async fn decide_post(
    bot: &Bot,
    database: &Database,
    config: &Config,
    query: &CallbackQuery,
    postid: i64,
    verdict: PostStatus,
) -> Result<Option<&'static str>, RequestError> {
    // Verdict buttons only live in the admin chat, but check anyway in
    // case one gets forwarded somewhere weird.
    if !query
        .message
        .as_ref()
        .is_some_and(|x| x.chat().id == config.admin_chat_id)
    {
        return Ok(None);
    }

    let Some(post) = database.get_post(postid).await.expect("Database died!") else {
        return Ok(Some("That post is gone."));
    };
    if post.status != PostStatus::Pending {
        return Ok(Some("Already decided."));
    }

    database
        .set_post_status(postid, verdict)
        .await
        .expect("Database died!");

    let verdict_line = match verdict {
        PostStatus::Approved => {
            let channel_message =
                actions::broadcast_post(bot, config.channel_id, database, &post).await?;
            database
                .set_channel_message(postid, channel_message.id)
                .await
                .expect("Database died!");

            actions::notify_author(
                bot,
                database,
                &post,
                &format!("Your confession <b>#{}</b> was approved. 🎉", postid),
            )
            .await;
            "Approved"
        }
        _ => {
            actions::notify_author(
                bot,
                database,
                &post,
                &format!(
                    "Your confession <b>#{}</b> was rejected. /rules might explain why.",
                    postid
                ),
            )
            .await;
            "Rejected"
        }
    };

    // Rewrite the control card so the verdict is on record and the
    // buttons are gone.
    let admin = &query.from;
    let admin_name = match &admin.username {
        Some(username) => format!("@{}", username),
        None => admin.full_name(),
    };
    if let (Some(chat_id), Some(message_id)) = (post.review_chat_id, post.review_message_id) {
        let card = format!(
            "Submission <b>#{}</b>: <b>{}</b> by {}",
            postid,
            verdict_line,
            encode_text(&admin_name),
        );
        let _ = bot
            .edit_message_text(chat_id, message_id, card)
            .parse_mode(ParseMode::Html)
            .await;
    }

    log::info!("Post {} {} by {}", postid, verdict_line, admin_name);
    Ok(None)
}

/// Commands in the admin chat. Everyone in there is trusted.
pub async fn handle_admin_message(
    bot: Bot,
    me: Me,
    message: Message,
    database: Arc<Database>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    use bot_commons::useful_methods::MessageStuff;

    let Some(text) = message.text_full() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }
    let Some((command, rest)) = super::parse_command(text, &me) else {
        return Ok(());
    };

    match command {
        "pending" => {
            let pending = database.pending_posts(10).await.expect("Database died!");
            if pending.is_empty() {
                bot.send_chunked(message.chat.id, "Nothing pending. 🎉", None)
                    .await?;
                return Ok(());
            }
            // Resend review cards for anything that got lost.
            for post in pending {
                send_review_card(&bot, &config, &database, post.postid).await?;
            }
        }
        "reports" => {
            let reports = database.open_reports(10).await.expect("Database died!");
            let response = if reports.is_empty() {
                "No open reports.".to_string()
            } else {
                let mut out = String::from("<b>Open reports:</b>");
                for report in reports {
                    out.push_str(&format!(
                        "\n#{} on confession #{} — {} (/resolve {})",
                        report.reportid,
                        report.postid,
                        report
                            .reason
                            .as_deref()
                            .map(|x| encode_text(x).into_owned())
                            .unwrap_or_else(|| "no reason given".to_string()),
                        report.reportid,
                    ));
                }
                out
            };
            bot.send_chunked(message.chat.id, &response, message.id)
                .await?;
        }
        "resolve" => {
            let response = match rest.trim().trim_start_matches('#').parse::<i64>() {
                Ok(reportid) => {
                    if database
                        .resolve_report(reportid)
                        .await
                        .expect("Database died!")
                    {
                        "Resolved."
                    } else {
                        "No such open report."
                    }
                }
                Err(_) => "Usage: /resolve &lt;report number&gt;",
            };
            bot.send_chunked(message.chat.id, response, message.id)
                .await?;
        }
        "ban" | "unban" => {
            // Anyone in the admin chat may review, but bans take an
            // actual chat admin (or the owner).
            let Some(sender) = message.from.clone() else {
                return Ok(());
            };
            let is_admin = sender.id == config.owner_id
                || bot_commons::get_admin_of(&bot, sender.id, config.admin_chat_id)
                    .await?
                    .is_some();
            if !is_admin {
                bot.send_chunked(
                    message.chat.id,
                    "Only chat admins can (un)ban.",
                    message.id,
                )
                .await?;
                return Ok(());
            }

            let banning = command == "ban";
            let response = match rest.trim().parse::<u64>() {
                Ok(userid) => {
                    database
                        .set_banned(UserId(userid), banning)
                        .await
                        .expect("Database died!");
                    if banning {
                        "Banned."
                    } else {
                        "Unbanned."
                    }
                }
                Err(_) => "Usage: /ban &lt;numeric user id&gt; (see the review card)",
            };
            bot.send_chunked(message.chat.id, response, message.id)
                .await?;
        }
        "stats" => {
            let stats = database.stats().await.expect("Database died!");
            bot.send_chunked(message.chat.id, &actions::format_stats(&stats), message.id)
                .await?;
        }
        _ => {}
    }

    Ok(())
}

/// Dump approved posts as JSON lines and send the file back. Owner only;
/// the caller checks that.
pub async fn handle_export(
    bot: &Bot,
    message: &Message,
    database: &Database,
) -> Result<(), RequestError> {
    let mut file = tempfile::NamedTempFile::new().expect("Could not make a temp file!");

    let written = database
        .export_posts(file.as_file_mut())
        .await
        .expect("Database died!");
    file.as_file_mut().flush().expect("Could not flush the temp file!");

    if written == 0 {
        bot.send_chunked(message.chat.id, "Nothing approved to export yet.", message.id)
            .await?;
        return Ok(());
    }

    bot.send_document(
        message.chat.id,
        InputFile::file(file.path().to_path_buf()).file_name("confessions.jsonl"),
    )
    .caption(format!("{} approved posts.", written))
    .await?;

    Ok(())
}
