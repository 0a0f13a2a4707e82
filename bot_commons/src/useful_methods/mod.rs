use futures::Future;
use teloxide::{
    payloads::SendMessageSetters,
    requests::Requester,
    sugar::request::{RequestLinkPreviewExt, RequestReplyExt},
    types::{Message, MessageId, Recipient},
    Bot, RequestError,
};

/// Telegram's hard limit on message text length, in characters.
pub const MESSAGE_LENGTH_LIMIT: usize = 4096;

pub trait MessageStuff {
    /// Text of the message, or its caption if it's a media message.
    fn text_full(&self) -> Option<&str>;
}

impl MessageStuff for Message {
    fn text_full(&self) -> Option<&str> {
        self.text().or_else(|| self.caption())
    }
}

/// Split `text` into chunks of at most `limit` characters, preferring to
/// break on newlines, then on spaces, and only then mid-word. Never splits
/// inside a UTF-8 codepoint. Returns at least one chunk for non-empty input.
pub fn split_for_telegram(text: &str, limit: usize) -> Vec<&str> {
    assert!(limit > 0);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        // Byte offset of the character just past the limit.
        let hard_end = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());

        let window = &rest[..hard_end];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(hard_end);

        chunks.push(rest[..split_at].trim_end_matches(['\n', ' ']));
        rest = rest[split_at..].trim_start_matches(['\n', ' ']);
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }

    chunks
}

pub trait BotSendChunked {
    /// Send a message with HTML markup, splitting it into several messages
    /// if it's over the length limit, and retrying on flood waits.
    fn send_chunked<'a>(
        &'a self,
        to_where: impl Into<Recipient> + Send,
        text: &'a str,
        reply_to: impl Into<Option<MessageId>> + Send,
    ) -> impl Future<Output = Result<Vec<Message>, RequestError>> + Send;
}

impl BotSendChunked for Bot {
    async fn send_chunked<'a>(
        &'a self,
        to_where: impl Into<Recipient> + Send,
        text: &'a str,
        reply_to: impl Into<Option<MessageId>> + Send,
    ) -> Result<Vec<Message>, RequestError> {
        let to_where: Recipient = to_where.into();
        let reply_to = reply_to.into();
        let mut sent_messages = Vec::new();

        for chunk in split_for_telegram(text, MESSAGE_LENGTH_LIMIT) {
            // Try up to 3 times.
            let mut attempt: u8 = 0;
            let result = loop {
                attempt += 1;
                let mut request = self
                    .send_message(to_where.clone(), chunk)
                    .parse_mode(teloxide::types::ParseMode::Html)
                    .disable_link_preview(true);
                if let Some(reply_to) = reply_to {
                    request = request.reply_to(reply_to);
                }
                let result = request.await;

                if let Err(RequestError::RetryAfter(seconds)) = result {
                    tokio::time::sleep(seconds.duration()).await;
                }

                if result.is_ok() || attempt >= 3 {
                    break result;
                }
            };

            sent_messages.push(result?);
        }

        Ok(sent_messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_short_text_is_untouched() {
        assert_eq!(split_for_telegram("hello", 4096), vec!["hello"]);
        assert_eq!(split_for_telegram("", 10), vec![""]);
    }

    #[test]
    fn split_prefers_newlines() {
        let text = "first line\nsecond line\nthird";
        let chunks = split_for_telegram(text, 15);
        assert_eq!(chunks, vec!["first line", "second line", "third"]);
    }

    #[test]
    fn split_falls_back_to_spaces_then_hard_cuts() {
        let chunks = split_for_telegram("aaa bbb ccc", 5);
        assert_eq!(chunks, vec!["aaa", "bbb", "ccc"]);

        let chunks = split_for_telegram("aaaaaaaaaa", 4);
        assert_eq!(chunks, vec!["aaaa", "aaaa", "aa"]);
    }

    #[test]
    fn split_respects_char_boundaries() {
        // Each of these is multiple bytes in UTF-8.
        let text = "ääääää";
        let chunks = split_for_telegram(text, 4);
        assert_eq!(chunks, vec!["ääää", "ää"]);
    }

    #[test]
    fn split_never_exceeds_limit() {
        let text = "word ".repeat(1000);
        for chunk in split_for_telegram(&text, 100) {
            assert!(chunk.chars().count() <= 100);
        }
    }
}
