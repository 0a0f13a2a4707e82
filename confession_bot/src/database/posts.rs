use chrono::{DateTime, Utc};
use teloxide::types::{ChatId, MessageId, UserId};

use super::{args, pool::DbRow, Database, Error};
use crate::types::{PostKind, PostStatus};

/// One submission, from intake to (maybe) the channel.
#[derive(Debug, Clone)]
pub struct Post {
    pub postid: i64,
    pub userid: UserId,
    pub kind: PostKind,
    pub text: Option<String>,
    pub file_id: Option<String>,
    pub status: PostStatus,
    /// Set once the post is broadcast.
    pub channel_message_id: Option<MessageId>,
    /// Where the admin review card lives, for editing it later.
    pub review_chat_id: Option<ChatId>,
    pub review_message_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Column list matching [`Post::from_row`]. Keep the two in sync.
const POST_COLUMNS: &str = "postid, userid, kind, text, file_id, status, \
    channel_message_id, review_chat_id, review_message_id, created_at, decided_at";

impl Post {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn from_row(row: &DbRow) -> Post {
        Post {
            postid: row.i64(0),
            userid: UserId(row.i64(1) as u64),
            kind: PostKind::from(row.i64(2) as u8),
            text: row.opt_text(3),
            file_id: row.opt_text(4),
            status: PostStatus::from(row.i64(5) as u8),
            channel_message_id: row.opt_i64(6).map(|x| MessageId(x as i32)),
            review_chat_id: row.opt_i64(7).map(ChatId),
            review_message_id: row.opt_i64(8).map(|x| MessageId(x as i32)),
            created_at: row.datetime(9),
            decided_at: row.opt_datetime(10),
        }
    }
}

impl Database {
    /// Insert a fresh pending post and return its id, which doubles as
    /// the confession number shown in the channel.
    #[allow(clippy::cast_possible_wrap)]
    pub async fn add_post(
        &self,
        user: UserId,
        kind: PostKind,
        text: Option<&str>,
        file_id: Option<&str>,
    ) -> Result<i64, Error> {
        let row = self
            .pool
            .fetch_one(
                "INSERT INTO posts (userid, kind, text, file_id, status, created_at)
                VALUES (?, ?, ?, ?, 0, ?)
                RETURNING postid;",
                args![user.0 as i64, u8::from(kind), text, file_id, Utc::now()],
            )
            .await?;
        Ok(row.i64(0))
    }

    pub async fn get_post(&self, postid: i64) -> Result<Option<Post>, Error> {
        Ok(self
            .pool
            .fetch_optional(
                &format!("SELECT {} FROM posts WHERE postid=?;", POST_COLUMNS),
                args![postid],
            )
            .await?
            .map(|row| Post::from_row(&row)))
    }

    /// Record the moderation verdict and when it happened.
    pub async fn set_post_status(&self, postid: i64, status: PostStatus) -> Result<(), Error> {
        self.pool
            .execute(
                "UPDATE posts SET status=?, decided_at=? WHERE postid=?;",
                args![u8::from(status), Utc::now(), postid],
            )
            .await?;
        Ok(())
    }

    pub async fn set_channel_message(
        &self,
        postid: i64,
        message_id: MessageId,
    ) -> Result<(), Error> {
        self.pool
            .execute(
                "UPDATE posts SET channel_message_id=? WHERE postid=?;",
                args![message_id.0, postid],
            )
            .await?;
        Ok(())
    }

    pub async fn set_review_message(
        &self,
        postid: i64,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), Error> {
        self.pool
            .execute(
                "UPDATE posts SET review_chat_id=?, review_message_id=? WHERE postid=?;",
                args![chat_id.0, message_id.0, postid],
            )
            .await?;
        Ok(())
    }

    /// Oldest pending posts first, so nobody's confession rots at the
    /// bottom of the pile.
    pub async fn pending_posts(&self, limit: u32) -> Result<Vec<Post>, Error> {
        Ok(self
            .pool
            .fetch_all(
                &format!(
                    "SELECT {} FROM posts WHERE status=0 ORDER BY postid LIMIT ?;",
                    POST_COLUMNS
                ),
                args![limit],
            )
            .await?
            .iter()
            .map(Post::from_row)
            .collect())
    }

    /// How many posts this user has submitted since `since`. The rate
    /// limiter's one query.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub async fn posts_by_user_since(
        &self,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, Error> {
        let row = self
            .pool
            .fetch_one(
                "SELECT COUNT(*) FROM posts WHERE userid=? AND created_at >= ?;",
                args![user.0 as i64, since],
            )
            .await?;
        Ok(row.i64(0) as u32)
    }

    /// Find the approved post behind a channel message. Used to route
    /// reactions, whose callbacks only know the message they sit under.
    pub async fn approved_post_by_channel_message(
        &self,
        message_id: MessageId,
    ) -> Result<Option<Post>, Error> {
        Ok(self
            .pool
            .fetch_optional(
                &format!(
                    "SELECT {} FROM posts WHERE channel_message_id=? AND status=1;",
                    POST_COLUMNS
                ),
                args![message_id.0],
            )
            .await?
            .map(|row| Post::from_row(&row)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_database;
    use super::*;

    #[tokio::test]
    async fn post_lifecycle() {
        let db = test_database().await;
        let user = UserId(42);
        db.ensure_user(user).await.unwrap();

        let postid = db
            .add_post(user, PostKind::Text, Some("i ate the leftovers"), None)
            .await
            .unwrap();

        let post = db.get_post(postid).await.unwrap().unwrap();
        assert_eq!(post.userid, user);
        assert_eq!(post.status, PostStatus::Pending);
        assert_eq!(post.kind, PostKind::Text);
        assert_eq!(post.text.as_deref(), Some("i ate the leftovers"));
        assert!(post.decided_at.is_none());

        db.set_post_status(postid, PostStatus::Approved)
            .await
            .unwrap();
        db.set_channel_message(postid, MessageId(777)).await.unwrap();

        let post = db.get_post(postid).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Approved);
        assert_eq!(post.channel_message_id, Some(MessageId(777)));
        assert!(post.decided_at.is_some());

        let found = db
            .approved_post_by_channel_message(MessageId(777))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.postid, postid);
    }

    #[tokio::test]
    async fn pending_posts_come_oldest_first() {
        let db = test_database().await;
        let user = UserId(1);
        db.ensure_user(user).await.unwrap();

        let first = db.add_post(user, PostKind::Text, Some("a"), None).await.unwrap();
        let second = db.add_post(user, PostKind::Text, Some("b"), None).await.unwrap();
        db.set_post_status(second, PostStatus::Rejected).await.unwrap();
        let third = db.add_post(user, PostKind::Text, Some("c"), None).await.unwrap();

        let pending: Vec<i64> = db
            .pending_posts(10)
            .await
            .unwrap()
            .iter()
            .map(|x| x.postid)
            .collect();
        assert_eq!(pending, vec![first, third]);
    }

    #[tokio::test]
    async fn rate_limit_counting() {
        let db = test_database().await;
        let user = UserId(1);
        db.ensure_user(user).await.unwrap();

        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(db.posts_by_user_since(user, hour_ago).await.unwrap(), 0);

        db.add_post(user, PostKind::Text, Some("a"), None).await.unwrap();
        db.add_post(user, PostKind::Photo, None, Some("fileid")).await.unwrap();
        assert_eq!(db.posts_by_user_since(user, hour_ago).await.unwrap(), 2);

        // Posts from the future shouldn't exist; posts since the far
        // future shouldn't count.
        let tomorrow = Utc::now() + chrono::Duration::days(1);
        assert_eq!(db.posts_by_user_since(user, tomorrow).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejected_post_is_not_found_by_channel_message() {
        let db = test_database().await;
        let user = UserId(1);
        db.ensure_user(user).await.unwrap();

        let postid = db.add_post(user, PostKind::Text, Some("x"), None).await.unwrap();
        db.set_channel_message(postid, MessageId(5)).await.unwrap();
        db.set_post_status(postid, PostStatus::Rejected).await.unwrap();

        assert!(db
            .approved_post_by_channel_message(MessageId(5))
            .await
            .unwrap()
            .is_none());
    }
}
