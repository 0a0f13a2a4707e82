use chrono::{DateTime, Utc};
use teloxide::types::UserId;

use super::{args, pool::DbRow, Database, Error};

/// An anonymous comment under an approved post.
#[derive(Debug, Clone)]
pub struct Comment {
    pub commentid: i64,
    pub postid: i64,
    pub userid: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    #[allow(clippy::cast_sign_loss)]
    fn from_row(row: &DbRow) -> Comment {
        Comment {
            commentid: row.i64(0),
            postid: row.i64(1),
            userid: UserId(row.i64(2) as u64),
            text: row.text(3),
            created_at: row.datetime(4),
        }
    }
}

impl Database {
    #[allow(clippy::cast_possible_wrap)]
    pub async fn add_comment(
        &self,
        postid: i64,
        user: UserId,
        text: &str,
    ) -> Result<i64, Error> {
        let row = self
            .pool
            .fetch_one(
                "INSERT INTO comments (postid, userid, text, created_at)
                VALUES (?, ?, ?, ?)
                RETURNING commentid;",
                args![postid, user.0 as i64, text, Utc::now()],
            )
            .await?;
        Ok(row.i64(0))
    }

    /// The latest `limit` comments, oldest of those first, so the
    /// thread reads top to bottom.
    pub async fn comments_for_post(&self, postid: i64, limit: u32) -> Result<Vec<Comment>, Error> {
        let mut comments: Vec<Comment> = self
            .pool
            .fetch_all(
                "SELECT commentid, postid, userid, text, created_at
                FROM comments WHERE postid=?
                ORDER BY commentid DESC LIMIT ?;",
                args![postid, limit],
            )
            .await?
            .iter()
            .map(Comment::from_row)
            .collect();
        comments.reverse();
        Ok(comments)
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub async fn comment_count(&self, postid: i64) -> Result<u32, Error> {
        let row = self
            .pool
            .fetch_one(
                "SELECT COUNT(*) FROM comments WHERE postid=?;",
                args![postid],
            )
            .await?;
        Ok(row.i64(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_database;
    use crate::types::PostKind;
    use teloxide::types::UserId;

    #[tokio::test]
    async fn comments_thread_in_order() {
        let db = test_database().await;
        let author = UserId(1);
        let commenter = UserId(2);
        db.ensure_user(author).await.unwrap();

        let postid = db
            .add_post(author, PostKind::Text, Some("hello"), None)
            .await
            .unwrap();

        db.add_comment(postid, commenter, "first").await.unwrap();
        db.add_comment(postid, author, "second").await.unwrap();
        db.add_comment(postid, commenter, "third").await.unwrap();

        assert_eq!(db.comment_count(postid).await.unwrap(), 3);

        let texts: Vec<String> = db
            .comments_for_post(postid, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|x| x.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);

        // With a limit, it's the *latest* ones, still oldest-first.
        let texts: Vec<String> = db
            .comments_for_post(postid, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|x| x.text)
            .collect();
        assert_eq!(texts, vec!["second", "third"]);
    }

    #[tokio::test]
    async fn comment_on_missing_post_is_a_constraint_error() {
        let db = test_database().await;
        assert!(db.add_comment(999, UserId(1), "void").await.is_err());
    }
}
