use super::{Database, Error};
use crate::types::{PostStatus, ReactionKind};

/// A snapshot of the whole operation, for `/stats`.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub total_posts: u32,
    pub pending_posts: u32,
    pub approved_posts: u32,
    pub rejected_posts: u32,
    pub users: u32,
    pub comments: u32,
    pub reactions: Vec<(ReactionKind, u32)>,
}

impl Database {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub async fn stats(&self) -> Result<Stats, Error> {
        let mut stats = Stats::default();

        for row in self
            .pool
            .fetch_all("SELECT status, COUNT(*) FROM posts GROUP BY status;", vec![])
            .await?
        {
            let count = row.i64(1) as u32;
            stats.total_posts += count;
            match PostStatus::from(row.i64(0) as u8) {
                PostStatus::Pending => stats.pending_posts = count,
                PostStatus::Approved => stats.approved_posts = count,
                PostStatus::Rejected => stats.rejected_posts = count,
            }
        }

        stats.users = self
            .pool
            .fetch_one("SELECT COUNT(*) FROM users;", vec![])
            .await?
            .i64(0) as u32;

        stats.comments = self
            .pool
            .fetch_one("SELECT COUNT(*) FROM comments;", vec![])
            .await?
            .i64(0) as u32;

        // All posts together. `reaction_counts` is per-post, so this
        // one gets its own query.
        let mut reactions: Vec<(ReactionKind, u32)> = crate::types::REACTIONS
            .iter()
            .map(|kind| (*kind, 0))
            .collect();
        for row in self
            .pool
            .fetch_all("SELECT kind, COUNT(*) FROM reactions GROUP BY kind;", vec![])
            .await?
        {
            let kind = ReactionKind::from(row.i64(0) as u8);
            if let Some(entry) = reactions.iter_mut().find(|(k, _)| *k == kind) {
                entry.1 = row.i64(1) as u32;
            }
        }
        stats.reactions = reactions;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_database;
    use crate::types::{PostKind, PostStatus, ReactionKind};
    use teloxide::types::UserId;

    #[tokio::test]
    async fn stats_add_up() {
        let db = test_database().await;
        for id in 1..=3u64 {
            db.ensure_user(UserId(id)).await.unwrap();
        }

        let a = db.add_post(UserId(1), PostKind::Text, Some("a"), None).await.unwrap();
        let b = db.add_post(UserId(2), PostKind::Text, Some("b"), None).await.unwrap();
        db.add_post(UserId(3), PostKind::Text, Some("c"), None).await.unwrap();

        db.set_post_status(a, PostStatus::Approved).await.unwrap();
        db.set_post_status(b, PostStatus::Rejected).await.unwrap();

        db.add_comment(a, UserId(2), "lol").await.unwrap();
        db.set_reaction(a, UserId(2), ReactionKind::Heart).await.unwrap();
        db.set_reaction(a, UserId(3), ReactionKind::Heart).await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total_posts, 3);
        assert_eq!(stats.pending_posts, 1);
        assert_eq!(stats.approved_posts, 1);
        assert_eq!(stats.rejected_posts, 1);
        assert_eq!(stats.users, 3);
        assert_eq!(stats.comments, 1);
        assert_eq!(stats.reactions[0], (ReactionKind::Heart, 2));
    }

    #[tokio::test]
    async fn empty_database_is_all_zeros() {
        let db = test_database().await;
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total_posts, 0);
        assert_eq!(stats.users, 0);
        assert!(stats.reactions.iter().all(|(_, count)| *count == 0));
    }
}
