use teloxide::types::UserId;

use super::{args, Database, Error};
use crate::types::{ReactionKind, REACTIONS};

#[allow(clippy::cast_possible_wrap)]
fn userid_to_db(user: UserId) -> i64 {
    user.0 as i64
}

impl Database {
    /// Set this user's reaction on a post, replacing whatever they had
    /// before. The `(postid, userid)` primary key keeps it at one per
    /// user without any application-side bookkeeping.
    pub async fn set_reaction(
        &self,
        postid: i64,
        user: UserId,
        kind: ReactionKind,
    ) -> Result<(), Error> {
        self.pool
            .execute(
                "INSERT INTO reactions (postid, userid, kind) VALUES (?, ?, ?)
                ON CONFLICT (postid, userid) DO UPDATE SET kind=excluded.kind;",
                args![postid, userid_to_db(user), u8::from(kind)],
            )
            .await?;
        Ok(())
    }

    pub async fn clear_reaction(&self, postid: i64, user: UserId) -> Result<(), Error> {
        self.pool
            .execute(
                "DELETE FROM reactions WHERE postid=? AND userid=?;",
                args![postid, userid_to_db(user)],
            )
            .await?;
        Ok(())
    }

    pub async fn get_reaction(
        &self,
        postid: i64,
        user: UserId,
    ) -> Result<Option<ReactionKind>, Error> {
        Ok(self
            .pool
            .fetch_optional(
                "SELECT kind FROM reactions WHERE postid=? AND userid=?;",
                args![postid, userid_to_db(user)],
            )
            .await?
            .map(|row| ReactionKind::from(row.i64(0) as u8)))
    }

    /// Counts for every reaction kind, zeros included, in keyboard order.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub async fn reaction_counts(&self, postid: i64) -> Result<Vec<(ReactionKind, u32)>, Error> {
        let rows = self
            .pool
            .fetch_all(
                "SELECT kind, COUNT(*) FROM reactions WHERE postid=? GROUP BY kind;",
                args![postid],
            )
            .await?;

        let mut counts: Vec<(ReactionKind, u32)> =
            REACTIONS.iter().map(|kind| (*kind, 0)).collect();
        for row in rows {
            let kind = ReactionKind::from(row.i64(0) as u8);
            if let Some(entry) = counts.iter_mut().find(|(k, _)| *k == kind) {
                entry.1 = row.i64(1) as u32;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_database;
    use crate::types::{PostKind, ReactionKind};
    use teloxide::types::UserId;

    #[tokio::test]
    async fn one_reaction_per_user_per_post() {
        let db = test_database().await;
        let author = UserId(1);
        db.ensure_user(author).await.unwrap();
        let postid = db
            .add_post(author, PostKind::Text, Some("hi"), None)
            .await
            .unwrap();

        let reactor = UserId(2);
        db.set_reaction(postid, reactor, ReactionKind::Heart)
            .await
            .unwrap();
        // Changing your mind replaces, not adds.
        db.set_reaction(postid, reactor, ReactionKind::Skull)
            .await
            .unwrap();

        assert_eq!(
            db.get_reaction(postid, reactor).await.unwrap(),
            Some(ReactionKind::Skull)
        );

        let counts = db.reaction_counts(postid).await.unwrap();
        assert_eq!(
            counts,
            vec![
                (ReactionKind::Heart, 0),
                (ReactionKind::Skull, 1),
                (ReactionKind::Laugh, 0),
            ]
        );
    }

    #[tokio::test]
    async fn clearing_a_reaction() {
        let db = test_database().await;
        let author = UserId(1);
        db.ensure_user(author).await.unwrap();
        let postid = db
            .add_post(author, PostKind::Text, Some("hi"), None)
            .await
            .unwrap();

        db.set_reaction(postid, UserId(2), ReactionKind::Laugh)
            .await
            .unwrap();
        db.clear_reaction(postid, UserId(2)).await.unwrap();

        assert_eq!(db.get_reaction(postid, UserId(2)).await.unwrap(), None);
        // Clearing twice is fine.
        db.clear_reaction(postid, UserId(2)).await.unwrap();
    }
}
