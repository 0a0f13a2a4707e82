use chrono::Utc;
use teloxide::types::UserId;

use super::{args, Database, Error};

#[allow(clippy::cast_possible_wrap)]
fn userid_to_db(user: UserId) -> i64 {
    user.0 as i64
}

impl Database {
    /// Make sure a row exists for this user. Safe to call on every
    /// interaction; existing rows are untouched.
    pub async fn ensure_user(&self, user: UserId) -> Result<(), Error> {
        self.pool
            .execute(
                "INSERT INTO users (userid, created_at) VALUES (?, ?)
                ON CONFLICT DO NOTHING;",
                args![userid_to_db(user), Utc::now()],
            )
            .await?;
        Ok(())
    }

    pub async fn is_banned(&self, user: UserId) -> Result<bool, Error> {
        Ok(self
            .pool
            .fetch_optional(
                "SELECT banned FROM users WHERE userid=?;",
                args![userid_to_db(user)],
            )
            .await?
            .map(|row| row.bool(0))
            .unwrap_or(false))
    }

    /// Ban or unban. Creates the user row if it's somehow not there yet.
    pub async fn set_banned(&self, user: UserId, banned: bool) -> Result<(), Error> {
        self.pool
            .execute(
                "INSERT INTO users (userid, banned, created_at) VALUES (?, ?, ?)
                ON CONFLICT (userid) DO UPDATE SET banned=excluded.banned;",
                args![userid_to_db(user), banned, Utc::now()],
            )
            .await?;
        Ok(())
    }

    /// Whether this user wants DMs about their own posts and comments
    /// on them. Defaults to yes.
    pub async fn wants_notify(&self, user: UserId) -> Result<bool, Error> {
        Ok(self
            .pool
            .fetch_optional(
                "SELECT notify FROM users WHERE userid=?;",
                args![userid_to_db(user)],
            )
            .await?
            .map(|row| row.bool(0))
            .unwrap_or(true))
    }

    pub async fn set_notify(&self, user: UserId, notify: bool) -> Result<(), Error> {
        self.pool
            .execute(
                "INSERT INTO users (userid, notify, created_at) VALUES (?, ?, ?)
                ON CONFLICT (userid) DO UPDATE SET notify=excluded.notify;",
                args![userid_to_db(user), notify, Utc::now()],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_database;
    use teloxide::types::UserId;

    #[tokio::test]
    async fn unknown_users_are_not_banned_and_want_notifications() {
        let db = test_database().await;
        assert!(!db.is_banned(UserId(7)).await.unwrap());
        assert!(db.wants_notify(UserId(7)).await.unwrap());
    }

    #[tokio::test]
    async fn banning_and_unbanning() {
        let db = test_database().await;
        let user = UserId(42);

        db.set_banned(user, true).await.unwrap();
        assert!(db.is_banned(user).await.unwrap());

        db.set_banned(user, false).await.unwrap();
        assert!(!db.is_banned(user).await.unwrap());
    }

    #[tokio::test]
    async fn ensure_user_does_not_clobber_flags() {
        let db = test_database().await;
        let user = UserId(42);

        db.set_notify(user, false).await.unwrap();
        db.ensure_user(user).await.unwrap();
        assert!(!db.wants_notify(user).await.unwrap());
    }
}
