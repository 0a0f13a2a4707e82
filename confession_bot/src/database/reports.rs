use chrono::{DateTime, Utc};
use teloxide::types::UserId;

use super::{args, pool::DbRow, Database, Error};
use crate::types::ReportStatus;

/// Someone flagged a post for the admins to look at.
#[derive(Debug, Clone)]
pub struct Report {
    pub reportid: i64,
    pub postid: i64,
    pub userid: UserId,
    pub reason: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

impl Report {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn from_row(row: &DbRow) -> Report {
        Report {
            reportid: row.i64(0),
            postid: row.i64(1),
            userid: UserId(row.i64(2) as u64),
            reason: row.opt_text(3),
            status: ReportStatus::from(row.i64(4) as u8),
            created_at: row.datetime(5),
        }
    }
}

impl Database {
    #[allow(clippy::cast_possible_wrap)]
    pub async fn add_report(
        &self,
        postid: i64,
        user: UserId,
        reason: Option<&str>,
    ) -> Result<i64, Error> {
        let row = self
            .pool
            .fetch_one(
                "INSERT INTO reports (postid, userid, reason, status, created_at)
                VALUES (?, ?, ?, 0, ?)
                RETURNING reportid;",
                args![postid, user.0 as i64, reason, Utc::now()],
            )
            .await?;
        Ok(row.i64(0))
    }

    pub async fn open_reports(&self, limit: u32) -> Result<Vec<Report>, Error> {
        Ok(self
            .pool
            .fetch_all(
                "SELECT reportid, postid, userid, reason, status, created_at
                FROM reports WHERE status=0
                ORDER BY reportid LIMIT ?;",
                args![limit],
            )
            .await?
            .iter()
            .map(Report::from_row)
            .collect())
    }

    /// Returns false if there was no such open report.
    pub async fn resolve_report(&self, reportid: i64) -> Result<bool, Error> {
        let affected = self
            .pool
            .execute(
                "UPDATE reports SET status=1 WHERE reportid=? AND status=0;",
                args![reportid],
            )
            .await?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_database;
    use crate::types::PostKind;
    use teloxide::types::UserId;

    #[tokio::test]
    async fn reports_open_and_resolve() {
        let db = test_database().await;
        let author = UserId(1);
        db.ensure_user(author).await.unwrap();
        let postid = db
            .add_post(author, PostKind::Text, Some("rude post"), None)
            .await
            .unwrap();

        let reportid = db
            .add_report(postid, UserId(2), Some("mean to cats"))
            .await
            .unwrap();
        db.add_report(postid, UserId(3), None).await.unwrap();

        let open = db.open_reports(10).await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].reason.as_deref(), Some("mean to cats"));
        assert_eq!(open[1].reason, None);

        assert!(db.resolve_report(reportid).await.unwrap());
        // Already resolved.
        assert!(!db.resolve_report(reportid).await.unwrap());

        assert_eq!(db.open_reports(10).await.unwrap().len(), 1);
    }
}
