use std::io::Write;

use serde::Serialize;
use tokio_stream::StreamExt;

use super::{Database, Error};

/// What one approved post looks like in an export dump. One JSON object
/// per line; easy to grep, easy to reimport.
#[derive(Serialize)]
struct ExportedPost {
    postid: i64,
    kind: u8,
    text: Option<String>,
    file_id: Option<String>,
    created_at: String,
}

impl Database {
    /// Dump all approved posts as JSON lines into `out`. Returns how
    /// many were written. Rows are streamed, not slurped; the backup
    /// shouldn't need the whole table in memory.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub async fn export_posts(&self, out: &mut (impl Write + Send)) -> Result<u64, Error> {
        let mut rows = self.pool.fetch_stream(
            "SELECT postid, kind, text, file_id, created_at
            FROM posts WHERE status=1 ORDER BY postid",
        );

        let mut written = 0;
        while let Some(row) = rows.next().await {
            let row = row?;
            let record = ExportedPost {
                postid: row.i64(0),
                kind: row.i64(1) as u8,
                text: row.opt_text(2),
                file_id: row.opt_text(3),
                created_at: row.datetime(4).to_rfc3339(),
            };
            serde_json::to_writer(&mut *out, &record).map_err(|e| Error::Io(e.into()))?;
            out.write_all(b"\n").map_err(Error::Io)?;
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_database;
    use crate::types::{PostKind, PostStatus};
    use teloxide::types::UserId;

    #[tokio::test]
    async fn export_contains_only_approved_posts() {
        let db = test_database().await;
        db.ensure_user(UserId(1)).await.unwrap();

        let approved = db
            .add_post(UserId(1), PostKind::Text, Some("published"), None)
            .await
            .unwrap();
        db.set_post_status(approved, PostStatus::Approved)
            .await
            .unwrap();
        db.add_post(UserId(1), PostKind::Text, Some("still pending"), None)
            .await
            .unwrap();

        let mut out = Vec::new();
        let written = db.export_posts(&mut out).await.unwrap();
        assert_eq!(written, 1);

        let lines: Vec<&str> = std::str::from_utf8(&out)
            .unwrap()
            .lines()
            .collect();
        assert_eq!(lines.len(), 1);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["postid"], serde_json::json!(approved));
        assert_eq!(value["text"], serde_json::json!("published"));
        assert!(value["created_at"].is_string());
    }

    #[tokio::test]
    async fn export_of_nothing_writes_nothing() {
        let db = test_database().await;
        let mut out = Vec::new();
        assert_eq!(db.export_posts(&mut out).await.unwrap(), 0);
        assert!(out.is_empty());
    }
}
