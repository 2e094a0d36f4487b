//! 异步 SQLite 记录存储（sqlx）
//!
//! 需要启用 `async-sqlite` feature。messages 表以自增 seq 保序、记录 ID 唯一，终态记录重复写入时按 ID 覆盖，
//! 产物（artifact）以 JSON 文本列保存。

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::memory::records::{parse_role, role_str};
    use crate::memory::{Artifact, Message, MessageRecord, RecordKind, RecordStore, StoreError};

    fn db_err(e: sqlx::Error) -> StoreError {
        StoreError::Database(e.to_string())
    }

    /// SQLite 记录存储
    pub struct SqliteStore {
        pool: SqlitePool,
    }

    impl SqliteStore {
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await
                .map_err(db_err)?;

            let store = Self { pool };
            store.init_tables().await?;
            Ok(store)
        }

        async fn init_tables(&self) -> Result<(), StoreError> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS messages (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    conversation_id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    content TEXT NOT NULL,
                    artifact TEXT,
                    created_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
            )
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(())
        }

        async fn fetch(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
            let rows = sqlx::query(
                "SELECT id, conversation_id, role, kind, content, artifact, created_at
                 FROM messages WHERE conversation_id = ? ORDER BY seq ASC",
            )
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let role: String = row.get("role");
                let kind: String = row.get("kind");
                let artifact: Option<String> = row.get("artifact");
                let created_at: String = row.get("created_at");
                let artifact = match artifact {
                    Some(json) => Some(serde_json::from_str::<Artifact>(&json)?),
                    None => None,
                };
                records.push(MessageRecord {
                    id: row.get("id"),
                    conversation_id: row.get("conversation_id"),
                    role: parse_role(&role),
                    kind: RecordKind::parse(&kind),
                    content: row.get("content"),
                    artifact,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                });
            }
            Ok(records)
        }
    }

    #[async_trait]
    impl RecordStore for SqliteStore {
        async fn append(&self, record: MessageRecord) -> Result<(), StoreError> {
            let artifact = match &record.artifact {
                Some(a) => Some(serde_json::to_string(a)?),
                None => None,
            };
            sqlx::query(
                "INSERT INTO messages (id, conversation_id, role, kind, content, artifact, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    role = excluded.role,
                    kind = excluded.kind,
                    content = excluded.content,
                    artifact = excluded.artifact",
            )
            .bind(&record.id)
            .bind(&record.conversation_id)
            .bind(role_str(&record.role))
            .bind(record.kind.as_str())
            .bind(&record.content)
            .bind(artifact)
            .bind(record.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        }

        async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
            let rows = sqlx::query(
                "SELECT role, content FROM messages WHERE conversation_id = ?
                 ORDER BY seq DESC LIMIT ?",
            )
            .bind(conversation_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

            let mut messages: Vec<Message> = rows
                .into_iter()
                .map(|row| {
                    let role: String = row.get("role");
                    Message {
                        role: parse_role(&role),
                        content: row.get("content"),
                    }
                })
                .collect();
            messages.reverse();
            Ok(messages)
        }

        async fn records(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
            self.fetch(conversation_id).await
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::SqliteStore;
