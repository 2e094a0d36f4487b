//! JSON 文件存储
//!
//! 单文件 JSON：所有会话的记录平铺在一个数组中；每次写入整体重写文件（父目录不存在时自动创建）。
//! 适合 CLI 单机使用，跨进程保留对话历史与终态记录。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::memory::store::{tail_messages, upsert};
use crate::memory::{Message, MessageRecord, RecordStore, StoreError};

/// JSON 文件记录存储
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    /// 串行化读-改-写
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// 读取全部记录；文件不存在时返回空 Vec
    async fn load(&self) -> Result<Vec<MessageRecord>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if data.trim().is_empty() => Ok(Vec::new()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &[MessageRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }

    async fn conversation(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.conversation_id == conversation_id)
            .collect())
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn append(&self, record: MessageRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        upsert(&mut records, record);
        self.save(&records).await
    }

    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let _guard = self.lock.lock().await;
        let records = self.conversation(conversation_id).await?;
        Ok(tail_messages(&records, limit))
    }

    async fn records(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        self.conversation(conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Artifact, RecordKind};
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data/records.json");

        let store = JsonFileStore::new(&path);
        store.append(MessageRecord::user("c1", "build a counter")).await.unwrap();
        let mut files = HashMap::new();
        files.insert("counter.tsx".to_string(), "export {}".to_string());
        store
            .append(MessageRecord::result(
                "run-1",
                "c1",
                "Here is your counter",
                Artifact {
                    endpoint_url: "https://3000-x.sandbox".to_string(),
                    title: "Counter".to_string(),
                    files,
                },
            ))
            .await
            .unwrap();
        store.append(MessageRecord::user("c2", "other")).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        let records = reopened.records("c1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, RecordKind::Result);
        assert_eq!(
            records[1].artifact.as_ref().unwrap().files["counter.tsx"],
            "export {}"
        );
        let recent = reopened.recent_messages("c1", 5).await.unwrap();
        assert_eq!(recent[0].content, "build a counter");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("none.json"));
        assert!(store.records("c").await.unwrap().is_empty());
    }
}
