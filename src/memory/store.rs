//! 记录存储抽象
//!
//! RecordStore 统一内存 / JSON 文件 / SQLite 三种后端：追加消息、读取最近 N 条历史、按会话列出记录。
//! append 以记录 ID 幂等（同 ID 覆盖），配合 save-result 步骤保证每次 Run 只有一条终态记录。

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::{Message, MessageRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// 记录存储接口
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 追加（或按 ID 覆盖）一条记录
    async fn append(&self, record: MessageRecord) -> Result<(), StoreError>;

    /// 会话最近 `limit` 条消息，按时间正序
    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// 会话全部记录，按写入顺序
    async fn records(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError>;
}

/// 按 ID 覆盖或追加
pub(crate) fn upsert(records: &mut Vec<MessageRecord>, record: MessageRecord) {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

pub(crate) fn tail_messages(records: &[MessageRecord], limit: usize) -> Vec<Message> {
    let start = records.len().saturating_sub(limit);
    records[start..].iter().map(MessageRecord::to_message).collect()
}

/// 内存存储：会话 ID -> 记录列表
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Vec<MessageRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn append(&self, record: MessageRecord) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let records = conversations.entry(record.conversation_id.clone()).or_default();
        upsert(records, record);
        Ok(())
    }

    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(conversation_id)
            .map(|r| tail_messages(r, limit))
            .unwrap_or_default())
    }

    async fn records(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).cloned().unwrap_or_default())
    }
}
