//! 记忆层：对话上下文（最近 N 条）、消息记录与终态产物、记录存储后端

pub mod async_persistence;
pub mod conversation;
pub mod persistence;
pub mod records;
pub mod store;

#[cfg(feature = "async-sqlite")]
pub use async_persistence::SqliteStore;
pub use conversation::{ConversationContext, Message, Role};
pub use persistence::JsonFileStore;
pub use records::{Artifact, MessageRecord, RecordKind};
pub use store::{MemoryStore, RecordStore, StoreError};
