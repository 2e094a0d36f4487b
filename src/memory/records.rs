//! 消息记录与终态产物
//!
//! 用户请求与每次 Run 的终态结果都以 MessageRecord 形式写入存储；终态记录 role 固定为 Assistant，
//! 成功时附带 Artifact（可访问地址、标题、文件快照）。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{Message, Role};

/// 记录类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    Result,
    Error,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Result => "RESULT",
            RecordKind::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("error") {
            RecordKind::Error
        } else {
            RecordKind::Result
        }
    }
}

/// 生成产物快照
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub endpoint_url: String,
    pub title: String,
    pub files: HashMap<String, String>,
}

/// 一条持久化消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// 记录 ID；终态记录由 run_id 派生，重复写入同一 ID 视为覆盖
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub kind: RecordKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// 用户请求
    pub fn user(conversation_id: &str, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: Role::User,
            kind: RecordKind::Result,
            content: content.into(),
            artifact: None,
            created_at: Utc::now(),
        }
    }

    /// 成功终态
    pub fn result(run_id: &str, conversation_id: &str, content: impl Into<String>, artifact: Artifact) -> Self {
        Self {
            id: terminal_record_id(run_id),
            conversation_id: conversation_id.to_string(),
            role: Role::Assistant,
            kind: RecordKind::Result,
            content: content.into(),
            artifact: Some(artifact),
            created_at: Utc::now(),
        }
    }

    /// 失败终态
    pub fn error(run_id: &str, conversation_id: &str, content: impl Into<String>) -> Self {
        Self {
            id: terminal_record_id(run_id),
            conversation_id: conversation_id.to_string(),
            role: Role::Assistant,
            kind: RecordKind::Error,
            content: content.into(),
            artifact: None,
            created_at: Utc::now(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message {
            role: self.role.clone(),
            content: self.content.clone(),
        }
    }
}

pub fn terminal_record_id(run_id: &str) -> String {
    format!("{}:result", run_id)
}

#[cfg_attr(not(feature = "async-sqlite"), allow(dead_code))]
pub(crate) fn role_str(role: &Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

#[cfg_attr(not(feature = "async-sqlite"), allow(dead_code))]
pub(crate) fn parse_role(s: &str) -> Role {
    match s {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        _ => Role::System,
    }
}
