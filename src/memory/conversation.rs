//! 对话上下文
//!
//! Run 开始时从存储取回最近 N 条历史消息（默认 5 条，按时间正序），之后只读；
//! 本次 Run 内 Agent 的工具调用与观察写入单独的 transcript，不回写历史。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 有界、只读的历史对话
#[derive(Clone, Debug, Default)]
pub struct ConversationContext {
    messages: Vec<Message>,
}

impl ConversationContext {
    /// 只保留最近 `limit` 条（输入按时间正序）
    pub fn from_recent(mut messages: Vec<Message>, limit: usize) -> Self {
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_recent_keeps_latest_in_order() {
        let msgs: Vec<Message> = (0..8).map(|i| Message::user(format!("m{}", i))).collect();
        let ctx = ConversationContext::from_recent(msgs, 5);
        assert_eq!(ctx.len(), 5);
        assert_eq!(ctx.messages()[0].content, "m3");
        assert_eq!(ctx.messages()[4].content, "m7");
    }

    #[test]
    fn test_from_recent_short_history_untouched() {
        let ctx = ConversationContext::from_recent(vec![Message::assistant("hi")], 5);
        assert_eq!(ctx.messages(), &[Message::assistant("hi")]);
    }
}
