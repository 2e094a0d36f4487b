//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock / Scripted）实现 LlmClient：
//! 输入 LlmRequest（system prompt、消息、工具目录、temperature、最大输出 token），输出 ModelOutput。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::ModelOutput;
use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("rate limited")]
    RateLimited,

    #[error("malformed tool call: {0}")]
    MalformedToolCall(String),

    #[error("script exhausted after {0} responses")]
    ScriptExhausted(usize),
}

/// 工具目录条目（名称、描述、参数 JSON Schema）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// 单次模型调用请求
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    /// 空表示不提供工具（如辅助摘要调用）
    pub tools: Vec<ToolSpec>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            tools: Vec::new(),
            temperature: 0.1,
            max_output_tokens: 4096,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// 最后一条 User 消息
    pub fn last_user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::memory::Role::User))
            .map(|m| m.content.as_str())
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<ModelOutput, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 将工具目录渲染为 system prompt 中的 Available tools 段落（供纯文本协议的后端使用）
pub fn render_tool_catalogue(tools: &[ToolSpec]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let specs = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
    format!(
        "## Available tools\n{}\n\n\
         To call a tool, reply with exactly one JSON object and nothing else:\n\
         {{\"tool\": \"<tool name>\", \"args\": {{...}}}}\n",
        specs
    )
}
