//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / Scripted）、模型输出解析

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod output;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use output::{parse_llm_output, ModelOutput, ToolCall};
pub use traits::{render_tool_catalogue, LlmClient, LlmError, LlmRequest, ToolSpec};
