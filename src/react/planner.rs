//! Code Agent：单次 Agent Step
//!
//! 拼装 system prompt（人设 + 白板快照）、对话历史与本次 Run 的往返记录、工具目录后调用 LLM；
//! 回复后由 capture_summary 检查完成标记，这是 summary 变为非空的唯一途径。

use std::sync::Arc;

use crate::core::{AgentError, AgentState};
use crate::llm::{LlmClient, LlmError, LlmRequest, ModelOutput, ToolSpec};
use crate::memory::{ConversationContext, Message};
use crate::react::prompts::COMPLETION_MARKER;

/// Code Agent：持有 LLM、system prompt、完成标记与采样参数
pub struct CodeAgent {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    completion_marker: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl CodeAgent {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            completion_marker: COMPLETION_MARKER.to_string(),
            temperature: 0.1,
            max_output_tokens: 4096,
        }
    }

    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = marker.into();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub fn build_request(
        &self,
        conversation: &ConversationContext,
        transcript: &[Message],
        state: &AgentState,
        tools: Vec<ToolSpec>,
    ) -> LlmRequest {
        let system = format!("{}\n\n{}", self.system_prompt, state.to_prompt_section());
        let mut messages = conversation.messages().to_vec();
        messages.extend_from_slice(transcript);
        LlmRequest::new(system, messages)
            .with_tools(tools)
            .with_sampling(self.temperature, self.max_output_tokens)
    }

    pub async fn step(
        &self,
        conversation: &ConversationContext,
        transcript: &[Message],
        state: &AgentState,
        tools: Vec<ToolSpec>,
    ) -> Result<ModelOutput, AgentError> {
        let request = self.build_request(conversation, transcript, state, tools);
        tracing::debug!(messages = request.messages.len(), version = state.version, "code agent step");
        match self.llm.complete(&request).await {
            // 工具调用 JSON 损坏时按文本回复处理，下一轮 Agent 能看到自己的输出并修正
            Err(LlmError::MalformedToolCall(raw)) => {
                tracing::warn!(raw = %raw, "malformed tool call treated as text");
                Ok(ModelOutput::Text(raw))
            }
            other => Ok(other?),
        }
    }

    /// 回复含完成标记且 summary 仍为空时，把整段文本写入 summary
    pub fn capture_summary(&self, state: &AgentState, text: &str) -> AgentState {
        if !state.has_summary() && text.contains(&self.completion_marker) {
            state.with_summary(text)
        } else {
            state.clone()
        }
    }
}
