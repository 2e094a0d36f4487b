//! 终态辅助调用：根据完成总结生成标题与面向用户的回复
//!
//! 两个调用互不依赖；输出按「文本原样 / 片段拼接 / 其它或失败用兜底」归一化，不会向上抛错。

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError, LlmRequest, ModelOutput};
use crate::memory::Message;

pub const TITLE_FALLBACK: &str = "Fragment";
pub const RESPONSE_FALLBACK: &str = "Here you go";

/// 把辅助调用结果归一化为字符串
pub fn normalize(output: Result<ModelOutput, LlmError>, fallback: &str) -> String {
    match output {
        Ok(ModelOutput::Text(text)) => text,
        Ok(ModelOutput::Fragments(parts)) => parts.concat(),
        Ok(ModelOutput::ToolCall(call)) => {
            tracing::warn!(tool = %call.tool, "auxiliary call returned a tool call, using fallback");
            fallback.to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, "auxiliary call failed, using fallback");
            fallback.to_string()
        }
    }
}

pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
    title_prompt: String,
    response_prompt: String,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmClient>, title_prompt: impl Into<String>, response_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            title_prompt: title_prompt.into(),
            response_prompt: response_prompt.into(),
        }
    }

    pub async fn title(&self, summary: &str) -> String {
        let output = self.ask(&self.title_prompt, summary).await;
        normalize(output, TITLE_FALLBACK)
    }

    pub async fn response(&self, summary: &str) -> String {
        let output = self.ask(&self.response_prompt, summary).await;
        normalize(output, RESPONSE_FALLBACK)
    }

    async fn ask(&self, prompt: &str, summary: &str) -> Result<ModelOutput, LlmError> {
        let request = LlmRequest::new(prompt, vec![Message::user(summary)]);
        self.llm.complete(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ScriptedLlmClient, ToolCall};

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Ok(ModelOutput::Text("Login Form".into())), TITLE_FALLBACK), "Login Form");
        assert_eq!(
            normalize(Ok(ModelOutput::Fragments(vec!["Log".into(), "in".into()])), TITLE_FALLBACK),
            "Login"
        );
        let call = ToolCall { tool: "run_command".into(), args: serde_json::json!({}) };
        assert_eq!(normalize(Ok(ModelOutput::ToolCall(call)), TITLE_FALLBACK), "Fragment");
        assert_eq!(normalize(Err(LlmError::RateLimited), RESPONSE_FALLBACK), "Here you go");
    }

    #[tokio::test]
    async fn test_title_and_response_use_their_prompts() {
        let llm = Arc::new(
            ScriptedLlmClient::new(vec![])
                .with_aux("TITLE", ModelOutput::Text("Chat Widget".into()))
                .with_aux_error("RESPONSE", LlmError::RateLimited),
        );
        let summarizer = Summarizer::new(llm.clone(), "TITLE", "RESPONSE");
        assert_eq!(summarizer.title("<task_summary>x</task_summary>").await, "Chat Widget");
        assert_eq!(summarizer.response("<task_summary>x</task_summary>").await, RESPONSE_FALLBACK);
        assert_eq!(llm.requests()[0].messages[0].content, "<task_summary>x</task_summary>");
    }
}
