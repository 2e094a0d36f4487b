//! Mock / Scripted LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! - MockLlmClient：无状态。首轮写一个 README.md，看到写入结果后输出带完成标记的总结；辅助调用回显总结正文。
//! - ScriptedLlmClient：按脚本依次返回 Agent 输出；辅助调用（无工具目录）按 system prompt 关键字匹配返回。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmRequest, ModelOutput, ToolCall};
use crate::memory::Role;

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<ModelOutput, LlmError> {
        let last_user = request.last_user().unwrap_or("(no input)").to_string();

        if request.tools.is_empty() {
            let body = last_user
                .replace("<task_summary>", "")
                .replace("</task_summary>", "");
            return Ok(ModelOutput::Text(body.trim().to_string()));
        }

        let wrote = request
            .messages
            .iter()
            .any(|m| m.role == Role::User && m.content.starts_with("Observation from write_files"));
        if wrote {
            return Ok(ModelOutput::Text(
                "<task_summary>Mock agent wrote README.md describing the request.</task_summary>"
                    .to_string(),
            ));
        }

        let goal = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ModelOutput::ToolCall(ToolCall {
            tool: "write_files".to_string(),
            args: serde_json::json!({
                "files": [{"path": "README.md", "content": format!("# Request\n\n{}\n", goal)}]
            }),
        }))
    }
}

/// 脚本化客户端：可断言收到的请求
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    agent_script: Mutex<VecDeque<ModelOutput>>,
    agent_fallback: Option<ModelOutput>,
    aux_rules: Vec<(String, Result<ModelOutput, LlmError>)>,
    requests: Mutex<Vec<LlmRequest>>,
    served: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new<I>(agent_outputs: I) -> Self
    where
        I: IntoIterator<Item = ModelOutput>,
    {
        Self {
            agent_script: Mutex::new(agent_outputs.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 脚本用尽后一直返回该输出
    pub fn then_repeat(mut self, output: ModelOutput) -> Self {
        self.agent_fallback = Some(output);
        self
    }

    /// 辅助调用：system prompt 包含 `needle` 时返回 `output`
    pub fn with_aux(mut self, needle: &str, output: ModelOutput) -> Self {
        self.aux_rules.push((needle.to_string(), Ok(output)));
        self
    }

    /// 辅助调用：system prompt 包含 `needle` 时返回错误
    pub fn with_aux_error(mut self, needle: &str, error: LlmError) -> Self {
        self.aux_rules.push((needle.to_string(), Err(error)));
        self
    }

    /// 收到的全部请求
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 带工具目录的（Agent Step）请求数
    pub fn agent_calls(&self) -> usize {
        self.requests().iter().filter(|r| !r.tools.is_empty()).count()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<ModelOutput, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        let n = self.served.fetch_add(1, Ordering::SeqCst);

        if request.tools.is_empty() {
            return self
                .aux_rules
                .iter()
                .find(|(needle, _)| request.system_prompt.contains(needle.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_else(|| Err(LlmError::Request("no scripted auxiliary response".to_string())));
        }

        let next = self
            .agent_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next.or_else(|| self.agent_fallback.clone()) {
            Some(out) => Ok(out),
            None => Err(LlmError::ScriptExhausted(n)),
        }
    }
}
