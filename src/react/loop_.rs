//! 编排主循环
//!
//! route -> Agent Step（记忆化步骤 code-agent）-> 按输出执行工具（以工具名为步骤名）或捕获完成总结 -> 下一轮 route。
//! 白板以值的形式在步骤之间传递：每个步骤的记忆化输出即下一状态，重放时按相同顺序还原。
//! 可选 event_tx：向 CLI 等前端推送 StepUpdate / ToolCall / Observation / AgentMessage。

use tokio::sync::mpsc::UnboundedSender;

use crate::core::step::{run_step, StepRunner};
use crate::core::{AgentError, AgentState};
use crate::llm::{ModelOutput, ToolCall};
use crate::memory::{ConversationContext, Message, Role};
use crate::react::events::send_event;
use crate::react::{route, CodeAgent, RouteDecision, RunEvent, StopReason, DEFAULT_MAX_ITERATIONS};
use crate::sandbox::{SandboxGateway, SandboxHandle};
use crate::tools::{ToolContext, ToolExecutor, ToolOutcome};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 循环结束时的结果
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub state: AgentState,
    pub iterations: usize,
    pub reason: StopReason,
    /// 本次 Run 的往返记录（不含历史对话）
    pub transcript: Vec<Message>,
}

/// 循环所需的组件与可选项
pub struct AgentLoop<'a> {
    pub agent: &'a CodeAgent,
    pub executor: &'a ToolExecutor,
    pub sandbox: &'a dyn SandboxGateway,
    pub steps: &'a dyn StepRunner,
    pub max_iterations: usize,
    pub event_tx: Option<&'a UnboundedSender<RunEvent>>,
}

impl<'a> AgentLoop<'a> {
    pub fn new(
        agent: &'a CodeAgent,
        executor: &'a ToolExecutor,
        sandbox: &'a dyn SandboxGateway,
        steps: &'a dyn StepRunner,
    ) -> Self {
        Self {
            agent,
            executor,
            sandbox,
            steps,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            event_tx: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 从空白板开始驱动 Agent，直到输出完成标记或达到迭代上限
    pub async fn run(
        &self,
        handle: &SandboxHandle,
        conversation: &ConversationContext,
        request: &str,
    ) -> Result<LoopOutcome, AgentError> {
        let tools = self.executor.specs();
        let mut state = AgentState::new();
        let mut transcript = initial_transcript(conversation, request);
        let mut iteration = 0;

        let reason = loop {
            let agent_id = match route(&state, iteration, self.max_iterations) {
                RouteDecision::Stop(reason) => break reason,
                RouteDecision::Continue(agent_id) => agent_id,
            };
            send_event(
                self.event_tx,
                RunEvent::StepUpdate {
                    iteration: iteration + 1,
                    max_iterations: self.max_iterations,
                },
            );

            let output: ModelOutput = {
                let agent = self.agent;
                let (transcript, state, tools) = (&transcript, &state, &tools);
                run_step(self.steps, agent_id.step_name(), move || async move {
                    agent.step(conversation, transcript, state, tools.clone()).await
                })
                .await?
            };

            match output {
                ModelOutput::ToolCall(call) => {
                    tracing::info!(iteration, tool = %call.tool, "tool call");
                    send_event(
                        self.event_tx,
                        RunEvent::ToolCall {
                            tool: call.tool.clone(),
                            args: call.args.clone(),
                        },
                    );
                    transcript.push(Message::assistant(format!(
                        "Tool call: {}",
                        serde_json::to_string(&call).unwrap_or_else(|_| call.tool.clone())
                    )));

                    let outcome = self.apply_tool(handle, &state, &call).await?;
                    send_event(
                        self.event_tx,
                        RunEvent::Observation {
                            tool: call.tool.clone(),
                            preview: preview(&outcome.observation),
                        },
                    );
                    transcript.push(Message::user(format!(
                        "Observation from {}: {}",
                        call.tool, outcome.observation
                    )));
                    state = outcome.state;
                }
                other => {
                    let text = other.text().unwrap_or_default();
                    send_event(self.event_tx, RunEvent::AgentMessage { text: text.clone() });
                    let next = self.agent.capture_summary(&state, &text);
                    if next.has_summary() && !state.has_summary() {
                        tracing::info!(iteration, "completion marker captured");
                        send_event(self.event_tx, RunEvent::SummaryCaptured);
                    }
                    transcript.push(Message::assistant(text));
                    state = next;
                }
            }
            iteration += 1;
        };

        tracing::info!(iterations = iteration, ?reason, files = state.files.len(), "agent loop finished");
        send_event(
            self.event_tx,
            RunEvent::LoopFinished {
                reason,
                iterations: iteration,
            },
        );
        Ok(LoopOutcome {
            state,
            iterations: iteration,
            reason,
            transcript,
        })
    }

    /// 以工具名为步骤名执行一次工具调用；输出（Observation + 新白板）被记忆化
    async fn apply_tool(
        &self,
        handle: &SandboxHandle,
        state: &AgentState,
        call: &ToolCall,
    ) -> Result<ToolOutcome, AgentError> {
        let (executor, sandbox) = (self.executor, self.sandbox);
        run_step(self.steps, call.tool.as_str(), move || async move {
            let ctx = ToolContext {
                sandbox,
                handle,
                state,
            };
            Ok(executor.execute(&ctx, call).await)
        })
        .await
    }
}

/// 历史对话的最后一条已是本次请求时不再重复追加
fn initial_transcript(conversation: &ConversationContext, request: &str) -> Vec<Message> {
    let already_present = conversation
        .messages()
        .last()
        .is_some_and(|m| m.role == Role::User && m.content == request);
    if already_present {
        Vec::new()
    } else {
        vec![Message::user(request)]
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::MemoStepRunner;
    use crate::llm::ScriptedLlmClient;
    use crate::sandbox::MemorySandbox;
    use crate::tools::ToolRegistry;

    fn write_call(path: &str, content: &str) -> ModelOutput {
        ModelOutput::ToolCall(ToolCall {
            tool: "write_files".into(),
            args: serde_json::json!({"files": [{"path": path, "content": content}]}),
        })
    }

    #[tokio::test]
    async fn test_stops_on_completion_marker() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            write_call("a.txt", "a"),
            ModelOutput::Text("thinking".into()),
            ModelOutput::Text("<task_summary>Done, added login form</task_summary>".into()),
            write_call("never.txt", "x"),
        ]));
        let agent = CodeAgent::new(llm.clone(), "persona");
        let executor = ToolExecutor::new(ToolRegistry::code_agent_tools(), 5);
        let sandbox = MemorySandbox::new();
        let handle = sandbox.provision().await.unwrap();
        let steps = MemoStepRunner::new();

        let outcome = AgentLoop::new(&agent, &executor, &sandbox, &steps)
            .run(&handle, &ConversationContext::default(), "add a login form")
            .await
            .unwrap();
        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.state.summary, "<task_summary>Done, added login form</task_summary>");
        assert_eq!(outcome.state.files.len(), 1);
        assert_eq!(llm.agent_calls(), 3);
    }

    #[tokio::test]
    async fn test_skips_duplicate_request_in_history() {
        let conversation = ConversationContext::from_recent(vec![Message::user("same")], 5);
        assert!(initial_transcript(&conversation, "same").is_empty());
        assert_eq!(initial_transcript(&conversation, "other").len(), 1);
    }
}
