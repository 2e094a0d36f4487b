//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(ctx, call) 在超时内调用对应工具；
//! 未知工具、参数错误、工具失败、超时一律转为 `Error: ...` Observation，白板不变，不会中断 Run。
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::llm::{ToolCall, ToolSpec};
use crate::tools::{ToolContext, ToolOutcome, ToolRegistry};

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn execute(&self, ctx: &ToolContext<'_>, call: &ToolCall) -> ToolOutcome {
        let start = Instant::now();
        let args_preview = args_preview(&call.args);

        let (outcome, status) = match self.registry.get(&call.tool) {
            None => (
                ToolOutcome::error(format!("Unknown tool: {}", call.tool), ctx.state),
                "unknown",
            ),
            Some(tool) => match timeout(self.timeout, tool.execute(ctx, call.args.clone())).await {
                Ok(Ok(outcome)) => (outcome, "ok"),
                Ok(Err(e)) => (ToolOutcome::error(e, ctx.state), "error"),
                Err(_) => (
                    ToolOutcome::error(
                        format!("tool {} timed out after {}s", call.tool, self.timeout.as_secs()),
                        ctx.state,
                    ),
                    "timeout",
                ),
            },
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool,
            "sandbox": ctx.handle.as_str(),
            "ok": status == "ok",
            "outcome": status,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
            "state_version": outcome.state.version,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        outcome
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentState;
    use crate::sandbox::{MemorySandbox, SandboxGateway};
    use async_trait::async_trait;

    struct SlowTool;

    #[async_trait]
    impl crate::tools::Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, ctx: &ToolContext<'_>, _args: serde_json::Value) -> Result<ToolOutcome, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolOutcome::new("done", ctx.state.clone()))
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let sandbox = MemorySandbox::new();
        let handle = sandbox.provision().await.unwrap();
        let state = AgentState::new();
        let ctx = ToolContext { sandbox: &sandbox, handle: &handle, state: &state };
        let executor = ToolExecutor::new(ToolRegistry::code_agent_tools(), 5);

        let call = ToolCall { tool: "deploy".into(), args: serde_json::json!({}) };
        let outcome = executor.execute(&ctx, &call).await;
        assert_eq!(outcome.observation, "Error: Unknown tool: deploy");
        assert_eq!(outcome.state, state);
    }

    #[tokio::test]
    async fn test_timeout_becomes_observation() {
        let sandbox = MemorySandbox::new();
        let handle = sandbox.provision().await.unwrap();
        let state = AgentState::new();
        let ctx = ToolContext { sandbox: &sandbox, handle: &handle, state: &state };
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor { registry, timeout: Duration::from_millis(20) };

        let call = ToolCall { tool: "slow".into(), args: serde_json::json!({}) };
        let outcome = executor.execute(&ctx, &call).await;
        assert!(outcome.observation.starts_with("Error: tool slow timed out"));
    }

    #[tokio::test]
    async fn test_bad_args_becomes_observation() {
        let sandbox = MemorySandbox::new();
        let handle = sandbox.provision().await.unwrap();
        let state = AgentState::new();
        let ctx = ToolContext { sandbox: &sandbox, handle: &handle, state: &state };
        let executor = ToolExecutor::new(ToolRegistry::code_agent_tools(), 5);

        let call = ToolCall { tool: "write_files".into(), args: serde_json::json!({"path": "x"}) };
        let outcome = executor.execute(&ctx, &call).await;
        assert!(outcome.observation.starts_with("Error: invalid arguments for write_files"));
        assert!(outcome.state.files.is_empty());
    }
}
