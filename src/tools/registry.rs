//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时加超时，并把失败统一转成 Observation。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentState;
use crate::llm::ToolSpec;
use crate::sandbox::{SandboxGateway, SandboxHandle};
use crate::tools::{ReadFilesTool, RunCommandTool, WriteFilesTool};

/// 工具执行上下文：本次 Run 绑定的沙箱与当前白板
pub struct ToolContext<'a> {
    pub sandbox: &'a dyn SandboxGateway,
    pub handle: &'a SandboxHandle,
    pub state: &'a AgentState,
}

/// 一次工具调用的结果：回给 Agent 的 Observation + 调用后的白板
///
/// 作为工具步骤的记忆化输出整体序列化，重放时直接还原。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub observation: String,
    pub state: AgentState,
}

impl ToolOutcome {
    pub fn new(observation: impl Into<String>, state: AgentState) -> Self {
        Self {
            observation: observation.into(),
            state,
        }
    }

    /// 失败结果：白板保持不变
    pub fn error(message: impl std::fmt::Display, state: &AgentState) -> Self {
        Self::new(format!("Error: {}", message), state.clone())
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段，也是步骤名）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 为错误描述，由执行器包装成 `Error: ...` Observation
    async fn execute(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolOutcome, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Code Agent 的固定工具集：run_command / write_files / read_files
    pub fn code_agent_tools() -> Self {
        let mut registry = Self::new();
        registry.register(RunCommandTool);
        registry.register(WriteFilesTool);
        registry.register(ReadFilesTool);
        registry
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 工具目录（按名称排序，保证 prompt 稳定）
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .iter()
            .map(|(name, tool)| ToolSpec {
                name: name.clone(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}
