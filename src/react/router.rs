//! 路由：纯函数，根据白板与已完成的 Agent Step 数决定下一步

use serde::{Deserialize, Serialize};

use crate::core::AgentState;

/// 迭代上限默认值
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// 可被调度的 Agent（当前只有 Code Agent）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentId {
    CodeAgent,
}

impl AgentId {
    /// 作为记忆化步骤名
    pub fn step_name(&self) -> &'static str {
        match self {
            AgentId::CodeAgent => "code-agent",
        }
    }
}

/// 停止原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Agent 输出了完成标记
    Completed,
    /// 达到迭代上限
    IterationLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    Continue(AgentId),
    Stop(StopReason),
}

/// summary 非空优先于迭代上限
pub fn route(state: &AgentState, iteration: usize, max_iterations: usize) -> RouteDecision {
    if state.has_summary() {
        RouteDecision::Stop(StopReason::Completed)
    } else if iteration >= max_iterations {
        RouteDecision::Stop(StopReason::IterationLimit)
    } else {
        RouteDecision::Continue(AgentId::CodeAgent)
    }
}
