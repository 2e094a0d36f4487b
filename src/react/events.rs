//! Run 过程事件：用于 CLI `--events` 等前端展示步骤、工具调用与观察

use serde::Serialize;

use crate::react::StopReason;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 沙箱已分配
    SandboxReady { run_id: String, sandbox: String },
    /// 第几次 Agent Step
    StepUpdate { iteration: usize, max_iterations: usize },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// Agent 文本回复
    AgentMessage { text: String },
    /// 捕获到完成总结
    SummaryCaptured,
    /// 循环结束
    LoopFinished { reason: StopReason, iterations: usize },
    /// 终态记录已写入
    ResultSaved { run_id: String, kind: String },
    /// 错误
    Error { text: String },
}

/// 可选事件通道上发送；接收端已关闭时忽略
pub(crate) fn send_event(tx: Option<&tokio::sync::mpsc::UnboundedSender<RunEvent>>, ev: RunEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let ev = RunEvent::LoopFinished {
            reason: StopReason::IterationLimit,
            iterations: 15,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "loop_finished");
        assert_eq!(v["reason"], "iteration_limit");
    }
}
