//! 运行级错误类型
//!
//! 工具层失败不会出现在这里（在 Tool Set 内部转为 Observation 文本）；
//! 只有会让整次 Run 失败的错误（沙箱分配、端点解析、LLM 调用、归档写入、步骤重试耗尽）才上抛为 AgentError。

use thiserror::Error;

use crate::core::step::StepError;
use crate::llm::LlmError;
use crate::memory::StoreError;
use crate::sandbox::SandboxError;

/// Run 过程中的致命错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Step failed: {0}")]
    Step(#[from] StepError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Run dispatcher stopped")]
    DispatcherClosed,
}
