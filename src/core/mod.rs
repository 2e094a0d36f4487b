//! 核心编排层：运行级错误、白板状态、记忆化步骤、终态解析、Run 入口与分发

pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod state;
pub mod step;

pub use error::AgentError;
pub use orchestrator::{run_code_agent, submit_request, RunDispatcher, RunOptions, RunReport, RunRequest};
pub use resolver::{
    classify, ResultResolver, RunIdentity, RunOutput, RunStatus, DEFAULT_ENDPOINT_PORT, ERROR_MESSAGE,
};
pub use state::{AgentState, FileEntry};
pub use step::{run_step, MemoStepRunner, StepError, StepFn, StepRunner};
