//! 沙箱网关：每次 Run 分配一个隔离执行环境
//!
//! SandboxGateway 是编排核心消费的窄接口（provision / exec / write_file / read_file / endpoint）。
//! 所有操作都可能失败；调用方（Tool Set）负责把失败转成 Observation，只有分配与端点解析的失败会终止 Run。

pub mod local;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalSandbox;
pub use memory::MemorySandbox;

/// 沙箱错误（环境不可达、命令失败、文件缺失、路径逃逸等）
#[derive(Error, Debug, Clone)]
pub enum SandboxError {
    #[error("Sandbox unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown sandbox handle: {0}")]
    UnknownHandle(String),

    #[error("Command exited with code {exit_code}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("Command timed out after {0}s")]
    Timeout(u64),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// 与单个沙箱绑定的不透明句柄；一次 Run 内复用，不跨 Run 共享
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxHandle(pub String);

impl SandboxHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 命令执行结果
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// exec 的流式输出回调（对应 onStdout / onStderr）
pub trait OutputSink: Send {
    fn on_stdout(&mut self, chunk: &str);
    fn on_stderr(&mut self, chunk: &str);
}

/// 累积两路输出；命令失败时仍保留已收到的部分，便于诊断
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    pub stdout: String,
    pub stderr: String,
}

impl OutputSink for OutputBuffer {
    fn on_stdout(&mut self, chunk: &str) {
        self.stdout.push_str(chunk);
    }

    fn on_stderr(&mut self, chunk: &str) {
        self.stderr.push_str(chunk);
    }
}

/// 沙箱网关接口
#[async_trait]
pub trait SandboxGateway: Send + Sync {
    /// 分配一个新的执行环境
    async fn provision(&self) -> Result<SandboxHandle, SandboxError>;

    /// 执行命令；执行过程中把 stdout / stderr 分片推给 sink
    async fn exec(
        &self,
        handle: &SandboxHandle,
        command: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<ExecOutput, SandboxError>;

    async fn write_file(
        &self,
        handle: &SandboxHandle,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError>;

    async fn read_file(&self, handle: &SandboxHandle, path: &str) -> Result<String, SandboxError>;

    /// 产物对外可达的地址（如 dev server 监听端口）
    async fn endpoint(&self, handle: &SandboxHandle, port: u16) -> Result<String, SandboxError>;
}

/// 校验沙箱内相对路径：拒绝绝对路径与 `..` 组件
pub(crate) fn validate_relative_path(path: &str) -> Result<&str, SandboxError> {
    let trimmed = path.trim().trim_start_matches("./");
    if trimmed.is_empty() {
        return Err(SandboxError::NotFound("(empty path)".to_string()));
    }
    let p = std::path::Path::new(trimmed);
    if p.is_absolute()
        || p
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(SandboxError::PathEscape(path.to_string()));
    }
    Ok(trimmed)
}
