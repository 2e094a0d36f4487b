//! 内存沙箱（用于测试，无需真实执行环境）
//!
//! 文件保存在进程内 map；命令结果按命令文本预置；可注入分配失败、第 N 次写入失败、端点解析失败。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::sandbox::{
    validate_relative_path, ExecOutput, OutputSink, SandboxError, SandboxGateway, SandboxHandle,
};

/// 预置的命令结果
#[derive(Debug, Clone)]
enum Scripted {
    Ok { stdout: String, stderr: String },
    Fail { stdout: String, stderr: String, exit_code: i32 },
}

/// 内存沙箱
#[derive(Debug, Default)]
pub struct MemorySandbox {
    files: Mutex<HashMap<SandboxHandle, HashMap<String, String>>>,
    commands: Mutex<HashMap<String, Scripted>>,
    provisioned: AtomicUsize,
    writes: AtomicUsize,
    fail_provision: AtomicBool,
    fail_endpoint: AtomicBool,
    fail_write_at: Mutex<Option<usize>>,
    executed: Mutex<Vec<String>>,
}

impl MemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置成功命令
    pub fn with_command(self, command: &str, stdout: &str) -> Self {
        self.lock_commands().insert(
            command.to_string(),
            Scripted::Ok {
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
        self
    }

    /// 预置失败命令（失败前已产生部分输出）
    pub fn with_failing_command(self, command: &str, stdout: &str, stderr: &str, exit_code: i32) -> Self {
        self.lock_commands().insert(
            command.to_string(),
            Scripted::Fail {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        );
        self
    }

    pub fn failing_provision(self) -> Self {
        self.fail_provision.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_endpoint(self) -> Self {
        self.fail_endpoint.store(true, Ordering::SeqCst);
        self
    }

    /// 第 n 次（从 1 计）write_file 调用失败
    pub fn failing_write_at(self, n: usize) -> Self {
        *self.fail_write_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(n);
        self
    }

    pub fn provisioned(&self) -> usize {
        self.provisioned.load(Ordering::SeqCst)
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.executed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 直接查看沙箱内文件（测试断言用）
    pub fn file(&self, handle: &SandboxHandle, path: &str) -> Option<String> {
        self.lock_files()
            .get(handle)
            .and_then(|f| f.get(path))
            .cloned()
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, HashMap<SandboxHandle, HashMap<String, String>>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_commands(&self) -> std::sync::MutexGuard<'_, HashMap<String, Scripted>> {
        self.commands.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_handle(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        if self.lock_files().contains_key(handle) {
            Ok(())
        } else {
            Err(SandboxError::UnknownHandle(handle.to_string()))
        }
    }
}

#[async_trait]
impl SandboxGateway for MemorySandbox {
    async fn provision(&self) -> Result<SandboxHandle, SandboxError> {
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(SandboxError::Unavailable("provisioning disabled".to_string()));
        }
        let n = self.provisioned.fetch_add(1, Ordering::SeqCst);
        let handle = SandboxHandle(format!("mem-{}", n));
        self.lock_files().insert(handle.clone(), HashMap::new());
        Ok(handle)
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        command: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<ExecOutput, SandboxError> {
        self.check_handle(handle)?;
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.to_string());
        let scripted = self.lock_commands().get(command).cloned();
        match scripted {
            Some(Scripted::Ok { stdout, stderr }) => {
                sink.on_stdout(&stdout);
                if !stderr.is_empty() {
                    sink.on_stderr(&stderr);
                }
                Ok(ExecOutput {
                    stdout,
                    stderr,
                    exit_code: 0,
                })
            }
            Some(Scripted::Fail {
                stdout,
                stderr,
                exit_code,
            }) => {
                sink.on_stdout(&stdout);
                sink.on_stderr(&stderr);
                Err(SandboxError::CommandFailed { exit_code, stderr })
            }
            None => {
                let stderr = format!("sh: {}: command not found", command);
                sink.on_stderr(&stderr);
                Err(SandboxError::CommandFailed { exit_code: 127, stderr })
            }
        }
    }

    async fn write_file(
        &self,
        handle: &SandboxHandle,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError> {
        let path = validate_relative_path(path)?;
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_at = *self.fail_write_at.lock().unwrap_or_else(|e| e.into_inner());
        if fail_at == Some(n) {
            return Err(SandboxError::Io(format!("write {} failed: disk full", path)));
        }
        let mut files = self.lock_files();
        let entry = files
            .get_mut(handle)
            .ok_or_else(|| SandboxError::UnknownHandle(handle.to_string()))?;
        entry.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn read_file(&self, handle: &SandboxHandle, path: &str) -> Result<String, SandboxError> {
        let path = validate_relative_path(path)?;
        let files = self.lock_files();
        let entry = files
            .get(handle)
            .ok_or_else(|| SandboxError::UnknownHandle(handle.to_string()))?;
        entry
            .get(path)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(path.to_string()))
    }

    async fn endpoint(&self, handle: &SandboxHandle, port: u16) -> Result<String, SandboxError> {
        if self.fail_endpoint.load(Ordering::SeqCst) {
            return Err(SandboxError::Unavailable("host lookup failed".to_string()));
        }
        self.check_handle(handle)?;
        Ok(format!("https://{}-{}.sandbox.local", port, handle))
    }
}
