//! 本地目录沙箱
//!
//! 每个句柄对应 root 下的一个独立目录（root/<uuid>）；命令通过 `sh -c` 在该目录中执行，带超时，
//! stdout / stderr 边读边推给 OutputSink。文件读写经 validate_relative_path 校验，禁止 ../ 逃逸。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::sandbox::{
    validate_relative_path, ExecOutput, OutputSink, SandboxError, SandboxGateway, SandboxHandle,
};

const READ_CHUNK: usize = 4096;

/// 本地沙箱：root 下按句柄分目录
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    root: PathBuf,
    host: String,
    exec_timeout: Duration,
}

impl LocalSandbox {
    pub fn new(root: impl AsRef<Path>, host: impl Into<String>, exec_timeout_secs: u64) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            host: host.into(),
            exec_timeout: Duration::from_secs(exec_timeout_secs.max(1)),
        }
    }

    fn dir(&self, handle: &SandboxHandle) -> Result<PathBuf, SandboxError> {
        let id = handle.as_str();
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(SandboxError::UnknownHandle(id.to_string()));
        }
        let dir = self.root.join(id);
        if !dir.is_dir() {
            return Err(SandboxError::UnknownHandle(id.to_string()));
        }
        Ok(dir)
    }

    fn resolve(&self, handle: &SandboxHandle, path: &str) -> Result<PathBuf, SandboxError> {
        let dir = self.dir(handle)?;
        let rel = validate_relative_path(path)?;
        Ok(dir.join(rel))
    }
}

#[async_trait]
impl SandboxGateway for LocalSandbox {
    async fn provision(&self) -> Result<SandboxHandle, SandboxError> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.root.join(&id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SandboxError::Unavailable(format!("{}: {}", dir.display(), e)))?;
        tracing::info!(sandbox = %id, dir = %dir.display(), "local sandbox provisioned");
        Ok(SandboxHandle(id))
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        command: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<ExecOutput, SandboxError> {
        let dir = self.dir(handle)?;
        tracing::info!(sandbox = %handle, command = %command, "sandbox exec");

        let mut child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Io(format!("spawn failed: {}", e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Io("stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::Io("stderr not captured".to_string()))?;

        let mut out = ExecOutput::default();
        let collect = async {
            let mut out_buf = [0u8; READ_CHUNK];
            let mut err_buf = [0u8; READ_CHUNK];
            let mut out_done = false;
            let mut err_done = false;
            while !(out_done && err_done) {
                tokio::select! {
                    n = stdout.read(&mut out_buf), if !out_done => match n {
                        Ok(0) | Err(_) => out_done = true,
                        Ok(n) => {
                            let chunk = String::from_utf8_lossy(&out_buf[..n]);
                            sink.on_stdout(&chunk);
                            out.stdout.push_str(&chunk);
                        }
                    },
                    n = stderr.read(&mut err_buf), if !err_done => match n {
                        Ok(0) | Err(_) => err_done = true,
                        Ok(n) => {
                            let chunk = String::from_utf8_lossy(&err_buf[..n]);
                            sink.on_stderr(&chunk);
                            out.stderr.push_str(&chunk);
                        }
                    },
                }
            }
            child.wait().await
        };

        let status = tokio::time::timeout(self.exec_timeout, collect)
            .await
            .map_err(|_| SandboxError::Timeout(self.exec_timeout.as_secs()))?
            .map_err(|e| SandboxError::Io(format!("wait failed: {}", e)))?;

        out.exit_code = status.code().unwrap_or(-1);
        if !status.success() {
            return Err(SandboxError::CommandFailed {
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out)
    }

    async fn write_file(
        &self,
        handle: &SandboxHandle,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError> {
        let full = self.resolve(handle, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::Io(format!("create dir failed: {}", e)))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| SandboxError::Io(format!("write {} failed: {}", path, e)))
    }

    async fn read_file(&self, handle: &SandboxHandle, path: &str) -> Result<String, SandboxError> {
        let full = self.resolve(handle, path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SandboxError::NotFound(path.to_string()))
            }
            Err(e) => Err(SandboxError::Io(format!("read {} failed: {}", path, e))),
        }
    }

    async fn endpoint(&self, handle: &SandboxHandle, port: u16) -> Result<String, SandboxError> {
        self.dir(handle)?;
        Ok(format!("http://{}:{}", self.host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::OutputBuffer;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_roundtrip_in_own_dir() {
        let dir = TempDir::new().unwrap();
        let sandbox = LocalSandbox::new(dir.path(), "localhost", 10);
        let a = sandbox.provision().await.unwrap();
        let b = sandbox.provision().await.unwrap();
        assert_ne!(a, b);

        sandbox.write_file(&a, "app/page.tsx", "export {}").await.unwrap();
        assert_eq!(sandbox.read_file(&a, "app/page.tsx").await.unwrap(), "export {}");
        assert!(matches!(
            sandbox.read_file(&b, "app/page.tsx").await,
            Err(SandboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_exec_streams_output() {
        let dir = TempDir::new().unwrap();
        let sandbox = LocalSandbox::new(dir.path(), "localhost", 10);
        let h = sandbox.provision().await.unwrap();
        let mut buf = OutputBuffer::default();
        let out = sandbox.exec(&h, "echo hello; echo oops >&2", &mut buf).await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(buf.stdout.trim(), "hello");
        assert_eq!(buf.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_exec_failure_keeps_partial_output() {
        let dir = TempDir::new().unwrap();
        let sandbox = LocalSandbox::new(dir.path(), "localhost", 10);
        let h = sandbox.provision().await.unwrap();
        let mut buf = OutputBuffer::default();
        let err = sandbox
            .exec(&h, "echo partial; echo bad >&2; exit 3", &mut buf)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::CommandFailed { exit_code: 3, .. }));
        assert_eq!(buf.stdout.trim(), "partial");
        assert_eq!(buf.stderr.trim(), "bad");
    }

    #[tokio::test]
    async fn test_path_escape_rejected() {
        let dir = TempDir::new().unwrap();
        let sandbox = LocalSandbox::new(dir.path(), "localhost", 10);
        let h = sandbox.provision().await.unwrap();
        assert!(matches!(
            sandbox.write_file(&h, "../escape.txt", "x").await,
            Err(SandboxError::PathEscape(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let dir = TempDir::new().unwrap();
        let sandbox = LocalSandbox::new(dir.path(), "localhost", 10);
        let bogus = SandboxHandle("missing".to_string());
        assert!(matches!(
            sandbox.endpoint(&bogus, 3000).await,
            Err(SandboxError::UnknownHandle(_))
        ));
    }
}
