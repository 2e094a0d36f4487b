//! run_command：在本次 Run 的沙箱内执行 shell 命令
//!
//! 成功返回 stdout；失败时把错误与已收到的 stdout / stderr 一并作为 Observation，便于 Agent 自行修正。

use async_trait::async_trait;
use serde_json::Value;

use crate::sandbox::OutputBuffer;
use crate::tools::schema::{args_schema, parse_args, RunCommandArgs};
use crate::tools::{Tool, ToolContext, ToolOutcome};

pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command inside the sandbox (e.g. install packages with npm install <pkg> --yes). Returns stdout."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<RunCommandArgs>()
    }

    async fn execute(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolOutcome, String> {
        let args: RunCommandArgs = parse_args(self.name(), args)?;
        let mut buffer = OutputBuffer::default();
        match ctx.sandbox.exec(ctx.handle, &args.command, &mut buffer).await {
            Ok(output) => Ok(ToolOutcome::new(output.stdout, ctx.state.clone())),
            Err(e) => {
                tracing::warn!(command = %args.command, error = %e, "run_command failed");
                Err(format!("{}\nstdout: {}\nstderr: {}", e, buffer.stdout, buffer.stderr))
            }
        }
    }
}
