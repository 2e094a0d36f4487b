//! read_files：读取沙箱内文件，返回 `[{path, content}]` 的 JSON；不改变白板

use async_trait::async_trait;
use serde_json::Value;

use crate::core::FileEntry;
use crate::tools::schema::{args_schema, parse_args, ReadFilesArgs};
use crate::tools::{Tool, ToolContext, ToolOutcome};

pub struct ReadFilesTool;

#[async_trait]
impl Tool for ReadFilesTool {
    fn name(&self) -> &str {
        "read_files"
    }

    fn description(&self) -> &str {
        "Read files from the sandbox. Returns a JSON list of {path, content}."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReadFilesArgs>()
    }

    async fn execute(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolOutcome, String> {
        let args: ReadFilesArgs = parse_args(self.name(), args)?;
        let mut contents = Vec::with_capacity(args.files.len());
        for file in args.files {
            let content = ctx
                .sandbox
                .read_file(ctx.handle, &file.path)
                .await
                .map_err(|e| e.to_string())?;
            contents.push(FileEntry {
                path: file.path,
                content,
            });
        }
        let observation = serde_json::to_string_pretty(&contents).map_err(|e| e.to_string())?;
        Ok(ToolOutcome::new(observation, ctx.state.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentState;
    use crate::sandbox::{MemorySandbox, SandboxGateway};

    #[tokio::test]
    async fn test_reads_written_files() {
        let sandbox = MemorySandbox::new();
        let handle = sandbox.provision().await.unwrap();
        sandbox.write_file(&handle, "src/app.ts", "export {}").await.unwrap();
        let state = AgentState::new();
        let ctx = ToolContext { sandbox: &sandbox, handle: &handle, state: &state };

        let out = ReadFilesTool
            .execute(&ctx, serde_json::json!({"files": [{"path": "src/app.ts"}]}))
            .await
            .unwrap();
        let parsed: Vec<FileEntry> = serde_json::from_str(&out.observation).unwrap();
        assert_eq!(parsed[0].content, "export {}");
        assert_eq!(out.state, state);
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let sandbox = MemorySandbox::new();
        let handle = sandbox.provision().await.unwrap();
        let state = AgentState::new();
        let ctx = ToolContext { sandbox: &sandbox, handle: &handle, state: &state };

        let err = ReadFilesTool
            .execute(&ctx, serde_json::json!({"files": [{"path": "nope.txt"}]}))
            .await
            .unwrap_err();
        assert!(err.contains("nope.txt"));
    }
}
