//! write_files：按顺序把文件写入沙箱，并把写入内容合并进白板
//!
//! 全部成功才返回合并后的新白板；任一失败返回错误且白板不变。
//! 失败前已写入沙箱的文件不会回滚，沙箱与白板此时可能不一致。
//! 白板的键与沙箱内保存的路径一致（去掉前导 `./`）。

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::FileEntry;
use crate::sandbox::validate_relative_path;
use crate::tools::schema::{args_schema, parse_args, WriteFilesArgs};
use crate::tools::{Tool, ToolContext, ToolOutcome};

pub struct WriteFilesTool;

#[async_trait]
impl Tool for WriteFilesTool {
    fn name(&self) -> &str {
        "write_files"
    }

    fn description(&self) -> &str {
        "Create or overwrite files in the sandbox. Paths are relative; content is the full file body."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WriteFilesArgs>()
    }

    async fn execute(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolOutcome, String> {
        let args: WriteFilesArgs = parse_args(self.name(), args)?;
        let mut written = Vec::with_capacity(args.files.len());
        for entry in args.files {
            let path = validate_relative_path(&entry.path)
                .map_err(|e| e.to_string())?
                .to_string();
            ctx.sandbox
                .write_file(ctx.handle, &path, &entry.content)
                .await
                .map_err(|e| e.to_string())?;
            written.push(FileEntry {
                path,
                content: entry.content,
            });
        }

        let state = ctx.state.with_files(written);
        let merged: BTreeMap<&String, &String> = state.files.iter().collect();
        let observation = serde_json::to_string(&merged).map_err(|e| e.to_string())?;
        Ok(ToolOutcome::new(observation, state))
    }
}
