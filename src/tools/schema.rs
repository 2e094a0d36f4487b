//! 工具参数类型与 JSON Schema（schemars 自动生成，拼入工具目录）
//!
//! 参数与 LLM 输出的 `{"tool": "...", "args": {...}}` 中 args 的结构一致。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::FileEntry;

/// run_command 参数
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCommandArgs {
    /// 在沙箱内执行的 shell 命令，如 npm install lodash
    pub command: String,
}

/// write_files 参数
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriteFilesArgs {
    /// 要创建或覆盖的文件（相对路径 + 完整内容）
    pub files: Vec<FileEntry>,
}

/// read_files 中的单个路径
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FilePath {
    pub path: String,
}

/// read_files 参数
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadFilesArgs {
    /// 要读取的文件路径
    pub files: Vec<FilePath>,
}

/// 参数类型的 JSON Schema
pub fn args_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

/// 把 LLM 给出的 args 解析为具体参数类型；失败信息会作为 Observation 回给 Agent
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("invalid arguments for {}: {}", tool, e))
}
