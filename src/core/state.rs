//! Agent 白板（Whiteboard）状态
//!
//! 以「带版本号的值」在各步骤之间显式传递：工具处理器与完成标记检查返回新状态，而不是原地修改共享对象。
//! 不变量：
//! - files 只增不删（同路径后写覆盖）
//! - summary 一旦非空，本次 Run 内不再改变

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 文件条目（路径 + 完整内容）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FileEntry {
    /// 沙箱内相对路径，如 app/page.tsx
    pub path: String,
    /// 文件完整内容
    pub content: String,
}

/// 白板：本次 Run 内所有工具与终止判断可见的状态
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// 完成总结（含完成标记的整段文本）；未完成时为空
    pub summary: String,
    /// 相对路径 -> 文件内容
    pub files: HashMap<String, String>,
    /// 每次状态变化递增
    pub version: u64,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_summary(&self) -> bool {
        !self.summary.is_empty()
    }

    /// 合并写入的文件（后写覆盖），返回新状态
    pub fn with_files<I>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = FileEntry>,
    {
        let mut files = self.files.clone();
        for entry in entries {
            files.insert(entry.path, entry.content);
        }
        Self {
            summary: self.summary.clone(),
            files,
            version: self.version + 1,
        }
    }

    /// 设置完成总结；已有总结时保持不变（至多设置一次）
    pub fn with_summary(&self, summary: impl Into<String>) -> Self {
        if self.has_summary() {
            return self.clone();
        }
        let summary = summary.into();
        if summary.is_empty() {
            return self.clone();
        }
        Self {
            summary,
            files: self.files.clone(),
            version: self.version + 1,
        }
    }

    /// 已写文件路径（排序后），用于拼入 Agent 的 system prompt
    pub fn file_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.files.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// 白板快照片段（Files written so far），拼入 Agent 的 system prompt
    pub fn to_prompt_section(&self) -> String {
        let mut s = String::new();
        if self.files.is_empty() {
            s.push_str("## Files written so far\n(none)\n\n");
        } else {
            s.push_str("## Files written so far\n");
            for p in self.file_paths() {
                s.push_str(&format!("- {}\n", p));
            }
            s.push('\n');
        }
        s
    }
}
