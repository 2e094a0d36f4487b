//! 模型输出：文本 / 文本片段列表 / 工具调用
//!
//! parse_llm_output 从纯文本回复中识别 JSON Tool Call（```json 代码块或裸 JSON 对象），
//! 识别不到时视为普通文本回复。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::llm::LlmError;

/// LLM 返回的 Tool Call（{"tool": "write_files", "args": {...}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// 单次模型调用的输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ModelOutput {
    /// 完整文本
    Text(String),
    /// 多段文本（部分后端按片段返回）
    Fragments(Vec<String>),
    /// 工具调用
    ToolCall(ToolCall),
}

impl ModelOutput {
    /// 文本类输出拼成一段；工具调用返回 None
    pub fn text(&self) -> Option<String> {
        match self {
            ModelOutput::Text(t) => Some(t.clone()),
            ModelOutput::Fragments(parts) => Some(parts.concat()),
            ModelOutput::ToolCall(_) => None,
        }
    }
}

static FENCED_JSON_RE: OnceLock<Regex> = OnceLock::new();

/// 提取 ```json 代码块（或未标注语言、内容以 { 开头的代码块）
fn fenced_json(text: &str) -> Option<&str> {
    let re = FENCED_JSON_RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?[ \t]*\r?\n?(\{.*?\})\s*```").unwrap());
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().trim())
}

/// 解析文本回复：含合法 JSON 且 tool 非空则为 ToolCall，否则为 Text
pub fn parse_llm_output(output: &str) -> Result<ModelOutput, LlmError> {
    let trimmed = output.trim();

    let json_str = if let Some(block) = fenced_json(trimmed) {
        block
    } else if trimmed.starts_with('{') && trimmed.ends_with('}') {
        trimmed
    } else {
        return Ok(ModelOutput::Text(trimmed.to_string()));
    };

    // 只把带 "tool" 字段的对象当作工具调用；其它 JSON（如模型在文本里展示的代码）按文本处理
    let value: serde_json::Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) if json_str.contains("\"tool\"") => {
            return Err(LlmError::MalformedToolCall(format!("{}: {}", e, json_str)));
        }
        Err(_) => return Ok(ModelOutput::Text(trimmed.to_string())),
    };
    if value.get("tool").is_none() {
        return Ok(ModelOutput::Text(trimmed.to_string()));
    }

    let parsed: ToolCall = serde_json::from_value(value)
        .map_err(|e| LlmError::MalformedToolCall(format!("{}: {}", e, json_str)))?;
    if parsed.tool.is_empty() {
        Ok(ModelOutput::Text(trimmed.to_string()))
    } else {
        Ok(ModelOutput::ToolCall(parsed))
    }
}
