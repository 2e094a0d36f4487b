//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `KILN__*` 覆盖（双下划线表示嵌套，如 `KILN__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub sandbox: SandboxSection,
    pub storage: StorageSection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与采样参数
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_output_tokens() -> u32 {
    4096
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// [agent] 段：迭代上限、历史条数、完成标记
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Run 开始时读取的历史消息条数
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,
}

fn default_max_iterations() -> usize {
    crate::react::DEFAULT_MAX_ITERATIONS
}

fn default_history_limit() -> usize {
    5
}

fn default_completion_marker() -> String {
    crate::react::COMPLETION_MARKER.to_string()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_limit: default_history_limit(),
            completion_marker: default_completion_marker(),
        }
    }
}

/// [sandbox] 段：本地沙箱根目录、产物端口、命令超时、对外主机名
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSection {
    /// 未设置时用 ./sandboxes
    pub root: Option<PathBuf>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    crate::core::DEFAULT_ENDPOINT_PORT
}

fn default_exec_timeout_secs() -> u64 {
    120
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            root: None,
            port: default_port(),
            exec_timeout_secs: default_exec_timeout_secs(),
            host: default_host(),
        }
    }
}

/// 记录存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Json,
    Sqlite,
}

/// [storage] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageSection {
    #[serde(default)]
    pub backend: StorageBackend,
    /// json / sqlite 后端的文件路径
    pub path: Option<PathBuf>,
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    180
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 KILN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 KILN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();
    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }
    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }
    builder = builder.add_source(
        config::Environment::with_prefix("KILN")
            .separator("__")
            .try_parsing(true),
    );
    builder.build()?.try_deserialize()
}
