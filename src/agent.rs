//! Agent 运行时组件
//!
//! create_agent_components 按配置构建 LLM / 沙箱 / 记录存储 / Code Agent / 工具执行器 / 终态辅助调用，
//! 组件无会话状态，可被并发的多个 Run 共享（每个 Run 自带沙箱句柄、步骤 journal 与白板）。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, StorageBackend};
use crate::core::{AgentError, DEFAULT_ENDPOINT_PORT};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{JsonFileStore, MemoryStore, RecordStore};
use crate::react::{CodeAgent, Prompts, Summarizer, DEFAULT_MAX_ITERATIONS};
use crate::sandbox::{LocalSandbox, SandboxGateway};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 单次 Run 的可调参数
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_iterations: usize,
    pub history_limit: usize,
    pub endpoint_port: u16,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history_limit: 5,
            endpoint_port: DEFAULT_ENDPOINT_PORT,
        }
    }
}

/// 预构建的 Agent 组件，可多 Run 共享
pub struct AgentComponents {
    pub agent: CodeAgent,
    pub executor: ToolExecutor,
    pub summarizer: Summarizer,
    pub sandbox: Arc<dyn SandboxGateway>,
    pub store: Arc<dyn RecordStore>,
    pub settings: RunSettings,
}

impl AgentComponents {
    /// 使用内置提示词与默认参数组装（测试与嵌入场景）
    pub fn new(
        llm: Arc<dyn LlmClient>,
        sandbox: Arc<dyn SandboxGateway>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self::with_prompts(llm, sandbox, store, Prompts::default())
    }

    pub fn with_prompts(
        llm: Arc<dyn LlmClient>,
        sandbox: Arc<dyn SandboxGateway>,
        store: Arc<dyn RecordStore>,
        prompts: Prompts,
    ) -> Self {
        Self {
            agent: CodeAgent::new(llm.clone(), prompts.code_agent),
            executor: ToolExecutor::new(ToolRegistry::code_agent_tools(), 180),
            summarizer: Summarizer::new(llm, prompts.fragment_title, prompts.response),
            sandbox,
            store,
            settings: RunSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM (configured)");
        return Arc::new(MockLlmClient);
    }
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek && cfg.llm.base_url.is_none() {
        tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
        Arc::new(create_deepseek_client(Some(&cfg.llm.model)))
    } else if use_deepseek || use_openai {
        let api_key = std::env::var("OPENAI_API_KEY")
            .or_else(|_| std::env::var("DEEPSEEK_API_KEY"))
            .ok();
        tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            api_key.as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

/// 根据 [storage] 选择记录存储
pub async fn create_store_from_config(cfg: &AppConfig) -> Result<Arc<dyn RecordStore>, AgentError> {
    match cfg.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Json => {
            let path = cfg
                .storage
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from("data/messages.json"));
            Ok(Arc::new(JsonFileStore::new(path)))
        }
        #[cfg(feature = "async-sqlite")]
        StorageBackend::Sqlite => {
            let path = cfg
                .storage
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from("data/messages.db"));
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AgentError::Config(format!("cannot create {}: {}", parent.display(), e)))?;
            }
            Ok(Arc::new(crate::memory::SqliteStore::new(path).await?))
        }
        #[cfg(not(feature = "async-sqlite"))]
        StorageBackend::Sqlite => Err(AgentError::Config(
            "storage backend 'sqlite' requires the async-sqlite feature".to_string(),
        )),
    }
}

/// 按配置创建全部组件
pub async fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    let llm = create_llm_from_config(cfg);
    let store = create_store_from_config(cfg).await?;

    let root = cfg
        .sandbox
        .root
        .clone()
        .unwrap_or_else(|| PathBuf::from("sandboxes"));
    let sandbox = Arc::new(LocalSandbox::new(
        root,
        cfg.sandbox.host.clone(),
        cfg.sandbox.exec_timeout_secs,
    ));

    let prompts = Prompts::load();
    Ok(AgentComponents {
        agent: CodeAgent::new(llm.clone(), prompts.code_agent)
            .with_completion_marker(cfg.agent.completion_marker.clone())
            .with_sampling(cfg.llm.temperature, cfg.llm.max_output_tokens),
        executor: ToolExecutor::new(ToolRegistry::code_agent_tools(), cfg.tools.tool_timeout_secs),
        summarizer: Summarizer::new(llm, prompts.fragment_title, prompts.response),
        sandbox,
        store,
        settings: RunSettings {
            max_iterations: cfg.agent.max_iterations,
            history_limit: cfg.agent.history_limit,
            endpoint_port: cfg.sandbox.port,
        },
    })
}
