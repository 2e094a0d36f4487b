//! Kiln - 代码生成 Agent 编排核心
//!
//! 模块划分：
//! - **agent**: 按配置组装 Run 所需组件
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 白板状态、记忆化步骤、终态解析、Run 入口与分发
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / Scripted）
//! - **memory**: 对话历史与记录存储（内存 / JSON 文件 / SQLite）
//! - **observability**: tracing 初始化
//! - **react**: Code Agent、路由、编排主循环、标题与回复生成
//! - **sandbox**: 沙箱网关（本地目录 / 内存）
//! - **tools**: run_command、write_files、read_files 与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod sandbox;
pub mod tools;

pub use agent::{create_agent_components, AgentComponents, RunSettings};
pub use core::{run_code_agent, AgentError, RunDispatcher, RunOutput, RunRequest};
