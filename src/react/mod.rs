//! 认知层：Code Agent、纯函数路由、编排主循环、终态辅助调用、过程事件与提示词

pub mod events;
pub mod loop_;
pub mod planner;
pub mod prompts;
pub mod router;
pub mod summarizer;

pub use events::RunEvent;
pub use loop_::{AgentLoop, LoopOutcome};
pub use planner::CodeAgent;
pub use prompts::{Prompts, COMPLETION_MARKER};
pub use router::{route, AgentId, RouteDecision, StopReason, DEFAULT_MAX_ITERATIONS};
pub use summarizer::{normalize, Summarizer, RESPONSE_FALLBACK, TITLE_FALLBACK};
