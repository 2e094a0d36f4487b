//! 持久化步骤执行（Durable Step）能力接口
//!
//! 编排核心依赖外部提供的「命名步骤至多有效执行一次」保证：同名步骤成功后结果被记入 journal，
//! Run 被重新调度（崩溃恢复 / 重放）时直接返回已记录的结果而不再执行。
//! 核心只依赖 StepRunner 接口，不实现真正的持久化；MemoStepRunner 是进程内实现，
//! 供 CLI 单次运行与测试使用（测试可注入强制重试、模拟重放以验证各步骤幂等）。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::AgentError;

/// 步骤结果在 journal 中的编解码错误
#[derive(Error, Debug)]
pub enum StepError {
    #[error("step '{name}' output could not be encoded: {message}")]
    Encode { name: String, message: String },

    #[error("step '{name}' journal entry could not be decoded: {message}")]
    Decode { name: String, message: String },
}

/// 步骤体：可被多次调用（重试），每次返回一个新的 future
pub type StepFn<'a> = dyn Fn() -> BoxFuture<'a, Result<Value, AgentError>> + Send + Sync + 'a;

/// 命名步骤执行器：`run(name, fn) -> result`，带记忆化语义
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// 执行（或重放）名为 `name` 的步骤。同一 Run 内同名步骤按出现顺序区分（`name`, `name:1`, ...）。
    async fn run(&self, name: &str, step: &StepFn<'_>) -> Result<Value, AgentError>;
}

/// 类型化包装：将步骤输出序列化为 JSON 写入 journal，重放时反序列化
pub async fn run_step<'a, T, F, Fut>(
    runner: &'a dyn StepRunner,
    name: &'a str,
    f: F,
) -> Result<T, AgentError>
where
    T: Serialize + DeserializeOwned + Send + 'a,
    F: Fn() -> Fut + Send + Sync + 'a,
    Fut: std::future::Future<Output = Result<T, AgentError>> + Send + 'a,
{
    let encode = move || -> BoxFuture<'a, Result<Value, AgentError>> {
        let fut = f();
        Box::pin(async move {
            let out = fut.await?;
            serde_json::to_value(&out).map_err(|e| {
                AgentError::Step(StepError::Encode {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            })
        })
    };
    let value = runner.run(name, &encode).await?;
    serde_json::from_value(value).map_err(|e| {
        AgentError::Step(StepError::Decode {
            name: name.to_string(),
            message: e.to_string(),
        })
    })
}

/// 进程内记忆化步骤执行器
///
/// - journal：步骤 ID -> 成功输出；命中则跳过执行
/// - 失败时按 `max_attempts` 重试步骤体（默认 1 次，即不重试）
/// - `replay()` 模拟 Run 被重新调度：清空出现计数，journal 保留
#[derive(Debug)]
pub struct MemoStepRunner {
    journal: Mutex<HashMap<String, Value>>,
    occurrences: Mutex<HashMap<String, usize>>,
    max_attempts: usize,
    executions: AtomicUsize,
}

impl MemoStepRunner {
    pub fn new() -> Self {
        Self::with_max_attempts(1)
    }

    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            journal: Mutex::new(HashMap::new()),
            occurrences: Mutex::new(HashMap::new()),
            max_attempts: max_attempts.max(1),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// 开始一次重放：之后的步骤按相同顺序重新分配 ID，已完成的直接命中 journal
    pub async fn replay(&self) {
        self.occurrences.lock().await.clear();
    }

    /// 已记录的步骤 ID（排序后，便于断言）
    pub async fn completed_steps(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.journal.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 步骤体被实际调用的总次数（含重试）
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    async fn next_id(&self, name: &str) -> String {
        let mut occurrences = self.occurrences.lock().await;
        let n = occurrences.entry(name.to_string()).or_insert(0);
        let id = if *n == 0 {
            name.to_string()
        } else {
            format!("{}:{}", name, n)
        };
        *n += 1;
        id
    }
}

impl Default for MemoStepRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepRunner for MemoStepRunner {
    async fn run(&self, name: &str, step: &StepFn<'_>) -> Result<Value, AgentError> {
        let id = self.next_id(name).await;
        if let Some(memo) = self.journal.lock().await.get(&id).cloned() {
            tracing::debug!(step = %id, "step replayed from journal");
            return Ok(memo);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.executions.fetch_add(1, Ordering::SeqCst);
            match step().await {
                Ok(value) => {
                    self.journal.lock().await.insert(id.clone(), value.clone());
                    tracing::debug!(step = %id, attempt, "step completed");
                    return Ok(value);
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(step = %id, attempt, error = %e, "step failed, retrying");
                }
                Err(e) => {
                    tracing::warn!(step = %id, attempt, error = %e, "step failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxError;

    #[tokio::test]
    async fn test_step_memoized_across_replay() {
        let runner = MemoStepRunner::new();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let first: u32 = run_step(&runner, "count", move || async move {
            Ok(counter.fetch_add(1, Ordering::SeqCst) as u32 + 10)
        })
        .await
        .unwrap();

        runner.replay().await;
        let second: u32 = run_step(&runner, "count", move || async move {
            Ok(counter.fetch_add(1, Ordering::SeqCst) as u32 + 10)
        })
        .await
        .unwrap();

        assert_eq!(first, 10);
        assert_eq!(second, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_names_get_distinct_ids() {
        let runner = MemoStepRunner::new();
        for i in 0..3u32 {
            let v: u32 = run_step(&runner, "tool", move || async move { Ok(i) }).await.unwrap();
            assert_eq!(v, i);
        }
        assert_eq!(
            runner.completed_steps().await,
            vec!["tool".to_string(), "tool:1".to_string(), "tool:2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let runner = MemoStepRunner::with_max_attempts(3);
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let v: String = run_step(&runner, "flaky", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AgentError::Sandbox(SandboxError::Unavailable("boom".into())))
            } else {
                Ok("ok".to_string())
            }
        })
        .await
        .unwrap();
        assert_eq!(v, "ok");
        assert_eq!(runner.executions(), 3);
    }

    #[tokio::test]
    async fn test_failure_not_journaled() {
        let runner = MemoStepRunner::new();
        let res: Result<String, _> = run_step(&runner, "broken", || async {
            Err(AgentError::Sandbox(SandboxError::Unavailable("down".into())))
        })
        .await;
        assert!(res.is_err());
        assert!(runner.completed_steps().await.is_empty());
    }
}
