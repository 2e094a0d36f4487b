//! 终态解析：循环结束后恰好一次地得出并持久化 Run 的结果
//!
//! 1. 解析产物地址（步骤 get-sandbox-url），失败即 Run 失败且不写记录
//! 2. 分类：summary 与 files 同时为空才算 ERROR
//! 3. SUCCESS 时并发生成标题与回复（两个独立的记忆化步骤）；summary 为空则直接用兜底文案
//! 4. 写入一条终态记录（步骤 save-result，记录 ID 由 run_id 派生）
//! 5. 返回 RunOutput

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::core::step::{run_step, StepRunner};
use crate::core::{AgentError, AgentState};
use crate::memory::{Artifact, MessageRecord, RecordStore};
use crate::react::events::send_event;
use crate::react::{RunEvent, Summarizer, RESPONSE_FALLBACK, TITLE_FALLBACK};
use crate::sandbox::{SandboxGateway, SandboxHandle};

/// ERROR 记录的固定内容
pub const ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// 默认产物端口
pub const DEFAULT_ENDPOINT_PORT: u16 = 3000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// summary 与 files 同时为空才算失败
pub fn classify(state: &AgentState) -> RunStatus {
    if state.summary.is_empty() && state.files.is_empty() {
        RunStatus::Error
    } else {
        RunStatus::Success
    }
}

/// 返回给调用方的结果；所有字段总是存在
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub url: String,
    pub title: String,
    pub files: HashMap<String, String>,
    pub summary: String,
}

/// 标识终态记录归属
#[derive(Clone, Debug)]
pub struct RunIdentity<'a> {
    pub run_id: &'a str,
    pub conversation_id: &'a str,
}

pub struct ResultResolver<'a> {
    pub sandbox: &'a dyn SandboxGateway,
    pub store: &'a dyn RecordStore,
    pub summarizer: &'a Summarizer,
    pub steps: &'a dyn StepRunner,
    pub port: u16,
    pub event_tx: Option<&'a UnboundedSender<RunEvent>>,
}

impl<'a> ResultResolver<'a> {
    pub fn new(
        sandbox: &'a dyn SandboxGateway,
        store: &'a dyn RecordStore,
        summarizer: &'a Summarizer,
        steps: &'a dyn StepRunner,
    ) -> Self {
        Self {
            sandbox,
            store,
            summarizer,
            steps,
            port: DEFAULT_ENDPOINT_PORT,
            event_tx: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub async fn resolve(
        &self,
        run: &RunIdentity<'_>,
        handle: &SandboxHandle,
        state: &AgentState,
    ) -> Result<RunOutput, AgentError> {
        let (sandbox, port) = (self.sandbox, self.port);
        let url: String = run_step(self.steps, "get-sandbox-url", move || async move {
            Ok(sandbox.endpoint(handle, port).await?)
        })
        .await?;

        let status = classify(state);
        let (title, response) = match status {
            RunStatus::Success if state.has_summary() => self.summarize(&state.summary).await?,
            _ => (TITLE_FALLBACK.to_string(), RESPONSE_FALLBACK.to_string()),
        };

        let record = match status {
            RunStatus::Success => MessageRecord::result(
                run.run_id,
                run.conversation_id,
                response,
                Artifact {
                    endpoint_url: url.clone(),
                    title: title.clone(),
                    files: state.files.clone(),
                },
            ),
            RunStatus::Error => MessageRecord::error(run.run_id, run.conversation_id, ERROR_MESSAGE),
        };

        let (store, record_ref) = (self.store, &record);
        let saved_id: String = run_step(self.steps, "save-result", move || async move {
            store.append(record_ref.clone()).await?;
            Ok(record_ref.id.clone())
        })
        .await?;
        tracing::info!(run_id = %run.run_id, record = %saved_id, kind = record.kind.as_str(), "terminal record saved");
        send_event(
            self.event_tx,
            RunEvent::ResultSaved {
                run_id: run.run_id.to_string(),
                kind: record.kind.as_str().to_string(),
            },
        );

        Ok(RunOutput {
            url,
            title,
            files: state.files.clone(),
            summary: state.summary.clone(),
        })
    }

    /// 标题与回复并发生成，各自为一个记忆化步骤
    async fn summarize(&self, summary: &str) -> Result<(String, String), AgentError> {
        let summarizer = self.summarizer;
        let title = run_step(self.steps, "generate-fragment-title", move || async move {
            Ok(summarizer.title(summary).await)
        });
        let response = run_step(self.steps, "generate-response", move || async move {
            Ok(summarizer.response(summary).await)
        });
        let (title, response): (Result<String, AgentError>, Result<String, AgentError>) =
            tokio::join!(title, response);
        Ok((title?, response?))
    }
}
