//! Run 编排入口
//!
//! run_code_agent：一次 Run 的完整流程（步骤 get-sandbox-id -> get-previous-messages -> 主循环 -> 终态解析）。
//! RunDispatcher：后台任务消费 RunRequest，每个请求 tokio::spawn 一个独立 Run（独立沙箱、journal、白板），
//! 关停时不再接收新请求，已排队与进行中的 Run 都会走完终态解析。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::agent::AgentComponents;
use crate::core::resolver::{ResultResolver, RunIdentity, RunOutput};
use crate::core::step::{run_step, MemoStepRunner, StepRunner};
use crate::core::AgentError;
use crate::memory::{ConversationContext, Message, MessageRecord, RecordStore};
use crate::react::events::send_event;
use crate::react::{AgentLoop, RunEvent};
use crate::sandbox::SandboxHandle;

/// 入站触发事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub run_id: String,
    pub request_text: String,
    pub conversation_id: String,
}

impl RunRequest {
    pub fn new(conversation_id: impl Into<String>, request_text: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            request_text: request_text.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

/// 单次 Run 的可选项
#[derive(Default)]
pub struct RunOptions<'a> {
    pub event_tx: Option<&'a mpsc::UnboundedSender<RunEvent>>,
}

/// 记录用户请求并生成 RunRequest（在 Run 之外，失败的 Run 也保留用户消息）
pub async fn submit_request(
    store: &dyn RecordStore,
    conversation_id: &str,
    request_text: &str,
) -> Result<RunRequest, AgentError> {
    store
        .append(MessageRecord::user(conversation_id, request_text))
        .await?;
    Ok(RunRequest::new(conversation_id, request_text))
}

/// 执行一次完整 Run
pub async fn run_code_agent(
    components: &AgentComponents,
    steps: &dyn StepRunner,
    request: &RunRequest,
    options: RunOptions<'_>,
) -> Result<RunOutput, AgentError> {
    tracing::info!(run_id = %request.run_id, conversation = %request.conversation_id, "run started");
    let result = execute_run(components, steps, request, &options).await;
    match &result {
        Ok(output) => {
            let (prompt_tokens, completion_tokens, total_tokens) = components.agent.token_usage();
            tracing::info!(
                run_id = %request.run_id,
                url = %output.url,
                prompt_tokens,
                completion_tokens,
                total_tokens,
                "run finished"
            );
        }
        Err(e) => {
            tracing::error!(run_id = %request.run_id, error = %e, "run failed");
            send_event(options.event_tx, RunEvent::Error { text: e.to_string() });
        }
    }
    result
}

async fn execute_run(
    components: &AgentComponents,
    steps: &dyn StepRunner,
    request: &RunRequest,
    options: &RunOptions<'_>,
) -> Result<RunOutput, AgentError> {
    let sandbox = components.sandbox.as_ref();
    let store = components.store.as_ref();
    let settings = &components.settings;

    let handle: SandboxHandle = run_step(steps, "get-sandbox-id", move || async move {
        Ok(sandbox.provision().await?)
    })
    .await?;
    send_event(
        options.event_tx,
        RunEvent::SandboxReady {
            run_id: request.run_id.clone(),
            sandbox: handle.to_string(),
        },
    );

    let (conversation_id, limit) = (request.conversation_id.as_str(), settings.history_limit);
    let history: Vec<Message> = run_step(steps, "get-previous-messages", move || async move {
        Ok(store.recent_messages(conversation_id, limit).await?)
    })
    .await?;
    let conversation = ConversationContext::from_recent(history, limit);

    let mut agent_loop = AgentLoop::new(&components.agent, &components.executor, sandbox, steps)
        .with_max_iterations(settings.max_iterations);
    if let Some(tx) = options.event_tx {
        agent_loop = agent_loop.with_event_tx(tx);
    }
    let outcome = agent_loop
        .run(&handle, &conversation, &request.request_text)
        .await?;

    let mut resolver = ResultResolver::new(sandbox, store, &components.summarizer, steps)
        .with_port(settings.endpoint_port);
    if let Some(tx) = options.event_tx {
        resolver = resolver.with_event_tx(tx);
    }
    let run = RunIdentity {
        run_id: &request.run_id,
        conversation_id: &request.conversation_id,
    };
    resolver.resolve(&run, &handle, &outcome.state).await
}

/// 并发 Run 的结果回报
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub conversation_id: String,
    pub result: Result<RunOutput, AgentError>,
}

/// Run 分发器：每个入站请求一个独立任务
pub struct RunDispatcher {
    store: Arc<dyn RecordStore>,
    tx: mpsc::Sender<RunRequest>,
    worker: tokio::task::JoinHandle<()>,
}

impl RunDispatcher {
    /// 启动后台分发任务；返回分发器与结果接收端
    pub fn start(components: Arc<AgentComponents>) -> (Self, mpsc::UnboundedReceiver<RunReport>) {
        let (tx, mut rx) = mpsc::channel::<RunRequest>(64);
        let (report_tx, report_rx) = mpsc::unbounded_channel::<RunReport>();
        let store = components.store.clone();

        let worker = tokio::spawn(async move {
            let mut runs = JoinSet::new();
            loop {
                tokio::select! {
                    request = rx.recv() => {
                        let Some(request) = request else { break };
                        let components = components.clone();
                        let report_tx = report_tx.clone();
                        runs.spawn(async move {
                            let steps = MemoStepRunner::new();
                            let result =
                                run_code_agent(&components, &steps, &request, RunOptions::default()).await;
                            let _ = report_tx.send(RunReport {
                                run_id: request.run_id,
                                conversation_id: request.conversation_id,
                                result,
                            });
                        });
                    }
                    Some(joined) = runs.join_next() => {
                        if let Err(e) = joined {
                            tracing::error!(error = %e, "run task panicked");
                        }
                    }
                }
            }
            // 发送端已关闭：等待进行中的 Run 写完终态记录
            while let Some(joined) = runs.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "run task panicked");
                }
            }
        });

        (
            Self {
                store,
                tx,
                worker,
            },
            report_rx,
        )
    }

    /// 记录用户请求并投递一次 Run；返回 run_id
    ///
    /// 先占用队列位置再写用户消息，分发器已停止时不会留下没有终态记录的请求。
    pub async fn submit(&self, conversation_id: &str, request_text: &str) -> Result<String, AgentError> {
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| AgentError::DispatcherClosed)?;
        let request = submit_request(self.store.as_ref(), conversation_id, request_text).await?;
        let run_id = request.run_id.clone();
        permit.send(request);
        tracing::debug!(run_id = %run_id, "run dispatched");
        Ok(run_id)
    }

    /// 停止接收新请求，等待已投递的 Run 全部完成
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "dispatcher task failed");
        }
    }
}
