//! 编排集成测试：ScriptedLlmClient + MemorySandbox + MemoStepRunner 驱动完整 Run

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kiln::core::{
    run_code_agent, submit_request, AgentError, MemoStepRunner, RunDispatcher, RunOptions, RunRequest,
    ERROR_MESSAGE,
};
use kiln::llm::{MockLlmClient, ModelOutput, ScriptedLlmClient, ToolCall};
use kiln::memory::{Message, MemoryStore, MessageRecord, RecordKind, RecordStore, Role, StoreError};
use kiln::react::{RunEvent, RESPONSE_FALLBACK, TITLE_FALLBACK};
use kiln::sandbox::{MemorySandbox, SandboxHandle};
use kiln::AgentComponents;
use tokio::sync::mpsc;

const TITLE_NEEDLE: &str = "descriptive title";
const RESPONSE_NEEDLE: &str = "user-friendly message";

fn write_call(files: &[(&str, &str)]) -> ModelOutput {
    let files: Vec<serde_json::Value> = files
        .iter()
        .map(|(path, content)| serde_json::json!({"path": path, "content": content}))
        .collect();
    ModelOutput::ToolCall(ToolCall {
        tool: "write_files".into(),
        args: serde_json::json!({ "files": files }),
    })
}

fn text(s: &str) -> ModelOutput {
    ModelOutput::Text(s.to_string())
}

async fn assistant_records(store: &dyn RecordStore, conversation: &str) -> Vec<MessageRecord> {
    store
        .records(conversation)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.role == Role::Assistant)
        .collect()
}

/// 前 `failures` 次 append 失败的存储
struct FlakyStore {
    inner: MemoryStore,
    failures_left: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn append(&self, record: MessageRecord) -> Result<(), StoreError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Database("connection reset".to_string()));
        }
        self.inner.append(record).await
    }

    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        self.inner.recent_messages(conversation_id, limit).await
    }

    async fn records(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        self.inner.records(conversation_id).await
    }
}

#[tokio::test]
async fn test_iteration_ceiling_with_files_is_success_with_fallback_title() {
    let llm = Arc::new(
        ScriptedLlmClient::new(vec![write_call(&[("counter.tsx", "export const Counter = () => null;")])])
            .then_repeat(text("Still polishing the counter.")),
    );
    let sandbox = Arc::new(MemorySandbox::new());
    let store = Arc::new(MemoryStore::new());
    let components = AgentComponents::new(llm.clone(), sandbox.clone(), store.clone());
    let steps = MemoStepRunner::new();
    let request = RunRequest::new("conv-1", "build a counter component");

    let output = run_code_agent(&components, &steps, &request, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(llm.agent_calls(), 15);
    assert_eq!(output.title, TITLE_FALLBACK);
    assert_eq!(output.summary, "");
    assert!(output.files.contains_key("counter.tsx"));
    assert_eq!(output.url, "https://3000-mem-0.sandbox.local");

    let records = assistant_records(store.as_ref(), "conv-1").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, RecordKind::Result);
    assert_eq!(records[0].content, RESPONSE_FALLBACK);
    assert_eq!(records[0].artifact.as_ref().unwrap().title, TITLE_FALLBACK);
}

#[tokio::test]
async fn test_completion_marker_on_third_step_stops_loop() {
    let summary = "<task_summary>Done, added login form</task_summary>";
    let llm = Arc::new(
        ScriptedLlmClient::new(vec![
            write_call(&[("app/login.tsx", "form")]),
            text("Checking the form renders."),
            text(summary),
        ])
        .then_repeat(write_call(&[("never.txt", "x")]))
        .with_aux(TITLE_NEEDLE, text("Login Form"))
        .with_aux(RESPONSE_NEEDLE, text("I added a login form to your app.")),
    );
    let sandbox = Arc::new(MemorySandbox::new());
    let store = Arc::new(MemoryStore::new());
    let components = AgentComponents::new(llm.clone(), sandbox.clone(), store.clone());
    let steps = MemoStepRunner::new();
    let request = RunRequest::new("conv-2", "add a login form");

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let options = RunOptions {
        event_tx: Some(&event_tx),
    };
    let output = run_code_agent(&components, &steps, &request, options).await.unwrap();

    assert_eq!(llm.agent_calls(), 3);
    assert_eq!(output.summary, summary);
    assert_eq!(output.title, "Login Form");
    assert!(!output.files.contains_key("never.txt"));

    let records = assistant_records(store.as_ref(), "conv-2").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, "I added a login form to your app.");
    assert_eq!(records[0].artifact.as_ref().unwrap().files["app/login.tsx"], "form");

    drop(event_tx);
    let mut finished = None;
    while let Some(ev) = event_rx.recv().await {
        if let RunEvent::LoopFinished { iterations, .. } = ev {
            finished = Some(iterations);
        }
    }
    assert_eq!(finished, Some(3));
}

#[tokio::test]
async fn test_provision_failure_propagates_without_record() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![text("<task_summary>x</task_summary>")]));
    let sandbox = Arc::new(MemorySandbox::new().failing_provision());
    let store = Arc::new(MemoryStore::new());
    let components = AgentComponents::new(llm.clone(), sandbox, store.clone());
    let steps = MemoStepRunner::new();
    let request = RunRequest::new("conv-3", "anything");

    let err = run_code_agent(&components, &steps, &request, RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Sandbox(_)));
    assert!(store.records("conv-3").await.unwrap().is_empty());
    assert_eq!(llm.agent_calls(), 0);
}

#[tokio::test]
async fn test_partial_write_failure_diverges_sandbox_and_whiteboard() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        write_call(&[("first.txt", "one"), ("second.txt", "two")]),
        text("<task_summary>Tried to write two files</task_summary>"),
    ]));
    let sandbox = Arc::new(MemorySandbox::new().failing_write_at(2));
    let store = Arc::new(MemoryStore::new());
    let components = AgentComponents::new(llm.clone(), sandbox.clone(), store.clone());
    let steps = MemoStepRunner::new();
    let request = RunRequest::new("conv-4", "write two files");

    let output = run_code_agent(&components, &steps, &request, RunOptions::default())
        .await
        .unwrap();

    let handle = SandboxHandle("mem-0".to_string());
    assert_eq!(sandbox.file(&handle, "first.txt").as_deref(), Some("one"));
    assert!(sandbox.file(&handle, "second.txt").is_none());
    assert!(output.files.is_empty());

    // 失败以 Observation 形式回给 Agent
    let second_request = &llm.requests()[1];
    let observation = second_request
        .messages
        .iter()
        .find(|m| m.content.starts_with("Observation from write_files"))
        .unwrap();
    assert!(observation.content.contains("Error:"));
}

#[tokio::test]
async fn test_empty_run_writes_error_record() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![]).then_repeat(text("I am not sure what to do.")));
    let sandbox = Arc::new(MemorySandbox::new());
    let store = Arc::new(MemoryStore::new());
    let components = AgentComponents::new(llm.clone(), sandbox, store.clone());
    let steps = MemoStepRunner::new();
    let request = RunRequest::new("conv-5", "do nothing");

    let output = run_code_agent(&components, &steps, &request, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(llm.agent_calls(), 15);
    assert!(output.files.is_empty());
    assert_eq!(output.summary, "");
    let records = assistant_records(store.as_ref(), "conv-5").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, RecordKind::Error);
    assert_eq!(records[0].content, ERROR_MESSAGE);
    assert!(records[0].artifact.is_none());
    assert_eq!(llm.requests().len(), 15);
}

#[tokio::test]
async fn test_files_are_monotonic_and_summary_set_once() {
    let first_summary = "<task_summary>First</task_summary>";
    let llm = Arc::new(
        ScriptedLlmClient::new(vec![
            write_call(&[("a.txt", "1")]),
            write_call(&[("b.txt", "2")]),
            write_call(&[("a.txt", "3")]),
            text(first_summary),
        ])
        .then_repeat(text("<task_summary>Second</task_summary>")),
    );
    let sandbox = Arc::new(MemorySandbox::new());
    let store = Arc::new(MemoryStore::new());
    let components = AgentComponents::new(llm.clone(), sandbox, store.clone());
    let steps = MemoStepRunner::new();
    let request = RunRequest::new("conv-6", "write files");

    let output = run_code_agent(&components, &steps, &request, RunOptions::default())
        .await
        .unwrap();

    let prompts: Vec<String> = llm
        .requests()
        .into_iter()
        .filter(|r| !r.tools.is_empty())
        .map(|r| r.system_prompt)
        .collect();
    assert_eq!(prompts.len(), 4);
    assert!(prompts[1].contains("a.txt"));
    assert!(prompts[2].contains("a.txt") && prompts[2].contains("b.txt"));
    assert!(prompts[3].contains("a.txt") && prompts[3].contains("b.txt"));

    assert_eq!(output.files.len(), 2);
    assert_eq!(output.files["a.txt"], "3");
    assert_eq!(output.summary, first_summary);
}

#[tokio::test]
async fn test_retries_and_replay_persist_exactly_one_record() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        write_call(&[("index.html", "<h1>hi</h1>")]),
        text("<task_summary>Static page</task_summary>"),
    ]));
    let sandbox = Arc::new(MemorySandbox::new());
    let store = Arc::new(FlakyStore::new(2));
    let components = AgentComponents::new(llm.clone(), sandbox.clone(), store.clone());
    let steps = MemoStepRunner::with_max_attempts(3);
    let request = RunRequest::new("conv-7", "static page");

    let first = run_code_agent(&components, &steps, &request, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(assistant_records(store.as_ref(), "conv-7").await.len(), 1);

    // 重新调度同一 Run：所有步骤命中 journal，不再调用 LLM、沙箱或存储
    let calls_before = llm.requests().len();
    steps.replay().await;
    let second = run_code_agent(&components, &steps, &request, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(llm.requests().len(), calls_before);
    assert_eq!(sandbox.provisioned(), 1);
    assert_eq!(assistant_records(store.as_ref(), "conv-7").await.len(), 1);
    let completed = steps.completed_steps().await;
    assert!(completed.contains(&"save-result".to_string()));
    assert!(completed.contains(&"code-agent:1".to_string()));
    assert!(completed.contains(&"write_files".to_string()));
}

#[tokio::test]
async fn test_history_is_bounded_and_includes_previous_turns() {
    let store = Arc::new(MemoryStore::new());
    for i in 0..6 {
        store
            .append(MessageRecord::user("conv-8", format!("old request {}", i)))
            .await
            .unwrap();
    }
    let llm = Arc::new(ScriptedLlmClient::new(vec![text("<task_summary>ok</task_summary>")]));
    let sandbox = Arc::new(MemorySandbox::new());
    let components = AgentComponents::new(llm.clone(), sandbox, store.clone());
    let steps = MemoStepRunner::new();

    let request = submit_request(store.as_ref(), "conv-8", "new request").await.unwrap();
    run_code_agent(&components, &steps, &request, RunOptions::default())
        .await
        .unwrap();

    let messages = &llm.requests()[0].messages;
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0].content, "old request 2");
    assert_eq!(messages.last().unwrap().content, "new request");
}

#[tokio::test]
async fn test_dispatcher_runs_requests_concurrently() {
    let store = Arc::new(MemoryStore::new());
    let components = Arc::new(AgentComponents::new(
        Arc::new(MockLlmClient),
        Arc::new(MemorySandbox::new()),
        store.clone(),
    ));
    let (dispatcher, mut reports) = RunDispatcher::start(components);

    let a = dispatcher.submit("conv-a", "make a todo app").await.unwrap();
    let b = dispatcher.submit("conv-b", "make a blog").await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let report = reports.recv().await.unwrap();
        let output = report.result.unwrap();
        assert!(output.files.contains_key("README.md"));
        assert!(output.summary.contains("<task_summary>"));
        seen.push(report.run_id);
    }
    seen.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(seen, expected);

    for conv in ["conv-a", "conv-b"] {
        let records = store.records(conv).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[1].kind, RecordKind::Result);
    }
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_lets_submitted_run_finish() {
    let store = Arc::new(MemoryStore::new());
    let components = Arc::new(AgentComponents::new(
        Arc::new(MockLlmClient),
        Arc::new(MemorySandbox::new()),
        store.clone(),
    ));
    let (dispatcher, mut reports) = RunDispatcher::start(components);

    let run_id = dispatcher.submit("conv-x", "make a landing page").await.unwrap();
    dispatcher.shutdown().await;

    let report = reports.recv().await.unwrap();
    assert_eq!(report.run_id, run_id);
    assert!(report.result.is_ok());

    let records = assistant_records(store.as_ref(), "conv-x").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, RecordKind::Result);
    assert!(reports.recv().await.is_none());
}
