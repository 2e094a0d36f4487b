//! Kiln CLI：对一条自然语言请求跑一次完整 Run，并以 JSON 输出 RunOutput
//!
//! Usage:
//!   kiln [--config <path>] [--conversation <id>] [--events] <request text...>
//!   kiln [--conversation <id>] [--events]              Read request from stdin

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use kiln::config::{load_config, AppConfig};
use kiln::core::{run_code_agent, submit_request, MemoStepRunner, RunOptions};
use kiln::create_agent_components;
use kiln::react::RunEvent;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Run the code agent once for a natural-language request")]
struct Cli {
    /// Config file (defaults to config/default.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Conversation id; a fresh one is generated when omitted
    #[arg(long)]
    conversation: Option<String>,

    /// Print progress events as JSON lines on stderr
    #[arg(long)]
    events: bool,

    /// Request text; read from stdin when empty
    request: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kiln::observability::init();

    let cli = Cli::parse();
    let mut request_text = cli.request.join(" ");
    if request_text.trim().is_empty() {
        std::io::stdin()
            .read_to_string(&mut request_text)
            .context("Failed to read request from stdin")?;
    }
    let request_text = request_text.trim().to_string();
    let conversation = cli
        .conversation
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if request_text.is_empty() {
        bail!("empty request");
    }

    let cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let components = create_agent_components(&cfg)
        .await
        .context("Failed to create agent components")?;

    let request = submit_request(components.store.as_ref(), &conversation, &request_text)
        .await
        .context("Failed to record request")?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let printer = cli.events.then(|| {
        tokio::spawn(async move {
            while let Some(ev) = event_rx.recv().await {
                if let Ok(line) = serde_json::to_string(&ev) {
                    eprintln!("{}", line);
                }
            }
        })
    });

    let steps = MemoStepRunner::new();
    let options = RunOptions {
        event_tx: cli.events.then_some(&event_tx),
    };
    let result = run_code_agent(&components, &steps, &request, options).await;
    drop(event_tx);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let output = result.context("Run failed")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to encode output")?
    );
    Ok(())
}
