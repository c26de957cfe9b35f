//! `codeloop run` — drive one agent run and render its events.
//!
//! Assistant text goes to stdout; tool activity, notices and errors go to
//! stderr. Every pending diff is held in the approval set until this command
//! either writes it (`--apply`) or rejects it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codeloop_agent::{AgentSettings, AttachedFile, ChatRequest, Orchestrator};
use codeloop_config::AppConfig;
use codeloop_core::event::{RunEvent, RunEventKind};
use codeloop_core::tier::{ContextMode, LicenseTier};
use codeloop_core::tool::ToolName;
use codeloop_tools::{PendingApprovals, PendingDiff, ProjectRoot, ToolExecutor, default_registry};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct RunArgs {
    pub message: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tier: Option<LicenseTier>,
    pub context: Option<ContextMode>,
    pub project: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    pub apply: bool,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let project = match args.project {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    if !project.is_dir() {
        return Err(format!("Project directory not found: {}", project.display()).into());
    }
    let root = ProjectRoot::new(&project);

    let approvals = Arc::new(PendingApprovals::new());
    let executor = ToolExecutor::new(default_registry(&root))
        .with_project_root(root.clone())
        .with_approvals(approvals.clone())
        .with_diff_sink(approvals.clone())
        .with_approval_wait(AgentSettings::approval_wait(&config));

    let router = codeloop_providers::build_from_config(&config);
    let orchestrator = Arc::new(
        Orchestrator::new(Arc::new(router), executor).with_settings(AgentSettings::from_config(&config)),
    );

    let provider = args.provider.unwrap_or_else(|| config.default_provider.clone());
    let mut request = ChatRequest::new(args.message, provider)
        .with_tier(args.tier.unwrap_or(config.agent.license_tier))
        .with_project(root.path());
    if let Some(model) = args.model {
        request = request.with_model(model);
    }
    if let Some(mode) = args.context {
        request = request.with_context_mode(mode);
    }
    request.context.files = read_attachments(&args.files).await?;

    let (tx, rx) = mpsc::channel(256);
    let renderer = tokio::spawn(render(rx, approvals.clone(), root, args.apply));

    let interrupt = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n  [Cancelling...]");
                orchestrator.cancel();
            }
        })
    };

    let result = orchestrator.run(request, tx).await;
    interrupt.abort();
    renderer.await?;

    let report = result?;
    info!(
        phase = ?report.phase,
        iterations = report.iterations,
        continuations = report.continuations,
        "Run complete"
    );
    if let Some(summary) = &report.summary {
        eprintln!("\n  Summary: {summary}");
    }
    Ok(())
}

async fn read_attachments(paths: &[PathBuf]) -> Result<Vec<AttachedFile>, Box<dyn std::error::Error>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read attachment {}: {e}", path.display()))?;
        files.push(AttachedFile {
            path: path.display().to_string(),
            content,
        });
    }
    Ok(files)
}

async fn render(mut rx: mpsc::Receiver<RunEvent>, approvals: Arc<PendingApprovals>, root: ProjectRoot, apply: bool) {
    while let Some(event) = rx.recv().await {
        match event.kind {
            RunEventKind::Text => {
                if let Some(text) = event.as_text() {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
            }
            RunEventKind::FunctionCall => {
                eprintln!("\n  → {} {}", event.name.as_deref().unwrap_or("?"), event.data);
            }
            RunEventKind::FunctionResult => {
                let name = event.name.as_deref().unwrap_or("?");
                if let Some(error) = event.data.get("error").and_then(|e| e.as_str()) {
                    eprintln!("  ✗ {name}: {error}");
                } else if name == ToolName::WriteFile.as_str() {
                    review_diff(&event, &approvals, &root, apply).await;
                } else {
                    eprintln!("  ✓ {name}");
                }
            }
            RunEventKind::Continuation => {
                eprintln!(
                    "\n  [Context exhausted; continuing in a fresh session ({}/{})]",
                    event.data["count"], event.data["max"]
                );
            }
            RunEventKind::Error => {
                eprintln!("\n  [Error] {}", event.as_text().unwrap_or("unknown error"));
            }
            RunEventKind::Done => println!(),
        }
    }
}

/// Accept or reject one pending diff. Either way it leaves the approval set.
async fn review_diff(event: &RunEvent, approvals: &PendingApprovals, root: &ProjectRoot, apply: bool) {
    let diff: PendingDiff = match serde_json::from_value(event.data.clone()) {
        Ok(diff) => diff,
        Err(e) => {
            warn!(error = %e, "Unreadable write_file result");
            return;
        }
    };

    if !apply {
        eprintln!("  ✗ {} not written (re-run with --apply to accept changes)", diff.path);
    } else {
        match apply_diff(root, &diff).await {
            Ok(path) => eprintln!("  ✓ wrote {}", path.display()),
            Err(e) => eprintln!("  ✗ failed to write {}: {e}", diff.path),
        }
    }
    approvals.resolve(&diff.path);
}

/// Write the diff's modified content under the project root.
async fn apply_diff(root: &ProjectRoot, diff: &PendingDiff) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let target = root.resolve(&diff.path, ToolName::WriteFile)?;
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, &diff.modified).await?;
    Ok(relative_or_full(root.path(), &target))
}

fn relative_or_full(root: &Path, target: &Path) -> PathBuf {
    target.strip_prefix(root).map(Path::to_path_buf).unwrap_or_else(|_| target.to_path_buf())
}
