//! The orchestrator — the only component callers talk to.
//!
//! One [`Orchestrator::run`] drives a chat request to the end:
//!
//! 1. Resolve the provider adapter and model
//! 2. Apply the license gate (iteration ceiling, context mode)
//! 3. Build the project context and system prompt
//! 4. Loop: stream a turn, forward text live, then execute the queued tool
//!    calls sequentially and append their results
//! 5. On context-limit or timeout, checkpoint progress and start a fresh pass
//!    seeded with the snapshot
//!
//! Every run ends with exactly one terminal event: `done` or `error`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use codeloop_core::error::{Error, ProviderError, Result};
use codeloop_core::event::RunEvent;
use codeloop_core::message::{Conversation, Message, MessageToolCall};
use codeloop_core::provider::{Provider, ProviderFactory, ProviderRequest};
use codeloop_core::stream::ProtocolEvent;
use codeloop_core::tier::LicenseTier;
use codeloop_core::tool::{ToolCall, ToolCallStatus};
use codeloop_tools::catalog;
use codeloop_tools::{ExecutionContext, RunLedger, ToolExecutor};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{ContextBuilder, ProjectContextBuilder, estimate_tokens};
use crate::continuation::{ContinuationManager, ContinuationSnapshot};
use crate::license::{GateResolution, LicenseGate};
use crate::loop_state::{LoopController, LoopPhase, TurnOutcome};
use crate::prompt::{build_system_prompt, build_user_message};
use crate::request::{AgentSettings, ChatRequest, RunReport};
use crate::retry::backoff;

pub struct Orchestrator {
    providers: Arc<dyn ProviderFactory>,
    executor: ToolExecutor,
    context: Arc<dyn ContextBuilder>,
    settings: AgentSettings,
    active: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Everything a pass needs that does not change between turns.
struct RunScope<'a> {
    provider: &'a dyn Provider,
    model: &'a str,
    system_prompt: &'a str,
    tier: LicenseTier,
    exec: ExecutionContext,
}

/// What one streamed turn produced.
#[derive(Default)]
struct TurnResponse {
    text: String,
    calls: Vec<MessageToolCall>,
}

/// Clears the active flag and the cancel slot when a run ends, however it ends.
struct ActiveRun<'a> {
    orchestrator: &'a Orchestrator,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.orchestrator
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.orchestrator.active.store(false, Ordering::Release);
    }
}

impl Orchestrator {
    pub fn new(providers: Arc<dyn ProviderFactory>, executor: ToolExecutor) -> Self {
        Self {
            providers,
            executor,
            context: Arc::new(ProjectContextBuilder::new()),
            settings: AgentSettings::default(),
            active: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    pub fn with_context_builder(mut self, context: Arc<dyn ContextBuilder>) -> Self {
        self.context = context;
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Cancel the active run. Safe to call any number of times, and a no-op
    /// when nothing is running.
    pub fn cancel(&self) {
        let slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.as_ref() {
            if !token.is_cancelled() {
                info!("Cancelling active run");
            }
            token.cancel();
        }
    }

    /// Run a chat request to completion, streaming [`RunEvent`]s to `events`.
    ///
    /// Cancellation, the tier ceiling and normal completion all end in `done`
    /// and `Ok`. Fatal failures end in `error` and `Err`.
    pub async fn run(&self, request: ChatRequest, events: mpsc::Sender<RunEvent>) -> Result<RunReport> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::RunInProgress);
        }
        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());
        let _active = ActiveRun { orchestrator: self };

        info!(
            provider = %request.provider,
            tier = %request.license_tier,
            history = request.conversation_history.len(),
            "Run started"
        );

        match self.drive(request, &events, cancel).await {
            Ok(report) => {
                info!(
                    phase = ?report.phase,
                    iterations = report.iterations,
                    continuations = report.continuations,
                    "Run finished"
                );
                emit(&events, RunEvent::done()).await;
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Run failed");
                emit(&events, RunEvent::error(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, request: ChatRequest, events: &mpsc::Sender<RunEvent>, cancel: CancellationToken) -> Result<RunReport> {
        let provider = self
            .providers
            .create(&request.provider, request.api_key.as_deref())?;
        let model = request
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| self.providers.default_model(&request.provider))
            .ok_or_else(|| ProviderError::NotConfigured(format!("no model configured for '{}'", request.provider)))?;

        let requested_mode = request
            .context
            .context_mode
            .unwrap_or(self.settings.default_context_mode);
        let gate = LicenseGate::resolve(request.license_tier, requested_mode);
        if let Some(notice) = &gate.notice {
            emit(events, RunEvent::text(notice.clone())).await;
        }

        let project_context = match &request.context.project {
            Some(dir) => Some(self.project_context(dir, &gate).await),
            None => None,
        };
        let system_prompt = build_system_prompt(project_context.as_deref(), gate.effective_mode);

        let mut conversation = Conversation::from_messages(request.conversation_history.clone());
        conversation.push(Message::user(build_user_message(
            &request.prompt,
            &request.context.files,
            &request.context.images,
        )));

        let scope = RunScope {
            provider: provider.as_ref(),
            model: &model,
            system_prompt: &system_prompt,
            tier: gate.tier,
            exec: ExecutionContext {
                cancel: cancel.clone(),
                events: events.clone(),
            },
        };

        let mut ledger = RunLedger::new();
        let mut continuations = ContinuationManager::new(self.settings.max_continuations);
        let mut iterations = 0u32;

        loop {
            let mut controller = LoopController::new(gate.limits.max_iterations);
            controller.start();

            let outcome = self
                .run_pass(&scope, &mut controller, &mut conversation, &mut ledger)
                .await;
            iterations += controller.iteration();

            let phase = match outcome {
                Ok(phase) => phase,
                Err(_) if cancel.is_cancelled() => {
                    controller.abort();
                    LoopPhase::Aborted
                }
                Err(e) if e.triggers_continuation() => {
                    warn!(error = %e, "Context exhausted, checkpointing progress");
                    let count = continuations.try_begin()?;
                    emit(events, RunEvent::continuation(count, continuations.max())).await;

                    let snapshot = ContinuationSnapshot::capture(
                        &request.prompt,
                        &ledger,
                        &conversation,
                        self.settings.snapshot_file_chars,
                    );
                    conversation = Conversation::from_messages(vec![Message::user(snapshot.into_seed_prompt())]);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            return Ok(RunReport {
                phase,
                iterations,
                continuations: continuations.count(),
                conversation,
                summary: ledger.summary().map(String::from),
            });
        }
    }

    async fn project_context(&self, dir: &Path, gate: &GateResolution) -> String {
        let context = self.context.build_context(dir, gate.effective_mode).await;
        debug!(
            project = %dir.display(),
            mode = %gate.effective_mode,
            tokens = estimate_tokens(&context),
            "Project context ready"
        );
        context
    }

    /// One pass of the turn loop. Returns the terminal phase, or the provider
    /// error that ended the pass.
    async fn run_pass(
        &self,
        scope: &RunScope<'_>,
        controller: &mut LoopController,
        conversation: &mut Conversation,
        ledger: &mut RunLedger,
    ) -> std::result::Result<LoopPhase, ProviderError> {
        let cancel = &scope.exec.cancel;

        loop {
            if cancel.is_cancelled() {
                controller.abort();
                return Ok(controller.phase());
            }
            let Some(iteration) = controller.begin_request() else {
                return Ok(controller.phase());
            };
            debug!(iteration, messages = conversation.len(), "Agent loop iteration");

            let mut request = ProviderRequest::new(scope.model, conversation.messages.clone());
            request.system_prompt = Some(scope.system_prompt.to_string());
            request.tools = catalog::definitions();
            request.temperature = self.settings.temperature;
            request.max_tokens = self.settings.max_tokens;

            let turn = match self.stream_turn(scope, request).await {
                Ok(turn) => turn,
                Err(ProviderError::Cancelled) => {
                    controller.abort();
                    return Ok(controller.phase());
                }
                Err(e) => return Err(e),
            };

            let has_text = !turn.text.trim().is_empty();
            conversation.push(Message::assistant_with_tools(turn.text, turn.calls.clone()));

            let mut executed = 0;
            for requested in turn.calls {
                if cancel.is_cancelled() {
                    break;
                }
                emit(
                    &scope.exec.events,
                    RunEvent::function_call(&requested.id, &requested.name, requested.arguments.clone()),
                )
                .await;

                let mut call = ToolCall::new(requested.id, requested.name, requested.arguments);
                call.status = ToolCallStatus::Executing;
                let result = self.executor.execute(&call, ledger, &scope.exec).await;
                call.status = if result.is_error {
                    ToolCallStatus::Failed
                } else {
                    ToolCallStatus::Completed
                };
                debug!(tool = %call.name, call_id = %call.id, status = ?call.status, "Tool call finished");

                emit(
                    &scope.exec.events,
                    RunEvent::function_result(&call.id, &call.name, result.response.clone()),
                )
                .await;
                conversation.push(Message::tool_result(&call.id, result.response.to_string()));
                executed += 1;
            }

            if cancel.is_cancelled() {
                controller.abort();
                return Ok(controller.phase());
            }

            let phase = controller.after_turn(TurnOutcome {
                executed_tool_calls: executed,
                has_text,
                task_completed: ledger.task_completed(),
            });
            match phase {
                LoopPhase::Running => continue,
                LoopPhase::LimitReached => {
                    let max = controller.state().max_iterations.unwrap_or(iteration);
                    info!(tier = %scope.tier, max, "Iteration ceiling reached");
                    emit(
                        &scope.exec.events,
                        RunEvent::text(format!(
                            "\n[Reached the {} plan limit of {max} iterations. Send a new message to keep going, or upgrade for a higher limit.]\n",
                            scope.tier
                        )),
                    )
                    .await;
                    return Ok(phase);
                }
                _ => return Ok(phase),
            }
        }
    }

    /// Send one request, retrying transient failures. Text is forwarded live;
    /// tool calls are only queued, so a failed attempt never executes anything.
    async fn stream_turn(&self, scope: &RunScope<'_>, request: ProviderRequest) -> std::result::Result<TurnResponse, ProviderError> {
        let retry = &self.settings.retry;
        let cancel = &scope.exec.cancel;
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            let error = match self.stream_attempt(scope, request.clone()).await {
                Ok(turn) => return Ok(turn),
                Err(e) => e,
            };
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            if !retry.should_retry(attempt, &error) {
                return Err(error);
            }

            let delay = retry.delay_for(attempt, &error);
            warn!(
                attempt,
                max_attempts = retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient provider error, retrying"
            );
            if !backoff(delay, cancel).await {
                return Err(ProviderError::Cancelled);
            }
            attempt += 1;
        }
    }

    async fn stream_attempt(&self, scope: &RunScope<'_>, request: ProviderRequest) -> std::result::Result<TurnResponse, ProviderError> {
        let cancel = &scope.exec.cancel;
        let mut rx = scope.provider.stream(request, cancel.clone()).await?;
        let mut turn = TurnResponse::default();
        let mut seen = HashSet::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                next = rx.recv() => next,
            };

            let event = match next {
                None => break,
                Some(event) => event?,
            };
            match event {
                ProtocolEvent::TextDelta { text } => {
                    if !text.is_empty() {
                        turn.text.push_str(&text);
                        emit(&scope.exec.events, RunEvent::text(text)).await;
                    }
                }
                ProtocolEvent::ToolCallEnd { id, name, arguments } => {
                    if seen.insert(id.clone()) {
                        turn.calls.push(MessageToolCall { id, name, arguments });
                    } else {
                        debug!(call_id = %id, "Duplicate tool call ignored");
                    }
                }
                ProtocolEvent::ToolCallStart { .. } | ProtocolEvent::ToolCallDelta { .. } => {}
                ProtocolEvent::Finish { reason, usage } => {
                    debug!(
                        reason = reason.as_deref().unwrap_or("none"),
                        total_tokens = usage.map(|u| u.total_tokens).unwrap_or(0),
                        "Turn finished"
                    );
                    break;
                }
                ProtocolEvent::StreamError { message } => {
                    return Err(ProviderError::StreamInterrupted(message));
                }
            }
        }

        Ok(turn)
    }
}

/// Send an event; a dropped receiver only means nobody is watching.
async fn emit(events: &mpsc::Sender<RunEvent>, event: RunEvent) {
    if events.send(event).await.is_err() {
        debug!("Run event receiver dropped");
    }
}
