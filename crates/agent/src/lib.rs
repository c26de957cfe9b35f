//! The agentic orchestration loop of codeloop.
//!
//! The [`Orchestrator`] follows a **stream → act → observe** cycle:
//!
//! 1. **Gate** the request by license tier (iteration ceiling, context mode)
//! 2. **Build context** (system prompt + project context + attachments)
//! 3. **Stream** a turn from the provider, forwarding text as it arrives
//! 4. **If tool calls**: execute them in order, append results, loop back to 3
//! 5. **Stop** on `task_complete`, a text-only turn, the ceiling or cancellation
//!
//! Context-limit and timeout failures are recovered by starting a fresh pass
//! seeded with a snapshot of the run's progress.

pub mod context;
pub mod continuation;
pub mod license;
pub mod loop_state;
pub mod orchestrator;
pub mod prompt;
pub mod request;
pub mod retry;

pub use context::{ContextBuilder, NoContext, ProjectContextBuilder};
pub use continuation::{ContinuationManager, ContinuationSnapshot, PartialFile};
pub use license::{GateResolution, LicenseGate, TierLimits};
pub use loop_state::{LoopController, LoopPhase, LoopState, TurnOutcome};
pub use orchestrator::Orchestrator;
pub use request::{AgentSettings, AttachedFile, ChatRequest, RequestContext, RunReport};
pub use retry::RetryPolicy;
