//! Thread and turn execution engine for tool-using coding agents.
//!
//! Invariant: every turn stream ends with exactly one `turn.completed` or
//! `turn.failed`, and thread history changes only when a turn completes.
//!
//! # Public API Overview
//! - Create a [`Codex`] over any [`RunProvider`] and start, resume, or fork
//!   [`Thread`]s.
//! - Drive turns with [`Thread::run_streamed`] (an [`EventStream`] of
//!   [`ThreadEvent`]s) or collect them with [`Thread::run`].
//! - Extend the model's toolbox with [`Codex::register_tool`] and gate
//!   side effects with [`ApprovalHandler`]s.
//! - Track task plans with [`Thread::update_plan`] and [`Thread::modify_plan`].
//! - Browse saved rollouts with [`Codex::list_threads`].

#![allow(clippy::too_many_arguments, clippy::type_complexity)]

use std::sync::{Mutex, MutexGuard};

pub mod config;
pub mod logging;

mod approval;
mod codex;
mod dispatch;
mod error;
mod fork;
mod input;
mod plan;
mod stream;
mod thread;
mod tools;
mod turn;

/// Engine entry points.
pub use crate::codex::{Codex, DEFAULT_PAGE_SIZE};
pub use crate::fork::{ForkOptions, ForkResult};
pub use crate::thread::{Thread, TurnResult};

/// Settings for instances, threads, and turns.
pub use crate::config::{
    ApprovalMode, CodexOptions, EnvConfig, ReasoningEffort, SandboxMode, ThreadOptions,
    TurnOptions,
};

/// Caller-registered tools.
pub use crate::dispatch::{
    BuiltinCall, ToolHandler, ToolInterceptor, ToolInvocation, ToolRegistration, ToolResult,
};

/// Approval callbacks.
pub use crate::approval::{approval_kind_for_tool, ApprovalHandler};

/// Turn input and output.
pub use crate::input::{Input, UserInput};
pub use crate::stream::EventStream;

pub use crate::error::CodexError;
pub use crate::plan::{apply_operations, Plan};

/// Provider contract and wire types, re-exported for callers.
pub use agent_provider::{CancelSignal, ProviderProfile, RunProvider};
pub use session_store::{SessionPage, SessionSummary};
pub use thread_protocol::{
    ApprovalKind, ApprovalRequest, PlanOperation, PlanStep, PlanStepUpdate, StepStatus,
    ThreadError, ThreadEvent, ThreadItem, ThreadItemDetails, Usage,
};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
