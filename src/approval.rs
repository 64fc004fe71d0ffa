//! Approval gate for side-effecting tool calls.
//!
//! A decision comes from the thread-level handler, else the instance-level
//! handler, else the thread's [`ApprovalMode`]. Any failure to decide denies.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use agent_provider::CancelSignal;
use async_trait::async_trait;
use futures::FutureExt;
use thread_protocol::{ApprovalKind, ApprovalRequest, ThreadEvent};
use tokio::sync::oneshot;

use crate::config::ApprovalMode;
use crate::error::CodexError;
use crate::lock_unpoisoned;
use crate::stream::EventSink;

/// Decides one approval request. `Err` denies.
#[async_trait]
pub trait ApprovalHandler: Send + Sync + 'static {
    async fn decide(&self, request: ApprovalRequest) -> Result<bool, String>;
}

#[async_trait]
impl<F, Fut> ApprovalHandler for F
where
    F: Fn(ApprovalRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, String>> + Send + 'static,
{
    async fn decide(&self, request: ApprovalRequest) -> Result<bool, String> {
        (self)(request).await
    }
}

/// Maps a tool name onto the side effect it would perform.
#[must_use]
pub fn approval_kind_for_tool(tool_name: &str) -> Option<ApprovalKind> {
    match tool_name {
        "shell" | "local_shell" | "exec_command" => Some(ApprovalKind::Shell),
        "write_file" | "edit_file" | "apply_patch" => Some(ApprovalKind::FileWrite),
        "web_search" | "fetch" | "http_request" => Some(ApprovalKind::NetworkAccess),
        _ => None,
    }
}

/// Instance-wide approval state: the shared handler and requests waiting on
/// [`crate::Codex::respond_to_approval`].
#[derive(Default)]
pub(crate) struct ApprovalHub {
    handler: Mutex<Option<Arc<dyn ApprovalHandler>>>,
    serial: tokio::sync::Mutex<()>,
    pending: Mutex<HashMap<String, oneshot::Sender<bool>>>,
    next_request_id: AtomicU64,
}

impl ApprovalHub {
    pub(crate) fn set_handler(&self, handler: Arc<dyn ApprovalHandler>) {
        *lock_unpoisoned(&self.handler) = Some(handler);
    }

    pub(crate) fn clear_handler(&self) {
        *lock_unpoisoned(&self.handler) = None;
    }

    fn handler(&self) -> Option<Arc<dyn ApprovalHandler>> {
        lock_unpoisoned(&self.handler).clone()
    }

    pub(crate) fn respond(&self, request_id: &str, approved: bool) -> Result<(), CodexError> {
        let sender = lock_unpoisoned(&self.pending)
            .remove(request_id)
            .ok_or_else(|| {
                CodexError::NotFound(format!("No pending approval request {request_id}"))
            })?;
        // The waiting turn may have been cancelled meanwhile.
        let _ = sender.send(approved);
        Ok(())
    }

    async fn call_handler(&self, handler: &dyn ApprovalHandler, request: ApprovalRequest) -> bool {
        let _serial = self.serial.lock().await;
        match AssertUnwindSafe(handler.decide(request)).catch_unwind().await {
            Ok(Ok(approved)) => approved,
            Ok(Err(error)) => {
                tracing::warn!(%error, "approval handler failed; denying");
                false
            }
            Err(_) => {
                tracing::warn!("approval handler panicked; denying");
                false
            }
        }
    }

    async fn wait_for_caller(
        &self,
        request: ApprovalRequest,
        sink: &EventSink,
        cancel: &CancelSignal,
    ) -> bool {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let request_id = format!("approval_{id}");
        let (sender, receiver) = oneshot::channel();
        lock_unpoisoned(&self.pending).insert(request_id.clone(), sender);

        sink.send(ThreadEvent::ApprovalRequested {
            request_id: request_id.clone(),
            request,
        });

        let approved = tokio::select! {
            decision = receiver => decision.unwrap_or(false),
            _ = cancel.cancelled() => false,
        };
        lock_unpoisoned(&self.pending).remove(&request_id);
        approved
    }
}

/// The gate as seen by one running turn.
#[derive(Clone)]
pub(crate) struct ApprovalGate {
    hub: Arc<ApprovalHub>,
    thread_handler: Option<Arc<dyn ApprovalHandler>>,
    mode: ApprovalMode,
    sink: EventSink,
    cancel: CancelSignal,
}

impl ApprovalGate {
    pub(crate) fn new(
        hub: Arc<ApprovalHub>,
        thread_handler: Option<Arc<dyn ApprovalHandler>>,
        mode: ApprovalMode,
        sink: EventSink,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            hub,
            thread_handler,
            mode,
            sink,
            cancel,
        }
    }

    pub(crate) async fn request_approval(&self, request: ApprovalRequest) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let kind = request.kind;
        let handler = self.thread_handler.clone().or_else(|| self.hub.handler());
        let approved = match handler {
            Some(handler) => {
                tokio::select! {
                    approved = self.hub.call_handler(handler.as_ref(), request) => approved,
                    _ = self.cancel.cancelled() => false,
                }
            }
            None if self.mode.waits_for_caller() => {
                self.hub
                    .wait_for_caller(request, &self.sink, &self.cancel)
                    .await
            }
            None => matches!(self.mode, ApprovalMode::OnFailure),
        };

        if approved {
            tracing::debug!(kind = kind.as_str(), "approval granted");
        } else {
            tracing::warn!(kind = kind.as_str(), mode = self.mode.as_str(), "approval denied");
        }
        approved
    }
}
