//! Tool resolution and result normalization.
//!
//! Resolution order for a call: caller-registered tool with the exact name,
//! then the built-in tool (through its interceptor, if one is registered),
//! then an "unsupported tool" error result. Nothing a handler or interceptor
//! does, panics included, escapes as anything but a [`ToolResult`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use agent_provider::ToolDefinition;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thread_protocol::ApprovalRequest;

use crate::approval::{approval_kind_for_tool, ApprovalGate};
use crate::lock_unpoisoned;
use crate::tools::{BuiltinTool, BuiltinTools};

/// One model-issued call handed to a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub call_id: String,
    pub arguments: Value,
}

/// Normalized outcome of a tool call: `output` on success, `error` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: None,
            success: false,
            error: Some(message.into()),
        }
    }

    /// Text the model sees for this result.
    #[must_use]
    pub fn model_text(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            self.error
                .clone()
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "Tool failed".to_string())
        }
    }

    fn normalized(mut self) -> Self {
        if !self.success && self.error.is_none() {
            self.error = Some(self.output.take().unwrap_or_else(|| "Tool failed".to_string()));
        }
        self
    }
}

/// Caller-provided implementation of a tool.
#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn call(&self, invocation: ToolInvocation) -> ToolResult;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    async fn call(&self, invocation: ToolInvocation) -> ToolResult {
        (self)(invocation).await
    }
}

/// Wraps a built-in tool. The interceptor sees every call to that built-in
/// and decides whether, and with which arguments, to run it through `next`.
#[async_trait]
pub trait ToolInterceptor: Send + Sync + 'static {
    async fn intercept(&self, invocation: ToolInvocation, next: BuiltinCall) -> ToolResult;
}

#[async_trait]
impl<F, Fut> ToolInterceptor for F
where
    F: Fn(ToolInvocation, BuiltinCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    async fn intercept(&self, invocation: ToolInvocation, next: BuiltinCall) -> ToolResult {
        (self)(invocation, next).await
    }
}

/// One-shot handle on the built-in an interceptor wraps.
pub struct BuiltinCall {
    tool: BuiltinTool,
    builtins: Arc<BuiltinTools>,
    exit_code: Arc<Mutex<Option<i32>>>,
}

impl fmt::Debug for BuiltinCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinCall")
            .field("tool", &self.tool.name())
            .finish_non_exhaustive()
    }
}

impl BuiltinCall {
    #[must_use]
    pub fn tool_name(&self) -> &'static str {
        self.tool.name()
    }

    /// Runs the built-in. The invocation may carry rewritten arguments but
    /// must name the same tool.
    pub async fn call(self, invocation: ToolInvocation) -> ToolResult {
        if invocation.tool_name != self.tool.name() {
            return ToolResult::error(format!(
                "Built-in call for `{}` cannot run `{}`",
                self.tool.name(),
                invocation.tool_name
            ));
        }
        let outcome = self.builtins.execute(self.tool, &invocation.arguments).await;
        *lock_unpoisoned(&self.exit_code) = outcome.exit_code;
        outcome.result
    }
}

/// A tool registered on a [`crate::Codex`] instance.
#[derive(Clone)]
pub struct ToolRegistration {
    pub name: String,
    pub description: Option<String>,
    /// JSON schema of the arguments object.
    pub parameters: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl ToolRegistration {
    pub fn new(name: impl Into<String>, handler: impl ToolHandler) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: json!({"type": "object", "properties": {}}),
            handler: Arc::new(handler),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub(crate) fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.parameters.clone(),
        }
    }
}

type ToolTable = HashMap<String, Arc<ToolRegistration>>;
type InterceptorTable = HashMap<BuiltinTool, Arc<dyn ToolInterceptor>>;

/// Copy-on-write tables of registered tools and interceptors. Every dispatch
/// resolves against one snapshot; writers swap the whole table under the lock.
#[derive(Clone, Default)]
pub(crate) struct ToolRegistry {
    table: Arc<Mutex<Arc<ToolTable>>>,
    interceptors: Arc<Mutex<Arc<InterceptorTable>>>,
}

impl ToolRegistry {
    pub(crate) fn register(&self, registration: ToolRegistration) {
        let mut table = lock_unpoisoned(&self.table);
        let mut next = ToolTable::clone(&table);
        tracing::debug!(tool = %registration.name, "registering tool");
        next.insert(registration.name.clone(), Arc::new(registration));
        *table = Arc::new(next);
    }

    pub(crate) fn clear(&self) {
        *lock_unpoisoned(&self.table) = Arc::new(ToolTable::new());
    }

    pub(crate) fn snapshot(&self) -> Arc<ToolTable> {
        Arc::clone(&lock_unpoisoned(&self.table))
    }

    pub(crate) fn intercept(&self, tool: BuiltinTool, interceptor: Arc<dyn ToolInterceptor>) {
        let mut interceptors = lock_unpoisoned(&self.interceptors);
        let mut next = InterceptorTable::clone(&interceptors);
        tracing::debug!(tool = tool.name(), "registering tool interceptor");
        next.insert(tool, interceptor);
        *interceptors = Arc::new(next);
    }

    pub(crate) fn clear_interceptors(&self) {
        *lock_unpoisoned(&self.interceptors) = Arc::new(InterceptorTable::new());
    }

    fn interceptor_for(&self, tool: BuiltinTool) -> Option<Arc<dyn ToolInterceptor>> {
        lock_unpoisoned(&self.interceptors).get(&tool).cloned()
    }
}

/// What a dispatch produced, plus details used to render the history item.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ToolOutcome {
    pub(crate) result: ToolResult,
    pub(crate) exit_code: Option<i32>,
    pub(crate) declined: bool,
}

impl From<ToolResult> for ToolOutcome {
    fn from(result: ToolResult) -> Self {
        Self {
            result,
            exit_code: None,
            declined: false,
        }
    }
}

pub(crate) struct ToolDispatcher {
    registry: ToolRegistry,
    builtins: Arc<BuiltinTools>,
    gate: ApprovalGate,
}

impl ToolDispatcher {
    pub(crate) fn new(registry: ToolRegistry, builtins: BuiltinTools, gate: ApprovalGate) -> Self {
        Self {
            registry,
            builtins: Arc::new(builtins),
            gate,
        }
    }

    /// Built-in definitions, each replaced by a registered tool of the same
    /// name, followed by the remaining registered tools sorted by name.
    pub(crate) fn definitions(&self) -> Vec<ToolDefinition> {
        let table = self.registry.snapshot();
        let mut definitions: Vec<ToolDefinition> = BuiltinTool::ALL
            .iter()
            .map(|tool| match table.get(tool.name()) {
                Some(registration) => registration.definition(),
                None => tool.definition(),
            })
            .collect();

        let mut extra: Vec<&Arc<ToolRegistration>> = table
            .values()
            .filter(|registration| BuiltinTool::from_name(&registration.name).is_none())
            .collect();
        extra.sort_by(|left, right| left.name.cmp(&right.name));
        definitions.extend(extra.into_iter().map(|registration| registration.definition()));
        definitions
    }

    /// The built-in that would handle `tool_name` right now, if any.
    pub(crate) fn builtin_for(&self, tool_name: &str) -> Option<BuiltinTool> {
        if self.registry.snapshot().contains_key(tool_name) {
            return None;
        }
        BuiltinTool::from_name(tool_name)
    }

    pub(crate) fn working_directory(&self) -> &std::path::Path {
        self.builtins.working_directory()
    }

    pub(crate) async fn dispatch(&self, invocation: ToolInvocation) -> ToolOutcome {
        if let Some(kind) = approval_kind_for_tool(&invocation.tool_name) {
            let request = ApprovalRequest {
                kind,
                details: json!({
                    "tool": invocation.tool_name,
                    "call_id": invocation.call_id,
                    "arguments": invocation.arguments,
                }),
                context: Some(self.builtins.working_directory().display().to_string()),
            };
            if !self.gate.request_approval(request).await {
                return ToolOutcome {
                    result: ToolResult::error(format!(
                        "Approval denied for tool `{}`",
                        invocation.tool_name
                    )),
                    exit_code: None,
                    declined: true,
                };
            }
        }

        let registered = self.registry.snapshot().get(&invocation.tool_name).cloned();
        if let Some(registration) = registered {
            return call_registered(&registration, invocation).await.into();
        }

        let Some(tool) = BuiltinTool::from_name(&invocation.tool_name) else {
            return ToolResult::error(format!("Unsupported tool `{}`", invocation.tool_name)).into();
        };
        match self.registry.interceptor_for(tool) {
            Some(interceptor) => self.call_intercepted(tool, interceptor.as_ref(), invocation).await,
            None => self.builtins.execute(tool, &invocation.arguments).await,
        }
    }

    async fn call_intercepted(
        &self,
        tool: BuiltinTool,
        interceptor: &dyn ToolInterceptor,
        invocation: ToolInvocation,
    ) -> ToolOutcome {
        let exit_code = Arc::new(Mutex::new(None));
        let next = BuiltinCall {
            tool,
            builtins: Arc::clone(&self.builtins),
            exit_code: Arc::clone(&exit_code),
        };
        let result = match AssertUnwindSafe(interceptor.intercept(invocation, next))
            .catch_unwind()
            .await
        {
            Ok(result) => result.normalized(),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(tool = tool.name(), %message, "tool interceptor panicked");
                ToolResult::error(format!("Interceptor for `{}` failed: {message}", tool.name()))
            }
        };
        let exit_code = *lock_unpoisoned(&exit_code);
        ToolOutcome {
            result,
            exit_code,
            declined: false,
        }
    }
}

async fn call_registered(registration: &ToolRegistration, invocation: ToolInvocation) -> ToolResult {
    let name = invocation.tool_name.clone();
    match AssertUnwindSafe(registration.handler.call(invocation))
        .catch_unwind()
        .await
    {
        Ok(result) => result.normalized(),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!(tool = %name, %message, "tool handler panicked");
            ToolResult::error(format!("Tool `{name}` failed: {message}"))
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
