use serde::Deserialize;
use thread_protocol::PlanStep;

use crate::dispatch::ToolResult;
use crate::plan::{Plan, PlanStore};

#[derive(Debug, Deserialize)]
pub(crate) struct UpdatePlanArgs {
    #[serde(default)]
    explanation: Option<String>,
    plan: Vec<PlanStep>,
}

pub(crate) fn update(store: &PlanStore, args: UpdatePlanArgs) -> ToolResult {
    if args.plan.iter().any(|step| step.step.trim().is_empty()) {
        return ToolResult::error("plan steps must have non-empty text");
    }

    let count = args.plan.len();
    store.replace(Plan {
        explanation: args.explanation.filter(|text| !text.trim().is_empty()),
        steps: args.plan,
    });
    ToolResult::ok(format!("Plan updated ({count} steps)"))
}
