//! Wire vocabulary shared by the thread engine and its callers.
//!
//! Every type here is plain serde data. Events are tagged by `type` with dotted
//! names (`turn.started`, `item.completed`, ...); items carry their own `type`
//! tag flattened next to a stable `id`.

mod approval;
mod events;
mod items;
mod plan;

pub use approval::{ApprovalKind, ApprovalRequest};
pub use events::{ThreadError, ThreadEvent, Usage};
pub use items::{
    CommandExecutionStatus, FileChangeKind, FileUpdateChange, McpToolCallStatus,
    PatchApplyStatus, ThreadItem, ThreadItemDetails, ToolCallStatus,
};
pub use plan::{PlanOperation, PlanStep, PlanStepUpdate, StepStatus};
