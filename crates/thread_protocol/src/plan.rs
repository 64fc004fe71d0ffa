use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// One entry of a thread plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: String,
    #[serde(default)]
    pub status: StepStatus,
}

impl PlanStep {
    #[must_use]
    pub fn new(step: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step: step.into(),
            status,
        }
    }
}

/// Partial update applied by [`PlanOperation::Update`]. An empty `step` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStepUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
}

/// One operation of a `modify_plan` batch. Indices address the plan as it was
/// when the batch started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanOperation {
    Add { item: PlanStep },
    Update { index: usize, updates: PlanStepUpdate },
    Remove { index: usize },
    Reorder { new_order: Vec<usize> },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{PlanOperation, PlanStep, PlanStepUpdate, StepStatus};

    #[test]
    fn operations_parse_from_wire_shapes() {
        let ops: Vec<PlanOperation> = serde_json::from_value(json!([
            {"type": "add", "item": {"step": "ship"}},
            {"type": "update", "index": 1, "updates": {"status": "in_progress"}},
            {"type": "remove", "index": 0},
            {"type": "reorder", "new_order": [1, 0]},
        ]))
        .expect("plan operations should parse");

        assert_eq!(
            ops,
            vec![
                PlanOperation::Add {
                    item: PlanStep::new("ship", StepStatus::Pending),
                },
                PlanOperation::Update {
                    index: 1,
                    updates: PlanStepUpdate {
                        step: None,
                        status: Some(StepStatus::InProgress),
                    },
                },
                PlanOperation::Remove { index: 0 },
                PlanOperation::Reorder {
                    new_order: vec![1, 0],
                },
            ]
        );
    }

    #[test]
    fn unknown_status_is_rejected() {
        let error = serde_json::from_value::<PlanStep>(json!({"step": "x", "status": "blocked"}))
            .expect_err("unknown status must not parse");

        assert!(error.to_string().contains("blocked"));
    }
}
