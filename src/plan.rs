//! Per-thread plan storage.
//!
//! Readers get an `Arc` snapshot. Writers compute the next list from a
//! snapshot without holding the lock and install it only if nobody else
//! committed in between, so a batch is either fully visible or not at all.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use thread_protocol::{PlanOperation, PlanStep};

use crate::error::CodexError;
use crate::lock_unpoisoned;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub explanation: Option<String>,
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Default)]
struct PlanSlot {
    plan: Arc<Plan>,
    version: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PlanStore {
    slot: Mutex<PlanSlot>,
}

impl PlanStore {
    pub(crate) fn with_plan(plan: Plan) -> Self {
        Self {
            slot: Mutex::new(PlanSlot {
                plan: Arc::new(plan),
                version: 0,
            }),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<Plan> {
        Arc::clone(&lock_unpoisoned(&self.slot).plan)
    }

    /// Monotonic change counter.
    pub(crate) fn version(&self) -> u64 {
        lock_unpoisoned(&self.slot).version
    }

    pub(crate) fn replace(&self, plan: Plan) -> Arc<Plan> {
        let plan = Arc::new(plan);
        let mut slot = lock_unpoisoned(&self.slot);
        slot.plan = Arc::clone(&plan);
        slot.version += 1;
        plan
    }

    pub(crate) fn modify(&self, operations: &[PlanOperation]) -> Result<Arc<Plan>, CodexError> {
        loop {
            let (base, base_version) = {
                let slot = lock_unpoisoned(&self.slot);
                (Arc::clone(&slot.plan), slot.version)
            };

            let next = Arc::new(Plan {
                explanation: base.explanation.clone(),
                steps: apply_operations(&base.steps, operations)?,
            });

            let mut slot = lock_unpoisoned(&self.slot);
            if slot.version == base_version {
                slot.plan = Arc::clone(&next);
                slot.version += 1;
                return Ok(next);
            }
            tracing::debug!("plan changed during modify batch; recomputing");
        }
    }
}

/// Applies one batch against `steps` without mutating it.
///
/// Indices address `steps` as given. Updates apply first, then the reorder,
/// then removals; adds land at the end.
pub fn apply_operations(
    steps: &[PlanStep],
    operations: &[PlanOperation],
) -> Result<Vec<PlanStep>, CodexError> {
    let len = steps.len();
    let mut removed = HashSet::new();
    let mut reorder: Option<&[usize]> = None;

    for operation in operations {
        match operation {
            PlanOperation::Remove { index } => {
                check_index("remove", *index, len)?;
                if !removed.insert(*index) {
                    return Err(invalid(format!("plan step {index} is removed twice")));
                }
            }
            PlanOperation::Reorder { new_order } => {
                if reorder.is_some() {
                    return Err(invalid("a plan batch may contain at most one reorder"));
                }
                check_permutation(new_order, len)?;
                reorder = Some(new_order);
            }
            PlanOperation::Update { index, .. } => check_index("update", *index, len)?,
            PlanOperation::Add { item } => {
                if item.step.trim().is_empty() {
                    return Err(invalid("plan step text must not be empty"));
                }
            }
        }
    }

    for operation in operations {
        if let PlanOperation::Update { index, .. } = operation {
            if removed.contains(index) {
                return Err(invalid(format!(
                    "plan step {index} is both updated and removed"
                )));
            }
        }
    }

    let mut working: Vec<(usize, PlanStep)> = steps.iter().cloned().enumerate().collect();

    for operation in operations {
        if let PlanOperation::Update { index, updates } = operation {
            let step = &mut working[*index].1;
            if let Some(text) = updates.step.as_deref() {
                if !text.trim().is_empty() {
                    step.step = text.to_string();
                }
            }
            if let Some(status) = updates.status {
                step.status = status;
            }
        }
    }

    if let Some(new_order) = reorder {
        working = new_order.iter().map(|&index| working[index].clone()).collect();
    }

    let mut next: Vec<PlanStep> = working
        .into_iter()
        .filter(|(original, _)| !removed.contains(original))
        .map(|(_, step)| step)
        .collect();

    for operation in operations {
        if let PlanOperation::Add { item } = operation {
            next.push(item.clone());
        }
    }

    Ok(next)
}

fn check_index(operation: &str, index: usize, len: usize) -> Result<(), CodexError> {
    if index < len {
        Ok(())
    } else {
        Err(invalid(format!(
            "{operation} index {index} is out of range for a plan of {len} steps"
        )))
    }
}

fn check_permutation(new_order: &[usize], len: usize) -> Result<(), CodexError> {
    if new_order.len() != len {
        return Err(invalid(format!(
            "reorder must list all {len} plan steps, got {}",
            new_order.len()
        )));
    }

    let mut seen = vec![false; len];
    for &index in new_order {
        if index >= len || std::mem::replace(&mut seen[index], true) {
            return Err(invalid(format!(
                "reorder is not a permutation of 0..{len}: {new_order:?}"
            )));
        }
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> CodexError {
    CodexError::InvalidArgument(message.into())
}
