use std::collections::HashSet;

use tokitask_core::{
    agent::{PlanReply, PlannedTask},
    duration,
    tasks::{ensure_single_current, DayTask, Priority},
    TokiError,
};
use tracing::warn;
use uuid::Uuid;

const UNREALIZABLE_NOTE: &str = "Not realizable today";

/// Day list after merging a plan reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledPlan {
    /// Adjusted pending tasks, then completed tasks in their original order.
    pub tasks: Vec<DayTask>,
    pub free_time: Option<String>,
    pub advice: Option<String>,
}

/// Merge `reply` into the full day list `current`.
///
/// Only order, `ai_duration` and `ai_note` come from the reply; every other
/// field is taken from the local record. Completed tasks are passed through
/// untouched and appended after the pending ones.
pub fn reconcile(current: &[DayTask], reply: PlanReply) -> Result<ReconciledPlan, TokiError> {
    let (completed, pending): (Vec<&DayTask>, Vec<&DayTask>) =
        current.iter().partition(|t| t.completed);

    let mut placed: HashSet<Uuid> = HashSet::new();
    let mut adjusted: Vec<DayTask> = Vec::with_capacity(pending.len());

    for planned in &reply.tasks {
        let Ok(id) = Uuid::parse_str(planned.id.trim()) else {
            warn!(id = %planned.id, "plan reply referenced a malformed id");
            continue;
        };
        let Some(original) = pending.iter().find(|t| t.task.id == id) else {
            warn!(%id, "plan reply referenced an unknown or completed task");
            continue;
        };
        if !placed.insert(id) {
            warn!(%id, "plan reply listed a task twice");
            continue;
        }
        adjusted.push(apply_plan(original, planned));
    }

    if adjusted.is_empty() && !pending.is_empty() {
        return Err(TokiError::Agent(
            "reply did not reference any pending task".into(),
        ));
    }

    // Tasks the model dropped keep their previous plan, after the returned ones.
    adjusted.extend(
        pending
            .iter()
            .filter(|t| !placed.contains(&t.task.id))
            .map(|t| (*t).clone()),
    );
    ensure_single_current(&mut adjusted);
    adjusted.extend(completed.into_iter().cloned());

    Ok(ReconciledPlan {
        tasks: adjusted,
        free_time: non_blank(reply.free_time),
        advice: non_blank(reply.advice),
    })
}

fn apply_plan(original: &DayTask, planned: &PlannedTask) -> DayTask {
    let mut merged = original.clone();
    let base = original.task.base_minutes();
    let note = non_blank(planned.note.clone());

    // Fixed tasks keep their estimate whatever the model answered.
    if !original.task.flexible_time {
        if let Some(base) = base {
            merged.ai_duration = duration::format_minutes(base);
            merged.ai_note = note;
        }
        return merged;
    }

    let minutes = match duration::parse_minutes(&planned.ai_duration) {
        Ok(minutes) => duration::round_to_slot(minutes),
        Err(_) => {
            warn!(id = %original.task.id, value = %planned.ai_duration, "unusable aiDuration");
            return merged;
        }
    };

    if minutes == 0 {
        if original.task.priority != Priority::Low {
            warn!(id = %original.task.id, "zero duration for a task that must be kept");
            return merged;
        }
        merged.ai_duration = duration::format_minutes(0);
        merged.ai_note = Some(note.unwrap_or_else(|| UNREALIZABLE_NOTE.to_string()));
        return merged;
    }

    let minutes = base.map_or(minutes, |base| minutes.min(base));
    merged.ai_duration = duration::format_minutes(minutes);
    merged.ai_note = note;
    merged
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
