use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    duration,
    tasks::{DayTask, Priority},
    TokiError,
};

/// One-shot planning request handed to a schedule agent.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    /// Instructions and numbered rules.
    pub system: String,
    /// Task list and time window, rendered for the model.
    pub prompt: String,
    /// JSON schema the reply must follow.
    pub response_schema: serde_json::Value,
    /// Structured copy of what the prompt describes.
    pub context: PlanContext,
}

/// Structured inputs behind a [`PlanRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanContext {
    /// Incomplete tasks, in list order.
    pub pending: Vec<DayTask>,
    /// Minutes between now and end of day.
    pub available_minutes: u32,
    pub now: String,
    pub end_of_day: String,
}

/// Structured reply from a schedule agent, before reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanReply {
    #[serde(default)]
    pub tasks: Vec<PlannedTask>,
    #[serde(default)]
    pub free_time: Option<String>,
    #[serde(default)]
    pub advice: Option<String>,
}

/// One task as the model returned it. Only `id`, `ai_duration`,
/// `is_current` and `note` are trusted; everything else is restored locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTask {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ai_duration: String,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub note: Option<String>,
}

/// Contract for any planner backend (Gemini, OpenAI, offline).
#[async_trait]
pub trait ScheduleAgent: Send + Sync {
    /// Short name used for logging and UI.
    fn name(&self) -> &'static str;

    /// Ask for a re-partitioned schedule.
    async fn plan(&self, request: PlanRequest) -> Result<PlanReply, TokiError>;
}

/// Offline agent: orders by priority and keeps every estimate.
/// Useful for tests and smoke runs without an API key.
pub struct PassthroughAgent;

#[async_trait]
impl ScheduleAgent for PassthroughAgent {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn plan(&self, request: PlanRequest) -> Result<PlanReply, TokiError> {
        let mut pending = request.context.pending;
        pending.sort_by_key(|t| t.task.priority.rank());

        let mut used: u32 = 0;
        let tasks = pending
            .iter()
            .enumerate()
            .map(|(idx, t)| {
                let minutes = kept_minutes(t);
                used = used.saturating_add(minutes);
                PlannedTask {
                    id: t.task.id.to_string(),
                    name: Some(t.task.name.clone()),
                    ai_duration: duration::format_minutes(minutes),
                    is_current: idx == 0,
                    note: None,
                }
            })
            .collect();

        let free = request.context.available_minutes.saturating_sub(used);
        tracing::debug!(used, free, "offline plan");
        let low_count = pending
            .iter()
            .filter(|t| t.task.priority == Priority::Low)
            .count();
        Ok(PlanReply {
            tasks,
            free_time: (free > 0).then(|| duration::format_minutes(free)),
            advice: Some(format!(
                "Ordered by priority without an AI planner ({low_count} low-priority tasks last)."
            )),
        })
    }
}

/// The duration the reconciler will store for an unchanged estimate:
/// slot-rounded, never above the estimate itself.
fn kept_minutes(task: &DayTask) -> u32 {
    let Some(base) = task.task.base_minutes() else {
        return 0;
    };
    if task.task.flexible_time {
        duration::round_to_slot(base).min(base)
    } else {
        base
    }
}
