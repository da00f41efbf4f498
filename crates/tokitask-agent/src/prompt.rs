use chrono::NaiveTime;
use serde::Serialize;
use serde_json::json;
use tokitask_core::{
    agent::{PlanContext, PlanRequest},
    clock, duration,
    tasks::{DayTask, Priority},
    TokiError,
};

const SYSTEM_PROMPT: &str = "You are TokiTask's day planner. You redistribute the time left \
in the user's day across their pending tasks. Answer only with JSON that matches the \
response schema. Follow these rules strictly:
1. Schedule High priority tasks before Medium, and Medium before Low. Keep the user's order \
between tasks of equal priority.
2. aiDuration must never exceed the task's baseDuration. Shorten flexible tasks \
proportionally to their estimate when the available time is not enough.
3. Tasks with flexibleTime=false keep their full baseDuration.
4. If the assigned durations add up to less than the available time, report the \
difference in freeTime (for example \"35min\"); otherwise set freeTime to \"0min\".
5. Only when time is critically short, a Low priority task may be marked unrealizable: set \
its aiDuration to \"0min\" and explain why in note. Every other task gets more than zero \
minutes.
6. Every aiDuration is a multiple of 5 minutes, written like \"45min\", \"1h\" or \"1h 15min\".
7. Keep durations realistic: never assign less than 5 minutes to a task you keep.
8. Mark exactly one task with isCurrent=true: the first task of your list.
9. Return every task you were given, with its id unchanged. Do not invent tasks.
10. advice is one or two short sentences of encouragement or practical tips for the rest \
of the day.";

/// Task as presented to the model.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptTask<'a> {
    id: String,
    name: &'a str,
    base_duration: String,
    priority: Priority,
    flexible_time: bool,
    is_habit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<&'a str>,
}

impl<'a> From<&'a DayTask> for PromptTask<'a> {
    fn from(day: &'a DayTask) -> Self {
        let task = &day.task;
        Self {
            id: task.id.to_string(),
            name: &task.name,
            base_duration: duration::normalize(&task.base_duration)
                .unwrap_or_else(|_| task.base_duration.clone()),
            priority: task.priority,
            flexible_time: task.flexible_time,
            is_habit: task.is_habit,
            start_time: task.start_time.as_deref(),
            end_time: task.end_time.as_deref(),
        }
    }
}

/// Build the planning request for the incomplete tasks in `tasks`.
///
/// Completed tasks are filtered out here so they never reach the model.
pub fn build_plan_request(
    tasks: &[DayTask],
    end_of_day: NaiveTime,
    now: NaiveTime,
) -> Result<PlanRequest, TokiError> {
    let pending: Vec<DayTask> = tasks.iter().filter(|t| !t.completed).cloned().collect();
    if pending.is_empty() {
        return Err(TokiError::Validation("no pending tasks to plan".into()));
    }

    let available = clock::minutes_until(now, end_of_day);
    let end_label = clock::format_clock(end_of_day);
    let now_label = clock::format_clock(now);
    if available == 0 {
        return Err(TokiError::Validation(format!(
            "the day is already over (end of day is {end_label})"
        )));
    }

    let listed: Vec<PromptTask<'_>> = pending.iter().map(PromptTask::from).collect();
    let tasks_json = serde_json::to_string_pretty(&listed)
        .map_err(|e| TokiError::Validation(format!("cannot encode tasks: {e}")))?;
    let prompt = format!(
        "Current time: {now_label}\nEnd of day: {end_label}\nAvailable time: {} ({available} minutes)\n\
         Pending tasks in their current order:\n{tasks_json}",
        duration::format_minutes(available),
    );

    Ok(PlanRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt,
        response_schema: response_schema(),
        context: PlanContext {
            pending,
            available_minutes: available,
            now: now_label,
            end_of_day: end_label,
        },
    })
}

/// JSON schema of the reply, in the OpenAPI subset both providers accept.
pub fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "tasks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "name": { "type": "string" },
                        "aiDuration": { "type": "string" },
                        "isCurrent": { "type": "boolean" },
                        "note": { "type": "string" }
                    },
                    "required": ["id", "aiDuration", "isCurrent"]
                }
            },
            "freeTime": { "type": "string" },
            "advice": { "type": "string" }
        },
        "required": ["tasks", "freeTime", "advice"]
    })
}
