use std::{collections::BTreeMap, fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{clock, duration, TokiError};

/// End of day used for fresh accounts.
pub const DEFAULT_END_OF_DAY: &str = "22:00";

/// Task priority; `High` is scheduled first.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Sort key: lower runs earlier.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        };
        f.write_str(label)
    }
}

impl FromStr for Priority {
    type Err = TokiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(TokiError::Validation(format!(
                "unknown priority \"{other}\" (use low, medium or high)"
            ))),
        }
    }
}

/// Fields shared by day tasks and templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    /// User estimate, free text ("45 min", "1h30").
    pub base_duration: String,
    #[serde(default)]
    pub priority: Priority,
    /// Logical identity that survives clone-day cycles.
    pub progress_id: Uuid,
    /// Whether the planner may shorten this task.
    #[serde(default)]
    pub flexible_time: bool,
    #[serde(default)]
    pub is_habit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
}

impl Task {
    pub fn new(name: impl Into<String>, base_duration: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            base_duration: base_duration.into(),
            priority,
            progress_id: Uuid::new_v4(),
            flexible_time: true,
            is_habit: false,
            start_time: None,
            end_time: None,
            scheduled_date: None,
        }
    }

    /// Estimate in minutes, when the free text parses.
    pub fn base_minutes(&self) -> Option<u32> {
        duration::parse_minutes(&self.base_duration).ok()
    }

    fn validate(&self) -> Result<(), TokiError> {
        if self.name.trim().is_empty() {
            return Err(TokiError::Validation("task name cannot be empty".into()));
        }
        duration::parse_minutes(&self.base_duration)?;
        for time in [&self.start_time, &self.end_time].into_iter().flatten() {
            clock::parse_clock(time)?;
        }
        Ok(())
    }
}

/// A task on today's list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayTask {
    #[serde(flatten)]
    pub task: Task,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub is_current: bool,
    /// Planner-assigned duration; equals the estimate until a sync runs.
    #[serde(default)]
    pub ai_duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_note: Option<String>,
}

impl DayTask {
    pub fn new(task: Task) -> Self {
        let ai_duration = task.base_duration.clone();
        Self {
            task,
            completed: false,
            is_current: false,
            ai_duration,
            ai_note: None,
        }
    }

    /// Instantiate a template for one day: fresh id, same progress id.
    pub fn from_template(template: &GeneralTask) -> Self {
        let mut task = template.task.clone();
        task.id = Uuid::new_v4();
        Self::new(task)
    }
}

/// Template task (every day, per weekday, or per calendar date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeneralTask {
    #[serde(flatten)]
    pub task: Task,
    #[serde(default)]
    pub completed: bool,
}

impl GeneralTask {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            completed: false,
        }
    }
}

/// Weekday key for weekly templates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = TokiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Weekday>()
            .map(DayOfWeek::from)
            .map_err(|_| TokiError::Validation(format!("unknown weekday \"{}\"", s.trim())))
    }
}

/// Where a template applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateScope {
    Daily,
    Weekly(DayOfWeek),
    Calendar(NaiveDate),
}

/// Partial update for an existing day task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub base_duration: Option<String>,
    pub priority: Option<Priority>,
    pub flexible_time: Option<bool>,
    pub is_habit: Option<bool>,
}

/// Completion summary for one habit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitStats {
    pub progress_id: Uuid,
    pub name: Option<String>,
    pub total_completions: usize,
    pub current_streak: u32,
    pub last_completed: Option<NaiveDate>,
}

/// Aggregate root: everything stored for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub end_of_day: String,
    #[serde(default)]
    pub day_tasks: Vec<DayTask>,
    #[serde(default)]
    pub general_tasks: Vec<GeneralTask>,
    #[serde(default)]
    pub weekly_tasks: BTreeMap<DayOfWeek, Vec<GeneralTask>>,
    #[serde(default)]
    pub calendar_tasks: Vec<GeneralTask>,
    /// Append-only: progress id -> days the task was completed.
    #[serde(default)]
    pub task_completions_by_progress_id: BTreeMap<Uuid, Vec<NaiveDate>>,
}

impl Default for UserData {
    fn default() -> Self {
        Self {
            end_of_day: DEFAULT_END_OF_DAY.to_string(),
            day_tasks: Vec::new(),
            general_tasks: Vec::new(),
            weekly_tasks: BTreeMap::new(),
            calendar_tasks: Vec::new(),
            task_completions_by_progress_id: BTreeMap::new(),
        }
    }
}

impl UserData {
    pub fn end_of_day_time(&self) -> Result<NaiveTime, TokiError> {
        clock::parse_clock(&self.end_of_day)
    }

    pub fn set_end_of_day(&mut self, value: &str) -> Result<(), TokiError> {
        let time = clock::parse_clock(value)?;
        self.end_of_day = clock::format_clock(time);
        Ok(())
    }

    /// Incomplete day tasks in list order.
    pub fn pending_day_tasks(&self) -> Vec<DayTask> {
        self.day_tasks
            .iter()
            .filter(|t| !t.completed)
            .cloned()
            .collect()
    }

    pub fn current_task(&self) -> Option<&DayTask> {
        self.day_tasks.iter().find(|t| t.is_current)
    }

    pub fn add_day_task(&mut self, task: Task) -> Result<&DayTask, TokiError> {
        task.validate()?;
        let idx = self.day_tasks.len();
        self.day_tasks.push(DayTask::new(task));
        ensure_single_current(&mut self.day_tasks);
        Ok(&self.day_tasks[idx])
    }

    pub fn update_day_task(&mut self, id: Uuid, patch: TaskPatch) -> Result<&DayTask, TokiError> {
        let idx = self.day_index(id)?;
        let mut task = self.day_tasks[idx].task.clone();
        if let Some(name) = patch.name {
            task.name = name;
        }
        let duration_changed = patch.base_duration.is_some();
        if let Some(base) = patch.base_duration {
            task.base_duration = base;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(flexible) = patch.flexible_time {
            task.flexible_time = flexible;
        }
        if let Some(habit) = patch.is_habit {
            task.is_habit = habit;
        }
        task.validate()?;

        let day = &mut self.day_tasks[idx];
        if duration_changed {
            day.ai_duration = task.base_duration.clone();
            day.ai_note = None;
        }
        day.task = task;
        Ok(&self.day_tasks[idx])
    }

    pub fn remove_day_task(&mut self, id: Uuid) -> Result<DayTask, TokiError> {
        let idx = self.day_index(id)?;
        let removed = self.day_tasks.remove(idx);
        ensure_single_current(&mut self.day_tasks);
        Ok(removed)
    }

    /// Move the task at position `from` to position `to` (zero based).
    pub fn move_day_task(&mut self, from: usize, to: usize) -> Result<(), TokiError> {
        let len = self.day_tasks.len();
        if from >= len || to >= len {
            return Err(TokiError::Validation(format!(
                "position out of range (list has {len} tasks)"
            )));
        }
        let task = self.day_tasks.remove(from);
        self.day_tasks.insert(to, task);
        ensure_single_current(&mut self.day_tasks);
        Ok(())
    }

    /// Mark a day task done or not done. Completing records `date` in the
    /// progress history; un-completing leaves the history untouched.
    pub fn set_completed(
        &mut self,
        id: Uuid,
        completed: bool,
        date: NaiveDate,
    ) -> Result<&DayTask, TokiError> {
        let idx = self.day_index(id)?;
        self.day_tasks[idx].completed = completed;
        if completed {
            let progress_id = self.day_tasks[idx].task.progress_id;
            self.record_completion(progress_id, date);
        }
        ensure_single_current(&mut self.day_tasks);
        Ok(&self.day_tasks[idx])
    }

    fn record_completion(&mut self, progress_id: Uuid, date: NaiveDate) {
        let history = self
            .task_completions_by_progress_id
            .entry(progress_id)
            .or_default();
        if !history.contains(&date) {
            history.push(date);
        }
    }

    /// Rebuild today's list from the templates that apply to `date`.
    pub fn clone_day(&mut self, date: NaiveDate) -> &[DayTask] {
        let weekday = DayOfWeek::from(date.weekday());
        let weekly = self.weekly_tasks.get(&weekday).into_iter().flatten();
        let dated = self
            .calendar_tasks
            .iter()
            .filter(|t| t.task.scheduled_date == Some(date));

        let mut tasks: Vec<DayTask> = self
            .general_tasks
            .iter()
            .chain(weekly)
            .chain(dated)
            .map(|template| {
                let mut day = DayTask::from_template(template);
                day.completed = self
                    .task_completions_by_progress_id
                    .get(&day.task.progress_id)
                    .is_some_and(|dates| dates.contains(&date));
                day
            })
            .collect();
        ensure_single_current(&mut tasks);
        self.day_tasks = tasks;
        &self.day_tasks
    }

    /// Calendar templates scheduled for `date`.
    pub fn calendar_due(&self, date: NaiveDate) -> Vec<&GeneralTask> {
        self.calendar_tasks
            .iter()
            .filter(|t| t.task.scheduled_date == Some(date))
            .collect()
    }

    pub fn add_template(&mut self, scope: TemplateScope, mut task: Task) -> Result<&GeneralTask, TokiError> {
        task.validate()?;
        let list = match scope {
            TemplateScope::Daily => &mut self.general_tasks,
            TemplateScope::Weekly(day) => self.weekly_tasks.entry(day).or_default(),
            TemplateScope::Calendar(date) => {
                task.scheduled_date = Some(date);
                &mut self.calendar_tasks
            }
        };
        let idx = list.len();
        list.push(GeneralTask::new(task));
        Ok(&list[idx])
    }

    /// Remove a template from whichever scope holds it.
    pub fn remove_template(&mut self, id: Uuid) -> Result<GeneralTask, TokiError> {
        let lists = std::iter::once(&mut self.general_tasks)
            .chain(self.weekly_tasks.values_mut())
            .chain(std::iter::once(&mut self.calendar_tasks));
        for list in lists {
            if let Some(idx) = list.iter().position(|t| t.task.id == id) {
                return Ok(list.remove(idx));
            }
        }
        Err(TokiError::NotFound(format!("template {id}")))
    }

    /// Totals and streaks for every task with completion history.
    pub fn habit_stats(&self, today: NaiveDate) -> Vec<HabitStats> {
        self.task_completions_by_progress_id
            .iter()
            .map(|(progress_id, dates)| HabitStats {
                progress_id: *progress_id,
                name: self.name_for_progress(*progress_id).map(str::to_string),
                total_completions: dates.len(),
                current_streak: streak(dates, today),
                last_completed: dates.iter().max().copied(),
            })
            .collect()
    }

    fn name_for_progress(&self, progress_id: Uuid) -> Option<&str> {
        let templates = self
            .general_tasks
            .iter()
            .chain(self.weekly_tasks.values().flatten())
            .chain(self.calendar_tasks.iter())
            .map(|t| &t.task);
        self.day_tasks
            .iter()
            .map(|t| &t.task)
            .chain(templates)
            .find(|t| t.progress_id == progress_id)
            .map(|t| t.name.as_str())
    }

    fn day_index(&self, id: Uuid) -> Result<usize, TokiError> {
        self.day_tasks
            .iter()
            .position(|t| t.task.id == id)
            .ok_or_else(|| TokiError::NotFound(format!("task {id}")))
    }
}

/// Make the earliest pending task the only current one.
pub fn ensure_single_current(tasks: &mut [DayTask]) {
    let mut assigned = false;
    for task in tasks.iter_mut() {
        task.is_current = !assigned && !task.completed;
        assigned |= task.is_current;
    }
}

/// Consecutive days ending today (or yesterday, if today is not done yet).
fn streak(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut day = if dates.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut count = 0;
    while dates.contains(&day) {
        count += 1;
        day -= Duration::days(1);
    }
    count
}

/// Persistence contract for one user's aggregate document.
#[async_trait]
pub trait UserDataRepository: Send + Sync {
    /// Load the document, or defaults when the user has none yet.
    async fn load(&self) -> Result<UserData, TokiError>;

    /// Replace the stored document.
    async fn save(&self, data: &UserData) -> Result<(), TokiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn data_with(names: &[&str]) -> UserData {
        let mut data = UserData::default();
        for name in names {
            data.add_day_task(Task::new(*name, "30 min", Priority::Medium))
                .expect("add");
        }
        data
    }

    fn current_names(data: &UserData) -> Vec<&str> {
        data.day_tasks
            .iter()
            .filter(|t| t.is_current)
            .map(|t| t.task.name.as_str())
            .collect()
    }

    #[test]
    fn first_pending_task_is_current_after_each_mutation() {
        let mut data = data_with(&["a", "b", "c"]);
        assert_eq!(current_names(&data), ["a"]);

        let a = data.day_tasks[0].task.id;
        data.set_completed(a, true, date(2026, 10, 19)).expect("complete");
        assert_eq!(current_names(&data), ["b"]);

        data.move_day_task(2, 0).expect("move");
        assert_eq!(current_names(&data), ["c"]);

        let c = data.day_tasks[0].task.id;
        data.remove_day_task(c).expect("remove");
        assert_eq!(current_names(&data), ["b"]);

        data.set_completed(a, false, date(2026, 10, 19)).expect("undo");
        assert_eq!(current_names(&data), ["b"]);
    }

    #[test]
    fn no_current_task_when_everything_is_done() {
        let mut data = data_with(&["only"]);
        let id = data.day_tasks[0].task.id;
        data.set_completed(id, true, date(2026, 10, 19)).unwrap();
        assert!(data.current_task().is_none());
    }

    #[test]
    fn completion_history_is_append_only_and_deduplicated() {
        let mut data = data_with(&["stretch"]);
        let id = data.day_tasks[0].task.id;
        let progress = data.day_tasks[0].task.progress_id;
        let today = date(2026, 10, 19);

        data.set_completed(id, true, today).unwrap();
        data.set_completed(id, false, today).unwrap();
        data.set_completed(id, true, today).unwrap();

        assert_eq!(data.task_completions_by_progress_id[&progress], vec![today]);
    }

    #[test]
    fn clone_day_preserves_progress_ids_and_history() {
        let mut data = UserData::default();
        let monday = date(2026, 10, 19);
        data.add_template(TemplateScope::Daily, Task::new("read", "20min", Priority::Low))
            .unwrap();
        data.add_template(
            TemplateScope::Weekly(DayOfWeek::Monday),
            Task::new("gym", "1h", Priority::High),
        )
        .unwrap();
        data.add_template(
            TemplateScope::Weekly(DayOfWeek::Tuesday),
            Task::new("piano", "45m", Priority::Medium),
        )
        .unwrap();
        data.add_template(
            TemplateScope::Calendar(monday),
            Task::new("dentist", "1h", Priority::High),
        )
        .unwrap();
        let read = data.general_tasks[0].task.clone();
        data.task_completions_by_progress_id
            .insert(read.progress_id, vec![monday]);

        let names: Vec<String> = data
            .clone_day(monday)
            .iter()
            .map(|t| t.task.name.clone())
            .collect();
        assert_eq!(names, ["read", "gym", "dentist"]);

        let cloned_read = &data.day_tasks[0];
        assert_eq!(cloned_read.task.progress_id, read.progress_id);
        assert_ne!(cloned_read.task.id, read.id);
        assert!(cloned_read.completed, "history for today marks it done");
        assert_eq!(current_names(&data), ["gym"]);
        assert_eq!(data.day_tasks[1].ai_duration, "1h");
    }

    #[test]
    fn calendar_due_filters_by_date() {
        let mut data = UserData::default();
        let day = date(2026, 12, 24);
        data.add_template(TemplateScope::Calendar(day), Task::new("gifts", "2h", Priority::High))
            .unwrap();
        data.add_template(
            TemplateScope::Calendar(date(2026, 12, 31)),
            Task::new("party", "3h", Priority::Low),
        )
        .unwrap();

        let due = data.calendar_due(day);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].task.name, "gifts");
    }

    #[test]
    fn remove_template_searches_all_scopes() {
        let mut data = UserData::default();
        let id = data
            .add_template(
                TemplateScope::Weekly(DayOfWeek::Friday),
                Task::new("review", "30m", Priority::Medium),
            )
            .unwrap()
            .task
            .id;
        let removed = data.remove_template(id).expect("remove");
        assert_eq!(removed.task.name, "review");
        assert!(matches!(
            data.remove_template(id),
            Err(TokiError::NotFound(_))
        ));
    }

    #[test]
    fn update_resets_ai_duration_when_estimate_changes() {
        let mut data = data_with(&["write"]);
        let id = data.day_tasks[0].task.id;
        data.day_tasks[0].ai_duration = "15min".into();

        let updated = data
            .update_day_task(
                id,
                TaskPatch {
                    base_duration: Some("1h".into()),
                    priority: Some(Priority::High),
                    ..TaskPatch::default()
                },
            )
            .expect("update");
        assert_eq!(updated.ai_duration, "1h");
        assert_eq!(updated.task.priority, Priority::High);
    }

    #[test]
    fn rejects_invalid_tasks() {
        let mut data = UserData::default();
        assert!(data.add_day_task(Task::new(" ", "1h", Priority::Low)).is_err());
        assert!(data
            .add_day_task(Task::new("x", "whenever", Priority::Low))
            .is_err());
        assert!(data.day_tasks.is_empty());
        assert!(data.move_day_task(0, 1).is_err());
    }

    #[test]
    fn habit_streak_counts_consecutive_days() {
        let mut data = data_with(&["meditate"]);
        let progress = data.day_tasks[0].task.progress_id;
        let today = date(2026, 10, 19);
        data.task_completions_by_progress_id.insert(
            progress,
            vec![date(2026, 10, 15), date(2026, 10, 17), date(2026, 10, 18)],
        );

        let stats = data.habit_stats(today);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name.as_deref(), Some("meditate"));
        assert_eq!(stats[0].total_completions, 3);
        assert_eq!(stats[0].current_streak, 2);
        assert_eq!(stats[0].last_completed, Some(date(2026, 10, 18)));
    }

    #[test]
    fn document_uses_camel_case_fields() {
        let mut data = data_with(&["plan"]);
        data.weekly_tasks.insert(DayOfWeek::Sunday, Vec::new());
        let json = serde_json::to_value(&data).expect("serialize");

        assert_eq!(json["endOfDay"], "22:00");
        let task = &json["dayTasks"][0];
        assert_eq!(task["baseDuration"], "30 min");
        assert_eq!(task["isCurrent"], true);
        assert_eq!(task["priority"], "Medium");
        assert!(json["weeklyTasks"].get("sunday").is_some());

        let back: UserData = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, data);
    }

    #[test]
    fn parses_priorities_and_weekdays() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!("tue".parse::<DayOfWeek>().unwrap(), DayOfWeek::Tuesday);
        assert_eq!("Sunday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Sunday);
    }
}
