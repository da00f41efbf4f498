use chrono::{Local, NaiveDate};
use color_eyre::Result;
use tokitask_core::{
    duration,
    tasks::{
        DayOfWeek, DayTask, GeneralTask, Priority, Task, TaskPatch, TemplateScope,
        UserDataRepository,
    },
    TokiError,
};
use tokitask_task::DaySession;
use uuid::Uuid;

use crate::{
    cli::{DayCommand, NewTaskArgs, TaskCommand, TemplateCommand},
    config, storage,
};

/// Execute a task subcommand against the configured user document.
pub async fn handle(cmd: TaskCommand, config: &config::Config) -> Result<()> {
    let session = storage::open_session(config).await?;
    run_task(cmd, &session, today()).await
}

pub async fn handle_template(cmd: TemplateCommand, config: &config::Config) -> Result<()> {
    let session = storage::open_session(config).await?;
    run_template(cmd, &session).await
}

pub async fn handle_day(cmd: DayCommand, config: &config::Config) -> Result<()> {
    let session = storage::open_session(config).await?;
    run_day(cmd, &session, today()).await
}

pub async fn show_habits(config: &config::Config) -> Result<()> {
    let session = storage::open_session(config).await?;
    let data = session.snapshot().await;
    let stats = data.habit_stats(today());
    if stats.is_empty() {
        println!("No completions recorded yet.");
        return Ok(());
    }
    for habit in stats {
        let last = habit
            .last_completed
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<28} total {:>3}  streak {:>3}  last {}",
            habit.name.as_deref().unwrap_or("(deleted task)"),
            habit.total_completions,
            habit.current_streak,
            last
        );
    }
    Ok(())
}

pub async fn show_calendar(date: Option<String>, config: &config::Config) -> Result<()> {
    let date = match date {
        Some(raw) => parse_date(&raw)?,
        None => today(),
    };
    let session = storage::open_session(config).await?;
    let data = session.snapshot().await;
    let due = data.calendar_due(date);
    if due.is_empty() {
        println!("Nothing scheduled for {date}.");
        return Ok(());
    }
    println!("Scheduled for {date}:");
    for template in due {
        println!("  {}", template_line(template));
    }
    Ok(())
}

pub async fn run_task<R: UserDataRepository>(
    cmd: TaskCommand,
    session: &DaySession<R>,
    today: NaiveDate,
) -> Result<()> {
    match cmd {
        TaskCommand::List => {
            let data = session.snapshot().await;
            if data.day_tasks.is_empty() {
                println!("No tasks yet. Add one with `tokitask task add <name>`.");
                return Ok(());
            }
            print_day(&data.day_tasks);
            println!("\nEnd of day: {}", data.end_of_day);
        }
        TaskCommand::Add(args) => {
            let task = task_from_args(args)?;
            let added = session
                .apply(|data| Ok(data.add_day_task(task)?.clone()))
                .await?;
            println!("Added {} ({})", added.task.name, added.task.base_duration);
        }
        TaskCommand::Done { task } => {
            let updated = session
                .apply(|data| {
                    let id = resolve_day_task(&data.day_tasks, &task)?;
                    Ok(data.set_completed(id, true, today)?.clone())
                })
                .await?;
            println!("Marked done: {}", updated.task.name);
        }
        TaskCommand::Undo { task } => {
            let updated = session
                .apply(|data| {
                    let id = resolve_day_task(&data.day_tasks, &task)?;
                    Ok(data.set_completed(id, false, today)?.clone())
                })
                .await?;
            println!("Marked not done: {}", updated.task.name);
        }
        TaskCommand::Edit {
            task,
            name,
            duration,
            priority,
            flexible,
            habit,
        } => {
            let patch = TaskPatch {
                name,
                base_duration: duration.as_deref().map(duration::normalize).transpose()?,
                priority: priority.as_deref().map(str::parse::<Priority>).transpose()?,
                flexible_time: flexible,
                is_habit: habit,
            };
            let updated = session
                .apply(|data| {
                    let id = resolve_day_task(&data.day_tasks, &task)?;
                    Ok(data.update_day_task(id, patch)?.clone())
                })
                .await?;
            println!("Updated {}", updated.task.name);
        }
        TaskCommand::Rm { task } => {
            let removed = session
                .apply(|data| {
                    let id = resolve_day_task(&data.day_tasks, &task)?;
                    data.remove_day_task(id)
                })
                .await?;
            println!("Removed {}", removed.task.name);
        }
        TaskCommand::Mv { from, to } => {
            let (from, to) = (position(from)?, position(to)?);
            session.apply(|data| data.move_day_task(from, to)).await?;
            print_day(&session.snapshot().await.day_tasks);
        }
    }
    Ok(())
}

pub async fn run_template<R: UserDataRepository>(
    cmd: TemplateCommand,
    session: &DaySession<R>,
) -> Result<()> {
    match cmd {
        TemplateCommand::List => {
            let data = session.snapshot().await;
            let mut empty = true;
            if !data.general_tasks.is_empty() {
                empty = false;
                println!("Every day:");
                data.general_tasks
                    .iter()
                    .for_each(|t| println!("  {}", template_line(t)));
            }
            for (day, templates) in data.weekly_tasks.iter().filter(|(_, t)| !t.is_empty()) {
                empty = false;
                println!("{day:?}:");
                templates
                    .iter()
                    .for_each(|t| println!("  {}", template_line(t)));
            }
            if !data.calendar_tasks.is_empty() {
                empty = false;
                println!("Calendar:");
                data.calendar_tasks
                    .iter()
                    .for_each(|t| println!("  {}", template_line(t)));
            }
            if empty {
                println!("No templates yet. Add one with `tokitask template add <name>`.");
            }
        }
        TemplateCommand::Add {
            task,
            weekday,
            date,
        } => {
            let scope = match (weekday, date) {
                (Some(day), _) => TemplateScope::Weekly(day.parse::<DayOfWeek>()?),
                (None, Some(date)) => TemplateScope::Calendar(parse_date(&date)?),
                (None, None) => TemplateScope::Daily,
            };
            let task = task_from_args(task)?;
            let added = session
                .apply(|data| Ok(data.add_template(scope, task)?.clone()))
                .await?;
            println!("Added template {}", template_line(&added));
        }
        TemplateCommand::Rm { id } => {
            let removed = session
                .apply(|data| {
                    let templates = data
                        .general_tasks
                        .iter()
                        .chain(data.weekly_tasks.values().flatten())
                        .chain(data.calendar_tasks.iter())
                        .map(|t| &t.task);
                    let id = resolve_id(templates, &id)?;
                    data.remove_template(id)
                })
                .await?;
            println!("Removed template {}", removed.task.name);
        }
    }
    Ok(())
}

pub async fn run_day<R: UserDataRepository>(
    cmd: DayCommand,
    session: &DaySession<R>,
    today: NaiveDate,
) -> Result<()> {
    match cmd {
        DayCommand::CloneTemplates { date } => {
            let date = match date {
                Some(raw) => parse_date(&raw)?,
                None => today,
            };
            let tasks = session
                .apply(|data| Ok(data.clone_day(date).to_vec()))
                .await?;
            println!("Loaded {} task(s) for {date}.", tasks.len());
            print_day(&tasks);
        }
        DayCommand::End { time } => {
            let end = session
                .apply(|data| {
                    data.set_end_of_day(&time)?;
                    Ok(data.end_of_day.clone())
                })
                .await?;
            println!("End of day set to {end}");
        }
    }
    Ok(())
}

/// Print a day list, one numbered line per task.
pub fn print_day(tasks: &[DayTask]) {
    for (idx, day) in tasks.iter().enumerate() {
        let marker = if day.completed {
            "[x]"
        } else if day.is_current {
            "[>]"
        } else {
            "[ ]"
        };
        let mut line = format!(
            "{:>2}. {marker} {} ({}, {}",
            idx + 1,
            day.task.name,
            day.task.priority,
            day.ai_duration
        );
        if day.ai_duration != day.task.base_duration {
            line.push_str(&format!(" of {}", day.task.base_duration));
        }
        line.push(')');
        if let Some(note) = &day.ai_note {
            line.push_str(&format!(" - {note}"));
        }
        println!("{line}");
    }
}

fn template_line(template: &GeneralTask) -> String {
    let task = &template.task;
    let mut line = format!(
        "{} {} ({}, {})",
        short_id(task.id),
        task.name,
        task.priority,
        task.base_duration
    );
    if let Some(date) = task.scheduled_date {
        line.push_str(&format!(" on {date}"));
    }
    if task.is_habit {
        line.push_str(" [habit]");
    }
    line
}

fn task_from_args(args: NewTaskArgs) -> Result<Task, TokiError> {
    let priority: Priority = args.priority.parse()?;
    let mut task = Task::new(
        args.name.join(" "),
        duration::normalize(&args.duration)?,
        priority,
    );
    task.flexible_time = !args.fixed;
    task.is_habit = args.habit;
    task.start_time = args.start;
    task.end_time = args.end;
    Ok(task)
}

/// Resolve a task reference: a 1-based position or a unique id prefix.
fn resolve_day_task(tasks: &[DayTask], reference: &str) -> Result<Uuid, TokiError> {
    if let Ok(pos) = reference.trim().parse::<usize>() {
        return position(pos)
            .ok()
            .and_then(|idx| tasks.get(idx))
            .map(|t| t.task.id)
            .ok_or_else(|| TokiError::NotFound(format!("task #{pos}")));
    }
    resolve_id(tasks.iter().map(|t| &t.task), reference)
}

fn resolve_id<'a>(tasks: impl Iterator<Item = &'a Task>, prefix: &str) -> Result<Uuid, TokiError> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.is_empty() {
        return Err(TokiError::Validation("task reference cannot be empty".into()));
    }
    let mut matches = tasks.filter(|t| t.id.to_string().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task.id),
        (Some(_), Some(_)) => Err(TokiError::Validation(format!(
            "id prefix \"{prefix}\" is ambiguous"
        ))),
        (None, _) => Err(TokiError::NotFound(format!("task \"{prefix}\""))),
    }
}

fn position(one_based: usize) -> Result<usize, TokiError> {
    one_based
        .checked_sub(1)
        .ok_or_else(|| TokiError::Validation("positions start at 1".into()))
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn parse_date(raw: &str) -> Result<NaiveDate, TokiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| TokiError::Validation(format!("invalid date \"{raw}\" (use YYYY-MM-DD)")))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokitask_core::storage::InMemoryDocumentStore;
    use tokitask_task::StoreUserRepo;

    type TestSession = DaySession<StoreUserRepo<InMemoryDocumentStore>>;

    async fn session() -> TestSession {
        let repo = StoreUserRepo::new(InMemoryDocumentStore::new(), "tester");
        DaySession::open(repo).await.expect("open")
    }

    fn args(name: &str, duration: &str, priority: &str) -> NewTaskArgs {
        NewTaskArgs {
            name: vec![name.to_string()],
            duration: duration.to_string(),
            priority: priority.to_string(),
            fixed: false,
            habit: false,
            start: None,
            end: None,
        }
    }

    fn date(raw: &str) -> NaiveDate {
        parse_date(raw).expect("date")
    }

    #[tokio::test]
    async fn add_normalizes_duration_and_marks_current() {
        let session = session().await;
        run_task(
            TaskCommand::Add(args("read", "1h30", "high")),
            &session,
            date("2026-10-19"),
        )
        .await
        .expect("add");

        let data = session.snapshot().await;
        assert_eq!(data.day_tasks.len(), 1);
        let day = &data.day_tasks[0];
        assert_eq!(day.task.base_duration, "1h 30min");
        assert_eq!(day.task.priority, Priority::High);
        assert!(day.is_current);
    }

    #[tokio::test]
    async fn done_by_position_records_history() {
        let session = session().await;
        let today = date("2026-10-19");
        for name in ["a", "b"] {
            run_task(TaskCommand::Add(args(name, "20min", "low")), &session, today)
                .await
                .expect("add");
        }
        run_task(TaskCommand::Done { task: "1".into() }, &session, today)
            .await
            .expect("done");

        let data = session.snapshot().await;
        assert!(data.day_tasks[0].completed);
        assert!(data.day_tasks[1].is_current);
        let progress = data.day_tasks[0].task.progress_id;
        assert_eq!(data.task_completions_by_progress_id[&progress], vec![today]);
    }

    #[tokio::test]
    async fn invalid_input_leaves_document_untouched() {
        let session = session().await;
        let before = session.revision().await;
        let err = run_task(
            TaskCommand::Add(args("nap", "forever", "medium")),
            &session,
            date("2026-10-19"),
        )
        .await;
        assert!(err.is_err());
        assert_eq!(session.revision().await, before);
        assert!(session.snapshot().await.day_tasks.is_empty());
    }

    #[tokio::test]
    async fn weekly_template_feeds_clone() {
        let session = session().await;
        run_template(
            TemplateCommand::Add {
                task: args("gym", "45min", "medium"),
                weekday: Some("mon".into()),
                date: None,
            },
            &session,
        )
        .await
        .expect("template add");

        // 2026-10-19 is a Monday.
        run_day(
            DayCommand::CloneTemplates { date: None },
            &session,
            date("2026-10-19"),
        )
        .await
        .expect("clone");
        let data = session.snapshot().await;
        assert_eq!(data.day_tasks.len(), 1);
        assert_eq!(data.day_tasks[0].task.name, "gym");

        run_day(
            DayCommand::CloneTemplates {
                date: Some("2026-10-20".into()),
            },
            &session,
            date("2026-10-19"),
        )
        .await
        .expect("clone tuesday");
        assert!(session.snapshot().await.day_tasks.is_empty());
    }

    #[tokio::test]
    async fn end_of_day_is_normalized() {
        let session = session().await;
        run_day(
            DayCommand::End {
                time: "9:05".into(),
            },
            &session,
            date("2026-10-19"),
        )
        .await
        .expect("end");
        assert_eq!(session.snapshot().await.end_of_day, "09:05");
    }

    #[test]
    fn resolves_positions_and_prefixes() {
        let tasks = vec![
            DayTask::new(Task::new("a", "10min", Priority::Low)),
            DayTask::new(Task::new("b", "10min", Priority::Low)),
        ];
        assert_eq!(resolve_day_task(&tasks, "2").expect("pos"), tasks[1].task.id);
        let prefix = &tasks[0].task.id.to_string()[..8];
        assert_eq!(resolve_day_task(&tasks, prefix).expect("prefix"), tasks[0].task.id);
        assert!(matches!(
            resolve_day_task(&tasks, "3"),
            Err(TokiError::NotFound(_))
        ));
        assert!(matches!(
            resolve_day_task(&tasks, "0"),
            Err(TokiError::NotFound(_))
        ));
    }
}
