use clap::{Args, Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "tokitask",
    about = "Daily task and habit planner with an AI time planner",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to launching the TUI when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Launch the day view (d marks the current task done, q or Esc exits).
    Tui,
    /// Print version and exit.
    Version,
    /// Check that the document store can be written and read back.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage today's tasks.
    #[command(subcommand)]
    Task(TaskCommand),
    /// Manage every-day, weekly and calendar templates.
    #[command(subcommand)]
    Template(TemplateCommand),
    /// Day-level operations.
    #[command(subcommand)]
    Day(DayCommand),
    /// Ask the AI planner to split the remaining time across pending tasks.
    Plan {
        /// Pretend the current time is HH:MM.
        #[arg(long)]
        now: Option<String>,
    },
    /// Show completion totals and streaks.
    Habits,
    /// List calendar tasks scheduled for a date (default today).
    Today {
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

/// Fields shared by task and template creation.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct NewTaskArgs {
    /// Task name.
    #[arg(required = true)]
    pub name: Vec<String>,
    /// Estimate, e.g. "45min", "1h30", "1:15".
    #[arg(short, long, default_value = "30min")]
    pub duration: String,
    /// low, medium or high.
    #[arg(short, long, default_value = "medium")]
    pub priority: String,
    /// The planner must not shorten this task.
    #[arg(long)]
    pub fixed: bool,
    /// Track completions as a habit.
    #[arg(long)]
    pub habit: bool,
    #[arg(long)]
    pub start: Option<String>,
    #[arg(long)]
    pub end: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    /// List today's tasks.
    List,
    /// Add a task to today's list.
    Add(NewTaskArgs),
    /// Mark a task done (by position or id prefix).
    Done { task: String },
    /// Mark a task not done.
    Undo { task: String },
    /// Edit a task.
    Edit {
        task: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        duration: Option<String>,
        #[arg(short, long)]
        priority: Option<String>,
        #[arg(long)]
        flexible: Option<bool>,
        #[arg(long)]
        habit: Option<bool>,
    },
    /// Delete a task.
    Rm { task: String },
    /// Move a task from one position to another (1-based).
    Mv { from: usize, to: usize },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TemplateCommand {
    /// List all templates.
    List,
    /// Add a template: every day by default, or for one weekday or date.
    Add {
        #[command(flatten)]
        task: NewTaskArgs,
        #[arg(long, conflicts_with = "date")]
        weekday: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete a template by id prefix.
    Rm { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DayCommand {
    /// Replace today's list with the templates that apply to a date.
    #[command(name = "clone")]
    CloneTemplates {
        #[arg(long)]
        date: Option<String>,
    },
    /// Set the end of the day (HH:MM).
    End { time: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_tui_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["tokitask"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["tokitask", "config", "init"]).expect("parse");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }

    #[test]
    fn parses_task_add_with_flags() {
        let cli = Cli::try_parse_from([
            "tokitask", "task", "add", "write", "essay", "-d", "1h30", "-p", "high", "--fixed",
        ])
        .expect("parse");
        let Some(Command::Task(TaskCommand::Add(args))) = cli.command else {
            panic!("expected task add");
        };
        assert_eq!(args.name, ["write", "essay"]);
        assert_eq!(args.duration, "1h30");
        assert_eq!(args.priority, "high");
        assert!(args.fixed);
        assert!(!args.habit);
    }

    #[test]
    fn parses_plan_with_now_override() {
        let cli = Cli::try_parse_from(["tokitask", "plan", "--now", "18:30"]).expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Plan {
                now: Some("18:30".into())
            })
        );
    }

    #[test]
    fn template_weekday_and_date_conflict() {
        let result = Cli::try_parse_from([
            "tokitask",
            "template",
            "add",
            "gym",
            "--weekday",
            "mon",
            "--date",
            "2026-10-20",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_task_move() {
        let cli = Cli::try_parse_from(["tokitask", "task", "mv", "3", "1"]).expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Task(TaskCommand::Mv { from: 3, to: 1 }))
        );
    }
}
