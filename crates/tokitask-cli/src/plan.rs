use chrono::{Local, NaiveTime};
use color_eyre::Result;
use tokitask_agent::{
    gemini::{self, GeminiAgent, GeminiSettings},
    openai::{self, OpenAiAgent, OpenAiSettings},
};
use tokitask_core::{
    agent::{PassthroughAgent, ScheduleAgent},
    clock, TokiError,
};
use tracing::info;

use crate::{
    config::{AgentKind, Config, ProviderConfig},
    storage, tasks,
};

/// Run one AI schedule sync and print the result.
pub async fn run(cfg: &Config, now: Option<String>) -> Result<()> {
    let now: NaiveTime = match now {
        Some(value) => clock::parse_clock(&value)?,
        None => Local::now().time(),
    };
    let agent = select_agent(cfg, |name| std::env::var(name).ok())?;
    let session = storage::open_session(cfg).await?;

    info!(agent = agent.name(), now = %clock::format_clock(now), "planning day");
    let outcome = session.sync_schedule(agent.as_ref(), now).await?;

    tasks::print_day(&outcome.tasks);
    if let Some(free) = outcome.free_time {
        println!("\nFree time: {free}");
    }
    if let Some(advice) = outcome.advice {
        println!("Advice: {advice}");
    }
    Ok(())
}

/// Pick the planner backend. `env` resolves environment variables so the
/// choice can be tested without touching the process environment.
pub fn select_agent(
    cfg: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn ScheduleAgent>, TokiError> {
    let gemini_key = api_key(
        cfg.gemini.as_ref(),
        &env,
        &["TOKITASK_GEMINI_API_KEY", "GEMINI_API_KEY"],
    );
    let openai_key = api_key(
        cfg.openai.as_ref(),
        &env,
        &["TOKITASK_OPENAI_API_KEY", "OPENAI_API_KEY"],
    );

    let kind = match cfg.agent {
        Some(kind) => kind,
        None if gemini_key.is_some() => AgentKind::Gemini,
        None if openai_key.is_some() => AgentKind::Openai,
        None => {
            return Err(TokiError::Config(
                "no AI planner configured (set GEMINI_API_KEY or add a [gemini] section)".into(),
            ))
        }
    };

    match kind {
        AgentKind::Gemini => {
            let api_key =
                gemini_key.ok_or_else(|| TokiError::Config("missing Gemini API key".into()))?;
            let provider = cfg.gemini.clone().unwrap_or_default();
            Ok(Box::new(GeminiAgent::new(GeminiSettings {
                api_key,
                model: provider
                    .model
                    .unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
                api_base: provider.endpoint,
            })?))
        }
        AgentKind::Openai => {
            let api_key =
                openai_key.ok_or_else(|| TokiError::Config("missing OpenAI API key".into()))?;
            let provider = cfg.openai.clone().unwrap_or_default();
            Ok(Box::new(OpenAiAgent::new(OpenAiSettings {
                api_key,
                model: provider
                    .model
                    .unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
                api_base: provider.endpoint,
            })?))
        }
        AgentKind::Offline => Ok(Box::new(PassthroughAgent)),
    }
}

fn api_key(
    provider: Option<&ProviderConfig>,
    env: &impl Fn(&str) -> Option<String>,
    vars: &[&str],
) -> Option<String> {
    provider
        .and_then(|p| p.api_key.clone())
        .or_else(|| vars.iter().find_map(|name| env(name)))
        .filter(|key| !key.trim().is_empty())
}
