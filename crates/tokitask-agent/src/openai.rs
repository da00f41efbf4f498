use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokitask_core::{
    agent::{PlanReply, PlanRequest, ScheduleAgent},
    TokiError,
};
use tracing::instrument;

use crate::reply::parse_reply;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for the OpenAI agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub model: String,
    pub api_base: Option<String>,
}

impl OpenAiSettings {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            api_base: None,
        }
    }
}

/// OpenAI-backed schedule agent using chat completions with a JSON schema.
pub struct OpenAiAgent {
    client: Client<OpenAIConfig>,
    settings: OpenAiSettings,
}

impl OpenAiAgent {
    pub fn new(settings: OpenAiSettings) -> Result<Self, TokiError> {
        if settings.api_key.trim().is_empty() {
            return Err(TokiError::Config("missing OpenAI API key".into()));
        }
        let mut config = OpenAIConfig::new().with_api_key(&settings.api_key);
        if let Some(base) = &settings.api_base {
            config = config.with_api_base(base);
        }
        let client = Client::with_config(config);
        Ok(Self { client, settings })
    }

    fn build_request(&self, request: PlanRequest) -> Result<CreateChatCompletionRequest> {
        let system = ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(ChatCompletionRequestSystemMessageContent::Text(
                    request.system,
                ))
                .build()
                .context("building system message")?,
        );

        let user = ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Text(
                    request.prompt,
                ))
                .build()
                .context("building user message")?,
        );

        let format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                name: "day_plan".to_string(),
                description: Some("Re-partitioned day schedule".to_string()),
                schema: Some(request.response_schema),
                strict: Some(false),
            },
        };

        CreateChatCompletionRequestArgs::default()
            .model(self.settings.model.clone())
            .messages(vec![system, user])
            .response_format(format)
            .temperature(0.2)
            .build()
            .context("building chat completion request")
    }
}

#[async_trait]
impl ScheduleAgent for OpenAiAgent {
    fn name(&self) -> &'static str {
        "openai"
    }

    #[instrument(skip_all, fields(agent = "openai", model = %self.settings.model))]
    async fn plan(&self, request: PlanRequest) -> Result<PlanReply, TokiError> {
        let req = self
            .build_request(request)
            .map_err(|e| TokiError::Agent(format!("{e:#}")))?;

        let resp = self.client.chat().create(req).await.map_err(classify)?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| TokiError::Agent("openai returned no content".into()))?;

        parse_reply(&content)
    }
}

fn classify(err: OpenAIError) -> TokiError {
    match err {
        OpenAIError::Reqwest(e) => TokiError::Network(e.to_string()),
        OpenAIError::ApiError(api) if api.code.as_deref() == Some("invalid_api_key") => {
            TokiError::Auth(api.message)
        }
        other => TokiError::Agent(other.to_string()),
    }
}
