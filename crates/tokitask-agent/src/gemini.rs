//! Google Gemini planner via the `generateContent` REST endpoint.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokitask_core::{
    agent::{PlanReply, PlanRequest, ScheduleAgent},
    TokiError,
};
use tracing::{debug, error, instrument};

use crate::reply::parse_reply;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for the Gemini agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub api_base: Option<String>,
}

impl GeminiSettings {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            api_base: None,
        }
    }
}

/// Gemini-backed schedule agent using JSON-mode generation.
pub struct GeminiAgent {
    client: Client,
    settings: GeminiSettings,
}

impl GeminiAgent {
    pub fn new(settings: GeminiSettings) -> Result<Self, TokiError> {
        if settings.api_key.trim().is_empty() {
            return Err(TokiError::Config("missing Gemini API key".into()));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| TokiError::Config(format!("http client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        let base = self
            .settings
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/');
        format!("{base}/models/{}:generateContent", self.settings.model)
    }
}

#[async_trait]
impl ScheduleAgent for GeminiAgent {
    fn name(&self) -> &'static str {
        "gemini"
    }

    #[instrument(skip_all, fields(agent = "gemini", model = %self.settings.model))]
    async fn plan(&self, request: PlanRequest) -> Result<PlanReply, TokiError> {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: request.system,
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: gemini_schema(&request.response_schema),
                temperature: 0.2,
            },
        };

        debug!(tasks = request.context.pending.len(), "sending plan request");
        let response = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("gemini request failed: {e}");
                TokiError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, "gemini returned an error");
            return Err(classify_status(status, &text));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TokiError::Agent(format!("unexpected response body: {e}")))?;

        let text: String = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .ok_or_else(|| TokiError::Agent("no candidates in response".into()))?;

        parse_reply(&text)
    }
}

fn classify_status(status: StatusCode, body: &str) -> TokiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TokiError::Auth(status.to_string()),
        StatusCode::BAD_REQUEST if body.contains("API_KEY_INVALID") => {
            TokiError::Auth("invalid API key".into())
        }
        StatusCode::TOO_MANY_REQUESTS => TokiError::Agent("rate limited".into()),
        _ if status.is_server_error() => TokiError::Network(format!("gemini unavailable: {status}")),
        _ => TokiError::Agent(format!("gemini error {status}")),
    }
}

/// Gemini expects upper-case OpenAPI type names.
fn gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = match (key.as_str(), value) {
                        ("type", Value::String(kind)) => Value::String(kind.to_uppercase()),
                        _ => gemini_schema(value),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;
    use serde_json::json;
    use tokitask_core::tasks::{DayTask, Priority, Task};

    use super::*;
    use crate::prompt::{build_plan_request, response_schema};

    fn agent_for(server: &mockito::Server) -> GeminiAgent {
        GeminiAgent::new(GeminiSettings {
            api_key: "test-key".into(),
            model: DEFAULT_MODEL.into(),
            api_base: Some(server.url()),
        })
        .expect("agent")
    }

    fn request() -> (PlanRequest, DayTask) {
        let task = DayTask::new(Task::new("essay", "1h", Priority::High));
        let request = build_plan_request(
            std::slice::from_ref(&task),
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
        )
        .expect("request");
        (request, task)
    }

    #[test]
    fn rejects_missing_api_key() {
        let err = GeminiAgent::new(GeminiSettings::new("  ".into())).err();
        assert!(matches!(err, Some(TokiError::Config(_))));
    }

    #[test]
    fn schema_types_are_upper_cased() {
        let schema = gemini_schema(&response_schema());
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["properties"]["tasks"]["type"], "ARRAY");
        assert_eq!(
            schema["properties"]["tasks"]["items"]["properties"]["isCurrent"]["type"],
            "BOOLEAN"
        );
        assert_eq!(schema["required"], json!(["tasks", "freeTime", "advice"]));
    }

    #[tokio::test]
    async fn parses_json_reply_from_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let (request, task) = request();
        let reply_text = json!({
            "tasks": [{"id": task.task.id.to_string(), "aiDuration": "50min", "isCurrent": true}],
            "freeTime": "10min",
            "advice": "Start now."
        })
        .to_string();

        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{"content": {"role": "model", "parts": [{"text": reply_text}]}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let reply = agent_for(&server).plan(request).await.expect("plan");
        mock.assert_async().await;

        assert_eq!(reply.tasks.len(), 1);
        assert_eq!(reply.tasks[0].ai_duration, "50min");
        assert_eq!(reply.free_time.as_deref(), Some("10min"));
        assert_eq!(reply.advice.as_deref(), Some("Start now."));
    }

    #[tokio::test]
    async fn maps_auth_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(400)
            .with_body(r#"{"error":{"status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#)
            .create_async()
            .await;

        let err = agent_for(&server)
            .plan(request().0)
            .await
            .expect_err("should fail");
        assert!(matches!(err, TokiError::Auth(_)));
    }

    #[tokio::test]
    async fn malformed_model_text_is_an_agent_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"I cannot help"}]}}]}"#)
            .create_async()
            .await;

        let err = agent_for(&server)
            .plan(request().0)
            .await
            .expect_err("should fail");
        assert!(matches!(err, TokiError::Agent(_)));
    }

    #[tokio::test]
    async fn server_errors_are_network_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(503)
            .create_async()
            .await;

        let err = agent_for(&server)
            .plan(request().0)
            .await
            .expect_err("should fail");
        assert!(matches!(err, TokiError::Network(_)));
    }
}
