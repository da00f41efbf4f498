use tokitask_core::{agent::PlanReply, TokiError};

/// Decode the model's JSON text. Tolerates a surrounding markdown fence,
/// which some models add even in JSON mode.
pub fn parse_reply(text: &str) -> Result<PlanReply, TokiError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if body.is_empty() {
        return Err(TokiError::Agent("empty reply".into()));
    }
    serde_json::from_str(body).map_err(|e| TokiError::Agent(format!("malformed JSON reply: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_fenced_json() {
        let plain = r#"{"tasks":[],"freeTime":"1h","advice":"Rest."}"#;
        let fenced = format!("```json\n{plain}\n```");

        assert_eq!(parse_reply(plain).unwrap(), parse_reply(&fenced).unwrap());
        assert_eq!(parse_reply(plain).unwrap().free_time.as_deref(), Some("1h"));
    }

    #[test]
    fn rejects_empty_and_malformed_text() {
        assert!(matches!(parse_reply("  "), Err(TokiError::Agent(_))));
        assert!(matches!(
            parse_reply("Sure! Here is your plan"),
            Err(TokiError::Agent(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"tasks": "none"}"#),
            Err(TokiError::Agent(_))
        ));
    }
}
