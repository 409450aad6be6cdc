//! Natural-language command interpretation for the Last War bot.
//!
//! Free text typed at the task menu ("me lembra do caminhão em 2 horas") is
//! sent to an OpenAI chat model in JSON mode and decoded into a structured
//! command. A zero-length duration is treated as a failed interpretation and
//! retried once before giving up.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use chrono::Duration;
use serde::Deserialize;

use crate::data::Kind;
use crate::duration::duration_from_parts;

const MAX_ATTEMPTS: usize = 2;

const SYSTEM_PROMPT: &str = r#"
You are a command interpreter for a Telegram reminder bot for the mobile game "Last War".

Your job is to read a user message (in Portuguese or English) and extract a structured reminder command.

The bot supports these task kinds (internal values):
- "truck"    → references to supply trucks, convoys, vehicle arrivals, 'caminhão'
- "build"    → building or construction finishing, upgrades, 'construção'
- "research" → research tasks or lab upgrades, 'pesquisa'
- "train"    → troop training, 'treinar', 'treino'
- "ministry" → ministry / HQ / special building timers, 'ministério'
- "custom"   → any other task not clearly in the above categories

You must always output a JSON object with these fields:
- kind: one of "truck", "build", "research", "train", "ministry", "custom", or null
- task_name: short label for the task in the user's own words
- days: non-negative integer
- hours: non-negative integer
- minutes: non-negative integer
- language: "pt" for Portuguese, "en" for English, or null if unsure

INTERPRETATION RULES:

- Focus on how long from NOW until the reminder fires.
  Examples:
    - "in 30 minutes" → 0 days, 0 hours, 30 minutes
    - "em 1 dia e 4 horas" → 1 day, 4 hours, 0 minutes
    - "em 90 minutos" → 0 days, 1 hour, 30 minutes
- Ignore seconds.
- Never produce negative durations.
- If the total duration is effectively zero, set all components to 0.

- Detect the task kind:
    - If the message clearly mentions truck / caminhão / convoy → "truck"
    - If it's about construction / prédios / build / upgrade → "build"
    - If it's about research / laboratório → "research"
    - If it's about training troops → "train"
    - If it's about ministry / HQ-like building → "ministry"
    - Otherwise use "custom"

- task_name should be a concise label for what the user cares about, e.g.:
    - "truck arrival"
    - "caminhão"
    - "castle build"
    - "pesquisa de tecnologia"

LANGUAGE:
- language = "pt" if the message is mainly Portuguese.
- language = "en" if it is mainly English.
"#;

/// Structured command extracted from a free-form user message.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ParsedCommand {
    #[serde(default)]
    pub kind: Option<Kind>,
    pub task_name: String,
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub language: Option<String>,
}

impl ParsedCommand {
    pub fn duration(&self) -> Duration {
        duration_from_parts(self.days as i64, self.hours as i64, self.minutes as i64)
            .unwrap_or_else(Duration::zero)
    }

    pub fn is_zero(&self) -> bool {
        self.days == 0 && self.hours == 0 && self.minutes == 0
    }
}

/// LLM-backed interpreter. Disabled (always "not understood") when no API
/// key is configured.
pub struct Interpreter {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl Interpreter {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        let client = api_key
            .filter(|k| !k.is_empty())
            .map(|key| Client::with_config(OpenAIConfig::new().with_api_key(key)));
        Interpreter { client, model }
    }

    pub fn enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Interprets a user message. `Ok(None)` means the model could not make
    /// sense of it (or the interpreter is disabled). Replies that do not
    /// decode are retried; transport errors propagate immediately.
    pub async fn interpret(&self, text: &str) -> anyhow::Result<Option<ParsedCommand>> {
        let Some(client) = &self.client else {
            tracing::warn!("NL interpreter: no OpenAI API key configured");
            return Ok(None);
        };

        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let request = CreateChatCompletionRequestArgs::default()
                .model(&self.model)
                .temperature(0.0)
                .response_format(ResponseFormat::JsonObject)
                .messages([
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(SYSTEM_PROMPT)
                        .build()?
                        .into(),
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(text)
                        .build()?
                        .into(),
                ])
                .build()?;

            let response = client.chat().create(request).await?;
            let raw = response
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default();

            match decode_reply(&raw) {
                Ok(parsed) if !parsed.is_zero() => {
                    tracing::debug!(attempt, ?parsed, "NL interpretation succeeded");
                    return Ok(Some(parsed));
                }
                Ok(parsed) => {
                    tracing::debug!(attempt, ?parsed, "NL interpretation has zero duration");
                }
                Err(e) => {
                    tracing::debug!(attempt, "NL reply did not decode: {e:#}");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Decodes the model reply, tolerating markdown code fences around the JSON.
fn decode_reply(raw: &str) -> anyhow::Result<ParsedCommand> {
    let mut body = raw.trim();
    if let Some(stripped) = body.strip_prefix("```") {
        let stripped = stripped.strip_prefix("json").unwrap_or(stripped);
        body = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    }
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_json() {
        let parsed = decode_reply(
            r#"{"kind": "truck", "task_name": "caminhão", "hours": 2, "language": "pt"}"#,
        )
        .unwrap();
        assert_eq!(parsed.kind, Some(Kind::Truck));
        assert_eq!(parsed.task_name, "caminhão");
        assert_eq!(parsed.duration(), Duration::hours(2));
        assert!(!parsed.is_zero());
    }

    #[test]
    fn decodes_fenced_json() {
        let parsed = decode_reply(
            "```json\n{\"kind\": null, \"task_name\": \"shield\", \"minutes\": 45}\n```",
        )
        .unwrap();
        assert_eq!(parsed.kind, None);
        assert_eq!(parsed.duration(), Duration::minutes(45));
    }

    #[test]
    fn missing_components_default_to_zero() {
        let parsed = decode_reply(r#"{"task_name": "algo"}"#).unwrap();
        assert!(parsed.is_zero());
        assert_eq!(parsed.duration(), Duration::zero());
    }

    #[test]
    fn huge_components_do_not_panic() {
        let parsed = decode_reply(
            r#"{"task_name": "x", "days": 4294967295, "hours": 4294967295, "minutes": 4294967295}"#,
        )
        .unwrap();
        assert!(parsed.duration() > Duration::zero());
        assert!(!parsed.is_zero());
    }

    #[test]
    fn unknown_kind_is_an_error() {
        assert!(decode_reply(r#"{"kind": "list", "task_name": "x"}"#).is_err());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_reply("the truck arrives soon").is_err());
    }

    #[tokio::test]
    async fn disabled_interpreter_reports_not_understood() {
        let interpreter = Interpreter::new(None, "gpt-4.1-mini".to_string());
        assert!(!interpreter.enabled());
        assert_eq!(interpreter.interpret("em 2 horas").await.unwrap(), None);
    }
}
