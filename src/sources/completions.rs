use std::time::Duration;

use super::{http_client, json_body, DecodingParams, TextGenerator};
use crate::config::TextGenerationConfig;
use crate::error::SourceError;

/// OpenAI-style text completions endpoint (`POST /v1/completions`).
pub struct CompletionsGenerator {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl CompletionsGenerator {
    pub fn new(
        cfg: &TextGenerationConfig,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let endpoint = format!("{}/v1/completions", cfg.base_url.trim_end_matches('/'));
        Ok(Self {
            endpoint,
            api_key,
            model: cfg.model.clone(),
            client: http_client(timeout)?,
        })
    }

    fn request_body(&self, prompt: &str, params: &DecodingParams) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "frequency_penalty": params.frequency_penalty,
            "presence_penalty": params.presence_penalty,
        })
    }
}

fn completion_text(val: &serde_json::Value) -> Result<String, SourceError> {
    val.pointer("/choices/0/text")
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| SourceError::Parse("missing choices[0].text".into()))
}

#[async_trait::async_trait]
impl TextGenerator for CompletionsGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: &DecodingParams,
    ) -> Result<String, SourceError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, params))
            .send()
            .await?;
        let json = json_body(resp).await?;
        completion_text(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_and_trims_first_choice() {
        let text = completion_text(&json!({
            "choices": [{"text": "\n\nHigh risk. The sender domain..."}, {"text": "ignored"}]
        }))
        .unwrap();
        assert_eq!(text, "High risk. The sender domain...");
    }

    #[test]
    fn missing_choices_is_a_parse_error() {
        let err = completion_text(&json!({"error": {"message": "quota"}})).unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn body_carries_decoding_params() {
        let cfg = TextGenerationConfig::default();
        let gen = CompletionsGenerator::new(&cfg, "sk".into(), Duration::from_secs(1)).unwrap();
        let body = gen.request_body("hi", &DecodingParams::sentiment());
        assert_eq!(body["model"], json!("text-davinci-003"));
        assert_eq!(body["max_tokens"], json!(10));
        assert_eq!(body["prompt"], json!("hi"));
    }
}
