//! HTTP client for a Gemini-style `generateContent` endpoint.
//!
//! Every failure comes back as an [`OracleError`]; turning that into the
//! fallback reading is the session's job.

use std::time::Duration;

use jar_core::{ORACLE_SYSTEM_INSTRUCTION, OracleError, OracleReading, OracleRequest, RequestPart};
use jar_store::OracleConfig;
use serde_json::{Value, json};

/// Environment variables checked, in order, for the API key.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Clone)]
pub struct GeminiOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiOracle {
    pub fn new(config: &OracleConfig, api_key: Option<String>) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn from_env(config: &OracleConfig) -> Result<Self, OracleError> {
        let key = API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|k| !k.is_empty()));
        Self::new(config, key)
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    pub async fn consult(&self, request: &OracleRequest) -> Result<OracleReading, OracleError> {
        let Some(key) = &self.api_key else {
            return Err(OracleError::Unavailable(format!(
                "no API key (set {})",
                API_KEY_VARS.join(" or ")
            )));
        };

        tracing::info!(kind = request.kind.as_str(), model = %self.model, "consulting oracle");
        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(OracleError::Transport(format!("HTTP {status}: {snippet}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        parse_response(&body)
    }
}

/// Request JSON: persona as the system instruction, the memory as user
/// parts, and a response schema pinning the answer to
/// `{interpretation, mood}`.
pub fn request_body(request: &OracleRequest) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            RequestPart::Text(text) => json!({ "text": text }),
            RequestPart::InlineData { mime_type, data } => json!({
                "inlineData": { "mimeType": mime_type, "data": data }
            }),
        })
        .collect();

    json!({
        "systemInstruction": { "parts": [{ "text": ORACLE_SYSTEM_INSTRUCTION }] },
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "interpretation": { "type": "STRING" },
                    "mood": { "type": "STRING" }
                },
                "required": ["interpretation", "mood"]
            }
        }
    })
}

/// Pull the reading out of `candidates[0].content.parts[*].text`.
pub fn parse_response(body: &Value) -> Result<OracleReading, OracleError> {
    let parts = body["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| OracleError::InvalidResponse("no candidate content".to_string()))?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.trim().is_empty() {
        return Err(OracleError::InvalidResponse("empty oracle response".to_string()));
    }
    serde_json::from_str(text.trim())
        .map_err(|e| OracleError::InvalidResponse(format!("{e}: {text}")))
}
