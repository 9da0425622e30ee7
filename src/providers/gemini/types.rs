use serde::{Deserialize, Serialize};

use crate::types::Usage;

/// `generateContent` / `streamGenerateContent` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

/// One conversation turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>, // "user", "model"
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![GeminiPart::Text { text: text.into() }],
        }
    }
}

/// Part of a content. Parts this crate has no use for (thoughts, function
/// calls, executable code) are kept as raw JSON instead of failing the parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
    Other(serde_json::Value),
}

/// Base64-encoded binary payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiBlob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

/// Response body, or one SSE chunk of a streamed response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    pub usage_metadata: Option<GeminiUsageMetadata>,
    pub prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: GeminiContent,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsageMetadata {
    pub prompt_token_count: Option<u32>,
    pub candidates_token_count: Option<u32>,
    pub total_token_count: Option<u32>,
}

impl From<GeminiUsageMetadata> for Usage {
    fn from(metadata: GeminiUsageMetadata) -> Self {
        Usage {
            input_tokens: metadata.prompt_token_count.unwrap_or(0),
            output_tokens: metadata.candidates_token_count.unwrap_or(0),
        }
    }
}

/// Error envelope returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiErrorResponse {
    pub error: GeminiApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiApiError {
    pub code: Option<u16>,
    pub message: String,
    pub status: Option<String>,
}
