use serde::{Deserialize, Serialize};

/// A chat message with role and text content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a new message with role and text content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Get the text content of this message (if any).
    pub fn content(&self) -> Option<&str> {
        if self.content.is_empty() {
            None
        } else {
            Some(&self.content)
        }
    }
}

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Reason why generation finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    /// Map a Gemini `finishReason` value.
    pub fn from_gemini(reason: &str) -> Self {
        match reason {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
            | "IMAGE_SAFETY" => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        let message: Message =
            serde_json::from_str(r#"{"role":"assistant","content":"Hi"}"#).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content(), Some("Hi"));
        assert_eq!(Message::user("").content(), None);
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_gemini("STOP"), FinishReason::Stop);
        assert_eq!(FinishReason::from_gemini("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(FinishReason::from_gemini("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(FinishReason::from_gemini("MALFORMED_FUNCTION_CALL"), FinishReason::Other);
        assert_eq!(
            serde_json::to_string(&FinishReason::ContentFilter).unwrap(),
            "\"content-filter\""
        );
    }
}
