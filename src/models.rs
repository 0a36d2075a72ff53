use serde::Serialize;

/// Validated inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
}

impl ChatReply {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Body posted to the inference service.
#[derive(Debug, Serialize)]
pub struct InferenceRequest {
    pub inputs: String,
}

impl InferenceRequest {
    /// Single-turn prompt; the trailing marker is what the normalizer later
    /// strips from echoed generations.
    pub fn single_turn(message: &str) -> Self {
        Self {
            inputs: format!("User: {}\n{}", message, crate::normalize::ASSISTANT_MARKER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedReply {
    pub text: String,
    pub ok: bool,
}

impl NormalizedReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ok: true,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ok: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_turn_prompt_layout() {
        let req = InferenceRequest::single_turn("What is Rust?");
        let body = serde_json::to_value(&req).expect("serialize");
        assert_eq!(body, serde_json::json!({"inputs": "User: What is Rust?\nAssistant:"}));
    }
}
