use serde_json::Value;

use crate::models::ChatRequest;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message is missing, not a string, or blank")]
    EmptyMessage,
}

/// Pulls `message` out of an inbound body and trims it.
///
/// Bodies that are not JSON objects have no `message` field and fail the same
/// way as an empty message.
pub fn validate_chat_request(body: &[u8]) -> Result<ChatRequest, ValidationError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| ValidationError::EmptyMessage)?;
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or(ValidationError::EmptyMessage)?;
    Ok(ChatRequest {
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_surrounding_whitespace() {
        let req = validate_chat_request(br#"{"message":"  hello there \n"}"#).expect("valid");
        assert_eq!(req.message, "hello there");
    }

    #[test]
    fn keeps_inner_content_untouched() {
        let req = validate_chat_request(br#"{"message":"a  b\tc"}"#).expect("valid");
        assert_eq!(req.message, "a  b\tc");
    }

    #[test]
    fn rejects_blank_missing_and_non_string() {
        let bodies: [&[u8]; 8] = [
            br#"{"message":""}"#,
            br#"{"message":"   "}"#,
            br#"{}"#,
            br#"{"message":42}"#,
            br#"{"message":null}"#,
            br#"["message"]"#,
            b"not json",
            b"",
        ];
        for body in bodies {
            assert_eq!(
                validate_chat_request(body),
                Err(ValidationError::EmptyMessage),
                "body: {}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
