use serde::{Deserialize, Serialize};

/// `generateContent` request body.
#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

impl GenerateContentRequest {
    pub fn user_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

// Only text parts matter here, anything else deserializes with text = None
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// `generateContent` response. Every level is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate, if the model produced one.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }

    // Why the first candidate stopped, e.g. SAFETY when the answer was blocked
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }

    #[cfg(test)]
    pub fn from_text(text: &str) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part {
                        text: Some(text.to_string()),
                    }],
                }),
                finish_reason: Some("STOP".to_string()),
            }],
        }
    }
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
pub struct GoogleError {
    pub error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct GoogleErrorDetail {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_text_reads_first_candidate_part() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"pong"},{"text":"extra"}]},"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":3}}"#,
        )
        .unwrap();
        assert_eq!(resp.first_text(), Some("pong"));
    }

    #[test]
    fn first_text_handles_missing_levels() {
        let none: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(none.first_text(), None);

        let no_content: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert_eq!(no_content.first_text(), None);
        assert_eq!(no_content.finish_reason(), Some("SAFETY"));
        assert_eq!(none.finish_reason(), None);

        let no_parts: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"role":"model"}}]}"#).unwrap();
        assert_eq!(no_parts.first_text(), None);
    }

    #[test]
    fn request_wraps_prompt_as_user_content() {
        let body = serde_json::to_value(GenerateContentRequest::user_prompt("hi")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"contents":[{"role":"user","parts":[{"text":"hi"}]}]})
        );
    }
}
