//! Chatbot turns: one question in, one reply out.

use serde::{Deserialize, Serialize};

use super::{ApiError, BackendClient};

#[derive(Debug, Serialize)]
struct ChatbotRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatbotResponse {
    response: String,
}

impl BackendClient {
    /// POST `/chatbot` with the user's question and return the reply text.
    pub async fn chatbot(&self, question: &str) -> Result<String, ApiError> {
        let response: ChatbotResponse = self
            .post_json("/chatbot", &ChatbotRequest { question })
            .await?;
        Ok(response.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_the_question_field() {
        let body = serde_json::to_value(ChatbotRequest { question: "Hi" }).unwrap();
        assert_eq!(body, serde_json::json!({ "question": "Hi" }));
    }

    #[test]
    fn response_decodes_the_reply() {
        let decoded: ChatbotResponse =
            serde_json::from_str(r#"{ "response": "Hello" }"#).unwrap();
        assert_eq!(decoded.response, "Hello");
    }
}
