use crate::config::CommentConfig;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Stored verbatim whenever a comment cannot be generated.
pub const FALLBACK_COMMENT: &str = "素敵な取り組みでしたね！いつもありがとうございます。";

const SYSTEM_PROMPT: &str = "あなたは思いやりのある福祉施設の職員です。";

/// Input for one award's congratulatory comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRequest {
    pub activity: String,
    pub points: u64,
    /// Recent comments for the same person, oldest first.
    pub history: Vec<String>,
}

impl CommentRequest {
    fn prompt(&self) -> String {
        let mut prompt = format!(
            "利用者さんが『{}』をしてくれました（{}ポイント）。優しく前向きに褒める短いコメントを日本語で30文字以内で書いてください。",
            self.activity, self.points
        );
        if !self.history.is_empty() {
            prompt.push_str("\n最近のコメントと同じ表現は避けてください:");
            for previous in &self.history {
                prompt.push_str("\n- ");
                prompt.push_str(previous);
            }
        }
        prompt
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommentError {
    #[error("comment generation is not configured")]
    NotConfigured,
    #[error("comment request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("comment endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("comment endpoint returned no text")]
    EmptyResponse,
}

/// Produces comment text for an award. Failures are absorbed by [`CommentService`].
pub trait CommentGenerator: Send + Sync {
    fn generate(
        &self,
        request: &CommentRequest,
    ) -> impl Future<Output = Result<String, CommentError>> + Send;
}

/// Generator used when no endpoint is configured; always yields the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackOnly;

impl CommentGenerator for FallbackOnly {
    async fn generate(&self, _request: &CommentRequest) -> Result<String, CommentError> {
        Err(CommentError::NotConfigured)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client. One attempt per award.
#[derive(Debug, Clone)]
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionGenerator {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

impl CommentGenerator for ChatCompletionGenerator {
    async fn generate(&self, request: &CommentRequest) -> Result<String, CommentError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": request.prompt() },
            ],
            "max_tokens": 120,
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CommentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatResponse = response.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(CommentError::EmptyResponse)
    }
}

/// Generator selected from configuration at startup.
#[derive(Debug, Clone)]
pub enum ConfiguredGenerator {
    Chat(ChatCompletionGenerator),
    Fallback(FallbackOnly),
}

impl ConfiguredGenerator {
    pub fn from_config(config: &CommentConfig) -> Self {
        match &config.api_key {
            Some(key) => Self::Chat(ChatCompletionGenerator::new(
                config.api_url.clone(),
                key.clone(),
                config.model.clone(),
            )),
            None => Self::Fallback(FallbackOnly),
        }
    }
}

impl CommentGenerator for ConfiguredGenerator {
    async fn generate(&self, request: &CommentRequest) -> Result<String, CommentError> {
        match self {
            Self::Chat(generator) => generator.generate(request).await,
            Self::Fallback(generator) => generator.generate(request).await,
        }
    }
}

/// Wraps a generator with a time budget and the fixed fallback. Never fails.
#[derive(Debug, Clone)]
pub struct CommentService<G> {
    generator: G,
    timeout: Duration,
}

impl<G: CommentGenerator> CommentService<G> {
    pub fn new(generator: G, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn generate(&self, request: &CommentRequest) -> String {
        match tokio::time::timeout(self.timeout, self.generator.generate(request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(Ok(_)) => {
                warn!(activity = %request.activity, "comment generator returned blank text, using fallback");
                FALLBACK_COMMENT.to_string()
            }
            Ok(Err(CommentError::NotConfigured)) => {
                debug!("comment generation not configured, using fallback");
                FALLBACK_COMMENT.to_string()
            }
            Ok(Err(err)) => {
                warn!(activity = %request.activity, error = %err, "comment generation failed, using fallback");
                FALLBACK_COMMENT.to_string()
            }
            Err(_) => {
                warn!(activity = %request.activity, timeout_ms = self.timeout.as_millis() as u64, "comment generation timed out, using fallback");
                FALLBACK_COMMENT.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl CommentGenerator for Fixed {
        async fn generate(&self, _request: &CommentRequest) -> Result<String, CommentError> {
            Ok(self.0.to_string())
        }
    }

    struct Slow;

    impl CommentGenerator for Slow {
        async fn generate(&self, _request: &CommentRequest) -> Result<String, CommentError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    struct Failing;

    impl CommentGenerator for Failing {
        async fn generate(&self, _request: &CommentRequest) -> Result<String, CommentError> {
            Err(CommentError::Status {
                status: 429,
                body: "quota exceeded".to_string(),
            })
        }
    }

    fn request() -> CommentRequest {
        CommentRequest {
            activity: "皿洗い".to_string(),
            points: 10,
            history: vec!["いつもありがとう！".to_string()],
        }
    }

    #[tokio::test]
    async fn trims_generated_text() {
        let service = CommentService::new(Fixed("  よく頑張りました！ \n"), Duration::from_secs(1));
        assert_eq!(service.generate(&request()).await, "よく頑張りました！");
    }

    #[tokio::test]
    async fn failures_fall_back() {
        let service = CommentService::new(Failing, Duration::from_secs(1));
        assert_eq!(service.generate(&request()).await, FALLBACK_COMMENT);

        let service = CommentService::new(FallbackOnly, Duration::from_secs(1));
        assert_eq!(service.generate(&request()).await, FALLBACK_COMMENT);
    }

    #[tokio::test]
    async fn blank_text_falls_back() {
        let service = CommentService::new(Fixed("   "), Duration::from_secs(1));
        assert_eq!(service.generate(&request()).await, FALLBACK_COMMENT);
    }

    #[tokio::test]
    async fn timeouts_fall_back() {
        let service = CommentService::new(Slow, Duration::from_millis(50));
        assert_eq!(service.generate(&request()).await, FALLBACK_COMMENT);
    }

    #[test]
    fn prompt_mentions_activity_points_and_history() {
        let prompt = request().prompt();
        assert!(prompt.contains("皿洗い"));
        assert!(prompt.contains("10ポイント"));
        assert!(prompt.contains("- いつもありがとう！"));
    }

    #[test]
    fn missing_api_key_selects_fallback_generator() {
        let generator = ConfiguredGenerator::from_config(&CommentConfig::default());
        assert!(matches!(generator, ConfiguredGenerator::Fallback(_)));
    }
}
