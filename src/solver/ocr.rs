use super::{sanitize_answer, ReadySolver};
use crate::core::capabilities::{ChallengeImage, ChallengeSolver};
use crate::core::error::{BotError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum SolveRequest {
    Image { image: String },
    Uri { uri: String },
}

#[derive(Debug, Deserialize)]
struct SolveResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Recognizer running as a local HTTP sidecar.
///
/// `POST {url}` with `{"image": "<base64>"}` or `{"uri": "..."}`, answered
/// by `{"text": "..."}`.
pub struct HttpOcrSolver {
    client: reqwest::Client,
    url: String,
}

impl HttpOcrSolver {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Whether the sidecar answers at all.
    pub async fn is_reachable(&self) -> bool {
        self.client.get(&self.url).send().await.is_ok()
    }

    /// Poll the sidecar until it answers, then open `barrier`.
    pub fn spawn_warm_up(
        self: Arc<Self>,
        barrier: Arc<ReadySolver>,
        within: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let deadline = Instant::now() + within;
            loop {
                if self.is_reachable().await {
                    barrier.mark_ready();
                    return;
                }
                if Instant::now() >= deadline {
                    warn!("🧠 OCR sidecar at {} not reachable", self.url);
                    return;
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
    }
}

#[async_trait]
impl ChallengeSolver for HttpOcrSolver {
    async fn solve(&self, image: ChallengeImage) -> Result<Option<String>> {
        let body = match image {
            ChallengeImage::Bytes(bytes) => SolveRequest::Image {
                image: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
            ChallengeImage::Uri(uri) => SolveRequest::Uri { uri },
        };
        let response: SolveResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| BotError::Solver(format!("unreadable OCR response: {}", e)))?;

        let answer = response.text.as_deref().and_then(sanitize_answer);
        debug!("OCR answer: {:?}", answer);
        Ok(answer)
    }
}
