use crate::core::capabilities::TimeSource;
use crate::core::error::{BotError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Remote clock served as a plain-text epoch-millisecond body.
pub struct HttpTimeSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTimeSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TimeSource for HttpTimeSource {
    async fn now(&self) -> Result<DateTime<Utc>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_epoch_millis(&body)
    }
}

pub fn parse_epoch_millis(body: &str) -> Result<DateTime<Utc>> {
    let millis: i64 = body
        .trim()
        .parse()
        .map_err(|_| BotError::TimeSource(format!("unexpected clock body: {:?}", body.trim())))?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| BotError::TimeSource(format!("timestamp {} out of range", millis)))
}
