//! Active push over one-shot reply URLs.
//!
//! Certain callbacks carry a `response_url` valid for one hour and a single
//! call; this client posts reply objects to it outside the passive
//! request/reply cycle.

use std::time::Duration;

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
};

use botwire_core::ActiveResponder;

use crate::message::{MarkdownMessage, TemplateCardMessage};

/// HTTP client for the platform's active-reply endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self { http }
    }

    async fn post(&self, response_url: &str, body: &serde_json::Value) -> Result<()> {
        if response_url.is_empty() {
            bail!("response_url is empty");
        }

        let resp = self
            .http
            .post(response_url)
            .json(body)
            .send()
            .await
            .context("active reply request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("active reply rejected: status={status} body={body}");
        }
        Ok(())
    }
}

#[async_trait]
impl ActiveResponder for Client {
    async fn send(&self, response_url: &str, msg: &serde_json::Value) -> Result<()> {
        self.post(response_url, msg).await
    }

    async fn send_markdown(&self, response_url: &str, content: &str) -> Result<()> {
        let msg = serde_json::to_value(MarkdownMessage::new(content))?;
        self.post(response_url, &msg).await
    }

    async fn send_template_card(
        &self,
        response_url: &str,
        card: &serde_json::Value,
    ) -> Result<()> {
        let msg = serde_json::to_value(TemplateCardMessage::new(card.clone()))?;
        self.post(response_url, &msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_response_url_is_rejected() {
        let client = Client::new();
        let err = client
            .send("", &serde_json::json!({"msgtype": "text"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("response_url is empty"));
    }

    #[test]
    fn markdown_message_shape() {
        let msg = serde_json::to_value(MarkdownMessage::new("**hi**")).unwrap();
        assert_eq!(msg["msgtype"], "markdown");
        assert_eq!(msg["markdown"]["content"], "**hi**");
    }
}
