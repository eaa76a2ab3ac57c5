use async_trait::async_trait;

/// Actively push messages outside the passive request/reply cycle.
///
/// Platforms hand out one-shot reply URLs on certain callbacks; this seam
/// lets command handlers use them without depending on a concrete client.
#[async_trait]
pub trait ActiveResponder: Send + Sync {
    /// Send an arbitrary reply object to `response_url`.
    async fn send(&self, response_url: &str, msg: &serde_json::Value) -> anyhow::Result<()>;

    /// Send a markdown message.
    async fn send_markdown(&self, response_url: &str, content: &str) -> anyhow::Result<()>;

    /// Send a template card.
    async fn send_template_card(
        &self,
        response_url: &str,
        card: &serde_json::Value,
    ) -> anyhow::Result<()>;
}
