use {async_trait::async_trait, tokio::sync::mpsc};

/// Options for one LLM call.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Configured model name to use instead of the provider default.
    pub model: Option<String>,
}

impl ChatOptions {
    pub fn with_model(name: impl Into<String>) -> Self {
        Self {
            model: Some(name.into()),
        }
    }
}

/// AI capability seam for command handlers.
///
/// Keeps the command layer free of any concrete provider dependency; the
/// application wires an implementation in at construction time.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Start a chat completion for `prompt` within `session_id`, streaming
    /// text fragments back over the returned receiver.
    async fn chat(
        &self,
        session_id: &str,
        prompt: &str,
        opts: ChatOptions,
    ) -> anyhow::Result<mpsc::Receiver<String>>;
}
