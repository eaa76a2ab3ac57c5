/// Non-text payload attached to a [`StreamChunk`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkPayload {
    /// A complete reply object sent to the platform verbatim instead of a
    /// stream frame (typed cards, plain text messages, ...).
    Object(serde_json::Value),
    /// Explicit request for no passive reply at all — the callback answers
    /// with an empty 200.
    Silent,
}

/// One element of a pipeline's lazy output sequence.
///
/// Pipelines emit text deltas; the session layer turns them into
/// full-content snapshots before they reach a consumer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    /// Text produced by the pipeline.
    pub content: String,
    /// Optional non-stream payload.
    pub payload: Option<ChunkPayload>,
    /// Marks the last chunk of the sequence.
    pub is_final: bool,
}

impl StreamChunk {
    /// A non-final text chunk.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            payload: None,
            is_final: false,
        }
    }

    /// A final text chunk.
    pub fn final_text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            payload: None,
            is_final: true,
        }
    }

    /// The empty terminating chunk.
    pub fn finished() -> Self {
        Self {
            content: String::new(),
            payload: None,
            is_final: true,
        }
    }

    /// A final one-shot payload reply.
    pub fn payload(value: serde_json::Value) -> Self {
        Self {
            content: String::new(),
            payload: Some(ChunkPayload::Object(value)),
            is_final: true,
        }
    }

    /// The silent signal: reply with nothing at all.
    pub fn silent() -> Self {
        Self {
            content: String::new(),
            payload: Some(ChunkPayload::Silent),
            is_final: true,
        }
    }

    /// True when the chunk carries neither text, payload, nor a final marker.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.payload.is_none() && !self.is_final
    }

    /// True when the chunk is the silent signal.
    pub fn is_silent(&self) -> bool {
        matches!(self.payload, Some(ChunkPayload::Silent))
    }
}
