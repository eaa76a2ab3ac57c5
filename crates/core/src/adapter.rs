use crate::{StreamChunk, Update};

/// Maps a platform's raw inbound message into a normalized [`Update`].
pub trait Adapter<Raw>: Send + Sync {
    fn normalize(&self, raw: &Raw) -> anyhow::Result<Update>;
}

impl<Raw, F> Adapter<Raw> for F
where
    F: Fn(&Raw) -> anyhow::Result<Update> + Send + Sync,
{
    fn normalize(&self, raw: &Raw) -> anyhow::Result<Update> {
        self(raw)
    }
}

/// Converts a stream chunk into a platform reply object.
pub trait Emitter: Send + Sync {
    fn encode(
        &self,
        update: &Update,
        stream_id: &str,
        chunk: &StreamChunk,
    ) -> anyhow::Result<serde_json::Value>;
}

impl<F> Emitter for F
where
    F: Fn(&Update, &str, &StreamChunk) -> anyhow::Result<serde_json::Value> + Send + Sync,
{
    fn encode(
        &self,
        update: &Update,
        stream_id: &str,
        chunk: &StreamChunk,
    ) -> anyhow::Result<serde_json::Value> {
        self(update, stream_id, chunk)
    }
}
