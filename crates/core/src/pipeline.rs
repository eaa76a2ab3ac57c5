use tokio::sync::mpsc;

use crate::{StreamChunk, Update};

/// Capacity of the bounded chunk sequence between a pipeline and its
/// consumer.
pub const CHUNK_CHANNEL_CAPACITY: usize = 16;

/// Receiving end of a pipeline's chunk sequence.
pub type ChunkReceiver = mpsc::Receiver<StreamChunk>;

/// Sending end of a pipeline's chunk sequence.
pub type ChunkSender = mpsc::Sender<StreamChunk>;

/// A business pipeline triggered once per inbound conversational turn.
///
/// `trigger` must return quickly; the actual work runs behind the returned
/// receiver. Returning `None` means the pipeline has nothing to say for this
/// update.
pub trait PipelineInvoker: Send + Sync {
    fn trigger(&self, update: Update, stream_id: &str) -> Option<ChunkReceiver>;
}

impl<F> PipelineInvoker for F
where
    F: Fn(Update, &str) -> Option<ChunkReceiver> + Send + Sync,
{
    fn trigger(&self, update: Update, stream_id: &str) -> Option<ChunkReceiver> {
        self(update, stream_id)
    }
}
