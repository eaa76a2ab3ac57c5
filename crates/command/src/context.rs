use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use botwire_core::{ActiveResponder, ChunkSender, StreamChunk, Update};

use crate::{
    io::ChunkWriter,
    llm::LlmProvider,
    store::{ContextValues, ConversationStore},
};

/// Once-guarded sender for the invocation's single final signal.
///
/// Whichever of payload / silent / default-completion fires first wins; the
/// rest are dropped.
#[derive(Clone)]
pub(crate) struct SignalSender {
    tx: ChunkSender,
    fired: Arc<AtomicBool>,
}

impl SignalSender {
    pub(crate) fn new(tx: ChunkSender) -> Self {
        Self {
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send `chunk` if no signal has fired yet. Returns whether this call won.
    pub(crate) async fn fire(&self, chunk: StreamChunk) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(chunk).await;
        true
    }
}

/// Per-invocation environment handed to command handlers.
pub struct ExecutionContext {
    /// The normalized event that triggered this invocation.
    pub update: Update,
    /// Stream session the invocation feeds.
    pub stream_id: String,
    /// Conversation state loaded from the store. Handlers may mutate this
    /// and persist it with [`save_values`](Self::save_values).
    pub values: ContextValues,
    store: Option<Arc<dyn ConversationStore>>,
    llm: Option<Arc<dyn LlmProvider>>,
    responder: Option<Arc<dyn ActiveResponder>>,
    out: ChunkWriter,
    signal: SignalSender,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        update: Update,
        stream_id: String,
        values: ContextValues,
        store: Option<Arc<dyn ConversationStore>>,
        llm: Option<Arc<dyn LlmProvider>>,
        responder: Option<Arc<dyn ActiveResponder>>,
        out: ChunkWriter,
        signal: SignalSender,
    ) -> Self {
        Self {
            update,
            stream_id,
            values,
            store,
            llm,
            responder,
            out,
            signal,
        }
    }

    /// The output writer; every write becomes a non-final chunk.
    pub fn out(&self) -> &ChunkWriter {
        &self.out
    }

    /// The configured AI provider, if any.
    pub fn llm(&self) -> Option<Arc<dyn LlmProvider>> {
        self.llm.clone()
    }

    /// The configured active-push responder, if any.
    pub fn responder(&self) -> Option<Arc<dyn ActiveResponder>> {
        self.responder.clone()
    }

    /// Storage key for this conversation's context.
    pub fn conversation_key(&self) -> String {
        format!("{}:{}", self.update.chat_id, self.update.sender_id)
    }

    /// Persist [`values`](Self::values) back to the store.
    pub fn save_values(&self) -> anyhow::Result<()> {
        match &self.store {
            Some(store) => store.save(&self.conversation_key(), &self.values),
            None => Ok(()),
        }
    }

    /// Reply with a one-shot payload object instead of a text stream.
    ///
    /// This is the invocation's final signal; later signals are ignored.
    pub async fn set_response_payload(&self, payload: serde_json::Value) {
        self.signal.fire(StreamChunk::payload(payload)).await;
    }

    /// Ask the bot to send no passive reply at all (empty 200).
    ///
    /// This is the invocation's final signal; later signals are ignored.
    pub async fn set_no_response(&self) {
        self.signal.fire(StreamChunk::silent()).await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn signal_fires_exactly_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let signal = SignalSender::new(tx);

        assert!(signal.fire(StreamChunk::silent()).await);
        assert!(!signal.fire(StreamChunk::finished()).await);

        let chunk = rx.recv().await.unwrap();
        assert!(chunk.is_silent());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn conversation_key_joins_chat_and_sender() {
        let (tx, _rx) = mpsc::channel(1);
        let ctx = ExecutionContext::new(
            Update {
                chat_id: "room".into(),
                sender_id: "alice".into(),
                ..Default::default()
            },
            "sid".into(),
            ContextValues::new(),
            None,
            None,
            None,
            ChunkWriter::new(tx.clone()),
            SignalSender::new(tx),
        );
        assert_eq!(ctx.conversation_key(), "room:alice");
    }
}
