//! Callback orchestrator.
//!
//! [`Bot::handle`] is the synchronous edge the platform talks to: verify and
//! decrypt the callback, dispatch to [`initial`](Bot::initial) (first
//! callback of a turn) or [`refresh`](Bot::refresh) (stream poll), and
//! encrypt the reply. The pipeline runs behind a detached consumer task that
//! feeds the session queue until its chunk sequence closes.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    botwire_core::{
        Adapter, ChunkPayload, ChunkReceiver, Emitter, PipelineInvoker, StreamChunk, Update,
    },
    dashmap::DashMap,
    tokio::time::timeout,
    tracing::{debug, error, warn},
};

use crate::{
    adapter::{MessageAdapter, StreamEmitter},
    crypto::Crypt,
    error::{Error, Result},
    message::{EncryptedRequest, EncryptedResponse, Message},
    session::SessionManager,
};

/// Tunable timings. Defaults follow the platform's expectations: the first
/// chunk race stays well inside the ~5s synchronous window, and refresh
/// polls hold the connection for half a second.
#[derive(Debug, Clone, Copy)]
pub struct BotConfig {
    /// Idle sessions older than this are reaped.
    pub session_ttl: Duration,
    /// How long `initial` waits for the pipeline's first chunk before
    /// answering with an empty stream-start.
    pub first_chunk_timeout: Duration,
    /// How long `refresh` waits for the next snapshot.
    pub refresh_timeout: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(60),
            first_chunk_timeout: Duration::from_millis(200),
            refresh_timeout: Duration::from_millis(500),
        }
    }
}

/// Transport-neutral callback reply; `routes` maps it onto axum, but any
/// HTTP router can serve it.
#[derive(Debug, Clone)]
pub struct CallbackResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json; charset=utf-8";

impl CallbackResponse {
    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: TEXT_PLAIN,
            body: body.into().into_bytes(),
        }
    }

    fn json(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: APPLICATION_JSON,
            body,
        }
    }

    fn empty_ok() -> Self {
        Self {
            status: 200,
            content_type: TEXT_PLAIN,
            body: Vec::new(),
        }
    }
}

/// The callback bot: sessions, crypto, and the pipeline seam.
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Bot {
    sessions: Arc<SessionManager>,
    crypto: Arc<Crypt>,
    pipeline: Option<Arc<dyn PipelineInvoker>>,
    adapter: Arc<dyn Adapter<Message>>,
    emitter: Arc<dyn Emitter>,
    /// Terminal chunks waiting for a refresh poll that lost its session.
    fallback: Arc<DashMap<String, StreamChunk>>,
    config: BotConfig,
}

impl Bot {
    pub fn new(crypto: Crypt, config: BotConfig) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(config.session_ttl)),
            crypto: Arc::new(crypto),
            pipeline: None,
            adapter: Arc::new(MessageAdapter),
            emitter: Arc::new(StreamEmitter),
            fallback: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Wire in the business pipeline triggered on first callbacks.
    pub fn with_pipeline(mut self, pipeline: Arc<dyn PipelineInvoker>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Replace the default message adapter.
    pub fn with_adapter(mut self, adapter: Arc<dyn Adapter<Message>>) -> Self {
        self.adapter = adapter;
        self
    }

    /// Replace the default stream emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn Emitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Reap idle sessions. Invoked before every POST callback so the
    /// registry cannot grow unbounded between turns.
    pub fn cleanup(&self) {
        self.sessions.cleanup();
    }

    // ── HTTP edge ────────────────────────────────────────────────────────────

    /// Serve one callback request. `query` must hold URL-decoded values.
    pub async fn handle(
        &self,
        method: &str,
        query: &HashMap<String, String>,
        body: &[u8],
    ) -> CallbackResponse {
        match method {
            m if m.eq_ignore_ascii_case("GET") => self.handle_verify(query),
            m if m.eq_ignore_ascii_case("POST") => self.handle_event(query, body).await,
            _ => CallbackResponse::text(405, "method not allowed"),
        }
    }

    /// GET path: URL ownership verification.
    fn handle_verify(&self, query: &HashMap<String, String>) -> CallbackResponse {
        let (Some(signature), Some(ts), Some(nonce), Some(echostr)) = (
            query.get("msg_signature"),
            query.get("timestamp"),
            query.get("nonce"),
            query.get("echostr"),
        ) else {
            return CallbackResponse::text(400, "missing parameters");
        };

        match self.crypto.verify_url(signature, ts, nonce, echostr) {
            Ok(plain) => CallbackResponse::text(200, plain),
            Err(error) => {
                warn!(%error, "url verification failed");
                CallbackResponse::text(403, "forbidden")
            },
        }
    }

    /// POST path: decrypt the event and dispatch on message kind.
    async fn handle_event(&self, query: &HashMap<String, String>, body: &[u8]) -> CallbackResponse {
        self.cleanup();

        let (Some(signature), Some(ts), Some(nonce)) = (
            query.get("msg_signature"),
            query.get("timestamp"),
            query.get("nonce"),
        ) else {
            return CallbackResponse::text(400, "missing parameters");
        };

        let req: EncryptedRequest = match serde_json::from_slice(body) {
            Ok(req) => req,
            Err(error) => {
                warn!(%error, "undecodable callback body");
                return CallbackResponse::text(400, "invalid request body");
            },
        };
        if req.encrypt.is_empty() {
            return CallbackResponse::text(400, "missing encrypt");
        }

        let msg = match self.crypto.decrypt_message(signature, ts, nonce, &req) {
            Ok(msg) => msg,
            Err(error) => {
                warn!(%error, "callback decryption failed");
                return CallbackResponse::text(400, "bad request");
            },
        };

        let result = if msg.msg_type == "stream" {
            self.refresh(&msg, ts, nonce).await
        } else {
            self.initial(&msg, ts, nonce).await
        };

        match result {
            Ok(resp) => match serde_json::to_vec(&resp) {
                Ok(body) => CallbackResponse::json(body),
                Err(error) => {
                    error!(%error, "reply serialization failed");
                    CallbackResponse::text(500, "internal error")
                },
            },
            Err(Error::NoResponse) => CallbackResponse::empty_ok(),
            Err(error) => {
                error!(%error, "callback handling failed");
                CallbackResponse::text(500, "internal error")
            },
        }
    }

    // ── Turn handling ────────────────────────────────────────────────────────

    /// First callback of a conversational turn: create the session, trigger
    /// the pipeline, and race its first chunk against the configured
    /// deadline so synchronous commands answer in one round trip.
    pub async fn initial(
        &self,
        msg: &Message,
        timestamp: &str,
        nonce: &str,
    ) -> Result<EncryptedResponse> {
        let update = self.adapter.normalize(msg)?;
        let (session, is_new) = self.sessions.create_or_get(msg);
        let stream_id = session.stream_id().to_string();
        self.sessions.set_update(&stream_id, update.clone());

        // Default first reply: an empty stream start.
        let mut initial_chunk = StreamChunk::default();

        if is_new
            && let Some(pipeline) = &self.pipeline
            && let Some(mut rx) = pipeline.trigger(update.clone(), &stream_id)
        {
            match timeout(self.config.first_chunk_timeout, rx.recv()).await {
                Ok(Some(chunk)) => {
                    if chunk.is_silent() {
                        self.sessions.mark_finished(&stream_id);
                        return Err(Error::NoResponse);
                    }

                    if let Some(ChunkPayload::Object(_)) = chunk.payload {
                        // One-shot payload reply; the turn is usually over,
                        // but any stragglers still drain into the session.
                        if chunk.is_final {
                            self.sessions.mark_finished(&stream_id);
                        }
                        self.spawn_consumer(rx, msg.msg_id.clone(), stream_id.clone());
                        let reply = self.build_reply(&update, &stream_id, &chunk)?;
                        return Ok(self.crypto.encrypt_response(&reply, timestamp, nonce)?);
                    }

                    // Text first chunk goes out synchronously. Accumulate it
                    // into session state without enqueueing, so the next
                    // refresh sees the continuing accumulation but never the
                    // same chunk twice.
                    self.sessions.accumulate(&stream_id, &chunk.content);
                    if chunk.is_final {
                        self.sessions.mark_finished(&stream_id);
                    }
                    initial_chunk = chunk;
                    self.spawn_consumer(rx, msg.msg_id.clone(), stream_id.clone());
                },
                Ok(None) => {
                    // The sequence closed without producing anything.
                    self.sessions.mark_finished(&stream_id);
                    initial_chunk = StreamChunk::finished();
                },
                Err(_) => {
                    // Deadline passed; the consumer takes the whole
                    // sequence and refresh polls pick the content up.
                    debug!(stream_id, "first chunk timeout, detaching consumer");
                    self.spawn_consumer(rx, msg.msg_id.clone(), stream_id.clone());
                },
            }
        }

        let reply = self.build_reply(&update, &stream_id, &initial_chunk)?;
        Ok(self.crypto.encrypt_response(&reply, timestamp, nonce)?)
    }

    /// Stream refresh poll: hand back the next snapshot, the cached
    /// fallback, or a keep-alive.
    pub async fn refresh(
        &self,
        msg: &Message,
        timestamp: &str,
        nonce: &str,
    ) -> Result<EncryptedResponse> {
        let stream_id = msg.stream_id().unwrap_or_default();
        if stream_id.is_empty() {
            // Nothing to refresh; tell the platform the stream is over.
            let reply = self.build_reply(&Update::default(), "", &StreamChunk::finished())?;
            return Ok(self.crypto.encrypt_response(&reply, timestamp, nonce)?);
        }

        let mut chunk = self
            .sessions
            .consume(stream_id, self.config.refresh_timeout)
            .await;

        if chunk.is_none()
            && !msg.msg_id.is_empty()
            && let Some((_, cached)) = self.fallback.remove(&msg.msg_id)
        {
            debug!(stream_id, msg_id = %msg.msg_id, "serving cached final chunk");
            chunk = Some(cached);
        }

        let Some(chunk) = chunk else {
            // Nothing available: keep the poll loop alive.
            let update = self.sessions.get_update(stream_id);
            let reply = self.build_reply(&update, stream_id, &StreamChunk::default())?;
            return Ok(self.crypto.encrypt_response(&reply, timestamp, nonce)?);
        };

        if chunk.is_final {
            self.sessions.mark_finished(stream_id);
        }

        let update = self.sessions.get_update(stream_id);
        let reply = self.build_reply(&update, stream_id, &chunk)?;
        Ok(self.crypto.encrypt_response(&reply, timestamp, nonce)?)
    }

    // ── Chunk routing ────────────────────────────────────────────────────────

    /// Push one chunk toward a session by msg-id, for callers outside the
    /// pipeline (e.g. an async job finishing after the turn started).
    pub fn push_stream_chunk(&self, msg_id: &str, content: &str, is_final: bool) -> bool {
        let chunk = StreamChunk {
            content: content.to_string(),
            payload: None,
            is_final,
        };
        self.route_chunk("", msg_id, chunk)
    }

    /// Record a final result for a turn, whether or not its session still
    /// exists: publish when it does, cache as fallback when it does not.
    pub fn set_final_message(&self, msg_id: &str, content: &str) {
        self.route_chunk("", msg_id, StreamChunk::final_text(content));
    }

    /// Route a chunk into its session, falling back to the msg-id cache
    /// when the session is gone so the platform still observes a
    /// terminating frame.
    fn route_chunk(&self, stream_id: &str, msg_id: &str, chunk: StreamChunk) -> bool {
        let mut target = stream_id.to_string();
        if target.is_empty()
            && let Some(located) = self.sessions.stream_id_by_msg(msg_id)
        {
            target = located;
        }
        if target.is_empty() {
            return self.cache_fallback(msg_id, chunk);
        }
        let is_final = chunk.is_final;
        if !self.sessions.publish(&target, &chunk) {
            return self.cache_fallback(msg_id, chunk);
        }
        if is_final {
            self.sessions.mark_finished(&target);
        }
        true
    }

    /// Only terminal chunks are worth caching: the poll loop ends as soon
    /// as it sees a final frame, and anything earlier is superseded anyway.
    fn cache_fallback(&self, msg_id: &str, chunk: StreamChunk) -> bool {
        if chunk.is_final && !msg_id.is_empty() {
            debug!(msg_id, "caching final chunk for orphaned turn");
            self.fallback.insert(msg_id.to_string(), chunk);
        }
        false
    }

    /// Own the tail of a pipeline sequence: drain every remaining chunk
    /// into the session until the sender side closes.
    fn spawn_consumer(&self, mut rx: ChunkReceiver, msg_id: String, stream_id: String) {
        let bot = self.clone();
        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if chunk.is_empty() {
                    continue;
                }
                bot.route_chunk(&stream_id, &msg_id, chunk);
            }
        });
    }

    /// A payload chunk is the reply verbatim; anything else goes through
    /// the emitter.
    fn build_reply(
        &self,
        update: &Update,
        stream_id: &str,
        chunk: &StreamChunk,
    ) -> Result<serde_json::Value> {
        if let Some(ChunkPayload::Object(payload)) = &chunk.payload {
            return Ok(payload.clone());
        }
        Ok(self.emitter.encode(update, stream_id, chunk)?)
    }
}
