//! Per-conversation streaming state.
//!
//! A [`Session`] buffers pipeline output between refresh polls. The queue
//! holds full-content *snapshots*, not deltas: the platform wants every
//! refresh reply to carry the complete accumulated text, which lets the
//! consumer legally coalesce to the newest snapshot and lets publish drop
//! intermediate entries under overflow.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, RwLock},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use {
    botwire_core::{StreamChunk, Update},
    rand::{RngCore, rngs::OsRng},
    tokio::sync::Notify,
    tracing::debug,
};

use crate::message::Message;

/// Sessions idle longer than this are reaped by [`SessionManager::cleanup`].
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60);

/// Default wait inside [`SessionManager::consume`] when the caller passes a
/// zero timeout.
pub const DEFAULT_CONSUME_TIMEOUT: Duration = Duration::from_millis(500);

/// Snapshot queue capacity per session.
const QUEUE_CAPACITY: usize = 16;

/// One streaming conversation: queue + accumulator + metadata.
pub struct Session {
    stream_id: String,
    msg_id: String,
    chat_id: String,
    sender_id: String,
    created_at: Instant,
    state: Mutex<SessionState>,
    notify: Notify,
}

struct SessionState {
    update: Update,
    last_access: Instant,
    queue: VecDeque<StreamChunk>,
    finished: bool,
    /// Latest snapshot handed out or queued, kept for timeout fallback.
    last_chunk: Option<StreamChunk>,
    /// Concatenation of every published chunk's content.
    accumulated: String,
    /// Snapshots discarded because the queue was full.
    dropped_snapshots: u64,
}

impl Session {
    fn new(stream_id: String, msg: &Message) -> Self {
        let now = Instant::now();
        Self {
            stream_id,
            msg_id: msg.msg_id.clone(),
            chat_id: msg.chat_id.clone(),
            sender_id: msg.from.user_id.clone(),
            created_at: now,
            state: Mutex::new(SessionState {
                update: Update::default(),
                last_access: now,
                queue: VecDeque::with_capacity(QUEUE_CAPACITY),
                finished: false,
                last_chunk: None,
                accumulated: String::new(),
                dropped_snapshots: 0,
            }),
            notify: Notify::new(),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn msg_id(&self) -> &str {
        &self.msg_id
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// The full text accumulated so far.
    pub fn accumulated(&self) -> String {
        self.lock().accumulated.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("session lock poisoned")
    }

    fn touch(&self) {
        self.lock().last_access = Instant::now();
    }

    fn set_finished(&self) {
        let mut state = self.lock();
        state.finished = true;
        state.last_access = Instant::now();
    }
}

struct Registry {
    sessions: HashMap<String, Arc<Session>>,
    msg_index: HashMap<String, String>,
}

/// Registry of live streaming sessions, keyed by stream id with a msg-id
/// side index.
pub struct SessionManager {
    inner: RwLock<Registry>,
    ttl: Duration,
}

impl SessionManager {
    /// A zero `ttl` falls back to [`DEFAULT_SESSION_TTL`].
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Registry {
                sessions: HashMap::new(),
                msg_index: HashMap::new(),
            }),
            ttl: if ttl.is_zero() { DEFAULT_SESSION_TTL } else { ttl },
        }
    }

    /// Return the session already indexed for the message's msg-id, or mint
    /// a new one. The bool is true when a new session was created.
    pub fn create_or_get(&self, msg: &Message) -> (Arc<Session>, bool) {
        if !msg.msg_id.is_empty()
            && let Some(stream_id) = self.stream_id_by_msg(&msg.msg_id)
            && let Some(existing) = self.session(&stream_id)
        {
            existing.touch();
            return (existing, false);
        }

        let stream_id = generate_stream_id();
        let session = Arc::new(Session::new(stream_id.clone(), msg));
        let mut registry = self.write();
        registry.sessions.insert(stream_id.clone(), Arc::clone(&session));
        if !msg.msg_id.is_empty() {
            registry.msg_index.insert(msg.msg_id.clone(), stream_id);
        }
        debug!(stream_id = session.stream_id(), msg_id = %msg.msg_id, "created session");
        (session, true)
    }

    /// Fold `content` into the session's accumulated text *without*
    /// enqueueing a snapshot. Used when the orchestrator already returned
    /// that content synchronously.
    pub fn accumulate(&self, stream_id: &str, content: &str) -> bool {
        let Some(session) = self.session(stream_id) else {
            return false;
        };
        let mut state = session.lock();
        state.last_access = Instant::now();
        state.accumulated.push_str(content);
        let snapshot = state.accumulated.clone();
        match &mut state.last_chunk {
            Some(chunk) => chunk.content = snapshot,
            None => state.last_chunk = Some(StreamChunk::text(snapshot)),
        }
        true
    }

    /// Append the chunk's content and enqueue a full-content snapshot.
    ///
    /// When the queue is full the newest queued snapshot is replaced by the
    /// incoming one (drop-newest): the incoming snapshot subsumes it, since
    /// every snapshot carries the complete text.
    pub fn publish(&self, stream_id: &str, chunk: &StreamChunk) -> bool {
        let Some(session) = self.session(stream_id) else {
            return false;
        };

        let mut state = session.lock();
        state.last_access = Instant::now();
        state.accumulated.push_str(&chunk.content);
        let snapshot = StreamChunk {
            content: state.accumulated.clone(),
            payload: chunk.payload.clone(),
            is_final: chunk.is_final,
        };
        state.last_chunk = Some(snapshot.clone());
        if state.queue.len() == QUEUE_CAPACITY {
            state.queue.pop_back();
            state.dropped_snapshots += 1;
            debug!(
                stream_id,
                dropped = state.dropped_snapshots,
                "snapshot queue full, replacing newest"
            );
        }
        state.queue.push_back(snapshot);
        if chunk.is_final {
            state.finished = true;
        }
        drop(state);

        session.notify.notify_one();
        true
    }

    /// Wait up to `timeout` for a queued snapshot, then drain whatever else
    /// is immediately available and return only the newest one, with the
    /// final bit OR-ed across everything drained.
    ///
    /// On timeout, a finished session yields a clone of its cached last
    /// snapshot; otherwise `None`.
    pub async fn consume(&self, stream_id: &str, timeout: Duration) -> Option<StreamChunk> {
        let session = self.session(stream_id)?;
        let timeout = if timeout.is_zero() {
            DEFAULT_CONSUME_TIMEOUT
        } else {
            timeout
        };
        session.touch();

        let deadline = Instant::now() + timeout;
        loop {
            // Register for a wakeup before inspecting the queue so a publish
            // racing this check is never missed.
            let notified = {
                let notified = session.notify.notified();
                let mut state = session.lock();
                if let Some(mut latest) = state.queue.pop_front() {
                    let mut final_seen = latest.is_final;
                    while let Some(next) = state.queue.pop_front() {
                        final_seen |= next.is_final;
                        latest = next;
                    }
                    latest.is_final |= final_seen;
                    state.last_access = Instant::now();
                    state.last_chunk = Some(latest.clone());
                    if latest.is_final {
                        state.finished = true;
                    }
                    return Some(latest);
                }
                notified
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || tokio::time::timeout(remaining, notified).await.is_err()
            {
                let mut state = session.lock();
                state.last_access = Instant::now();
                if state.finished {
                    // The session is over; whatever we hand back is terminal.
                    return state.last_chunk.clone().map(|mut chunk| {
                        chunk.is_final = true;
                        chunk
                    });
                }
                return None;
            }
        }
    }

    /// Mark the session finished and refresh its last access.
    pub fn mark_finished(&self, stream_id: &str) {
        if let Some(session) = self.session(stream_id) {
            session.set_finished();
        }
    }

    /// Bind the normalized event to the session.
    pub fn set_update(&self, stream_id: &str, update: Update) {
        if let Some(session) = self.session(stream_id) {
            session.lock().update = update;
        }
    }

    /// A copy of the session's bound event (default when unknown).
    pub fn get_update(&self, stream_id: &str) -> Update {
        match self.session(stream_id) {
            Some(session) => session.lock().update.clone(),
            None => Update::default(),
        }
    }

    /// Look up the stream id indexed for a msg-id.
    pub fn stream_id_by_msg(&self, msg_id: &str) -> Option<String> {
        if msg_id.is_empty() {
            return None;
        }
        self.read().msg_index.get(msg_id).cloned()
    }

    /// Remove every session idle beyond the TTL, along with its msg-id
    /// index entry (only while that entry still points at it).
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut registry = self.write();
        let expired: Vec<(String, String)> = registry
            .sessions
            .iter()
            .filter(|(_, session)| now.duration_since(session.lock().last_access) > self.ttl)
            .map(|(stream_id, session)| (stream_id.clone(), session.msg_id.clone()))
            .collect();

        for (stream_id, msg_id) in expired {
            registry.sessions.remove(&stream_id);
            if !msg_id.is_empty()
                && registry.msg_index.get(&msg_id).is_some_and(|mapped| *mapped == stream_id)
            {
                registry.msg_index.remove(&msg_id);
            }
            debug!(stream_id, "expired idle session");
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn session(&self, stream_id: &str) -> Option<Arc<Session>> {
        if stream_id.is_empty() {
            return None;
        }
        self.read().sessions.get(stream_id).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.inner.read().expect("session registry lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.inner.write().expect("session registry lock poisoned")
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

/// 16 random bytes, hex-encoded. Falls back to a nanosecond timestamp when
/// the OS RNG is unavailable.
fn generate_stream_id() -> String {
    let mut bytes = [0u8; 16];
    if OsRng.try_fill_bytes(&mut bytes).is_err() {
        return SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .to_string();
    }
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageSender;

    fn message(msg_id: &str) -> Message {
        Message {
            msg_id: msg_id.into(),
            chat_id: "cid".into(),
            from: MessageSender {
                user_id: "uid".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn stream_ids_are_unique_hex() {
        let a = generate_stream_id();
        let b = generate_stream_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn create_or_get_reuses_by_msg_id() {
        let mgr = SessionManager::default();
        let (first, is_new) = mgr.create_or_get(&message("mid"));
        assert!(is_new);

        let (second, is_new) = mgr.create_or_get(&message("mid"));
        assert!(!is_new);
        assert_eq!(first.stream_id(), second.stream_id());

        let (third, is_new) = mgr.create_or_get(&message("other"));
        assert!(is_new);
        assert_ne!(first.stream_id(), third.stream_id());
    }

    #[test]
    fn messages_without_msg_id_always_get_fresh_sessions() {
        let mgr = SessionManager::default();
        let (a, _) = mgr.create_or_get(&message(""));
        let (b, _) = mgr.create_or_get(&message(""));
        assert_ne!(a.stream_id(), b.stream_id());
        assert!(mgr.stream_id_by_msg("").is_none());
    }

    #[tokio::test]
    async fn publish_consume_merges_to_latest_snapshot() {
        let mgr = SessionManager::new(Duration::from_millis(50));
        let (session, is_new) = mgr.create_or_get(&message("mid"));
        assert!(is_new);
        let sid = session.stream_id().to_string();
        assert!(mgr.stream_id_by_msg("mid").is_some());

        assert!(mgr.publish(&sid, &StreamChunk::text("chunk1")));
        assert!(mgr.publish(&sid, &StreamChunk::final_text("final")));

        let chunk = mgr.consume(&sid, Duration::from_millis(10)).await.unwrap();
        assert_eq!(chunk.content, "chunk1final");
        assert!(chunk.is_final);

        tokio::time::sleep(Duration::from_millis(60)).await;
        mgr.cleanup();
        assert!(mgr.stream_id_by_msg("mid").is_none());
    }

    #[tokio::test]
    async fn snapshots_carry_full_accumulated_text() {
        let mgr = SessionManager::default();
        let (session, _) = mgr.create_or_get(&message("mid"));
        let sid = session.stream_id().to_string();

        mgr.publish(&sid, &StreamChunk::text("a"));
        let first = mgr.consume(&sid, Duration::from_millis(10)).await.unwrap();
        assert_eq!(first.content, "a");

        mgr.publish(&sid, &StreamChunk::text("b"));
        mgr.publish(&sid, &StreamChunk::text("c"));
        let second = mgr.consume(&sid, Duration::from_millis(10)).await.unwrap();
        // Snapshot semantics: complete text, not a delta.
        assert_eq!(second.content, "abc");
        assert!(!second.is_final);
    }

    #[tokio::test]
    async fn consume_blocks_until_publish() {
        let mgr = Arc::new(SessionManager::default());
        let (session, _) = mgr.create_or_get(&message("mid"));
        let sid = session.stream_id().to_string();

        let publisher = {
            let mgr = Arc::clone(&mgr);
            let sid = sid.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                mgr.publish(&sid, &StreamChunk::text("late"));
            })
        };

        let chunk = mgr.consume(&sid, Duration::from_millis(500)).await.unwrap();
        assert_eq!(chunk.content, "late");
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn consume_timeout_on_finished_session_returns_cached_final() {
        let mgr = SessionManager::default();
        let (session, _) = mgr.create_or_get(&message("mid"));
        let sid = session.stream_id().to_string();

        mgr.publish(&sid, &StreamChunk::final_text("done"));
        // Drain the queue.
        let first = mgr.consume(&sid, Duration::from_millis(10)).await.unwrap();
        assert!(first.is_final);

        // A later consume times out but still yields the cached snapshot.
        let again = mgr.consume(&sid, Duration::from_millis(10)).await.unwrap();
        assert_eq!(again.content, "done");
        assert!(again.is_final);
    }

    #[tokio::test]
    async fn consume_timeout_on_live_session_returns_none() {
        let mgr = SessionManager::default();
        let (session, _) = mgr.create_or_get(&message("mid"));
        let sid = session.stream_id().to_string();

        mgr.publish(&sid, &StreamChunk::text("partial"));
        mgr.consume(&sid, Duration::from_millis(10)).await.unwrap();

        assert!(mgr.consume(&sid, Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn consume_unknown_stream_returns_none() {
        let mgr = SessionManager::default();
        assert!(mgr.consume("missing", Duration::from_millis(10)).await.is_none());
        assert!(mgr.consume("", Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn accumulate_updates_state_without_enqueueing() {
        let mgr = SessionManager::default();
        let (session, _) = mgr.create_or_get(&message("mid"));
        let sid = session.stream_id().to_string();

        assert!(mgr.accumulate(&sid, "first "));
        // Nothing queued: consume must time out.
        assert!(mgr.consume(&sid, Duration::from_millis(10)).await.is_none());

        // A later publish continues from the accumulated prefix.
        mgr.publish(&sid, &StreamChunk::final_text("second"));
        let chunk = mgr.consume(&sid, Duration::from_millis(10)).await.unwrap();
        assert_eq!(chunk.content, "first second");
        assert!(chunk.is_final);
    }

    #[tokio::test]
    async fn overflow_drops_newest_but_keeps_latest_content() {
        let mgr = SessionManager::default();
        let (session, _) = mgr.create_or_get(&message("mid"));
        let sid = session.stream_id().to_string();

        for i in 0..40 {
            assert!(mgr.publish(&sid, &StreamChunk::text(format!("{i};"))));
        }
        mgr.publish(&sid, &StreamChunk::final_text("end"));

        let chunk = mgr.consume(&sid, Duration::from_millis(10)).await.unwrap();
        // Every publish landed in the accumulator even though the queue
        // overflowed, and the drained result is the newest snapshot.
        assert!(chunk.content.ends_with("end"));
        assert!(chunk.content.starts_with("0;1;"));
        assert!(chunk.is_final);
    }

    #[test]
    fn publish_to_unknown_stream_fails() {
        let mgr = SessionManager::default();
        assert!(!mgr.publish("missing", &StreamChunk::text("x")));
        assert!(!mgr.accumulate("missing", "x"));
    }

    #[test]
    fn cleanup_removes_exactly_the_expired() {
        let mgr = SessionManager::new(Duration::from_millis(40));
        let (old, _) = mgr.create_or_get(&message("old"));
        let old_sid = old.stream_id().to_string();

        std::thread::sleep(Duration::from_millis(60));
        let (fresh, _) = mgr.create_or_get(&message("fresh"));

        mgr.cleanup();
        assert!(mgr.stream_id_by_msg("old").is_none());
        assert!(mgr.get_update(&old_sid).id.is_empty());
        assert_eq!(mgr.len(), 1);
        assert!(mgr.stream_id_by_msg("fresh").is_some());
        assert!(!fresh.is_finished());
    }

    #[test]
    fn cleanup_keeps_reindexed_msg_ids() {
        // If a msg-id was re-indexed to a newer session, reaping the old
        // session must not drop the new mapping.
        let mgr = SessionManager::new(Duration::from_millis(40));
        let (old, _) = mgr.create_or_get(&message("mid"));
        let old_sid = old.stream_id().to_string();

        std::thread::sleep(Duration::from_millis(60));

        // Re-point the index at a fresh session for the same msg-id.
        let (fresh, _) = mgr.create_or_get(&message("other"));
        let fresh_sid = fresh.stream_id().to_string();
        mgr.write().msg_index.insert("mid".into(), fresh_sid.clone());

        mgr.cleanup();
        assert_eq!(mgr.stream_id_by_msg("mid"), Some(fresh_sid));
        assert!(mgr.session(&old_sid).is_none());
    }

    #[test]
    fn update_binding_round_trips() {
        let mgr = SessionManager::default();
        let (session, _) = mgr.create_or_get(&message("mid"));
        let sid = session.stream_id().to_string();

        let update = Update {
            id: "mid".into(),
            sender_id: "uid".into(),
            chat_id: "cid".into(),
            text: "hello".into(),
            ..Default::default()
        };
        mgr.set_update(&sid, update.clone());
        assert_eq!(mgr.get_update(&sid).text, "hello");
        assert!(mgr.get_update("missing").id.is_empty());
    }

    #[tokio::test]
    async fn mark_finished_enables_cached_fallback() {
        let mgr = SessionManager::default();
        let (session, _) = mgr.create_or_get(&message("mid"));
        let sid = session.stream_id().to_string();

        mgr.accumulate(&sid, "partial");
        mgr.mark_finished(&sid);
        assert!(session.is_finished());

        let chunk = mgr.consume(&sid, Duration::from_millis(10)).await.unwrap();
        assert_eq!(chunk.content, "partial");
        assert!(chunk.is_final);
    }
}
