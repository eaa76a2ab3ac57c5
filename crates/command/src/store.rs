use std::{
    collections::HashMap,
    sync::RwLock,
};

/// Conversation-scoped key/value state carried between command invocations.
pub type ContextValues = HashMap<String, String>;

/// Load/save seam for conversation context.
///
/// This holds command-layer key/values (not chat history). Implementations
/// must return defensive copies: callers mutating a loaded map must not see
/// the store change underneath them, and vice versa.
pub trait ConversationStore: Send + Sync {
    fn load(&self, key: &str) -> anyhow::Result<ContextValues>;
    fn save(&self, key: &str, values: &ContextValues) -> anyhow::Result<()>;
}

/// In-memory [`ConversationStore`]. Lost on process restart.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, ContextValues>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryStore {
    fn load(&self, key: &str) -> anyhow::Result<ContextValues> {
        if key.is_empty() {
            return Ok(ContextValues::new());
        }
        let data = self.data.read().expect("store lock poisoned");
        Ok(data.get(key).cloned().unwrap_or_default())
    }

    fn save(&self, key: &str, values: &ContextValues) -> anyhow::Result<()> {
        if key.is_empty() || values.is_empty() {
            return Ok(());
        }
        let mut data = self.data.write().expect("store lock poisoned");
        let merged = data.entry(key.to_string()).or_default();
        // Merge semantics: same-named keys take the incoming value.
        for (k, v) in values {
            merged.insert(k.clone(), v.clone());
        }
        Ok(())
    }
}
