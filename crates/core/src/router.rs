use std::sync::Arc;

use tracing::debug;

use crate::{ChunkReceiver, PipelineInvoker, Update};

/// Routing predicate: returns true when a route should handle the update.
pub type Matcher = Box<dyn Fn(&Update) -> bool + Send + Sync>;

struct Route {
    name: String,
    matcher: Matcher,
    handler: Arc<dyn PipelineInvoker>,
}

/// A first-match-wins routing table over [`PipelineInvoker`]s.
///
/// Routes are checked in registration order; the first matching route takes
/// the update. When nothing matches, the default handler (if any) runs.
pub struct Chain {
    routes: Vec<Route>,
    default_handler: Option<Arc<dyn PipelineInvoker>>,
}

impl Chain {
    pub fn new(default_handler: Option<Arc<dyn PipelineInvoker>>) -> Self {
        Self {
            routes: Vec::new(),
            default_handler,
        }
    }

    /// Register a route. Order matters.
    pub fn add_route(
        &mut self,
        name: impl Into<String>,
        matcher: Matcher,
        handler: Arc<dyn PipelineInvoker>,
    ) {
        self.routes.push(Route {
            name: name.into(),
            matcher,
            handler,
        });
    }
}

impl PipelineInvoker for Chain {
    fn trigger(&self, update: Update, stream_id: &str) -> Option<ChunkReceiver> {
        for route in &self.routes {
            if (route.matcher)(&update) {
                debug!(route = %route.name, "routing update");
                return route.handler.trigger(update, stream_id);
            }
        }
        match &self.default_handler {
            Some(handler) => handler.trigger(update, stream_id),
            // No match and no default: stay silent.
            None => None,
        }
    }
}

/// Matcher for updates whose text starts with `prefix`.
pub fn match_prefix(prefix: impl Into<String>) -> Matcher {
    let prefix = prefix.into();
    Box::new(move |update: &Update| update.text.starts_with(&prefix))
}

/// Matcher that accepts every update.
pub fn match_any() -> Matcher {
    Box::new(|_| true)
}
