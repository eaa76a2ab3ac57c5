//! Platform-neutral data model and seams for webhook chat bots.
//!
//! A platform crate (see `botwire-wecom`) adapts raw callbacks into
//! [`Update`]s, hands them to a [`PipelineInvoker`], and renders the
//! resulting [`StreamChunk`] sequence back into platform replies through an
//! [`Emitter`].

pub mod adapter;
pub mod chunk;
pub mod pipeline;
pub mod responder;
pub mod router;
pub mod update;

pub use {
    adapter::{Adapter, Emitter},
    chunk::{ChunkPayload, StreamChunk},
    pipeline::{CHUNK_CHANNEL_CAPACITY, ChunkReceiver, ChunkSender, PipelineInvoker},
    responder::ActiveResponder,
    router::{Chain, Matcher, match_any, match_prefix},
    update::Update,
};
