//! Text-command pipeline: parse inbound text, build a fresh command tree per
//! request, and stream handler output back as chunks.
//!
//! The executor ([`CommandManager`]) implements
//! [`botwire_core::PipelineInvoker`]; everything it produces flows through
//! the bounded chunk sequence the session layer consumes.

pub mod context;
pub mod io;
pub mod llm;
pub mod manager;
pub mod parser;
pub mod store;
pub mod tree;

pub use {
    context::ExecutionContext,
    io::ChunkWriter,
    llm::{ChatOptions, LlmProvider},
    manager::CommandManager,
    parser::{ParseResult, Parser},
    store::{ContextValues, ConversationStore, MemoryStore},
    tree::{CommandFactory, CommandHandler, CommandNode},
};
