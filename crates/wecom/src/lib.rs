//! WeCom ("smart robot") callback platform.
//!
//! Bridges the platform's webhook protocol — synchronous encrypted
//! callbacks plus per-turn stream refresh polls — onto the chunk pipeline
//! from `botwire-core`:
//!
//! - [`crypto::Crypt`] — signing and AES-CBC envelope for every payload
//! - [`session::SessionManager`] — per-conversation streaming state
//! - [`bot::Bot`] — the callback orchestrator (`initial` / `refresh`)
//! - [`client::Client`] — active push over one-shot reply URLs
//! - [`routes`] — axum binding for the callback endpoint

pub mod adapter;
pub mod bot;
pub mod client;
pub mod crypto;
pub mod error;
pub mod message;
pub mod routes;
pub mod session;

pub use {
    adapter::{MessageAdapter, StreamEmitter},
    bot::{Bot, BotConfig, CallbackResponse},
    client::Client,
    crypto::{Crypt, CryptoError},
    error::{Error, Result},
    message::{
        EncryptedRequest, EncryptedResponse, Message, StreamReply, build_stream_reply,
    },
    session::{Session, SessionManager},
};
