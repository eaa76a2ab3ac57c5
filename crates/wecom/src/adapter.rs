//! Default [`Adapter`] and [`Emitter`] implementations for the platform.

use std::collections::HashMap;

use botwire_core::{Adapter, Emitter, StreamChunk, Update};

use crate::message::{Message, build_stream_reply};

/// Maps an inbound [`Message`] to a normalized [`Update`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageAdapter;

impl Adapter<Message> for MessageAdapter {
    fn normalize(&self, msg: &Message) -> anyhow::Result<Update> {
        let mut text = msg
            .text
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_default();
        // Group messages often arrive as "@bot /cmd ..."; strip the leading
        // mentions so command routing sees the command first.
        text = strip_leading_mentions(&text);

        let mut metadata = HashMap::from([
            ("platform".to_string(), "wecom".to_string()),
            ("msgtype".to_string(), msg.msg_type.clone()),
        ]);
        if !msg.response_url.is_empty() {
            metadata.insert("response_url".into(), msg.response_url.clone());
        }
        if let Some(stream) = &msg.stream {
            metadata.insert("stream_id".into(), stream.id.clone());
        }

        if msg.msg_type == "event"
            && let Some(event) = &msg.event
        {
            metadata.insert("event_type".into(), event.event_type.clone());

            if event.enter_chat.is_some() {
                // First contact becomes an implicit command.
                text = "/welcome".into();
            } else if let Some(card) = &event.template_card_event {
                metadata.insert("card_type".into(), card.card_type.clone());
                metadata.insert("event_key".into(), card.event_key.clone());
                metadata.insert("task_id".into(), card.task_id.clone());
                // The button key doubles as the command text.
                text = card.event_key.clone();
            } else if let Some(feedback) = &event.feedback_event {
                metadata.insert("feedback_id".into(), feedback.id.clone());
            }
        }

        Ok(Update {
            id: msg.msg_id.clone(),
            sender_id: msg.from.user_id.clone(),
            chat_id: msg.chat_id.clone(),
            chat_type: msg.chat_type.clone(),
            text,
            raw: serde_json::to_value(msg).ok(),
            metadata,
        })
    }
}

/// Drop every leading whitespace-delimited `@mention` token.
fn strip_leading_mentions(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.starts_with('@') {
        return text.to_string();
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let first_non_mention = fields.iter().position(|f| !f.starts_with('@'));
    match first_non_mention {
        Some(idx) => fields[idx..].join(" "),
        None => String::new(),
    }
}

/// Encodes a snapshot chunk as the platform's stream reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamEmitter;

impl Emitter for StreamEmitter {
    fn encode(
        &self,
        _update: &Update,
        stream_id: &str,
        chunk: &StreamChunk,
    ) -> anyhow::Result<serde_json::Value> {
        let reply = build_stream_reply(stream_id, &chunk.content, chunk.is_final);
        Ok(serde_json::to_value(reply)?)
    }
}
