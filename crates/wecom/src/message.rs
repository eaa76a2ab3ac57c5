//! Wire model for the platform's callback protocol.
//!
//! Inbound callbacks decrypt to a [`Message`]; replies are plain serde
//! structs encrypted back into an [`EncryptedResponse`].

use serde::{Deserialize, Serialize};

// ── Inbound message ──────────────────────────────────────────────────────────

/// A decrypted inbound callback message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Platform-unique message ID.
    #[serde(rename = "msgid")]
    pub msg_id: String,
    #[serde(rename = "create_time", skip_serializing_if = "is_zero")]
    pub create_time: i64,
    /// Robot ID the callback targets.
    #[serde(rename = "aibotid", skip_serializing_if = "String::is_empty")]
    pub aibot_id: String,
    /// Group or DM conversation ID.
    #[serde(rename = "chatid")]
    pub chat_id: String,
    /// Conversation kind: "single" or "chatroom".
    #[serde(rename = "chattype", skip_serializing_if = "String::is_empty")]
    pub chat_type: String,
    /// Who triggered the callback.
    pub from: MessageSender,
    /// One-shot URL for active replies (present on some events).
    #[serde(rename = "response_url", skip_serializing_if = "String::is_empty")]
    pub response_url: String,
    /// One of: text, image, voice, file, mixed, stream, event.
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoicePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FilePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixed: Option<MixedPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuotePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventPayload>,
    /// Smart-app callbacks can carry interactive attachments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentPayload>,
}

impl Message {
    /// Parse a decrypted plaintext callback body.
    pub fn parse(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// The stream session ID carried by a refresh callback, if any.
    pub fn stream_id(&self) -> Option<&str> {
        self.stream.as_ref().map(|s| s.id.as_str())
    }
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSender {
    #[serde(rename = "userid")]
    pub user_id: String,
    /// Corp ID, returned on some events.
    #[serde(rename = "corpid", skip_serializing_if = "String::is_empty")]
    pub corp_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextPayload {
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagePayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Used on stream replies.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub base64: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub md5: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoicePayload {
    /// Speech-to-text content.
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilePayload {
    pub url: String,
}

/// Mixed text-and-image message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MixedPayload {
    #[serde(rename = "msg_item")]
    pub items: Vec<MixedItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MixedItem {
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
}

/// Stream refresh-poll payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamPayload {
    pub id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub finish: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    /// Stream close may carry rich content.
    #[serde(rename = "msg_item", skip_serializing_if = "Vec::is_empty")]
    pub msg_item: Vec<MixedItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotePayload {
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixed: Option<MixedPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoicePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FilePayload>,
}

// ── Events ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventPayload {
    #[serde(rename = "eventtype")]
    pub event_type: String,
    /// Present when the user opens the chat for the first time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enter_chat: Option<EnterChatEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_card_event: Option<TemplateCardEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_event: Option<FeedbackEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnterChatEvent {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateCardEvent {
    pub card_type: String,
    /// Key of the button the user clicked.
    pub event_key: String,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_items: Option<SelectedItems>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectedItems {
    pub selected_item: Vec<SelectedItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectedItem {
    pub question_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_ids: Option<OptionIds>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionIds {
    pub option_id: Vec<String>,
}

/// User feedback on a bot reply (1: accurate, 2: inaccurate, 3: withdrawn).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inaccurate_reason_list: Vec<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentPayload {
    pub callback_id: String,
    pub actions: Vec<AttachmentAction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentAction {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

// ── Encrypted envelope ───────────────────────────────────────────────────────

/// The encrypted POST callback body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptedRequest {
    pub encrypt: String,
}

/// The encrypted reply envelope written back to the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptedResponse {
    pub encrypt: String,
    pub msgsignature: String,
    pub timestamp: String,
    pub nonce: String,
}

// ── Outbound reply shapes ────────────────────────────────────────────────────

/// Stream reply plaintext.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamReply {
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    pub stream: StreamReplyBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamReplyBody {
    pub id: String,
    pub finish: bool,
    /// Complete accumulated text, not a delta.
    pub content: String,
    #[serde(rename = "msg_item", skip_serializing_if = "Vec::is_empty", default)]
    pub msg_item: Vec<MixedItem>,
}

/// Passive text reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMessage {
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    pub text: TextPayload,
}

impl TextMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            msg_type: "text".into(),
            text: TextPayload {
                content: content.into(),
            },
        }
    }
}

/// Active markdown push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownMessage {
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    pub markdown: MarkdownPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkdownPayload {
    pub content: String,
}

impl MarkdownMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            msg_type: "markdown".into(),
            markdown: MarkdownPayload {
                content: content.into(),
            },
        }
    }
}

/// Passive template-card reply. The card body is platform-defined JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateCardMessage {
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    pub template_card: serde_json::Value,
}

impl TemplateCardMessage {
    pub fn new(card: serde_json::Value) -> Self {
        Self {
            msg_type: "template_card".into(),
            template_card: card,
        }
    }
}

/// Passive stream reply that also carries a template card (stream close).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamWithTemplateCardMessage {
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    pub stream: StreamReplyBody,
    pub template_card: serde_json::Value,
}

impl StreamWithTemplateCardMessage {
    pub fn new(stream: StreamReplyBody, card: serde_json::Value) -> Self {
        Self {
            msg_type: "stream".into(),
            stream,
            template_card: card,
        }
    }
}

/// Instruction to update a previously sent template card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTemplateCardMessage {
    /// Always "update_template_card".
    pub response_type: String,
    #[serde(rename = "userids", skip_serializing_if = "Vec::is_empty", default)]
    pub user_ids: Vec<String>,
    pub template_card: serde_json::Value,
}

impl UpdateTemplateCardMessage {
    pub fn new(user_ids: Vec<String>, card: serde_json::Value) -> Self {
        Self {
            response_type: "update_template_card".into(),
            user_ids,
            template_card: card,
        }
    }
}

/// Build a stream reply carrying the latest complete content.
pub fn build_stream_reply(stream_id: &str, content: &str, finish: bool) -> StreamReply {
    StreamReply {
        msg_type: "stream".into(),
        stream: StreamReplyBody {
            id: stream_id.to_string(),
            finish,
            content: content.to_string(),
            msg_item: Vec::new(),
        },
    }
}
