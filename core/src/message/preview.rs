use super::{tagged_fields, EnvelopeError, Message, MessageId, WireEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events raised by the preview process. Payloads are relayed untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum PreviewMessage {
    ElementSelected(Value),
    ElementHighlighted(Value),
    ElementUnhighlighted(Value),
}

/// Maps every preview event onto the host vocabulary.
impl From<PreviewMessage> for Message {
    fn from(message: PreviewMessage) -> Self {
        match message {
            PreviewMessage::ElementSelected(payload) => Message::SelectElement(payload),
            PreviewMessage::ElementHighlighted(payload) => Message::HighlightElement(payload),
            PreviewMessage::ElementUnhighlighted(payload) => Message::UnhighlightElement(payload),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewEnvelope {
    pub id: MessageId,
    pub message: PreviewMessage,
}

impl PreviewEnvelope {
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let (id, message) = WireEnvelope::parse(text)?.into_parts()?;
        Ok(Self { id, message })
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        let mut fields = tagged_fields(&self.message)?;
        fields.insert("id".into(), Value::String(self.id.to_string()));
        Ok(serde_json::to_string(&fields)?)
    }
}

impl From<PreviewEnvelope> for super::Envelope {
    /// Keeps the correlation id, translates the type.
    fn from(envelope: PreviewEnvelope) -> Self {
        super::Envelope {
            id: envelope.id,
            message: envelope.message.into(),
        }
    }
}
