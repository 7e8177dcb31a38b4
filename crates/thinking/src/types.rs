use crate::aggregate::ThinkingView;
use crate::streaming::PartStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TEXT_DELTA_TYPE: &str = "text-delta";
pub const REASONING_TYPE: &str = "reasoning";

/// One element of a model response stream.
///
/// Parts are JSON-shaped and keyed by their `type` field. Only text deltas
/// and reasoning parts are understood, everything else is carried as the raw
/// value so it can be passed along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum StreamPart {
    /// `{"type": "text-delta", "textDelta": ...}`
    TextDelta(TextDeltaPart),
    /// `{"type": "reasoning", "reasoning": {...}}`
    Reasoning(ReasoningPart),
    /// Any part this crate does not interpret
    Other(Value),
}

/// Visible text fragment. Providers disagree on the payload field name, so
/// all three spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextDeltaPart {
    pub text_delta: Option<String>,
    pub delta: Option<String>,
    pub text: Option<String>,
    /// Remaining fields, kept as received
    pub extra: Map<String, Value>,
}

impl TextDeltaPart {
    /// The payload of this part, checking `textDelta`, `delta` and `text` in
    /// that order. Empty when none of them is set.
    pub fn delta(&self) -> &str {
        self.text_delta
            .as_deref()
            .or(self.delta.as_deref())
            .or(self.text.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningPart {
    pub reasoning: ReasoningPayload,
    pub extra: Map<String, Value>,
}

/// Nested payload of a reasoning part
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningPayload {
    pub kind: Option<String>,
    pub text_delta: Option<String>,
    pub text: Option<String>,
    pub extra: Map<String, Value>,
}

impl ReasoningPart {
    pub fn text(&self) -> &str {
        self.reasoning
            .text_delta
            .as_deref()
            .or(self.reasoning.text.as_deref())
            .unwrap_or_default()
    }
}

impl StreamPart {
    /// Visible text part in the canonical `textDelta` spelling
    pub fn text_delta(text: impl Into<String>) -> Self {
        StreamPart::TextDelta(TextDeltaPart {
            text_delta: Some(text.into()),
            ..Default::default()
        })
    }

    /// Reasoning part in the default nested shape
    pub fn reasoning(text: impl Into<String>) -> Self {
        StreamPart::Reasoning(ReasoningPart {
            reasoning: ReasoningPayload {
                kind: Some(TEXT_DELTA_TYPE.to_string()),
                text_delta: Some(text.into()),
                ..Default::default()
            },
            extra: Map::new(),
        })
    }

    pub fn is_text_delta(&self) -> bool {
        matches!(self, StreamPart::TextDelta(_))
    }

    /// Text payload if this is a text delta
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StreamPart::TextDelta(part) => Some(part.delta()),
            _ => None,
        }
    }

    /// Text payload if this is a reasoning part
    pub fn as_reasoning(&self) -> Option<&str> {
        match self {
            StreamPart::Reasoning(part) => Some(part.text()),
            _ => None,
        }
    }
}

/// Removes `key` from `map` if it holds a string. Non-string values stay in
/// the map so they survive a round trip.
fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            map.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

fn put_string(map: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value));
    }
}

impl From<Value> for StreamPart {
    fn from(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return StreamPart::Other(value);
        };

        let kind = map.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some(TEXT_DELTA_TYPE) => {
                map.remove("type");
                let text_delta = take_string(&mut map, "textDelta");
                let delta = take_string(&mut map, "delta");
                let text = take_string(&mut map, "text");
                StreamPart::TextDelta(TextDeltaPart {
                    text_delta,
                    delta,
                    text,
                    extra: map,
                })
            }
            Some(REASONING_TYPE) => match map.remove("reasoning") {
                Some(Value::Object(mut payload)) => {
                    map.remove("type");
                    let kind = take_string(&mut payload, "type");
                    let text_delta = take_string(&mut payload, "textDelta");
                    let text = take_string(&mut payload, "text");
                    StreamPart::Reasoning(ReasoningPart {
                        reasoning: ReasoningPayload {
                            kind,
                            text_delta,
                            text,
                            extra: payload,
                        },
                        extra: map,
                    })
                }
                other => {
                    if let Some(other) = other {
                        map.insert("reasoning".into(), other);
                    }
                    StreamPart::Other(Value::Object(map))
                }
            },
            _ => StreamPart::Other(Value::Object(map)),
        }
    }
}

impl From<StreamPart> for Value {
    fn from(part: StreamPart) -> Self {
        match part {
            StreamPart::TextDelta(part) => {
                let mut map = part.extra;
                map.insert("type".into(), Value::String(TEXT_DELTA_TYPE.into()));
                put_string(&mut map, "textDelta", part.text_delta);
                put_string(&mut map, "delta", part.delta);
                put_string(&mut map, "text", part.text);
                Value::Object(map)
            }
            StreamPart::Reasoning(part) => {
                let mut payload = part.reasoning.extra;
                put_string(&mut payload, "type", part.reasoning.kind);
                put_string(&mut payload, "textDelta", part.reasoning.text_delta);
                put_string(&mut payload, "text", part.reasoning.text);

                let mut map = part.extra;
                map.insert("type".into(), Value::String(REASONING_TYPE.into()));
                map.insert("reasoning".into(), Value::Object(payload));
                Value::Object(map)
            }
            StreamPart::Other(value) => value,
        }
    }
}

/// Response produced by the wrapped handler.
///
/// Only `text`, `stream`, `reasoning` and `thinking` are touched when the
/// response passes through the thinking middleware. Everything else the
/// handler returns lives in `extra`.
#[derive(Debug, Default)]
pub struct ModelResponse {
    pub text: Option<String>,
    pub stream: Option<PartStream>,
    pub reasoning: Option<Value>,
    /// Read-only view of all reasoning collected for this response
    pub thinking: Option<ThinkingView>,
    pub extra: Map<String, Value>,
}

impl ModelResponse {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_stream(stream: PartStream) -> Self {
        Self {
            stream: Some(stream),
            ..Default::default()
        }
    }

    /// Current reasoning aggregate, empty if none was attached
    pub fn thinking(&self) -> String {
        self.thinking
            .as_ref()
            .map(ThinkingView::get)
            .unwrap_or_default()
    }

    /// The `reasoning` field if it holds a string
    pub fn reasoning_text(&self) -> Option<&str> {
        self.reasoning.as_ref().and_then(Value::as_str)
    }
}

/// Usage errors. These are returned to the caller immediately and abort the
/// current call.
#[derive(Debug, thiserror::Error)]
pub enum ThinkingError {
    #[error("Invalid thinking tag name: {0:?}")]
    InvalidTagName(String),

    #[error("Push streams need a tokio runtime, none is running on this thread")]
    RuntimeUnavailable,
}
