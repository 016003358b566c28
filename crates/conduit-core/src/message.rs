//! The message envelope carried by channels.
//!
//! A [`Message`] pairs an immutable payload with [`MessageHeaders`]. Ownership
//! of the envelope moves from the producer into the channel and from the
//! channel to exactly one consumer; nothing hands out mutable access to a
//! payload once the envelope exists.
//!
//! ```rust,ignore
//! use conduit_core::{Message, MessageBuilder};
//!
//! let plain = Message::new("testing");
//!
//! let reply = MessageBuilder::with_payload(42)
//!     .correlation_id(plain.headers().id().to_string())
//!     .header("priority", 7)
//!     .build()?;
//! ```

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ChannelError, ChannelResult};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// Headers
// ============================================================================

/// Metadata attached to every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeaders {
    id: Uuid,
    timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<String, Value>,
}

impl MessageHeaders {
    fn fresh() -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: now_millis(),
            correlation_id: None,
            expiration: None,
            values: BTreeMap::new(),
        }
    }

    /// Unique identifier of the envelope.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Identifier linking this message to another one, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Expiration time in milliseconds since the Unix epoch, if set.
    pub fn expiration(&self) -> Option<u64> {
        self.expiration
    }

    /// Returns `true` if the message carries an expiration that lies before `now`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expiration.is_some_and(|exp| exp < now)
    }

    /// Returns `true` if the message has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Looks up a custom header.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns `true` if the custom header is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates over the custom headers in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of custom headers.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no custom headers.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Message
// ============================================================================

/// An immutable envelope around a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T> {
    headers: MessageHeaders,
    payload: T,
}

impl<T> Message<T> {
    /// Wraps a payload with freshly generated headers.
    pub fn new(payload: T) -> Self {
        Self {
            headers: MessageHeaders::fresh(),
            payload,
        }
    }

    /// Returns the payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Returns the headers.
    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    /// Shortcut for `headers().id()`.
    pub fn id(&self) -> Uuid {
        self.headers.id
    }

    /// Consumes the envelope, returning the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Consumes the envelope, returning headers and payload.
    pub fn into_parts(self) -> (MessageHeaders, T) {
        (self.headers, self.payload)
    }

    /// Builds a new envelope with a transformed payload and the same headers.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Message<U> {
        Message {
            headers: self.headers,
            payload: f(self.payload),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Incrementally assembles a [`Message`].
///
/// Unlike [`Message::new`], the builder can be left without a payload; such a
/// builder fails on [`build`](Self::build) with
/// [`ChannelError::InvalidArgument`].
#[derive(Debug, Clone)]
pub struct MessageBuilder<T> {
    payload: Option<T>,
    correlation_id: Option<String>,
    expiration: Option<u64>,
    values: BTreeMap<String, Value>,
}

impl<T> Default for MessageBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageBuilder<T> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            payload: None,
            correlation_id: None,
            expiration: None,
            values: BTreeMap::new(),
        }
    }

    /// Creates a builder holding the given payload.
    pub fn with_payload(payload: T) -> Self {
        Self::new().payload(payload)
    }

    /// Sets or replaces the payload.
    pub fn payload(mut self, payload: T) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the correlation identifier.
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the expiration time (milliseconds since the Unix epoch).
    pub fn expiration(mut self, at_millis: u64) -> Self {
        self.expiration = Some(at_millis);
        self
    }

    /// Adds a custom header, replacing any previous value for `key`.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Copies the correlation id, expiration and custom headers of `headers`.
    ///
    /// Identity and timestamp are never copied; the built message gets its own.
    pub fn copy_headers(mut self, headers: &MessageHeaders) -> Self {
        if headers.correlation_id.is_some() {
            self.correlation_id.clone_from(&headers.correlation_id);
        }
        if headers.expiration.is_some() {
            self.expiration = headers.expiration;
        }
        for (key, value) in &headers.values {
            self.values.insert(key.clone(), value.clone());
        }
        self
    }

    /// Builds the message.
    pub fn build(self) -> ChannelResult<Message<T>> {
        let payload = self
            .payload
            .ok_or_else(|| ChannelError::invalid_argument("message payload must not be null"))?;

        let mut headers = MessageHeaders::fresh();
        headers.correlation_id = self.correlation_id;
        headers.expiration = self.expiration;
        headers.values = self.values;

        Ok(Message { headers, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_has_unique_id() {
        let a = Message::new("a");
        let b = Message::new("a");
        assert_ne!(a.id(), b.id());
        assert!(a.headers().timestamp() > 0);
    }

    #[test]
    fn test_builder_without_payload_is_rejected() {
        let result = MessageBuilder::<String>::new().header("k", "v").build();
        assert!(matches!(result, Err(ChannelError::InvalidArgument(_))));
    }

    #[test]
    fn test_builder_headers() {
        let msg = MessageBuilder::with_payload(1)
            .correlation_id("abc")
            .header("priority", 3)
            .build()
            .unwrap();

        assert_eq!(*msg.payload(), 1);
        assert_eq!(msg.headers().correlation_id(), Some("abc"));
        assert_eq!(msg.headers().get("priority"), Some(&Value::from(3)));
        assert_eq!(msg.headers().len(), 1);
    }

    #[test]
    fn test_copy_headers_keeps_new_identity() {
        let original = MessageBuilder::with_payload("x")
            .correlation_id("c-1")
            .expiration(10)
            .header("trace", "on")
            .build()
            .unwrap();

        let copy = MessageBuilder::with_payload("y")
            .copy_headers(original.headers())
            .build()
            .unwrap();

        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.headers().correlation_id(), Some("c-1"));
        assert_eq!(copy.headers().expiration(), Some(10));
        assert!(copy.headers().contains("trace"));
    }

    #[test]
    fn test_expiration() {
        let msg = MessageBuilder::with_payload(()).expiration(100).build().unwrap();
        assert!(msg.headers().is_expired_at(101));
        assert!(!msg.headers().is_expired_at(100));
        assert!(!Message::new(()).headers().is_expired());
    }

    #[test]
    fn test_map_preserves_headers() {
        let msg = Message::new(2);
        let id = msg.id();
        let mapped = msg.map(|n| n.to_string());
        assert_eq!(mapped.id(), id);
        assert_eq!(mapped.payload(), "2");
    }

    #[test]
    fn test_headers_serialize() {
        let msg = MessageBuilder::with_payload("p")
            .header("k", "v")
            .build()
            .unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["payload"], "p");
        assert_eq!(json["headers"]["values"]["k"], "v");
        assert!(json["headers"].get("correlation_id").is_none());
    }
}
