// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Message
//!
//! The `message` module provides the `Message` envelope delivered to actors. The runtime never
//! looks inside the payload: it is carried as opaque bytes and decoded by the handler that knows
//! what the message type means.
//!

use crate::Error;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Immutable message envelope.
///
/// Every message gets a fresh identifier and a creation timestamp. The identifier is only used
/// for correlation and logging. The timestamp says when this message was built and is not an
/// ordering across actors.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    message_type: String,
    payload: Bytes,
    sender: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message with a raw payload.
    ///
    /// # Arguments
    ///
    /// * `message_type` - Tag used by handlers to select behavior.
    /// * `sender` - Identity of the originating actor or external caller.
    /// * `payload` - Opaque payload bytes.
    ///
    pub fn new(
        message_type: impl Into<String>,
        sender: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type: message_type.into(),
            payload: payload.into(),
            sender: sender.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a message with an empty payload.
    pub fn empty(
        message_type: impl Into<String>,
        sender: impl Into<String>,
    ) -> Self {
        Self::new(message_type, sender, Bytes::new())
    }

    /// Creates a message whose payload is the `bincode` encoding of `value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Payload` if the value can not be serialized.
    ///
    pub fn encode<T: Serialize>(
        message_type: impl Into<String>,
        sender: impl Into<String>,
        value: &T,
    ) -> Result<Self, Error> {
        let bytes = bincode::serialize(value)
            .map_err(|e| Error::Payload(e.to_string()))?;
        Ok(Self::new(message_type, sender, bytes))
    }

    /// Decodes the payload as a `bincode` encoded `T`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Payload` if the payload is not a valid `T`.
    ///
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        bincode::deserialize(&self.payload)
            .map_err(|e| Error::Payload(e.to_string()))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct RideRequest {
        passenger: String,
        seats: u8,
    }

    #[test]
    fn test_message_ids_are_unique() {
        let first = Message::empty("ping", "tester");
        let second = Message::empty("ping", "tester");
        assert_ne!(first.id(), second.id());
        assert_eq!(first.message_type(), "ping");
        assert_eq!(first.sender(), "tester");
        assert!(first.payload().is_empty());
        assert!(first.timestamp() <= second.timestamp());
    }

    #[test]
    fn test_typed_payload() {
        let request = RideRequest {
            passenger: "p-1".to_owned(),
            seats: 2,
        };
        let msg = Message::encode("request", "api", &request).unwrap();
        assert_eq!(msg.decode::<RideRequest>().unwrap(), request);
    }

    #[test]
    fn test_decode_garbage_payload() {
        let msg = Message::new("request", "api", vec![0xff_u8]);
        let result = msg.decode::<RideRequest>();
        assert!(matches!(result, Err(Error::Payload(_))));
    }
}
