//! Transfer framing on the data channel
//!
//! A transfer is one text message carrying [`TransferMetadata`] as JSON,
//! followed by binary chunk messages. Chunks carry no framing of their own.

use super::channel::ChannelMessage;
use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Header sent ahead of every file's chunk stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    pub file_name: String,
    pub file_size: u64,
}

impl TransferMetadata {
    pub fn new(file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a metadata frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataParse`] when the text is not a JSON object
    /// with a string `fileName` and a non-negative integer `fileSize`.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::MetadataParse(e.to_string()))
    }
}

/// Inbound message classified once at the protocol boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Metadata(TransferMetadata),
    Chunk(Bytes),
}

impl InboundFrame {
    /// Classify a raw channel message: text is metadata, binary is a chunk
    pub fn decode(message: ChannelMessage) -> Result<Self> {
        match message {
            ChannelMessage::Text(text) => TransferMetadata::from_json(&text).map(Self::Metadata),
            ChannelMessage::Binary(data) => Ok(Self::Chunk(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_wire_shape() {
        let meta = TransferMetadata::new("a.txt", 5);
        assert_eq!(meta.to_json().unwrap(), r#"{"fileName":"a.txt","fileSize":5}"#);
    }

    #[test]
    fn test_metadata_accepts_browser_json() {
        let meta = TransferMetadata::from_json(r#"{"fileName": "photo.jpg", "fileSize": 1048576}"#)
            .unwrap();
        assert_eq!(meta.file_name, "photo.jpg");
        assert_eq!(meta.file_size, 1_048_576);
    }

    #[test]
    fn test_metadata_rejects_malformed() {
        for text in [
            "not json",
            r#"{"fileName": "a.txt"}"#,
            r#"{"fileName": "a.txt", "fileSize": -1}"#,
            r#"{"fileName": 7, "fileSize": 1}"#,
        ] {
            let err = TransferMetadata::from_json(text).unwrap_err();
            assert!(matches!(err, Error::MetadataParse(_)), "{}", text);
        }
    }

    #[test]
    fn test_decode_by_payload_type() {
        let frame = InboundFrame::decode(ChannelMessage::Binary(Bytes::from_static(b"ab"))).unwrap();
        assert_eq!(frame, InboundFrame::Chunk(Bytes::from_static(b"ab")));

        let frame = InboundFrame::decode(ChannelMessage::Text(
            r#"{"fileName":"a","fileSize":2}"#.to_string(),
        ))
        .unwrap();
        assert_eq!(frame, InboundFrame::Metadata(TransferMetadata::new("a", 2)));
    }
}
