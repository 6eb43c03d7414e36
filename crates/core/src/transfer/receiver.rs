//! Receive path: one framing cursor per data channel
//!
//! The cursor alternates between waiting for a metadata frame and collecting
//! chunks until the running byte total reaches the declared size. Transfers
//! on one channel are strictly sequential.

use super::channel::ChannelMessage;
use super::files::{ReceivedFile, ReceivedFiles};
use super::frame::{InboundFrame, TransferMetadata};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

/// Public view of the cursor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMode {
    AwaitingMetadata,
    ReceivingChunks,
}

#[derive(Debug)]
enum ReceiveState {
    AwaitingMetadata,
    ReceivingChunks {
        metadata: TransferMetadata,
        received: u64,
        chunks: Vec<Bytes>,
    },
}

/// What one inbound message did to the cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveProgress {
    /// Metadata parsed; chunks for this file come next
    MetadataAccepted(TransferMetadata),
    /// Chunk appended; file not complete yet
    ChunkBuffered { received: u64, expected: u64 },
    /// Running total reached the declared size
    Completed(ReceivedFile),
}

/// Per-channel transfer receive cursor
#[derive(Debug)]
pub struct TransferReceiver {
    state: ReceiveState,
}

impl Default for TransferReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferReceiver {
    pub fn new() -> Self {
        Self {
            state: ReceiveState::AwaitingMetadata,
        }
    }

    pub fn mode(&self) -> ReceiveMode {
        match self.state {
            ReceiveState::AwaitingMetadata => ReceiveMode::AwaitingMetadata,
            ReceiveState::ReceivingChunks { .. } => ReceiveMode::ReceivingChunks,
        }
    }

    /// File currently in flight and bytes received for it so far
    pub fn in_flight(&self) -> Option<(&TransferMetadata, u64)> {
        match &self.state {
            ReceiveState::AwaitingMetadata => None,
            ReceiveState::ReceivingChunks {
                metadata, received, ..
            } => Some((metadata, *received)),
        }
    }

    /// Apply one inbound message, in arrival order
    ///
    /// On error the cursor is left exactly as it was.
    ///
    /// # Errors
    ///
    /// - [`Error::MetadataParse`] for a malformed text frame, or a binary
    ///   frame while metadata is expected; the next message is tried as
    ///   metadata again
    /// - [`Error::UnexpectedFrame`] for a metadata frame in the middle of a
    ///   file's chunks; it is dropped
    pub fn handle_message(&mut self, message: ChannelMessage) -> Result<ReceiveProgress> {
        let frame = InboundFrame::decode(message)?;

        let state = std::mem::replace(&mut self.state, ReceiveState::AwaitingMetadata);
        match (state, frame) {
            (ReceiveState::AwaitingMetadata, InboundFrame::Metadata(metadata)) => {
                info!(
                    file_name = %metadata.file_name,
                    file_size = metadata.file_size,
                    "Receiving file"
                );

                if metadata.file_size == 0 {
                    return Ok(ReceiveProgress::Completed(ReceivedFile::new(
                        metadata.file_name,
                        0,
                        Bytes::new(),
                    )));
                }

                self.state = ReceiveState::ReceivingChunks {
                    metadata: metadata.clone(),
                    received: 0,
                    chunks: Vec::new(),
                };
                Ok(ReceiveProgress::MetadataAccepted(metadata))
            }
            (ReceiveState::AwaitingMetadata, InboundFrame::Chunk(data)) => {
                Err(Error::MetadataParse(format!(
                    "expected metadata text frame, got {}-byte binary message",
                    data.len()
                )))
            }
            (
                ReceiveState::ReceivingChunks {
                    metadata,
                    received,
                    chunks,
                },
                InboundFrame::Metadata(next),
            ) => {
                let error = Error::UnexpectedFrame(format!(
                    "metadata for {:?} while receiving {:?}",
                    next.file_name, metadata.file_name
                ));
                self.state = ReceiveState::ReceivingChunks {
                    metadata,
                    received,
                    chunks,
                };
                Err(error)
            }
            (
                ReceiveState::ReceivingChunks {
                    metadata,
                    mut received,
                    mut chunks,
                },
                InboundFrame::Chunk(data),
            ) => {
                received += data.len() as u64;
                chunks.push(data);
                debug!(
                    received,
                    expected = metadata.file_size,
                    "Receiving data"
                );

                if received < metadata.file_size {
                    let expected = metadata.file_size;
                    self.state = ReceiveState::ReceivingChunks {
                        metadata,
                        received,
                        chunks,
                    };
                    return Ok(ReceiveProgress::ChunkBuffered { received, expected });
                }

                let file = assemble(metadata, chunks);
                if file.overshoot() > 0 {
                    warn!(
                        file_name = %file.file_name(),
                        declared = file.declared_size(),
                        received = file.len(),
                        "Received more bytes than declared; keeping the excess in the file"
                    );
                }
                info!(file_name = %file.file_name(), bytes = file.len(), "File received");
                Ok(ReceiveProgress::Completed(file))
            }
        }
    }

    /// Apply one inbound message and store any completed file
    ///
    /// Errors are logged and swallowed, matching the channel's fire-and-forget
    /// message handler. Returns the index of a file completed by this message.
    pub fn on_message(&mut self, message: ChannelMessage, files: &mut ReceivedFiles) -> Option<usize> {
        match self.handle_message(message) {
            Ok(ReceiveProgress::Completed(file)) => Some(files.push(file)),
            Ok(_) => None,
            Err(e) => {
                warn!("Dropped data channel message: {}", e);
                None
            }
        }
    }
}

fn assemble(metadata: TransferMetadata, chunks: Vec<Bytes>) -> ReceivedFile {
    let total = chunks.iter().map(Bytes::len).sum();
    let mut blob = BytesMut::with_capacity(total);
    for chunk in chunks {
        blob.extend_from_slice(&chunk);
    }
    ReceivedFile::new(metadata.file_name, metadata.file_size, blob.freeze())
}
