//! Send path: metadata frame, then backpressured binary chunks

use super::channel::TransferChannel;
use super::frame::TransferMetadata;
use crate::config::TransferConfig;
use crate::{Error, Result};
use bytes::Bytes;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, instrument, warn};

/// Outcome of a completed send
///
/// Completion means every chunk was handed to the channel, not that the
/// receiver has it; there is no acknowledgment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub file_name: String,
    pub bytes_sent: u64,
    pub chunks: u64,
    /// Number of chunks that had to wait for the channel buffer to drain
    pub backpressure_waits: u64,
}

/// Stream one file over an open channel
///
/// Sends exactly one metadata text frame, then the reader's bytes as binary
/// messages in order. Chunk boundaries follow the reader's natural read size,
/// capped at `config.chunk_size`.
///
/// # Errors
///
/// - [`Error::InvalidConfig`] if `config` fails validation; nothing is sent
/// - [`Error::ChannelNotReady`] if the channel is not open before the first send
/// - [`Error::ChannelClosed`] if the channel closes part-way through
/// - [`Error::Io`] if reading the source fails
///
/// # Example
///
/// ```
/// use peerdrop_core::testing::MemoryChannel;
/// use peerdrop_core::transfer::{send_file, TransferMetadata};
/// use peerdrop_core::TransferConfig;
///
/// # tokio_test::block_on(async {
/// let channel = MemoryChannel::open("fileTransfer");
/// let data: &[u8] = b"hello";
/// let metadata = TransferMetadata::new("hello.txt", data.len() as u64);
///
/// let report = send_file(&channel, &metadata, data, &TransferConfig::default())
///     .await
///     .unwrap();
/// assert_eq!(report.chunks, 1);
/// assert_eq!(channel.take_messages().len(), 2);
/// # });
/// ```
pub async fn send_file<C, R>(
    channel: &C,
    metadata: &TransferMetadata,
    mut reader: R,
    config: &TransferConfig,
) -> Result<SendReport>
where
    C: TransferChannel + ?Sized,
    R: AsyncRead + Unpin + Send,
{
    config.validate()?;

    if !channel.is_open().await {
        return Err(Error::ChannelNotReady(channel.label().to_string()));
    }

    channel.send_text(metadata.to_json()?).await?;
    info!(
        file_name = %metadata.file_name,
        file_size = metadata.file_size,
        channel = channel.label(),
        "Sending file"
    );

    let mut report = SendReport {
        file_name: metadata.file_name.clone(),
        ..Default::default()
    };
    let mut buf = vec![0u8; config.chunk_size];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        if wait_for_drain(channel, config).await? {
            report.backpressure_waits += 1;
        }

        channel.send_binary(Bytes::copy_from_slice(&buf[..n])).await?;
        report.bytes_sent += n as u64;
        report.chunks += 1;
    }

    if report.bytes_sent != metadata.file_size {
        warn!(
            file_name = %metadata.file_name,
            declared = metadata.file_size,
            sent = report.bytes_sent,
            "Source length differs from declared file size"
        );
    }

    info!(
        file_name = %report.file_name,
        bytes = report.bytes_sent,
        chunks = report.chunks,
        "File sent"
    );

    Ok(report)
}

/// Stream a file from disk, using its final path component as the name
pub async fn send_path<C>(channel: &C, path: &Path, config: &TransferConfig) -> Result<SendReport>
where
    C: TransferChannel + ?Sized,
{
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidFileName(path.display().to_string()))?;

    let file = tokio::fs::File::open(path).await?;
    let file_size = file.metadata().await?.len();

    send_file(
        channel,
        &TransferMetadata::new(file_name, file_size),
        file,
        config,
    )
    .await
}

/// Hold the next chunk while the channel buffer is above the threshold
///
/// Returns whether any waiting happened.
#[instrument(level = "debug", skip_all, fields(channel = channel.label()))]
async fn wait_for_drain<C>(channel: &C, config: &TransferConfig) -> Result<bool>
where
    C: TransferChannel + ?Sized,
{
    let mut waited = false;

    loop {
        if !channel.is_open().await {
            return Err(Error::ChannelClosed(channel.label().to_string()));
        }

        let buffered = channel.buffered_amount().await;
        if buffered <= config.backpressure_threshold {
            return Ok(waited);
        }

        if !waited {
            debug!(
                buffered,
                threshold = config.backpressure_threshold,
                "Applying backpressure - waiting for buffer to drain"
            );
        }
        waited = true;
        tokio::time::sleep(config.poll_interval()).await;
    }
}
