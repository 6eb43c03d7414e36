//! Transfer engine tests against the in-memory channel

use peerdrop_core::testing::MemoryChannel;
use peerdrop_core::transfer::{
    send_file, send_path, ChannelMessage, ReceiveMode, ReceivedFiles, TransferMetadata,
    TransferReceiver,
};
use peerdrop_core::{Error, TransferConfig};
use std::sync::Arc;
use std::time::Duration;

/// Initialize tracing for tests (call once per test)
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn deliver(channel: &MemoryChannel, receiver: &mut TransferReceiver, files: &mut ReceivedFiles) {
    for message in channel.take_messages() {
        receiver.on_message(message, files);
    }
}

#[tokio::test]
async fn test_round_trip_fidelity() {
    init_test_tracing();
    let channel = MemoryChannel::open("fileTransfer");
    let config = TransferConfig::default();
    let data = pattern(40_000);

    let report = send_file(
        &channel,
        &TransferMetadata::new("blob.bin", data.len() as u64),
        data.as_slice(),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(report.bytes_sent, 40_000);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.backpressure_waits, 0);

    let sent = channel.sent();
    assert!(matches!(sent[0].message, ChannelMessage::Text(_)));
    assert!(sent[1..].iter().all(|s| s.message.is_binary()));
    assert!(sent[1..].iter().all(|s| s.message.len() <= config.chunk_size));

    let mut receiver = TransferReceiver::new();
    let mut files = ReceivedFiles::new();
    deliver(&channel, &mut receiver, &mut files);

    assert_eq!(files.len(), 1);
    assert_eq!(files.get(0).unwrap().file_name(), "blob.bin");
    assert_eq!(files.get(0).unwrap().data().as_ref(), data.as_slice());
    assert_eq!(receiver.mode(), ReceiveMode::AwaitingMetadata);
}

#[tokio::test]
async fn test_back_to_back_files_arrive_in_order() {
    let channel = MemoryChannel::open("fileTransfer");
    let config = TransferConfig {
        chunk_size: 1000,
        ..Default::default()
    };
    let sizes = [1usize, 999, 1000, 1001, 5000];

    for (i, size) in sizes.iter().enumerate() {
        let data = pattern(*size);
        send_file(
            &channel,
            &TransferMetadata::new(format!("file-{}", i), *size as u64),
            data.as_slice(),
            &config,
        )
        .await
        .unwrap();
    }

    let mut receiver = TransferReceiver::new();
    let mut files = ReceivedFiles::new();
    deliver(&channel, &mut receiver, &mut files);

    assert_eq!(files.len(), sizes.len());
    for (i, file) in files.iter().enumerate() {
        assert_eq!(file.file_name(), format!("file-{}", i));
        assert_eq!(file.data().as_ref(), pattern(sizes[i]).as_slice());
    }
}

#[tokio::test]
async fn test_empty_file_round_trip() {
    let channel = MemoryChannel::open("fileTransfer");
    let report = send_file(
        &channel,
        &TransferMetadata::new("empty.txt", 0),
        &b""[..],
        &TransferConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(report.chunks, 0);

    let mut receiver = TransferReceiver::new();
    let mut files = ReceivedFiles::new();
    deliver(&channel, &mut receiver, &mut files);

    assert_eq!(files.len(), 1);
    assert!(files.get(0).unwrap().is_empty());
    assert_eq!(receiver.mode(), ReceiveMode::AwaitingMetadata);
}

#[tokio::test]
async fn test_send_on_closed_channel_is_rejected() {
    let channel = MemoryChannel::new("fileTransfer");
    let err = send_file(
        &channel,
        &TransferMetadata::new("a.txt", 1),
        &b"a"[..],
        &TransferConfig::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::ChannelNotReady(_)));
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn test_zero_chunk_size_is_rejected_before_sending() {
    let channel = MemoryChannel::open("fileTransfer");
    let config = TransferConfig {
        chunk_size: 0,
        ..Default::default()
    };

    let err = send_file(
        &channel,
        &TransferMetadata::new("a.txt", 5),
        &b"hello"[..],
        &config,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_delays_next_chunk() {
    init_test_tracing();
    let channel = MemoryChannel::open("fileTransfer");
    let config = TransferConfig::default();
    channel.set_buffered(20 * 1024);
    channel.set_drain_per_poll(20 * 1024);

    let report = send_file(
        &channel,
        &TransferMetadata::new("a.bin", 4),
        &b"abcd"[..],
        &config,
    )
    .await
    .unwrap();
    assert_eq!(report.backpressure_waits, 1);

    let sent = channel.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].at - sent[0].at >= config.poll_interval());
}

#[tokio::test(start_paused = true)]
async fn test_channel_closing_mid_send() {
    init_test_tracing();
    let channel = Arc::new(MemoryChannel::open("fileTransfer"));
    channel.set_buffered(1024 * 1024);

    let closer = channel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        closer.set_open(false);
    });

    let err = send_file(
        channel.as_ref(),
        &TransferMetadata::new("a.bin", 4),
        &b"abcd"[..],
        &TransferConfig::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::ChannelClosed(_)));
    assert_eq!(channel.sent().len(), 1);
}

#[tokio::test]
async fn test_send_path_uses_file_name_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv");
    tokio::fs::write(&path, b"a,b\n1,2\n").await.unwrap();

    let channel = MemoryChannel::open("fileTransfer");
    let report = send_path(&channel, &path, &TransferConfig::default())
        .await
        .unwrap();
    assert_eq!(report.file_name, "report.csv");

    let messages = channel.take_messages();
    match &messages[0] {
        ChannelMessage::Text(text) => {
            let meta = TransferMetadata::from_json(text).unwrap();
            assert_eq!(meta, TransferMetadata::new("report.csv", 8));
        }
        other => panic!("expected metadata, got {:?}", other),
    }
}

#[tokio::test]
async fn test_received_files_saved_to_disk() {
    let channel = MemoryChannel::open("fileTransfer");
    let config = TransferConfig::default();
    for (name, body) in [("a.txt", &b"alpha"[..]), ("b.txt", &b"beta"[..])] {
        send_file(&channel, &TransferMetadata::new(name, body.len() as u64), body, &config)
            .await
            .unwrap();
    }

    let mut receiver = TransferReceiver::new();
    let mut files = ReceivedFiles::new();
    deliver(&channel, &mut receiver, &mut files);

    let dir = tempfile::tempdir().unwrap();
    let written = files.save(&[1], dir.path()).await.unwrap();
    assert_eq!(written, vec![dir.path().join("b.txt")]);
    assert_eq!(std::fs::read(&written[0]).unwrap(), b"beta");
}
