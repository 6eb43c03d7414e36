//! Per-peer event loop
//!
//! [`PeerClient`] owns the negotiator and the transfer receive cursor and
//! runs on one task: relay frames, peer events and user commands are handled
//! one at a time, in arrival order. Outgoing files are queued to a send
//! worker spawned per connected session, so a long send never blocks
//! signaling and files go out strictly one after another.
//!
//! [`PeerClientHandle`] is the cloneable front end used by callers.

use crate::config::PeerConfig;
use crate::connection::RtcPeerConnector;
use crate::signaling::connect_relay;
use parking_lot::Mutex;
use peerdrop_core::transfer::{
    send_path, ReceivedFile, ReceivedFiles, SendReport, TransferChannel, TransferReceiver,
};
use peerdrop_core::{
    ClientId, ClientMessage, Error, NegotiationState, Negotiator, PeerConnector, Result,
    ServerMessage, SessionUpdate, TransferConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Snapshot of a peer client, published after every handled input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    /// Identity assigned by the relay
    pub local_id: Option<ClientId>,
    /// Other connected clients, from the latest registry snapshot
    pub peers: Vec<ClientId>,
    /// Whether any registry snapshot has arrived yet
    pub registry_received: bool,
    pub state: NegotiationState,
    pub remote_id: Option<ClientId>,
    /// Number of files received so far
    pub received: usize,
    /// False once the event loop has stopped
    pub running: bool,
}

impl PeerStatus {
    fn initial() -> Self {
        Self {
            local_id: None,
            peers: Vec::new(),
            registry_received: false,
            state: NegotiationState::Idle,
            remote_id: None,
            received: 0,
            running: true,
        }
    }
}

enum Command {
    ConnectTo {
        target: ClientId,
        reply: oneshot::Sender<Result<()>>,
    },
    Send(SendJob),
    Shutdown,
}

enum SendJob {
    File {
        path: PathBuf,
        reply: oneshot::Sender<Result<SendReport>>,
    },
    Flush {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Event loop of one peer
pub struct PeerClient<C: PeerConnector> {
    negotiator: Negotiator<C>,
    inbound: mpsc::UnboundedReceiver<ServerMessage>,
    commands: mpsc::Receiver<Command>,
    receiver: TransferReceiver,
    files: Arc<Mutex<ReceivedFiles>>,
    send_queue: Option<mpsc::UnboundedSender<SendJob>>,
    registry_received: bool,
    status: watch::Sender<PeerStatus>,
    transfer: TransferConfig,
}

impl PeerClient<RtcPeerConnector> {
    /// Connect to the relay and start a WebRTC peer in the background
    pub async fn start(config: PeerConfig) -> Result<PeerClientHandle> {
        config.validate()?;

        let relay = connect_relay(&config.relay_url).await?;
        let transfer = config.transfer.clone();
        let (client, handle) = PeerClient::new(
            RtcPeerConnector::new(config),
            relay.outbound,
            relay.inbound,
            transfer,
        );
        tokio::spawn(client.run());

        Ok(handle)
    }
}

impl<C> PeerClient<C>
where
    C: PeerConnector + 'static,
{
    /// Build a client over a relay connection's two directions
    pub fn new(
        connector: C,
        outbound: mpsc::UnboundedSender<ClientMessage>,
        inbound: mpsc::UnboundedReceiver<ServerMessage>,
        transfer: TransferConfig,
    ) -> (Self, PeerClientHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(PeerStatus::initial());
        let files = Arc::new(Mutex::new(ReceivedFiles::new()));

        let client = Self {
            negotiator: Negotiator::new(connector, outbound),
            inbound,
            commands: command_rx,
            receiver: TransferReceiver::new(),
            files: files.clone(),
            send_queue: None,
            registry_received: false,
            status: status_tx,
            transfer,
        };

        let handle = PeerClientHandle {
            commands: command_tx,
            status: status_rx,
            files,
        };

        (client, handle)
    }

    /// Run until shutdown, every handle is dropped, or the relay goes away
    pub async fn run(mut self) {
        info!("Peer client started");

        loop {
            tokio::select! {
                frame = self.inbound.recv() => match frame {
                    Some(message) => {
                        if matches!(message, ServerMessage::Clients(_)) {
                            self.registry_received = true;
                        }
                        let result = self.negotiator.handle_server_message(message).await;
                        self.apply(result).await;
                    }
                    None => {
                        warn!("Relay connection closed");
                        break;
                    }
                },
                event = self.negotiator.next_peer_event() => {
                    let result = self.negotiator.handle_peer_event(event).await;
                    self.apply(result).await;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.execute(command).await,
                },
            }

            self.publish();
        }

        self.end_session();
        self.negotiator.reset().await;
        self.publish();
        self.status.send_modify(|status| status.running = false);
        info!("Peer client stopped");
    }

    async fn apply(&mut self, result: Result<SessionUpdate>) {
        match result {
            Ok(SessionUpdate::Message(message)) => {
                let completed = self.receiver.on_message(message, &mut self.files.lock());
                if let Some(index) = completed {
                    debug!(index, "Received file stored");
                }
            }
            Ok(SessionUpdate::Connected) => self.begin_session(),
            Ok(SessionUpdate::Closed) => self.end_session(),
            Ok(SessionUpdate::Failed(reason)) => {
                warn!(reason = %reason, "Peer session failed");
            }
            Ok(SessionUpdate::None) | Ok(SessionUpdate::PeersChanged) => {}
            Err(e) => warn!("Ignored: {}", e),
        }

        if self.negotiator.state() == NegotiationState::Failed {
            self.end_session();
            self.negotiator.reset().await;
        }
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::ConnectTo { target, reply } => {
                let result = self.negotiator.connect_to(&target).await;
                if self.negotiator.state() == NegotiationState::Failed {
                    self.negotiator.reset().await;
                }
                let _ = reply.send(result);
            }
            Command::Send(job) => match &self.send_queue {
                Some(queue) => {
                    if let Err(mpsc::error::SendError(job)) = queue.send(job) {
                        self.reject(job);
                    }
                }
                None => self.reject(job),
            },
            Command::Shutdown => {}
        }
    }

    fn reject(&self, job: SendJob) {
        let error = || Error::ChannelNotReady(self.transfer.channel_label.clone());
        match job {
            SendJob::File { reply, .. } => {
                let _ = reply.send(Err(error()));
            }
            SendJob::Flush { reply } => {
                let _ = reply.send(Err(error()));
            }
        }
    }

    /// Send worker for a newly connected channel
    ///
    /// The receive cursor is left alone: messages can arrive before the open
    /// event and already belong to this session.
    fn begin_session(&mut self) {
        if let Some(channel) = self.negotiator.channel() {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(send_worker(channel, self.transfer.clone(), rx));
            self.send_queue = Some(tx);
        }
    }

    fn end_session(&mut self) {
        if let Some((metadata, received)) = self.receiver.in_flight() {
            warn!(
                file_name = %metadata.file_name,
                received,
                expected = metadata.file_size,
                "Session ended mid-transfer; partial file discarded"
            );
        }
        self.receiver = TransferReceiver::new();
        self.send_queue = None;
    }

    fn publish(&self) {
        let next = PeerStatus {
            local_id: self.negotiator.local_id().map(str::to_string),
            peers: self.negotiator.available_peers(),
            registry_received: self.registry_received,
            state: self.negotiator.state(),
            remote_id: self.negotiator.remote_id().map(str::to_string),
            received: self.files.lock().len(),
            running: true,
        };

        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

async fn send_worker<Ch>(
    channel: Arc<Ch>,
    config: TransferConfig,
    mut jobs: mpsc::UnboundedReceiver<SendJob>,
) where
    Ch: TransferChannel + 'static,
{
    debug!(channel = channel.label(), "Send worker started");

    while let Some(job) = jobs.recv().await {
        match job {
            SendJob::File { path, reply } => {
                let result = send_path(channel.as_ref(), &path, &config).await;
                if let Err(e) = &result {
                    warn!(path = %path.display(), "File send failed: {}", e);
                }
                let _ = reply.send(result);
            }
            SendJob::Flush { reply } => {
                let _ = reply.send(wait_until_flushed(channel.as_ref(), &config).await);
            }
        }
    }

    debug!(channel = channel.label(), "Send worker stopped");
}

async fn wait_until_flushed<Ch>(channel: &Ch, config: &TransferConfig) -> Result<()>
where
    Ch: TransferChannel + ?Sized,
{
    loop {
        if !channel.is_open().await {
            return Err(Error::ChannelClosed(channel.label().to_string()));
        }
        if channel.buffered_amount().await == 0 {
            return Ok(());
        }
        tokio::time::sleep(config.poll_interval()).await;
    }
}

fn stopped() -> Error {
    Error::Signaling("peer client stopped".to_string())
}

/// Cloneable handle to a running [`PeerClient`]
#[derive(Clone)]
pub struct PeerClientHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<PeerStatus>,
    files: Arc<Mutex<ReceivedFiles>>,
}

impl PeerClientHandle {
    pub fn status(&self) -> PeerStatus {
        self.status.borrow().clone()
    }

    /// Identity assigned by the relay, once known
    pub fn local_id(&self) -> Option<ClientId> {
        self.status.borrow().local_id.clone()
    }

    /// Other connected clients
    pub fn peers(&self) -> Vec<ClientId> {
        self.status.borrow().peers.clone()
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<PeerStatus>
    where
        F: FnMut(&PeerStatus) -> bool,
    {
        let mut status = self.status.clone();
        loop {
            {
                let current = status.borrow_and_update();
                if predicate(&*current) {
                    return Ok(current.clone());
                }
                if !current.running {
                    return Err(stopped());
                }
            }
            status.changed().await.map_err(|_| stopped())?;
        }
    }

    /// Wait until a peer session is connected
    pub async fn wait_connected(&self) -> Result<PeerStatus> {
        self.wait_for(|status| status.state == NegotiationState::Connected)
            .await
    }

    /// Start a session with `target`
    pub async fn connect_to(&self, target: &str) -> Result<()> {
        let target = target.to_string();
        self.request(|reply| Command::ConnectTo { target, reply })
            .await
    }

    /// Queue a file for sending on the connected channel
    ///
    /// Resolves once every chunk has been handed to the channel.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<SendReport> {
        let path = path.as_ref().to_path_buf();
        self.request(|reply| Command::Send(SendJob::File { path, reply }))
            .await
    }

    /// Wait until everything queued so far has left the channel buffer
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| Command::Send(SendJob::Flush { reply }))
            .await
    }

    /// Files received so far, in arrival order
    pub fn received_files(&self) -> Vec<ReceivedFile> {
        self.files.lock().iter().cloned().collect()
    }

    /// Save selected received files into `dir`
    pub async fn save_received(&self, indices: &[usize], dir: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files.lock().clone();
        files.save(indices, dir).await
    }

    /// Stop the event loop, closing any session
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }
}
