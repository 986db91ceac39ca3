//! Duplex transport
//!
//! The transport is an abstract pair of halves: an inbound stream of
//! UTF-8 JSON text messages and an outbound sink. Framing is the
//! transport's concern; the driver below only sees strings.
//!
//! [`drive`] runs one session: it pushes the initial full render, then
//! loops — read an action, process it, queue the response. The outbound
//! queue is bounded; when the client stops draining it, the configured
//! policy either blocks the ingress or terminates the page with
//! `SlowClient`. Because the ingress loop awaits each enqueue before
//! reading the next action, responses leave in arrival order.

use std::sync::Arc;

use tokio::sync::mpsc;

use luciole_protocol::{ActionEnvelope, UpdateEnvelope};

use crate::config::SlowClientPolicy;
use crate::error::LiveError;
use crate::page::Page;

/// Inbound half: `None` means the peer closed cleanly.
pub trait TransportRx: Send + 'static {
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, LiveError>>> + Send;
}

/// Outbound half.
pub trait TransportTx: Send + 'static {
    fn send(&mut self, msg: String) -> impl Future<Output = Result<(), LiveError>> + Send;
}

/// A duplex transport that can be split into its two halves.
pub trait Transport: Send + 'static {
    type Tx: TransportTx;
    type Rx: TransportRx;

    fn split(self) -> (Self::Tx, Self::Rx);
}

/// Drive one page session over a transport until the peer goes away or
/// a fatal error ends it. The first outbound message is always the full
/// initial render; everything after is patches.
pub async fn drive<T: Transport>(page: Arc<Page>, transport: T) -> Result<(), LiveError> {
    let (tx, mut rx) = transport.split();
    let config = page.config().clone();
    let (queue, queue_rx) = mpsc::channel::<String>(config.outbound_queue.max(1));
    let mut pump = tokio::spawn(pump_outbound(tx, queue_rx));

    tracing::info!(page = %page.id(), "session connected");

    let result = async {
        let initial = page.initial_render().await;
        send_envelope(&page, &queue, config.slow_client, &initial).await?;

        loop {
            tokio::select! {
                inbound = rx.recv() => match inbound {
                    None => return Ok(()),
                    Some(Err(err)) => return Err(err),
                    Some(Ok(text)) => {
                        let envelope = match serde_json::from_str::<ActionEnvelope>(&text) {
                            Ok(envelope) => envelope,
                            Err(err) => {
                                // malformed envelope: report, keep the session
                                tracing::debug!(page = %page.id(), error = %err, "bad action envelope");
                                let bad = LiveError::BadRequest(err.to_string());
                                let reply = UpdateEnvelope::failure(bad.field_errors());
                                send_envelope(&page, &queue, config.slow_client, &reply).await?;
                                continue;
                            }
                        };
                        let reply = page.process_action(envelope).await?;
                        send_envelope(&page, &queue, config.slow_client, &reply).await?;
                    }
                },
                pumped = &mut pump => {
                    // outbound side died first
                    return match pumped {
                        Ok(result) => result,
                        Err(join_err) => Err(LiveError::Transport(join_err.to_string())),
                    };
                }
            }
        }
    }
    .await;

    pump.abort();

    match &result {
        Ok(()) => tracing::info!(page = %page.id(), "session closed"),
        Err(err) if matches!(err, LiveError::SlowClient) => {
            tracing::warn!(page = %page.id(), "terminating slow client");
            page.expire().await;
        }
        Err(err) => tracing::warn!(page = %page.id(), error = %err, "session failed"),
    }
    result
}

async fn send_envelope(
    page: &Page,
    queue: &mpsc::Sender<String>,
    policy: SlowClientPolicy,
    envelope: &UpdateEnvelope,
) -> Result<(), LiveError> {
    let msg = serde_json::to_string(envelope)
        .map_err(|err| LiveError::Transport(format!("encode: {err}")))?;
    page.metrics().record_bytes_out(msg.len());
    match policy {
        SlowClientPolicy::Block => queue
            .send(msg)
            .await
            .map_err(|_| LiveError::Transport("outbound queue closed".into())),
        SlowClientPolicy::Terminate => queue.try_send(msg).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => LiveError::SlowClient,
            mpsc::error::TrySendError::Closed(_) => {
                LiveError::Transport("outbound queue closed".into())
            }
        }),
    }
}

async fn pump_outbound<Tx: TransportTx>(
    mut tx: Tx,
    mut queue: mpsc::Receiver<String>,
) -> Result<(), LiveError> {
    while let Some(msg) = queue.recv().await {
        tx.send(msg).await?;
    }
    Ok(())
}

// ============================================================================
// In-memory transport (tests, embedded clients)
// ============================================================================

/// Channel-backed duplex transport. The client half is plain mpsc
/// endpoints, which makes request/response parity easy to assert.
pub struct ChannelTransport {
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
}

/// The peer endpoints for a [`ChannelTransport`].
pub struct ChannelClient {
    pub to_server: mpsc::Sender<String>,
    pub from_server: mpsc::Receiver<String>,
}

/// Build a connected transport/client pair with the given buffer size.
pub fn channel_pair(buffer: usize) -> (ChannelTransport, ChannelClient) {
    let (to_server, inbound) = mpsc::channel(buffer);
    let (outbound, from_server) = mpsc::channel(buffer);
    (
        ChannelTransport { inbound, outbound },
        ChannelClient {
            to_server,
            from_server,
        },
    )
}

pub struct ChannelTx(mpsc::Sender<String>);
pub struct ChannelRx(mpsc::Receiver<String>);

impl Transport for ChannelTransport {
    type Tx = ChannelTx;
    type Rx = ChannelRx;

    fn split(self) -> (Self::Tx, Self::Rx) {
        (ChannelTx(self.outbound), ChannelRx(self.inbound))
    }
}

impl TransportTx for ChannelTx {
    async fn send(&mut self, msg: String) -> Result<(), LiveError> {
        self.0
            .send(msg)
            .await
            .map_err(|_| LiveError::Transport("peer hung up".into()))
    }
}

impl TransportRx for ChannelRx {
    async fn recv(&mut self) -> Option<Result<String, LiveError>> {
        self.0.recv().await.map(Ok)
    }
}
