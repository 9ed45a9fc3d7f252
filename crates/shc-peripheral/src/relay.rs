use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shc_frame::{Op, RelayCodec, RelayFrame};
use shc_transport::RelaySocket;

use crate::error::{att, PeripheralError, Result};
use crate::notifier::Notifier;
use crate::service::PeripheralService;

/// Outbound frames buffered per relay connection.
const OUTBOUND_QUEUE: usize = 64;

/// Notifier that forwards frames to one relay connection.
struct RelayNotifier {
    handle: u16,
    outbound: mpsc::Sender<RelayFrame>,
}

#[async_trait]
impl Notifier for RelayNotifier {
    async fn notify(&self, frame: Bytes) -> Result<()> {
        self.outbound
            .send(RelayFrame::new(Op::Notify, self.handle, frame))
            .await
            .map_err(|_| PeripheralError::SinkClosed)
    }

    async fn end_of_stream(&self) -> Result<()> {
        self.outbound
            .send(RelayFrame::empty(Op::NotifyEnd, self.handle))
            .await
            .map_err(|_| PeripheralError::SinkClosed)
    }
}

fn error_frame(handle: u16, err: &PeripheralError) -> RelayFrame {
    let message = err.to_string();
    let mut payload = BytesMut::with_capacity(1 + message.len());
    payload.put_u8(err.att_status());
    payload.put_slice(message.as_bytes());
    RelayFrame::new(Op::Error, handle, payload.freeze())
}

/// Accepts radio daemon connections and serves the peripheral service on
/// each of them.
pub struct RelayServer {
    socket: RelaySocket,
    service: Arc<PeripheralService>,
    next_conn_id: AtomicU64,
}

impl RelayServer {
    /// Bind the relay socket at `path`.
    pub fn bind(path: impl AsRef<Path>, service: Arc<PeripheralService>) -> Result<Self> {
        let socket = RelaySocket::bind(path)?;
        Ok(Self {
            socket,
            service,
            next_conn_id: AtomicU64::new(1),
        })
    }

    pub fn path(&self) -> &Path {
        self.socket.path()
    }

    pub fn service(&self) -> &Arc<PeripheralService> {
        &self.service
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Accept errors are logged and do not stop the server.
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<()> {
        let mut connections: Vec<JoinHandle<()>> = Vec::new();
        loop {
            let stream = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.socket.accept() => match accepted {
                    Ok(stream) => stream,
                    Err(err) => {
                        warn!(error = %err, "relay accept failed");
                        continue;
                    }
                },
            };

            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
            let service = self.service.clone();
            let cancel = shutdown.child_token();
            connections.retain(|task| !task.is_finished());
            connections.push(tokio::spawn(async move {
                if let Err(err) = serve_connection(stream, service, cancel, conn_id).await {
                    warn!(conn = conn_id, error = %err, "relay connection failed");
                }
            }));
        }

        for task in connections {
            let _ = task.await;
        }
        info!(path = ?self.path(), "relay server stopped");
        Ok(())
    }
}

/// Serve one relay connection until the peer disconnects, sends a malformed
/// envelope, or `cancel` fires. All subscriptions opened on the connection
/// are cancelled when it ends.
pub async fn serve_connection<S>(
    io: S,
    service: Arc<PeripheralService>,
    cancel: CancellationToken,
    conn_id: u64,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    info!(conn = conn_id, "relay connection opened");
    let (mut sink, mut inbound) = Framed::new(io, RelayCodec::new()).split();
    let (outbound, mut queue) = mpsc::channel::<RelayFrame>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if let Err(err) = sink.send(frame).await {
                debug!(error = %err, "relay write failed");
                break;
            }
        }
    });

    let mut subscriptions: HashMap<u16, CancellationToken> = HashMap::new();
    let result = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            next = inbound.next() => match next {
                None => break Ok(()),
                Some(Ok(frame)) => frame,
                Some(Err(err)) => break Err(PeripheralError::from(err)),
            },
        };

        debug!(conn = conn_id, op = frame.op.name(), handle = frame.handle, "relay request");
        let reply = dispatch(&service, frame, &outbound, &mut subscriptions, &cancel);
        if let Some(reply) = reply {
            if outbound.send(reply).await.is_err() {
                break Ok(());
            }
        }
    };

    for (_, token) in subscriptions.drain() {
        token.cancel();
    }
    drop(outbound);
    let _ = writer.await;
    info!(conn = conn_id, "relay connection closed");
    result
}

fn dispatch(
    service: &Arc<PeripheralService>,
    frame: RelayFrame,
    outbound: &mpsc::Sender<RelayFrame>,
    subscriptions: &mut HashMap<u16, CancellationToken>,
    cancel: &CancellationToken,
) -> Option<RelayFrame> {
    let handle = frame.handle;
    match frame.op {
        Op::Describe => match serde_json::to_vec(&service.describe()) {
            Ok(table) => Some(RelayFrame::new(Op::ServiceTable, handle, table)),
            Err(err) => Some(error_frame(handle, &PeripheralError::from(err))),
        },
        Op::Read => Some(match service.read(handle) {
            Ok(value) => RelayFrame::new(Op::ReadResponse, handle, value),
            Err(err) => error_frame(handle, &err),
        }),
        Op::Write => {
            let status = match service.write(handle, &frame.payload) {
                Ok(_) => att::SUCCESS,
                Err(err) => {
                    warn!(handle, error = %err, "write rejected");
                    err.att_status()
                }
            };
            Some(RelayFrame::new(Op::WriteResponse, handle, vec![status]))
        }
        Op::Subscribe => {
            if subscriptions
                .get(&handle)
                .is_some_and(|token| !token.is_cancelled())
            {
                debug!(handle, "already subscribed");
                return None;
            }
            let token = cancel.child_token();
            let notifier = Arc::new(RelayNotifier {
                handle,
                outbound: outbound.clone(),
            });
            match service.subscribe(handle, notifier, token.clone()) {
                Ok(_task) => {
                    subscriptions.insert(handle, token);
                    None
                }
                Err(err) => Some(error_frame(handle, &err)),
            }
        }
        Op::Unsubscribe => {
            if let Some(token) = subscriptions.remove(&handle) {
                token.cancel();
                info!(handle, "unsubscribed");
            }
            None
        }
        op @ (Op::ServiceTable
        | Op::ReadResponse
        | Op::WriteResponse
        | Op::Notify
        | Op::NotifyEnd
        | Op::Error) => {
            warn!(op = op.name(), handle, "unexpected op from radio daemon");
            Some(error_frame(handle, &PeripheralError::UnexpectedOp(op.name())))
        }
    }
}
