use crate::{ErrorPolicy, Result, ServerError};
use bytes::Bytes;
use futures::StreamExt;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::BytesCodec;
use tokio_util::sync::CancellationToken;
use tokio_util::udp::UdpFramed;
use tracing::{error, info, trace, warn};

/// Turns one request datagram into one response datagram.
pub trait DatagramHandler: Send + Sync + 'static {
    fn process_datagram(&self, request: &[u8]) -> Result<Bytes>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running,
    Stopping,
}

struct Running {
    token: CancellationToken,
    task: JoinHandle<Result<()>>,
}

/// Serves a [`DatagramHandler`] over UDP. Datagrams are handled one at a
/// time, each response going back to the peer that sent the request.
pub struct DatagramServer<H> {
    name: &'static str,
    local_addr: SocketAddr,
    policy: ErrorPolicy,
    handler: Arc<H>,
    state: Arc<watch::Sender<ServerState>>,
    running: Option<Running>,
}

impl<H: DatagramHandler> DatagramServer<H> {
    pub fn new(name: &'static str, local_addr: SocketAddr, handler: H, policy: ErrorPolicy) -> Self {
        let (state, _) = watch::channel(ServerState::Stopped);
        Self {
            name,
            local_addr,
            policy,
            handler: Arc::new(handler),
            state: Arc::new(state),
            running: None,
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Follows state changes, e.g. to notice the loop ending on its own.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Binds the socket and starts the receive loop, returning the bound
    /// address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                return Err(ServerError::AlreadyRunning);
            }
        }

        let socket = bind(self.local_addr)?;
        let local_addr = socket.local_addr()?;
        info!(server = self.name, "Starting UDP listener on {}", local_addr);

        let token = CancellationToken::new();
        self.state.send_replace(ServerState::Running);
        let task = tokio::spawn(serve(
            self.name,
            socket,
            self.handler.clone(),
            self.policy,
            token.clone(),
            self.state.clone(),
        ));
        self.running = Some(Running { token, task });

        Ok(local_addr)
    }

    /// Cancels the receive loop and waits for it to exit, returning how it
    /// ended.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        if !running.task.is_finished() {
            self.state.send_replace(ServerState::Stopping);
        }
        running.token.cancel();

        let outcome = running.task.await;
        self.state.send_replace(ServerState::Stopped);
        outcome?
    }

    /// Waits for the receive loop to exit by itself. Dropping the returned
    /// future leaves the server running.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };
        let outcome = (&mut running.task).await;
        self.running = None;
        outcome?
    }
}

impl<H> Drop for DatagramServer<H> {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.token.cancel();
        }
    }
}

fn bind(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// ICMP port unreachable for an earlier reply shows up as one of these on a
/// later receive or send. Neither says anything about the listening socket.
fn is_peer_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}

async fn serve<H: DatagramHandler>(
    name: &'static str,
    socket: UdpSocket,
    handler: Arc<H>,
    policy: ErrorPolicy,
    token: CancellationToken,
    state: Arc<watch::Sender<ServerState>>,
) -> Result<()> {
    // Replies skip the framed sink: it keeps any frame whose flush failed.
    let socket = Arc::new(socket);
    let mut stream = UdpFramed::new(socket.clone(), BytesCodec::new());

    let outcome = loop {
        trace!(server = name, "Waiting to recv...");
        let next = tokio::select! {
            _ = token.cancelled() => break Ok(()),
            next = stream.next() => next,
        };

        let (request, peer) = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) if is_peer_reset(&e) => {
                warn!(server = name, "Ignoring receive error: {}", e);
                continue;
            }
            Some(Err(e)) => {
                error!(server = name, "Error getting next value in stream: {}", e);
                break Err(e.into());
            }
            None => {
                warn!(server = name, "No value available from stream, closing");
                break Ok(());
            }
        };
        trace!(server = name, "Received {} bytes from {}", request.len(), peer);

        let response = match handler.process_datagram(&request) {
            Ok(response) => response,
            Err(e) => match policy {
                ErrorPolicy::Abort => {
                    error!(server = name, "Failed to process datagram from {}: {}", peer, e);
                    break Err(e);
                }
                ErrorPolicy::Continue => {
                    warn!(server = name, "Dropping datagram from {}: {}", peer, e);
                    continue;
                }
            },
        };

        let sent = tokio::select! {
            _ = token.cancelled() => break Ok(()),
            sent = socket.send_to(&response, peer) => sent,
        };
        match sent {
            Ok(len) => trace!(server = name, "Sent {} bytes to {}", len, peer),
            Err(e) if is_peer_reset(&e) => {
                warn!(server = name, "Ignoring send error to {}: {}", peer, e);
            }
            Err(e) => match policy {
                ErrorPolicy::Abort => {
                    error!(server = name, "Error sending buffer to client: {}", e);
                    break Err(e.into());
                }
                ErrorPolicy::Continue => {
                    warn!(
                        server = name,
                        "Dropping {} byte response to {}: {}",
                        response.len(),
                        peer,
                        e
                    );
                }
            },
        }
    };

    info!(server = name, "Stopped");
    state.send_replace(ServerState::Stopped);
    outcome
}
