//! Socket reactor driving federation sessions.
//!
//! The session layer is synchronous and callback-shaped; this module is the
//! transport/reactor collaborator that owns the sockets. Each connection
//! runs in its own task: socket reads are fed into the session's transport
//! as individual segments (so input fragmentation mirrors network
//! fragmentation exactly), the readable callback drains them, and pending
//! output is flushed back to the socket. Connect, EOF and error outcomes
//! are translated into transport event masks.

use anyhow::Result;
use bytes::BytesMut;
use fedlink_session::{BufferedTransport, Session, TransportEvent};
use fedlink_stream::{SessionType, StanzaHandler, XmlStream};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 64 * 1024;

/// Stanza handler that logs received units.
///
/// Stands in for the routing layer, which is outside this node's scope;
/// every complete unit the stream produces surfaces here.
struct LoggingHandler {
    peer: SocketAddr,
}

impl StanzaHandler for LoggingHandler {
    fn on_stream_open(&mut self, header: &str) {
        info!(peer = %self.peer, header, "stream open");
    }

    fn on_stanza(&mut self, stanza: &str) {
        info!(peer = %self.peer, stanza, "stanza received");
    }

    fn on_stream_close(&mut self) {
        info!(peer = %self.peer, "stream close");
    }
}

/// Accept federation connections and serve each in its own task.
pub async fn run_listener(addr: SocketAddr, idle_timeout: Duration) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Accepted connection from {}", peer);
        tokio::spawn(async move {
            if let Err(e) = serve_inbound(socket, peer, idle_timeout).await {
                warn!("Session with {} ended with error: {:#}", peer, e);
            }
        });
    }
}

/// Serve one accepted connection until its stream closes.
async fn serve_inbound(socket: TcpStream, peer: SocketAddr, idle_timeout: Duration) -> Result<()> {
    let parser = Box::new(XmlStream::inbound(
        SessionType::Server,
        Box::new(LoggingHandler { peer }),
    ));
    let mut session = Session::inbound(Box::new(BufferedTransport::new()), parser);
    subscribe_lifecycle(&mut session);
    pump(socket, session, idle_timeout).await
}

/// Dial a peer and run an outbound session until its stream closes.
pub async fn run_outbound(
    addr: SocketAddr,
    origin: String,
    destination: String,
    idle_timeout: Duration,
) -> Result<()> {
    info!("Connecting to {} for {}", addr, destination);
    let socket = TcpStream::connect(addr).await?;
    let peer = socket.peer_addr()?;

    let parser = Box::new(XmlStream::outbound(
        SessionType::Server,
        origin,
        destination,
        Box::new(LoggingHandler { peer }),
    ));
    let mut session = Session::outbound(parser);
    subscribe_lifecycle(&mut session);
    session.bind(Box::new(BufferedTransport::new()));
    session.handle_event(TransportEvent::CONNECTED);

    pump(socket, session, idle_timeout).await
}

fn subscribe_lifecycle(session: &mut Session) {
    session.on_connected(|id| info!(session = %id, "session connected"));
    session.on_closed(|id| info!(session = %id, "session closed"));
}

/// Per-connection read/write loop.
async fn pump(mut socket: TcpStream, mut session: Session, idle_timeout: Duration) -> Result<()> {
    let mut read_buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        flush_output(&mut socket, &mut session).await?;

        let finished = session
            .transport_mut()
            .map(|t| t.is_finished())
            .unwrap_or(true);
        if finished || session.stream_closed() {
            break;
        }

        match tokio::time::timeout(idle_timeout, socket.read_buf(&mut read_buf)).await {
            Err(_) => {
                warn!(session = %session.serial(), "idle timeout; closing session");
                let _ = session.close();
            }
            Ok(Ok(0)) => {
                debug!(session = %session.serial(), "peer closed the connection");
                session.handle_event(TransportEvent::EOF);
                break;
            }
            Ok(Ok(n)) => {
                debug!(session = %session.serial(), bytes = n, "read");
                let chunk = read_buf.split().freeze();
                if let Some(transport) = session.transport_mut() {
                    transport.feed(chunk);
                }
                session.on_readable();
            }
            Ok(Err(e)) => {
                warn!(session = %session.serial(), error = %e, "read failed");
                session.handle_event(TransportEvent::ERROR);
                break;
            }
        }
    }

    flush_output(&mut socket, &mut session).await?;
    socket.shutdown().await.ok();
    Ok(())
}

/// Write everything the session has enqueued to the socket.
async fn flush_output(socket: &mut TcpStream, session: &mut Session) -> Result<()> {
    if let Some(transport) = session.transport_mut() {
        let pending = transport.take_output();
        if !pending.is_empty() {
            socket.write_all(&pending).await?;
        }
    }
    Ok(())
}
