//! TCP transport: a star around the coordinator.
//!
//! Each frame is a big-endian `u32` length followed by a JSON encoded
//! [`Message`]. Workers open one connection to rank 0 and introduce
//! themselves with `Hello`; worker-to-worker traffic is not supported.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use gs_types::{GsError, GsResult, ProtocolError};

use super::protocol::Message;
use super::transport::{Incoming, Transport};

/// Largest accepted frame body.
pub const MAX_FRAME: usize = 64 * 1024 * 1024;

const CONNECT_ATTEMPTS: u32 = 50;
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

pub struct TcpTransport {
    rank: usize,
    size: usize,
    writers: HashMap<usize, OwnedWriteHalf>,
    inbox: mpsc::UnboundedReceiver<Result<Incoming, ProtocolError>>,
    readers: Vec<JoinHandle<()>>,
}

impl TcpTransport {
    /// Coordinator side: listen on `addr` until `size - 1` workers have said hello.
    pub async fn bind(addr: &str, size: usize) -> GsResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Coordinator listening on {} for {} workers", listener.local_addr()?, size.saturating_sub(1));
        Self::accept_workers(listener, size).await
    }

    /// Coordinator side on an already bound listener.
    pub async fn accept_workers(listener: TcpListener, size: usize) -> GsResult<Self> {
        check_group(0, size)?;
        let (tx, inbox) = mpsc::unbounded_channel();
        let mut writers = HashMap::new();
        let mut readers = Vec::new();

        while writers.len() < size - 1 {
            let (stream, peer) = listener.accept().await?;
            stream.set_nodelay(true)?;
            let (mut read, write) = stream.into_split();
            let rank = match read_frame(&mut read).await? {
                Some(Message::Hello { rank }) if (1..size).contains(&rank) && !writers.contains_key(&rank) => rank,
                Some(Message::Hello { rank }) => return Err(ProtocolError::UnexpectedSender { rank }.into()),
                Some(other) => {
                    return Err(ProtocolError::UnexpectedMessage {
                        rank: 0,
                        expected: "hello".to_string(),
                        got: other.kind().to_string(),
                    }
                    .into())
                }
                None => {
                    warn!("Connection from {} closed before saying hello", peer);
                    continue;
                }
            };
            debug!(rank, %peer, "Worker connected");
            writers.insert(rank, write);
            readers.push(tokio::spawn(forward_frames(rank, read, tx.clone())));
        }

        Ok(Self { rank: 0, size, writers, inbox, readers })
    }

    /// Worker side: connect to the coordinator at `addr`, retrying while it starts up.
    pub async fn connect(addr: &str, rank: usize, size: usize) -> GsResult<Self> {
        check_group(rank, size)?;
        if rank == 0 {
            return Err(ProtocolError::InvalidGroup {
                message: "rank 0 is the coordinator and cannot connect".to_string(),
            }
            .into());
        }

        let mut attempt = 0;
        let stream = loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(e) if attempt + 1 < CONNECT_ATTEMPTS => {
                    attempt += 1;
                    debug!(rank, attempt, "Coordinator not reachable yet: {}", e);
                    tokio::time::sleep(CONNECT_BACKOFF).await;
                }
                Err(e) => return Err(e.into()),
            }
        };
        stream.set_nodelay(true)?;
        let (read, mut write) = stream.into_split();
        write_frame(&mut write, &Message::Hello { rank }).await?;
        info!(rank, "Connected to coordinator at {}", addr);

        let (tx, inbox) = mpsc::unbounded_channel();
        let readers = vec![tokio::spawn(forward_frames(0, read, tx))];
        Ok(Self {
            rank,
            size,
            writers: HashMap::from([(0, write)]),
            inbox,
            readers,
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&mut self, dest: usize, message: Message) -> GsResult<()> {
        let writer = self
            .writers
            .get_mut(&dest)
            .ok_or(ProtocolError::UnexpectedSender { rank: dest })?;
        match write_frame(writer, &message).await {
            Err(GsError::Io(_)) => Err(ProtocolError::Disconnected { rank: dest }.into()),
            other => other,
        }
    }

    async fn recv(&mut self) -> GsResult<Incoming> {
        match self.inbox.recv().await {
            Some(incoming) => Ok(incoming?),
            None => Err(ProtocolError::Disconnected { rank: self.rank }.into()),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

fn check_group(rank: usize, size: usize) -> GsResult<()> {
    if size < 2 || rank >= size {
        return Err(ProtocolError::InvalidGroup {
            message: format!("rank {rank} in a group of size {size}"),
        }
        .into());
    }
    Ok(())
}

/// Pump frames from one peer into the inbox. A closed or broken stream is a
/// hangup; a frame that cannot be decoded is a protocol error and ends the pump.
async fn forward_frames(
    source: usize,
    mut read: OwnedReadHalf,
    tx: mpsc::UnboundedSender<Result<Incoming, ProtocolError>>,
) {
    loop {
        match read_frame(&mut read).await {
            Ok(Some(message)) => {
                if tx.send(Ok(Incoming::Message { source, message })).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(GsError::Protocol(e)) => {
                let _ = tx.send(Err(e));
                return;
            }
            Err(GsError::Serialization(e)) => {
                let _ = tx.send(Err(ProtocolError::MalformedFrame {
                    rank: source,
                    message: e.to_string(),
                }));
                return;
            }
            Err(e) => {
                warn!(rank = source, "Dropping connection: {}", e);
                break;
            }
        }
    }
    let _ = tx.send(Ok(Incoming::Hangup { source }));
}

/// Read one frame; `None` on a clean end of stream.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> GsResult<Option<Message>> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let size = u32::from_be_bytes(len) as usize;
    if size > MAX_FRAME {
        return Err(ProtocolError::FrameTooLarge { size, limit: MAX_FRAME }.into());
    }
    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> GsResult<()> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME {
        return Err(ProtocolError::FrameTooLarge { size: body.len(), limit: MAX_FRAME }.into());
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}
