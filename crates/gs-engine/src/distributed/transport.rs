//! Point-to-point message transport between ranks of a distributed sweep.
//!
//! Rank 0 is always the coordinator; ranks `1..size` are workers.

use async_trait::async_trait;
use tokio::sync::mpsc;

use gs_types::{GsResult, ProtocolError};

use super::protocol::Message;

/// Something received by a rank.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A frame sent by `source`.
    Message { source: usize, message: Message },
    /// `source` went away; nothing more will arrive from it.
    Hangup { source: usize },
}

/// A rank's view of its communication group.
#[async_trait]
pub trait Transport: Send + Sync {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Number of ranks in the group, coordinator included.
    fn size(&self) -> usize;

    /// Send `message` to rank `dest`.
    async fn send(&mut self, dest: usize, message: Message) -> GsResult<()>;

    /// Wait for the next message from any rank.
    async fn recv(&mut self) -> GsResult<Incoming>;
}

/// In-process transport backed by tokio channels.
pub struct LocalTransport {
    rank: usize,
    size: usize,
    peers: Vec<mpsc::UnboundedSender<Incoming>>,
    inbox: mpsc::UnboundedReceiver<Incoming>,
}

/// Build a fully connected group of `size` in-process ranks.
pub fn local_group(size: usize) -> GsResult<Vec<LocalTransport>> {
    if size < 2 {
        return Err(ProtocolError::InvalidGroup {
            message: format!("a group needs a coordinator and at least one worker, got size {size}"),
        }
        .into());
    }

    let (peers, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::unbounded_channel()).unzip();
    Ok(inboxes
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| LocalTransport {
            rank,
            size,
            peers: peers.clone(),
            inbox,
        })
        .collect())
}

#[async_trait]
impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&mut self, dest: usize, message: Message) -> GsResult<()> {
        let peer = self
            .peers
            .get(dest)
            .filter(|_| dest != self.rank)
            .ok_or(ProtocolError::UnexpectedSender { rank: dest })?;
        peer.send(Incoming::Message {
            source: self.rank,
            message,
        })
        .map_err(|_| ProtocolError::Disconnected { rank: dest })?;
        Ok(())
    }

    async fn recv(&mut self) -> GsResult<Incoming> {
        // Every rank holds a sender to its own inbox, so this only ends on shutdown.
        self.inbox
            .recv()
            .await
            .ok_or_else(|| ProtocolError::Disconnected { rank: self.rank }.into())
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        let hangup = Incoming::Hangup { source: self.rank };
        if self.rank == 0 {
            for peer in self.peers.iter().skip(1) {
                let _ = peer.send(hangup.clone());
            }
        } else if let Some(coordinator) = self.peers.first() {
            let _ = coordinator.send(hangup);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_needs_a_worker() {
        match local_group(1) {
            Err(gs_types::GsError::Protocol(ProtocolError::InvalidGroup { .. })) => (),
            _ => panic!("Expected InvalidGroup"),
        }
    }

    #[tokio::test]
    async fn delivers_messages_and_hangups() {
        let mut group = local_group(3).unwrap();
        let mut worker = group.pop().unwrap();
        let mut coordinator = group.remove(0);
        assert_eq!((worker.rank(), worker.size()), (2, 3));

        worker.send(0, Message::Ready { report: None }).await.unwrap();
        assert_eq!(
            coordinator.recv().await.unwrap(),
            Incoming::Message {
                source: 2,
                message: Message::Ready { report: None }
            }
        );
        assert!(worker.send(2, Message::Terminate).await.is_err());

        drop(worker);
        assert_eq!(coordinator.recv().await.unwrap(), Incoming::Hangup { source: 2 });
    }
}
