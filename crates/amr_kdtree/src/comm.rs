//! Rank-addressed communication context.
//!
//! The builder and compositor take an explicit [`CommContext`] instead of
//! reading ambient process state: it carries this rank's id, the group size,
//! and a blocking rendezvous link to every peer. Frames are whole image
//! buffers (compositing) or empty tokens (rank-ordered persistence
//! hand-offs); each link is source-addressed, so a receive from rank `r`
//! never observes another rank's traffic.

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::compositor::ImageBuffer;
use crate::error::KdTreeError;

/// One frame on a rank-to-rank link.
enum Frame {
  Image(ImageBuffer),
  Token,
}

/// Link to a single peer: a sender toward them and a receiver for frames
/// they address to us.
#[derive(Debug)]
struct PeerLink {
  tx: Sender<Frame>,
  rx: Receiver<Frame>,
}

/// A rank's view of its process group.
#[derive(Debug)]
pub struct CommContext {
  rank: usize,
  size: usize,
  links: Vec<PeerLink>,
}

impl CommContext {
  /// Context for a single-process group; nothing ever blocks.
  pub fn solo() -> Self {
    Self::local_group(1).swap_remove(0)
  }

  /// Wire a full mesh of rendezvous channels for `size` ranks, one context
  /// per rank. Move each context onto its own thread; sends block until the
  /// destination receives.
  ///
  /// # Panics
  /// Panics if `size` is zero.
  pub fn local_group(size: usize) -> Vec<CommContext> {
    assert!(size > 0, "group size must be at least 1");
    let mut txs: Vec<Vec<Option<Sender<Frame>>>> =
      (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
    let mut rxs: Vec<Vec<Option<Receiver<Frame>>>> =
      (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
    for src in 0..size {
      for dst in 0..size {
        let (tx, rx) = bounded(0);
        txs[src][dst] = Some(tx);
        rxs[dst][src] = Some(rx);
      }
    }
    txs
      .into_iter()
      .zip(rxs)
      .enumerate()
      .map(|(rank, (tx_row, rx_row))| {
        let links = tx_row
          .into_iter()
          .zip(rx_row)
          .map(|(tx, rx)| PeerLink {
            tx: tx.expect("mesh fully wired"),
            rx: rx.expect("mesh fully wired"),
          })
          .collect();
        CommContext { rank, size, links }
      })
      .collect()
  }

  #[inline]
  pub fn rank(&self) -> usize {
    self.rank
  }

  #[inline]
  pub fn size(&self) -> usize {
    self.size
  }

  #[inline]
  pub fn is_root(&self) -> bool {
    self.rank == 0
  }

  #[inline]
  pub fn is_parallel(&self) -> bool {
    self.size > 1
  }

  /// Blocking image send to `to`.
  pub fn send_image(&self, to: usize, image: ImageBuffer) -> Result<(), KdTreeError> {
    self.links[to]
      .tx
      .send(Frame::Image(image))
      .map_err(|_| KdTreeError::Disconnected(to))
  }

  /// Blocking image receive from `from`.
  pub fn recv_image(&self, from: usize) -> Result<ImageBuffer, KdTreeError> {
    match self.links[from].rx.recv() {
      Ok(Frame::Image(image)) => Ok(image),
      Ok(Frame::Token) => Err(KdTreeError::UnexpectedMessage(from)),
      Err(_) => Err(KdTreeError::Disconnected(from)),
    }
  }

  /// Blocking token send, used for rank-ordered hand-offs.
  pub fn send_token(&self, to: usize) -> Result<(), KdTreeError> {
    self.links[to]
      .tx
      .send(Frame::Token)
      .map_err(|_| KdTreeError::Disconnected(to))
  }

  /// Blocking token receive.
  pub fn recv_token(&self, from: usize) -> Result<(), KdTreeError> {
    match self.links[from].rx.recv() {
      Ok(Frame::Token) => Ok(()),
      Ok(Frame::Image(_)) => Err(KdTreeError::UnexpectedMessage(from)),
      Err(_) => Err(KdTreeError::Disconnected(from)),
    }
  }

  /// Block until every rank in the group has arrived.
  pub fn barrier(&self) -> Result<(), KdTreeError> {
    if self.size == 1 {
      return Ok(());
    }
    if self.rank == 0 {
      for peer in 1..self.size {
        self.recv_token(peer)?;
      }
      for peer in 1..self.size {
        self.send_token(peer)?;
      }
    } else {
      self.send_token(0)?;
      self.recv_token(0)?;
    }
    Ok(())
  }
}
