//! Image buffers and the distributed over-operator reduction.
//!
//! After each rank ray-casts its local leaves, the partial images merge
//! along the same binary tree that assigned subtree ownership. At every
//! level the parent's split plane and the viewpoint decide which sibling is
//! in front; the merged image follows the parent's owner upward until rank 0
//! holds the final composite.

use std::collections::HashMap;

use glam::DVec3;

use crate::comm::CommContext;
use crate::error::KdTreeError;
use crate::tree::node::{left_child_id, parent_id, right_child_id, KdNode, NodeId, NodeKind};

/// Color channels per pixel.
pub const CHANNELS: usize = 3;

/// Row-major `rows x cols x 3` image of f64 channel values.
///
/// Channel values are premultiplied accumulated emission; their per-pixel
/// sum doubles as opacity for the over-operator.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBuffer {
  rows: usize,
  cols: usize,
  data: Vec<f64>,
}

impl ImageBuffer {
  /// All-zero, fully transparent image.
  pub fn new(rows: usize, cols: usize) -> Self {
    Self {
      rows,
      cols,
      data: vec![0.0; rows * cols * CHANNELS],
    }
  }

  /// Image with every pixel set to `pixel`.
  pub fn from_pixel(rows: usize, cols: usize, pixel: [f64; CHANNELS]) -> Self {
    let mut image = Self::new(rows, cols);
    for row in 0..rows {
      for col in 0..cols {
        image.set_pixel(row, col, pixel);
      }
    }
    image
  }

  #[inline]
  pub fn rows(&self) -> usize {
    self.rows
  }

  #[inline]
  pub fn cols(&self) -> usize {
    self.cols
  }

  #[inline]
  pub fn shape(&self) -> (usize, usize) {
    (self.rows, self.cols)
  }

  #[inline]
  fn offset(&self, row: usize, col: usize) -> usize {
    (row * self.cols + col) * CHANNELS
  }

  pub fn pixel(&self, row: usize, col: usize) -> [f64; CHANNELS] {
    let o = self.offset(row, col);
    [self.data[o], self.data[o + 1], self.data[o + 2]]
  }

  pub fn set_pixel(&mut self, row: usize, col: usize, pixel: [f64; CHANNELS]) {
    let o = self.offset(row, col);
    self.data[o..o + CHANNELS].copy_from_slice(&pixel);
  }

  /// Flat channel storage, row-major.
  #[inline]
  pub fn data(&self) -> &[f64] {
    &self.data
  }

  /// Blend `back` behind this image with the over-operator.
  ///
  /// Per pixel and channel: `self = self + max(1 - sum(self_channels), 0) *
  /// back`. The remaining transmittance comes from the front pixel's channel
  /// sum, clamped at zero so oversaturated pixels pass nothing through.
  ///
  /// # Panics
  /// Panics if the two images' shapes differ.
  pub fn blend_under(&mut self, back: &ImageBuffer) {
    assert_eq!(
      self.shape(),
      back.shape(),
      "blended images must share a shape"
    );
    for (front, behind) in self
      .data
      .chunks_exact_mut(CHANNELS)
      .zip(back.data.chunks_exact(CHANNELS))
    {
      let ta = (1.0 - front.iter().sum::<f64>()).max(0.0);
      for (f, b) in front.iter_mut().zip(behind) {
        *f += ta * b;
      }
    }
  }
}

/// Walk from this rank's hand-off node to the root, exchanging and merging
/// partial images with the sibling subtree's owner at each level. Exactly
/// one of the two owners sends and drops out; the other merges and carries
/// the image upward if it owns the parent. On return rank 0's buffer holds
/// the full composite.
///
/// Every level of the walk must be a split in the arena; a tree whose
/// leaves terminate above the hand-off level fails with
/// [`KdTreeError::IncompleteSkeleton`].
#[cfg_attr(
  feature = "tracing",
  tracing::instrument(skip_all, name = "compositor::reduce_images")
)]
pub(crate) fn reduce_images(
  arena: &HashMap<NodeId, KdNode>,
  comm: &CommContext,
  viewpoint: DVec3,
  image: &mut ImageBuffer,
) -> Result<(), KdTreeError> {
  if comm.size() == 1 {
    return Ok(());
  }

  let mut my_node = (comm.rank() + comm.size() - 1) as NodeId;
  while let Some(parent) = parent_id(my_node) {
    // A tree whose leaves stop above the hand-off level never produced the
    // split this walk needs.
    let parent_node = arena
      .get(&parent)
      .ok_or(KdTreeError::IncompleteSkeleton { node: parent })?;
    let NodeKind::Split(split) = &parent_node.kind else {
      return Err(KdTreeError::IncompleteSkeleton { node: parent });
    };
    let left = left_child_id(parent);
    let right = right_child_id(parent);
    // A viewpoint on the plane sees the left child in front, matching the
    // locate rule.
    let (front, back) = if viewpoint[split.axis] <= split.position {
      (left, right)
    } else {
      (right, left)
    };
    let owner_of = |id: NodeId| match arena.get(&id) {
      Some(node) => Ok(node.owner),
      None => Err(KdTreeError::IncompleteSkeleton { node: id }),
    };
    let front_owner = owner_of(front)?;
    let back_owner = owner_of(back)?;
    let parent_owner = parent_node.owner;

    if front_owner == comm.rank() {
      if front_owner == parent_owner {
        let incoming = comm.recv_image(back_owner)?;
        if incoming.shape() != image.shape() {
          return Err(KdTreeError::ImageShapeMismatch {
            local: image.shape(),
            received: incoming.shape(),
          });
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(rank = comm.rank(), from = back_owner, "merged back image");
        image.blend_under(&incoming);
      } else {
        #[cfg(feature = "tracing")]
        tracing::debug!(rank = comm.rank(), to = back_owner, "sent front image");
        comm.send_image(back_owner, image.clone())?;
      }
    }
    if back_owner == comm.rank() {
      if front_owner == parent_owner {
        comm.send_image(front_owner, image.clone())?;
      } else {
        let incoming = comm.recv_image(front_owner)?;
        if incoming.shape() != image.shape() {
          return Err(KdTreeError::ImageShapeMismatch {
            local: image.shape(),
            received: incoming.shape(),
          });
        }
        // The incoming image is in front; ours slides underneath.
        let mut merged = incoming;
        merged.blend_under(image);
        *image = merged;
      }
    }

    if comm.rank() == parent_owner {
      my_node = parent;
    } else {
      break;
    }
  }
  Ok(())
}

#[cfg(test)]
#[path = "compositor_test.rs"]
mod compositor_test;
