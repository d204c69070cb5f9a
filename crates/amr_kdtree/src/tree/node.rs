//! Tree nodes addressed by implicit binary-heap ids.
//!
//! The arena maps ids to nodes; parent and child links are never stored,
//! they are computed: `left = 2*id + 1`, `right = 2*id + 2`,
//! `parent = (id - 1) / 2`. Any subset of the full binary tree can live in
//! the arena, which is what lets every rank hold just its own subtree plus
//! the shared skeleton.

use glam::IVec3;

use crate::bounds::Aabb3;
use crate::brick::Brick;
use crate::grid::GridId;

/// Implicit binary-heap node id.
pub type NodeId = u64;

/// Id of the root node.
pub const ROOT_ID: NodeId = 0;

#[inline]
pub fn left_child_id(id: NodeId) -> NodeId {
  (id << 1) + 1
}

#[inline]
pub fn right_child_id(id: NodeId) -> NodeId {
  (id << 1) + 2
}

/// Parent id, or `None` for the root.
#[inline]
pub fn parent_id(id: NodeId) -> Option<NodeId> {
  (id > 0).then(|| (id - 1) >> 1)
}

/// Depth below the root (root = 0).
#[inline]
pub fn depth_of(id: NodeId) -> u32 {
  (id + 1).ilog2()
}

/// Cell-index window a leaf occupies within its bound grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafRange {
  /// First cell-boundary index per axis.
  pub lo: IVec3,
  /// Last cell-boundary index per axis.
  pub hi: IVec3,
  /// Cells per axis (`hi - lo`).
  pub dims: IVec3,
}

/// Leaf payload: the bound grid, its cell window, and the lazily
/// materialized brick.
#[derive(Debug)]
pub struct LeafNode {
  /// Grid whose samples fill this leaf's volume.
  pub grid: GridId,
  pub(crate) range: Option<LeafRange>,
  pub(crate) brick: Option<Brick>,
}

impl LeafNode {
  /// Cell window within the bound grid.
  ///
  /// # Panics
  /// Panics if queried before the cost/volume accounting pass has run.
  pub fn range(&self) -> &LeafRange {
    self
      .range
      .as_ref()
      .expect("leaf range queried before the cost/volume accounting pass")
  }

  /// Cells per axis.
  ///
  /// # Panics
  /// Panics if queried before the accounting pass has run.
  pub fn dims(&self) -> IVec3 {
    self.range().dims
  }

  /// Materialized brick, if any.
  #[inline]
  pub fn brick(&self) -> Option<&Brick> {
    self.brick.as_ref()
  }
}

/// Dividing plane of an interior node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitNode {
  /// Dividing axis (0, 1, or 2).
  pub axis: usize,
  /// Plane position along `axis`.
  pub position: f64,
}

/// A node is exactly one of: a leaf bound to a grid, a split whose two
/// children exist by construction, or a remote stub marking another rank's
/// subtree at the hand-off boundary.
#[derive(Debug)]
pub enum NodeKind {
  Leaf(LeafNode),
  Split(SplitNode),
  Remote,
}

/// One arena entry.
#[derive(Debug)]
pub struct KdNode {
  /// Box this node spans in domain coordinates.
  pub bounds: Aabb3,
  /// Rank responsible for this node's subtree.
  pub owner: usize,
  /// Rendering-cost estimate for the subtree; set by the accounting pass.
  pub(crate) cost: Option<u64>,
  pub kind: NodeKind,
}

impl KdNode {
  pub(crate) fn leaf(bounds: Aabb3, owner: usize, grid: GridId) -> Self {
    Self {
      bounds,
      owner,
      cost: None,
      kind: NodeKind::Leaf(LeafNode {
        grid,
        range: None,
        brick: None,
      }),
    }
  }

  pub(crate) fn split(bounds: Aabb3, owner: usize, axis: usize, position: f64) -> Self {
    Self {
      bounds,
      owner,
      cost: None,
      kind: NodeKind::Split(SplitNode { axis, position }),
    }
  }

  pub(crate) fn remote(bounds: Aabb3, owner: usize) -> Self {
    Self {
      bounds,
      owner,
      cost: None,
      kind: NodeKind::Remote,
    }
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    matches!(self.kind, NodeKind::Leaf(_))
  }

  #[inline]
  pub fn is_split(&self) -> bool {
    matches!(self.kind, NodeKind::Split(_))
  }

  #[inline]
  pub fn is_remote(&self) -> bool {
    matches!(self.kind, NodeKind::Remote)
  }

  pub fn as_leaf(&self) -> Option<&LeafNode> {
    match &self.kind {
      NodeKind::Leaf(leaf) => Some(leaf),
      _ => None,
    }
  }

  pub(crate) fn as_leaf_mut(&mut self) -> Option<&mut LeafNode> {
    match &mut self.kind {
      NodeKind::Leaf(leaf) => Some(leaf),
      _ => None,
    }
  }

  pub fn as_split(&self) -> Option<&SplitNode> {
    match &self.kind {
      NodeKind::Split(split) => Some(split),
      _ => None,
    }
  }

  /// Rendering-cost estimate for this node's subtree.
  ///
  /// # Panics
  /// Panics if queried before the cost/volume accounting pass has run.
  pub fn cost(&self) -> u64 {
    self
      .cost
      .expect("node cost queried before the cost/volume accounting pass")
  }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
