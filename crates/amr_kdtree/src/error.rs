//! Error type shared by construction, compositing, and persistence.

use thiserror::Error;

use crate::bounds::Aabb3;
use crate::tree::node::NodeId;

/// Fatal errors surfaced by tree construction, the image compositor, and the
/// persistence adapter.
///
/// Precondition violations are not represented here: querying a node's
/// derived geometry (cell range, dims, cost) before the accounting pass has
/// run, or slicing outside a sample block, panics instead.
#[derive(Debug, Error)]
pub enum KdTreeError {
  /// Static subtree ownership needs a complete binary hand-off level.
  #[error("process count {0} is not a power of two")]
  ProcessCountNotPowerOfTwo(usize),

  /// More ranks than root-level grids leaves some rank with no subtree.
  #[error("process count {procs} exceeds the {grids} root-level grids")]
  TooFewRootGrids { procs: usize, grids: usize },

  /// The requested region overlaps no grid at all.
  #[error("no grids overlap the requested region")]
  EmptyRegion,

  /// A node's volume is covered by no candidate grid and has no coarser
  /// ancestor to fall back on; the input does not tile the region.
  #[error("region {0:?} is covered by no grid and has no parent grid")]
  UncoveredRegion(Aabb3),

  /// No grid edge lies strictly inside a multi-grid node, so no dividing
  /// plane can separate the candidates.
  #[error("no viable split edge among {count} candidate grids in {bounds:?}")]
  DegenerateSplit { count: usize, bounds: Aabb3 },

  /// A render pass was requested before bricks were materialized or loaded.
  #[error("bricks are not materialized; call materialize_bricks first")]
  BricksNotLoaded,

  /// A peer rank's channel closed mid-protocol.
  #[error("rank {0} disconnected")]
  Disconnected(usize),

  /// A peer sent a token where an image was expected, or vice versa.
  #[error("unexpected message kind from rank {0}")]
  UnexpectedMessage(usize),

  /// The image reduction needs a split node at every level above the
  /// hand-off nodes, but this tree's leaves stop closer to the root.
  #[error("reduction skeleton node {node} is missing or not a split")]
  IncompleteSkeleton { node: NodeId },

  /// Two ranks tried to merge images of different sizes.
  #[error("image shape mismatch: local {local:?}, received {received:?}")]
  ImageShapeMismatch {
    local: (usize, usize),
    received: (usize, usize),
  },

  /// The file is not a serialized kd-tree.
  #[error("not a kd-tree file (bad magic)")]
  BadMagic,

  /// The file was written by an incompatible format revision.
  #[error("unsupported kd-tree file version {0}")]
  UnsupportedVersion(u32),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error("encode/decode failed: {0}")]
  Codec(#[from] postcard::Error),
}
