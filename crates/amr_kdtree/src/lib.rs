//! amr_kdtree - kd-tree domain decomposition for AMR volume rendering
//!
//! This crate partitions an adaptive-mesh-refinement grid hierarchy into a
//! kd-tree whose leaves each bind exactly one grid at a single resolution.
//! Overlap between coarse and fine patches is resolved during construction,
//! so walking the leaves back-to-front yields non-overlapping bricks ready
//! for an over-operator ray caster.
//!
//! # Features
//!
//! - **Deterministic construction**: grid-edge median splits produce the
//!   same tree on every rank with no communication
//! - **Stack-free traversal**: depth and back-to-front orders advance with
//!   a two-id cursor, restartable at any time
//! - **Static parallel decomposition**: power-of-two rank groups claim
//!   disjoint subtrees by id arithmetic alone
//! - **Tree compositing**: partial images merge along the ownership tree
//!   until rank 0 holds the final frame
//! - **Persistence**: node tables and sample bricks round-trip through a
//!   compact binary cache
//!
//! # Example
//!
//! ```ignore
//! use amr_kdtree::{CommContext, ImageBuffer, KdTree, TreeConfig};
//! use glam::DVec3;
//!
//! let config = TreeConfig::new().with_fields(vec!["Density".into()]);
//! let mut tree = KdTree::build(&catalog, config, CommContext::solo())?;
//! tree.materialize_bricks(&catalog);
//!
//! let viewpoint = DVec3::new(2.0, 1.5, 1.0);
//! let mut image = ImageBuffer::new(512, 512);
//! for brick in tree.viewpoint_bricks(viewpoint)? {
//!     // cast rays through brick, accumulate into image
//! }
//! tree.composite(viewpoint, &mut image)?;
//! ```

pub mod bounds;
pub mod brick;
pub mod config;
pub mod error;
pub mod grid;

// Re-export commonly used items
pub use bounds::Aabb3;
pub use brick::Brick;
pub use config::{GhostPolicy, PartitionStrategy, TreeConfig};
pub use error::KdTreeError;
pub use grid::{GridCatalog, GridId, GridPatch, ScalarBlock};

// The tree itself: nodes, construction, traversal, queries
pub mod tree;
pub use tree::node::{KdNode, LeafNode, LeafRange, NodeId, NodeKind, SplitNode, ROOT_ID};
pub use tree::traverse::{DepthTraverse, ViewpointTraverse};
pub use tree::{BuildStats, KdTree};

// Rank-to-rank channels for parallel build groups
pub mod comm;
pub use comm::CommContext;

// Image buffers and the distributed over-operator reduction
mod compositor;
pub use compositor::{ImageBuffer, CHANNELS};

// Binary cache for node tables and bricks
mod persist;
