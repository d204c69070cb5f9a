//! The AMR kd-tree: construction, traversal, accounting, and queries.
//!
//! ```text
//!   GridCatalog ──► build ────► KdTree (arena of heap-id nodes)
//!        │                       │
//!        └── materialize ────────┼── bricks, one fetch per unique grid
//!                                ├── depth_traverse / viewpoint_traverse
//!                                ├── neighbors / locate
//!                                └── composite ──► rank 0 final image
//! ```
//!
//! A render pass is: build once, materialize (or load) bricks, walk
//! `viewpoint_bricks` handing each brick to the ray caster back-to-front,
//! then `composite` the per-rank partial images.

pub mod node;
pub mod traverse;

mod accounting;
mod builder;
mod neighbors;

#[cfg(test)]
pub mod test_utils;

use std::collections::HashMap;
use std::path::Path;

use glam::DVec3;
use rayon::prelude::*;
use web_time::Instant;

use crate::bounds::Aabb3;
use crate::brick::Brick;
use crate::comm::CommContext;
use crate::compositor::{self, ImageBuffer};
use crate::config::{GhostPolicy, PartitionStrategy, TreeConfig};
use crate::error::KdTreeError;
use crate::grid::{GridCatalog, GridId, ScalarBlock};
use node::{KdNode, NodeId, ROOT_ID};
use traverse::{DepthTraverse, ViewpointTraverse};

/// Counters from one build.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildStats {
  /// Nodes in the local arena, remote stubs included.
  pub nodes: usize,
  /// Local leaves.
  pub leaves: usize,
  /// Cost of the local subtree (root cost).
  pub total_cost: u64,
  /// Volume covered by local leaves.
  pub volume: f64,
  /// Wall-clock build time in microseconds.
  pub build_us: u64,
}

/// Spatial index over an AMR grid hierarchy.
///
/// Leaves bind exactly one grid at a single resolution; interior nodes carry
/// a dividing plane. In a parallel group each rank holds its own subtree
/// plus the shared skeleton, with remote stubs marking the other ranks'
/// subtrees.
#[derive(Debug)]
pub struct KdTree {
  pub(crate) arena: HashMap<NodeId, KdNode>,
  pub(crate) domain: Aabb3,
  pub(crate) region: Aabb3,
  pub(crate) local_bounds: Aabb3,
  pub(crate) fields: Vec<String>,
  pub(crate) log_fields: Vec<bool>,
  pub(crate) max_level: u32,
  pub(crate) ghost_policy: GhostPolicy,
  pub(crate) strategy: PartitionStrategy,
  pub(crate) comm: CommContext,
  pub(crate) bricks_loaded: bool,
  pub(crate) stats: BuildStats,
}

impl KdTree {
  /// Build the tree over `catalog` for this rank.
  ///
  /// Every rank of the group calls this with its own context; construction
  /// involves no communication. The region (if any) is clipped to the
  /// domain, and the refinement floor is the finer of the configured and
  /// present maximum levels.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "kdtree::build"))]
  pub fn build<C: GridCatalog + ?Sized>(
    catalog: &C,
    config: TreeConfig,
    comm: CommContext,
  ) -> Result<Self, KdTreeError> {
    if !comm.size().is_power_of_two() {
      return Err(KdTreeError::ProcessCountNotPowerOfTwo(comm.size()));
    }
    let start = Instant::now();
    let domain = catalog.domain_bounds();
    let region = config.region.map_or(domain, |r| r.clamp_to(&domain));
    let max_level = config
      .max_level
      .map_or(catalog.max_level(), |level| level.min(catalog.max_level()));
    let log_fields = config.resolve_log_fields(catalog);

    #[cfg(feature = "tracing")]
    tracing::info!(le = ?region.min, re = ?region.max, "building kd-tree");

    let output = builder::build_tree(catalog, &config, &comm, region, max_level)?;
    let TreeConfig {
      fields,
      ghost_policy,
      strategy,
      ..
    } = config;

    let mut tree = Self {
      arena: output.arena,
      domain,
      region,
      local_bounds: output.local_bounds,
      fields,
      log_fields,
      max_level,
      ghost_policy,
      strategy,
      comm,
      bricks_loaded: false,
      stats: BuildStats::default(),
    };
    let (total_cost, volume) = accounting::run(&mut tree.arena, catalog);
    let leaves = tree.leaves().count();
    tree.stats = BuildStats {
      nodes: tree.arena.len(),
      leaves,
      total_cost,
      volume,
      build_us: start.elapsed().as_micros() as u64,
    };
    #[cfg(feature = "tracing")]
    tracing::info!(
      rank = tree.comm.rank(),
      nodes = tree.stats.nodes,
      leaves,
      total_cost,
      volume,
      "kd-tree ready"
    );
    Ok(tree)
  }

  /// Reassemble a tree from loaded parts. Derived leaf geometry stays unset.
  pub(crate) fn from_parts(
    arena: HashMap<NodeId, KdNode>,
    domain: Aabb3,
    fields: Vec<String>,
    log_fields: Vec<bool>,
    max_level: u32,
    comm: CommContext,
  ) -> Self {
    let region = arena.get(&ROOT_ID).map_or(domain, |node| node.bounds);
    let mut tree = Self {
      arena,
      domain,
      region,
      local_bounds: region,
      fields,
      log_fields,
      max_level,
      ghost_policy: GhostPolicy::default(),
      strategy: PartitionStrategy::default(),
      comm,
      bricks_loaded: false,
      stats: BuildStats::default(),
    };
    tree.stats.nodes = tree.arena.len();
    let leaves = tree.leaves().count();
    tree.stats.leaves = leaves;
    tree
  }

  // ==========================================================================
  // Structure access
  // ==========================================================================

  /// Number of nodes in the local arena.
  #[inline]
  pub fn len(&self) -> usize {
    self.arena.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.arena.is_empty()
  }

  /// Node by id, if this rank holds it.
  #[inline]
  pub fn node(&self, id: NodeId) -> Option<&KdNode> {
    self.arena.get(&id)
  }

  /// The root node.
  ///
  /// # Panics
  /// Panics on an empty tree.
  pub fn root(&self) -> &KdNode {
    &self.arena[&ROOT_ID]
  }

  #[inline]
  pub fn stats(&self) -> &BuildStats {
    &self.stats
  }

  /// Cost of the local subtree.
  ///
  /// # Panics
  /// Panics if the accounting pass has not run (loaded trees).
  pub fn total_cost(&self) -> u64 {
    self.root().cost()
  }

  /// Volume covered by local leaves.
  #[inline]
  pub fn volume(&self) -> f64 {
    self.stats.volume
  }

  #[inline]
  pub fn domain_bounds(&self) -> Aabb3 {
    self.domain
  }

  /// The (clipped) region this tree indexes.
  #[inline]
  pub fn region(&self) -> Aabb3 {
    self.region
  }

  /// Box of the subtree this rank claimed.
  #[inline]
  pub fn local_bounds(&self) -> Aabb3 {
    self.local_bounds
  }

  #[inline]
  pub fn fields(&self) -> &[String] {
    &self.fields
  }

  /// Decomposition mode this tree was built under. Callers recombining
  /// `Breadth`/`Depth` renders check [`PartitionStrategy::requires_reduction`]
  /// instead of calling [`KdTree::composite`].
  #[inline]
  pub fn strategy(&self) -> PartitionStrategy {
    self.strategy
  }

  #[inline]
  pub fn rank(&self) -> usize {
    self.comm.rank()
  }

  #[inline]
  pub fn num_ranks(&self) -> usize {
    self.comm.size()
  }

  // ==========================================================================
  // Traversal
  // ==========================================================================

  /// Depth-first walk over all local nodes, parents first.
  pub fn depth_traverse(&self) -> DepthTraverse<'_> {
    DepthTraverse::new(&self.arena)
  }

  /// Back-to-front walk for `viewpoint`; leaves emerge farthest first.
  pub fn viewpoint_traverse(&self, viewpoint: DVec3) -> ViewpointTraverse<'_> {
    ViewpointTraverse::new(&self.arena, viewpoint)
  }

  /// Local leaf ids in depth order.
  pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.depth_traverse().filter(|id| self.arena[id].is_leaf())
  }

  /// Bricks in strict back-to-front order for `viewpoint`, ready for ray
  /// casting.
  pub fn viewpoint_bricks(
    &self,
    viewpoint: DVec3,
  ) -> Result<impl Iterator<Item = &Brick> + '_, KdTreeError> {
    if !self.bricks_loaded {
      return Err(KdTreeError::BricksNotLoaded);
    }
    Ok(
      self
        .viewpoint_traverse(viewpoint)
        .filter_map(|id| self.arena[&id].as_leaf().and_then(|leaf| leaf.brick())),
    )
  }

  // ==========================================================================
  // Brick materialization
  // ==========================================================================

  /// Fetch and slice sample bricks for every local leaf.
  ///
  /// Each unique grid is fetched once, in parallel, no matter how many
  /// leaves it backs; per-field log10 scaling is applied before slicing.
  /// Idempotent: once bricks are loaded this returns immediately.
  ///
  /// # Panics
  /// Panics on a loaded tree, whose leaves carry no cell windows; use
  /// [`KdTree::load_bricks`] there instead.
  #[cfg_attr(
    feature = "tracing",
    tracing::instrument(skip_all, name = "kdtree::materialize_bricks")
  )]
  pub fn materialize_bricks<C: GridCatalog + ?Sized>(&mut self, catalog: &C) {
    if self.bricks_loaded {
      return;
    }

    // Grids are fetched for leaves still missing bricks; a partial cache
    // load leaves the rest to this pass.
    let leaf_ids: Vec<NodeId> = self.leaves().collect();
    let mut unique_grids: Vec<GridId> = Vec::new();
    for &id in &leaf_ids {
      if let Some(leaf) = self.arena[&id].as_leaf() {
        if leaf.brick().is_none() && !unique_grids.contains(&leaf.grid) {
          unique_grids.push(leaf.grid);
        }
      }
    }

    let ghost = self.ghost_policy;
    let fields = &self.fields;
    let log_fields = &self.log_fields;
    let fetched: HashMap<GridId, Vec<ScalarBlock>> = unique_grids
      .par_iter()
      .map(|&grid| {
        let blocks = fields
          .iter()
          .zip(log_fields)
          .map(|(field, &log)| {
            let mut block = catalog.vertex_centered_samples(grid, field, ghost);
            if log {
              block.map_in_place(f64::log10);
            }
            block
          })
          .collect();
        (grid, blocks)
      })
      .collect();

    for id in leaf_ids {
      let Some(node) = self.arena.get_mut(&id) else {
        continue;
      };
      let bounds = node.bounds;
      let Some(leaf) = node.as_leaf_mut() else {
        continue;
      };
      if leaf.brick.is_some() {
        continue;
      }
      let range = *leaf.range();
      let blocks: Vec<ScalarBlock> = fetched[&leaf.grid]
        .iter()
        .map(|block| block.slice(range.lo, range.hi))
        .collect();
      leaf.brick = Some(Brick::new(
        leaf.grid,
        blocks,
        bounds.min,
        bounds.max,
        range.dims,
      ));
    }
    self.bricks_loaded = true;

    #[cfg(feature = "tracing")]
    tracing::info!(grids = unique_grids.len(), "bricks materialized");
  }

  /// Whether every local leaf has its brick.
  #[inline]
  pub fn bricks_loaded(&self) -> bool {
    self.bricks_loaded
  }

  // ==========================================================================
  // Compositing
  // ==========================================================================

  /// Merge per-rank partial images along the ownership tree.
  ///
  /// Every rank calls this with the image it rendered from its own leaves;
  /// when it returns on rank 0 the buffer holds the final composite. A
  /// trailing barrier keeps the group aligned for the next pass.
  pub fn composite(&self, viewpoint: DVec3, image: &mut ImageBuffer) -> Result<(), KdTreeError> {
    compositor::reduce_images(&self.arena, &self.comm, viewpoint, image)?;
    self.comm.barrier()
  }

  // ==========================================================================
  // Spatial queries
  // ==========================================================================

  /// Local leaves within one finest-cell width of leaf `id`, the leaf
  /// itself included. `periodic` wraps the query across domain faces.
  ///
  /// # Panics
  /// Panics if `id` is not a local node.
  pub fn neighbors_of(&self, id: NodeId, periodic: bool) -> Vec<NodeId> {
    let node = &self.arena[&id];
    let dx = self.domain.size() / 2f64.powi(self.max_level as i32);
    let query = node.bounds.expand(dx);
    neighbors::leaves_overlapping(&self.arena, &query, &self.domain, periodic)
  }

  /// Local leaves strictly overlapping an arbitrary query box.
  pub fn neighbors_in_box(&self, query: &Aabb3, periodic: bool) -> Vec<NodeId> {
    neighbors::leaves_overlapping(&self.arena, query, &self.domain, periodic)
  }

  /// Grids backing the neighbors of leaf `id`, with repeats collapsed.
  pub fn neighbor_grids(&self, id: NodeId, periodic: bool) -> Vec<GridId> {
    let mut grids = Vec::new();
    for neighbor in self.neighbors_of(id, periodic) {
      if let Some(leaf) = self.arena[&neighbor].as_leaf() {
        if !grids.contains(&leaf.grid) {
          grids.push(leaf.grid);
        }
      }
    }
    grids
  }

  /// The local leaf containing `position`, or `None` outside the region or
  /// inside another rank's subtree. A point on a split plane descends left.
  pub fn locate(&self, position: DVec3) -> Option<NodeId> {
    if !self.region.contains_point(position) {
      return None;
    }
    neighbors::locate(&self.arena, position)
  }

  // ==========================================================================
  // Persistence
  // ==========================================================================

  /// Serialize the local node table. Bricks travel separately through
  /// [`KdTree::store_bricks`].
  pub fn store(&self, path: &Path) -> Result<(), KdTreeError> {
    crate::persist::store_tree(self, path)
  }

  /// Load a tree stored by [`KdTree::store`].
  pub fn load(path: &Path, comm: CommContext) -> Result<Self, KdTreeError> {
    crate::persist::load_tree(path, comm)
  }

  /// Append this rank's bricks to a shared cache file, rank-ordered.
  pub fn store_bricks(&self, path: &Path) -> Result<(), KdTreeError> {
    crate::persist::store_bricks(self, path)
  }

  /// Best-effort load of cached bricks; returns whether every local leaf
  /// got one.
  pub fn load_bricks(&mut self, path: &Path) -> Result<bool, KdTreeError> {
    crate::persist::load_bricks(self, path)
  }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
