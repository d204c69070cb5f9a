//! Iterative top-down tree construction.
//!
//! The builder walks with the same stack-free `(current, previous)` step
//! discipline the traversals use, so deep refinement hierarchies never risk
//! stack exhaustion. Candidate grid sets live in a side work map keyed by
//! node id; arena nodes are only ever inserted in their final leaf, split,
//! or remote form.
//!
//! Parallel decomposition costs no communication: with `size` ranks (a power
//! of two) the nodes satisfying `(id + 1) >> log2(size) == 1` form a
//! complete hand-off level. Every rank builds the identical skeleton above
//! that level, claims the hand-off node with `id + 1 - size == rank`, builds
//! that subtree alone, and records the rest as remote stubs.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::node::{depth_of, left_child_id, right_child_id, KdNode, NodeId, ROOT_ID};
use crate::bounds::Aabb3;
use crate::comm::CommContext;
use crate::config::TreeConfig;
use crate::error::KdTreeError;
use crate::grid::{GridCatalog, GridId};

/// Per-node construction state: the node's box, the candidate grids whose
/// data could fill it, and the covering ancestor grid if one exists.
struct Pending {
  bounds: Aabb3,
  grids: Vec<GridId>,
  parent_grid: Option<GridId>,
}

pub(crate) struct BuildOutput {
  pub arena: HashMap<NodeId, KdNode>,
  /// Box of the hand-off node this rank claimed.
  pub local_bounds: Aabb3,
}

pub(crate) fn build_tree<C: GridCatalog + ?Sized>(
  catalog: &C,
  config: &TreeConfig,
  comm: &CommContext,
  region: Aabb3,
  max_level: u32,
) -> Result<BuildOutput, KdTreeError> {
  let root_grids = root_grid_set(catalog, &region);
  if root_grids.is_empty() {
    return Err(KdTreeError::EmptyRegion);
  }
  if comm.size() > root_grids.len() {
    return Err(KdTreeError::TooFewRootGrids {
      procs: comm.size(),
      grids: root_grids.len(),
    });
  }

  let hand_off_depth = comm.size().trailing_zeros();

  let mut arena: HashMap<NodeId, KdNode> = HashMap::new();
  let mut work: HashMap<NodeId, Pending> = HashMap::new();
  let mut local_bounds = region;
  work.insert(
    ROOT_ID,
    Pending {
      bounds: region,
      grids: root_grids,
      parent_grid: None,
    },
  );

  let mut current = Some(ROOT_ID);
  let mut previous: Option<NodeId> = None;

  while let Some(id) = current {
    // Finalized nodes are just navigated through.
    let Some(pending) = work.remove(&id) else {
      (current, previous) = step_build(&arena, &work, id, previous);
      continue;
    };

    // Hand-off boundary: the claimed node keeps building locally, the
    // others become remote stubs owned by their claiming rank.
    if (id + 1) >> hand_off_depth == 1 {
      let claimant = (id + 1) as usize - comm.size();
      if claimant == comm.rank() {
        local_bounds = pending.bounds;
      } else {
        arena.insert(id, KdNode::remote(pending.bounds, claimant));
        (current, previous) = step_build(&arena, &work, id, previous);
        continue;
      }
    }

    let owner = owner_for(id, hand_off_depth, comm.size());

    // A single grid covering the whole box either refines into its finer
    // children or terminates the branch as a leaf.
    if pending.grids.len() == 1 {
      let patch = catalog.grid(pending.grids[0]);
      if patch.bounds().contains(&pending.bounds) {
        if patch.level < max_level {
          let children: Vec<GridId> = patch
            .children
            .iter()
            .copied()
            .filter(|&child| catalog.grid(child).bounds().overlaps_strict(&pending.bounds))
            .collect();
          if !children.is_empty() {
            work.insert(
              id,
              Pending {
                bounds: pending.bounds,
                grids: children,
                parent_grid: Some(patch.id),
              },
            );
            // Reprocess this node with the refined candidate set.
            continue;
          }
        }
        arena.insert(id, KdNode::leaf(pending.bounds, owner, patch.id));
        (current, previous) = step_build(&arena, &work, id, previous);
        continue;
      }
    }

    // No candidates: the volume is filled at the covering ancestor's
    // resolution.
    if pending.grids.is_empty() {
      let Some(parent_grid) = pending.parent_grid else {
        return Err(KdTreeError::UncoveredRegion(pending.bounds));
      };
      arena.insert(id, KdNode::leaf(pending.bounds, owner, parent_grid));
      (current, previous) = step_build(&arena, &work, id, previous);
      continue;
    }

    // Dividing node.
    let (axis, position) = choose_split(catalog, &pending, config.split_candidate_threshold)?;
    let (left_bounds, right_bounds) = pending.bounds.split(axis, position);
    // A grid straddling the plane lands in both children.
    let left_grids: Vec<GridId> = pending
      .grids
      .iter()
      .copied()
      .filter(|&grid| catalog.grid(grid).left_edge[axis] < position)
      .collect();
    let right_grids: Vec<GridId> = pending
      .grids
      .iter()
      .copied()
      .filter(|&grid| position < catalog.grid(grid).right_edge[axis])
      .collect();

    arena.insert(id, KdNode::split(pending.bounds, owner, axis, position));
    work.insert(
      left_child_id(id),
      Pending {
        bounds: left_bounds,
        grids: left_grids,
        parent_grid: pending.parent_grid,
      },
    );
    work.insert(
      right_child_id(id),
      Pending {
        bounds: right_bounds,
        grids: right_grids,
        parent_grid: pending.parent_grid,
      },
    );
    (current, previous) = step_build(&arena, &work, id, previous);
  }

  debug_assert!(work.is_empty(), "every pending node must be finalized");
  Ok(BuildOutput {
    arena,
    local_bounds,
  })
}

/// Level-0 grids strictly overlapping the build region.
fn root_grid_set<C: GridCatalog + ?Sized>(catalog: &C, region: &Aabb3) -> Vec<GridId> {
  catalog
    .grids_overlapping(region)
    .into_iter()
    .filter(|&id| {
      let patch = catalog.grid(id);
      patch.level == 0 && patch.bounds().overlaps_strict(region)
    })
    .collect()
}

/// Owner rank of a node.
///
/// At or below the hand-off depth the owner is the rank that claimed the
/// node's hand-off ancestor. Above it, owners follow the halving rule: the
/// root is rank 0, a left child inherits its parent's owner, a right child
/// at depth `d` adds `size >> d`.
fn owner_for(id: NodeId, hand_off_depth: u32, size: usize) -> usize {
  let depth = depth_of(id);
  if depth >= hand_off_depth {
    let mut ancestor = id;
    while depth_of(ancestor) > hand_off_depth {
      ancestor = (ancestor - 1) >> 1;
    }
    (ancestor + 1) as usize - size
  } else {
    // Bits of (id + 1) below the leading one encode the root-to-node path.
    (((id + 1) - (1u64 << depth)) as usize) * (size >> depth)
  }
}

/// Elect the dividing plane for a multi-grid node.
///
/// Small candidate sets vote per axis on the number of distinct grid edges
/// strictly inside the box, most edges winning (ties toward the lower axis).
/// Large sets skip the vote and use the box's longest axis with the raw,
/// undeduplicated edge list. Either way the plane lands on the lower-median
/// entry of the sorted candidates.
fn choose_split<C: GridCatalog + ?Sized>(
  catalog: &C,
  pending: &Pending,
  threshold: usize,
) -> Result<(usize, f64), KdTreeError> {
  if pending.grids.len() > threshold {
    let axis = pending.bounds.longest_axis();
    let mut edges = interior_edges(catalog, &pending.grids, &pending.bounds, axis);
    edges.sort_unstable_by(|a, b| a.total_cmp(b));
    return pick_median(axis, &edges, pending);
  }

  let mut best_axis = 0;
  let mut best: SmallVec<[f64; 32]> = SmallVec::new();
  for axis in 0..3 {
    let mut edges = interior_edges(catalog, &pending.grids, &pending.bounds, axis);
    edges.sort_unstable_by(|a, b| a.total_cmp(b));
    edges.dedup();
    if edges.len() > best.len() {
      best = edges;
      best_axis = axis;
    }
  }
  pick_median(best_axis, &best, pending)
}

/// Candidate grid edges strictly inside the box along one axis.
fn interior_edges<C: GridCatalog + ?Sized>(
  catalog: &C,
  grids: &[GridId],
  bounds: &Aabb3,
  axis: usize,
) -> SmallVec<[f64; 32]> {
  let mut edges = SmallVec::new();
  for &grid in grids {
    let patch = catalog.grid(grid);
    for edge in [patch.left_edge[axis], patch.right_edge[axis]] {
      if bounds.min[axis] < edge && edge < bounds.max[axis] {
        edges.push(edge);
      }
    }
  }
  edges
}

fn pick_median(axis: usize, edges: &[f64], pending: &Pending) -> Result<(usize, f64), KdTreeError> {
  if edges.is_empty() {
    return Err(KdTreeError::DegenerateSplit {
      count: pending.grids.len(),
      bounds: pending.bounds,
    });
  }
  Ok((axis, edges[(edges.len() - 1) / 2]))
}

/// One depth-first step during construction. Same discipline as the
/// post-build depth traversal, except a child may still be pending in the
/// work map rather than finalized in the arena.
fn step_build(
  arena: &HashMap<NodeId, KdNode>,
  work: &HashMap<NodeId, Pending>,
  current: NodeId,
  previous: Option<NodeId>,
) -> (Option<NodeId>, Option<NodeId>) {
  let up = (super::node::parent_id(current), Some(current));
  if !arena[&current].is_split() {
    return up;
  }
  let exists = |id: NodeId| arena.contains_key(&id) || work.contains_key(&id);
  let left = left_child_id(current);
  let right = right_child_id(current);
  if previous == super::node::parent_id(current) {
    if exists(left) {
      (Some(left), Some(current))
    } else if exists(right) {
      (Some(right), Some(current))
    } else {
      up
    }
  } else if previous == Some(left) {
    if exists(right) {
      (Some(right), Some(current))
    } else {
      up
    }
  } else {
    up
  }
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod builder_test;
