//! Post-construction cost and volume accounting.

use std::collections::HashMap;

use super::node::{left_child_id, right_child_id, KdNode, LeafRange, NodeId, NodeKind, ROOT_ID};
use super::traverse::DepthTraverse;
use crate::grid::GridCatalog;

/// Fill in leaf cell windows, per-node rendering costs, and the total
/// covered volume.
///
/// A leaf's cost is its cell count discounted by `4^level`, truncated to an
/// integer; a split's cost is the sum of its children's, with an absent or
/// remote child contributing nothing. Volume sums the boxes of local leaves
/// only. Returns `(total_cost, volume)`.
pub(crate) fn run<C: GridCatalog + ?Sized>(
  arena: &mut HashMap<NodeId, KdNode>,
  catalog: &C,
) -> (u64, f64) {
  let order: Vec<NodeId> = DepthTraverse::new(arena).collect();
  let mut volume = 0.0;

  // Reversed depth order puts children before their parents, so split costs
  // always read finished child costs.
  for &id in order.iter().rev() {
    let (range, cost, leaf_volume) = node_update(arena, catalog, id);
    volume += leaf_volume;
    if let Some(node) = arena.get_mut(&id) {
      node.cost = Some(cost);
      if let (Some(range), NodeKind::Leaf(leaf)) = (range, &mut node.kind) {
        leaf.range = Some(range);
      }
    }
  }

  let total = arena.get(&ROOT_ID).and_then(|node| node.cost).unwrap_or(0);
  (total, volume)
}

fn node_update<C: GridCatalog + ?Sized>(
  arena: &HashMap<NodeId, KdNode>,
  catalog: &C,
  id: NodeId,
) -> (Option<LeafRange>, u64, f64) {
  let node = &arena[&id];
  match &node.kind {
    NodeKind::Leaf(leaf) => {
      let patch = catalog.grid(leaf.grid);
      let dds = patch.cell_width();
      let lo = ((node.bounds.min - patch.left_edge) / dds).round().as_ivec3();
      let hi = ((node.bounds.max - patch.left_edge) / dds).round().as_ivec3();
      let dims = hi - lo;
      let cells = dims.x as i64 * dims.y as i64 * dims.z as i64;
      let cost = (cells as f64 / 4f64.powi(patch.level as i32)) as u64;
      (
        Some(LeafRange { lo, hi, dims }),
        cost,
        node.bounds.volume(),
      )
    }
    NodeKind::Split(_) => {
      let left = arena
        .get(&left_child_id(id))
        .and_then(|node| node.cost)
        .unwrap_or(0);
      let right = arena
        .get(&right_child_id(id))
        .and_then(|node| node.cost)
        .unwrap_or(0);
      (None, left + right, 0.0)
    }
    NodeKind::Remote => (None, 0, 0.0),
  }
}
