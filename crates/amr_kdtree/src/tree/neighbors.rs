//! Spatial queries over the built tree: neighbor collection with optional
//! domain-periodic wraparound, and position-to-leaf lookup.

use std::collections::{HashMap, VecDeque};

use glam::DVec3;

use super::node::{left_child_id, right_child_id, KdNode, NodeId, NodeKind, ROOT_ID};
use crate::bounds::Aabb3;

/// Strict-overlap test between a query box and a target, retrying with a
/// domain-width translated copy of the query when periodic wraparound is on.
///
/// The translation shifts each axis on which the query pokes past the
/// domain, so a box hugging one face also sees leaves on the opposite face.
pub(crate) fn overlap_check(
  query: &Aabb3,
  target: &Aabb3,
  domain: &Aabb3,
  periodic: bool,
) -> bool {
  if query.overlaps_strict(target) {
    return true;
  }
  if !periodic {
    return false;
  }
  let width = domain.size();
  let mut offset = [0.0f64; 3];
  for axis in 0..3 {
    if query.min[axis] < domain.min[axis] {
      offset[axis] = width[axis];
    } else if query.max[axis] > domain.max[axis] {
      offset[axis] = -width[axis];
    }
  }
  let offset = DVec3::from(offset);
  offset != DVec3::ZERO && query.translate(offset).overlaps_strict(target)
}

/// Every local leaf whose box passes [`overlap_check`] against the query,
/// walking root-down and descending only into overlapping children. Remote
/// stubs are skipped: only locally built leaves are returned.
pub(crate) fn leaves_overlapping(
  arena: &HashMap<NodeId, KdNode>,
  query: &Aabb3,
  domain: &Aabb3,
  periodic: bool,
) -> Vec<NodeId> {
  let mut found = Vec::new();
  if !arena.contains_key(&ROOT_ID) {
    return found;
  }
  let mut queue = VecDeque::from([ROOT_ID]);
  while let Some(id) = queue.pop_front() {
    match &arena[&id].kind {
      NodeKind::Leaf(_) => found.push(id),
      NodeKind::Remote => {}
      NodeKind::Split(_) => {
        for child in [left_child_id(id), right_child_id(id)] {
          if let Some(node) = arena.get(&child) {
            if overlap_check(query, &node.bounds, domain, periodic) {
              queue.push_back(child);
            }
          }
        }
      }
    }
  }
  found
}

/// Walk split comparisons down to the leaf containing `position`; a point on
/// a plane descends left. Returns `None` inside a remote subtree.
pub(crate) fn locate(arena: &HashMap<NodeId, KdNode>, position: DVec3) -> Option<NodeId> {
  let mut id = ROOT_ID;
  loop {
    match &arena.get(&id)?.kind {
      NodeKind::Leaf(_) => return Some(id),
      NodeKind::Remote => return None,
      NodeKind::Split(split) => {
        id = if position[split.axis] <= split.position {
          left_child_id(id)
        } else {
          right_child_id(id)
        };
      }
    }
  }
}

#[cfg(test)]
#[path = "neighbors_test.rs"]
mod neighbors_test;
