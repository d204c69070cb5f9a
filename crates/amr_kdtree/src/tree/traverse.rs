//! Stack-free tree traversal.
//!
//! Both orders advance with nothing but a `(current, previous)` id pair, so
//! traversal state is O(1) regardless of tree depth and a fresh iterator can
//! always be restarted from the root. Each node is yielded exactly once, on
//! first arrival from its parent; the revisits on the way back up are
//! internal stepping only.
//!
//! Depth order yields parents before their subtrees. Viewpoint order
//! descends the far side of every split plane first, so the leaves stream
//! strictly back-to-front for the given viewpoint.

use std::collections::HashMap;

use glam::DVec3;

use super::node::{left_child_id, parent_id, right_child_id, KdNode, NodeId, NodeKind, ROOT_ID};

/// One step of the depth-first walk. Returns the next `(current, previous)`
/// pair; `current = None` means the walk has left the tree.
pub(crate) fn step_depth(
  arena: &HashMap<NodeId, KdNode>,
  current: NodeId,
  previous: Option<NodeId>,
) -> (Option<NodeId>, Option<NodeId>) {
  let up = (parent_id(current), Some(current));
  if !arena[&current].is_split() {
    return up;
  }
  let left = left_child_id(current);
  let right = right_child_id(current);
  if previous == parent_id(current) {
    // Arrived from above: head down the left side, falling back to the
    // right if the left subtree is absent.
    if arena.contains_key(&left) {
      (Some(left), Some(current))
    } else if arena.contains_key(&right) {
      (Some(right), Some(current))
    } else {
      up
    }
  } else if previous == Some(left) {
    if arena.contains_key(&right) {
      (Some(right), Some(current))
    } else {
      up
    }
  } else {
    up
  }
}

/// One step of the back-to-front walk for `viewpoint`.
pub(crate) fn step_viewpoint(
  arena: &HashMap<NodeId, KdNode>,
  current: NodeId,
  previous: Option<NodeId>,
  viewpoint: DVec3,
) -> (Option<NodeId>, Option<NodeId>) {
  let up = (parent_id(current), Some(current));
  let node = &arena[&current];
  let NodeKind::Split(split) = &node.kind else {
    return up;
  };
  let left = left_child_id(current);
  let right = right_child_id(current);
  // The child on the viewpoint's side of the plane is near; the other is
  // far. Far renders first.
  let (near, far) = if viewpoint[split.axis] < split.position {
    (left, right)
  } else {
    (right, left)
  };
  if previous == parent_id(current) {
    if arena.contains_key(&far) {
      (Some(far), Some(current))
    } else if arena.contains_key(&near) {
      (Some(near), Some(current))
    } else {
      up
    }
  } else if previous == Some(far) {
    if arena.contains_key(&near) {
      (Some(near), Some(current))
    } else {
      up
    }
  } else {
    up
  }
}

/// Depth-first iterator over node ids, parents before their subtrees.
pub struct DepthTraverse<'a> {
  arena: &'a HashMap<NodeId, KdNode>,
  current: Option<NodeId>,
  previous: Option<NodeId>,
}

impl<'a> DepthTraverse<'a> {
  pub(crate) fn new(arena: &'a HashMap<NodeId, KdNode>) -> Self {
    Self {
      arena,
      current: arena.contains_key(&ROOT_ID).then_some(ROOT_ID),
      previous: None,
    }
  }
}

impl Iterator for DepthTraverse<'_> {
  type Item = NodeId;

  fn next(&mut self) -> Option<NodeId> {
    loop {
      let id = self.current?;
      let first_visit = self.previous == parent_id(id);
      let (current, previous) = step_depth(self.arena, id, self.previous);
      self.current = current;
      self.previous = previous;
      if first_visit {
        return Some(id);
      }
    }
  }
}

/// Back-to-front iterator over node ids for a fixed viewpoint.
pub struct ViewpointTraverse<'a> {
  arena: &'a HashMap<NodeId, KdNode>,
  viewpoint: DVec3,
  current: Option<NodeId>,
  previous: Option<NodeId>,
}

impl<'a> ViewpointTraverse<'a> {
  pub(crate) fn new(arena: &'a HashMap<NodeId, KdNode>, viewpoint: DVec3) -> Self {
    Self {
      arena,
      viewpoint,
      current: arena.contains_key(&ROOT_ID).then_some(ROOT_ID),
      previous: None,
    }
  }
}

impl Iterator for ViewpointTraverse<'_> {
  type Item = NodeId;

  fn next(&mut self) -> Option<NodeId> {
    loop {
      let id = self.current?;
      let first_visit = self.previous == parent_id(id);
      let (current, previous) = step_viewpoint(self.arena, id, self.previous, self.viewpoint);
      self.current = current;
      self.previous = previous;
      if first_visit {
        return Some(id);
      }
    }
  }
}

#[cfg(test)]
#[path = "traverse_test.rs"]
mod traverse_test;
