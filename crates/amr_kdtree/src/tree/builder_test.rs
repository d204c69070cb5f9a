use glam::{DVec3, IVec3};

use super::super::test_utils::MockCatalog;
use super::super::KdTree;
use crate::bounds::Aabb3;
use crate::comm::CommContext;
use crate::config::TreeConfig;
use crate::error::KdTreeError;
use crate::grid::{GridId, GridPatch};

fn solo_tree(catalog: &MockCatalog) -> KdTree {
  KdTree::build(catalog, TreeConfig::default(), CommContext::solo()).unwrap()
}

/// Splits land on the lower-median interior grid edge.
#[test]
fn test_splits_land_on_median_grid_edges() {
  let catalog = MockCatalog::slabs(4);
  let tree = solo_tree(&catalog);
  let split_of = |id| *tree.node(id).unwrap().as_split().unwrap();
  assert_eq!((split_of(0).axis, split_of(0).position), (0, 0.5));
  assert_eq!(split_of(1).position, 0.25);
  assert_eq!(split_of(2).position, 0.75);
  assert_eq!(tree.stats().leaves, 4);
}

/// A grid straddling a dividing plane backs leaves on both sides.
#[test]
fn test_straddling_grid_lands_in_both_children() {
  let catalog = MockCatalog::l_shaped();
  let tree = solo_tree(&catalog);
  let grid_of = |id| tree.node(id).unwrap().as_leaf().unwrap().grid;
  assert_eq!(grid_of(3), GridId(0));
  assert_eq!(grid_of(5), GridId(0));
  assert_eq!(grid_of(4), GridId(1));
  assert_eq!(grid_of(6), GridId(2));
  assert_eq!(tree.total_cost(), 512);
  assert!((tree.volume() - 1.0).abs() < 1e-12);
}

/// A grid may back several leaves, but the leaf boxes themselves tile the
/// region: no pair shares interior volume.
#[test]
fn test_leaf_boxes_are_pairwise_disjoint() {
  for catalog in [MockCatalog::refined(), MockCatalog::l_shaped()] {
    let tree = solo_tree(&catalog);
    let boxes: Vec<Aabb3> = tree
      .leaves()
      .map(|id| tree.node(id).unwrap().bounds)
      .collect();
    for (i, a) in boxes.iter().enumerate() {
      for b in &boxes[i + 1..] {
        assert!(!a.overlaps_strict(b), "leaf boxes {a:?} and {b:?} overlap");
      }
    }
  }
}

/// A single covering grid refines into its children instead of leafing out,
/// and the uncovered remainder falls back to the coarse parent.
#[test]
fn test_refinement_descends_into_child_grids() {
  let catalog = MockCatalog::refined();
  let tree = solo_tree(&catalog);
  assert!(tree.root().is_split());
  let fine = tree.node(7).unwrap();
  assert_eq!(fine.as_leaf().unwrap().grid, GridId(1));
  assert_eq!(fine.bounds, Aabb3::new(DVec3::ZERO, DVec3::splat(0.5)));
  for id in [8, 4, 2] {
    assert_eq!(tree.node(id).unwrap().as_leaf().unwrap().grid, GridId(0));
  }
}

/// The per-axis vote picks the axis with the most distinct interior edges.
#[test]
fn test_axis_with_most_distinct_edges_wins() {
  let grids = (0..3u32)
    .map(|i| GridPatch {
      id: GridId(i),
      left_edge: DVec3::new(0.0, i as f64 / 3.0, 0.0),
      right_edge: DVec3::new(1.0, (i + 1) as f64 / 3.0, 1.0),
      level: 0,
      children: Vec::new(),
      dims: IVec3::splat(8),
    })
    .collect();
  let catalog = MockCatalog::new(Aabb3::unit(), grids);
  let tree = solo_tree(&catalog);
  let root = tree.root().as_split().unwrap();
  assert_eq!(root.axis, 1);
  assert_eq!(root.position, 1.0 / 3.0);
}

/// Tied votes resolve toward the lower axis index.
#[test]
fn test_tied_votes_prefer_lower_axis() {
  // The L fixture has one distinct interior edge on x and one on y.
  let catalog = MockCatalog::l_shaped();
  let tree = solo_tree(&catalog);
  assert_eq!(tree.root().as_split().unwrap().axis, 0);
}

/// Above the candidate threshold the vote is skipped and the box's longest
/// axis is split on the raw edge list.
#[test]
fn test_large_candidate_set_uses_longest_axis() {
  let catalog = MockCatalog::slabs(24);
  let tree = solo_tree(&catalog);
  let root = tree.root().as_split().unwrap();
  assert_eq!((root.axis, root.position), (0, 0.5));
  assert_eq!(tree.stats().leaves, 24);
  assert_eq!(tree.total_cost(), 24 * 512);
}

/// The fast path looks only at the longest axis, so a stretched box whose
/// long axis carries no grid edges cannot split.
#[test]
fn test_low_threshold_restricts_split_to_longest_axis() {
  let grids = vec![
    GridPatch {
      id: GridId(0),
      left_edge: DVec3::ZERO,
      right_edge: DVec3::new(0.5, 1.0, 4.0),
      level: 0,
      children: Vec::new(),
      dims: IVec3::new(8, 8, 32),
    },
    GridPatch {
      id: GridId(1),
      left_edge: DVec3::new(0.5, 0.0, 0.0),
      right_edge: DVec3::new(1.0, 1.0, 4.0),
      level: 0,
      children: Vec::new(),
      dims: IVec3::new(8, 8, 32),
    },
  ];
  let catalog = MockCatalog::new(
    Aabb3::new(DVec3::ZERO, DVec3::new(1.0, 1.0, 4.0)),
    grids,
  );
  // The vote finds the x edge.
  let tree = solo_tree(&catalog);
  let root = tree.root().as_split().unwrap();
  assert_eq!((root.axis, root.position), (0, 0.5));
  // Forcing the fast path points at z, which has no interior edges.
  let config = TreeConfig::new().with_split_candidate_threshold(1);
  let err = KdTree::build(&catalog, config, CommContext::solo()).unwrap_err();
  assert!(matches!(err, KdTreeError::DegenerateSplit { count: 2, .. }));
}

#[test]
fn test_gap_between_grids_is_uncovered() {
  let catalog = MockCatalog::gapped();
  let err = KdTree::build(&catalog, TreeConfig::default(), CommContext::solo()).unwrap_err();
  assert!(matches!(err, KdTreeError::UncoveredRegion(_)));
}

#[test]
fn test_coincident_grids_have_no_split_edge() {
  let catalog = MockCatalog::coincident();
  let err = KdTree::build(&catalog, TreeConfig::default(), CommContext::solo()).unwrap_err();
  assert!(matches!(err, KdTreeError::DegenerateSplit { count: 2, .. }));
}

/// Every rank claims the hand-off node matching its rank and stubs out the
/// rest, with no communication during the build.
#[test]
fn test_parallel_ranks_claim_disjoint_subtrees() {
  let trees: Vec<KdTree> = CommContext::local_group(4)
    .into_iter()
    .map(|comm| {
      let catalog = MockCatalog::slabs(4);
      KdTree::build(&catalog, TreeConfig::default(), comm).unwrap()
    })
    .collect();
  for (rank, tree) in trees.iter().enumerate() {
    assert_eq!(tree.rank(), rank);
    assert_eq!(tree.len(), 7);
    assert_eq!(
      tree.local_bounds(),
      Aabb3::new(
        DVec3::new(rank as f64 * 0.25, 0.0, 0.0),
        DVec3::new((rank + 1) as f64 * 0.25, 1.0, 1.0),
      )
    );
    assert_eq!(tree.total_cost(), 512);
    assert!((tree.volume() - 0.25).abs() < 1e-12);
    for other in 0..4usize {
      let node = tree.node(3 + other as u64).unwrap();
      assert_eq!(node.owner, other);
      assert_eq!(node.is_remote(), other != rank);
      assert_eq!(node.is_leaf(), other == rank);
    }
  }
}

/// Skeleton owners above the hand-off level follow the halving rule.
#[test]
fn test_skeleton_owners_halve_per_level() {
  let comm = CommContext::local_group(4).swap_remove(0);
  let catalog = MockCatalog::slabs(4);
  let tree = KdTree::build(&catalog, TreeConfig::default(), comm).unwrap();
  assert_eq!(tree.node(0).unwrap().owner, 0);
  assert_eq!(tree.node(1).unwrap().owner, 0);
  assert_eq!(tree.node(2).unwrap().owner, 2);
}

/// Below the hand-off node every descendant inherits the claiming rank.
#[test]
fn test_claimed_subtree_inherits_owner() {
  let trees: Vec<KdTree> = CommContext::local_group(2)
    .into_iter()
    .map(|comm| {
      let catalog = MockCatalog::l_shaped();
      KdTree::build(&catalog, TreeConfig::default(), comm).unwrap()
    })
    .collect();

  let rank0 = &trees[0];
  assert!(rank0.node(1).unwrap().is_split());
  assert_eq!(rank0.leaves().collect::<Vec<_>>(), vec![3, 4]);
  for id in [1, 3, 4] {
    assert_eq!(rank0.node(id).unwrap().owner, 0);
  }
  assert!(rank0.node(2).unwrap().is_remote());
  assert_eq!(rank0.node(2).unwrap().owner, 1);
  assert_eq!(rank0.total_cost(), 256);

  let rank1 = &trees[1];
  assert_eq!(rank1.leaves().collect::<Vec<_>>(), vec![5, 6]);
  for id in [2, 5, 6] {
    assert_eq!(rank1.node(id).unwrap().owner, 1);
  }
  assert!(rank1.node(1).unwrap().is_remote());
  assert!((rank1.volume() - 0.5).abs() < 1e-12);
}
