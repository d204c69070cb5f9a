use glam::{DVec3, IVec3};

use super::test_utils::MockCatalog;
use super::KdTree;
use crate::bounds::Aabb3;
use crate::comm::CommContext;
use crate::config::{PartitionStrategy, TreeConfig};
use crate::error::KdTreeError;
use crate::grid::GridId;

fn solo_tree(catalog: &MockCatalog) -> KdTree {
  KdTree::build(catalog, TreeConfig::default(), CommContext::solo()).unwrap()
}

#[test]
fn test_build_populates_stats() {
  let catalog = MockCatalog::refined();
  let tree = solo_tree(&catalog);
  assert_eq!(tree.len(), 7);
  assert_eq!(tree.stats().nodes, 7);
  assert_eq!(tree.stats().leaves, 4);
  assert_eq!(tree.stats().total_cost, 576);
  assert!((tree.stats().volume - 1.0).abs() < 1e-12);
  assert!(tree.root().is_split());
  assert_eq!(tree.domain_bounds(), Aabb3::unit());
  assert_eq!(tree.region(), Aabb3::unit());
  assert_eq!(tree.fields(), ["Density".to_string()]);
  assert_eq!(tree.strategy(), PartitionStrategy::Domain);
}

#[test]
fn test_region_clips_to_domain() {
  let catalog = MockCatalog::refined();
  let config = TreeConfig::new().with_region(Aabb3::new(DVec3::splat(0.5), DVec3::splat(2.0)));
  let tree = KdTree::build(&catalog, config, CommContext::solo()).unwrap();
  assert_eq!(tree.region(), Aabb3::new(DVec3::splat(0.5), DVec3::ONE));
  assert_eq!(tree.len(), 1);
  assert!(tree.root().is_leaf());
  assert_eq!(tree.total_cost(), 64);
  assert!((tree.volume() - 0.125).abs() < 1e-12);
}

/// Capping max_level below the finest grids keeps the coarse data.
#[test]
fn test_max_level_caps_refinement() {
  let catalog = MockCatalog::refined();
  let config = TreeConfig::new().with_max_level(0);
  let tree = KdTree::build(&catalog, config, CommContext::solo()).unwrap();
  assert_eq!(tree.len(), 1);
  assert_eq!(tree.root().as_leaf().unwrap().grid, GridId(0));
  assert_eq!(tree.total_cost(), 512);
}

#[test]
fn test_non_power_of_two_group_rejected() {
  let comm = CommContext::local_group(3).swap_remove(0);
  let catalog = MockCatalog::slabs(4);
  let err = KdTree::build(&catalog, TreeConfig::default(), comm).unwrap_err();
  assert!(matches!(err, KdTreeError::ProcessCountNotPowerOfTwo(3)));
}

#[test]
fn test_more_ranks_than_root_grids_rejected() {
  let comm = CommContext::local_group(4).swap_remove(0);
  let catalog = MockCatalog::slabs(2);
  let err = KdTree::build(&catalog, TreeConfig::default(), comm).unwrap_err();
  assert!(matches!(
    err,
    KdTreeError::TooFewRootGrids { procs: 4, grids: 2 }
  ));
}

#[test]
fn test_region_outside_all_grids_rejected() {
  let catalog = MockCatalog::refined();
  let config = TreeConfig::new().with_region(Aabb3::new(DVec3::splat(2.0), DVec3::splat(3.0)));
  let err = KdTree::build(&catalog, config, CommContext::solo()).unwrap_err();
  assert!(matches!(err, KdTreeError::EmptyRegion));
}

/// Each unique grid is fetched once per field no matter how many leaves it
/// backs, and a second materialize call is a no-op.
#[test]
fn test_materialize_fetches_each_grid_once() {
  let catalog = MockCatalog::refined();
  let mut tree = solo_tree(&catalog);
  assert!(!tree.bricks_loaded());
  assert!(tree.viewpoint_bricks(DVec3::splat(0.1)).is_err());

  tree.materialize_bricks(&catalog);
  assert!(tree.bricks_loaded());
  // Three leaves share grid 0; one holds grid 1.
  assert_eq!(catalog.fetch_count(), 2);

  tree.materialize_bricks(&catalog);
  assert_eq!(catalog.fetch_count(), 2);
}

/// Bricks carry the vertex samples spanning exactly the leaf's cell window.
#[test]
fn test_brick_geometry_and_content() {
  let catalog = MockCatalog::refined();
  let mut tree = solo_tree(&catalog);
  tree.materialize_bricks(&catalog);

  let coarse = tree.node(2).unwrap();
  let brick = coarse.as_leaf().unwrap().brick().unwrap();
  assert_eq!(brick.grid, GridId(0));
  assert_eq!(brick.dims, IVec3::new(4, 8, 8));
  assert_eq!(brick.fields[0].dims(), [5, 9, 9]);
  assert_eq!(brick.bounds(), coarse.bounds);
  // The brick corner sits at vertex (4, 0, 0) of the 9^3 coarse block.
  let corner = (4 * 9) * 9;
  assert_eq!(
    brick.fields[0].get(0, 0, 0),
    MockCatalog::sample_value(GridId(0), corner)
  );

  let fine = tree.node(7).unwrap().as_leaf().unwrap().brick().unwrap();
  assert_eq!(fine.grid, GridId(1));
  assert_eq!(fine.dims, IVec3::splat(8));
  assert_eq!(fine.fields[0].dims(), [9, 9, 9]);
  assert_eq!(
    fine.fields[0].get(0, 0, 0),
    MockCatalog::sample_value(GridId(1), 0)
  );
}

#[test]
fn test_log_fields_scale_samples() {
  let catalog = MockCatalog::refined();
  let config = TreeConfig::new().with_log_fields(vec![true]);
  let mut tree = KdTree::build(&catalog, config, CommContext::solo()).unwrap();
  tree.materialize_bricks(&catalog);
  let fine = tree.node(7).unwrap().as_leaf().unwrap().brick().unwrap();
  let expected = MockCatalog::sample_value(GridId(1), 0).log10();
  assert_eq!(fine.fields[0].get(0, 0, 0), expected);
}

#[test]
fn test_multi_field_bricks() {
  let catalog = MockCatalog::refined();
  let config =
    TreeConfig::new().with_fields(vec!["Density".to_string(), "Temperature".to_string()]);
  let mut tree = KdTree::build(&catalog, config, CommContext::solo()).unwrap();
  tree.materialize_bricks(&catalog);
  assert_eq!(catalog.fetch_count(), 4);
  for id in tree.leaves().collect::<Vec<_>>() {
    let brick = tree.node(id).unwrap().as_leaf().unwrap().brick().unwrap();
    assert_eq!(brick.field_count(), 2);
  }
}

#[test]
fn test_viewpoint_bricks_stream_back_to_front() {
  let catalog = MockCatalog::refined();
  let mut tree = solo_tree(&catalog);
  tree.materialize_bricks(&catalog);
  let viewpoint = DVec3::splat(0.1);
  let grids: Vec<GridId> = tree
    .viewpoint_bricks(viewpoint)
    .unwrap()
    .map(|brick| brick.grid)
    .collect();
  assert_eq!(grids, vec![GridId(0), GridId(0), GridId(0), GridId(1)]);
  let bricks: Vec<_> = tree.viewpoint_bricks(viewpoint).unwrap().collect();
  assert_eq!(bricks[0].bounds(), tree.node(2).unwrap().bounds);
  assert_eq!(bricks[3].bounds(), tree.node(7).unwrap().bounds);
}

#[test]
fn test_locate_respects_region() {
  let catalog = MockCatalog::refined();
  let config = TreeConfig::new().with_region(Aabb3::new(DVec3::splat(0.5), DVec3::ONE));
  let tree = KdTree::build(&catalog, config, CommContext::solo()).unwrap();
  assert_eq!(tree.locate(DVec3::splat(0.75)), Some(0));
  assert_eq!(tree.locate(DVec3::new(0.25, 0.6, 0.6)), None);
}
