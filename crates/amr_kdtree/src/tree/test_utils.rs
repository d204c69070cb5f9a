//! Hand-built grid hierarchies with analytic sample data.
//!
//! Every fixture keeps grid ids equal to vector positions and fills sample
//! blocks with [`MockCatalog::sample_value`], so tests can predict any
//! vertex of any brick without storing arrays.

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{DVec3, IVec3};

use crate::bounds::Aabb3;
use crate::config::GhostPolicy;
use crate::grid::{GridCatalog, GridId, GridPatch, ScalarBlock};

pub struct MockCatalog {
  domain: Aabb3,
  grids: Vec<GridPatch>,
  max_level: u32,
  fetches: AtomicUsize,
}

impl MockCatalog {
  pub fn new(domain: Aabb3, grids: Vec<GridPatch>) -> Self {
    for (position, patch) in grids.iter().enumerate() {
      assert_eq!(patch.id, GridId(position as u32), "grid ids must be positional");
    }
    let max_level = grids.iter().map(|patch| patch.level).max().unwrap_or(0);
    Self {
      domain,
      grids,
      max_level,
      fetches: AtomicUsize::new(0),
    }
  }

  /// `n` level-0 slabs tiling the unit cube along x.
  pub fn slabs(n: usize) -> Self {
    let width = 1.0 / n as f64;
    let grids = (0..n)
      .map(|i| GridPatch {
        id: GridId(i as u32),
        left_edge: DVec3::new(i as f64 * width, 0.0, 0.0),
        right_edge: DVec3::new((i + 1) as f64 * width, 1.0, 1.0),
        level: 0,
        children: Vec::new(),
        dims: IVec3::splat(8),
      })
      .collect();
    Self::new(Aabb3::unit(), grids)
  }

  /// One coarse root grid with a level-1 child refining the low octant.
  pub fn refined() -> Self {
    let grids = vec![
      GridPatch {
        id: GridId(0),
        left_edge: DVec3::ZERO,
        right_edge: DVec3::ONE,
        level: 0,
        children: vec![GridId(1)],
        dims: IVec3::splat(8),
      },
      GridPatch {
        id: GridId(1),
        left_edge: DVec3::ZERO,
        right_edge: DVec3::splat(0.5),
        level: 1,
        children: Vec::new(),
        dims: IVec3::splat(8),
      },
    ];
    Self::new(Aabb3::unit(), grids)
  }

  /// Three level-0 grids tiling the unit cube in an L: one spans the full
  /// low-y half and straddles the first split, two quarter grids fill the
  /// high-y half.
  pub fn l_shaped() -> Self {
    let grids = vec![
      GridPatch {
        id: GridId(0),
        left_edge: DVec3::ZERO,
        right_edge: DVec3::new(1.0, 0.5, 1.0),
        level: 0,
        children: Vec::new(),
        dims: IVec3::new(8, 4, 8),
      },
      GridPatch {
        id: GridId(1),
        left_edge: DVec3::new(0.0, 0.5, 0.0),
        right_edge: DVec3::new(0.5, 1.0, 1.0),
        level: 0,
        children: Vec::new(),
        dims: IVec3::new(4, 4, 8),
      },
      GridPatch {
        id: GridId(2),
        left_edge: DVec3::new(0.5, 0.5, 0.0),
        right_edge: DVec3::ONE,
        level: 0,
        children: Vec::new(),
        dims: IVec3::new(4, 4, 8),
      },
    ];
    Self::new(Aabb3::unit(), grids)
  }

  /// Four level-0 grids: one covers the low-x half, a half and two quarters
  /// tile the high-x half. The root split isolates the covering grid, so
  /// the left branch leafs out at depth 1 while the right one reaches
  /// depth 3.
  pub fn lopsided() -> Self {
    let grids = vec![
      GridPatch {
        id: GridId(0),
        left_edge: DVec3::ZERO,
        right_edge: DVec3::new(0.5, 1.0, 1.0),
        level: 0,
        children: Vec::new(),
        dims: IVec3::new(4, 8, 8),
      },
      GridPatch {
        id: GridId(1),
        left_edge: DVec3::new(0.5, 0.0, 0.0),
        right_edge: DVec3::new(1.0, 0.5, 1.0),
        level: 0,
        children: Vec::new(),
        dims: IVec3::new(4, 4, 8),
      },
      GridPatch {
        id: GridId(2),
        left_edge: DVec3::new(0.5, 0.5, 0.0),
        right_edge: DVec3::new(1.0, 1.0, 0.5),
        level: 0,
        children: Vec::new(),
        dims: IVec3::new(4, 4, 4),
      },
      GridPatch {
        id: GridId(3),
        left_edge: DVec3::new(0.5, 0.5, 0.5),
        right_edge: DVec3::ONE,
        level: 0,
        children: Vec::new(),
        dims: IVec3::new(4, 4, 4),
      },
    ];
    Self::new(Aabb3::unit(), grids)
  }

  /// Two level-0 grids with an uncovered gap between them.
  pub fn gapped() -> Self {
    let grids = vec![
      GridPatch {
        id: GridId(0),
        left_edge: DVec3::ZERO,
        right_edge: DVec3::new(0.4, 1.0, 1.0),
        level: 0,
        children: Vec::new(),
        dims: IVec3::new(4, 8, 8),
      },
      GridPatch {
        id: GridId(1),
        left_edge: DVec3::new(0.6, 0.0, 0.0),
        right_edge: DVec3::ONE,
        level: 0,
        children: Vec::new(),
        dims: IVec3::new(4, 8, 8),
      },
    ];
    Self::new(Aabb3::unit(), grids)
  }

  /// Two level-0 grids sharing the exact same box, leaving no interior edge
  /// to split on.
  pub fn coincident() -> Self {
    let patch = |id| GridPatch {
      id: GridId(id),
      left_edge: DVec3::ZERO,
      right_edge: DVec3::ONE,
      level: 0,
      children: Vec::new(),
      dims: IVec3::splat(8),
    };
    Self::new(Aabb3::unit(), vec![patch(0), patch(1)])
  }

  /// Pretend the hierarchy refines down to `level` without adding grids.
  /// Shrinks the neighbor-query margin, which is one finest cell wide.
  pub fn with_max_level(mut self, level: u32) -> Self {
    self.max_level = level;
    self
  }

  /// Deterministic sample at a flat block index.
  pub fn sample_value(grid: GridId, index: usize) -> f64 {
    100.0 + grid.0 as f64 * 1000.0 + index as f64
  }

  /// How many vertex-centered blocks have been served.
  pub fn fetch_count(&self) -> usize {
    self.fetches.load(Ordering::Relaxed)
  }
}

impl GridCatalog for MockCatalog {
  fn domain_bounds(&self) -> Aabb3 {
    self.domain
  }

  fn max_level(&self) -> u32 {
    self.max_level
  }

  fn grids_overlapping(&self, bounds: &Aabb3) -> Vec<GridId> {
    self
      .grids
      .iter()
      .filter(|patch| patch.bounds().overlaps_strict(bounds))
      .map(|patch| patch.id)
      .collect()
  }

  fn grid(&self, id: GridId) -> &GridPatch {
    &self.grids[id.0 as usize]
  }

  fn vertex_centered_samples(&self, id: GridId, _field: &str, _ghost: GhostPolicy) -> ScalarBlock {
    self.fetches.fetch_add(1, Ordering::Relaxed);
    let dims = self.grid(id).dims;
    let n = [
      dims.x as usize + 1,
      dims.y as usize + 1,
      dims.z as usize + 1,
    ];
    ScalarBlock::from_fn(n, |x, y, z| {
      Self::sample_value(id, (x * n[1] + y) * n[2] + z)
    })
  }

  // Raw values keep test arithmetic readable; log scaling is exercised
  // through explicit config toggles.
  fn default_log_transform(&self, _field: &str) -> bool {
    false
  }
}
