//! Grid hierarchy abstraction.
//!
//! The tree never owns simulation data. A [`GridCatalog`] exposes the patch
//! hierarchy (edges, levels, parent/child links) and serves vertex-centered
//! samples on demand; everything else in this crate works against that
//! trait.
//!
//! ```text
//!   level 0   +-------------------+     coarse patch, cells 8^3
//!             |   +-----+         |
//!   level 1   |   | g1  |         |     finer patch nested inside,
//!             |   +-----+         |     half the cell width
//!             +-------------------+
//! ```

use glam::{DVec3, IVec3};

use crate::bounds::Aabb3;
use crate::config::GhostPolicy;

// ============================================================================
// Grid identity and geometry
// ============================================================================

/// Stable identifier of a grid patch within its catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridId(pub u32);

/// Geometry of one rectangular AMR patch.
#[derive(Clone, Debug)]
pub struct GridPatch {
  pub id: GridId,
  /// Minimum corner in domain coordinates.
  pub left_edge: DVec3,
  /// Maximum corner in domain coordinates.
  pub right_edge: DVec3,
  /// Refinement level, 0 = coarsest.
  pub level: u32,
  /// Finer patches nested inside this one.
  pub children: Vec<GridId>,
  /// Cells per axis.
  pub dims: IVec3,
}

impl GridPatch {
  /// The patch's box in domain coordinates.
  #[inline]
  pub fn bounds(&self) -> Aabb3 {
    Aabb3::new(self.left_edge, self.right_edge)
  }

  /// Cell width per axis.
  #[inline]
  pub fn cell_width(&self) -> DVec3 {
    (self.right_edge - self.left_edge) / self.dims.as_dvec3()
  }
}

// ============================================================================
// Sample storage
// ============================================================================

/// Dense row-major block of f64 samples, x slowest, z fastest.
///
/// Vertex-centered blocks have `cells + 1` samples per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarBlock {
  dims: [usize; 3],
  data: Vec<f64>,
}

impl ScalarBlock {
  /// Wrap an existing sample vector.
  ///
  /// # Panics
  /// Panics if `data.len()` does not match the product of `dims`.
  pub fn new(dims: [usize; 3], data: Vec<f64>) -> Self {
    assert_eq!(
      data.len(),
      dims[0] * dims[1] * dims[2],
      "sample count must match block dims"
    );
    Self { dims, data }
  }

  /// Fill a block by evaluating `f` at every `(x, y, z)` sample index.
  pub fn from_fn(dims: [usize; 3], mut f: impl FnMut(usize, usize, usize) -> f64) -> Self {
    let mut data = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
    for x in 0..dims[0] {
      for y in 0..dims[1] {
        for z in 0..dims[2] {
          data.push(f(x, y, z));
        }
      }
    }
    Self { dims, data }
  }

  /// Sample counts per axis.
  #[inline]
  pub fn dims(&self) -> [usize; 3] {
    self.dims
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.data.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  #[inline]
  fn offset(&self, x: usize, y: usize, z: usize) -> usize {
    (x * self.dims[1] + y) * self.dims[2] + z
  }

  /// Sample at `(x, y, z)`.
  ///
  /// # Panics
  /// Panics on an out-of-range index.
  #[inline]
  pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
    self.data[self.offset(x, y, z)]
  }

  /// Copy out the inclusive sub-block `lo..=hi` on every axis.
  ///
  /// For a vertex-centered block, passing a leaf's cell window yields the
  /// `cells + 1` vertices spanning those cells.
  ///
  /// # Panics
  /// Debug-asserts the window lies inside the block.
  pub fn slice(&self, lo: IVec3, hi: IVec3) -> ScalarBlock {
    let lo = [lo.x as usize, lo.y as usize, lo.z as usize];
    let hi = [hi.x as usize, hi.y as usize, hi.z as usize];
    for axis in 0..3 {
      debug_assert!(
        lo[axis] <= hi[axis] && hi[axis] < self.dims[axis],
        "slice window must lie inside the block"
      );
    }
    let dims = [hi[0] - lo[0] + 1, hi[1] - lo[1] + 1, hi[2] - lo[2] + 1];
    let mut data = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
    for x in lo[0]..=hi[0] {
      for y in lo[1]..=hi[1] {
        for z in lo[2]..=hi[2] {
          data.push(self.get(x, y, z));
        }
      }
    }
    ScalarBlock { dims, data }
  }

  /// Apply `f` to every sample in place.
  pub fn map_in_place(&mut self, f: impl Fn(f64) -> f64) {
    for value in &mut self.data {
      *value = f(*value);
    }
  }

  /// Flat sample storage, x slowest.
  #[inline]
  pub fn data(&self) -> &[f64] {
    &self.data
  }

  pub fn into_data(self) -> Vec<f64> {
    self.data
  }
}

// ============================================================================
// Catalog trait
// ============================================================================

/// Source of grid geometry and field data.
///
/// Implementations must be thread-safe: brick materialization fetches
/// several grids' samples in parallel.
pub trait GridCatalog: Send + Sync {
  /// Full extent of the simulation domain.
  fn domain_bounds(&self) -> Aabb3;

  /// Finest refinement level present.
  fn max_level(&self) -> u32;

  /// Ids of grids (any level) overlapping `bounds`.
  fn grids_overlapping(&self, bounds: &Aabb3) -> Vec<GridId>;

  /// Geometry of one grid.
  fn grid(&self, id: GridId) -> &GridPatch;

  /// Vertex-centered samples of `field` over the whole grid, shape
  /// `cells + 1` per axis. `ghost` controls how the one-cell margin beyond
  /// the grid is filled before resampling.
  fn vertex_centered_samples(&self, id: GridId, field: &str, ghost: GhostPolicy) -> ScalarBlock;

  /// Whether a field should be log10-scaled when no explicit toggle is
  /// configured. Emission-like fields span decades, so the default is yes.
  fn default_log_transform(&self, _field: &str) -> bool {
    true
  }
}
