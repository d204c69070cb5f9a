//! Partitioned sample bricks.

use glam::{DVec3, IVec3};

use crate::bounds::Aabb3;
use crate::grid::{GridId, ScalarBlock};

/// Render-ready slab of one leaf's volume: vertex-centered samples of every
/// configured field, cut from the bound grid to the leaf's box.
///
/// Bricks hold `cells + 1` vertices per axis so a ray caster can interpolate
/// across the leaf without touching its neighbors.
#[derive(Clone, Debug, PartialEq)]
pub struct Brick {
  /// Grid the samples came from.
  pub grid: GridId,
  /// One block per configured field, in field order.
  pub fields: Vec<ScalarBlock>,
  /// Minimum corner in domain coordinates.
  pub l_corner: DVec3,
  /// Maximum corner in domain coordinates.
  pub r_corner: DVec3,
  /// Cells per axis (one less than the sample counts).
  pub dims: IVec3,
}

impl Brick {
  pub fn new(
    grid: GridId,
    fields: Vec<ScalarBlock>,
    l_corner: DVec3,
    r_corner: DVec3,
    dims: IVec3,
  ) -> Self {
    Self {
      grid,
      fields,
      l_corner,
      r_corner,
      dims,
    }
  }

  #[inline]
  pub fn field_count(&self) -> usize {
    self.fields.len()
  }

  /// The brick's box in domain coordinates.
  #[inline]
  pub fn bounds(&self) -> Aabb3 {
    Aabb3::new(self.l_corner, self.r_corner)
  }
}
