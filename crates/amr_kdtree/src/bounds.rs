//! Axis-aligned bounding boxes in double precision.
//!
//! All tree geometry is f64: AMR domains span many refinement levels, and
//! split planes must reproduce grid edge coordinates exactly.

use glam::DVec3;

/// Double-precision axis-aligned bounding box.
///
/// Used for the simulation domain, the build region, per-node bounds, and
/// neighbor query boxes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb3 {
  /// Minimum corner.
  pub min: DVec3,
  /// Maximum corner.
  pub max: DVec3,
}

impl Aabb3 {
  /// Create a new box from min and max corners.
  ///
  /// # Panics
  /// Debug-asserts that `min <= max` on all axes.
  pub fn new(min: DVec3, max: DVec3) -> Self {
    debug_assert!(
      min.x <= max.x && min.y <= max.y && min.z <= max.z,
      "box min must be <= max on all axes"
    );
    Self { min, max }
  }

  /// The unit cube `[0, 1]^3`.
  pub fn unit() -> Self {
    Self::new(DVec3::ZERO, DVec3::ONE)
  }

  /// Extent per axis (`max - min`).
  #[inline]
  pub fn size(&self) -> DVec3 {
    self.max - self.min
  }

  /// Center point of the box.
  #[inline]
  pub fn center(&self) -> DVec3 {
    (self.min + self.max) * 0.5
  }

  /// Volume spanned by the box.
  #[inline]
  pub fn volume(&self) -> f64 {
    let s = self.size();
    s.x * s.y * s.z
  }

  /// Whether `point` lies inside the box (boundary inclusive).
  #[inline]
  pub fn contains_point(&self, point: DVec3) -> bool {
    point.x >= self.min.x
      && point.x <= self.max.x
      && point.y >= self.min.y
      && point.y <= self.max.y
      && point.z >= self.min.z
      && point.z <= self.max.z
  }

  /// Whether `other` lies entirely inside this box (boundary inclusive).
  #[inline]
  pub fn contains(&self, other: &Aabb3) -> bool {
    self.min.x <= other.min.x
      && self.min.y <= other.min.y
      && self.min.z <= other.min.z
      && self.max.x >= other.max.x
      && self.max.y >= other.max.y
      && self.max.z >= other.max.z
  }

  /// Strict open-interval overlap on all three axes.
  ///
  /// Boxes that merely share a face do not overlap under this test. This is
  /// the intersection test used for grid/node assignment throughout the
  /// tree, so face-adjacent grids never leak into a sibling's volume.
  #[inline]
  pub fn overlaps_strict(&self, other: &Aabb3) -> bool {
    self.min.x < other.max.x
      && self.max.x > other.min.x
      && self.min.y < other.max.y
      && self.max.y > other.min.y
      && self.min.z < other.max.z
      && self.max.z > other.min.z
  }

  /// Clamp both corners into `outer`.
  pub fn clamp_to(&self, outer: &Aabb3) -> Aabb3 {
    Aabb3::new(
      self.min.clamp(outer.min, outer.max),
      self.max.clamp(outer.min, outer.max),
    )
  }

  /// Grow the box by `amount` on every side.
  pub fn expand(&self, amount: DVec3) -> Aabb3 {
    Aabb3::new(self.min - amount, self.max + amount)
  }

  /// Shift the box by `offset`.
  pub fn translate(&self, offset: DVec3) -> Aabb3 {
    Aabb3 {
      min: self.min + offset,
      max: self.max + offset,
    }
  }

  /// Split into left and right halves along `axis` at `position`.
  ///
  /// `position` must lie inside the box's extent on that axis.
  pub fn split(&self, axis: usize, position: f64) -> (Aabb3, Aabb3) {
    debug_assert!(
      self.min[axis] < position && position < self.max[axis],
      "split position must be strictly inside the box"
    );
    let mut left_max = self.max;
    left_max[axis] = position;
    let mut right_min = self.min;
    right_min[axis] = position;
    (Aabb3::new(self.min, left_max), Aabb3::new(right_min, self.max))
  }

  /// Axis with the largest extent, ties broken toward the lower index.
  pub fn longest_axis(&self) -> usize {
    let s = self.size();
    let mut axis = 0;
    if s.y > s[axis] {
      axis = 1;
    }
    if s.z > s[axis] {
      axis = 2;
    }
    axis
  }
}
