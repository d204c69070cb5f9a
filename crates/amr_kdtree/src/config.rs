//! Build configuration.

use crate::bounds::Aabb3;
use crate::grid::GridCatalog;

/// How subtrees are assigned to parallel ranks.
///
/// `Domain` is the only strategy with its own build path: ranks claim
/// disjoint subtrees at the hand-off depth and composite partial images
/// afterwards. `Breadth` and `Depth` tag trees whose per-rank images cover
/// the whole domain and reduce by plain summation upstream of this crate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PartitionStrategy {
  /// Disjoint spatial subtrees per rank; requires the tree compositor.
  #[default]
  Domain,
  /// Image-space breadth decomposition; reduction happens elsewhere.
  Breadth,
  /// Ray-depth decomposition; reduction happens elsewhere.
  Depth,
}

impl PartitionStrategy {
  /// Whether partial images must be reduced by summation rather than merged
  /// through the tree compositor.
  #[inline]
  pub fn requires_reduction(&self) -> bool {
    !matches!(self, PartitionStrategy::Domain)
  }
}

/// How the catalog fills the one-cell ghost margin when resampling a grid to
/// vertex centers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GhostPolicy {
  /// Interpolate from coarser neighbors across grid boundaries.
  #[default]
  Interpolated,
  /// Extrapolate from the grid's own interior cells.
  Extrapolated,
}

/// Build-time options for [`crate::KdTree::build`].
///
/// The defaults reproduce a plain full-domain density render: one field,
/// log-scaling decided by the catalog, refinement down to the finest level
/// present, domain decomposition.
#[derive(Clone, Debug)]
pub struct TreeConfig {
  /// Fields to carry in each brick.
  pub fields: Vec<String>,
  /// Per-field log10 toggle; `None` asks the catalog per field.
  pub log_fields: Option<Vec<bool>>,
  /// Deepest grid level to descend into; `None` means the finest present.
  pub max_level: Option<u32>,
  /// Sub-box of the domain to index; `None` means the whole domain. The box
  /// is clipped to the domain before building.
  pub region: Option<Aabb3>,
  /// Ghost-zone fill mode for vertex-centered resampling.
  pub ghost_policy: GhostPolicy,
  /// Parallel image decomposition mode.
  pub strategy: PartitionStrategy,
  /// Candidate-set size above which split election skips the per-axis vote
  /// and uses the node's longest axis directly.
  pub split_candidate_threshold: usize,
}

impl Default for TreeConfig {
  fn default() -> Self {
    Self {
      fields: vec!["Density".to_string()],
      log_fields: None,
      max_level: None,
      region: None,
      ghost_policy: GhostPolicy::default(),
      strategy: PartitionStrategy::default(),
      split_candidate_threshold: 20,
    }
  }
}

impl TreeConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_fields(mut self, fields: Vec<String>) -> Self {
    self.fields = fields;
    self
  }

  pub fn with_log_fields(mut self, log_fields: Vec<bool>) -> Self {
    self.log_fields = Some(log_fields);
    self
  }

  pub fn with_max_level(mut self, max_level: u32) -> Self {
    self.max_level = Some(max_level);
    self
  }

  pub fn with_region(mut self, region: Aabb3) -> Self {
    self.region = Some(region);
    self
  }

  pub fn with_ghost_policy(mut self, ghost_policy: GhostPolicy) -> Self {
    self.ghost_policy = ghost_policy;
    self
  }

  pub fn with_strategy(mut self, strategy: PartitionStrategy) -> Self {
    self.strategy = strategy;
    self
  }

  pub fn with_split_candidate_threshold(mut self, threshold: usize) -> Self {
    self.split_candidate_threshold = threshold;
    self
  }

  /// Resolve the per-field log toggles, asking the catalog for any field the
  /// caller left unspecified.
  ///
  /// # Panics
  /// Panics if explicit `log_fields` do not match `fields` in length.
  pub(crate) fn resolve_log_fields<C: GridCatalog + ?Sized>(&self, catalog: &C) -> Vec<bool> {
    match &self.log_fields {
      Some(flags) => {
        assert_eq!(
          flags.len(),
          self.fields.len(),
          "log_fields length must match fields length"
        );
        flags.clone()
      }
      None => self
        .fields
        .iter()
        .map(|field| catalog.default_log_transform(field))
        .collect(),
    }
  }
}
