//! Binary cache for node tables and sample bricks.
//!
//! Files are framed postcard: a 4-byte magic, a little-endian u32 format
//! version, then length-prefixed postcard payloads. A tree file holds one
//! payload with this rank's whole node table; in parallel groups each rank
//! stores to its own path. A brick file is shared: it grows by one payload
//! per rank, appended in rank order through a token ring so writes never
//! interleave.
//!
//! Loading bricks is best-effort. A missing file, a stale format, or a
//! record that fails validation is a cache miss, and the caller falls back
//! to [`crate::KdTree::materialize_bricks`].

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use glam::{DVec3, IVec3};
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb3;
use crate::brick::Brick;
use crate::comm::CommContext;
use crate::error::KdTreeError;
use crate::grid::{GridId, ScalarBlock};
use crate::tree::node::{KdNode, NodeId, NodeKind};
use crate::tree::KdTree;

const TREE_MAGIC: [u8; 4] = *b"AKDT";
const BRICK_MAGIC: [u8; 4] = *b"AKDB";
const FORMAT_VERSION: u32 = 1;

// ============================================================================
// On-disk records
// ============================================================================

#[derive(Serialize, Deserialize)]
struct NodeRecord {
  id: u64,
  l_corner: [f64; 3],
  r_corner: [f64; 3],
  /// Bound grid for leaves, -1 otherwise.
  grid_id: i64,
  /// Dividing axis for splits, -1 otherwise.
  split_axis: i8,
  split_position: f64,
  owner: u32,
}

#[derive(Serialize, Deserialize)]
struct TreeFile {
  domain_min: [f64; 3],
  domain_max: [f64; 3],
  fields: Vec<String>,
  log_fields: Vec<bool>,
  max_level: u32,
  nodes: Vec<NodeRecord>,
}

#[derive(Serialize, Deserialize)]
struct BrickRecord {
  node_id: u64,
  /// Vertex sample counts per axis.
  dims: [u32; 3],
  /// One flat sample vector per field, in field order.
  blocks: Vec<Vec<f64>>,
}

#[derive(Serialize, Deserialize)]
struct BrickSection {
  rank: u32,
  fields: Vec<String>,
  bricks: Vec<BrickRecord>,
}

// ============================================================================
// Framing
// ============================================================================

fn write_header(writer: &mut impl Write, magic: [u8; 4]) -> Result<(), KdTreeError> {
  writer.write_all(&magic)?;
  writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
  Ok(())
}

fn check_header(reader: &mut impl Read, magic: [u8; 4]) -> Result<(), KdTreeError> {
  let mut found = [0u8; 4];
  reader.read_exact(&mut found)?;
  if found != magic {
    return Err(KdTreeError::BadMagic);
  }
  let mut version = [0u8; 4];
  reader.read_exact(&mut version)?;
  let version = u32::from_le_bytes(version);
  if version != FORMAT_VERSION {
    return Err(KdTreeError::UnsupportedVersion(version));
  }
  Ok(())
}

fn write_frame<T: Serialize>(writer: &mut impl Write, payload: &T) -> Result<(), KdTreeError> {
  let bytes = postcard::to_stdvec(payload)?;
  writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
  writer.write_all(&bytes)?;
  Ok(())
}

/// Read the next frame, or `None` at a clean end of file.
fn read_frame<T: for<'de> Deserialize<'de>>(
  reader: &mut impl Read,
) -> Result<Option<T>, KdTreeError> {
  let mut len = [0u8; 4];
  match reader.read_exact(&mut len) {
    Ok(()) => {}
    Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
    Err(err) => return Err(err.into()),
  }
  let mut bytes = vec![0u8; u32::from_le_bytes(len) as usize];
  reader.read_exact(&mut bytes)?;
  Ok(Some(postcard::from_bytes(&bytes)?))
}

// ============================================================================
// Node tables
// ============================================================================

fn encode_node(id: NodeId, node: &KdNode) -> NodeRecord {
  let (grid_id, split_axis, split_position) = match &node.kind {
    NodeKind::Leaf(leaf) => (leaf.grid.0 as i64, -1, 0.0),
    NodeKind::Split(split) => (-1, split.axis as i8, split.position),
    NodeKind::Remote => (-1, -1, 0.0),
  };
  NodeRecord {
    id,
    l_corner: node.bounds.min.to_array(),
    r_corner: node.bounds.max.to_array(),
    grid_id,
    split_axis,
    split_position,
    owner: node.owner as u32,
  }
}

fn decode_node(record: &NodeRecord) -> KdNode {
  let bounds = Aabb3::new(
    DVec3::from_array(record.l_corner),
    DVec3::from_array(record.r_corner),
  );
  let owner = record.owner as usize;
  if record.grid_id >= 0 {
    KdNode::leaf(bounds, owner, GridId(record.grid_id as u32))
  } else if record.split_axis >= 0 {
    KdNode::split(bounds, owner, record.split_axis as usize, record.split_position)
  } else {
    KdNode::remote(bounds, owner)
  }
}

pub(crate) fn store_tree(tree: &KdTree, path: &Path) -> Result<(), KdTreeError> {
  let nodes: Vec<NodeRecord> = tree
    .depth_traverse()
    .map(|id| encode_node(id, &tree.arena[&id]))
    .collect();
  let file = TreeFile {
    domain_min: tree.domain.min.to_array(),
    domain_max: tree.domain.max.to_array(),
    fields: tree.fields.clone(),
    log_fields: tree.log_fields.clone(),
    max_level: tree.max_level,
    nodes,
  };
  let mut writer = BufWriter::new(File::create(path)?);
  write_header(&mut writer, TREE_MAGIC)?;
  write_frame(&mut writer, &file)?;
  writer.flush()?;
  Ok(())
}

pub(crate) fn load_tree(path: &Path, comm: CommContext) -> Result<KdTree, KdTreeError> {
  let mut reader = BufReader::new(File::open(path)?);
  check_header(&mut reader, TREE_MAGIC)?;
  let file: TreeFile = read_frame(&mut reader)?
    .ok_or_else(|| KdTreeError::Io(ErrorKind::UnexpectedEof.into()))?;
  let domain = Aabb3::new(
    DVec3::from_array(file.domain_min),
    DVec3::from_array(file.domain_max),
  );
  let arena = file
    .nodes
    .iter()
    .map(|record| (record.id, decode_node(record)))
    .collect();
  Ok(KdTree::from_parts(
    arena,
    domain,
    file.fields,
    file.log_fields,
    file.max_level,
    comm,
  ))
}

// ============================================================================
// Brick cache
// ============================================================================

pub(crate) fn store_bricks(tree: &KdTree, path: &Path) -> Result<(), KdTreeError> {
  let rank = tree.comm.rank();
  if rank > 0 {
    tree.comm.recv_token(rank - 1)?;
  }
  let outcome = append_brick_section(tree, path, rank == 0);
  // The token moves on even after a failed write so the ring cannot jam.
  if rank + 1 < tree.comm.size() {
    tree.comm.send_token(rank + 1)?;
  }
  outcome
}

fn append_brick_section(tree: &KdTree, path: &Path, create: bool) -> Result<(), KdTreeError> {
  let mut bricks = Vec::new();
  for id in tree.leaves() {
    let Some(brick) = tree.arena[&id].as_leaf().and_then(|leaf| leaf.brick()) else {
      continue;
    };
    let dims = brick.fields.first().map_or([0; 3], |block| {
      let d = block.dims();
      [d[0] as u32, d[1] as u32, d[2] as u32]
    });
    bricks.push(BrickRecord {
      node_id: id,
      dims,
      blocks: brick.fields.iter().map(|block| block.data().to_vec()).collect(),
    });
  }
  let section = BrickSection {
    rank: tree.comm.rank() as u32,
    fields: tree.fields.clone(),
    bricks,
  };
  let mut writer = if create {
    let mut writer = BufWriter::new(File::create(path)?);
    write_header(&mut writer, BRICK_MAGIC)?;
    writer
  } else {
    BufWriter::new(OpenOptions::new().append(true).open(path)?)
  };
  write_frame(&mut writer, &section)?;
  writer.flush()?;
  Ok(())
}

pub(crate) fn load_bricks(tree: &mut KdTree, path: &Path) -> Result<bool, KdTreeError> {
  let rank = tree.comm.rank();
  if rank > 0 {
    tree.comm.recv_token(rank - 1)?;
  }
  let outcome = attach_cached_bricks(tree, path);
  if rank + 1 < tree.comm.size() {
    tree.comm.send_token(rank + 1)?;
  }
  if outcome.is_err() {
    return Ok(false);
  }
  let complete = tree
    .leaves()
    .all(|id| tree.arena[&id].as_leaf().is_some_and(|leaf| leaf.brick().is_some()));
  if complete {
    tree.bricks_loaded = true;
  }
  Ok(complete)
}

fn attach_cached_bricks(tree: &mut KdTree, path: &Path) -> Result<(), KdTreeError> {
  let mut reader = BufReader::new(File::open(path)?);
  check_header(&mut reader, BRICK_MAGIC)?;
  while let Some(section) = read_frame::<BrickSection>(&mut reader)? {
    if section.fields != tree.fields {
      continue;
    }
    for record in section.bricks {
      attach_record(tree, record);
    }
  }
  Ok(())
}

/// Attach one cached brick to the matching local leaf, validating shapes
/// before any block is constructed. Records for other ranks' nodes, already
/// filled leaves, or mismatched data are skipped.
fn attach_record(tree: &mut KdTree, record: BrickRecord) {
  let dims = [
    record.dims[0] as usize,
    record.dims[1] as usize,
    record.dims[2] as usize,
  ];
  if dims.iter().any(|&d| d < 2) || record.blocks.len() != tree.fields.len() {
    return;
  }
  let samples = dims[0] * dims[1] * dims[2];
  if record.blocks.iter().any(|block| block.len() != samples) {
    return;
  }
  let Some(node) = tree.arena.get_mut(&record.node_id) else {
    return;
  };
  let bounds = node.bounds;
  let Some(leaf) = node.as_leaf_mut() else {
    return;
  };
  if leaf.brick.is_some() {
    return;
  }
  let blocks = record
    .blocks
    .into_iter()
    .map(|data| ScalarBlock::new(dims, data))
    .collect();
  let cells = IVec3::new(dims[0] as i32 - 1, dims[1] as i32 - 1, dims[2] as i32 - 1);
  leaf.brick = Some(Brick::new(leaf.grid, blocks, bounds.min, bounds.max, cells));
}

#[cfg(test)]
#[path = "persist_test.rs"]
mod persist_test;
