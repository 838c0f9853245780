//! Block tree of a FIF file.
//!
//! The flat tag directory is grouped into nested nodes using the
//! `FIFF_BLOCK_START` / `FIFF_BLOCK_END` markers (MNE's `make_dir_tree`).
use std::io::{Read, Seek};

use anyhow::Result;

use super::constants::*;
use super::tag::{read_directory, read_i32, read_tag_header, TagHeader};

/// One block. The root node has `block == 0`.
#[derive(Debug, Default, Clone)]
pub struct Node {
    pub block: i32,
    /// Non-structural tags directly inside this block.
    pub entries: Vec<TagHeader>,
    pub children: Vec<Node>,
}

impl Node {
    /// Depth-first search for the first block of the given kind.
    pub fn find_block(&self, kind: i32) -> Option<&Node> {
        if self.block == kind {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_block(kind))
    }

    /// First tag of the given kind in this node (no recursion).
    pub fn find_tag(&self, kind: i32) -> Option<&TagHeader> {
        self.entries.iter().find(|e| e.kind == kind)
    }
}

/// Group `directory` into a tree, reading each block kind from the file.
pub fn read_tree<R: Read + Seek>(reader: &mut R, directory: &[TagHeader]) -> Result<Node> {
    let mut stack = vec![Node::default()];
    for tag in directory {
        match tag.kind {
            FIFF_BLOCK_START => {
                let block = read_i32(reader, tag)?;
                stack.push(Node { block, ..Node::default() });
            }
            FIFF_BLOCK_END => {
                if stack.len() > 1 {
                    if let Some(done) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(done);
                        }
                    }
                }
            }
            _ => {
                if let Some(node) = stack.last_mut() {
                    node.entries.push(*tag);
                }
            }
        }
    }
    // Unterminated blocks are attached to their parents.
    while stack.len() > 1 {
        if let Some(orphan) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(orphan);
            }
        }
    }
    Ok(stack.pop().unwrap_or_default())
}

/// Follow the `next` chain from offset 0 and collect every tag header.
pub fn scan_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<TagHeader>> {
    let mut directory = Vec::new();
    let mut pos = Some(0u64);
    while let Some(p) = pos {
        let tag = read_tag_header(reader, p)?;
        pos = tag.next_pos();
        directory.push(tag);
    }
    Ok(directory)
}

/// The embedded directory, when `FIFF_DIR_POINTER` points at one.
pub fn try_load_directory<R: Read + Seek>(reader: &mut R) -> Result<Option<Vec<TagHeader>>> {
    let id = read_tag_header(reader, 0)?;
    if id.kind != FIFF_FILE_ID {
        return Ok(None);
    }
    let Some(next) = id.next_pos() else { return Ok(None) };
    let ptr = read_tag_header(reader, next)?;
    if ptr.kind != FIFF_DIR_POINTER {
        return Ok(None);
    }
    let dirpos = read_i32(reader, &ptr)?;
    if dirpos <= 0 {
        return Ok(None);
    }
    let dir = read_tag_header(reader, dirpos as u64)?;
    if dir.ftype != FIFFT_DIR_ENTRY_STRUCT {
        return Ok(None);
    }
    Ok(Some(read_directory(reader, &dir)?))
}
