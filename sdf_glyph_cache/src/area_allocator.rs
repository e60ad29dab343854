// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rectangle packing over a fixed-size region.
//!
//! [`AreaAllocator`] partitions its region with a binary tree. Every inner node
//! splits its rectangle in two, either vertically (at an x coordinate) or
//! horizontally (at a y coordinate), and every leaf is either free or occupied.
//! The free leaves make up the free list; allocating splits a free leaf until a
//! piece of the requested size is carved off, and deallocating merges a freed
//! leaf back with free neighbours that were split the same way.
//!
//! The tree can be written to and read from a compact big-endian byte format,
//! which is how pregenerated glyph caches store atlas occupancy.

use alloc::vec::Vec;
use core::fmt;

use read_fonts::FontData;
use smallvec::{SmallVec, smallvec};

/// Major version written into and expected from serialized allocators.
pub const SERIAL_MAJOR_VERSION: u8 = 5;
/// Minor version written into and expected from serialized allocators.
pub const SERIAL_MINOR_VERSION: u8 = 12;

const HEADER_SIZE: usize = 10;
const NODE_SIZE: usize = 9;

const FLAG_OCCUPIED: u8 = 1;
const FLAG_HAS_LEFT: u8 = 2;
const FLAG_HAS_RIGHT: u8 = 4;

const SPLIT_VERTICAL: u32 = 0;
const SPLIT_HORIZONTAL: u32 = 1;

/// A free leaf at most this much larger than a request is occupied whole.
const MAX_MARGIN: u32 = 2;

/// An integer rectangle in atlas texels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AtlasRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

impl AtlasRect {
    /// Creates a rectangle from its origin and size.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the rightmost column.
    #[inline]
    pub const fn right(self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom row.
    #[inline]
    pub const fn bottom(self) -> u32 {
        self.y + self.height
    }

    /// Whether the rectangle covers no texels.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the two rectangles share at least one texel.
    pub fn intersects(self, other: Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Whether `other` lies entirely inside this rectangle.
    pub fn contains_rect(self, other: Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// The bounding rectangle of both. An empty rectangle contributes nothing.
    #[must_use]
    pub fn united(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right - x, bottom - y)
    }
}

/// An error returned when decoding a serialized [`AreaAllocator`] fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocatorError {
    /// The data is shorter than the allocator header.
    HeaderTooShort,
    /// The header carries a version other than 5.12.
    UnsupportedVersion {
        /// Major version found in the data.
        major: u8,
        /// Minor version found in the data.
        minor: u8,
    },
    /// The data ends before every announced node was read.
    TruncatedNodes,
    /// A node is inconsistent: it has a single child, an unknown split
    /// orientation, or a split outside its own rectangle.
    MalformedNode,
}

impl fmt::Display for AllocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderTooShort => f.write_str("allocator data too short to fit its header"),
            Self::UnsupportedVersion { major, minor } => {
                write!(f, "unsupported allocator version {major}.{minor}")
            }
            Self::TruncatedNodes => f.write_str("allocator data too short for its nodes"),
            Self::MalformedNode => f.write_str("malformed allocator node"),
        }
    }
}

impl core::error::Error for AllocatorError {}

type NodeId = usize;

#[derive(Clone, Debug)]
struct Node {
    parent: Option<NodeId>,
    /// Left and right child; inner nodes always have both.
    children: Option<[NodeId; 2]>,
    /// Split coordinate. Only meaningful for inner nodes, but kept verbatim
    /// for leaves so that decoded data writes back unchanged.
    split: u32,
    split_type: u32,
    occupied: bool,
}

impl Node {
    fn leaf(parent: Option<NodeId>) -> Self {
        Self {
            parent,
            children: None,
            split: 0,
            split_type: SPLIT_VERTICAL,
            occupied: false,
        }
    }
}

/// A 2D rectangle allocator over a region of fixed size.
///
/// When several textures of equal height are modelled as one tall region, set
/// a page height with [`set_page_height`](Self::set_page_height): allocations
/// then never straddle a multiple of the page height, so `y / page_height`
/// names a single texture for the whole rectangle.
#[derive(Clone)]
pub struct AreaAllocator {
    width: u32,
    height: u32,
    page_height: Option<u32>,
    nodes: Vec<Node>,
    free_slots: Vec<NodeId>,
    root: NodeId,
}

impl AreaAllocator {
    /// Creates an allocator managing a `width` by `height` region.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            page_height: None,
            nodes: alloc::vec![Node::leaf(None)],
            free_slots: Vec::new(),
            root: 0,
        }
    }

    /// Width of the managed region.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the managed region.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The page height allocations are kept within, if any.
    #[inline]
    pub fn page_height(&self) -> Option<u32> {
        self.page_height
    }

    /// Keeps future allocations from crossing multiples of `page_height`.
    pub fn set_page_height(&mut self, page_height: Option<u32>) {
        self.page_height = page_height.filter(|&h| h > 0);
    }

    /// Returns `true` if no rectangle is currently allocated.
    pub fn is_empty(&self) -> bool {
        self.live_nodes().all(|node| !node.occupied || node.children.is_some())
    }

    /// Allocates a `width` by `height` rectangle.
    ///
    /// Returns `None` when no free area can hold the request. This is not an
    /// error: the caller is expected to free space and try again, or do
    /// without.
    pub fn allocate(&mut self, width: u32, height: u32) -> Option<AtlasRect> {
        if width == 0 || height == 0 {
            return None;
        }
        let full = AtlasRect::new(0, 0, self.width, self.height);
        let mut stack: SmallVec<[(NodeId, AtlasRect); 32]> = smallvec![(self.root, full)];
        while let Some((node, rect)) = stack.pop() {
            if width > rect.width || height > rect.height {
                continue;
            }
            if let Some([left, right]) = self.nodes[node].children {
                let (left_rect, right_rect) = self.child_rects(node, rect);
                // Left subtree first.
                stack.push((right, right_rect));
                stack.push((left, left_rect));
                continue;
            }
            if self.nodes[node].occupied {
                continue;
            }
            if let Some(page) = self.page_height {
                let first_page = rect.y / page;
                let last_page = (rect.y + height - 1) / page;
                if first_page != last_page {
                    let boundary = (first_page + 1) * page;
                    if rect.bottom() - boundary < height {
                        continue;
                    }
                    let [_, lower] = self.split_leaf(node, SPLIT_HORIZONTAL, boundary);
                    let lower_rect =
                        AtlasRect::new(rect.x, boundary, rect.width, rect.bottom() - boundary);
                    stack.push((lower, lower_rect));
                    continue;
                }
            }
            if width + MAX_MARGIN >= rect.width && height + MAX_MARGIN >= rect.height {
                // Snug fit, occupy the entire leaf.
                self.nodes[node].occupied = true;
                return Some(AtlasRect::new(rect.x, rect.y, width, height));
            }
            let spare_w = u64::from(rect.width - width) * u64::from(rect.height);
            let spare_h = u64::from(rect.height - height) * u64::from(rect.width);
            let (left, left_rect) = if spare_w < spare_h {
                let [left, _] = self.split_leaf(node, SPLIT_HORIZONTAL, rect.y + height);
                (left, AtlasRect::new(rect.x, rect.y, rect.width, height))
            } else {
                let [left, _] = self.split_leaf(node, SPLIT_VERTICAL, rect.x + width);
                (left, AtlasRect::new(rect.x, rect.y, width, rect.height))
            };
            stack.push((left, left_rect));
        }
        None
    }

    /// Frees the rectangle whose top-left corner is at `rect`'s origin.
    ///
    /// Returns `false` if that area was not allocated.
    pub fn deallocate(&mut self, rect: AtlasRect) -> bool {
        let mut node = self.root;
        while let Some([left, right]) = self.nodes[node].children {
            let n = &self.nodes[node];
            let coordinate = if n.split_type == SPLIT_HORIZONTAL {
                rect.y
            } else {
                rect.x
            };
            node = if coordinate < n.split { left } else { right };
        }
        if !self.nodes[node].occupied {
            return false;
        }
        self.nodes[node].occupied = false;
        self.merge_with_neighbors(node);
        true
    }

    /// Writes the allocator state in the pregenerated cache format.
    pub fn serialize(&self) -> Vec<u8> {
        let node_count = self.nodes.len() - self.free_slots.len();
        let mut out = Vec::with_capacity(HEADER_SIZE + NODE_SIZE * node_count);
        out.push(SERIAL_MAJOR_VERSION);
        out.push(SERIAL_MINOR_VERSION);
        out.extend_from_slice(&self.width.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());

        let mut stack: SmallVec<[NodeId; 32]> = smallvec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            let mut flags = 0;
            if node.occupied {
                flags |= FLAG_OCCUPIED;
            }
            if let Some([left, right]) = node.children {
                flags |= FLAG_HAS_LEFT | FLAG_HAS_RIGHT;
                stack.push(left);
                stack.push(right);
            }
            out.extend_from_slice(&node.split.to_be_bytes());
            out.extend_from_slice(&node.split_type.to_be_bytes());
            out.push(flags);
        }
        out
    }

    /// Reads an allocator from the start of `data`.
    ///
    /// The encoding does not store its own length, so this also returns the
    /// number of bytes consumed. Bytes after that are left untouched.
    pub fn deserialize(data: &[u8]) -> Result<(Self, usize), AllocatorError> {
        let data = FontData::new(data);
        if data.len() < HEADER_SIZE {
            log::warn!("allocator data too short to fit its header");
            return Err(AllocatorError::HeaderTooShort);
        }
        let header = |offset| data.read_at::<u8>(offset).map_err(|_| AllocatorError::HeaderTooShort);
        let (major, minor) = (header(0)?, header(1)?);
        if (major, minor) != (SERIAL_MAJOR_VERSION, SERIAL_MINOR_VERSION) {
            log::warn!("unrecognized allocator version {major}.{minor}");
            return Err(AllocatorError::UnsupportedVersion { major, minor });
        }
        let width = data
            .read_at::<u32>(2)
            .map_err(|_| AllocatorError::HeaderTooShort)?;
        let height = data
            .read_at::<u32>(6)
            .map_err(|_| AllocatorError::HeaderTooShort)?;

        let mut allocator = Self::new(width, height);
        let full = AtlasRect::new(0, 0, width, height);
        let mut stack: SmallVec<[(NodeId, AtlasRect); 32]> = smallvec![(allocator.root, full)];
        let mut offset = HEADER_SIZE;
        while let Some((id, rect)) = stack.pop() {
            if data.len() - offset < NODE_SIZE {
                log::warn!("allocator data too short for its nodes");
                return Err(AllocatorError::TruncatedNodes);
            }
            let truncated = |_| AllocatorError::TruncatedNodes;
            let split = data.read_at::<i32>(offset).map_err(truncated)?;
            let split_type = data.read_at::<u32>(offset + 4).map_err(truncated)?;
            let flags = data.read_at::<u8>(offset + 8).map_err(truncated)?;
            offset += NODE_SIZE;

            let node = &mut allocator.nodes[id];
            // Bit-preserving: negative splits are rejected below for inner nodes.
            node.split = split as u32;
            node.split_type = split_type;
            node.occupied = flags & FLAG_OCCUPIED != 0;

            let has_left = flags & FLAG_HAS_LEFT != 0;
            let has_right = flags & FLAG_HAS_RIGHT != 0;
            if has_left != has_right {
                return Err(AllocatorError::MalformedNode);
            }
            if !has_left {
                continue;
            }
            let split = split as u32;
            let (start, end) = match split_type {
                SPLIT_VERTICAL => (rect.x, rect.right()),
                SPLIT_HORIZONTAL => (rect.y, rect.bottom()),
                _ => return Err(AllocatorError::MalformedNode),
            };
            if split < start || split > end {
                return Err(AllocatorError::MalformedNode);
            }
            let left = allocator.push_node(Node::leaf(Some(id)));
            let right = allocator.push_node(Node::leaf(Some(id)));
            allocator.nodes[id].children = Some([left, right]);
            let (left_rect, right_rect) = allocator.child_rects(id, rect);
            stack.push((left, left_rect));
            stack.push((right, right_rect));
        }
        Ok((allocator, offset))
    }

    fn live_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        let mut stack: SmallVec<[NodeId; 32]> = smallvec![self.root];
        core::iter::from_fn(move || {
            let id = stack.pop()?;
            let node = &self.nodes[id];
            if let Some([left, right]) = node.children {
                stack.push(left);
                stack.push(right);
            }
            Some(node)
        })
    }

    fn child_rects(&self, id: NodeId, rect: AtlasRect) -> (AtlasRect, AtlasRect) {
        let node = &self.nodes[id];
        let split = node.split;
        if node.split_type == SPLIT_HORIZONTAL {
            (
                AtlasRect::new(rect.x, rect.y, rect.width, split - rect.y),
                AtlasRect::new(rect.x, split, rect.width, rect.bottom() - split),
            )
        } else {
            (
                AtlasRect::new(rect.x, rect.y, split - rect.x, rect.height),
                AtlasRect::new(split, rect.y, rect.right() - split, rect.height),
            )
        }
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free_slots.pop() {
            self.nodes[id] = node;
            id
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn split_leaf(&mut self, id: NodeId, split_type: u32, split: u32) -> [NodeId; 2] {
        let left = self.push_node(Node::leaf(Some(id)));
        let right = self.push_node(Node::leaf(Some(id)));
        let node = &mut self.nodes[id];
        node.split_type = split_type;
        node.split = split;
        node.children = Some([left, right]);
        [left, right]
    }

    fn left(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].children.map(|[left, _]| left)
    }

    fn right(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].children.map(|[_, right]| right)
    }

    fn is_free_leaf(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        node.children.is_none() && !node.occupied
    }

    /// Merges the free leaf `node` with adjacent free leaves of the same split
    /// orientation, until nothing more can be merged.
    fn merge_with_neighbors(&mut self, node: NodeId) {
        let mut done = false;
        while !done {
            debug_assert!(self.is_free_leaf(node), "only free leaves are merged");
            let Some(parent) = self.nodes[node].parent else {
                // The root has no neighbours.
                return;
            };
            let split_type = self.nodes[parent].split_type;
            done = true;

            // Merge with the left neighbour.
            let mut current = node;
            let mut ancestor = Some(parent);
            while let Some(p) = ancestor {
                if self.left(p) != Some(current) || self.nodes[p].split_type != split_type {
                    break;
                }
                current = p;
                ancestor = self.nodes[p].parent;
            }
            if let Some(p) = ancestor.filter(|&p| self.nodes[p].split_type == split_type) {
                if let Some(mut neighbor) = self.left(p) {
                    while let Some(right) = self.right(neighbor) {
                        if self.nodes[neighbor].split_type != split_type {
                            break;
                        }
                        neighbor = right;
                    }
                    if self.try_absorb(p, neighbor, split_type) {
                        done = false;
                    }
                }
            }

            // Merge with the right neighbour.
            let mut current = node;
            let mut ancestor = self.nodes[node].parent;
            while let Some(p) = ancestor {
                if self.right(p) != Some(current) || self.nodes[p].split_type != split_type {
                    break;
                }
                current = p;
                ancestor = self.nodes[p].parent;
            }
            if let Some(p) = ancestor.filter(|&p| self.nodes[p].split_type == split_type) {
                if let Some(mut neighbor) = self.right(p) {
                    while let Some(left) = self.left(neighbor) {
                        if self.nodes[neighbor].split_type != split_type {
                            break;
                        }
                        neighbor = left;
                    }
                    if self.try_absorb(p, neighbor, split_type) {
                        done = false;
                    }
                }
            }
        }
    }

    /// Moves `boundary_node`'s split onto `neighbor`'s far edge and drops
    /// `neighbor`, if it is a free leaf split the same way.
    fn try_absorb(&mut self, boundary_node: NodeId, neighbor: NodeId, split_type: u32) -> bool {
        if !self.is_free_leaf(neighbor) {
            return false;
        }
        let Some(neighbor_parent) = self.nodes[neighbor].parent else {
            return false;
        };
        if self.nodes[neighbor_parent].split_type != split_type {
            return false;
        }
        self.nodes[boundary_node].split = self.nodes[neighbor_parent].split;

        let Some([left, right]) = self.nodes[neighbor_parent].children else {
            return false;
        };
        let sibling = if left == neighbor { right } else { left };
        let grandparent = self.nodes[neighbor_parent].parent;
        match grandparent {
            None => self.root = sibling,
            Some(g) => {
                if let Some(children) = self.nodes[g].children.as_mut() {
                    if children[0] == neighbor_parent {
                        children[0] = sibling;
                    } else {
                        children[1] = sibling;
                    }
                }
            }
        }
        self.nodes[sibling].parent = grandparent;
        self.nodes[neighbor_parent].children = None;
        self.free_slots.push(neighbor_parent);
        self.free_slots.push(neighbor);
        true
    }
}

impl fmt::Debug for AreaAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AreaAllocator")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("page_height", &self.page_height)
            .field("nodes", &(self.nodes.len() - self.free_slots.len()))
            .finish_non_exhaustive()
    }
}
