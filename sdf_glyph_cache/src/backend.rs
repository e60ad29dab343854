// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The GPU collaborator seam.
//!
//! The cache never submits GPU work. It creates textures through a
//! [`TextureBackend`] and describes uploads and copies in a
//! [`ResourceUpdateBatch`], which the renderer merges into its own frame
//! batch and submits when it chooses.

use alloc::vec::Vec;
use core::fmt::Debug;

/// Texture creation, capability queries and deferred release.
pub trait TextureBackend {
    /// Handle to a GPU texture.
    type Texture: Clone + PartialEq + Debug;

    /// Largest supported texture dimension.
    fn max_texture_size(&self) -> u32;

    /// Whether the backend supports `feature`.
    fn is_feature_supported(&self, feature: BackendFeature) -> bool;

    /// Creates a texture, or returns `None` if the GPU refuses.
    fn create_texture(&mut self, descriptor: TextureDescriptor) -> Option<Self::Texture>;

    /// Hands a texture over for release once no in-flight work can use it.
    ///
    /// Implementations must queue the handle and destroy it at a safe point
    /// (after the frames that may reference it have completed), never here.
    fn release_texture(&mut self, texture: Self::Texture);
}

/// Backend capabilities the cache asks about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BackendFeature {
    /// Single-channel 8-bit textures are sampled through the red channel.
    /// Without it, shaders read the alpha channel instead.
    RedOrAlpha8IsRed,
    /// Fragment shaders can compute screen-space derivatives.
    ScreenSpaceDerivatives,
    /// GPU-side texture copies are safe even while earlier draws may still
    /// sample the source. Without it, resizes re-upload a CPU-side mirror.
    TextureCopy,
}

/// Pixel formats the cache creates textures with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// One 8-bit channel, exposed as red or alpha depending on the backend.
    RedOrAlpha8,
}

/// Parameters for [`TextureBackend::create_texture`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    /// Pixel format.
    pub format: TextureFormat,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Whether the texture may be the source of a texture copy.
    pub used_as_transfer_source: bool,
}

impl TextureDescriptor {
    /// A single-level glyph texture of the given size.
    pub fn glyph_texture(width: u32, height: u32) -> Self {
        Self {
            format: TextureFormat::RedOrAlpha8,
            width,
            height,
            mip_levels: 1,
            used_as_transfer_source: true,
        }
    }
}

/// Pixels for one rectangle of a texture.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadEntry {
    /// Left edge of the destination.
    pub x: u32,
    /// Top edge of the destination.
    pub y: u32,
    /// Width of the source data.
    pub width: u32,
    /// Height of the source data.
    pub height: u32,
    /// Single-channel pixels, `width * height` bytes, row by row.
    pub data: Vec<u8>,
}

impl Debug for UploadEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UploadEntry")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data", &self.data.len())
            .finish()
    }
}

/// A single recorded texture operation.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceUpdate<T> {
    /// Upload one or more rectangles into `texture`.
    Upload {
        /// Destination texture.
        texture: T,
        /// Rectangles to write, in order.
        entries: Vec<UploadEntry>,
    },
    /// Copy the whole of `source` into the top-left corner of `destination`.
    Copy {
        /// Texture written to.
        destination: T,
        /// Texture read from.
        source: T,
    },
}

/// An ordered list of texture operations awaiting submission.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceUpdateBatch<T> {
    updates: Vec<ResourceUpdate<T>>,
}

impl<T> Default for ResourceUpdateBatch<T> {
    fn default() -> Self {
        Self {
            updates: Vec::new(),
        }
    }
}

impl<T> ResourceUpdateBatch<T> {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an upload.
    pub fn upload_texture(&mut self, texture: T, entries: Vec<UploadEntry>) {
        self.updates.push(ResourceUpdate::Upload { texture, entries });
    }

    /// Records a texture-to-texture copy.
    pub fn copy_texture(&mut self, destination: T, source: T) {
        self.updates
            .push(ResourceUpdate::Copy { destination, source });
    }

    /// Appends every operation of `other`, leaving it empty.
    pub fn merge(&mut self, other: &mut Self) {
        self.updates.append(&mut other.updates);
    }

    /// Whether the batch has no operations.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// The operations in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceUpdate<T>> + '_ {
        self.updates.iter()
    }

    /// Removes every operation, for reuse after submission.
    pub fn clear(&mut self) {
        self.updates.clear();
    }

    /// Takes the recorded operations, leaving the batch empty.
    pub fn take(&mut self) -> Vec<ResourceUpdate<T>> {
        core::mem::take(&mut self.updates)
    }
}
