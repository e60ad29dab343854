// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyph textures and their pending uploads.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};

use smallvec::SmallVec;

use crate::area_allocator::AtlasRect;
use crate::backend::{ResourceUpdateBatch, TextureBackend, TextureDescriptor, UploadEntry};
use crate::distance_field::DistanceField;

/// One texture of the atlas.
pub struct TextureInfo<T> {
    texture: Option<T>,
    size: (u32, u32),
    allocated_area: AtlasRect,
    padding: Option<u32>,
    uploads: Vec<UploadEntry>,
    /// CPU copy of the texture content, kept only by the resize workaround.
    mirror: Option<DistanceField>,
}

impl<T> Default for TextureInfo<T> {
    fn default() -> Self {
        Self {
            texture: None,
            size: (0, 0),
            allocated_area: AtlasRect::default(),
            padding: None,
            uploads: Vec::new(),
            mirror: None,
        }
    }
}

impl<T> TextureInfo<T> {
    /// The GPU texture, if one has been created successfully.
    pub fn texture(&self) -> Option<&T> {
        self.texture.as_ref()
    }

    /// Current texture size in texels; `(0, 0)` before creation.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Bounding box of every slot handed out in this texture, in
    /// texture-local coordinates.
    pub fn allocated_area(&self) -> AtlasRect {
        self.allocated_area
    }

    /// Padding used by the glyphs in this texture, once one has been placed.
    pub fn padding(&self) -> Option<u32> {
        self.padding
    }

    /// Uploads queued since the last commit.
    pub fn pending_uploads(&self) -> &[UploadEntry] {
        &self.uploads
    }

    /// The CPU-side copy of the texture content, in resize workaround mode.
    pub fn mirror(&self) -> Option<&DistanceField> {
        self.mirror.as_ref()
    }

    /// Grows the allocated area to include `rect`.
    pub fn extend_allocated_area(&mut self, rect: AtlasRect) {
        self.allocated_area = self.allocated_area.united(rect);
    }

    /// Replaces the allocated area, as read from a pregenerated cache.
    pub fn set_allocated_area(&mut self, rect: AtlasRect) {
        self.allocated_area = rect;
    }

    /// Records the padding of a glyph placed in this texture.
    ///
    /// Mixing paddings in one texture is tolerated with a warning.
    pub fn record_padding(&mut self, padding: u32) {
        if let Some(existing) = self.padding {
            if existing != padding {
                log::warn!(
                    "glyph padding {padding} differs from padding {existing} already used in this texture"
                );
            }
        }
        self.padding = Some(padding);
    }
}

impl<T: Debug> Debug for TextureInfo<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TextureInfo")
            .field("texture", &self.texture)
            .field("size", &self.size)
            .field("allocated_area", &self.allocated_area)
            .field("padding", &self.padding)
            .field("pending_uploads", &self.uploads.len())
            .finish_non_exhaustive()
    }
}

/// The textures glyphs are packed into.
///
/// Slots are addressed by texture index and created on first access.
/// Textures never shrink: growing one creates a bigger texture, carries the
/// old content over and hands the old texture to deferred release.
pub struct TextureAtlas<T> {
    /// Most fonts fit in a single texture.
    textures: SmallVec<[TextureInfo<T>; 1]>,
    use_resize_workaround: bool,
}

impl<T: Clone> TextureAtlas<T> {
    /// Creates an empty atlas.
    ///
    /// With `use_resize_workaround`, textures are grown by re-uploading a CPU
    /// copy of their content instead of a GPU texture copy.
    pub fn new(use_resize_workaround: bool) -> Self {
        Self {
            textures: SmallVec::new(),
            use_resize_workaround,
        }
    }

    /// Whether textures are grown through a CPU mirror.
    pub fn uses_resize_workaround(&self) -> bool {
        self.use_resize_workaround
    }

    /// Number of texture slots, including ones without a texture yet.
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether no slot exists.
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Returns the slot at `index`, if it exists.
    pub fn texture_info(&self, index: u32) -> Option<&TextureInfo<T>> {
        self.textures.get(index as usize)
    }

    /// Returns the slot at `index`, creating it and every slot below it.
    pub fn texture_info_mut(&mut self, index: u32) -> &mut TextureInfo<T> {
        let index = index as usize;
        if index >= self.textures.len() {
            self.textures.resize_with(index + 1, TextureInfo::default);
        }
        &mut self.textures[index]
    }

    /// Iterates over the slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &TextureInfo<T>> + '_ {
        self.textures.iter()
    }

    /// Creates the texture of slot `index` with `pixels` (or zeros) as its
    /// content.
    ///
    /// Any texture the slot held before is released. On failure a warning is
    /// logged, the slot is left unchanged and `false` is returned.
    pub fn create_texture<B>(
        &mut self,
        backend: &mut B,
        updates: &mut ResourceUpdateBatch<T>,
        index: u32,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> bool
    where
        B: TextureBackend<Texture = T>,
    {
        let len = width as usize * height as usize;
        let data = match pixels {
            Some(pixels) if pixels.len() == len => pixels.to_vec(),
            Some(pixels) => {
                log::warn!(
                    "expected {len} bytes of initial content for texture {index}, got {}",
                    pixels.len()
                );
                vec![0; len]
            }
            None => vec![0; len],
        };
        let mirror = self
            .use_resize_workaround
            .then(|| DistanceField::from_data(0, width, height, data.clone()))
            .flatten();
        let Some(texture) = new_texture(backend, updates, index, width, height, data) else {
            return false;
        };
        let info = self.texture_info_mut(index);
        if let Some(old) = info.texture.replace(texture) {
            backend.release_texture(old);
        }
        info.size = (width, height);
        info.mirror = mirror;
        true
    }

    /// Grows or shrinks the texture of slot `index` to `width` by `height`,
    /// carrying its content over.
    ///
    /// Does nothing when the slot already has a texture of that size, and
    /// creates one when it has none. If the new texture cannot be created the
    /// old one is kept and `false` is returned.
    pub fn resize_texture<B>(
        &mut self,
        backend: &mut B,
        updates: &mut ResourceUpdateBatch<T>,
        index: u32,
        width: u32,
        height: u32,
    ) -> bool
    where
        B: TextureBackend<Texture = T>,
    {
        let use_resize_workaround = self.use_resize_workaround;
        let info = self.texture_info_mut(index);
        let Some(old) = info.texture.clone() else {
            return self.create_texture(backend, updates, index, width, height, None);
        };
        let (old_width, old_height) = info.size;
        if (old_width, old_height) == (width, height) {
            return true;
        }

        let zeros = vec![0; width as usize * height as usize];
        let Some(texture) = new_texture(backend, updates, index, width, height, zeros) else {
            return false;
        };
        if use_resize_workaround {
            let mirror = info
                .mirror
                .get_or_insert_with(|| DistanceField::new(0, old_width, old_height));
            updates.upload_texture(
                texture.clone(),
                vec![UploadEntry {
                    x: 0,
                    y: 0,
                    width: mirror.width(),
                    height: mirror.height(),
                    data: mirror.data().to_vec(),
                }],
            );
            *mirror = mirror.copy(0, 0, width, height);
        } else {
            updates.copy_texture(texture.clone(), old.clone());
        }
        info.texture = Some(texture);
        info.size = (width, height);
        backend.release_texture(old);
        true
    }

    /// Queues `bitmap` for upload at `(x, y)` in the texture of slot `index`.
    ///
    /// Nothing reaches the resource batch until [`commit_uploads`].
    ///
    /// [`commit_uploads`]: Self::commit_uploads
    pub fn queue_upload(&mut self, index: u32, x: u32, y: u32, bitmap: DistanceField) {
        let use_resize_workaround = self.use_resize_workaround;
        let info = self.texture_info_mut(index);
        if use_resize_workaround {
            if let Some(mirror) = info.mirror.as_mut() {
                mirror.blit(&bitmap, x, y);
            }
        }
        info.uploads.push(UploadEntry {
            x,
            y,
            width: bitmap.width(),
            height: bitmap.height(),
            data: bitmap.into_data(),
        });
    }

    /// Moves every queued upload into `updates`, one upload per texture.
    pub fn commit_uploads(&mut self, updates: &mut ResourceUpdateBatch<T>) {
        for (index, info) in self.textures.iter_mut().enumerate() {
            if info.uploads.is_empty() {
                continue;
            }
            let entries = core::mem::take(&mut info.uploads);
            match &info.texture {
                Some(texture) => updates.upload_texture(texture.clone(), entries),
                None => log::warn!(
                    "dropping {} glyph uploads for texture {index}, which has no GPU texture",
                    entries.len()
                ),
            }
        }
    }

    /// Hands every texture to deferred release and removes all slots.
    pub fn release_all<B>(&mut self, backend: &mut B)
    where
        B: TextureBackend<Texture = T>,
    {
        for info in self.textures.drain(..) {
            if let Some(texture) = info.texture {
                backend.release_texture(texture);
            }
        }
    }
}

impl<T: Debug> Debug for TextureAtlas<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TextureAtlas")
            .field("textures", &self.textures)
            .field("use_resize_workaround", &self.use_resize_workaround)
            .finish()
    }
}

/// Creates a glyph texture and queues `data` as its full content.
fn new_texture<B: TextureBackend>(
    backend: &mut B,
    updates: &mut ResourceUpdateBatch<B::Texture>,
    index: u32,
    width: u32,
    height: u32,
    data: Vec<u8>,
) -> Option<B::Texture> {
    let Some(texture) = backend.create_texture(TextureDescriptor::glyph_texture(width, height))
    else {
        log::warn!("failed to create {width}x{height} distance field glyph texture {index}");
        return None;
    };
    updates.upload_texture(
        texture.clone(),
        vec![UploadEntry {
            x: 0,
            y: 0,
            width,
            height,
            data,
        }],
    );
    Some(texture)
}
