// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The distance-field glyph cache.

use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};

use hashbrown::{HashMap, HashSet};

use crate::area_allocator::{AreaAllocator, AtlasRect};
use crate::atlas::{TextureAtlas, TextureInfo};
use crate::backend::{BackendFeature, ResourceUpdateBatch, TextureBackend};
use crate::config::{self, CacheConfig};
use crate::distance_field::{DistanceField, DistanceFieldRasterizer};
use crate::glyph::{GlyphRecord, GlyphRecordStore, TexCoord, padded_extent};
use crate::pregenerated::{LoadError, PregeneratedCache};

/// A glyph cache for one font, packing distance fields into GPU textures.
///
/// Every glyph the cache holds ("resident" glyphs) is either referenced,
/// meaning some text currently draws it, or unused. When the atlas is full,
/// unused glyphs are evicted to make room; referenced glyphs never are.
///
/// The cache owns no GPU resources on its own terms. Textures come from a
/// [`TextureBackend`] passed into the operations that need one, and uploads
/// collect in an internal [`ResourceUpdateBatch`] until
/// [`commit_resource_updates`](Self::commit_resource_updates). Call
/// [`destroy`](Self::destroy) before dropping the cache to release its
/// textures.
pub struct DistanceFieldGlyphCache<T> {
    config: CacheConfig,
    max_texture_size: u32,
    max_texture_count: u32,
    /// Created on the first request, after any pregenerated cache is loaded.
    allocator: Option<AreaAllocator>,
    atlas: TextureAtlas<T>,
    records: GlyphRecordStore,
    referenced: HashSet<u32>,
    unused: HashSet<u32>,
    /// Reference counts maintained by `populate` and `release`.
    ref_counts: HashMap<u32, u32>,
    /// Glyphs already passed to `request_glyphs` since the last `update`.
    populating: HashSet<u32>,
    /// Glyphs with a slot but no distance field yet.
    pending: Vec<u32>,
    updates: ResourceUpdateBatch<T>,
    glyph_count: u32,
    pixel_size: Option<u16>,
    double_glyph_resolution: bool,
    alpha_swizzled: bool,
    screen_space_derivatives: bool,
}

impl<T: Clone> DistanceFieldGlyphCache<T> {
    /// Creates an empty cache, querying `backend` for its limits and
    /// capabilities once.
    pub fn new<B>(backend: &B, config: CacheConfig) -> Self
    where
        B: TextureBackend<Texture = T>,
    {
        let backend_limit = backend.max_texture_size();
        let max_texture_size = config
            .max_texture_size
            .map_or(backend_limit, |size| size.min(backend_limit));
        let use_resize_workaround = config.force_resize_workaround
            || !backend.is_feature_supported(BackendFeature::TextureCopy);
        Self {
            config,
            max_texture_size,
            max_texture_count: config.max_texture_count,
            allocator: None,
            atlas: TextureAtlas::new(use_resize_workaround),
            records: GlyphRecordStore::new(),
            referenced: HashSet::new(),
            unused: HashSet::new(),
            ref_counts: HashMap::new(),
            populating: HashSet::new(),
            pending: Vec::new(),
            updates: ResourceUpdateBatch::new(),
            glyph_count: 0,
            pixel_size: None,
            double_glyph_resolution: false,
            alpha_swizzled: !backend.is_feature_supported(BackendFeature::RedOrAlpha8IsRed),
            screen_space_derivatives: backend
                .is_feature_supported(BackendFeature::ScreenSpaceDerivatives),
        }
    }

    /// Makes room for glyphs that are not resident yet.
    ///
    /// Each glyph gets a slot of its bounding rect grown by the distance-field
    /// radius and the padding. When no space is left, unused glyphs are
    /// evicted until the slot fits; if it still does not, the glyph is
    /// skipped and can be requested again later. Admitted glyphs wait in
    /// [`pending_glyphs`](Self::pending_glyphs) for their distance fields.
    pub fn request_glyphs<R>(&mut self, glyphs: impl IntoIterator<Item = u32>, rasterizer: &R)
    where
        R: DistanceFieldRasterizer + ?Sized,
    {
        self.ensure_allocator();
        let padding = self.config.padding;
        let radius = self.distance_field_radius();
        let texture_size = self.max_texture_size;

        for glyph in glyphs {
            if self.records.contains(glyph) {
                continue;
            }
            let bounds = rasterizer.bounding_rect(glyph);
            let width = padded_extent(bounds.width(), radius, padding);
            let height = padded_extent(bounds.height(), radius, padding);

            let mut slot = self.allocate(width, height);
            let mut evicted = 0_usize;
            while slot.is_none() {
                let Some(&victim) = self.unused.iter().next() else {
                    break;
                };
                self.forget_glyph(victim);
                evicted += 1;
                slot = self.allocate(width, height);
            }
            if evicted > 0 {
                log::debug!("evicted {evicted} unused glyphs to make room for glyph {glyph}");
            }
            let Some(slot) = slot else {
                log::trace!("no atlas space for glyph {glyph} ({width}x{height})");
                continue;
            };

            let texture_index = slot.y / texture_size;
            let local = AtlasRect::new(slot.x, slot.y % texture_size, slot.width, slot.height);
            let info = self.atlas.texture_info_mut(texture_index);
            info.extend_allocated_area(local);
            info.record_padding(padding);

            let record = self.records.empty_data(glyph);
            record.tex_coord = TexCoord {
                x: f64::from(local.x + padding),
                y: f64::from(local.y + padding),
                width: bounds.width(),
                height: bounds.height(),
                x_margin: radius,
                y_margin: radius,
            };
            record.bounding_rect = bounds;
            record.texture_index = texture_index;
            log::trace!("glyph {glyph} placed at {local:?} in texture {texture_index}");
            self.pending.push(glyph);
        }
    }

    /// Uploads distance fields for glyphs admitted by
    /// [`request_glyphs`](Self::request_glyphs).
    ///
    /// Textures are created or grown first, so that resize copies precede the
    /// glyph uploads in the resource batch. Fields for glyphs that are no
    /// longer resident are ignored. A glyph whose texture cannot be created
    /// loses its slot and is requested again later.
    pub fn store_glyphs<B>(&mut self, backend: &mut B, glyphs: impl IntoIterator<Item = DistanceField>)
    where
        B: TextureBackend<Texture = T>,
    {
        let full_size = self.uses_full_size_textures();
        for field in glyphs {
            let glyph = field.glyph();
            let Some(record) = self.records.get(glyph).copied() else {
                log::trace!("ignoring distance field for glyph {glyph}, which is not resident");
                continue;
            };
            let index = record.texture_index;
            let (width, height, padding) = match self.atlas.texture_info(index) {
                Some(info) if full_size => (
                    self.max_texture_size,
                    self.max_texture_size,
                    info.padding().unwrap_or(self.config.padding),
                ),
                Some(info) => {
                    let area = info.allocated_area();
                    let (width, height) = info.size();
                    (
                        width.max(area.right()),
                        height.max(area.bottom()),
                        info.padding().unwrap_or(self.config.padding),
                    )
                }
                None => continue,
            };

            if !self
                .atlas
                .resize_texture(backend, &mut self.updates, index, width, height)
            {
                log::warn!("dropping glyph {glyph}: texture {index} could not be created");
                self.forget_glyph(glyph);
                continue;
            }

            let tc = record.tex_coord;
            let offset = -(padding as i32);
            let cropped = field.copy(
                offset,
                offset,
                padded_extent(tc.width, tc.x_margin, padding),
                padded_extent(tc.height, tc.y_margin, padding),
            );
            self.atlas.queue_upload(
                index,
                texel(tc.x).saturating_sub(padding),
                texel(tc.y).saturating_sub(padding),
                cropped,
            );
        }
        self.atlas.commit_uploads(&mut self.updates);
    }

    /// Marks glyphs as drawn by some text. They will not be evicted.
    pub fn reference_glyphs(&mut self, glyphs: impl IntoIterator<Item = u32>) {
        for glyph in glyphs {
            self.unused.remove(&glyph);
            self.referenced.insert(glyph);
        }
    }

    /// Marks glyphs as no longer drawn. Resident ones become evictable.
    pub fn release_glyphs(&mut self, glyphs: impl IntoIterator<Item = u32>) {
        for glyph in glyphs {
            self.referenced.remove(&glyph);
            if self.records.contains(glyph) {
                self.unused.insert(glyph);
            }
        }
    }

    /// Whether any glyph is referenced. An inactive cache can be destroyed.
    pub fn is_active(&self) -> bool {
        !self.referenced.is_empty()
    }

    /// Moves every prepared upload and copy into `target`.
    ///
    /// Must run before the draw calls that sample the atlas are submitted.
    pub fn commit_resource_updates(&mut self, target: &mut ResourceUpdateBatch<T>) {
        target.merge(&mut self.updates);
    }

    /// References `glyphs` for drawing and requests the ones not resident.
    ///
    /// Every occurrence of a glyph counts as one reference, to be balanced
    /// by [`release`](Self::release). Glyphs with an empty bounding rect are
    /// referenced but never take atlas space.
    pub fn populate<R>(&mut self, glyphs: &[u32], rasterizer: &R)
    where
        R: DistanceFieldRasterizer + ?Sized,
    {
        self.glyph_count = rasterizer.glyph_count();
        let mut referenced = Vec::with_capacity(glyphs.len());
        let mut requested = Vec::new();
        for &glyph in glyphs {
            if self.glyph_count > 0 && glyph >= self.glyph_count {
                log::warn!(
                    "distance field glyph {glyph} is not available (the font has {} glyphs)",
                    self.glyph_count
                );
                continue;
            }
            *self.ref_counts.entry(glyph).or_insert(0) += 1;
            referenced.push(glyph);
            if self.records.contains(glyph) || !self.populating.insert(glyph) {
                continue;
            }
            if rasterizer.bounding_rect(glyph).is_zero_area() {
                continue;
            }
            requested.push(glyph);
        }
        self.reference_glyphs(referenced);
        if !requested.is_empty() {
            self.request_glyphs(requested, rasterizer);
        }
    }

    /// Drops one reference per occurrence of each glyph.
    ///
    /// Glyphs whose count reaches zero are released and, if resident, become
    /// evictable.
    pub fn release(&mut self, glyphs: &[u32]) {
        let mut released = Vec::new();
        for &glyph in glyphs {
            let Some(count) = self.ref_counts.get_mut(&glyph) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                self.ref_counts.remove(&glyph);
                released.push(glyph);
            }
        }
        self.release_glyphs(released);
    }

    /// Rasterizes every pending glyph and stores the results.
    pub fn update<B, R>(&mut self, backend: &mut B, rasterizer: &mut R)
    where
        B: TextureBackend<Texture = T>,
        R: DistanceFieldRasterizer + ?Sized,
    {
        self.populating.clear();
        if self.pending.is_empty() {
            return;
        }
        self.glyph_count = rasterizer.glyph_count();
        let double_resolution = self.double_glyph_resolution;
        let fields: Vec<_> = core::mem::take(&mut self.pending)
            .into_iter()
            .map(|glyph| rasterizer.rasterize(glyph, double_resolution))
            .collect();
        self.store_glyphs(backend, fields);
    }

    /// Seeds the empty cache with a decoded pregenerated cache.
    ///
    /// Fails with [`LoadError::CacheInUse`] once glyphs have been requested.
    /// On success every loaded glyph is resident and unused.
    pub fn load_pregenerated<B>(
        &mut self,
        backend: &mut B,
        cache: &PregeneratedCache<'_>,
    ) -> Result<(), LoadError>
    where
        B: TextureBackend<Texture = T>,
    {
        if self.allocator.is_some() {
            log::warn!("a pregenerated cache must be loaded before the cache is used");
            return Err(LoadError::CacheInUse);
        }
        #[cfg(feature = "std")]
        let start = log::log_enabled!(log::Level::Debug).then(std::time::Instant::now);

        let backend_limit = backend.max_texture_size();
        if cache.texture_size > backend_limit {
            log::warn!(
                "backend texture size limit {backend_limit} is below the pregenerated texture size {}",
                cache.texture_size
            );
        }
        if u32::from(cache.padding) != self.config.padding {
            log::warn!(
                "pregenerated cache padding {} differs from the configured padding {}",
                cache.padding,
                self.config.padding
            );
        }

        self.max_texture_size = cache.texture_size;
        self.max_texture_count = self.max_texture_count.max(cache.texture_count());
        self.pixel_size = Some(cache.pixel_size);
        self.double_glyph_resolution = cache.double_glyph_resolution();
        let mut allocator = cache.allocator.clone();
        allocator.set_page_height(Some(cache.texture_size));
        self.allocator = Some(allocator);

        for (index, texture) in (0_u32..).zip(&cache.textures) {
            let info = self.atlas.texture_info_mut(index);
            info.set_allocated_area(texture.allocated_area);
            info.record_padding(u32::from(texture.padding));
        }
        for glyph in &cache.glyphs {
            *self.records.empty_data(glyph.glyph_id) = *glyph;
            if !self.referenced.contains(&glyph.glyph_id) {
                self.unused.insert(glyph.glyph_id);
            }
        }

        for ((index, texture), pixels) in (0_u32..).zip(&cache.textures).zip(&cache.texture_data) {
            let area = texture.allocated_area;
            if area.is_empty() {
                continue;
            }
            let created = self.atlas.create_texture(
                backend,
                &mut self.updates,
                index,
                area.width,
                area.height,
                Some(pixels.as_ref()),
            );
            if !created {
                let lost: Vec<u32> = cache
                    .glyphs
                    .iter()
                    .filter(|glyph| glyph.texture_index == index)
                    .map(|glyph| glyph.glyph_id)
                    .collect();
                log::warn!(
                    "dropping {} pregenerated glyphs of texture {index}",
                    lost.len()
                );
                for glyph in lost {
                    self.forget_glyph(glyph);
                }
            }
        }

        #[cfg(feature = "std")]
        if let Some(start) = start {
            log::debug!(
                "{} pregenerated glyphs loaded in {:?}",
                self.records.len(),
                start.elapsed()
            );
        }
        #[cfg(not(feature = "std"))]
        log::debug!("{} pregenerated glyphs loaded", self.records.len());
        Ok(())
    }

    /// Loads the pregenerated cache of font `index` in `font_data`, if the
    /// font has one.
    ///
    /// Returns `Ok(false)` when the font carries no `qtdf` table.
    pub fn load_pregenerated_from_font<B>(
        &mut self,
        backend: &mut B,
        font_data: &[u8],
        index: u32,
    ) -> Result<bool, LoadError>
    where
        B: TextureBackend<Texture = T>,
    {
        if self.allocator.is_some() {
            return Err(LoadError::CacheInUse);
        }
        match PregeneratedCache::from_font(font_data, index)? {
            Some(cache) => self.load_pregenerated(backend, &cache).map(|()| true),
            None => Ok(false),
        }
    }

    /// Releases every texture and forgets every glyph.
    pub fn destroy<B>(&mut self, backend: &mut B)
    where
        B: TextureBackend<Texture = T>,
    {
        self.atlas.release_all(backend);
        self.allocator = None;
        self.records.clear();
        self.referenced.clear();
        self.unused.clear();
        self.ref_counts.clear();
        self.populating.clear();
        self.pending.clear();
        self.updates.clear();
    }

    /// Marks glyphs as rendered at double resolution.
    pub fn set_double_glyph_resolution(&mut self, double_glyph_resolution: bool) {
        self.double_glyph_resolution = double_glyph_resolution;
    }

    /// The record of a resident glyph.
    pub fn glyph(&self, glyph_id: u32) -> Option<&GlyphRecord> {
        self.records.get(glyph_id)
    }

    /// The GPU texture at `index`, if it has been created.
    pub fn texture(&self, index: u32) -> Option<&T> {
        self.atlas.texture_info(index)?.texture()
    }

    /// The texture slot at `index`.
    pub fn texture_info(&self, index: u32) -> Option<&TextureInfo<T>> {
        self.atlas.texture_info(index)
    }

    /// Number of texture slots in use.
    pub fn texture_count(&self) -> usize {
        self.atlas.len()
    }

    /// Size of every texture once fully grown.
    pub fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    /// Number of textures the atlas may grow to.
    ///
    /// After [`load_pregenerated`](Self::load_pregenerated) this is the larger
    /// of the configured count and the loaded cache's texture count. The
    /// allocator keeps the loaded cache's region though, so glyphs only ever
    /// land in the textures the loaded cache spans.
    pub fn max_texture_count(&self) -> u32 {
        self.max_texture_count
    }

    /// The allocator tracking atlas space, once created.
    pub fn allocator(&self) -> Option<&AreaAllocator> {
        self.allocator.as_ref()
    }

    /// Distance-field spread in texels.
    pub fn distance_field_radius(&self) -> f64 {
        config::distance_field_radius(self.double_glyph_resolution)
    }

    /// Pixel size of the loaded pregenerated glyphs.
    pub fn pixel_size(&self) -> Option<u16> {
        self.pixel_size
    }

    /// Whether glyphs are rendered at double resolution.
    pub fn double_glyph_resolution(&self) -> bool {
        self.double_glyph_resolution
    }

    /// Whether shaders must read glyph textures through the alpha channel.
    pub fn eight_bit_format_is_alpha_swizzled(&self) -> bool {
        self.alpha_swizzled
    }

    /// Whether shaders may use screen-space derivatives for anti-aliasing.
    pub fn screen_space_derivatives_supported(&self) -> bool {
        self.screen_space_derivatives
    }

    /// Whether textures grow through a CPU mirror instead of GPU copies.
    pub fn uses_resize_workaround(&self) -> bool {
        self.atlas.uses_resize_workaround()
    }

    /// Glyphs currently drawn.
    pub fn referenced_glyphs(&self) -> &HashSet<u32> {
        &self.referenced
    }

    /// Resident glyphs that may be evicted.
    pub fn unused_glyphs(&self) -> &HashSet<u32> {
        &self.unused
    }

    /// Glyphs with a slot that still need their distance field.
    pub fn pending_glyphs(&self) -> &[u32] {
        &self.pending
    }

    fn uses_full_size_textures(&self) -> bool {
        self.config.prefer_full_size_textures && self.glyph_count > self.config.high_glyph_count
    }

    fn ensure_allocator(&mut self) {
        if self.allocator.is_none() {
            let size = self.max_texture_size;
            let mut allocator =
                AreaAllocator::new(size, self.max_texture_count.saturating_mul(size));
            allocator.set_page_height(Some(size));
            self.allocator = Some(allocator);
        }
    }

    fn allocate(&mut self, width: u32, height: u32) -> Option<AtlasRect> {
        self.allocator.as_mut()?.allocate(width, height)
    }

    /// Frees a glyph's slot and removes every trace of it but its references.
    fn forget_glyph(&mut self, glyph: u32) {
        self.unused.remove(&glyph);
        self.pending.retain(|&pending| pending != glyph);
        let Some(record) = self.records.remove(glyph) else {
            return;
        };
        let padding = self
            .atlas
            .texture_info(record.texture_index)
            .and_then(TextureInfo::padding)
            .unwrap_or(self.config.padding);
        let rect = record.atlas_rect(padding, self.max_texture_size);
        if let Some(allocator) = self.allocator.as_mut() {
            if !allocator.deallocate(rect) {
                log::warn!("glyph {glyph} did not own the atlas area at {rect:?}");
            }
        }
        log::trace!("glyph {glyph} removed from the atlas");
    }
}

impl<T: Debug> Debug for DistanceFieldGlyphCache<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DistanceFieldGlyphCache")
            .field("config", &self.config)
            .field("max_texture_size", &self.max_texture_size)
            .field("max_texture_count", &self.max_texture_count)
            .field("atlas", &self.atlas)
            .field("resident", &self.records.len())
            .field("referenced", &self.referenced.len())
            .field("unused", &self.unused.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Converts a whole-texel texture coordinate.
#[expect(
    clippy::cast_possible_truncation,
    reason = "texture coordinates are whole texels within a texture"
)]
fn texel(value: f64) -> u32 {
    value.max(0.0) as u32
}
