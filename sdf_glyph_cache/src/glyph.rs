// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-glyph atlas metadata.

#[cfg(feature = "libm")]
#[allow(unused_imports, reason = "only needed when `std` is disabled")]
use core_maths::CoreFloat;

use hashbrown::HashMap;
use kurbo::Rect;

use crate::area_allocator::AtlasRect;

/// Where a glyph's distance field lives inside its texture.
///
/// `x` and `y` point at the distance-field content, inside the padding that
/// surrounds every slot. `width` and `height` are the glyph's bounding-rect
/// size, and the margins are the distance-field radius added on each side.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TexCoord {
    /// Left edge of the content, in texels.
    pub x: f64,
    /// Top edge of the content, in texels.
    pub y: f64,
    /// Glyph bounding-rect width.
    pub width: f64,
    /// Glyph bounding-rect height.
    pub height: f64,
    /// Horizontal distance-field margin on each side.
    pub x_margin: f64,
    /// Vertical distance-field margin on each side.
    pub y_margin: f64,
}

/// A glyph resident in the atlas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphRecord {
    /// Glyph index in the font.
    pub glyph_id: u32,
    /// Location of the distance field within its texture.
    pub tex_coord: TexCoord,
    /// Glyph bounds in reference pixel units.
    pub bounding_rect: Rect,
    /// Index of the texture holding the glyph.
    pub texture_index: u32,
}

impl GlyphRecord {
    /// Creates a record with zeroed coordinates and bounds.
    pub fn new(glyph_id: u32) -> Self {
        Self {
            glyph_id,
            tex_coord: TexCoord::default(),
            bounding_rect: Rect::ZERO,
            texture_index: 0,
        }
    }

    /// The rectangle this glyph occupies in the allocator's space.
    ///
    /// Textures are stacked vertically, `texture_size` texels apart, and every
    /// slot is surrounded by `padding` texels.
    pub fn atlas_rect(&self, padding: u32, texture_size: u32) -> AtlasRect {
        let tc = &self.tex_coord;
        let pad = f64::from(padding);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "texture coordinates are whole texels within a texture"
        )]
        let (x, y) = (
            (tc.x - pad).max(0.0) as u32,
            (tc.y - pad).max(0.0) as u32,
        );
        AtlasRect::new(
            x,
            self.texture_index * texture_size + y,
            padded_extent(tc.width, tc.x_margin, padding),
            padded_extent(tc.height, tc.y_margin, padding),
        )
    }
}

/// Size of a padded slot along one axis: the glyph extent plus the
/// distance-field margin on both sides, rounded up, plus padding on both sides.
#[expect(
    clippy::cast_possible_truncation,
    reason = "glyph extents are far below u32::MAX texels"
)]
pub(crate) fn padded_extent(extent: f64, margin: f64, padding: u32) -> u32 {
    (extent + margin * 2.0).ceil().max(0.0) as u32 + padding * 2
}

/// Glyph records keyed by glyph id.
#[derive(Clone, Debug, Default)]
pub struct GlyphRecordStore {
    records: HashMap<u32, GlyphRecord>,
}

impl GlyphRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `glyph_id`, creating a zeroed one if needed.
    pub fn empty_data(&mut self, glyph_id: u32) -> &mut GlyphRecord {
        self.records
            .entry(glyph_id)
            .or_insert_with(|| GlyphRecord::new(glyph_id))
    }

    /// Looks up a record.
    pub fn get(&self, glyph_id: u32) -> Option<&GlyphRecord> {
        self.records.get(&glyph_id)
    }

    /// Looks up a record for modification.
    pub fn get_mut(&mut self, glyph_id: u32) -> Option<&mut GlyphRecord> {
        self.records.get_mut(&glyph_id)
    }

    /// Whether a record exists for `glyph_id`.
    pub fn contains(&self, glyph_id: u32) -> bool {
        self.records.contains_key(&glyph_id)
    }

    /// Removes a record. The caller frees its atlas space.
    pub fn remove(&mut self, glyph_id: u32) -> Option<GlyphRecord> {
        self.records.remove(&glyph_id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over all records in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &GlyphRecord> + '_ {
        self.records.values()
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_data_is_idempotent() {
        let mut store = GlyphRecordStore::new();
        store.empty_data(7).texture_index = 2;
        let record = store.empty_data(7);
        assert_eq!(record.texture_index, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(7).unwrap().tex_coord, TexCoord::default());
        assert!(store.remove(7).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn atlas_rect_covers_padding_and_margins() {
        let record = GlyphRecord {
            glyph_id: 1,
            tex_coord: TexCoord {
                x: 66.0,
                y: 2.0,
                width: 50.0,
                height: 49.5,
                x_margin: 5.0,
                y_margin: 5.0,
            },
            bounding_rect: Rect::new(0.0, 0.0, 50.0, 49.5),
            texture_index: 1,
        };
        assert_eq!(
            record.atlas_rect(2, 256),
            AtlasRect::new(64, 256, 64, 64),
        );
    }
}
