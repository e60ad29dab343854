// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::borrow::Cow;
use alloc::vec;
use alloc::vec::Vec;

use kurbo::Rect;

use crate::area_allocator::{AreaAllocator, AtlasRect};
use crate::glyph::{GlyphRecord, TexCoord};
use crate::pregenerated::{PregeneratedCache, TextureRecord};

fn glyph(glyph_id: u32, x: f64, width: f64, height: f64, texture_index: u32) -> GlyphRecord {
    GlyphRecord {
        glyph_id,
        tex_coord: TexCoord {
            x,
            y: 2.0,
            width,
            height,
            x_margin: 5.0,
            y_margin: 5.0,
        },
        bounding_rect: Rect::new(0.0, 0.0, width, height),
        texture_index,
    }
}

/// A pregenerated cache with two 64x64 textures and three glyphs.
///
/// | Glyph | Texture | Slot               |
/// |-------|---------|--------------------|
/// | 7     | 0       | `(0, 0, 16, 16)`   |
/// | 42    | 0       | `(16, 0, 20, 16)`  |
/// | 9     | 1       | `(0, 0, 16, 52)`   |
///
/// Texture 0 is filled with 1s, texture 1 with 2s.
pub(crate) fn sample_cache() -> PregeneratedCache<'static> {
    let mut allocator = AreaAllocator::new(64, 128);
    allocator.set_page_height(Some(64));
    let slots: Vec<_> = [(16, 16), (20, 16), (16, 52)]
        .into_iter()
        .map(|(width, height)| allocator.allocate(width, height).unwrap())
        .collect();
    assert_eq!(
        slots,
        [
            AtlasRect::new(0, 0, 16, 16),
            AtlasRect::new(16, 0, 20, 16),
            AtlasRect::new(0, 64, 16, 52),
        ],
        "sample slots moved"
    );

    let mut odd = glyph(42, 18.5, 6.0, 2.0, 0);
    odd.bounding_rect = Rect::from_origin_size((-1.25, 0.5), (6.0, 2.0));

    PregeneratedCache {
        pixel_size: 54,
        texture_size: 64,
        flags: 0,
        padding: 2,
        allocator,
        textures: vec![
            TextureRecord {
                allocated_area: AtlasRect::new(0, 0, 36, 16),
                padding: 2,
            },
            TextureRecord {
                allocated_area: AtlasRect::new(0, 0, 16, 52),
                padding: 2,
            },
        ],
        glyphs: vec![glyph(7, 2.0, 2.0, 2.0, 0), odd, glyph(9, 2.0, 2.0, 38.0, 1)],
        texture_data: vec![Cow::Owned(vec![1; 36 * 16]), Cow::Owned(vec![2; 16 * 52])],
    }
}

/// The encoded [`sample_cache`].
pub(crate) fn qtdf_table() -> Vec<u8> {
    sample_cache().to_bytes()
}

/// A TrueType file holding a single table.
#[expect(clippy::cast_possible_truncation, reason = "test tables are small")]
pub(crate) fn font_with_table(tag: [u8; 4], table: &[u8]) -> Vec<u8> {
    let mut font = Vec::new();
    font.extend_from_slice(&0x0001_0000_u32.to_be_bytes());
    font.extend_from_slice(&1_u16.to_be_bytes());
    // Search range, entry selector and range shift.
    font.extend_from_slice(&[0, 16, 0, 0, 0, 0]);
    font.extend_from_slice(&tag);
    font.extend_from_slice(&0_u32.to_be_bytes());
    font.extend_from_slice(&28_u32.to_be_bytes());
    font.extend_from_slice(&(table.len() as u32).to_be_bytes());
    font.extend_from_slice(table);
    font
}
